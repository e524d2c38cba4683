//! Caller-supplied proxy transformations
//!
//! A `Transform` takes the input parameters and writes a modified proxy
//! archive into the export directory. The harness calls it exactly once and
//! never lets its failure abort the run: the outcome is recorded and the
//! missing (or invalid) artifact fails the test further down.
//!
//! # Example
//!
//! ```ignore
//! use gatecheck::transform::{from_fn, TransformError};
//!
//! let https_outbound = from_fn(|params| {
//!     let params = params.clone();
//!     async move {
//!         let export = params.path(ParamKey::Export).ok_or(TransformError::MissingParam(ParamKey::Export))?;
//!         // rewrite proxy.xml, bundle the keystore, zip into `export`
//!         Ok(())
//!     }
//! });
//!
//! harness.test_outbound_processing(&https_outbound).await?;
//! ```

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{info, warn};

use crate::params::{InputParams, ParamKey};

/// Error type a transform reports
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("missing input parameter: {0}")]
    MissingParam(ParamKey),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

/// A proxy modification under test
#[async_trait]
pub trait Transform: Send + Sync {
    /// Modify the proxy named by `params` and write the result to the export directory
    async fn process(&self, params: &InputParams) -> Result<(), TransformError>;

    /// Name for logs and diagnostics
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A `Transform` backed by a closure
pub struct FnTransform<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a `Transform`
pub fn from_fn<F, Fut>(f: F) -> FnTransform<F>
where
    F: Fn(&InputParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TransformError>> + Send,
{
    FnTransform {
        name: "fn-transform".to_string(),
        f,
    }
}

impl<F> FnTransform<F> {
    /// Set the name shown in logs and diagnostics
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl<F, Fut> Transform for FnTransform<F>
where
    F: Fn(&InputParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TransformError>> + Send,
{
    async fn process(&self, params: &InputParams) -> Result<(), TransformError> {
        (self.f)(params).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// What happened when the transform ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    Succeeded,
    /// The transform returned an error
    Failed(String),
    /// The transform panicked
    Panicked(String),
}

impl TransformOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransformOutcome::Succeeded)
    }

    /// Cause of a failure, if the transform did not succeed
    pub fn failure_cause(&self) -> Option<&str> {
        match self {
            TransformOutcome::Succeeded => None,
            TransformOutcome::Failed(cause) | TransformOutcome::Panicked(cause) => Some(cause),
        }
    }
}

impl fmt::Display for TransformOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformOutcome::Succeeded => write!(f, "succeeded"),
            TransformOutcome::Failed(cause) => write!(f, "failed: {}", cause),
            TransformOutcome::Panicked(cause) => write!(f, "panicked: {}", cause),
        }
    }
}

/// Run `transform` once, capturing errors and panics instead of propagating them
pub async fn invoke(transform: &dyn Transform, params: &InputParams) -> TransformOutcome {
    info!(transform = transform.name(), "Running transform");

    let result = AssertUnwindSafe(transform.process(params))
        .catch_unwind()
        .await;

    let outcome = match result {
        Ok(Ok(())) => TransformOutcome::Succeeded,
        Ok(Err(e)) => TransformOutcome::Failed(e.to_string()),
        Err(panic) => TransformOutcome::Panicked(panic_message(panic.as_ref())),
    };

    match &outcome {
        TransformOutcome::Succeeded => info!(transform = transform.name(), "Transform finished"),
        failed => warn!(transform = transform.name(), outcome = %failed, "Transform did not succeed"),
    }
    outcome
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "transform panicked".to_string()
    }
}
