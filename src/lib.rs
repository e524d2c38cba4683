//! gatecheck - End-to-end tests for API gateway proxies
//!
//! Downloads a proxy app from the management platform, runs the
//! transformation under test on it, deploys the result to a local gateway,
//! and checks the HTTPS settings of the deployed descriptor.
//!
//! # Example
//!
//! ```ignore
//! use gatecheck::transform::{from_fn, TransformError};
//! use gatecheck::Harness;
//!
//! #[gatecheck::test]
//! async fn test_https_outbound(harness: Harness) -> Result<(), gatecheck::HarnessError> {
//!     let https_outbound = from_fn(|_params| async {
//!         // modify the proxy and write it to the export directory
//!         Ok::<(), TransformError>(())
//!     });
//!
//!     harness.prepare("4051", "29837").await?;
//!     harness.deploy_https().await?;
//!     harness.test_outbound_processing(&https_outbound).await?;
//!     harness.make_test_request(gatecheck::LOCAL_PROXY_URL).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! `Harness::from_env` reads `test.properties` from the resources root
//! (`$GATECHECK_RESOURCES`, default `tests/resources`). Set
//! `testWithGateway=true` and `gatewayAppDir` to run against a live gateway.

pub mod archive;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod fetch;
pub mod harness;
pub mod params;
pub mod session;
pub mod telemetry;
pub mod traffic;
pub mod transform;
pub mod verify;
pub mod wait;
pub mod workspace;

// Re-export commonly used types
pub use config::{ConfigError, GatewayConfig};
pub use deploy::{DeployOutcome, Gateway, UndeployOutcome};
pub use diagnostics::Diagnostics;
pub use fetch::{ApiRef, FetchError, ProxyArchive};
pub use harness::{Harness, HarnessError, HTTPS_TEST_APP, LOCAL_PROXY_URL, SOAP_SERVICE_APP};
pub use params::{InputParams, ParamKey};
pub use session::{Session, SessionError};
pub use telemetry::init_logging;
pub use traffic::{ProxyResponse, TrafficError};
pub use transform::{from_fn, FnTransform, Transform, TransformError, TransformOutcome};
pub use verify::{Direction, VerificationReport, VerifyError};
pub use wait::{eventually, WaitError};
pub use workspace::Workspace;

// Attribute macro for workflow tests
pub use gatecheck_macros::test;

#[doc(hidden)]
pub mod __private {
    pub use futures::FutureExt;
}
