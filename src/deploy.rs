//! Deployment to a locally running gateway
//!
//! The gateway hot-deploys zip files dropped into its apps directory. Once an
//! app is up the gateway writes `<app>-anchor.txt` next to it; deleting that
//! anchor makes the gateway undeploy the app and remove its `<app>/`
//! directory. Both transitions are observed by polling, bounded by the
//! configured timeouts.
//!
//! When the run is not against a live gateway every operation is a logged
//! no-op.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::archive::{anchor_file_name, app_name};
use crate::config::GatewayConfig;
use crate::wait::{eventually, path_absent, path_exists, WaitError, Waited};
use crate::workspace::remove_dir;

/// Error type for deployment
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("archive to deploy not found: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("archive path has no file name: {0}")]
    NoFileName(PathBuf),

    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove stale anchor {path}: {source}")]
    StaleAnchor {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of a deploy request
#[derive(Debug, Clone)]
pub enum DeployOutcome {
    /// Not running against a live gateway
    Skipped,
    /// The gateway reported the app as deployed
    Ready { app: String, waited: Waited },
    /// The gateway did not report the app within the timeout
    NotReady { app: String, error: WaitError },
}

impl DeployOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, DeployOutcome::Ready { .. })
    }
}

/// Result of an undeploy request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndeployOutcome {
    Skipped,
    /// The gateway removed the app directory itself
    Undeployed,
    /// The app directory was still present at the deadline and was removed by us
    ForcedRemoval,
    /// Cleanup could not complete; the cause has been logged
    Incomplete(String),
}

/// Driver for a gateway's hot-deploy directory
#[derive(Debug, Clone)]
pub struct Gateway {
    apps_dir: Option<PathBuf>,
    poll_interval: Duration,
}

impl Gateway {
    /// A gateway that skips every operation
    pub fn disabled() -> Self {
        Self {
            apps_dir: None,
            poll_interval: Duration::from_millis(500),
        }
    }

    /// A live gateway watching `apps_dir`
    pub fn live(apps_dir: impl Into<PathBuf>) -> Self {
        Self {
            apps_dir: Some(apps_dir.into()),
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        let gateway = match (&config.gateway_app_dir, config.test_with_gateway) {
            (Some(dir), true) => Self::live(dir),
            _ => Self::disabled(),
        };
        gateway.poll_interval(config.poll_interval)
    }

    /// Set the readiness polling interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn is_live(&self) -> bool {
        self.apps_dir.is_some()
    }

    pub fn apps_dir(&self) -> Option<&Path> {
        self.apps_dir.as_deref()
    }

    /// Copy `archive` into the apps directory and wait for its anchor
    ///
    /// A stale anchor from an earlier deployment of the same app is removed
    /// first so the wait observes this deployment.
    #[instrument(skip(self, archive), fields(archive = %archive.display()))]
    pub async fn deploy(
        &self,
        archive: &Path,
        timeout: Duration,
    ) -> Result<DeployOutcome, DeployError> {
        let Some(apps_dir) = &self.apps_dir else {
            info!("Skipping deployment, not testing with a gateway");
            return Ok(DeployOutcome::Skipped);
        };

        let file_name = archive
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DeployError::NoFileName(archive.to_path_buf()))?;
        if !path_exists(archive).await {
            return Err(DeployError::ArchiveNotFound(archive.to_path_buf()));
        }

        let app = app_name(file_name).to_string();
        let anchor = apps_dir.join(anchor_file_name(&app));
        match fs::remove_file(&anchor).await {
            Ok(()) => info!(anchor = %anchor.display(), "Removed stale anchor"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(DeployError::StaleAnchor { path: anchor, source }),
        }

        let target = apps_dir.join(file_name);
        info!(dest = %target.display(), "Deploying to gateway");
        fs::copy(archive, &target)
            .await
            .map_err(|source| DeployError::Copy {
                from: archive.to_path_buf(),
                to: target.clone(),
                source,
            })?;

        let what = format!("deployment of {}", app);
        let waited = eventually(&what, || path_exists(&anchor))
            .timeout(timeout)
            .interval(self.poll_interval)
            .await_condition()
            .await;

        Ok(match waited {
            Ok(waited) => {
                info!(app = %app, elapsed = ?waited.elapsed, "Gateway deployed app");
                DeployOutcome::Ready { app, waited }
            }
            Err(error) => {
                let error = error.with_state(format!("{} not created", anchor.display()));
                warn!(app = %app, "Gateway did not deploy app in time\n{}", error);
                DeployOutcome::NotReady { app, error }
            }
        })
    }

    /// Undeploy `app` by removing its anchor, then make sure its directory is gone
    ///
    /// Never fails: every problem is logged and reported in the outcome.
    #[instrument(skip(self))]
    pub async fn undeploy(&self, app: &str, timeout: Duration) -> UndeployOutcome {
        let Some(apps_dir) = &self.apps_dir else {
            return UndeployOutcome::Skipped;
        };

        let anchor = apps_dir.join(anchor_file_name(app));
        if let Err(e) = fs::remove_file(&anchor).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(anchor = %anchor.display(), error = %e, "Failed to remove anchor");
            }
        }

        info!(app, "Waiting for gateway to undeploy the proxy...");
        let app_dir = apps_dir.join(app);
        let what = format!("undeployment of {}", app);
        let waited = eventually(&what, || path_absent(&app_dir))
            .timeout(timeout)
            .interval(self.poll_interval)
            .await_condition()
            .await;
        if waited.is_ok() {
            return UndeployOutcome::Undeployed;
        }

        match remove_dir(&app_dir).await {
            Ok(()) => UndeployOutcome::ForcedRemoval,
            Err(e) => {
                warn!(dir = %app_dir.display(), error = %e, "Failed to remove app directory");
                UndeployOutcome::Incomplete(e.to_string())
            }
        }
    }
}
