//! The proxy workflow under test
//!
//! `Harness` owns everything one test run needs: configuration, the
//! resources workspace, the transform's input parameters, the gateway
//! driver, and the downloaded proxy. Use it directly or through
//! `#[gatecheck::test]`, which always runs `teardown`.
//!
//! # Errors
//!
//! Setup failures (config, login, download) are returned from `prepare` and
//! end the test. A failing transform does not: its outcome is recorded and
//! the missing or invalid artifact is what fails the test.
//!
//! # Example
//!
//! ```ignore
//! use gatecheck::{Harness, transform::from_fn};
//!
//! let mut harness = Harness::from_env()?;
//! harness.prepare("4051", "29837").await?;
//! harness.deploy_https().await?;
//! harness.test_outbound_processing(&https_outbound).await?;
//! harness.make_test_request(gatecheck::LOCAL_PROXY_URL).await?;
//! harness.teardown().await;
//! ```

#![allow(clippy::missing_errors_doc)]

use reqwest::Client;
use std::io;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

use crate::archive::{self, app_name, ArchiveError};
use crate::config::{ConfigError, GatewayConfig};
use crate::deploy::{DeployError, DeployOutcome, Gateway, UndeployOutcome};
use crate::diagnostics::{Diagnostics, Step};
use crate::fetch::{download_proxy, ApiRef, FetchError, ProxyArchive};
use crate::params::{path_string, InputParams, ParamKey, ALIAS_PASSWORD, KEY_STORE_PASSWORD};
use crate::session::{join_uri, Session, SessionError};
use crate::telemetry::init_logging;
use crate::traffic::{ProxyResponse, TestRequest, TrafficError, TrafficProbe};
use crate::transform::{self, Transform, TransformOutcome};
use crate::verify::{verify_extracted, Direction, VerificationReport, VerifyError};
use crate::wait::path_exists;
use crate::workspace::{remove_dir, Workspace};

/// Where a locally deployed proxy listens
pub const LOCAL_PROXY_URL: &str = "http://localhost:8081";

/// HTTPS endpoint app deployed next to the proxy
pub const HTTPS_TEST_APP: &str = "https-test.zip";

/// SOAP web service app for WSDL proxies
pub const SOAP_SERVICE_APP: &str = "xml-only-soap-web-service.zip";

/// Error type for the workflow
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("workspace error: {0}")]
    Workspace(#[from] io::Error),

    #[error("login failed: {0}")]
    Session(#[from] SessionError),

    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("deployment failed: {0}")]
    Deploy(#[from] DeployError),

    #[error("extraction failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("{0}")]
    Verify(#[from] VerifyError),

    #[error("{0}")]
    Traffic(#[from] TrafficError),

    #[error("no proxy downloaded, call prepare() first")]
    NotPrepared,

    #[error("Modified zip file should be created at {path} (transform {outcome})")]
    MissingArtifact {
        path: PathBuf,
        outcome: TransformOutcome,
    },

    #[error("property {0} is not set")]
    MissingProperty(String),
}

/// One test run of the proxy workflow
#[derive(Debug)]
pub struct Harness {
    config: GatewayConfig,
    workspace: Workspace,
    gateway: Gateway,
    params: InputParams,
    proxy: Option<ProxyArchive>,
    diagnostics: Diagnostics,
}

impl Harness {
    pub fn new(config: GatewayConfig, workspace: Workspace) -> Self {
        let gateway = Gateway::from_config(&config);
        let diagnostics = Diagnostics {
            gateway_dir: gateway.apps_dir().map(PathBuf::from),
            ..Diagnostics::default()
        };
        Self {
            config,
            workspace,
            gateway,
            params: InputParams::new(),
            proxy: None,
            diagnostics,
        }
    }

    /// Harness for the resources root in the environment, configured from
    /// its `test.properties`
    pub fn from_env() -> Result<Self, HarnessError> {
        init_logging();
        let workspace = Workspace::from_env();
        let config = GatewayConfig::load(workspace.properties())?;
        Ok(Self::new(config, workspace))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Parameters handed to the transform
    pub fn params(&self) -> &InputParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut InputParams {
        &mut self.params
    }

    /// The downloaded proxy, once `prepare` succeeded
    pub fn proxy(&self) -> Option<&ProxyArchive> {
        self.proxy.as_ref()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Reset the workspace, sign in, and download the proxy for one API version
    #[instrument(skip(self))]
    pub async fn prepare(
        &mut self,
        api_name_id: &str,
        api_version_id: &str,
    ) -> Result<&ProxyArchive, HarnessError> {
        let api = ApiRef::new(api_name_id, api_version_id);
        self.diagnostics.api = Some(format!("{}/{}", api_name_id, api_version_id));

        for (key, value) in InputParams::for_workspace(&self.workspace).iter() {
            self.params.insert(key, value);
        }
        if let Err(e) = self.workspace.reset().await {
            self.diagnostics.failed(Step::Prepare, e.to_string());
            return Err(e.into());
        }
        self.diagnostics.ok(Step::Prepare, "workspace reset");

        let session = match self.login().await {
            Ok(session) => session,
            Err(e) => {
                self.diagnostics.failed(Step::Login, e.to_string());
                return Err(e.into());
            }
        };
        self.diagnostics
            .ok(Step::Login, format!("signed in as {}", self.config.username));

        let downloaded = match session.authorized_client() {
            Ok(client) => {
                download_proxy(&client, &self.config, &api, &self.workspace.input_dir())
                    .await
                    .map_err(HarnessError::from)
            }
            Err(e) => Err(e.into()),
        };
        let proxy = match downloaded {
            Ok(proxy) => proxy,
            Err(e) => {
                self.diagnostics.failed(Step::Download, e.to_string());
                return Err(e);
            }
        };

        info!(path = %proxy.path.display(), "Proxy app saved");
        self.diagnostics
            .ok(Step::Download, format!("saved {}", proxy.path.display()));
        self.diagnostics.proxy = Some(proxy.path.clone());
        self.params.insert(ParamKey::Proxy, path_string(&proxy.path));

        Ok(self.proxy.insert(proxy))
    }

    async fn login(&self) -> Result<Session, SessionError> {
        let client = Client::builder().build()?;
        Session::login(&client, &self.config).await
    }

    /// Fill the parameters a transform needs to reach the management platform
    ///
    /// `api_name_key` and `api_version_key` name properties in the config
    /// that hold the API name and version name.
    pub fn prepare_to_connect(
        &mut self,
        api_name_key: &str,
        api_version_key: &str,
    ) -> Result<(), HarnessError> {
        let lookup = |key: &str| {
            self.config
                .property(key)
                .map(str::to_string)
                .ok_or_else(|| HarnessError::MissingProperty(key.to_string()))
        };
        let api_name = lookup(api_name_key)?;
        let api_version_name = lookup(api_version_key)?;

        let params = &mut self.params;
        params.insert(ParamKey::User, self.config.username.as_str());
        params.insert(ParamKey::Password, self.config.password.as_str());
        params.insert(ParamKey::KeyFile, path_string(&self.workspace.keystore()));
        params.insert(ParamKey::KeyPassword, KEY_STORE_PASSWORD);
        params.insert(ParamKey::KeyAliasPassword, ALIAS_PASSWORD);
        params.insert(ParamKey::Export, path_string(&self.workspace.export_dir()));
        params.insert(ParamKey::ApiName, api_name);
        params.insert(ParamKey::ApiVersionName, api_version_name);
        Ok(())
    }

    /// Transform the proxy's outbound side and verify the result
    pub async fn test_outbound_processing(
        &mut self,
        transform: &dyn Transform,
    ) -> Result<VerificationReport, HarnessError> {
        self.test_processing(Direction::Outbound, transform).await
    }

    /// Transform the proxy's inbound side and verify the result
    pub async fn test_inbound_processing(
        &mut self,
        transform: &dyn Transform,
    ) -> Result<VerificationReport, HarnessError> {
        self.test_processing(Direction::Inbound, transform).await
    }

    /// Run `transform`, deploy what it exported, then verify it
    #[instrument(skip(self, transform), fields(transform = transform.name()))]
    pub async fn test_processing(
        &mut self,
        direction: Direction,
        transform: &dyn Transform,
    ) -> Result<VerificationReport, HarnessError> {
        let file_name = self
            .proxy
            .as_ref()
            .map(|p| p.file_name.clone())
            .ok_or(HarnessError::NotPrepared)?;
        info!("Testing {} modified proxy application...", direction);

        // Only what this transform writes may be deployed and verified
        let export_dir = self
            .params
            .path(ParamKey::Export)
            .unwrap_or_else(|| self.workspace.export_dir());
        let exported = export_dir.join(&file_name);
        remove_file(&exported).await?;

        let outcome = transform::invoke(transform, &self.params).await;
        self.diagnostics.transform_outcome(transform.name(), &outcome);

        if !path_exists(&exported).await {
            let error = HarnessError::MissingArtifact {
                path: exported,
                outcome,
            };
            self.diagnostics.failed(Step::Transform, error.to_string());
            return Err(error);
        }

        let deployed = self
            .gateway
            .deploy(&exported, self.config.deploy_timeout)
            .await;
        self.record_deploy(&deployed);
        deployed?;

        let tmp_dir = self.workspace.tmp_dir();
        remove_dir(&tmp_dir).await?;
        match archive::extract(&exported, &tmp_dir).await {
            Ok(files) => self.diagnostics.ok(
                Step::Extract,
                format!("{} files into {}", files.len(), tmp_dir.display()),
            ),
            Err(e) => {
                self.diagnostics.failed(Step::Extract, e.to_string());
                return Err(e.into());
            }
        }

        match verify_extracted(&tmp_dir, direction).await {
            Ok(report) => {
                self.diagnostics.ok(
                    Step::Verify,
                    format!("{} connector uses {}", direction, report.protocol),
                );
                Ok(report)
            }
            Err(e) => {
                self.diagnostics.failed(Step::Verify, e.to_string());
                Err(e.into())
            }
        }
    }

    /// Deploy the HTTPS endpoint app from the resources root
    pub async fn deploy_https(&mut self) -> Result<DeployOutcome, HarnessError> {
        let timeout = self.config.deploy_timeout;
        self.deploy_fixture(HTTPS_TEST_APP, timeout).await
    }

    /// Deploy the SOAP web service app used by WSDL proxies
    pub async fn deploy_https_for_wsdl(&mut self) -> Result<DeployOutcome, HarnessError> {
        let timeout = self.config.wsdl_deploy_timeout;
        self.deploy_fixture(SOAP_SERVICE_APP, timeout).await
    }

    async fn deploy_fixture(
        &mut self,
        name: &str,
        timeout: std::time::Duration,
    ) -> Result<DeployOutcome, HarnessError> {
        let fixture = self.workspace.fixture(name);
        let deployed = self.gateway.deploy(&fixture, timeout).await;
        self.record_deploy(&deployed);
        Ok(deployed?)
    }

    fn record_deploy(&mut self, deployed: &Result<DeployOutcome, DeployError>) {
        match deployed {
            Ok(DeployOutcome::Skipped) => {
                self.diagnostics.ok(Step::Deploy, "skipped, not testing with a gateway")
            }
            Ok(DeployOutcome::Ready { app, waited }) => self.diagnostics.ok(
                Step::Deploy,
                format!("{} ready after {:?}", app, waited.elapsed),
            ),
            Ok(DeployOutcome::NotReady { app, error }) => self
                .diagnostics
                .failed(Step::Deploy, format!("{} not ready\n{}", app, error)),
            Err(e) => self.diagnostics.failed(Step::Deploy, e.to_string()),
        }
    }

    /// GET `host` through the gateway and require a 200
    ///
    /// Returns `None` when not testing with a gateway.
    pub async fn make_test_request(
        &mut self,
        host: &str,
    ) -> Result<Option<ProxyResponse>, HarnessError> {
        self.send_test_request(TestRequest::get(host)).await
    }

    /// POST `body` as `text/plain` to `host` + `path` and require a 200
    pub async fn make_test_post(
        &mut self,
        host: &str,
        path: &str,
        body: &str,
    ) -> Result<Option<ProxyResponse>, HarnessError> {
        self.send_test_request(TestRequest::post(join_uri(host, path), body))
            .await
    }

    async fn send_test_request(
        &mut self,
        request: TestRequest,
    ) -> Result<Option<ProxyResponse>, HarnessError> {
        if !self.gateway.is_live() {
            info!(url = %request.url, "Skipping test request, not testing with a gateway");
            return Ok(None);
        }

        let sent = match TrafficProbe::from_config(&self.config) {
            Ok(probe) => probe.expect_ok(&request).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(response) => {
                self.diagnostics.ok(
                    Step::Request,
                    format!("{} {} -> {}", request.method, request.url, response.status),
                );
                Ok(Some(response))
            }
            Err(e) => {
                self.diagnostics.failed(Step::Request, e.to_string());
                Err(e.into())
            }
        }
    }

    /// Remove the working directories and undeploy the proxy
    ///
    /// Never fails; problems are logged and recorded.
    #[instrument(skip(self))]
    pub async fn teardown(&mut self) {
        self.workspace.clean().await;
        self.diagnostics.ok(Step::Teardown, "working directories removed");

        let Some(proxy) = &self.proxy else {
            return;
        };
        let app = app_name(&proxy.file_name).to_string();
        match self
            .gateway
            .undeploy(&app, self.config.undeploy_timeout)
            .await
        {
            UndeployOutcome::Skipped => {}
            UndeployOutcome::Undeployed => self
                .diagnostics
                .ok(Step::Teardown, format!("{} undeployed", app)),
            UndeployOutcome::ForcedRemoval => {
                warn!(app = %app, "Gateway did not undeploy app in time, removed it");
                self.diagnostics
                    .ok(Step::Teardown, format!("{} removed after undeploy timeout", app))
            }
            UndeployOutcome::Incomplete(cause) => self
                .diagnostics
                .failed(Step::Teardown, format!("{} not undeployed: {}", app, cause)),
        }
    }
}

/// `remove_file` that treats an absent file as success
async fn remove_file(path: &std::path::Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
