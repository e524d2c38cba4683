//! Configuration for a gatecheck test run
//!
//! `GatewayConfig` holds the management platform credentials and endpoints,
//! the gateway location, and the timing used when waiting for the gateway.
//! Load it from a `test.properties` file or build it programmatically.
//!
//! # Example
//!
//! ```
//! use gatecheck::config::GatewayConfig;
//! use std::time::Duration;
//!
//! let config = GatewayConfig::new("https://anypoint.example.com")
//!     .credentials("tester", "s3cret")
//!     .login_uri("/accounts/login")
//!     .download_proxy_uri("/apiplatform/repository/")
//!     .gateway_download_version("3.8.0")
//!     .live_gateway("/opt/gateway/apps/")
//!     .deploy_timeout(Duration::from_secs(30));
//!
//! assert!(config.test_with_gateway);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Properties file name inside the test resources root
pub const PROPERTIES_FILE: &str = "test.properties";

const KEY_USERNAME: &str = "username";
const KEY_PASSWORD: &str = "password";
const KEY_PROXY_URI: &str = "proxyUri";
const KEY_LOGIN_URI: &str = "loginUri";
const KEY_DOWNLOAD_PROXY_URI: &str = "downloadProxyUri";
const KEY_GATEWAY_VERSION: &str = "gatewayVersion";
const KEY_GATEWAY_DOWNLOAD_VERSION: &str = "gatewayDownloadVersion";
const KEY_TEST_WITH_GATEWAY: &str = "testWithGateway";
const KEY_GATEWAY_APP_DIR: &str = "gatewayAppDir";
const KEY_DEPLOY_TIMEOUT: &str = "deployTimeoutSecs";
const KEY_WSDL_DEPLOY_TIMEOUT: &str = "wsdlDeployTimeoutSecs";
const KEY_UNDEPLOY_TIMEOUT: &str = "undeployTimeoutSecs";
const KEY_REQUEST_TIMEOUT: &str = "requestTimeoutSecs";
const KEY_POLL_INTERVAL: &str = "pollIntervalMillis";

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing required property: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

/// Immutable settings for one test run
#[derive(Clone)]
pub struct GatewayConfig {
    /// Management platform user
    pub username: String,

    /// Management platform password
    pub password: String,

    /// Base URI of the management platform
    pub proxy_uri: String,

    /// Login path, appended to `proxy_uri`
    pub login_uri: String,

    /// Proxy repository path, appended to `proxy_uri`
    pub download_proxy_uri: String,

    /// Version of the locally running gateway
    pub gateway_version: String,

    /// Gateway version requested when downloading a proxy
    pub gateway_download_version: String,

    /// Whether to deploy to and call a live gateway
    pub test_with_gateway: bool,

    /// Hot-deploy directory of the live gateway
    pub gateway_app_dir: Option<PathBuf>,

    /// How long to wait for a proxy app to deploy
    pub deploy_timeout: Duration,

    /// How long to wait for the WSDL fixture app to deploy
    pub wsdl_deploy_timeout: Duration,

    /// How long to wait for an app to undeploy
    pub undeploy_timeout: Duration,

    /// How long to keep retrying a test request against the gateway
    pub request_timeout: Duration,

    /// Interval between readiness checks
    pub poll_interval: Duration,

    extra: BTreeMap<String, String>,
}

impl GatewayConfig {
    /// Create a config pointing at a management platform, with default timing
    pub fn new(proxy_uri: impl Into<String>) -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            proxy_uri: proxy_uri.into(),
            login_uri: String::new(),
            download_proxy_uri: String::new(),
            gateway_version: String::new(),
            gateway_download_version: String::new(),
            test_with_gateway: false,
            gateway_app_dir: None,
            deploy_timeout: Duration::from_secs(15),
            wsdl_deploy_timeout: Duration::from_secs(20),
            undeploy_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            extra: BTreeMap::new(),
        }
    }

    /// Set platform credentials
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the login path
    pub fn login_uri(mut self, uri: impl Into<String>) -> Self {
        self.login_uri = uri.into();
        self
    }

    /// Set the proxy repository path
    pub fn download_proxy_uri(mut self, uri: impl Into<String>) -> Self {
        self.download_proxy_uri = uri.into();
        self
    }

    /// Set the local gateway version
    pub fn gateway_version(mut self, version: impl Into<String>) -> Self {
        self.gateway_version = version.into();
        self
    }

    /// Set the gateway version used for proxy downloads
    pub fn gateway_download_version(mut self, version: impl Into<String>) -> Self {
        self.gateway_download_version = version.into();
        self
    }

    /// Deploy to a live gateway watching `apps_dir`
    pub fn live_gateway(mut self, apps_dir: impl Into<PathBuf>) -> Self {
        self.test_with_gateway = true;
        self.gateway_app_dir = Some(apps_dir.into());
        self
    }

    /// Set the deploy timeout
    pub fn deploy_timeout(mut self, timeout: Duration) -> Self {
        self.deploy_timeout = timeout;
        self
    }

    /// Set the WSDL fixture deploy timeout
    pub fn wsdl_deploy_timeout(mut self, timeout: Duration) -> Self {
        self.wsdl_deploy_timeout = timeout;
        self
    }

    /// Set the undeploy timeout
    pub fn undeploy_timeout(mut self, timeout: Duration) -> Self {
        self.undeploy_timeout = timeout;
        self
    }

    /// Set the test request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the readiness polling interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Add an arbitrary property, readable with [`GatewayConfig::property`]
    pub fn property_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Look up a property that is not one of the recognized keys
    pub fn property(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    /// Load from a properties file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_properties(&text)
    }

    /// Parse from the text of a properties file
    pub fn from_properties(text: &str) -> Result<Self, ConfigError> {
        let mut props = parse_properties(text);

        let proxy_uri = props
            .remove(KEY_PROXY_URI)
            .ok_or(ConfigError::Missing(KEY_PROXY_URI))?;
        let mut config = Self::new(proxy_uri);

        let mut take = |key: &str| props.remove(key).unwrap_or_default();
        config.username = take(KEY_USERNAME);
        config.password = take(KEY_PASSWORD);
        config.login_uri = take(KEY_LOGIN_URI);
        config.download_proxy_uri = take(KEY_DOWNLOAD_PROXY_URI);
        config.gateway_version = take(KEY_GATEWAY_VERSION);
        config.gateway_download_version = take(KEY_GATEWAY_DOWNLOAD_VERSION);
        // Same leniency as Boolean.valueOf: anything but "true" is false
        config.test_with_gateway = take(KEY_TEST_WITH_GATEWAY).eq_ignore_ascii_case("true");

        config.gateway_app_dir = props.remove(KEY_GATEWAY_APP_DIR).map(PathBuf::from);
        if config.test_with_gateway && config.gateway_app_dir.is_none() {
            return Err(ConfigError::Missing(KEY_GATEWAY_APP_DIR));
        }

        if let Some(secs) = take_number(&mut props, KEY_DEPLOY_TIMEOUT)? {
            config.deploy_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = take_number(&mut props, KEY_WSDL_DEPLOY_TIMEOUT)? {
            config.wsdl_deploy_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = take_number(&mut props, KEY_UNDEPLOY_TIMEOUT)? {
            config.undeploy_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = take_number(&mut props, KEY_REQUEST_TIMEOUT)? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(millis) = take_number(&mut props, KEY_POLL_INTERVAL)? {
            config.poll_interval = Duration::from_millis(millis);
        }

        config.extra = props;
        Ok(config)
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("proxy_uri", &self.proxy_uri)
            .field("login_uri", &self.login_uri)
            .field("download_proxy_uri", &self.download_proxy_uri)
            .field("gateway_version", &self.gateway_version)
            .field("gateway_download_version", &self.gateway_download_version)
            .field("test_with_gateway", &self.test_with_gateway)
            .field("gateway_app_dir", &self.gateway_app_dir)
            .field("deploy_timeout", &self.deploy_timeout)
            .field("undeploy_timeout", &self.undeploy_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

fn take_number(
    props: &mut BTreeMap<String, String>,
    key: &str,
) -> Result<Option<u64>, ConfigError> {
    match props.remove(key) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value,
            }),
    }
}

/// Parse Java-style properties: `key=value` or `key: value`, `#`/`!` comments,
/// trailing backslash continues a line
fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    let mut pending = String::new();

    for raw in text.lines() {
        let line = raw.trim_start();
        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        if let Some(continued) = line.strip_suffix('\\') {
            pending.push_str(continued);
            continue;
        }
        pending.push_str(line);

        let entry = std::mem::take(&mut pending);
        let (key, value) = match entry.find(['=', ':']) {
            Some(idx) => (&entry[..idx], &entry[idx + 1..]),
            None => (entry.as_str(), ""),
        };
        props.insert(key.trim().to_string(), value.trim().to_string());
    }

    props
}
