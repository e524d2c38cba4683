//! On-disk layout of a test run
//!
//! Everything lives under one test-resources root:
//!
//! ```text
//! <root>/
//! ├── test.properties
//! ├── mule.jks                      keystore handed to transforms
//! ├── https-test.zip                fixture apps for the live gateway
//! ├── xml-only-soap-web-service.zip
//! ├── input/                        downloaded proxy archive
//! ├── export/                       archive produced by the transform
//! └── tmp/                          extracted copy being verified
//! ```

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::PROPERTIES_FILE;

/// Default test-resources root, relative to the crate under test
pub const DEFAULT_ROOT: &str = "tests/resources";

/// Environment variable overriding the test-resources root
pub const ROOT_ENV: &str = "GATECHECK_RESOURCES";

pub const INPUT_DIR: &str = "input";
pub const EXPORT_DIR: &str = "export";
pub const TMP_DIR: &str = "tmp";

/// Keystore file bundled into HTTPS proxies
pub const KEYSTORE_NAME: &str = "mule.jks";

/// Descriptor inside an extracted proxy archive
pub const DESCRIPTOR_NAME: &str = "proxy.xml";

/// Working directories for one test run
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace rooted at `$GATECHECK_RESOURCES`, or `tests/resources`
    pub fn from_env() -> Self {
        Self::new(env::var_os(ROOT_ENV).map_or_else(|| PathBuf::from(DEFAULT_ROOT), PathBuf::from))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join(INPUT_DIR)
    }

    pub fn export_dir(&self) -> PathBuf {
        self.root.join(EXPORT_DIR)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    pub fn keystore(&self) -> PathBuf {
        self.root.join(KEYSTORE_NAME)
    }

    pub fn properties(&self) -> PathBuf {
        self.root.join(PROPERTIES_FILE)
    }

    /// A file shipped with the test resources, e.g. a fixture app
    pub fn fixture(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Remove leftovers of a previous run before downloading again
    pub async fn reset(&self) -> io::Result<()> {
        remove_dir(&self.export_dir()).await?;
        remove_dir(&self.tmp_dir()).await
    }

    /// Remove all three working directories
    ///
    /// Every directory is attempted even if an earlier one fails; failures
    /// are logged and never returned.
    pub async fn clean(&self) {
        for dir in [self.input_dir(), self.export_dir(), self.tmp_dir()] {
            if let Err(e) = remove_dir(&dir).await {
                warn!(dir = %dir.display(), error = %e, "Failed to remove working directory");
            }
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

/// `remove_dir_all` that treats an absent directory as success
pub(crate) async fn remove_dir(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!(dir = %dir.display(), "Removed directory");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
