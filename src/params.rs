//! Input parameters handed to a transform
//!
//! A transform receives a fixed set of named settings: where the downloaded
//! proxy is, where to write the modified one, and the keystore to bundle.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::workspace::Workspace;

/// Keystore password used by the test keystore
pub const KEY_STORE_PASSWORD: &str = "keyStorePassword";

/// Key alias password used by the test keystore
pub const ALIAS_PASSWORD: &str = "secret";

/// The recognized parameter names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamKey {
    /// Keystore password
    KeyPassword,
    /// Keystore file path
    KeyFile,
    /// Key alias password
    KeyAliasPassword,
    /// Directory the transform writes the modified proxy to
    Export,
    /// Path of the downloaded proxy archive
    Proxy,
    /// Platform user
    User,
    /// Platform password
    Password,
    /// API name on the platform
    ApiName,
    /// API version name on the platform
    ApiVersionName,
}

impl ParamKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamKey::KeyPassword => "keyPassword",
            ParamKey::KeyFile => "keyFile",
            ParamKey::KeyAliasPassword => "keyAliasPassword",
            ParamKey::Export => "export",
            ParamKey::Proxy => "proxy",
            ParamKey::User => "user",
            ParamKey::Password => "password",
            ParamKey::ApiName => "apiName",
            ParamKey::ApiVersionName => "apiVersionName",
        }
    }

    fn is_secret(self) -> bool {
        matches!(
            self,
            ParamKey::KeyPassword | ParamKey::KeyAliasPassword | ParamKey::Password
        )
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter mapping passed by reference to a transform
#[derive(Clone, Default, PartialEq, Eq)]
pub struct InputParams {
    values: BTreeMap<ParamKey, String>,
}

impl InputParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keystore and export settings every transform gets
    pub fn for_workspace(workspace: &Workspace) -> Self {
        let mut params = Self::new();
        params.insert(ParamKey::KeyPassword, KEY_STORE_PASSWORD);
        params.insert(ParamKey::KeyFile, path_string(&workspace.keystore()));
        params.insert(ParamKey::KeyAliasPassword, ALIAS_PASSWORD);
        params.insert(ParamKey::Export, path_string(&workspace.export_dir()));
        params
    }

    pub fn insert(&mut self, key: ParamKey, value: impl Into<String>) -> Option<String> {
        self.values.insert(key, value.into())
    }

    pub fn get(&self, key: ParamKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// A parameter interpreted as a filesystem path
    pub fn path(&self, key: ParamKey) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    pub fn contains(&self, key: ParamKey) -> bool {
        self.values.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for InputParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.values {
            if key.is_secret() {
                map.entry(&key.as_str(), &"<redacted>");
            } else {
                map.entry(&key.as_str(), value);
            }
        }
        map.finish()
    }
}

pub(crate) fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
