//! Proxy archive download
//!
//! Fetches the generated proxy application for an API version and stores
//! it under the workspace's input directory, named after the
//! `content-disposition` filename the platform returns.

use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::config::GatewayConfig;
use crate::session::join_uri;

/// Error type for proxy downloads
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("There is no API with API Name Id: {api_name_id} and API Version Id: {api_version_id}")]
    NoSuchApi {
        api_name_id: String,
        api_version_id: String,
    },

    #[error("content-disposition header has no filename: {0}")]
    MissingFileName(String),

    #[error("refusing unsafe proxy file name: {0}")]
    UnsafeFileName(String),

    #[error("proxy download failed with status {0}")]
    Status(reqwest::StatusCode),

    #[error("proxy download request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Identifies an API version on the management platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRef {
    pub api_name_id: String,
    pub api_version_id: String,
}

impl ApiRef {
    pub fn new(api_name_id: impl Into<String>, api_version_id: impl Into<String>) -> Self {
        Self {
            api_name_id: api_name_id.into(),
            api_version_id: api_version_id.into(),
        }
    }
}

/// A downloaded proxy archive
///
/// `file_name` is the key every later stage uses: the transform writes
/// `export/<file_name>`, the gateway receives `<file_name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyArchive {
    pub file_name: String,
    pub path: PathBuf,
}

/// Download URL for an API version's proxy
pub fn proxy_url(config: &GatewayConfig, api: &ApiRef) -> String {
    let repository = join_uri(&config.proxy_uri, &config.download_proxy_uri);
    join_uri(
        &repository,
        &format!(
            "apis/{}/versions/{}/proxy",
            api.api_name_id, api.api_version_id
        ),
    )
}

/// Extract the file name from a `content-disposition` value
///
/// Takes what follows `filename=` up to the next `;`, with quotes removed.
pub fn parse_file_name(disposition: &str) -> Option<String> {
    const MARKER: &str = "filename=";
    let start = disposition.find(MARKER)? + MARKER.len();
    let raw = disposition[start..].split(';').next().unwrap_or_default();
    let name = raw.replace('"', "").trim().to_string();
    (!name.is_empty()).then_some(name)
}

fn is_safe_file_name(name: &str) -> bool {
    !name.contains(['/', '\\']) && name != "." && name != ".."
}

/// Download a proxy archive into `input_dir`
///
/// `client` must already carry the session's authorization header.
/// A response without `content-disposition` means the API version does not
/// exist; in that case nothing is written to disk.
#[instrument(skip(client, config, input_dir), fields(api_name_id = %api.api_name_id, api_version_id = %api.api_version_id))]
pub async fn download_proxy(
    client: &Client,
    config: &GatewayConfig,
    api: &ApiRef,
    input_dir: &Path,
) -> Result<ProxyArchive, FetchError> {
    let url = proxy_url(config, api);
    info!(url = %url, "Downloading proxy app");

    let mut response = client
        .get(&url)
        .query(&[("gatewayVersion", config.gateway_download_version.as_str())])
        .send()
        .await?;

    let Some(disposition) = response.headers().get(CONTENT_DISPOSITION) else {
        return Err(FetchError::NoSuchApi {
            api_name_id: api.api_name_id.clone(),
            api_version_id: api.api_version_id.clone(),
        });
    };
    let disposition = String::from_utf8_lossy(disposition.as_bytes()).into_owned();

    if !response.status().is_success() {
        return Err(FetchError::Status(response.status()));
    }

    let file_name =
        parse_file_name(&disposition).ok_or(FetchError::MissingFileName(disposition))?;
    if !is_safe_file_name(&file_name) {
        return Err(FetchError::UnsafeFileName(file_name));
    }

    fs::create_dir_all(input_dir)
        .await
        .map_err(|source| FetchError::Write {
            path: input_dir.to_path_buf(),
            source,
        })?;
    let path = input_dir.join(&file_name);

    let written = match save_body(&mut response, &path).await {
        Ok(written) => written,
        Err(e) => {
            if let Err(remove_err) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %remove_err, "Failed to remove partial download");
            }
            return Err(e);
        }
    };

    info!(path = %path.display(), bytes = written, "Proxy app saved");
    Ok(ProxyArchive { file_name, path })
}

async fn save_body(response: &mut reqwest::Response, path: &Path) -> Result<u64, FetchError> {
    let write_err = |source| FetchError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = fs::File::create(path).await.map_err(write_err)?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await.map_err(write_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(write_err)?;

    debug!(path = %path.display(), bytes = written, "Body copied");
    Ok(written)
}
