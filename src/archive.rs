//! Proxy archive handling
//!
//! Extraction for verification, packing for transforms, and the names the
//! gateway derives from an archive file name.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Error type for archive operations
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid archive {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive entry escapes the target directory: {0}")]
    UnsafeEntry(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive task failed: {0}")]
    Task(String),
}

/// Application name the gateway uses for an archive
///
/// `orders-proxy.zip` deploys as `orders-proxy`. Names without a `.zip`
/// suffix are used as-is.
pub fn app_name(file_name: &str) -> &str {
    file_name.strip_suffix(".zip").unwrap_or(file_name)
}

/// Marker file the gateway keeps while an app is deployed
pub fn anchor_file_name(app: &str) -> String {
    format!("{}-anchor.txt", app)
}

/// Extract `archive` into `dest`, returning the files written
pub async fn extract(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive, &dest))
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

/// Zip the contents of `src_dir` into `dest`, entries relative to `src_dir`
pub async fn pack(src_dir: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let src_dir = src_dir.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || pack_blocking(&src_dir, &dest))
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

fn extract_blocking(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ArchiveError::Io { path, source }
    };
    let zip_err = |source| ArchiveError::Zip {
        path: archive.to_path_buf(),
        source,
    };

    let file = match File::open(archive) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ArchiveError::NotFound(archive.to_path_buf()))
        }
        Err(e) => return Err(io_err(archive)(e)),
    };
    let mut zip = ZipArchive::new(file).map_err(zip_err)?;

    std::fs::create_dir_all(dest).map_err(io_err(dest))?;

    let mut extracted = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(zip_err)?;
        let relative = entry
            .enclosed_name()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| ArchiveError::UnsafeEntry(entry.name().to_string()))?;
        let out = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out).map_err(io_err(&out))?;
            continue;
        }

        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let mut target = File::create(&out).map_err(io_err(&out))?;
        io::copy(&mut entry, &mut target).map_err(io_err(&out))?;
        extracted.push(out);
    }

    debug!(archive = %archive.display(), files = extracted.len(), "Archive extracted");
    Ok(extracted)
}

fn pack_blocking(src_dir: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ArchiveError::Io { path, source }
    };
    let zip_err = |source| ArchiveError::Zip {
        path: dest.to_path_buf(),
        source,
    };

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let mut zip = ZipWriter::new(File::create(dest).map_err(io_err(dest))?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut files = 0;
    let mut pending = vec![src_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = std::fs::read_dir(&dir)
            .map_err(io_err(&dir))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(io_err(&dir))?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let name = entry_name(src_dir, &path);
            if path.is_dir() {
                zip.add_directory(format!("{}/", name), options)
                    .map_err(zip_err)?;
                pending.push(path);
            } else {
                zip.start_file(name, options).map_err(zip_err)?;
                let mut source = File::open(&path).map_err(io_err(&path))?;
                io::copy(&mut source, &mut zip).map_err(io_err(&path))?;
                files += 1;
            }
        }
    }

    zip.finish().map_err(zip_err)?;
    debug!(archive = %dest.display(), files, "Archive packed");
    Ok(files)
}

/// Zip entry name: path relative to `root`, `/`-separated
fn entry_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
