//! Lazy resolution of detector model files.
//!
//! Resolution order: user cache directory, then the configured model
//! directory, then a one-time download into the cache. Downloads write to a
//! `.part` file and rename, so a racing duplicate download cannot leave a
//! truncated model behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    Checksum {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
    #[error("downloads disabled and {0} is not cached")]
    DownloadDisabled(String),
}

/// A downloadable model artifact.
pub struct ModelSpec {
    /// File name under the cache/model directory.
    pub name: &'static str,
    pub url: &'static str,
    /// Optional lowercase hex SHA-256 of the file contents.
    pub sha256: Option<&'static str>,
}

/// Platform cache directory for downloaded models.
pub fn model_cache_dir() -> Result<PathBuf, FetchError> {
    dirs::cache_dir()
        .map(|d| d.join("likeness").join("models"))
        .ok_or(FetchError::NoCacheDir)
}

/// Resolve a model file, downloading it on first use.
///
/// Checks the cache directory, then `model_dir`, then downloads. The
/// existence checks mean concurrent callers race at worst into a duplicate
/// download, never a corrupt file.
pub fn resolve(spec: &ModelSpec, model_dir: &Path, allow_download: bool) -> Result<PathBuf, FetchError> {
    let cache_dir = model_cache_dir()?;
    let cached = cache_dir.join(spec.name);
    if cached.exists() {
        return Ok(cached);
    }

    let local = model_dir.join(spec.name);
    if local.exists() {
        return Ok(local);
    }

    if !allow_download {
        return Err(FetchError::DownloadDisabled(spec.name.to_string()));
    }

    fs::create_dir_all(&cache_dir).map_err(FetchError::CacheDir)?;
    tracing::info!(name = spec.name, url = spec.url, "downloading model");
    download(spec, &cached)?;
    Ok(cached)
}

fn download(spec: &ModelSpec, dest: &Path) -> Result<(), FetchError> {
    let response = reqwest::blocking::get(spec.url).map_err(|e| FetchError::Download {
        url: spec.url.to_string(),
        source: e,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            url: spec.url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes().map_err(|e| FetchError::Download {
        url: spec.url.to_string(),
        source: e,
    })?;

    if let Some(expected) = spec.sha256 {
        let actual = hex_digest(&bytes);
        if actual != expected {
            return Err(FetchError::Checksum {
                name: spec.name.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
    }

    // Write complete, then rename: readers only ever see a whole file.
    let temp_path = dest.with_extension("part");
    let mut file = fs::File::create(&temp_path).map_err(|e| FetchError::Write {
        path: temp_path.clone(),
        source: e,
    })?;
    file.write_all(&bytes).map_err(|e| FetchError::Write {
        path: temp_path.clone(),
        source: e,
    })?;
    file.flush().map_err(|e| FetchError::Write {
        path: temp_path.clone(),
        source: e,
    })?;
    drop(file);

    fs::rename(&temp_path, dest).map_err(|e| FetchError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
