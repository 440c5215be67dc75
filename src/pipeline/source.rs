//! Source resolution: turn a path-or-URL into a local PDF path.
//!
//! Remote sources are streamed into a named temporary file that the caller
//! owns and must release with [`TemporaryArtifact::cleanup`]. Local paths are
//! passed through untouched and are never deleted by the pipeline.

use futures::TryStreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use super::error::PipelineError;

/// Read buffer used while streaming a download to disk.
const CHUNK_SIZE: usize = 8 * 1024;

/// A file created only to support one request.
#[derive(Debug)]
pub struct TemporaryArtifact {
    file: NamedTempFile,
}

impl TemporaryArtifact {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Deletes the file. Failures are logged, never returned.
    pub fn cleanup(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!("Deleted temporary file {}", path.display()),
            Err(e) => warn!(
                "Warning: Failed to delete temp file {}: {}",
                path.display(),
                e
            ),
        }
    }
}

/// The resolved input: either the caller's own file or a downloaded copy.
#[derive(Debug)]
pub enum ResolvedSource {
    Local(PathBuf),
    Downloaded(TemporaryArtifact),
}

impl ResolvedSource {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedSource::Local(path) => path,
            ResolvedSource::Downloaded(artifact) => artifact.path(),
        }
    }

    /// Gives up ownership of the temporary artifact, if there is one.
    pub fn into_artifact(self) -> Option<TemporaryArtifact> {
        match self {
            ResolvedSource::Local(_) => None,
            ResolvedSource::Downloaded(artifact) => Some(artifact),
        }
    }
}

/// True for `http://` and `https://` sources.
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Resolves `source` to a local path, downloading remote sources into
/// `temp_dir` (or the system temp directory).
///
/// Local paths are not checked for existence; a bad path fails at
/// rasterization.
pub async fn resolve(
    client: &Client,
    source: &str,
    temp_dir: Option<&Path>,
) -> Result<ResolvedSource, PipelineError> {
    if is_url(source) {
        download(client, source, temp_dir)
            .await
            .map(ResolvedSource::Downloaded)
    } else {
        debug!("Using local PDF: {}", source);
        Ok(ResolvedSource::Local(PathBuf::from(source)))
    }
}

async fn download(
    client: &Client,
    url: &str,
    temp_dir: Option<&Path>,
) -> Result<TemporaryArtifact, PipelineError> {
    info!(url = %url, "Downloading PDF");

    let mut builder = tempfile::Builder::new();
    builder.prefix("pdf2png-").suffix(".pdf");
    let file = match temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|source| PipelineError::TempFile {
        url: url.to_string(),
        source,
    })?;
    let artifact = TemporaryArtifact { file };

    match stream_to_file(client, url, artifact.path()).await {
        Ok(size) => {
            info!(url = %url, size = size, path = %artifact.path().display(), "Download completed");
            Ok(artifact)
        }
        Err(e) => {
            warn!(url = %url, "Download failed: {}", e);
            artifact.cleanup();
            Err(e)
        }
    }
}

async fn stream_to_file(client: &Client, url: &str, path: &Path) -> Result<u64, PipelineError> {
    let failed = |reason: String| PipelineError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("HTTP {}", status)));
    }

    let stream = response.bytes_stream().map_err(std::io::Error::other);
    let mut reader = StreamReader::new(Box::pin(stream));

    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| failed(format!("cannot open temporary file: {}", e)))?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .await
            .map_err(|e| failed(format!("cannot write temporary file: {}", e)))?;
        total += n as u64;
    }
    file.flush()
        .await
        .map_err(|e| failed(format!("cannot flush temporary file: {}", e)))?;

    Ok(total)
}
