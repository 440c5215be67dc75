use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::PipelineError;
use super::render::PageImage;

/// File name for a 1-based page ordinal. Callers depend on this scheme.
pub fn page_file_name(index: usize) -> String {
    format!("page_{}.png", index)
}

/// Writes every page into `destination`, creating it if needed.
///
/// Not transactional: on failure the pages written so far stay on disk and
/// the error reports how many there were.
pub async fn write_pages(
    pages: &[PageImage],
    destination: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    tokio::fs::create_dir_all(destination)
        .await
        .map_err(|source| PipelineError::OutputDir {
            path: destination.to_path_buf(),
            source,
        })?;

    let mut written = Vec::with_capacity(pages.len());
    for page in pages {
        let path = destination.join(page_file_name(page.index));
        tokio::fs::write(&path, &page.png)
            .await
            .map_err(|source| PipelineError::PageWrite {
                path: path.clone(),
                written: written.len(),
                source,
            })?;
        debug!("Wrote {}", path.display());
        written.push(path);
    }

    info!(
        "Wrote {} PNG file(s) to {}",
        written.len(),
        destination.display()
    );
    Ok(written)
}
