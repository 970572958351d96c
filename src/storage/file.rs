//! File storage module
//!
//! Writes downloaded data to the output path.

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::error::{Result, TorrentError};

/// Write `data` to `path`, creating missing parent directories
pub async fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !fs::try_exists(parent).await.unwrap_or(false) {
            debug!("Creating output directory: {}", parent.display());
            fs::create_dir_all(parent).await.map_err(|e| {
                error!("Failed to create directory '{}': {}", parent.display(), e);
                TorrentError::storage_error_full(
                    "failed to create output directory",
                    parent.display().to_string(),
                    e.to_string(),
                )
            })?;
        }
    }

    let write = async {
        let mut file = fs::File::create(path).await?;
        file.write_all(data).await?;
        file.flush().await
    };
    write.await.map_err(|e| {
        error!("Failed to write '{}': {}", path.display(), e);
        TorrentError::storage_error_full("failed to write output file", path.display().to_string(), e.to_string())
    })?;

    info!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}
