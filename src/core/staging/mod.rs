//! Server-side staging of pushed files.
//!
//! A pushed file is written under the upload directory as
//! `<file_id>_filepush`, checksummed, dispatched, and removed again once
//! every agent has reported.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::platform::{NativePlatform, Platform};

pub struct StagedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub checksum: String,
}

pub async fn stage_push_file(
    upload_dir: &Path,
    file_id: &str,
    content: &[u8],
) -> Result<StagedFile> {
    if !upload_dir.exists() {
        tokio::fs::create_dir_all(upload_dir).await?;
        NativePlatform::restrict_dir_permissions(upload_dir);
        info!("Created upload directory {:?}", upload_dir);
    }

    let path = upload_dir.join(format!("{}_filepush", file_id));
    tokio::fs::write(&path, content).await?;
    NativePlatform::restrict_file_permissions(&path);

    let checksum = hex::encode(Sha256::digest(content));

    Ok(StagedFile {
        path,
        size_bytes: content.len() as u64,
        checksum,
    })
}

/// Best-effort removal after the fan-out has drained.
pub async fn remove_staged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        error!("Failed to delete staged file {:?}: {}", path, e);
    }
}
