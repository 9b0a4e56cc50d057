use anyhow::{Context, Result};
use chrono::Utc;
use log::info;
use std::path::{Path, PathBuf};

use crate::common::ARCHIVE_FILE_NAME;

/// The per-request directory every pipeline stage works in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    token: String,
    path: PathBuf,
}

impl Workspace {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn archive_path(&self) -> PathBuf {
        self.path.join(ARCHIVE_FILE_NAME)
    }
}

/// Token derived from the nanosecond wall clock.
///
/// Two requests landing on the same tick produce the same token; `allocate`
/// reports that as an error instead of sharing the directory.
pub fn time_token() -> String {
    let now = Utc::now();
    match now.timestamp_nanos_opt() {
        Some(nanos) => nanos.to_string(),
        None => format!("{}000", now.timestamp_micros()),
    }
}

pub async fn allocate(uploads_root: &Path) -> Result<Workspace> {
    allocate_with_token(uploads_root, time_token()).await
}

pub async fn allocate_with_token(
    uploads_root: &Path,
    token: impl Into<String>,
) -> Result<Workspace> {
    let token = token.into();

    tokio::fs::create_dir_all(uploads_root)
        .await
        .context(format!("failed to create uploads root {:?}", uploads_root))?;

    let path = uploads_root.join(&token);
    // create_dir (not create_dir_all) so an existing workspace is never reused
    tokio::fs::create_dir(&path)
        .await
        .context(format!("failed to create workspace {:?}", path))?;

    info!("Allocated workspace {:?}", path);
    Ok(Workspace { token, path })
}
