//! Per-request processing pipeline.
//!
//! Stages run strictly in order, each one over the request workspace:
//! - **workspace**: allocate the isolated directory
//! - **intake**: move uploaded blobs in, dropping the ones that fail
//! - **convert**: turn jpg/jpeg/png entries into WebP siblings, failing fast
//! - **archive**: stream the WebP files into one zip
//! - **lifecycle**: delete the workspace once the response is gone

pub mod archive;
pub mod convert;
pub mod intake;
pub mod lifecycle;
pub mod workspace;

use anyhow::{Context, Result};
use futures::future::join_all;
use log::info;
use std::path::PathBuf;
use std::time::Instant;

use crate::bootstrap::setup::initialize_folder;
use crate::common::CpuPool;
use crate::config::AppConfig;
use lifecycle::Reaper;
use workspace::Workspace;

/// A blob handed over by the upload boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Where the blob currently lives; intake moves it away from here
    pub temp_path: PathBuf,
    /// Client-side filename, reused verbatim inside the workspace
    pub original_name: String,
    pub size: u64,
}

/// Outcome of a successful run: the workspace and the archive inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArchive {
    pub workspace: Workspace,
    pub archive_path: PathBuf,
}

pub struct Pipeline {
    config: AppConfig,
    pool: CpuPool,
    reaper: Reaper,
}

impl Pipeline {
    /// Creates the uploads root and staging directory if absent.
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        initialize_folder(&config)?;
        let pool = CpuPool::new(config.worker_threads)?;
        let reaper = Reaper::new(config.grace_delay());
        info!(
            "Pipeline ready: uploads root {:?}, {} worker threads, grace delay {:?}",
            config.uploads_root,
            pool.num_threads(),
            reaper.grace()
        );
        Ok(Self {
            config,
            pool,
            reaper,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    /// Allocate, intake, convert and archive one batch.
    ///
    /// If allocation fails the staged blobs are discarded. On failure after
    /// allocation the workspace is handed to the reaper before the error is
    /// returned.
    pub async fn process(&self, files: Vec<UploadedFile>) -> Result<PackagedArchive> {
        let start_time = Instant::now();
        let workspace = match workspace::allocate(&self.config.uploads_root).await {
            Ok(workspace) => workspace,
            Err(err) => {
                // nothing will move the staged blobs out of the staging directory
                join_all(files.iter().map(|file| intake::discard_blob(&file.temp_path))).await;
                return Err(err.context("failed to allocate request workspace"));
            }
        };

        match self.run_stages(&workspace, files).await {
            Ok(archive_path) => {
                info!(duration = &*format!("{:?}", start_time.elapsed());
                    "Batch {} packaged into {:?}",
                    workspace.token(),
                    archive_path
                );
                Ok(PackagedArchive {
                    workspace,
                    archive_path,
                })
            }
            Err(err) => {
                self.reaper.schedule(workspace.path());
                Err(err)
            }
        }
    }

    async fn run_stages(&self, workspace: &Workspace, files: Vec<UploadedFile>) -> Result<PathBuf> {
        intake::intake(workspace, files).await;

        let outputs = convert::convert_workspace(workspace, &self.pool)
            .await
            .context("failed to convert images to WebP")?;

        archive::archive_outputs(
            workspace,
            outputs,
            self.config.compression_level,
            &self.pool,
        )
        .await
        .context("failed to zip WebP images")
    }
}
