use anyhow::{Context, Result, bail};
use dotenv::dotenv;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_PREFIX: &str = "WEBP_ZIPPER_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Address Rocket binds to
    pub address: String,
    pub port: u16,
    /// Parent of every request workspace, relative to the working directory
    pub uploads_root: PathBuf,
    /// Wait between the end of a response and the workspace deletion
    pub grace_delay_ms: u64,
    /// Deflate level for archive entries (1-9), 0 stores them uncompressed
    pub compression_level: i64,
    /// Size of the cpu-intensive worker pool, 0 means one per CPU
    pub worker_threads: usize,
    /// Upload size limit (MB), applied to both single files and the whole form
    pub upload_limit_mb: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 3000,
            uploads_root: PathBuf::from("uploads"),
            grace_delay_ms: 10_000,
            compression_level: 5,
            worker_threads: 0,
            upload_limit_mb: 2048, // 2GB
        }
    }
}

impl AppConfig {
    /// Read `.env` (if any) and the `WEBP_ZIPPER_*` environment variables.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        let config = envy::prefixed(ENV_PREFIX)
            .from_env::<AppConfig>()
            .context("Failed to read configuration from environment")?;
        config.validate()?;
        info!("Loaded config: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0..=9).contains(&self.compression_level) {
            bail!(
                "compression level must be between 0 and 9, got {}",
                self.compression_level
            );
        }
        if self.upload_limit_mb == 0 {
            bail!("upload limit must be greater than zero");
        }
        Ok(())
    }

    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    pub fn upload_limit_bytes(&self) -> u64 {
        self.upload_limit_mb.saturating_mul(1024 * 1024)
    }

    pub fn incoming_dir(&self) -> PathBuf {
        self.uploads_root.join(crate::common::INCOMING_DIR_NAME)
    }
}
