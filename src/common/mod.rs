pub mod errors;

use anyhow::{Context, Result};
use log::error;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::oneshot;

pub const SOURCE_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub const TARGET_EXTENSION: &str = "webp";

/// Name of the archive inside each workspace.
pub const ARCHIVE_FILE_NAME: &str = "webp_images.zip";

/// Suggested filename for the download.
pub const DOWNLOAD_FILE_NAME: &str = "webp_images.zip";

/// Directory under the uploads root where raw multipart blobs wait for intake.
pub const INCOMING_DIR_NAME: &str = ".incoming";

pub const GENERIC_FAILURE_MESSAGE: &str =
    "An error occurred during image upload, conversion, and zip";

// Rayon thread pool for compute-intensive tasks (WebP encoding, deflate).
// It does not touch the global Rayon pool, and its size caps how many heavy
// jobs run at once across all requests.
pub struct CpuPool {
    pool: ThreadPool,
}

impl CpuPool {
    /// `num_threads == 0` lets rayon pick the number of CPUs.
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("cpu-intensive-worker-{}", i))
            .panic_handler(|_| error!("A job panicked on the cpu-intensive worker pool"))
            .build()
            .context("Failed to build worker rayon pool")?;
        Ok(Self { pool })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run a blocking job on the pool and await its result without stalling
    /// the async runtime.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            let _ = tx.send(job());
        });
        rx.await
            .context("worker pool dropped the job before it finished")?
    }
}
