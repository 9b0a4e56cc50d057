use anyhow::{Context, Result};
use log::{info, warn};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Instant;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::common::CpuPool;
use crate::pipeline::workspace::Workspace;
use crate::utils::PathExt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub skipped: usize,
    /// Size of the finished zip on disk
    pub bytes: u64,
}

/// Level 0 means no compression, which deflate does not accept.
fn entry_options(compression_level: i64) -> SimpleFileOptions {
    if compression_level == 0 {
        return SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    }
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(compression_level))
}

/// Stream `outputs` into a deflated zip at `archive_path`.
///
/// Each entry is named by its base filename. Missing inputs and non-WebP paths
/// are logged and skipped; every other failure aborts. Returns once the file
/// has been synced to storage.
pub fn write_archive(
    outputs: &[PathBuf],
    archive_path: &Path,
    compression_level: i64,
) -> Result<ArchiveSummary> {
    let file = File::create(archive_path)
        .context(format!("failed to create archive {:?}", archive_path))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = entry_options(compression_level);

    let mut summary = ArchiveSummary::default();

    for output in outputs {
        if !output.is_target_image() {
            warn!("Zip warning: {:?} is not a WebP file, skipping", output);
            summary.skipped += 1;
            continue;
        }

        let entry_name = match output.file_name().and_then(|name| name.to_str()) {
            Some(name) => name.to_string(),
            None => {
                warn!("Zip warning: {:?} has no usable file name, skipping", output);
                summary.skipped += 1;
                continue;
            }
        };

        let input = match File::open(output) {
            Ok(input) => input,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("Zip warning: {:?} is missing, skipping", output);
                summary.skipped += 1;
                continue;
            }
            Err(err) => {
                return Err(err).context(format!("failed to open {:?} for zipping", output));
            }
        };

        zip.start_file(entry_name.as_str(), options)
            .context(format!("failed to start zip entry {:?}", entry_name))?;
        std::io::copy(&mut BufReader::new(input), &mut zip)
            .context(format!("failed to write {:?} into the archive", output))?;
        summary.entries += 1;
    }

    let writer = zip.finish().context("failed to finalize archive")?;
    let file = writer
        .into_inner()
        .map_err(|err| err.into_error())
        .context("failed to flush archive")?;
    file.sync_all().context("failed to sync archive to disk")?;
    summary.bytes = file
        .metadata()
        .context("failed to read archive metadata")?
        .len();

    Ok(summary)
}

/// Build the workspace archive on the worker pool.
pub async fn archive_outputs(
    workspace: &Workspace,
    outputs: Vec<PathBuf>,
    compression_level: i64,
    pool: &CpuPool,
) -> Result<PathBuf> {
    let start_time = Instant::now();
    let archive_path = workspace.archive_path();
    let target = archive_path.clone();

    let summary = pool
        .run(move || write_archive(&outputs, &target, compression_level))
        .await?;

    info!(duration = &*format!("{:?}", start_time.elapsed());
        "WebP images zipped successfully: {} entries, {} skipped, {} bytes",
        summary.entries,
        summary.skipped,
        summary.bytes
    );
    Ok(archive_path)
}
