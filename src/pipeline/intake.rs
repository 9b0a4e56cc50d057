use anyhow::{Context, Result, bail};
use futures::future::join_all;
use log::{error, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::pipeline::UploadedFile;
use crate::pipeline::workspace::Workspace;

/// Move every uploaded blob into the workspace under its original name.
///
/// Moves run concurrently. A failed move is logged and the file is dropped;
/// the returned list holds the destinations that succeeded.
pub async fn intake(workspace: &Workspace, files: Vec<UploadedFile>) -> Vec<PathBuf> {
    let start_time = Instant::now();
    let total = files.len();

    let moves = files.into_iter().map(|file| async move {
        match relocate_into(workspace.path(), &file).await {
            Ok(destination) => {
                info!("File uploaded: {:?}", destination);
                Some(destination)
            }
            Err(err) => {
                error!("Error uploading file: {:?}: {:#}", file.original_name, err);
                discard_blob(&file.temp_path).await;
                None
            }
        }
    });

    let relocated: Vec<PathBuf> = join_all(moves).await.into_iter().flatten().collect();

    info!(duration = &*format!("{:?}", start_time.elapsed());
        "Intake settled: {}/{} files moved into {:?}",
        relocated.len(),
        total,
        workspace.path()
    );
    relocated
}

async fn relocate_into(workspace: &Path, file: &UploadedFile) -> Result<PathBuf> {
    let name = file.original_name.as_str();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        bail!("refusing to place {:?} inside the workspace", name);
    }
    let destination = workspace.join(name);
    move_file(&file.temp_path, &destination).await?;
    Ok(destination)
}

/// Rename, falling back to copy + remove when source and target sit on
/// different filesystems.
pub async fn move_file(source: &Path, destination: &Path) -> Result<()> {
    match tokio::fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::CrossesDevices => {
            tokio::fs::copy(source, destination)
                .await
                .context(format!("failed to copy {:?} to {:?}", source, destination))?;
            tokio::fs::remove_file(source)
                .await
                .context(format!("failed to remove {:?} after copying it", source))?;
            Ok(())
        }
        Err(err) => Err(err).context(format!(
            "failed to move {:?} to {:?}",
            source, destination
        )),
    }
}

/// Best-effort removal of an upload blob that will never reach a workspace.
pub async fn discard_blob(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!("Failed to discard upload blob {:?}: {}", path, err),
    }
}
