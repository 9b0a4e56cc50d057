use anyhow::{Context, Result};
use log::info;
use rocket::http::{ContentType, Header};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::io::SeekFrom;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::common::DOWNLOAD_FILE_NAME;
use crate::pipeline::PackagedArchive;
use crate::pipeline::lifecycle::Reaper;

/// Hands the workspace to the reaper when dropped.
///
/// Rocket drops the response body once the last byte is written or the
/// client goes away, which is the "response fully sent" signal.
pub struct DeliveryGuard {
    workspace: PathBuf,
    reaper: Reaper,
}

impl DeliveryGuard {
    pub fn new(workspace: impl Into<PathBuf>, reaper: Reaper) -> Self {
        Self {
            workspace: workspace.into(),
            reaper,
        }
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        info!(
            "Response for {:?} finished, cleanup in {:?}",
            self.workspace,
            self.reaper.grace()
        );
        self.reaper.schedule_from_sync(&self.workspace);
    }
}

/// Archive file body that keeps the delivery guard alive until it is dropped.
pub struct GuardedFile {
    file: File,
    _guard: DeliveryGuard,
}

impl AsyncRead for GuardedFile {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_read(cx, buf)
    }
}

impl AsyncSeek for GuardedFile {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
        Pin::new(&mut self.get_mut().file).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<u64>> {
        Pin::new(&mut self.get_mut().file).poll_complete(cx)
    }
}

/// The zip, served as an attachment.
pub struct ArchiveDownload {
    body: GuardedFile,
    len: u64,
}

impl ArchiveDownload {
    /// Open the packaged archive. The guard is taken first, so the workspace
    /// is cleaned up even when opening fails.
    pub async fn open(packaged: PackagedArchive, reaper: Reaper) -> Result<Self> {
        let guard = DeliveryGuard::new(packaged.workspace.path(), reaper);
        let file = File::open(&packaged.archive_path)
            .await
            .context(format!("failed to open archive {:?}", packaged.archive_path))?;
        let len = file
            .metadata()
            .await
            .context("failed to read archive metadata")?
            .len();
        Ok(Self {
            body: GuardedFile {
                file,
                _guard: guard,
            },
            len,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<'r> Responder<'r, 'static> for ArchiveDownload {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'static> {
        Response::build()
            .header(ContentType::ZIP)
            .header(Header::new(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", DOWNLOAD_FILE_NAME),
            ))
            .sized_body(self.len as usize, self.body)
            .ok()
    }
}
