use anyhow::{Context, Result, anyhow};
use futures::future::join_all;
use log::{error, info};
use rocket::State;
use rocket::form::{Errors, Form, FromForm};
use rocket::fs::TempFile;
use rocket::post;
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

use crate::api::handlers::download::ArchiveDownload;
use crate::api::{AppError, AppResult};
use crate::pipeline::{Pipeline, UploadedFile};
use crate::utils::sanitize_file_name;

#[derive(FromForm, Debug)]
pub struct UploadForm<'r> {
    /// Every file part sent under the `images` field
    #[field(name = "images")]
    pub images: Vec<TempFile<'r>>,
}

/// Client-side filename including its extension.
///
/// `TempFile::name` strips the extension, so go through the raw name and
/// keep only its last path segment.
fn get_original_name(file: &TempFile<'_>) -> Option<String> {
    file.raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str())
        .and_then(sanitize_file_name)
}

/// Persist a Rocket temp file into the staging directory under a fresh UUID.
async fn stage_temp_file(file: &mut TempFile<'_>, incoming: &Path) -> Result<UploadedFile> {
    let original_name = get_original_name(file)
        .ok_or_else(|| anyhow!("upload part has no usable filename"))?;
    let size = file.len();
    let temp_path = incoming.join(Uuid::new_v4().to_string());

    file.move_copy_to(&temp_path)
        .await
        .context(format!("failed to stage upload {:?}", original_name))?;

    Ok(UploadedFile {
        temp_path,
        original_name,
        size,
    })
}

#[post("/upload", data = "<form>")]
pub async fn upload(
    pipeline: &State<Pipeline>,
    form: Result<Form<UploadForm<'_>>, Errors<'_>>,
) -> AppResult<ArchiveDownload> {
    let start_time = Instant::now();
    let mut inner_form = match form {
        Ok(form) => form.into_inner(),
        Err(errors) => {
            let error_chain = errors
                .iter()
                .map(|e| anyhow!(e.to_string()))
                .reduce(|acc, e| acc.context(e.to_string()));

            return Err(AppError::bad_request(match error_chain {
                Some(chain) => chain.context("Failed to parse form"),
                None => anyhow!("Failed to parse form with unknown error"),
            }));
        }
    };

    let incoming = pipeline.config().incoming_dir();
    let results = join_all(
        inner_form
            .images
            .iter_mut()
            .map(|file| stage_temp_file(file, &incoming)),
    )
    .await;
    let mut staged = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(uploaded) => staged.push(uploaded),
            Err(err) => error!("Error uploading file: {:#}", err),
        }
    }

    let total_bytes: u64 = staged.iter().map(|file| file.size).sum();
    info!(duration = &*format!("{:?}", start_time.elapsed());
        "Received {} files ({} bytes)",
        staged.len(),
        total_bytes
    );

    let packaged = pipeline.process(staged).await?;
    let download = ArchiveDownload::open(packaged, pipeline.reaper().clone()).await?;

    info!(duration = &*format!("{:?}", start_time.elapsed());
        "Sending {} byte archive",
        download.len()
    );
    Ok(download)
}
