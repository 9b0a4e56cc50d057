//! Batch image-to-WebP conversion service.
//!
//! `POST /upload` takes a multipart batch of images, converts every
//! jpg/jpeg/png to WebP inside a per-request workspace, and answers with a zip
//! of the results. The workspace is deleted shortly after the download ends.

#[macro_use]
extern crate rocket;

pub mod api;
pub mod bootstrap;
pub mod common;
pub mod config;
pub mod pipeline;
pub mod utils;

use anyhow::Result;
use rocket::data::{ByteUnit, Limits};

use api::fairings::{cors_fairing, generate_fairing_routes, reaper_shutdown_fairing};
use api::handlers::generate_upload_routes;
use config::AppConfig;
use pipeline::Pipeline;

pub fn build_rocket(config: AppConfig) -> Result<rocket::Rocket<rocket::Build>> {
    let upload_limit = ByteUnit::from(config.upload_limit_bytes());
    let limits = Limits::default()
        .limit("file", upload_limit)
        .limit("data-form", upload_limit);

    let figment = rocket::Config::figment()
        .merge(("address", config.address.clone()))
        .merge(("port", config.port))
        .merge(("limits", limits));

    let pipeline = Pipeline::new(config)?;

    Ok(rocket::custom(figment)
        .manage(pipeline)
        .attach(cors_fairing())
        .attach(reaper_shutdown_fairing())
        .mount("/", generate_upload_routes())
        .mount("/", generate_fairing_routes()))
}
