use rocket::fairing::AdHoc;
use rocket::http::{Header, Method, Status};
use rocket::{Route, options};
use std::path::PathBuf;

use crate::pipeline::Pipeline;

pub fn generate_fairing_routes() -> Vec<Route> {
    routes![preflight]
}

/// Answers CORS preflight for any path.
#[options("/<_path..>")]
pub fn preflight(_path: PathBuf) -> Status {
    Status::NoContent
}

/// Allow browser clients from any origin.
pub fn cors_fairing() -> AdHoc {
    AdHoc::on_response("CORS", |req, res| {
        Box::pin(async move {
            res.set_header(Header::new("Access-Control-Allow-Origin", "*"));
            if req.method() == Method::Options {
                res.set_header(Header::new(
                    "Access-Control-Allow-Methods",
                    "POST, GET, OPTIONS",
                ));
                res.set_header(Header::new("Access-Control-Allow-Headers", "*"));
            }
        })
    })
}

/// Cut pending cleanup timers short when Rocket shuts down.
pub fn reaper_shutdown_fairing() -> AdHoc {
    AdHoc::on_shutdown("Workspace reaper", |rocket| {
        Box::pin(async move {
            if let Some(pipeline) = rocket.state::<Pipeline>() {
                pipeline.reaper().shutdown().await;
            }
        })
    })
}
