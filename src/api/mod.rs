pub mod fairings;
pub mod handlers;

use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use serde_json::json;
use std::io::Cursor;

use crate::common::GENERIC_FAILURE_MESSAGE;
use crate::common::errors::handle_error;

/// Any failure the client gets to see.
///
/// The whole context chain goes to the log; the body only carries the
/// generic message, so the client cannot tell which stage failed.
#[derive(Debug)]
pub struct AppError {
    pub status: Status,
    pub error: anyhow::Error,
}

impl AppError {
    pub fn bad_request(error: anyhow::Error) -> Self {
        AppError {
            status: Status::BadRequest,
            error,
        }
    }
}

#[rocket::async_trait]
impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'o> {
        let _ = handle_error(self.error.context("Error uploading, converting, and zipping images"));

        let body = json!({
            "error": GENERIC_FAILURE_MESSAGE,
        })
        .to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl<E> From<E> for AppError
where
    anyhow::Error: From<E>,
{
    fn from(err: E) -> Self {
        AppError {
            status: Status::InternalServerError,
            error: anyhow::Error::from(err),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
