use rocket::Route;

pub mod download;
pub mod upload;

pub fn generate_upload_routes() -> Vec<Route> {
    routes![upload::upload]
}
