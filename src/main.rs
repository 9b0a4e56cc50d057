use anyhow::Result;
use log::{error, info};

use webp_zipper::bootstrap::setup::initialize_logger;
use webp_zipper::build_rocket;
use webp_zipper::config::AppConfig;

#[rocket::main]
async fn main() -> Result<()> {
    initialize_logger();

    let config = AppConfig::load()?;
    let port = config.port;

    let rocket_instance = build_rocket(config)?.ignite().await?;
    info!("Server is running on port {}", port);

    if let Err(e) = rocket_instance.launch().await {
        error!("Rocket server failed: {}", e);
        return Err(anyhow::Error::from(e));
    }
    Ok(())
}
