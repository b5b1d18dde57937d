use clap::Parser;
use log::{error, info};
use server::config::{Args, Config};
use server::network::Server;
use server::persistence;
use std::sync::Arc;

/// Main-method of the application.
/// Parses configuration, loads the world, then serves it until Ctrl+C and saves on the way out.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from(Args::parse());
    let paths = config.paths.clone();

    let world = Arc::new(persistence::load_or_create(&config)?);
    let server = Server::bind(config, Arc::clone(&world)).await?;

    let server_handle = tokio::spawn(server.run());

    // Handle shutdown gracefully
    tokio::select! {
        result = server_handle => {
            if let Err(e) = result {
                error!("Network task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    if world.is_dirty() {
        world.save(&paths).await?;
    }
    Ok(())
}
