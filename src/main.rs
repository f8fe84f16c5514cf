use std::sync::Arc;

use clap::Parser;
use pcbook::service::{self, LaptopServer};
use pcbook::store::{DiskImageStore, InMemoryLaptopStore, InMemoryRatingStore};
use pcbook::ServerConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pcbook=info,pcbook_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::parse();
    let service_config = match config.service_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Image folder: {}, max image size: {} bytes",
        config.image_folder.display(),
        service_config.max_image_size
    );

    let server = LaptopServer::new(
        Arc::new(InMemoryLaptopStore::new()),
        Arc::new(DiskImageStore::new(config.image_folder.clone())),
        Arc::new(InMemoryRatingStore::new()),
        service_config,
    );

    if let Err(e) = service::serve(server, config.socket_addr()).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
