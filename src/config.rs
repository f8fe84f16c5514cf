//! Server configuration from flags and `PCBOOK_*` environment variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::service::{ServiceConfig, DEFAULT_MAX_IMAGE_SIZE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max image size must be greater than zero")]
    ZeroImageSize,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "pcbook-server")]
#[command(about = "gRPC laptop catalogue with image upload and ratings")]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "PCBOOK_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PCBOOK_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory uploaded images are written to
    #[arg(long, env = "PCBOOK_IMAGE_FOLDER", default_value = "img")]
    pub image_folder: PathBuf,

    /// Largest accepted image, in bytes
    #[arg(long, env = "PCBOOK_MAX_IMAGE_SIZE", default_value_t = DEFAULT_MAX_IMAGE_SIZE)]
    pub max_image_size: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
        if self.max_image_size == 0 {
            return Err(ConfigError::ZeroImageSize);
        }
        Ok(ServiceConfig {
            max_image_size: self.max_image_size,
        })
    }
}
