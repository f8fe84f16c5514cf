pub mod config;
pub mod pb;
pub mod service;
pub mod store;

pub use config::{ConfigError, ServerConfig};
pub use service::{LaptopServer, ServiceConfig};
