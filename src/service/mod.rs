//! gRPC transport for the laptop catalogue.
//!
//! [`LaptopServer`] implements the generated `LaptopService` trait over the
//! three stores. Store failures become gRPC statuses through
//! `From<StoreError> for Status`.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pcbook::service::{self, LaptopServer, ServiceConfig};
//! use pcbook::store::{DiskImageStore, InMemoryLaptopStore, InMemoryRatingStore};
//!
//! let server = LaptopServer::new(
//!     Arc::new(InMemoryLaptopStore::new()),
//!     Arc::new(DiskImageStore::new("img")),
//!     Arc::new(InMemoryRatingStore::new()),
//!     ServiceConfig::default(),
//! );
//!
//! // Compose with other tonic routes
//! let grpc_svc = service::laptop_server(server.clone());
//!
//! // Or serve directly
//! service::serve(server, "0.0.0.0:8080".parse()?).await?;
//! ```

mod context;
mod laptop;

use std::net::SocketAddr;

use tonic::Status;

use crate::pb::LaptopServiceServer;
use crate::store::StoreError;

pub use context::{parse_grpc_timeout, CallContext};
pub use laptop::LaptopServer;

/// Largest image `UploadImage` accepts, in bytes.
pub const DEFAULT_MAX_IMAGE_SIZE: usize = 1 << 20;

/// Limits the handler enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    pub max_image_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
        }
    }
}

impl From<StoreError> for Status {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(id) => {
                Status::already_exists(format!("laptop {id} already exists"))
            }
            StoreError::Aborted(msg) => Status::unknown(msg),
            err @ (StoreError::LockPoisoned(_) | StoreError::Io { .. }) => {
                Status::internal(err.to_string())
            }
        }
    }
}

/// Wrap a `LaptopServer` in the generated tonic service.
pub fn laptop_server(server: LaptopServer) -> LaptopServiceServer<LaptopServer> {
    LaptopServiceServer::new(server)
}

/// Bind and serve the laptop service at `addr`.
pub async fn serve(server: LaptopServer, addr: SocketAddr) -> Result<(), tonic::transport::Error> {
    tracing::info!(%addr, "starting laptop service");
    tonic::transport::Server::builder()
        .add_service(laptop_server(server))
        .serve(addr)
        .await
}
