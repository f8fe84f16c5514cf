//! Wire messages and the generated `LaptopService` glue.
//!
//! Messages are plain prost structs (standard protobuf wire format, no
//! `.proto` file). The server trait and client are generated by `build.rs`
//! with `tonic_build::manual`.
//!
//! ## RPCs
//!
//! - `CreateLaptop` (unary) — store a laptop, returning its id.
//! - `SearchLaptop` (server streaming) — one response per matching laptop.
//! - `UploadImage` (client streaming) — an `info` header, then raw chunks.
//! - `RateLaptop` (bidirectional) — one running aggregate per score sent.

// ---------------------------------------------------------------------------
// Catalogue entities
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct Laptop {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub brand: String,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(message, optional, tag = "4")]
    pub cpu: Option<Cpu>,
    #[prost(message, optional, tag = "5")]
    pub ram: Option<Memory>,
    #[prost(double, tag = "6")]
    pub price_usd: f64,
    #[prost(uint32, tag = "7")]
    pub release_year: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Cpu {
    #[prost(string, tag = "1")]
    pub brand: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(uint32, tag = "3")]
    pub number_cores: u32,
    #[prost(uint32, tag = "4")]
    pub number_threads: u32,
    #[prost(double, tag = "5")]
    pub min_ghz: f64,
    #[prost(double, tag = "6")]
    pub max_ghz: f64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Memory {
    #[prost(uint64, tag = "1")]
    pub value: u64,
    #[prost(enumeration = "MemoryUnit", tag = "2")]
    pub unit: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MemoryUnit {
    Unknown = 0,
    Bit = 1,
    Byte = 2,
    Kilobyte = 3,
    Megabyte = 4,
    Gigabyte = 5,
    Terabyte = 6,
}

/// Threshold conditions applied by `SearchLaptop`.
///
/// A non-positive `max_price_usd` means "no ceiling"; the other thresholds
/// are lower bounds and their zero value admits everything.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Filter {
    #[prost(double, tag = "1")]
    pub max_price_usd: f64,
    #[prost(uint32, tag = "2")]
    pub min_cpu_cores: u32,
    #[prost(double, tag = "3")]
    pub min_cpu_ghz: f64,
    #[prost(message, optional, tag = "4")]
    pub min_ram: Option<Memory>,
}

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct CreateLaptopRequest {
    #[prost(message, optional, tag = "1")]
    pub laptop: Option<Laptop>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CreateLaptopResponse {
    #[prost(string, tag = "1")]
    pub id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SearchLaptopRequest {
    #[prost(message, optional, tag = "1")]
    pub filter: Option<Filter>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SearchLaptopResponse {
    #[prost(message, optional, tag = "1")]
    pub laptop: Option<Laptop>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UploadImageRequest {
    #[prost(oneof = "upload_image_request::Data", tags = "1, 2")]
    pub data: Option<upload_image_request::Data>,
}

pub mod upload_image_request {
    /// First message carries `Info`, every later one `ChunkData`.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "1")]
        Info(super::ImageInfo),
        #[prost(bytes, tag = "2")]
        ChunkData(Vec<u8>),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ImageInfo {
    #[prost(string, tag = "1")]
    pub laptop_id: String,
    /// File suffix including the dot, e.g. `.jpg`.
    #[prost(string, tag = "2")]
    pub image_type: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UploadImageResponse {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(uint32, tag = "2")]
    pub size: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RateLaptopRequest {
    #[prost(string, tag = "1")]
    pub laptop_id: String,
    #[prost(double, tag = "2")]
    pub score: f64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RateLaptopResponse {
    #[prost(string, tag = "1")]
    pub laptop_id: String,
    #[prost(uint32, tag = "2")]
    pub rated_count: u32,
    #[prost(double, tag = "3")]
    pub average_score: f64,
}

impl UploadImageRequest {
    pub fn info(laptop_id: impl Into<String>, image_type: impl Into<String>) -> Self {
        Self {
            data: Some(upload_image_request::Data::Info(ImageInfo {
                laptop_id: laptop_id.into(),
                image_type: image_type.into(),
            })),
        }
    }

    pub fn chunk(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Some(upload_image_request::Data::ChunkData(bytes.into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Generated service trait + server/client
// ---------------------------------------------------------------------------

include!(concat!(env!("OUT_DIR"), "/pcbook.LaptopService.rs"));

pub use laptop_service_client::LaptopServiceClient;
pub use laptop_service_server::{LaptopService, LaptopServiceServer};
