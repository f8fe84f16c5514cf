//! Concurrency-safe stores behind the laptop service.
//!
//! Each store owns its map and hands out copies only. The service holds
//! them as `Arc<dyn ...>` so alternative backends can be swapped in.

mod error;
mod filter;
mod image;
mod laptop;
mod rating;

pub use error::StoreError;
pub use filter::{matches as filter_matches, to_bits};
pub use image::{DiskImageStore, ImageInfo, ImageStore};
pub use laptop::{InMemoryLaptopStore, LaptopStore, Visit};
pub use rating::{InMemoryRatingStore, Rating, RatingStore};
