use std::io;

use thiserror::Error;

/// Error type shared by the laptop, image and rating stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A laptop with this id is already stored.
    #[error("laptop already exists: {0}")]
    AlreadyExists(String),
    /// The store's lock was poisoned by a panicking holder.
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),
    /// Writing an image blob failed. The partial file is left in place.
    #[error("cannot write image {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    /// A search visitor gave up, e.g. because the response stream closed.
    #[error("search aborted: {0}")]
    Aborted(String),
}
