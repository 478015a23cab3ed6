//! Object storage for content-proof videos.

mod client;
mod error;
mod retry;

pub use client::{StorageClient, StoredObject};
pub use error::StorageError;
