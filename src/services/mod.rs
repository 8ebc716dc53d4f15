//! External collaborators behind traits.

pub mod storage;

pub use storage::{BlobStore, FsBlobStore};
