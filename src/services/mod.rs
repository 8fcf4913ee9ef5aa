//! Services supporting the HTTP layer

pub mod storage;

pub use storage::{CategoryCounts, FileStorageService, StorageStats, StoredPair};
