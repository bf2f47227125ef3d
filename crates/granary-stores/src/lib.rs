//! Store backends for Granary
//!
//! Defines the three external-collaborator contracts the pipeline
//! consumes — a key-value record store, a blob store and a web client
//! (reachability probe + artifact transfer) — together with in-memory,
//! filesystem and S3 backends.

pub mod blob;
pub mod record;
pub mod s3;
pub mod web;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use record::{Condition, Filter, FsRecordStore, MemoryRecordStore, RecordStore};
pub use s3::S3BlobStore;
pub use web::{HttpClient, StaticWeb, UrlInfo, WebClient};
