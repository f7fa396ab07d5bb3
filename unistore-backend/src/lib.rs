//! # unistore Backend
//!
//! Storage backend abstraction for volumes, export policies, locks and
//! snapshots.
//!
//! This crate provides a unified interface for different storage systems:
//! - **Memory** (reference) - Keeps everything in process, follows the contract to the letter
//! - **NetApp** - Drives an ONTAP filer through a [`FilerClient`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          StorageBackend Trait           │
//! │ (get_volume, create_policy, snapshots)  │
//! └─────────────────────┬───────────────────┘
//!                       │
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │   MemoryBackend   │     │   NetappBackend   │
//! │    (in-memory)    │     │  (FilerClient)    │
//! └───────────────────┘     └───────────────────┘
//!         │                           │
//!         └─────────────┬─────────────┘
//!                       ▼
//!        schema validation / error annotation
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use unistore_backend::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     let mut fields = serde_json::Map::new();
//!     fields.insert("size_total".into(), 100.into());
//!
//!     backend.create_volume("vol1", fields).await.unwrap();
//!     backend.create_snapshot("vol1", "snap1").await.unwrap();
//!     backend.create_policy("vol1", "p1", &["10.0.0.0/24".into()]).await.unwrap();
//! }
//! ```

pub mod error;
pub mod fields;
pub mod memory;
pub mod netapp;
pub mod schema;
pub mod traits;
pub mod types;

pub use error::{Annotate, ErrorKind, Result, StorageError};
pub use memory::{Inventory, MemoryBackend, StoredSnapshot, DEFAULT_FILER_ADDRESS};
pub use netapp::{FilerClient, FilerError, MockFiler, NetappBackend, VolumeKey};
pub use schema::{normalize_volume, normalize_volumes, Validator, VOLUME_SCHEMA};
pub use traits::StorageBackend;
pub use types::{ExportPolicy, Record, Snapshot, Volume};
