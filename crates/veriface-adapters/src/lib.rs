//! veriface-adapters — concrete backends for the core's ports.
//!
//! Filesystem sources for encrypted model payloads and key material, plus a
//! volatile in-memory embedding store for tests, demos, and daemons that
//! keep their gallery elsewhere.

pub mod fs;
pub mod store;

pub use fs::{FsKeySource, FsModelByteSource};
pub use store::MemoryEmbeddingStore;
