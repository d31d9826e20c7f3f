//! Shared infrastructure utilities for Warden.
//!
//! This crate provides cross-cutting utilities that the tool crate needs
//! but that don't belong in the domain-pure `warden-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp sibling + rename)
//! - **`digest`**: SHA-256 content digests in lowercase hex

pub mod atomic_write;
pub mod digest;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, PersistMode,
    atomic_write_new_with_options, atomic_write_with_options,
};
pub use digest::{digests_match, sha256_hex};
