//! Shared infrastructure utilities for tally.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename), used by the
//!   file-backed offer cache so a crash mid-write never leaves a truncated store.

pub mod atomic_write;

pub use atomic_write::{SyncPolicy, atomic_write_with_sync, recover_bak_file};
