//! Named cache stores for offline support.
//!
//! This module provides the host-side storage contract the agent relies on:
//! - Stores are identified by a generation name and created on first open
//! - Entries are keyed by request identity and only hold GET responses
//! - Whole stores are deleted at once; entries are never evicted individually

mod key;
mod memory;
mod storage;
mod traits;

pub use memory::MemoryStorage;
pub use storage::SqliteStorage;
pub use traits::CacheStorage;
