//! Durable client-side storage for compatibility verdicts.

mod compat;
mod kv;

pub use compat::{
    CompatibilityStatus, CompatibilityStore, CompatibilityVerdict, StoredCompatibilityRecord,
    VerdictLookup, COMPILER_KEY_PREFIX, DEFAULT_VERDICT_TTL, LAST_USED_VERSION_KEY,
};
pub use kv::{FileStore, KeyValueStore, MemoryStore, StorageError};
