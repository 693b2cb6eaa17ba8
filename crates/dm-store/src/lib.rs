//! # dm-store
//!
//! Local key-value persistence for Daymark.
//!
//! The streak tracker keeps its per-day state here and the sync scheduler
//! persists its pending-action queue here, so both survive a restart.
//! Values are opaque strings; [`json`] adds typed helpers on top.
//!
//! ## Key components
//!
//! - [`KeyValueStore`] — the port (`get`/`set`/`remove`/`set_if_absent`)
//! - [`MemoryKvStore`] — in-process adapter
//! - [`JsonFileKvStore`] — one file per key under a directory

pub mod error;
pub mod file;
pub mod json;
pub mod memory;

pub use error::StoreError;
pub use file::JsonFileKvStore;
pub use memory::MemoryKvStore;

/// Local key-value persistence port.
///
/// Implementations must make `set_if_absent` a single atomic check-then-set:
/// two racing callers must both observe the same stored value.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// Store `value` only if `key` is absent. Returns whichever value is
    /// stored afterwards (the existing one, or `value`).
    fn set_if_absent(&self, key: &str, value: &str) -> Result<String, StoreError>;
}

/// Reject keys that cannot be mapped safely onto a file name.
pub(crate) fn check_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && !key.contains("..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
