// json.rs — Typed helpers over the string-valued store.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::KeyValueStore;

/// Read and deserialize a value.
pub fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and write a value.
pub fn set_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// Atomic read-or-create of a typed value. Returns the value that ends up
/// stored.
pub fn get_or_init_json<T: Serialize + DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
    init: &T,
) -> Result<T, StoreError> {
    let raw = serde_json::to_string(init)?;
    let stored = store.set_if_absent(key, &raw)?;
    Ok(serde_json::from_str(&stored)?)
}
