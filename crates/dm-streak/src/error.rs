// error.rs — Error types for streak tracking.

use dm_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreakError {
    /// Reading or writing the day state failed.
    #[error("streak store error: {0}")]
    Store(#[from] StoreError),
}
