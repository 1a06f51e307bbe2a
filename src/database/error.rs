//! Error types for the metadata store.
//!
//! Store operations surface a single failure signal: whatever the backing
//! engine reported. Stale references and empty names are not errors at this
//! layer, they are absorbed by the operations themselves.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The SQLite engine rejected or failed the operation. Any open
    /// transaction has been rolled back by the time this is observed.
    #[error("store operation failed: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
