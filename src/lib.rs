//! Image tagging store: a two-level dimension/tag taxonomy over imported
//! files, AND/OR tag search, and store-relative paths so the whole store
//! directory can be relocated.

pub mod archive;
pub mod database;
pub mod ingest;
pub mod media;
pub mod paths;
pub mod search;
pub mod utils;
