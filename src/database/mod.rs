pub mod associations;
pub mod error;
pub mod repo;
pub mod schema;
pub mod taxonomy;
