pub mod zip_export;
