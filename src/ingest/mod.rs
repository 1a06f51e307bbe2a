pub mod hasher;
pub mod importer;
pub mod scanner;
