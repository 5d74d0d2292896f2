// Library interface for pocketnews modules
// This allows tests and the binary to import modules

pub mod catalog;
pub mod engagement;
pub mod error;
pub mod feed;
pub mod ingestion;
pub mod llm;
pub mod models;
pub mod retention;
pub mod scheduler;
pub mod server;
pub mod sources;
pub mod storage;
pub mod translation;
