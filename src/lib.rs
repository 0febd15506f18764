pub mod cache;
pub mod config;
pub mod dipalme;
pub mod server;
pub mod tracing;
