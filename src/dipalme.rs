pub mod api;
pub mod client;
pub mod extractor;
pub mod model;
