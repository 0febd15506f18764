pub mod listener;
pub mod routes;
