//! HTTP API for the plan store

pub mod handlers;
pub mod routes;

pub use routes::create_router;
