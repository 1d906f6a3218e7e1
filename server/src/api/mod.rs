//! API server and routes

pub mod middleware;
pub mod openapi;
pub mod params;
pub mod routes;
mod server;
pub mod transport;
pub mod types;

pub use server::{ApiServer, router};
