//! HTTP API: router, middleware, endpoints and server lifecycle.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::build_router;
pub use server::{shutdown_signal, start_server, ApiServer};
pub use types::ApiContext;
