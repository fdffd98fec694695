//! API endpoint handlers, one module per resource.

pub mod analysis;
pub mod analyze;
pub mod documents;
pub mod export;
pub mod formats;
pub mod health;
pub mod stats;
