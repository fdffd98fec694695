//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Request id: correlation header and access log
//! 2. Rate limiter: reject early, save resources
//! 3. Auth validator: bearer or signed-link token

pub mod auth;
pub mod rate;
pub mod request_id;
