// Middleware and extractors: client identification, JSON bodies, admin auth,
// CORS and request throttling

pub mod auth;
pub mod client_ip;
pub mod cors;
pub mod json;
pub mod rate_limiter;

pub use auth::*;
pub use client_ip::*;
pub use cors::*;
pub use json::*;
pub use rate_limiter::*;
