//! HTTP middleware: client identification, rate limiting, request ids,
//! CORS and security headers.

pub mod cors;
pub mod ip;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use rate_limit::RateLimiter;
