//! HTTP middleware stack for the wallet web service.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Rate limiting on `/v1/log` (governor)
//!
//! `ApplePass` authentication is an extractor, not a layer, so it only runs
//! for handlers that ask for it.

pub mod apple_pass;
pub mod rate_limit;
pub mod request_id;

pub use apple_pass::ApplePassAuth;
pub use rate_limit::device_log_rate_limiter;
pub use request_id::request_id_middleware;
