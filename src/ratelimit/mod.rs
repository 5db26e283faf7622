//! Adaptive per-service rate limiting for provider API clients
//!
//! One [`RateLimiter`] per hosting service gates outgoing requests against the
//! provider's quota. Callers [`wait`](RateLimiter::wait) before each request
//! and feed the response headers back with
//! [`observe_response`](RateLimiter::observe_response). A [`LimiterRegistry`]
//! hands every client of a service the same limiter.

// Internal modules - not part of public API
pub(crate) mod clock;
pub(crate) mod config;
pub(crate) mod context;
pub(crate) mod error;
pub(crate) mod headers;
pub(crate) mod history;
pub(crate) mod limiter;
pub(crate) mod pacer;
pub(crate) mod profile;
pub(crate) mod registry;
pub(crate) mod state;
pub(crate) mod stats;

// Test modules
#[cfg(test)]
mod state_tests;

// Public API - curated exports only
pub mod api;

// Re-export key items at module level for convenience
pub use api::*;
