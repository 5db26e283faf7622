//! # repos-ratelimit
//!
//! `repos-ratelimit` is the adaptive rate limiting layer behind the `repos`
//! CLI's GitHub, GitLab and Gitea clients.
//!
//! ## Core Features
//!
//! - **Per-Service Limiters**: One quota-tracking admission gate per provider.
//! - **Provider Feedback**: Resyncs from `X-RateLimit-*`, `RateLimit-*` and `Retry-After` headers.
//! - **Adaptive Backoff**: Tunes backoff aggressiveness from recent quota history.
//! - **Bounded Queueing**: Throttled callers queue up to a per-service capacity and honour cancellation.
//! - **Shared Registry**: Every client of a service consults the same limiter.
//!
//! ## Example
//!
//! ```rust,no_run
//! use repos_ratelimit::ratelimit::{LimiterRegistry, WaitContext};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = LimiterRegistry::new();
//!     let github = registry.get_limiter("github");
//!
//!     if github.wait(&WaitContext::with_timeout(Duration::from_secs(10))).await.is_ok() {
//!         // send the request, then github.observe_response(status, &headers)
//!     }
//!
//!     registry.stop().await;
//!     registry.print_all_stats();
//! }
//! ```

pub mod commands;
pub mod ratelimit;
pub mod utils;
