//! Public API for the ratelimit module.
//!
//! This module provides the stable public API for rate limiting including:
//! - Per-service limiters and the shared registry
//! - Service profiles and their TOML overrides
//! - Provider header parsing
//! - Statistics and reports
//!
//! The limiter state machine and pacing loop are not exposed through this API.

// Limiters
pub use super::context::WaitContext;
pub use super::limiter::RateLimiter;
pub use super::registry::{LimiterRegistry, RegistrySnapshot};

// Errors
pub use super::error::{ConfigError, RateLimitError};

// Profiles and configuration
pub use super::config::{CONFIG_ENV_VAR, PACING_TICK};
pub use super::profile::{ProfileOverride, ProfileOverrides, ProfileTable, ServiceProfile};

// Provider feedback
pub use super::headers::RateLimitFeedback;
pub use super::state::QuotaSnapshot;

// Statistics
pub use super::stats::{LimiterPhase, LimiterReport, LimiterStats, QuotaStatus};
