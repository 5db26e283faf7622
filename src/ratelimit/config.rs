//! Configuration constants and settings

use std::time::Duration;

// Pacing loop
//
// The background loop wakes on this interval to drain queued waiters even when
// no new request arrives. Deadline-bound waiters observe at most one tick of
// extra latency before they are admitted.
pub const PACING_TICK: Duration = Duration::from_millis(100);

// Quota history kept for adaptation
pub const HISTORY_CAPACITY: usize = 100;
pub const ADAPTATION_SAMPLE_SIZE: usize = 10;

// A snapshot counts as throttled below this remaining/limit ratio
pub const THROTTLED_QUOTA_RATIO: f64 = 0.10;

// Hysteresis thresholds over the last ADAPTATION_SAMPLE_SIZE snapshots
pub const THROTTLED_MAJORITY: usize = 5; // more than this → back off harder
pub const THROTTLED_MINORITY: usize = 2; // fewer than this → relax

// Adaptive multiplier bounds and step factors
pub const MULTIPLIER_FLOOR: f64 = 1.2;
pub const MULTIPLIER_CEILING: f64 = 3.0;
pub const MULTIPLIER_STEP_UP: f64 = 1.1;
pub const MULTIPLIER_STEP_DOWN: f64 = 0.9;

// Adaptive minimum backoff step factors and floor
pub const MIN_BACKOFF_STEP_UP: f64 = 1.2;
pub const MIN_BACKOFF_STEP_DOWN: f64 = 0.9;
pub const MIN_BACKOFF_FLOOR: Duration = Duration::from_millis(10);

// Backoff calculation
pub const HEALTHY_QUOTA_RATIO: f64 = 0.5;
pub const JITTER_FACTOR: f64 = 0.1;

// Service profiles
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);
pub const FALLBACK_SERVICE: &str = "gitea";

// Profile override file
pub const CONFIG_ENV_VAR: &str = "REPOS_RATELIMIT_CONFIG";
pub const CONFIG_DIR_NAME: &str = "repos";
pub const CONFIG_FILE_NAME: &str = "ratelimit.toml";
