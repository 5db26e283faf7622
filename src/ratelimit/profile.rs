//! Per-provider rate limit profiles
//!
//! Each hosting provider publishes a different quota and window. The built-in
//! table mirrors the documented defaults; a TOML file can override any field
//! or add rows for self-hosted instances.

use log::debug;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::config::{
    CONFIG_DIR_NAME, CONFIG_ENV_VAR, CONFIG_FILE_NAME, DEFAULT_WINDOW, FALLBACK_SERVICE,
    MAX_WINDOW, MIN_BACKOFF_FLOOR,
};
use super::error::ConfigError;

/// Immutable defaults used to construct a limiter for one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceProfile {
    pub service: String,
    pub initial_limit: u64,
    pub max_retries: u32,
    pub adaptive: bool,
    pub backoff_multiplier: f64,
    #[serde(rename = "min_backoff_ms", serialize_with = "serialize_millis")]
    pub min_backoff: Duration,
    #[serde(rename = "max_backoff_ms", serialize_with = "serialize_millis")]
    pub max_backoff: Duration,
    pub queue_capacity: usize,
    #[serde(rename = "window_secs", serialize_with = "serialize_secs")]
    pub window: Duration,
}

impl ServiceProfile {
    /// GitHub REST: 5000 requests per rolling hour for authenticated clients
    pub fn github() -> Self {
        Self {
            service: "github".to_string(),
            initial_limit: 5000,
            max_retries: 3,
            adaptive: true,
            backoff_multiplier: 2.0,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(15 * 60),
            queue_capacity: 100,
            window: DEFAULT_WINDOW,
        }
    }

    /// GitLab.com: 2000 requests per minute
    pub fn gitlab() -> Self {
        Self {
            service: "gitlab".to_string(),
            initial_limit: 2000,
            max_retries: 3,
            adaptive: true,
            backoff_multiplier: 1.5,
            min_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5 * 60),
            queue_capacity: 50,
            window: Duration::from_secs(60),
        }
    }

    /// Gitea varies per instance, so this is the conservative default
    pub fn gitea() -> Self {
        Self {
            service: "gitea".to_string(),
            initial_limit: 1000,
            max_retries: 2,
            adaptive: true,
            backoff_multiplier: 1.8,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10 * 60),
            queue_capacity: 30,
            window: DEFAULT_WINDOW,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_initial_limit(mut self, limit: u64) -> Self {
        self.initial_limit = limit;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.min_backoff = min;
        self.max_backoff = max;
        self
    }

    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    /// Rejects profiles the limiter cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidProfile {
            service: self.service.clone(),
            reason: reason.to_string(),
        };

        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity must be at least 1"));
        }
        if self.window.is_zero() {
            return Err(invalid("window_secs must be at least 1"));
        }
        if self.window > MAX_WINDOW {
            return Err(invalid("window_secs must not exceed one year"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(invalid("backoff_multiplier must be a finite value >= 1.0"));
        }
        if self.min_backoff < MIN_BACKOFF_FLOOR {
            return Err(invalid("min_backoff_ms must be at least 10"));
        }
        if self.min_backoff > self.max_backoff {
            return Err(invalid("min_backoff_ms must not exceed max_backoff_ms"));
        }
        Ok(())
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}

/// Lookup table from service name to profile
#[derive(Debug, Clone)]
pub struct ProfileTable {
    profiles: HashMap<String, ServiceProfile>,
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileTable {
    /// The documented GitHub, GitLab and Gitea defaults
    pub fn builtin() -> Self {
        let profiles = [
            ServiceProfile::github(),
            ServiceProfile::gitlab(),
            ServiceProfile::gitea(),
        ]
        .into_iter()
        .map(|profile| (profile.service.clone(), profile))
        .collect();

        Self { profiles }
    }

    /// Returns the profile for `service`, falling back to the gitea defaults
    /// renamed to the requested service
    pub fn resolve(&self, service: &str) -> ServiceProfile {
        if let Some(profile) = self.profiles.get(service) {
            return profile.clone();
        }

        self.profiles
            .get(FALLBACK_SERVICE)
            .cloned()
            .unwrap_or_else(ServiceProfile::gitea)
            .with_service(service)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.profiles.contains_key(service)
    }

    pub fn insert(&mut self, profile: ServiceProfile) {
        self.profiles.insert(profile.service.clone(), profile);
    }

    /// Profiles sorted by service name
    pub fn profiles(&self) -> Vec<&ServiceProfile> {
        let mut profiles: Vec<_> = self.profiles.values().collect();
        profiles.sort_by(|a, b| a.service.cmp(&b.service));
        profiles
    }

    /// Merges overrides over the current rows; unknown services become new rows
    /// seeded from the fallback profile
    pub fn apply_overrides(&mut self, overrides: ProfileOverrides) -> Result<(), ConfigError> {
        for (service, patch) in overrides.profiles {
            let profile = patch.apply(self.resolve(&service));
            profile.validate()?;
            debug!("Applied rate limit profile override for {}", service);
            self.insert(profile);
        }
        Ok(())
    }

    /// Parses a TOML override document and merges it into the built-in table
    pub fn from_toml_str(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let overrides: ProfileOverrides =
            toml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut table = Self::builtin();
        table.apply_overrides(overrides)?;
        Ok(table)
    }

    /// Loads the effective profile table
    ///
    /// Priority order:
    /// 1. explicit path → must exist
    /// 2. REPOS_RATELIMIT_CONFIG env var → must exist
    /// 3. `<config dir>/repos/ratelimit.toml` → optional
    /// 4. built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let Some((path, required)) = config_location(explicit) else {
            return Ok(Self::builtin());
        };

        match std::fs::read_to_string(&path) {
            Ok(content) => {
                debug!("Loading rate limit profiles from {}", path.display());
                Self::from_toml_str(&path, &content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                debug!("No rate limit config at {}, using defaults", path.display());
                Ok(Self::builtin())
            }
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }
}

/// Resolves where profile overrides live and whether the file must exist
fn config_location(explicit: Option<&Path>) -> Option<(PathBuf, bool)> {
    if let Some(path) = explicit {
        return Some((path.to_path_buf(), true));
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some((PathBuf::from(path), true));
        }
    }

    dirs::config_dir().map(|dir| (dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME), false))
}

/// Override document: `[profiles.<service>]` tables
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileOverrides {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileOverride>,
}

/// Optional per-field overrides for one service
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileOverride {
    pub initial_limit: Option<u64>,
    pub max_retries: Option<u32>,
    pub adaptive: Option<bool>,
    pub backoff_multiplier: Option<f64>,
    pub min_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub window_secs: Option<u64>,
}

impl ProfileOverride {
    fn apply(&self, mut profile: ServiceProfile) -> ServiceProfile {
        if let Some(limit) = self.initial_limit {
            profile.initial_limit = limit;
        }
        if let Some(retries) = self.max_retries {
            profile.max_retries = retries;
        }
        if let Some(adaptive) = self.adaptive {
            profile.adaptive = adaptive;
        }
        if let Some(multiplier) = self.backoff_multiplier {
            profile.backoff_multiplier = multiplier;
        }
        if let Some(ms) = self.min_backoff_ms {
            profile.min_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_backoff_ms {
            profile.max_backoff = Duration::from_millis(ms);
        }
        if let Some(capacity) = self.queue_capacity {
            profile.queue_capacity = capacity;
        }
        if let Some(secs) = self.window_secs {
            profile.window = Duration::from_secs(secs);
        }
        profile
    }
}
