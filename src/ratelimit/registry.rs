//! Shared per-service limiter registry
//!
//! Every provider client of one process should consult the same limiter for
//! its service. The registry is owned by the application and handed to clients
//! by reference or `Arc`; it creates limiters lazily from its profile table.

use dashmap::DashMap;
use log::debug;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

use super::limiter::RateLimiter;
use super::profile::{ProfileTable, ServiceProfile};
use super::stats::LimiterReport;

/// Serializable statistics for every registered limiter
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub limiters: Vec<LimiterReport>,
}

#[derive(Debug, Default)]
pub struct LimiterRegistry {
    profiles: ProfileTable,
    limiters: DashMap<String, Arc<RateLimiter>>,
}

impl LimiterRegistry {
    /// A registry over the built-in profile table
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry over a custom (e.g. file-overridden) profile table
    pub fn with_profiles(profiles: ProfileTable) -> Self {
        Self {
            profiles,
            limiters: DashMap::new(),
        }
    }

    /// Returns the limiter for `service`, creating it on first use
    ///
    /// Concurrent first calls for the same name construct exactly one
    /// limiter; the map's entry lock serializes them. Unknown services get
    /// the fallback profile under their own name.
    ///
    /// # Panics
    ///
    /// Panics if a limiter has to be created outside of a Tokio runtime
    pub fn get_limiter(&self, service: &str) -> Arc<RateLimiter> {
        if let Some(limiter) = self.limiters.get(service) {
            return Arc::clone(limiter.value());
        }

        let entry = self
            .limiters
            .entry(service.to_string())
            .or_insert_with(|| {
                debug!("Registering rate limiter for {}", service);
                Arc::new(RateLimiter::new(self.profiles.resolve(service)))
            });
        Arc::clone(entry.value())
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Names of registered services, sorted
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self
            .limiters
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        services.sort();
        services
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    pub fn profile(&self, service: &str) -> ServiceProfile {
        self.profiles.resolve(service)
    }

    /// Stops every registered limiter. Limiters stay registered so their
    /// statistics remain readable.
    pub async fn stop(&self) {
        // Collect first so no map shard lock is held across an await
        let limiters: Vec<Arc<RateLimiter>> = self
            .limiters
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for limiter in limiters {
            limiter.stop().await;
        }
    }

    /// Reports for every limiter, sorted by service name
    pub fn reports(&self) -> Vec<LimiterReport> {
        let mut reports: Vec<LimiterReport> = self
            .limiters
            .iter()
            .map(|entry| entry.value().report())
            .collect();
        reports.sort_by(|a, b| a.service.cmp(&b.service));
        reports
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            generated_at: chrono::Utc::now(),
            limiters: self.reports(),
        }
    }

    /// Text report for every limiter, separated by blank lines
    pub fn render_report(&self) -> String {
        let mut output = String::new();
        for (i, report) in self.reports().iter().enumerate() {
            if i > 0 {
                output.push_str("\n\n");
            }
            let _ = write!(output, "{report}");
        }
        output
    }

    pub fn print_all_stats(&self) {
        let report = self.render_report();
        if !report.is_empty() {
            println!("{report}");
        }
    }
}
