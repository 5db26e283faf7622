//! Rate limiter simulation command implementation
//!
//! Drives a registry limiter against an in-process provider that enforces its
//! own quota and answers with real rate limit headers, including 429 with
//! Retry-After once its quota is spent. Useful to watch queueing, backoff and
//! adaptation without touching a real API.

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::ratelimit::clock::instant_after;
use crate::ratelimit::{
    LimiterRegistry, ProfileTable, RateLimitError, RateLimiter, RegistrySnapshot, WaitContext,
};
use crate::utils::{format_duration, set_terminal_title, set_terminal_title_and_flush};

// Default concurrency cap, same reasoning as for provider API fan-out
const SIMULATE_CONCURRENT_CAP: usize = 12;
const PROGRESS_TEMPLATE: &str = "{prefix:.bold} [{bar:30}] {pos}/{len} {wide_msg}";
const PROGRESS_CHARS: &str = "##-";

/// Options for one simulation run
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub service: String,
    pub requests: usize,
    /// Quota the simulated provider enforces per window
    pub limit: u64,
    pub window: Duration,
    pub concurrency: Option<usize>,
    /// Upper bound on a single `wait`
    pub timeout: Duration,
    pub config: Option<PathBuf>,
    pub json: bool,
}

/// Picks the number of concurrent simulated clients
///
/// Priority order:
/// 1. explicit value → at least 1
/// 2. Smart default → min(CPU_CORES + 2, 12)
pub fn simulate_concurrency(requested: Option<usize>) -> usize {
    match requested {
        Some(n) => n.max(1),
        None => (num_cpus::get() + 2).min(SIMULATE_CONCURRENT_CAP),
    }
}

/// In-process provider with its own fixed-window quota
#[derive(Debug)]
pub struct SimulatedProvider {
    service: String,
    limit: u64,
    window: Duration,
    quota: Mutex<ProviderQuota>,
}

#[derive(Debug)]
struct ProviderQuota {
    remaining: u64,
    reset_at: Instant,
}

impl SimulatedProvider {
    pub fn new(service: &str, limit: u64, window: Duration) -> Self {
        Self {
            service: service.to_string(),
            limit,
            window,
            quota: Mutex::new(ProviderQuota {
                remaining: limit,
                reset_at: instant_after(Instant::now(), window),
            }),
        }
    }

    /// Serves one request: 200 while quota lasts, 429 with Retry-After after
    pub fn handle(&self) -> (StatusCode, HeaderMap) {
        let now = Instant::now();
        let mut quota = self.quota.lock().unwrap_or_else(PoisonError::into_inner);
        if now >= quota.reset_at {
            quota.remaining = self.limit;
            quota.reset_at = instant_after(now, self.window);
        }

        let until_reset = quota.reset_at.saturating_duration_since(now);
        let status = if quota.remaining > 0 {
            quota.remaining -= 1;
            StatusCode::OK
        } else {
            StatusCode::TOO_MANY_REQUESTS
        };

        let mut headers = self.quota_headers(quota.remaining, until_reset);
        if status == StatusCode::TOO_MANY_REQUESTS {
            let secs = until_reset.as_secs_f64().ceil().max(1.0) as u64;
            headers.insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        (status, headers)
    }

    /// GitLab uses the unprefixed `RateLimit-*` family
    fn quota_headers(&self, remaining: u64, until_reset: Duration) -> HeaderMap {
        let prefix = if self.service == "gitlab" {
            "ratelimit"
        } else {
            "x-ratelimit"
        };

        let reset_epoch = SystemTime::now()
            .checked_add(until_reset)
            .and_then(|reset| reset.duration_since(UNIX_EPOCH).ok())
            .map(|since| since.as_secs_f64().ceil() as u64)
            .unwrap_or_default();

        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("limit", self.limit),
            ("remaining", remaining),
            ("reset", reset_epoch),
        ] {
            if let Ok(name) = reqwest::header::HeaderName::try_from(format!("{prefix}-{name}")) {
                headers.insert(name, HeaderValue::from(value));
            }
        }
        headers
    }
}

/// Outcome counters for a simulation run
#[derive(Debug, Default, Clone, Serialize)]
pub struct SimulationStats {
    /// Requests the provider accepted
    pub succeeded: u64,
    /// 429 responses received from the provider
    pub provider_rejections: u64,
    /// Requests the limiter refused because its queue was full
    pub queue_rejections: u64,
    /// Waits that hit their deadline
    pub timed_out: u64,
    /// Requests that exhausted their retries
    pub gave_up: u64,
}

/// JSON output of the simulate command
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub service: String,
    pub requests: usize,
    pub concurrency: usize,
    pub elapsed_ms: u64,
    pub outcome: SimulationStats,
    pub registry: RegistrySnapshot,
}

fn lock_stats(stats: &Mutex<SimulationStats>) -> std::sync::MutexGuard<'_, SimulationStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

fn create_progress_bar(total: usize, service: &str, hidden: bool) -> Result<ProgressBar> {
    let pb = if hidden {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .context("Invalid progress bar template")?
            .progress_chars(PROGRESS_CHARS),
    );
    pb.set_prefix(format!("🟡 {service}"));
    pb.set_message("simulating...");
    Ok(pb)
}

/// Sends one simulated request, retrying provider rejections up to the
/// profile's retry budget
async fn run_request(
    limiter: &RateLimiter,
    provider: &SimulatedProvider,
    stats: &Mutex<SimulationStats>,
    timeout: Duration,
) {
    let max_retries = limiter.profile().max_retries;

    for attempt in 0..=max_retries {
        match limiter.wait(&WaitContext::with_timeout(timeout)).await {
            Ok(()) => {}
            Err(RateLimitError::QueueFull { .. }) => {
                lock_stats(stats).queue_rejections += 1;
                return;
            }
            Err(e) if e.is_context_error() => {
                lock_stats(stats).timed_out += 1;
                return;
            }
            Err(e) => {
                debug!("Simulated request gave up: {e}");
                lock_stats(stats).gave_up += 1;
                return;
            }
        }

        let (status, headers) = provider.handle();
        limiter.observe_response(status, &headers);

        if status.is_success() {
            lock_stats(stats).succeeded += 1;
            return;
        }

        lock_stats(stats).provider_rejections += 1;
        debug!("Provider rejected attempt {} with {}", attempt + 1, status);
    }

    lock_stats(stats).gave_up += 1;
}

/// Handles the simulate command
pub async fn handle_simulate_command(options: SimulateOptions) -> Result<()> {
    let SimulateOptions {
        service,
        requests,
        limit,
        window,
        concurrency,
        timeout,
        config,
        json,
    } = options;

    set_terminal_title("🚦 repos-ratelimit");

    let mut profiles =
        ProfileTable::load(config.as_deref()).context("Failed to load rate limit profiles")?;
    // The limiter starts from the profile's documented quota and learns the
    // provider's real one from the first response
    let profile = profiles.resolve(&service).with_window(window);
    profile
        .validate()
        .with_context(|| format!("Invalid profile for {service}"))?;
    profiles.insert(profile);

    let registry = LimiterRegistry::with_profiles(profiles);
    let limiter = registry.get_limiter(&service);
    let provider = Arc::new(SimulatedProvider::new(&service, limit, window));
    let stats = Arc::new(Mutex::new(SimulationStats::default()));
    let concurrency = simulate_concurrency(concurrency);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let pb = create_progress_bar(requests, &service, json)?;

    info!(
        "Simulating {} requests against {} ({} per {}, {} clients)",
        requests,
        service,
        limit,
        format_duration(window),
        concurrency
    );

    let start_time = Instant::now();
    let mut handles = FuturesUnordered::new();
    for _ in 0..requests {
        let limiter = Arc::clone(&limiter);
        let provider = Arc::clone(&provider);
        let stats = Arc::clone(&stats);
        let semaphore = Arc::clone(&semaphore);
        let pb = pb.clone();

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            run_request(&limiter, &provider, &stats, timeout).await;
            pb.set_message(format!("{} remaining", limiter.current_status().remaining));
            pb.inc(1);
        }));
    }

    while let Some(result) = handles.next().await {
        result.context("Simulated request task failed")?;
    }

    let elapsed = start_time.elapsed();
    pb.set_prefix(format!("🟢 {service}"));
    pb.finish_with_message(format!("done in {}", format_duration(elapsed)));

    registry.stop().await;
    let outcome = lock_stats(&stats).clone();

    if json {
        let report = SimulationReport {
            service,
            requests,
            concurrency,
            elapsed_ms: elapsed.as_millis() as u64,
            outcome,
            registry: registry.snapshot(),
        };
        let output =
            serde_json::to_string_pretty(&report).context("Failed to serialize simulation report")?;
        println!("{output}");
    } else {
        println!();
        println!("✅ {} succeeded", outcome.succeeded);
        println!("🔁 {} provider rejections (429)", outcome.provider_rejections);
        println!("🚫 {} rejected by full queue", outcome.queue_rejections);
        println!("⏱️  {} timed out", outcome.timed_out);
        println!("❌ {} gave up", outcome.gave_up);
        println!();
        registry.print_all_stats();
    }

    set_terminal_title_and_flush("✅ repos-ratelimit");
    Ok(())
}
