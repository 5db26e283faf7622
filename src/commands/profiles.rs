//! Profile table command implementation
//!
//! Prints the effective rate limit profiles: the built-in table merged with
//! any TOML overrides.

use anyhow::{Context, Result};
use std::path::Path;

use crate::ratelimit::{ProfileTable, ServiceProfile};
use crate::utils::format_duration;

/// Handles the profiles command
pub fn handle_profiles_command(config: Option<&Path>, json: bool) -> Result<()> {
    let table = ProfileTable::load(config).context("Failed to load rate limit profiles")?;

    if json {
        let output = serde_json::to_string_pretty(&table.profiles())
            .context("Failed to serialize profiles")?;
        println!("{output}");
        return Ok(());
    }

    println!("📋 Rate limit profiles\n");
    for profile in table.profiles() {
        print_profile(profile);
    }
    Ok(())
}

fn print_profile(profile: &ServiceProfile) {
    let mode = if profile.adaptive { "adaptive" } else { "fixed" };
    println!("{} ({mode})", profile.service);
    println!(
        "  Quota:    {} requests per {}",
        profile.initial_limit,
        format_duration(profile.window)
    );
    println!(
        "  Backoff:  {} to {} (x{:.1})",
        format_duration(profile.min_backoff),
        format_duration(profile.max_backoff),
        profile.backoff_multiplier
    );
    println!("  Queue:    {}", profile.queue_capacity);
    println!("  Retries:  {}\n", profile.max_retries);
}
