//! Command implementations for the `repos-ratelimit` binary

pub mod profiles;
pub mod simulate;

pub use profiles::handle_profiles_command;
pub use simulate::{handle_simulate_command, SimulateOptions};
