pub(crate) mod format;
pub(crate) mod terminal;

// Public API - utilities used by commands and reports
pub use format::format_duration;
pub use terminal::{set_terminal_title, set_terminal_title_and_flush};
