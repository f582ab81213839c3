//! Terminal output for the one-shot commands
//!
//! Uses `cliclack` for spinners and step lines on a TTY, with plain
//! `[OK]`/`[FAIL]` lines when output is piped or running in CI. The HTTP
//! server logs through `tracing` instead.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{key_value, step_ok_detail, step_warn_hint};
pub use progress::TaskSpinner;
