//! CLI command implementations

pub mod config;
pub mod fetch;
pub mod serve;

pub use config::execute as config;
pub use fetch::execute as fetch;
pub use serve::execute as serve;
