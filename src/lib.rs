//! getproxy - caching package proxy
//!
//! Serves `GET /<package>` by making sure a recent copy of the package
//! exists under `<workspace>/src` (running an external retrieval tool at most
//! once per key at a time) and streaming a filtered tar.gz of its top-level
//! files back to the client.

pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod server;
pub mod ui;

pub use error::{ProxyError, ProxyResult};
