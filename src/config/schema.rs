//! Configuration schema for getproxy
//!
//! Configuration is stored at `~/.config/getproxy/config.toml`

use crate::cache::freshness::{DEFAULT_SENTINEL, DEFAULT_WINDOW};
use crate::error::{ProxyError, ProxyResult};
use crate::server::listen::DEFAULT_FD_ENV_PREFIX;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// HTTP listener settings
    pub server: ServerConfig,

    /// Package cache settings
    pub cache: CacheConfig,

    /// External retrieval tool
    pub retriever: RetrieverConfig,

    /// Archive filtering
    pub archive: ArchiveConfig,
}

impl Config {
    /// Reject settings that would only fail later, at request time
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.general.log_format.as_str(), "text" | "json") {
            return Err(format!(
                "general.log_format must be \"text\" or \"json\", got {:?}",
                self.general.log_format
            ));
        }
        if self.retriever.program.trim().is_empty() {
            return Err("retriever.program must not be empty".to_string());
        }
        let sentinel = &self.cache.sentinel;
        if sentinel.is_empty() || sentinel.contains('/') || sentinel == "." || sentinel == ".." {
            return Err(format!("cache.sentinel {:?} is not a plain file name", sentinel));
        }
        if self.archive.small_file_limit > self.archive.max_file_size {
            return Err(format!(
                "archive.small_file_limit ({}) exceeds archive.max_file_size ({})",
                self.archive.small_file_limit, self.archive.max_file_size
            ));
        }
        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port, ip:port, or envfd:NAME
    pub listen: String,

    /// Prefix of the variable naming an inherited socket (`<PREFIX>_<NAME>`)
    pub fd_env_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "8080".to_string(),
            fd_env_prefix: DEFAULT_FD_ENV_PREFIX.to_string(),
        }
    }
}

/// Package cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Workspace directory; packages live under `<workspace>/src`
    pub workspace: Option<PathBuf>,

    /// Environment variable consulted when `workspace` is unset
    pub workspace_env: String,

    /// Seconds a refresh (successful or not) stays valid
    pub freshness_secs: u64,

    /// Name of the per-directory refresh marker
    pub sentinel: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            workspace_env: "GOPATH".to_string(),
            freshness_secs: DEFAULT_WINDOW.as_secs(),
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }
}

impl CacheConfig {
    /// Resolve the workspace: CLI override, then config, then environment
    pub fn resolve_workspace(&self, cli_override: Option<&Path>) -> ProxyResult<PathBuf> {
        self.resolve_workspace_with(cli_override, |var| std::env::var_os(var))
    }

    /// Same as [`resolve_workspace`](Self::resolve_workspace) with an explicit env lookup
    pub fn resolve_workspace_with(
        &self,
        cli_override: Option<&Path>,
        lookup: impl Fn(&str) -> Option<std::ffi::OsString>,
    ) -> ProxyResult<PathBuf> {
        if let Some(path) = cli_override.or(self.workspace.as_deref()) {
            return Ok(path.to_path_buf());
        }
        // GOPATH-style variables may list several directories; use the first.
        lookup(&self.workspace_env)
            .and_then(|value| std::env::split_paths(&value).find(|p| !p.as_os_str().is_empty()))
            .ok_or_else(|| ProxyError::WorkspaceMissing(self.workspace_env.clone()))
    }
}

/// External retrieval tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Program to run
    pub program: String,

    /// Arguments placed before the package key
    pub args: Vec<String>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            program: "go".to_string(),
            args: vec!["get".to_string(), "-u".to_string()],
        }
    }
}

/// Archive filtering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Files with this suffix may be as large as `max_file_size`
    pub source_suffix: String,

    /// Size limit in bytes for all other files
    pub small_file_limit: u64,

    /// Hard size limit in bytes for any file
    pub max_file_size: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            source_suffix: ".go".to_string(),
            small_file_limit: 10 << 10,
            max_file_size: 1 << 20,
        }
    }
}
