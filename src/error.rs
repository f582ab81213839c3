//! Error types for getproxy
//!
//! All modules use `ProxyResult<T>` as their return type.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for getproxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

/// All errors that can occur in getproxy
#[derive(Error, Debug)]
pub enum ProxyError {
    // Request errors
    #[error("invalid path {0:?}")]
    InvalidPath(String),

    #[error("Error running retriever for package {key:?}: {reason}\n\nOutput:\n{output}")]
    Retrieval {
        key: String,
        reason: String,
        output: String,
    },

    // Archive errors
    #[error("unsupported file type for {path}: {kind}")]
    UnsupportedEntry { path: PathBuf, kind: String },

    #[error("symlink {path} does not resolve: {source}")]
    SymlinkUnresolved {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archiving {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Listener errors
    #[error("Invalid listen address {spec:?}: {reason}")]
    ListenSpec { spec: String, reason: String },

    #[error("No inherited listener named {name:?}: environment variable {var} is not set")]
    ListenFdMissing { name: String, var: String },

    #[error("Bogus file descriptor {value:?} in environment variable {var}")]
    ListenFdInvalid { var: String, value: String },

    #[error("Listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("No workspace configured: ${0} is unset")]
    WorkspaceMissing(String),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an archive error for the entry at `path`
    pub fn archive(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::WorkspaceMissing(_) => Some("Set GOPATH, pass --workspace, or set cache.workspace"),
            Self::ListenFdMissing { .. } => {
                Some("Start getproxy under a supervisor that passes the listening socket")
            }
            Self::ListenSpec { .. } => Some("Use a port (8080), ip:port, or envfd:NAME"),
            Self::Bind { .. } => Some("Is another process already listening on that address?"),
            _ => None,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProxyError::InvalidPath("/a/../b".to_string());
        assert!(err.to_string().contains("invalid path"));
    }

    #[test]
    fn retrieval_error_carries_output() {
        let err = ProxyError::Retrieval {
            key: "example.com/pkg".to_string(),
            reason: "exit status: 1".to_string(),
            output: "cannot find package".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("example.com/pkg"));
        assert!(text.ends_with("Output:\ncannot find package"));
    }

    #[test]
    fn error_hint() {
        let err = ProxyError::WorkspaceMissing("GOPATH".to_string());
        assert!(err.hint().unwrap().contains("GOPATH"));
        assert!(ProxyError::InvalidPath("//".to_string()).hint().is_none());
    }

    #[test]
    fn into_response_is_plain_text_500() {
        let response = ProxyError::InvalidPath("/./".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
