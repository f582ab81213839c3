//! Retrieval tool abstraction
//!
//! Provides a trait for materializing a package directory that can be
//! implemented by different backends. The production backend shells out to
//! an external tool (`go get -u <key>` by default).

use crate::cache::key::ResourceKey;
use crate::config::schema::RetrieverConfig;
use crate::error::ProxyError;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Why a retrieval failed, plus whatever the tool printed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalFailure {
    pub reason: String,
    pub output: String,
}

impl RetrievalFailure {
    pub fn new(reason: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            output: output.into(),
        }
    }

    /// Convert into the request-facing error for `key`
    pub fn into_error(self, key: &ResourceKey) -> ProxyError {
        ProxyError::Retrieval {
            key: key.to_string(),
            reason: self.reason,
            output: self.output,
        }
    }
}

impl fmt::Display for RetrievalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Materializes or updates the local directory for a key
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Fetch `key` into the cache; only success or failure is reported
    async fn retrieve(&self, key: &ResourceKey) -> Result<(), RetrievalFailure>;

    /// Human-readable backend name for logs
    fn name(&self) -> &str;
}

/// Retriever that runs an external command with the key as last argument
#[derive(Debug, Clone)]
pub struct CommandRetriever {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl CommandRetriever {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            envs: Vec::new(),
        }
    }

    /// Build from config, exporting the workspace to the child process
    pub fn from_config(config: &RetrieverConfig, workspace_env: &str, workspace: &Path) -> Self {
        Self::new(config.program.clone(), config.args.clone())
            .env(workspace_env, workspace.display().to_string())
    }

    /// Add an environment variable for the child process
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn command_line(&self, key: &ResourceKey) -> String {
        let mut parts = vec![self.program.as_str()];
        parts.extend(self.args.iter().map(String::as_str));
        parts.push(key.as_str());
        parts.join(" ")
    }
}

#[async_trait]
impl Retriever for CommandRetriever {
    async fn retrieve(&self, key: &ResourceKey) -> Result<(), RetrievalFailure> {
        let command_line = self.command_line(key);
        debug!("Executing: {}", command_line);

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(key.as_str())
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| RetrievalFailure::new(format!("failed to run {}: {}", command_line, e), ""))?;

        if output.status.success() {
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(RetrievalFailure::new(
            format!("{} failed: {}", command_line, output.status),
            combined,
        ))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandRetriever {
        CommandRetriever::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn success_reports_ok() {
        let key = ResourceKey::parse("example.com/pkg").unwrap();
        assert!(sh("exit 0").retrieve(&key).await.is_ok());
    }

    #[tokio::test]
    async fn key_is_passed_as_last_argument() {
        let key = ResourceKey::parse("example.com/pkg").unwrap();
        // With `sh -c script arg0`, the key lands in $0.
        let failure = sh("echo \"got $0\"; exit 3").retrieve(&key).await.unwrap_err();

        assert_eq!(failure.output, "got example.com/pkg\n");
        assert!(failure.reason.contains("exit status: 3"));
    }

    #[tokio::test]
    async fn failure_combines_stdout_and_stderr() {
        let key = ResourceKey::parse("pkg").unwrap();
        let failure = sh("echo out; echo err >&2; exit 1").retrieve(&key).await.unwrap_err();

        assert_eq!(failure.output, "out\nerr\n");
    }

    #[tokio::test]
    async fn environment_is_exported() {
        let key = ResourceKey::parse("pkg").unwrap();
        let retriever = sh("echo \"$GETPROXY_TEST_WS\"; exit 1").env("GETPROXY_TEST_WS", "/tmp/ws");

        let failure = retriever.retrieve(&key).await.unwrap_err();

        assert_eq!(failure.output, "/tmp/ws\n");
    }

    #[tokio::test]
    async fn missing_program_is_a_failure() {
        let key = ResourceKey::parse("pkg").unwrap();
        let retriever = CommandRetriever::new("getproxy-no-such-tool", vec![]);

        let failure = retriever.retrieve(&key).await.unwrap_err();

        assert!(failure.reason.contains("failed to run getproxy-no-such-tool pkg"));
        assert!(failure.output.is_empty());
    }

    #[test]
    fn failure_converts_to_request_error() {
        let key = ResourceKey::parse("pkg").unwrap();
        let err = RetrievalFailure::new("boom", "log").into_error(&key);
        assert!(matches!(err, ProxyError::Retrieval { ref output, .. } if output == "log"));
    }
}
