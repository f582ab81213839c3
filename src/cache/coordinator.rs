//! Fetch coalescing
//!
//! Ensures a package directory is fresh before it is served. Callers that
//! find a fresh sentinel return without locking. Otherwise the key's slot is
//! taken and exactly one caller runs the retriever; everyone who queued
//! behind it re-checks and reuses the outcome.
//!
//! Failed retrievals are remembered for one freshness window so a broken
//! package is not re-fetched on every request.

use crate::cache::freshness::FreshnessOracle;
use crate::cache::key::ResourceKey;
use crate::cache::keyed_lock::KeyedLock;
use crate::cache::retriever::{RetrievalFailure, Retriever};
use crate::error::ProxyResult;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct CachedFailure {
    at: SystemTime,
    failure: RetrievalFailure,
}

/// Coordinates retrievals so each key has at most one in flight
pub struct FetchCoordinator {
    oracle: FreshnessOracle,
    retriever: Arc<dyn Retriever>,
    locks: KeyedLock,
    failures: Mutex<HashMap<String, CachedFailure>>,
}

impl FetchCoordinator {
    pub fn new(oracle: FreshnessOracle, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            oracle,
            retriever,
            locks: KeyedLock::new(),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn oracle(&self) -> &FreshnessOracle {
        &self.oracle
    }

    /// Number of keys with a retrieval running or queued
    pub fn in_flight(&self) -> usize {
        self.locks.in_flight()
    }

    /// Number of failed keys currently remembered
    pub fn recorded_failures(&self) -> usize {
        self.failures().len()
    }

    /// Return the local directory for `key`, retrieving it first if stale
    pub async fn ensure_fresh(&self, key: &ResourceKey) -> ProxyResult<PathBuf> {
        let dir = self.oracle.package_dir(key);
        if let Some(ready) = self.check_cached(key, &dir) {
            return ready;
        }

        let _guard = self.locks.acquire(key.as_str()).await;

        // Whoever held the slot before us may have just finished.
        if let Some(ready) = self.check_cached(key, &dir) {
            return ready;
        }

        info!("Getting package {}...", key);
        let result = self.retriever.retrieve(key).await;

        // Stamp failures too, so they are retried at most once per window,
        // but never create a directory for a package that was not fetched.
        if result.is_ok() || dir.is_dir() {
            if let Err(e) = self.oracle.stamp(&dir) {
                warn!("Could not stamp {}: {}", dir.display(), e);
            }
        }

        match result {
            Ok(()) => {
                self.failures().remove(key.as_str());
                info!("Fetched package {}", key);
                Ok(dir)
            }
            Err(failure) => {
                warn!(
                    "Get of package {} via {} failed: {}; output: {}",
                    key,
                    self.retriever.name(),
                    failure.reason,
                    failure.output
                );
                self.record_failure(key, failure.clone());
                Err(failure.into_error(key))
            }
        }
    }

    /// Answer from the failure record or the sentinel, if either applies
    fn check_cached(&self, key: &ResourceKey, dir: &Path) -> Option<ProxyResult<PathBuf>> {
        if let Some(failure) = self.recent_failure(key) {
            debug!("Replaying recent failure for {}", key);
            return Some(Err(failure.into_error(key)));
        }
        if self.oracle.is_fresh(dir) {
            return Some(Ok(dir.to_path_buf()));
        }
        None
    }

    fn recent_failure(&self, key: &ResourceKey) -> Option<RetrievalFailure> {
        let mut failures = self.failures();
        let cached = failures.get(key.as_str())?;
        if self.oracle.within_window(cached.at, SystemTime::now()) {
            return Some(cached.failure.clone());
        }
        failures.remove(key.as_str());
        None
    }

    /// Remember `failure` for one window, dropping records that have expired
    fn record_failure(&self, key: &ResourceKey, failure: RetrievalFailure) {
        let now = SystemTime::now();
        let mut failures = self.failures();
        let before = failures.len();
        failures.retain(|_, cached| self.oracle.within_window(cached.at, now));
        if failures.len() < before {
            debug!("Pruned {} expired failure records", before - failures.len());
        }
        failures.insert(key.to_string(), CachedFailure { at: now, failure });
    }

    fn failures(&self) -> MutexGuard<'_, HashMap<String, CachedFailure>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("oracle", &self.oracle)
            .field("retriever", &self.retriever.name())
            .finish_non_exhaustive()
    }
}
