//! In-process retriever for tests

use crate::cache::key::ResourceKey;
use crate::cache::retriever::{RetrievalFailure, Retriever};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Writes a small package into the cache root, or fails on demand
pub(crate) struct FakeRetriever {
    root: PathBuf,
    failure: Option<RetrievalFailure>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl FakeRetriever {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            failure: None,
            delays: HashMap::new(),
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(mut self, reason: &str, output: &str) -> Self {
        self.failure = Some(RetrievalFailure::new(reason, output));
        self
    }

    pub(crate) fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_for(&self, key: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|k| *k == key).count()
    }
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn retrieve(&self, key: &ResourceKey) -> Result<(), RetrievalFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(key.to_string());

        if let Some(delay) = self.delays.get(key.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let dir = key.dir_under(&self.root);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("main.go"), b"package main\n").unwrap();
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}
