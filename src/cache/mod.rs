//! Fetch-coalescing package cache
//!
//! Packages live under `<workspace>/src/<key>`. A zero-length sentinel file
//! in a package directory records when it was last refreshed; nothing else
//! is persisted.
//!
//! # Request Flow
//!
//! | Step | Component | Locking |
//! |------|-----------|---------|
//! | Recent failure or fresh sentinel | [`FetchCoordinator`] + [`FreshnessOracle`] | none |
//! | Stale | [`KeyedLock`] slot for the key | per key |
//! | Retrieval | [`Retriever`] | slot held |
//!
//! Only the requested key is coordinated. Packages the retriever pulls in
//! transitively are its own business.

pub mod coordinator;
pub mod freshness;
pub mod key;
pub mod keyed_lock;
pub mod retriever;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::FetchCoordinator;
pub use freshness::{FreshnessOracle, DEFAULT_SENTINEL, DEFAULT_WINDOW};
pub use key::ResourceKey;
pub use keyed_lock::{KeyGuard, KeyedLock};
pub use retriever::{CommandRetriever, RetrievalFailure, Retriever};
