//! HTTP session lifecycle.
//!
//! The session (client, connection pool, any challenge cookies) is
//! created lazily and can be invalidated on demand: a 403 response
//! usually means the session carries stale anti-bot state, and the fix
//! is a fresh one. The provider is owned by its fetcher, not
//! process-wide state.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    client::HttpClient,
    error::FetchResult,
    traits::Net,
};

/// Builds new sessions. Separated from the provider so tests can count
/// and script session creation.
pub trait SessionFactory: Send + Sync {
    /// Create a fresh session.
    ///
    /// # Errors
    ///
    /// Propagates client construction failures.
    fn create(&self) -> FetchResult<Arc<dyn Net>>;
}

/// Factory producing real [`HttpClient`] sessions.
pub struct ReqwestSessionFactory {
    options: mediavault_core::DownloadOptions,
}

impl ReqwestSessionFactory {
    pub fn new(options: mediavault_core::DownloadOptions) -> Self {
        Self { options }
    }
}

impl SessionFactory for ReqwestSessionFactory {
    fn create(&self) -> FetchResult<Arc<dyn Net>> {
        Ok(Arc::new(HttpClient::new(&self.options)?))
    }
}

/// Lazily-initialized session with explicit invalidation.
pub struct SessionProvider<F> {
    // `current` is declared before `factory` so the cached session is
    // dropped before the factory that produced it. Fields drop in
    // declaration order, and with mock-backed factories that hand out
    // clones the shared original must outlive every clone.
    current: RwLock<Option<Arc<dyn Net>>>,
    factory: F,
}

impl<F: SessionFactory> SessionProvider<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            current: RwLock::new(None),
        }
    }

    /// Current session, creating one if none is live.
    ///
    /// # Errors
    ///
    /// Propagates factory failures; no session is cached on failure.
    pub fn get(&self) -> FetchResult<Arc<dyn Net>> {
        if let Some(session) = self.current.read().as_ref() {
            return Ok(session.clone());
        }
        let mut guard = self.current.write();
        // Another caller may have won the race between the read and
        // write lock; reuse theirs.
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }
        let session = self.factory.create()?;
        debug!("created new HTTP session");
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Drop the live session; the next [`get`](Self::get) builds a
    /// fresh one.
    pub fn invalidate(&self) {
        debug!("invalidating HTTP session");
        *self.current.write() = None;
    }
}
