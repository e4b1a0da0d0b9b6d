//! Reactive fetch.
//!
//! [`QueryCache`] keeps one entry per distinct request descriptor. Handles
//! observe the entry's [`QueryState`] through a `tokio::sync::watch`
//! channel, so any number of subscribers share a single in-flight request.
//!
//! ```ignore
//! let cache = QueryCache::new(Arc::new(fetcher));
//! let mut posts = cache.query(RequestDescriptor::new(POSTS).with_token());
//! let state = posts.settled().await;
//! if state.is_loading() { /* spinner */ }
//! ```

use crate::error::ClientError;
use crate::fetch::Fetcher;
use crate::request::RequestDescriptor;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

/// What a subscriber sees.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    /// Last successful data, or the seed.
    pub data: Option<serde_json::Value>,
    /// Error from the last revalidation.
    pub error: Option<ClientError>,
    /// A request is in flight.
    pub is_validating: bool,
}

impl QueryState {
    /// Neither data nor an error is available yet.
    pub fn is_loading(&self) -> bool {
        self.error.is_none() && self.data.is_none()
    }
}

struct Entry {
    descriptor: RequestDescriptor,
    state: watch::Sender<QueryState>,
    in_flight: AtomicBool,
}

/// Deduplicating store of reactive queries.
///
/// Entries outlive their handles so a later subscriber sees the last data
/// immediately. They are only dropped by [`QueryCache::evict`] or
/// [`QueryCache::clear`]; long-running processes that build many distinct
/// descriptors should evict the ones they are done with.
#[derive(Clone)]
pub struct QueryCache {
    fetcher: Arc<Fetcher>,
    entries: Arc<Mutex<FxHashMap<String, Arc<Entry>>>>,
}

impl QueryCache {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            entries: Arc::new(Mutex::new(FxHashMap::default())),
        }
    }

    /// Subscribes to `descriptor`.
    ///
    /// The first subscription creates the entry, seeds it with
    /// `initial_data` and starts a fetch. Later subscriptions to an
    /// equivalent descriptor share that entry without fetching again.
    /// Must be called inside a tokio runtime.
    pub fn query(&self, descriptor: RequestDescriptor) -> QueryHandle {
        let key = descriptor.cache_key();
        let (entry, created) = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            match entries.get(&key) {
                Some(entry) => (entry.clone(), false),
                None => {
                    let initial = QueryState {
                        data: descriptor.initial_data.clone(),
                        ..QueryState::default()
                    };
                    let (state, _) = watch::channel(initial);
                    let entry = Arc::new(Entry {
                        descriptor,
                        state,
                        in_flight: AtomicBool::new(false),
                    });
                    entries.insert(key.clone(), entry.clone());
                    (entry, true)
                }
            }
        };

        if created {
            self.spawn_revalidate(&entry);
        } else {
            debug!(key = %key, "Reusing cached query");
        }

        QueryHandle {
            receiver: entry.state.subscribe(),
            key,
            entry,
            cache: self.clone(),
        }
    }

    /// Drops the entry for `descriptor`. Existing handles keep their state.
    pub fn evict(&self, descriptor: &RequestDescriptor) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&descriptor.cache_key())
            .is_some()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts a fetch unless one is already running for the entry.
    fn spawn_revalidate(&self, entry: &Arc<Entry>) -> bool {
        if entry.in_flight.swap(true, Ordering::SeqCst) {
            return false;
        }
        entry.state.send_modify(|s| s.is_validating = true);

        let fetcher = self.fetcher.clone();
        let entry = entry.clone();
        tokio::spawn(async move {
            let outcome = revalidate(&fetcher, &entry.descriptor).await;
            // `in_flight` is cleared while the state lock is held, so a
            // subscriber that sees `is_validating == false` can revalidate.
            entry.state.send_modify(|s| {
                match outcome {
                    Ok(data) => {
                        s.data = Some(data);
                        s.error = None;
                    }
                    Err(err) => s.error = Some(err),
                }
                s.is_validating = false;
                entry.in_flight.store(false, Ordering::SeqCst);
            });
        });
        true
    }
}

/// Fetches once, refreshing the token on any error.
///
/// The request is re-sent with the refreshed token while attempts remain.
/// A failed refresh is logged and the request's own error is kept.
async fn revalidate(
    fetcher: &Fetcher,
    descriptor: &RequestDescriptor,
) -> Result<serde_json::Value, ClientError> {
    let attempts = fetcher.config().auth_attempts.max(1);
    let mut token = fetcher.stored_token(descriptor)?;
    let mut attempt = 1;

    loop {
        let result = fetcher
            .send_with(descriptor, token.as_deref())
            .await
            .and_then(|response| response.into_data());

        let err = match result {
            Ok(data) => return Ok(data),
            Err(err) => err,
        };

        if !descriptor.use_token {
            return Err(err);
        }

        debug!(attempt, "Query failed: {}", err);
        match fetcher.refresh().await {
            Ok(fresh) => token = Some(fresh),
            Err(refresh_err) => {
                warn!("Token refresh after query error failed: {}", refresh_err);
                return Err(err);
            }
        }

        if attempt >= attempts {
            return Err(err);
        }
        attempt += 1;
    }
}

/// A subscription to one cached query.
pub struct QueryHandle {
    key: String,
    entry: Arc<Entry>,
    receiver: watch::Receiver<QueryState>,
    cache: QueryCache,
}

impl QueryHandle {
    /// Cache key of the query.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state snapshot.
    pub fn state(&self) -> QueryState {
        self.receiver.borrow().clone()
    }

    pub fn data(&self) -> Option<serde_json::Value> {
        self.receiver.borrow().data.clone()
    }

    pub fn error(&self) -> Option<ClientError> {
        self.receiver.borrow().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.receiver.borrow().is_loading()
    }

    /// Waits for the next state change.
    pub async fn changed(&mut self) -> QueryState {
        // The sender lives in `entry`, which this handle keeps alive.
        let _ = self.receiver.changed().await;
        self.receiver.borrow_and_update().clone()
    }

    /// Waits until no request is in flight and returns the state.
    pub async fn settled(&mut self) -> QueryState {
        if let Ok(state) = self.receiver.wait_for(|s| !s.is_validating).await {
            return state.clone();
        }
        self.receiver.borrow().clone()
    }

    /// Fetches again. Returns false if a fetch is already running.
    pub fn revalidate(&self) -> bool {
        self.cache.spawn_revalidate(&self.entry)
    }
}
