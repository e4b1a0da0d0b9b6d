//! Scripted doubles for unit tests.

use crate::error::{ClientError, ClientResult, ErrorCode};
use crate::request::{Request, Response};
use crate::token::{MemoryTokenStore, TokenStore};
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Replays scripted results in order and records every request.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    script: Mutex<VecDeque<ClientResult<Response>>>,
    requests: Mutex<Vec<Request>>,
    delay: Option<Duration>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn push_ok(&self, response: Response) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(response));
    }

    pub(crate) fn push_err(&self, err: ClientError) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(err));
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests whose operation name is `name`.
    pub(crate) fn count_operation(&self, name: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.operation_name.as_deref() == Some(name))
            .count()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: Request) -> ClientResult<Response> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(ClientError::new(
                    ErrorCode::InternalError,
                    "no scripted response left",
                ))
            })
    }
}

/// Memory store that counts every access.
#[derive(Default)]
pub(crate) struct CountingTokenStore {
    inner: MemoryTokenStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingTokenStore {
    pub(crate) fn with_token(token: &str) -> Self {
        Self {
            inner: MemoryTokenStore::with_token(token),
            ..Self::default()
        }
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl TokenStore for CountingTokenStore {
    fn retrieve(&self) -> ClientResult<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.retrieve()
    }

    fn set(&self, token: &str) -> ClientResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(token)
    }

    fn clear(&self) -> ClientResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.clear()
    }
}
