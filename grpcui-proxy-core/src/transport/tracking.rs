//! # Error Tracking Wrappers
//!
//! `tonic` may attempt a connection several times and only surfaces a generic transport error
//! once it gives up. These wrappers sit below it and remember the last concrete failure they
//! saw, without altering the outcome of any attempt.
//!
//! Several attempts may run concurrently against the same wrapper. The slot is last-writer-wins:
//! only the most recent failure matters for diagnosis.
use super::{BoxFuture, BoxedIo, NetworkConnector, SharedError, TransportCredentials};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A single-slot store for the last observed error.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    last: Mutex<Option<SharedError>>,
}

impl ErrorSlot {
    /// Stores `err`, replacing any previously recorded error.
    pub fn record(&self, err: SharedError) {
        *self.lock() = Some(err);
    }

    /// Returns the last recorded error, if any.
    pub fn get(&self) -> Option<SharedError> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<SharedError>> {
        // A panic while holding the lock can't leave an `Option` half written.
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Records every failed connection attempt of the wrapped [`NetworkConnector`].
pub struct TrackingConnector {
    inner: Arc<dyn NetworkConnector>,
    last_error: ErrorSlot,
}

impl TrackingConnector {
    pub fn new(inner: Arc<dyn NetworkConnector>) -> Self {
        Self {
            inner,
            last_error: ErrorSlot::default(),
        }
    }

    /// The error returned by the most recent failed connection attempt.
    pub fn last_error(&self) -> Option<SharedError> {
        self.last_error.get()
    }
}

impl NetworkConnector for TrackingConnector {
    fn connect<'a>(&'a self, authority: &'a str) -> BoxFuture<'a, Result<BoxedIo, SharedError>> {
        Box::pin(async move {
            let result = self.inner.connect(authority).await;

            if let Err(err) = &result {
                self.last_error.record(Arc::clone(err));
            }

            result
        })
    }
}

/// Records every failed handshake of the wrapped [`TransportCredentials`].
pub struct TrackingCredentials {
    inner: Arc<dyn TransportCredentials>,
    last_error: ErrorSlot,
}

impl TrackingCredentials {
    pub fn new(inner: Arc<dyn TransportCredentials>) -> Self {
        Self {
            inner,
            last_error: ErrorSlot::default(),
        }
    }

    /// The error returned by the most recent failed handshake.
    pub fn last_error(&self) -> Option<SharedError> {
        self.last_error.get()
    }
}

impl TransportCredentials for TrackingCredentials {
    fn client_handshake<'a>(
        &'a self,
        authority: &'a str,
        io: BoxedIo,
    ) -> BoxFuture<'a, Result<BoxedIo, SharedError>> {
        Box::pin(async move {
            let result = self.inner.client_handshake(authority, io).await;

            if let Err(err) = &result {
                self.last_error.record(Arc::clone(err));
            }

            result
        })
    }
}
