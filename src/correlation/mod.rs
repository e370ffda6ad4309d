//! Correlation table for in-flight requests
//!
//! Maps a correlation id to the one-shot completion its caller is waiting on.
//! Each entry is delivered at most once: resolving, rejecting, or removing it
//! takes it out of the table, and later frames for the same id are dropped.

use crate::{RequestError, RequestResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

type Completion = oneshot::Sender<RequestResult<Value>>;

/// A request waiting for its response
struct PendingRequest {
    completion: Completion,
    created_at: Instant,
}

/// Table of pending requests keyed by correlation id
#[derive(Default)]
pub struct CorrelationTable {
    pending: Mutex<HashMap<u64, PendingRequest>>,
}

/// Receiving half of a registered request
#[derive(Debug)]
pub struct ResponseHandle {
    id: u64,
    receiver: oneshot::Receiver<RequestResult<Value>>,
}

impl ResponseHandle {
    /// The correlation id this handle waits on
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the response
    ///
    /// If the table entry disappears without a result (the table itself was
    /// dropped) the request is reported as closed.
    pub async fn wait(self) -> RequestResult<Value> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(RequestError::ConnectionClosed(
                "correlation table dropped".to_string(),
            )),
        }
    }
}

impl CorrelationTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new pending request
    ///
    /// Fails with `DuplicateId` if the id is already pending.
    pub fn register(&self, id: u64) -> RequestResult<ResponseHandle> {
        let mut pending = self.pending.lock();
        if pending.contains_key(&id) {
            return Err(RequestError::DuplicateId(id));
        }

        let (completion, receiver) = oneshot::channel();
        pending.insert(
            id,
            PendingRequest {
                completion,
                created_at: Instant::now(),
            },
        );
        tracing::trace!(id, pending = pending.len(), "registered pending request");

        Ok(ResponseHandle { id, receiver })
    }

    /// Delivers a value to the waiter of `id`
    ///
    /// Returns false if nothing was pending under `id`.
    pub fn resolve(&self, id: u64, value: Value) -> bool {
        self.complete(id, Ok(value))
    }

    /// Delivers an error to the waiter of `id`
    ///
    /// Returns false if nothing was pending under `id`.
    pub fn reject(&self, id: u64, error: RequestError) -> bool {
        self.complete(id, Err(error))
    }

    /// Removes `id` without notifying its waiter
    ///
    /// Used to roll back a registration whose caller already has its answer
    /// (send failure or timeout).
    pub fn remove(&self, id: u64) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Rejects every pending request with `error` and empties the table
    ///
    /// Returns the number of requests rejected.
    pub fn drain_all(&self, error: RequestError) -> usize {
        let drained: Vec<(u64, PendingRequest)> = self.pending.lock().drain().collect();
        let count = drained.len();

        for (id, request) in drained {
            tracing::debug!(
                id,
                waited_ms = request.created_at.elapsed().as_millis() as u64,
                "rejecting pending request: {}",
                error
            );
            let _ = request.completion.send(Err(error.clone()));
        }

        count
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns whether no request is pending
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Sorted ids of the pending requests (for diagnostics)
    pub fn pending_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.pending.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Age of the oldest pending request
    pub fn oldest_age(&self) -> Option<Duration> {
        self.pending
            .lock()
            .values()
            .map(|request| request.created_at.elapsed())
            .max()
    }

    fn complete(&self, id: u64, result: RequestResult<Value>) -> bool {
        // Remove under the lock, deliver outside it
        let Some(request) = self.pending.lock().remove(&id) else {
            return false;
        };

        if request.completion.send(result).is_err() {
            tracing::debug!(id, "waiter went away before its response arrived");
        }
        true
    }
}
