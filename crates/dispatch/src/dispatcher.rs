// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of Fleetlock.
//
// Fleetlock is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Fleetlock is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Fleetlock. If not, see <https://www.gnu.org/licenses/>.

//! Lock-guarded event dispatch.

use crate::payload::DispatchPayload;
use async_trait::async_trait;
use fleetlock_locks::{LockError, LockManager};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced by the dispatcher.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The handler failed; the event lock was still released.
    #[error("handler error: {0}")]
    Handler(String),

    /// Lock service error other than plain contention.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// Payload serialization error.
    #[error("payload error: {0}")]
    Payload(String),
}

/// The work a worker performs once it wins an event.
///
/// Implementations wrap the actual event sink (a chat reply, a completion
/// call, ...); the dispatcher neither knows nor cares what the work is.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event_id: &str) -> DispatchResult<()>;
}

/// Serializes event handling across a fleet of peer workers.
///
/// Every worker calls [`LockingDispatcher::dispatch`] for every event it
/// observes; the lock manager decides which single worker proceeds.
pub struct LockingDispatcher {
    locks: Arc<LockManager>,
    handler: Arc<dyn EventHandler>,
}

impl LockingDispatcher {
    pub fn new(locks: Arc<LockManager>, handler: Arc<dyn EventHandler>) -> Self {
        Self { locks, handler }
    }

    /// Handle `event_id` if this instance wins its lock.
    ///
    /// ## Returns
    /// - `Ok(true)`: this instance ran the handler
    /// - `Ok(false)`: another instance holds the event; nothing to do here
    /// - `Err(_)`: acquisition failed for a non-contention reason, or the
    ///   handler itself failed
    #[instrument(skip(self, cancel, payload), fields(event_id = %event_id))]
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        event_id: &str,
        payload: &DispatchPayload,
    ) -> DispatchResult<bool> {
        let bytes = payload.to_bytes()?;

        let record = match self.locks.acquire(cancel, event_id, bytes).await {
            Ok(record) => record,
            Err(LockError::Unavailable) => {
                debug!(event_id = %event_id, "event claimed by another instance");
                return Ok(false);
            }
            Err(err) => {
                error!(event_id = %event_id, error = %err, "failed to acquire event lock");
                return Err(err.into());
            }
        };

        let result = self.handler.handle(event_id).await;

        // Release regardless of the handler outcome; a failed remote delete
        // only means the lease will expire on its own.
        if let Err(err) = self.locks.release(cancel, &record.lock_id).await {
            warn!(event_id = %event_id, error = %err, "failed to release event lock");
        }

        result.map(|()| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetlock_locks::{memory::MemoryLockStore, LockConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingHandler {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event_id: &str) -> DispatchResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DispatchError::Handler("boom".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn test_config(owner: &str) -> LockConfig {
        LockConfig {
            owner: owner.to_string(),
            ..LockConfig::default()
        }
    }

    #[tokio::test]
    async fn test_dispatch_runs_handler_and_releases() {
        let store = Arc::new(MemoryLockStore::new());
        let manager = LockManager::start(store, test_config("host-a-1")).unwrap();
        let handler = CountingHandler::new(false);
        let dispatcher = LockingDispatcher::new(manager.clone(), handler.clone());
        let cancel = CancellationToken::new();

        let handled = dispatcher
            .dispatch(&cancel, "event-1", &DispatchPayload::new("m-1"))
            .await
            .unwrap();

        assert!(handled);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        // The lock was released, so the same event can be dispatched again.
        let handled = dispatcher
            .dispatch(&cancel, "event-1", &DispatchPayload::new("m-1"))
            .await
            .unwrap();
        assert!(handled);
    }

    #[tokio::test]
    async fn test_dispatch_skips_event_held_elsewhere() {
        let store = Arc::new(MemoryLockStore::new());
        let manager_a = LockManager::start(store.clone(), test_config("host-a-1")).unwrap();
        let manager_b = LockManager::start(store, test_config("host-b-1")).unwrap();
        let cancel = CancellationToken::new();

        // Instance A is mid-flight on the event.
        manager_a
            .acquire(&cancel, "event-1", Vec::new())
            .await
            .unwrap();

        let handler = CountingHandler::new(false);
        let dispatcher_b = LockingDispatcher::new(manager_b, handler.clone());

        let handled = dispatcher_b
            .dispatch(&cancel, "event-1", &DispatchPayload::new("m-1"))
            .await
            .unwrap();

        assert!(!handled);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_releases_lock_when_handler_fails() {
        let store = Arc::new(MemoryLockStore::new());
        let manager = LockManager::start(store, test_config("host-a-1")).unwrap();
        let failing = CountingHandler::new(true);
        let dispatcher = LockingDispatcher::new(manager.clone(), failing);
        let cancel = CancellationToken::new();

        let err = dispatcher
            .dispatch(&cancel, "event-1", &DispatchPayload::new("m-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Handler(_)));

        // The event is free again despite the failure.
        let ok_handler = CountingHandler::new(false);
        let dispatcher = LockingDispatcher::new(manager, ok_handler.clone());
        let handled = dispatcher
            .dispatch(&cancel, "event-1", &DispatchPayload::new("m-2"))
            .await
            .unwrap();
        assert!(handled);
        assert_eq!(ok_handler.calls.load(Ordering::SeqCst), 1);
    }
}
