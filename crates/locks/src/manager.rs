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

//! The lock manager: acquisition, renewal, release, shutdown.
//!
//! ## Purpose
//! Drives the per-id state machine (`Free -> Held -> Free`) over a
//! [`LockStore`] backend: one strongly-consistent read, one conditional
//! write, and registry bookkeeping per operation. A background heartbeat
//! task renews every held lease until [`LockManager::close`] is called.
//!
//! ## Behavior
//! - **acquire**: absent row -> conditional create; live row -> unavailable;
//!   expired row -> steal under the CAS predicate.
//! - **heartbeat**: renews a lease this process believes it holds, preserving
//!   `created_at_ms`; a conditional failure means the lease was lost and the
//!   local entry is evicted. A lease older than the abandonment threshold is
//!   given up without a remote write.
//! - **release**: evicts the local entry first, then best-effort conditional
//!   delete; the next rightful contender observes expiry regardless.
//! - **close**: signals the heartbeat task and waits for it; held locks are
//!   left to expire.

use crate::clock;
use crate::config::LockConfig;
use crate::error::{LockError, LockResult, StoreError};
use crate::heartbeat;
use crate::record::LockRecord;
use crate::registry::LockRegistry;
use crate::store::LockStore;
use rand::Rng;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Largest payload accepted for a lock record. Keeps items comfortably under
/// the backing store's item-size limit.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

/// Distributed advisory lock manager.
///
/// One instance per process; cheap to share behind the `Arc` returned by
/// [`LockManager::start`]. All operations take a cancellation token that
/// aborts outstanding remote I/O.
pub struct LockManager {
    pub(crate) store: Arc<dyn LockStore>,
    pub(crate) config: LockConfig,
    pub(crate) registry: Arc<LockRegistry>,
    pub(crate) shutdown: CancellationToken,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

impl LockManager {
    /// Validate `config`, construct the manager, and start the background
    /// heartbeat task. Must be called from within a tokio runtime.
    pub fn start(store: Arc<dyn LockStore>, config: LockConfig) -> LockResult<Arc<Self>> {
        config.validate()?;

        let manager = Arc::new(Self {
            store,
            config,
            registry: Arc::new(LockRegistry::new()),
            shutdown: CancellationToken::new(),
            heartbeat_task: Mutex::new(None),
        });

        let handle = tokio::spawn(heartbeat::run(Arc::clone(&manager)));
        if let Ok(mut slot) = manager.heartbeat_task.lock() {
            *slot = Some(handle);
        }

        Ok(manager)
    }

    /// The identity this process writes into every row it owns.
    pub fn owner(&self) -> &str {
        &self.config.owner
    }

    /// Attempt to obtain the lock named `id`, carrying `payload`.
    ///
    /// ## Returns
    /// - `Ok(LockRecord)`: this process now holds the lease
    /// - `Err(LockError::Unavailable)`: another live holder exists, or a
    ///   conditional write lost a race
    /// - `Err(LockError::Storage)`: backing-store failure
    /// - `Err(LockError::Invalid)`: empty id or oversize payload
    #[instrument(skip(self, cancel, payload), fields(lock_id = %id, owner = %self.config.owner))]
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
        id: &str,
        payload: Vec<u8>,
    ) -> LockResult<LockRecord> {
        if id.is_empty() {
            return Err(LockError::Invalid("lock id must not be empty".to_string()));
        }
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(LockError::Invalid(format!(
                "payload exceeds {} bytes",
                MAX_PAYLOAD_BYTES
            )));
        }
        if cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }

        let now_ms = clock::now_ms();
        let existing = tokio::select! {
            _ = cancel.cancelled() => return Err(LockError::Cancelled),
            res = self.store.get(id) => res.map_err(LockError::from)?,
        };

        let Some(prior) = existing else {
            return self.acquire_fresh(cancel, id, payload, now_ms).await;
        };

        if !prior.is_expired(now_ms) {
            debug!(
                lock_id = %id,
                holder = %prior.owner,
                "lock held by a live lease"
            );
            return Err(LockError::Unavailable);
        }

        self.acquire_steal(cancel, prior, payload, now_ms).await
    }

    /// Conditional create on a key with no row.
    async fn acquire_fresh(
        &self,
        cancel: &CancellationToken,
        id: &str,
        payload: Vec<u8>,
        now_ms: i64,
    ) -> LockResult<LockRecord> {
        let shard = rand::thread_rng().gen_range(0..self.config.max_shards);
        let record = LockRecord {
            lock_id: id.to_string(),
            owner: self.config.owner.clone(),
            lease_duration_ms: self.config.lease_duration_ms(),
            last_updated_ms: now_ms,
            created_at_ms: now_ms,
            record_version: clock::new_version_id(),
            shard,
            ttl_epoch_s: self.config.ttl_epoch_s(now_ms),
            payload,
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(LockError::Cancelled),
            res = self.store.put_new(&record) => res,
        };

        match result {
            Ok(()) => {
                self.registry.insert(record.clone()).await;
                metrics::counter!("fleetlock_locks_acquired_total", "mode" => "fresh").increment(1);
                info!(
                    lock_id = %record.lock_id,
                    record_version = %record.record_version,
                    "acquired lock"
                );
                Ok(record)
            }
            Err(StoreError::PreconditionFailed) => {
                debug!(lock_id = %record.lock_id, "lost creation race");
                Err(LockError::Unavailable)
            }
            Err(StoreError::Backend(msg)) => {
                error!(lock_id = %record.lock_id, error = %msg, "failed to create lock");
                Err(LockError::Storage(msg))
            }
        }
    }

    /// Take over an expired lease under the CAS predicate.
    async fn acquire_steal(
        &self,
        cancel: &CancellationToken,
        prior: LockRecord,
        payload: Vec<u8>,
        now_ms: i64,
    ) -> LockResult<LockRecord> {
        // A same-owner reacquire continues the original hold; a cross-owner
        // steal starts a new one, so the abandonment clock restarts.
        let created_at_ms = if prior.owner == self.config.owner {
            prior.created_at_ms
        } else {
            now_ms
        };

        let record = LockRecord {
            lock_id: prior.lock_id.clone(),
            owner: self.config.owner.clone(),
            lease_duration_ms: self.config.lease_duration_ms(),
            last_updated_ms: now_ms,
            created_at_ms,
            record_version: clock::new_version_id(),
            shard: prior.shard,
            ttl_epoch_s: self.config.ttl_epoch_s(now_ms),
            payload,
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(LockError::Cancelled),
            res = self.store.put_existing(&record, &prior, now_ms) => res,
        };

        match result {
            Ok(()) => {
                self.registry.insert(record.clone()).await;
                metrics::counter!("fleetlock_locks_acquired_total", "mode" => "steal").increment(1);
                info!(
                    lock_id = %record.lock_id,
                    previous_owner = %prior.owner,
                    record_version = %record.record_version,
                    "acquired expired lock"
                );
                Ok(record)
            }
            Err(StoreError::PreconditionFailed) => {
                // Someone else won the steal; whatever we believed about this
                // id is stale.
                self.registry.remove(&record.lock_id).await;
                debug!(lock_id = %record.lock_id, "lost steal race");
                Err(LockError::Unavailable)
            }
            Err(StoreError::Backend(msg)) => {
                error!(lock_id = %record.lock_id, error = %msg, "failed to steal lock");
                Err(LockError::Storage(msg))
            }
        }
    }

    /// Renew a lease this process believes it holds.
    ///
    /// `new_payload: None` carries the existing payload forward verbatim.
    ///
    /// ## Returns
    /// - `Err(LockError::NotFound)`: no local registry entry
    /// - `Err(LockError::Abandoned)`: held past the abandonment threshold;
    ///   local entry evicted, no remote write issued
    /// - `Err(LockError::Unavailable)`: the lease was lost; local entry
    ///   evicted
    #[instrument(skip(self, cancel, new_payload), fields(lock_id = %id, owner = %self.config.owner))]
    pub async fn heartbeat(
        &self,
        cancel: &CancellationToken,
        id: &str,
        new_payload: Option<Vec<u8>>,
    ) -> LockResult<()> {
        if id.is_empty() {
            return Err(LockError::Invalid("lock id must not be empty".to_string()));
        }
        if cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }

        let Some(local) = self.registry.get(id).await else {
            return Err(LockError::NotFound(id.to_string()));
        };

        let now_ms = clock::now_ms();
        if now_ms - local.created_at_ms > self.config.abandonment_threshold_ms {
            self.registry.remove(id).await;
            metrics::counter!("fleetlock_locks_abandoned_total").increment(1);
            debug!(
                lock_id = %id,
                held_ms = now_ms - local.created_at_ms,
                "lock held past abandonment threshold, abandoning"
            );
            return Err(LockError::Abandoned(id.to_string()));
        }

        let payload = match new_payload {
            Some(payload) if payload.len() > MAX_PAYLOAD_BYTES => {
                return Err(LockError::Invalid(format!(
                    "payload exceeds {} bytes",
                    MAX_PAYLOAD_BYTES
                )));
            }
            Some(payload) => payload,
            None => local.payload.clone(),
        };

        let record = LockRecord {
            lock_id: id.to_string(),
            owner: self.config.owner.clone(),
            lease_duration_ms: self.config.lease_duration_ms(),
            last_updated_ms: now_ms,
            created_at_ms: local.created_at_ms,
            record_version: clock::new_version_id(),
            shard: local.shard,
            ttl_epoch_s: self.config.ttl_epoch_s(now_ms),
            payload,
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(LockError::Cancelled),
            res = self.store.put_existing(&record, &local, now_ms) => res,
        };

        match result {
            Ok(()) => {
                self.registry.insert(record).await;
                debug!(lock_id = %id, "renewed lease");
                Ok(())
            }
            Err(StoreError::PreconditionFailed) => {
                self.registry.remove(id).await;
                metrics::counter!("fleetlock_locks_lease_lost_total").increment(1);
                debug!(lock_id = %id, "lease lost to another owner");
                Err(LockError::Unavailable)
            }
            Err(StoreError::Backend(msg)) => {
                error!(lock_id = %id, error = %msg, "failed to renew lease");
                Err(LockError::Storage(msg))
            }
        }
    }

    /// Release a lease this process believes it holds.
    ///
    /// The local entry is evicted first; if the remote delete then fails, the
    /// lease simply expires on its own and the error surfaces as
    /// `ReleaseFailed` without undoing the eviction.
    #[instrument(skip(self, cancel), fields(lock_id = %id, owner = %self.config.owner))]
    pub async fn release(&self, cancel: &CancellationToken, id: &str) -> LockResult<()> {
        if cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }

        let Some(local) = self.registry.remove(id).await else {
            return Err(LockError::NotFound(id.to_string()));
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(LockError::Cancelled),
            res = self.store.delete(&local) => res,
        };

        match result {
            Ok(()) => {
                metrics::counter!("fleetlock_locks_released_total").increment(1);
                debug!(lock_id = %id, "released lock");
                Ok(())
            }
            Err(StoreError::PreconditionFailed) => {
                // The row was already stolen or expired away; nothing to undo.
                debug!(lock_id = %id, "remote delete skipped, lease already lost");
                Err(LockError::ReleaseFailed {
                    id: id.to_string(),
                    reason: "conditional check failed".to_string(),
                })
            }
            Err(StoreError::Backend(msg)) => {
                warn!(lock_id = %id, error = %msg, "failed to delete lock record");
                Err(LockError::ReleaseFailed {
                    id: id.to_string(),
                    reason: msg,
                })
            }
        }
    }

    /// Stop the heartbeat task and wait for it to acknowledge. Outstanding
    /// locks are not released; they are left to expire.
    pub async fn close(&self) {
        self.shutdown.cancel();

        let handle = self
            .heartbeat_task
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "heartbeat task did not shut down cleanly");
            }
        }

        info!(owner = %self.config.owner, "lock manager closed");
    }
}
