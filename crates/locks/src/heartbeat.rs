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

//! Background lease-renewal task.
//!
//! One task per manager. Each tick snapshots the registry ids (under the
//! read guard, released before any remote call), heartbeats them all in
//! parallel, and aggregates failures. The task never exits on error; only
//! `close` stops it. In-flight heartbeats observe the shutdown token and
//! short-circuit.

use crate::error::LockError;
use crate::manager::LockManager;
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

pub(crate) async fn run(manager: Arc<LockManager>) {
    let period = Duration::from_secs(u64::from(manager.config.heartbeat_interval_secs));
    // First tick one full period after start, like a ticker.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = manager.shutdown.cancelled() => {
                info!("stopping background heartbeat task");
                return;
            }
            _ = ticker.tick() => {
                run_tick(&manager).await;
            }
        }
    }
}

async fn run_tick(manager: &LockManager) {
    let ids = manager.registry.ids().await;
    if ids.is_empty() {
        return;
    }

    let results = join_all(
        ids.iter()
            .map(|id| manager.heartbeat(&manager.shutdown, id, None)),
    )
    .await;

    let mut failures = Vec::new();
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(()) => {}
            Err(LockError::Abandoned(_)) => {
                // The heartbeat already evicted the entry; removing again is
                // a no-op that keeps the sweep self-contained.
                manager.registry.remove(id).await;
                info!(lock_id = %id, "abandoned lock evicted from registry");
            }
            Err(LockError::Unavailable) => {
                debug!(lock_id = %id, "lease lost during heartbeat sweep");
            }
            Err(LockError::NotFound(_)) => {
                // Released between the snapshot and the heartbeat.
            }
            Err(LockError::Cancelled) => {
                debug!(lock_id = %id, "heartbeat cancelled by shutdown");
            }
            Err(err) => {
                failures.push(format!("{}: {}", id, err));
            }
        }
    }

    if !failures.is_empty() {
        error!(failures = %failures.join("; "), "failed to heartbeat locks");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use crate::config::LockConfig;
    use crate::memory::MemoryLockStore;
    use crate::store::LockStore;
    use tokio::time::sleep;
    use tokio_util::sync::CancellationToken;

    fn fast_config(owner: &str) -> LockConfig {
        LockConfig {
            owner: owner.to_string(),
            lease_duration_secs: 2,
            heartbeat_interval_secs: 1,
            ..LockConfig::default()
        }
    }

    #[tokio::test]
    async fn test_background_task_renews_held_locks() {
        let store = Arc::new(MemoryLockStore::new());
        let manager = LockManager::start(store.clone(), fast_config("host-a-1")).unwrap();
        let cancel = CancellationToken::new();

        let record = manager.acquire(&cancel, "job-1", Vec::new()).await.unwrap();

        // First tick lands one interval in; give it some slack.
        sleep(Duration::from_millis(1_400)).await;

        let stored = store.get("job-1").await.unwrap().unwrap();
        assert_ne!(stored.record_version, record.record_version);
        assert!(stored.last_updated_ms > record.last_updated_ms);
        assert_eq!(stored.created_at_ms, record.created_at_ms);

        manager.close().await;
    }

    #[tokio::test]
    async fn test_background_task_abandons_old_holds() {
        let store = Arc::new(MemoryLockStore::new());
        let config = LockConfig {
            abandonment_threshold_ms: 300,
            ..fast_config("host-a-1")
        };
        let manager = LockManager::start(store.clone(), config).unwrap();
        let cancel = CancellationToken::new();

        let record = manager.acquire(&cancel, "job-1", Vec::new()).await.unwrap();

        // By the first tick the hold is past the threshold: the sweep must
        // evict it locally without a remote write.
        sleep(Duration::from_millis(1_400)).await;

        assert_eq!(manager.registry.len().await, 0);
        let stored = store.get("job-1").await.unwrap().unwrap();
        assert_eq!(stored.record_version, record.record_version);

        manager.close().await;
    }

    #[tokio::test]
    async fn test_background_task_survives_lost_lease() {
        let store = Arc::new(MemoryLockStore::new());
        let manager = LockManager::start(store.clone(), fast_config("host-a-1")).unwrap();
        let cancel = CancellationToken::new();

        let record = manager.acquire(&cancel, "job-1", Vec::new()).await.unwrap();

        // Replace the row behind the manager's back.
        store.delete(&record).await.unwrap();
        let now_ms = clock::now_ms();
        store
            .put_new(&crate::record::LockRecord {
                lock_id: "job-1".to_string(),
                owner: "host-b-1".to_string(),
                lease_duration_ms: 10_000,
                last_updated_ms: now_ms,
                created_at_ms: now_ms,
                record_version: clock::new_version_id(),
                shard: 0,
                ttl_epoch_s: now_ms / 1000 + 100,
                payload: Vec::new(),
            })
            .await
            .unwrap();

        sleep(Duration::from_millis(1_400)).await;

        // The sweep noticed the lost lease, evicted it, and kept running.
        assert_eq!(manager.registry.len().await, 0);
        let stored = store.get("job-1").await.unwrap().unwrap();
        assert_eq!(stored.owner, "host-b-1");

        manager.close().await;
    }
}
