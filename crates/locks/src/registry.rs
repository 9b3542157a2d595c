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

//! Process-local registry of leases this process believes it holds.
//!
//! The registry is a belief, not the truth: the backing store may disagree
//! at any time (another process wins a steal), and every operation that
//! discovers a disagreement evicts the local entry. One read/write lock
//! guards the whole map; the lock is held only around in-memory lookups and
//! mutations, never across remote I/O.

use crate::record::LockRecord;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub(crate) struct LockRegistry {
    inner: RwLock<HashMap<String, LockRecord>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently observed record for `id`, if this process holds it.
    pub async fn get(&self, id: &str) -> Option<LockRecord> {
        self.inner.read().await.get(id).cloned()
    }

    /// Publish a record after a successful acquire or heartbeat.
    pub async fn insert(&self, record: LockRecord) {
        self.inner
            .write()
            .await
            .insert(record.lock_id.clone(), record);
    }

    /// Evict `id`, returning the record that was held.
    pub async fn remove(&self, id: &str) -> Option<LockRecord> {
        self.inner.write().await.remove(id)
    }

    /// Snapshot of the held ids for the heartbeat sweep. Taken under the
    /// read guard and released before any remote call.
    pub async fn ids(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> LockRecord {
        LockRecord {
            lock_id: id.to_string(),
            owner: "host-1-42".to_string(),
            lease_duration_ms: 10_000,
            last_updated_ms: 1_000,
            created_at_ms: 1_000,
            record_version: "v1".to_string(),
            shard: 0,
            ttl_epoch_s: 101,
            payload: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = LockRegistry::new();
        assert!(registry.get("job-1").await.is_none());

        registry.insert(record("job-1")).await;
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("job-1").await.unwrap().lock_id, "job-1");

        let removed = registry.remove("job-1").await;
        assert!(removed.is_some());
        assert!(registry.get("job-1").await.is_none());
        assert!(registry.remove("job-1").await.is_none());
    }

    #[tokio::test]
    async fn test_insert_replaces_prior_record() {
        let registry = LockRegistry::new();
        registry.insert(record("job-1")).await;

        let mut renewed = record("job-1");
        renewed.record_version = "v2".to_string();
        registry.insert(renewed).await;

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("job-1").await.unwrap().record_version, "v2");
    }

    #[tokio::test]
    async fn test_ids_snapshot() {
        let registry = LockRegistry::new();
        registry.insert(record("job-1")).await;
        registry.insert(record("job-2")).await;

        let mut ids = registry.ids().await;
        ids.sort();
        assert_eq!(ids, vec!["job-1".to_string(), "job-2".to_string()]);
    }
}
