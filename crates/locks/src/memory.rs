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

//! In-memory lock store implementation (for testing).
//!
//! Applies the same conditional-write predicates as the DynamoDB backend,
//! evaluated atomically under one write lock, so the manager's state machine
//! can be exercised without a remote table.
//!
//! ## Limitations
//! - Not persistent (rows lost on restart)
//! - Not distributed (single process only)
//! - No TTL cleanup (expired rows remain until overwritten or deleted)

use crate::error::{StoreError, StoreResult};
use crate::record::LockRecord;
use crate::store::LockStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory [`LockStore`] backend.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    rows: RwLock<HashMap<String, LockRecord>>,
}

impl MemoryLockStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn get(&self, id: &str) -> StoreResult<Option<LockRecord>> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn put_new(&self, record: &LockRecord) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&record.lock_id) {
            return Err(StoreError::PreconditionFailed);
        }
        rows.insert(record.lock_id.clone(), record.clone());
        Ok(())
    }

    async fn put_existing(
        &self,
        record: &LockRecord,
        prior: &LockRecord,
        now_ms: i64,
    ) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        let current = rows
            .get(&record.lock_id)
            .ok_or(StoreError::PreconditionFailed)?;

        let version_matches = current.record_version == prior.record_version;
        let owner_or_expired = current.owner == record.owner
            || current.last_updated_ms < now_ms - record.lease_duration_ms;
        if !(version_matches && owner_or_expired) {
            return Err(StoreError::PreconditionFailed);
        }

        rows.insert(record.lock_id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, record: &LockRecord) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        let current = rows
            .get(&record.lock_id)
            .ok_or(StoreError::PreconditionFailed)?;

        if current.record_version != record.record_version || current.owner != record.owner {
            return Err(StoreError::PreconditionFailed);
        }

        rows.remove(&record.lock_id);
        Ok(())
    }
}
