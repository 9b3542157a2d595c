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

//! # Fleetlock Distributed Locks
//!
//! ## Purpose
//! Advisory lock/lease coordination for a fleet of peer worker processes.
//! Every worker may observe the same external event, but only the one that
//! wins the lock for that event's id acts on it. Leases are time-bounded and
//! auto-renewed by a background heartbeat; when a holder dies its lease
//! expires and another contender steals the lock.
//!
//! ## Architecture Context
//! The lock manager is the client-facing surface. It drives a state machine
//! over a [`store::LockStore`] backend (conditional writes against the
//! backing table), keeps a process-local registry of held leases, and runs a
//! single background heartbeat task that renews every registry entry.
//!
//! ## Design Decisions
//! - **Version-based optimistic locking**: every write carries a fresh
//!   record version; renewals and steals are conditional on the version
//!   observed at read time.
//! - **Timestamp-based expiration**: a record is expired once
//!   `now_ms - last_updated_ms > lease_duration_ms`; only contenders
//!   evaluate this, holders rely on CAS feedback.
//! - **Abandonment**: a holder voluntarily gives up a lease whose
//!   `created_at_ms` is older than a configured threshold, bounding how long
//!   one unit of work can monopolize an id.
//! - **The registry is a belief, not the truth**: any operation may discover
//!   the backing store disagrees and must evict the local entry.
//!
//! ## Backend Support
//! - **InMemory**: HashMap-based (feature: `memory-backend`, for testing and
//!   single-process use)
//! - **DynamoDB**: conditional writes + native TTL (feature: `ddb-backend`)
//!
//! ## Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fleetlock_locks::{memory::MemoryLockStore, LockConfig, LockManager};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryLockStore::new());
//! let manager = LockManager::start(store, LockConfig::default())?;
//!
//! let cancel = CancellationToken::new();
//!
//! // Acquire the lock for an inbound event, do the work, release.
//! let lock = manager.acquire(&cancel, "event-1234", Vec::new()).await?;
//! // ... handle the event ...
//! manager.release(&cancel, &lock.lock_id).await?;
//!
//! manager.close().await;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod manager;
pub mod record;
pub mod store;

mod heartbeat;
mod registry;

#[cfg(feature = "ddb-backend")]
pub mod ddb;

#[cfg(feature = "memory-backend")]
pub mod memory;

pub use config::LockConfig;
pub use error::{LockError, LockResult, StoreError, StoreResult};
pub use manager::LockManager;
pub use record::LockRecord;
pub use store::LockStore;
