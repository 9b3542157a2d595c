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

//! Storage-adapter trait for lock records.

use crate::error::StoreResult;
use crate::record::LockRecord;
use async_trait::async_trait;

/// Conditional-write access to the backing lock table.
///
/// All writes are conditional; the backing store's "condition not met"
/// failure surfaces as [`crate::StoreError::PreconditionFailed`] and every
/// other remote error as [`crate::StoreError::Backend`]. Reads are strongly
/// consistent. Implementations must be safe for concurrent use behind an
/// `Arc`.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Read the current record for `id`, strongly consistent.
    async fn get(&self, id: &str) -> StoreResult<Option<LockRecord>>;

    /// Write `record` predicated on no row existing for its id.
    async fn put_new(&self, record: &LockRecord) -> StoreResult<()>;

    /// Write `record` over the row last observed as `prior`, predicated on
    ///
    /// ```text
    /// record_version == prior.record_version
    /// AND (owner == prior.owner OR last_updated_ms < now_ms - lease_duration_ms)
    /// ```
    ///
    /// The single predicate covers both a holder renewing its own lease and
    /// a contender stealing an expired one: the version equality ensures no
    /// concurrent writer altered the row since `prior` was read, and the
    /// disjunction admits a different owner only once the lease has lapsed.
    async fn put_existing(
        &self,
        record: &LockRecord,
        prior: &LockRecord,
        now_ms: i64,
    ) -> StoreResult<()>;

    /// Delete the row for `record`, predicated on the row still carrying the
    /// same `record_version` and `owner`.
    async fn delete(&self, record: &LockRecord) -> StoreResult<()>;
}
