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

//! Error types for distributed lock operations.

use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors surfaced by the lock manager.
#[derive(Error, Debug)]
pub enum LockError {
    /// Another live holder exists, or a conditional write lost a race.
    #[error("lock is currently unavailable")]
    Unavailable,

    /// The operation referred to a lock this process does not believe it holds.
    #[error("lock not found: {0}")]
    NotFound(String),

    /// The local holder exceeded the abandonment threshold.
    #[error("lock abandoned: {0}")]
    Abandoned(String),

    /// The remote delete on release failed; the local entry stays evicted.
    #[error("failed to release lock {id}: {reason}")]
    ReleaseFailed { id: String, reason: String },

    /// Any non-precondition backing-store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Malformed arguments or configuration violation.
    #[error("invalid argument: {0}")]
    Invalid(String),
}

/// Result type for storage-adapter operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a [`crate::store::LockStore`] backend.
///
/// Conditional-write failures are a distinct, expected signal: they mean the
/// row no longer matches what the caller last observed, not that the backend
/// misbehaved.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The conditional write's predicate did not hold at CAS time.
    #[error("conditional check failed")]
    PreconditionFailed,

    /// Transport or backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for LockError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PreconditionFailed => LockError::Unavailable,
            StoreError::Backend(msg) => LockError::Storage(msg),
        }
    }
}
