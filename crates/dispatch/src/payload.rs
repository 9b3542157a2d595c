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

//! Typed payload carried inside a lock record.

use crate::dispatcher::DispatchError;
use serde::{Deserialize, Serialize};

/// What a worker stows in the lock row while it handles an event.
///
/// The lock service treats payloads as opaque bytes; this is the dispatch
/// shell's own shape, serialized as JSON so operators inspecting the table
/// can read it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPayload {
    /// Identifier of the upstream message that triggered the event.
    pub message_id: String,
}

impl DispatchPayload {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
        }
    }

    /// Serialize into the opaque bytes stored with the lock.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DispatchError> {
        serde_json::to_vec(self).map_err(|e| DispatchError::Payload(e.to_string()))
    }

    /// Decode bytes read back from a lock record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DispatchError> {
        serde_json::from_slice(bytes).map_err(|e| DispatchError::Payload(e.to_string()))
    }
}
