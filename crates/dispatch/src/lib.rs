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

//! # Fleetlock Dispatch
//!
//! ## Purpose
//! The client-shell side of the lock service: every worker in the fleet sees
//! every inbound event, so each event is dispatched through the lock manager
//! and only the instance that wins the event's lock runs the handler. Losing
//! the lock is the normal case for all but one instance and is silently
//! skipped.
//!
//! The event transport and the work itself stay behind the [`EventHandler`]
//! trait; this crate only owns the acquire/handle/release discipline.

mod dispatcher;
mod payload;

pub use dispatcher::{DispatchError, DispatchResult, EventHandler, LockingDispatcher};
pub use payload::DispatchPayload;
