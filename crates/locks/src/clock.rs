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

//! Clock and version-identifier source.

use chrono::Utc;
use ulid::Ulid;

/// Wall-clock milliseconds since the UNIX epoch.
///
/// Lease math tolerates modest skew across the fleet; the lease duration is
/// chosen generous relative to expected skew rather than relying on a
/// monotonic adjustment layer.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A globally unique record version, fresh per call.
///
/// ULIDs are time-ordered 128-bit identifiers, so operator scans of the
/// table sort naturally chronological; uniqueness under concurrent creation
/// is the only hard requirement.
pub fn new_version_id() -> String {
    Ulid::new().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_now_ms_is_past_2024() {
        assert!(now_ms() > 1_704_067_200_000);
    }

    #[test]
    fn test_now_ms_is_non_decreasing() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_version_ids_are_unique() {
        let ids: HashSet<String> = (0..1_000).map(|_| new_version_id()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn test_version_ids_are_time_ordered() {
        let a = new_version_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_version_id();
        assert!(b > a);
    }
}
