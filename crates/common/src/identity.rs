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

//! Process identity helpers.

/// Build a stable identifier for this process: `<hostname>-<pid>`.
///
/// Every lock row carries this identity as its `Owner` attribute so that a
/// fleet of peer workers can tell which process holds a lease. The hostname
/// comes from the `HOSTNAME` environment variable (set by containers and most
/// shells); an unset variable falls back to `"unknown"`, which is still
/// unique per host+pid in practice.
pub fn host_identity() -> String {
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
    format!("{}-{}", hostname, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_identity_ends_with_pid() {
        let identity = host_identity();
        assert!(identity.ends_with(&std::process::id().to_string()));
        assert!(identity.contains('-'));
    }

    #[test]
    fn test_host_identity_is_stable() {
        assert_eq!(host_identity(), host_identity());
    }
}
