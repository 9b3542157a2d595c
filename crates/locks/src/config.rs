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

//! Lock manager configuration.

use crate::error::{LockError, LockResult};
use fleetlock_common::{host_identity, DynamoDbConfig};

/// Configuration for a [`crate::LockManager`].
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Identity written into every row this process owns (`<hostname>-<pid>`).
    pub owner: String,
    /// Number of shards lock rows are spread across. Shards only feed the
    /// operator-scan index; they do not affect locking.
    pub max_shards: u32,
    /// Lease validity window, seconds.
    pub lease_duration_secs: u32,
    /// Background renewal cadence, seconds. Must be strictly less than the
    /// lease duration; a 3x safety factor is recommended.
    pub heartbeat_interval_secs: u32,
    /// How long a holder may keep one lock before voluntarily abandoning it,
    /// milliseconds.
    pub abandonment_threshold_ms: i64,
    /// Backing table name.
    pub table_name: String,
    /// AWS region.
    pub region: String,
    /// Endpoint override (for DynamoDB Local testing).
    pub endpoint_url: Option<String>,
}

impl Default for LockConfig {
    fn default() -> Self {
        let ddb = DynamoDbConfig::default();
        Self {
            owner: host_identity(),
            max_shards: 2,
            lease_duration_secs: 10,
            heartbeat_interval_secs: 3,
            abandonment_threshold_ms: 300_000,
            table_name: ddb.table_name,
            region: ddb.region,
            endpoint_url: ddb.endpoint_url,
        }
    }
}

impl LockConfig {
    /// Load configuration from the environment, defaulting everything else.
    pub fn from_env() -> Self {
        let ddb = DynamoDbConfig::from_env();
        Self {
            table_name: ddb.table_name,
            region: ddb.region,
            endpoint_url: ddb.endpoint_url,
            ..Self::default()
        }
    }

    /// Validate invariants the lock protocol depends on.
    pub fn validate(&self) -> LockResult<()> {
        if self.owner.is_empty() {
            return Err(LockError::Invalid("owner must not be empty".to_string()));
        }
        if self.max_shards == 0 {
            return Err(LockError::Invalid("max_shards must be positive".to_string()));
        }
        if self.lease_duration_secs == 0 {
            return Err(LockError::Invalid(
                "lease_duration_secs must be positive".to_string(),
            ));
        }
        if self.heartbeat_interval_secs >= self.lease_duration_secs {
            return Err(LockError::Invalid(
                "heartbeat_interval_secs must be strictly less than lease_duration_secs"
                    .to_string(),
            ));
        }
        if self.abandonment_threshold_ms <= 0 {
            return Err(LockError::Invalid(
                "abandonment_threshold_ms must be positive".to_string(),
            ));
        }
        if self.table_name.is_empty() {
            return Err(LockError::Invalid("table_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Lease duration in milliseconds.
    pub fn lease_duration_ms(&self) -> i64 {
        i64::from(self.lease_duration_secs) * 1000
    }

    /// Row-expiry timestamp for a write at `now_ms`: ten lease durations past
    /// the write, so native expiry never races a valid lease.
    pub fn ttl_epoch_s(&self, now_ms: i64) -> i64 {
        now_ms / 1000 + 10 * i64::from(self.lease_duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(LockConfig::default().validate().is_ok());
    }

    #[test]
    fn test_heartbeat_must_be_less_than_lease() {
        let config = LockConfig {
            heartbeat_interval_secs: 10,
            lease_duration_secs: 10,
            ..LockConfig::default()
        };
        assert!(matches!(config.validate(), Err(LockError::Invalid(_))));
    }

    #[test]
    fn test_zero_shards_rejected() {
        let config = LockConfig {
            max_shards: 0,
            ..LockConfig::default()
        };
        assert!(matches!(config.validate(), Err(LockError::Invalid(_))));
    }

    #[test]
    fn test_empty_owner_rejected() {
        let config = LockConfig {
            owner: String::new(),
            ..LockConfig::default()
        };
        assert!(matches!(config.validate(), Err(LockError::Invalid(_))));
    }

    #[test]
    fn test_ttl_outlives_lease() {
        let config = LockConfig::default();
        let now_ms = 1_700_000_000_000;
        let ttl = config.ttl_epoch_s(now_ms);
        assert!(ttl * 1000 > now_ms + config.lease_duration_ms());
    }
}
