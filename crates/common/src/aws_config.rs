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

//! AWS configuration helpers.
//!
//! ## Purpose
//! Loads backing-store addressing from environment variables with sensible
//! defaults, so deployments configure the service without code changes.
//!
//! ## Environment Variables
//! - `AWS_REGION` - AWS region (e.g., "us-east-1")
//! - `FLEETLOCK_LOCK_TABLE` - lock table name
//! - `DYNAMODB_ENDPOINT_URL` - DynamoDB endpoint URL (for local testing)

use std::env;

/// DynamoDB addressing for the lock table.
#[derive(Debug, Clone)]
pub struct DynamoDbConfig {
    /// AWS region
    pub region: String,
    /// Lock table name
    pub table_name: String,
    /// Endpoint URL (for DynamoDB Local testing)
    pub endpoint_url: Option<String>,
}

impl Default for DynamoDbConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            table_name: "fleetlock-locks".to_string(),
            endpoint_url: None,
        }
    }
}

impl DynamoDbConfig {
    /// Load DynamoDB addressing from environment variables.
    ///
    /// ## Environment Variables
    /// - `AWS_REGION` - AWS region (default: "us-east-1")
    /// - `FLEETLOCK_LOCK_TABLE` - lock table name (default: "fleetlock-locks")
    /// - `DYNAMODB_ENDPOINT_URL` - endpoint URL for local testing
    pub fn from_env() -> Self {
        let region = env::var("AWS_REGION")
            .or_else(|_| env::var("FLEETLOCK_AWS_REGION"))
            .unwrap_or_else(|_| "us-east-1".to_string());

        let table_name = env::var("FLEETLOCK_LOCK_TABLE")
            .unwrap_or_else(|_| "fleetlock-locks".to_string());

        let endpoint_url = env::var("DYNAMODB_ENDPOINT_URL")
            .or_else(|_| env::var("FLEETLOCK_DDB_ENDPOINT_URL"))
            .ok()
            .filter(|s| !s.is_empty());

        Self {
            region,
            table_name,
            endpoint_url,
        }
    }
}
