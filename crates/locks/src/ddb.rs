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

//! DynamoDB-based lock store implementation.
//!
//! ## Purpose
//! Production backend for the lock table: conditional writes carry the CAS
//! predicates, item-level TTL reaps rows whose holder disappeared, and all
//! reads are strongly consistent.
//!
//! ## Table Schema
//! ```text
//! Partition Key: LockID (String)
//! Attributes:
//!   - Owner: String (holding process identity)
//!   - LeaseDurationMilliseconds: Number
//!   - LastUpdatedTimeMilliseconds: Number
//!   - CreatedAtMilliseconds: Number
//!   - RecordVersionNumber: String (ULID, the CAS token)
//!   - Shard: Number (partitioning hint for operator scans)
//!   - TTL: Number (DynamoDB TTL attribute, epoch seconds)
//!   - Data: Bytes (opaque caller payload)
//! ```
//!
//! ## GSI (Global Secondary Index)
//! - **GSI-1**: `shard_last_updated_index`
//!   - Partition Key: `Shard`
//!   - Sort Key: `LastUpdatedTimeMilliseconds`
//!   - Purpose: operator-side scans for stale rows. The lock manager never
//!     queries it; it only keeps both attributes populated.
//!
//! ## Observability
//! - Metrics: operation latency, error rates
//! - Tracing: structured logging with the lock id

use crate::config::LockConfig;
use crate::error::{LockError, LockResult, StoreError, StoreResult};
use crate::record::LockRecord;
use crate::store::LockStore;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::ProvideErrorMetadata,
    primitives::Blob,
    types::{
        AttributeDefinition, AttributeValue, BillingMode, GlobalSecondaryIndex, KeySchemaElement,
        KeyType, Projection, ProjectionType, ScalarAttributeType, TableStatus,
        TimeToLiveSpecification,
    },
    Client as DynamoDbClient,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// DynamoDB [`LockStore`] backend.
#[derive(Clone)]
pub struct DynamoLockStore {
    /// DynamoDB client
    client: DynamoDbClient,
    /// Table name
    table_name: String,
}

impl DynamoLockStore {
    /// Connect to DynamoDB and prepare the lock table.
    ///
    /// ## Behavior
    /// - Builds the AWS client for `config.region`, honoring
    ///   `config.endpoint_url` (DynamoDB Local)
    /// - Creates the table if it doesn't exist (idempotent)
    /// - Enables TTL on the `TTL` attribute
    #[instrument(skip(config), fields(table_name = %config.table_name, region = %config.region))]
    pub async fn connect(config: &LockConfig) -> LockResult<Self> {
        let start_time = std::time::Instant::now();

        let mut config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            config_builder = config_builder.endpoint_url(endpoint);
        }

        let sdk_config = config_builder.load().await;
        let client = DynamoDbClient::new(&sdk_config);

        Self::ensure_table_exists(&client, &config.table_name)
            .await
            .map_err(|e| LockError::Storage(e.to_string()))?;
        Self::enable_ttl(&client, &config.table_name)
            .await
            .map_err(|e| LockError::Storage(e.to_string()))?;

        let duration = start_time.elapsed();
        metrics::histogram!("fleetlock_locks_ddb_init_duration_seconds")
            .record(duration.as_secs_f64());
        debug!(
            table_name = %config.table_name,
            duration_ms = duration.as_millis(),
            "DynamoDB lock store initialized"
        );

        Ok(Self {
            client,
            table_name: config.table_name.clone(),
        })
    }

    /// Wrap an existing client; the table must already exist.
    pub fn new(client: DynamoDbClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Ensure the lock table exists, creating it if needed.
    #[instrument(skip(client), fields(table_name = %table_name))]
    async fn ensure_table_exists(client: &DynamoDbClient, table_name: &str) -> StoreResult<()> {
        match client.describe_table().table_name(table_name).send().await {
            Ok(_) => {
                debug!(table_name = %table_name, "lock table already exists");
                return Ok(());
            }
            Err(e) => {
                let error_code = e.code().unwrap_or("unknown");
                if error_code != "ResourceNotFoundException" {
                    error!(
                        table_name = %table_name,
                        error_code = %error_code,
                        error = %e,
                        "describe_table failed with unexpected error"
                    );
                    return Err(StoreError::Backend(format!(
                        "failed to check table existence: {} (code: {})",
                        e, error_code
                    )));
                }
            }
        }

        debug!(table_name = %table_name, "creating lock table");

        let pk_key_schema = KeySchemaElement::builder()
            .attribute_name("LockID")
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build key schema: {}", e)))?;

        let pk_attr = AttributeDefinition::builder()
            .attribute_name("LockID")
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| {
                StoreError::Backend(format!("failed to build attribute definition: {}", e))
            })?;

        let shard_attr = AttributeDefinition::builder()
            .attribute_name("Shard")
            .attribute_type(ScalarAttributeType::N)
            .build()
            .map_err(|e| {
                StoreError::Backend(format!("failed to build attribute definition: {}", e))
            })?;

        let last_updated_attr = AttributeDefinition::builder()
            .attribute_name("LastUpdatedTimeMilliseconds")
            .attribute_type(ScalarAttributeType::N)
            .build()
            .map_err(|e| {
                StoreError::Backend(format!("failed to build attribute definition: {}", e))
            })?;

        let gsi_pk_schema = KeySchemaElement::builder()
            .attribute_name("Shard")
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build GSI key schema: {}", e)))?;

        let gsi_sk_schema = KeySchemaElement::builder()
            .attribute_name("LastUpdatedTimeMilliseconds")
            .key_type(KeyType::Range)
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build GSI key schema: {}", e)))?;

        let gsi_projection = Projection::builder()
            .projection_type(ProjectionType::All)
            .build();

        let gsi = GlobalSecondaryIndex::builder()
            .index_name("shard_last_updated_index")
            .key_schema(gsi_pk_schema)
            .key_schema(gsi_sk_schema)
            .projection(gsi_projection)
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build GSI: {}", e)))?;

        let create_table_result = client
            .create_table()
            .table_name(table_name)
            .billing_mode(BillingMode::PayPerRequest)
            .key_schema(pk_key_schema)
            .attribute_definitions(pk_attr)
            .attribute_definitions(shard_attr)
            .attribute_definitions(last_updated_attr)
            .global_secondary_indexes(gsi)
            .send()
            .await;

        match create_table_result {
            Ok(_) => {
                debug!(table_name = %table_name, "lock table created");
                Self::wait_for_table_active(client, table_name).await
            }
            Err(e) => {
                if e.to_string().contains("ResourceInUseException") {
                    debug!(table_name = %table_name, "table created concurrently, waiting for active");
                    Self::wait_for_table_active(client, table_name).await
                } else {
                    Err(StoreError::Backend(format!(
                        "failed to create lock table: {}",
                        e
                    )))
                }
            }
        }
    }

    /// Wait for the table to become active.
    #[instrument(skip(client), fields(table_name = %table_name))]
    async fn wait_for_table_active(client: &DynamoDbClient, table_name: &str) -> StoreResult<()> {
        let mut attempts = 0;
        let max_attempts = 30;

        loop {
            let describe_result = client
                .describe_table()
                .table_name(table_name)
                .send()
                .await
                .map_err(|e| StoreError::Backend(format!("failed to describe table: {}", e)))?;

            match describe_result.table().and_then(|t| t.table_status()) {
                Some(TableStatus::Active) => {
                    debug!(table_name = %table_name, "table is now active");
                    return Ok(());
                }
                Some(TableStatus::Creating) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Err(StoreError::Backend(format!(
                            "table creation timeout after {} attempts",
                            max_attempts
                        )));
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Some(status) => {
                    return Err(StoreError::Backend(format!(
                        "table in unexpected status: {:?}",
                        status
                    )));
                }
                None => {
                    return Err(StoreError::Backend("table status not available".to_string()));
                }
            }
        }
    }

    /// Enable TTL for native row expiry.
    #[instrument(skip(client), fields(table_name = %table_name))]
    async fn enable_ttl(client: &DynamoDbClient, table_name: &str) -> StoreResult<()> {
        let ttl_spec = TimeToLiveSpecification::builder()
            .enabled(true)
            .attribute_name("TTL")
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build TTL spec: {}", e)))?;

        match client
            .update_time_to_live()
            .table_name(table_name)
            .time_to_live_specification(ttl_spec)
            .send()
            .await
        {
            Ok(_) => {
                debug!(table_name = %table_name, "TTL enabled for row expiry");
                Ok(())
            }
            Err(e) => {
                if e.to_string().contains("TimeToLiveAlreadyEnabled") {
                    debug!(table_name = %table_name, "TTL already enabled");
                    Ok(())
                } else {
                    warn!(
                        error = %e,
                        table_name = %table_name,
                        "failed to enable TTL (non-critical, continuing)"
                    );
                    Ok(())
                }
            }
        }
    }

    /// Convert a record to the DynamoDB attribute map.
    fn record_to_item(record: &LockRecord) -> HashMap<String, AttributeValue> {
        let mut item = HashMap::new();
        item.insert(
            "LockID".to_string(),
            AttributeValue::S(record.lock_id.clone()),
        );
        item.insert("Owner".to_string(), AttributeValue::S(record.owner.clone()));
        item.insert(
            "LeaseDurationMilliseconds".to_string(),
            AttributeValue::N(record.lease_duration_ms.to_string()),
        );
        item.insert(
            "LastUpdatedTimeMilliseconds".to_string(),
            AttributeValue::N(record.last_updated_ms.to_string()),
        );
        item.insert(
            "CreatedAtMilliseconds".to_string(),
            AttributeValue::N(record.created_at_ms.to_string()),
        );
        item.insert(
            "RecordVersionNumber".to_string(),
            AttributeValue::S(record.record_version.clone()),
        );
        item.insert(
            "Shard".to_string(),
            AttributeValue::N(record.shard.to_string()),
        );
        item.insert(
            "TTL".to_string(),
            AttributeValue::N(record.ttl_epoch_s.to_string()),
        );
        item.insert(
            "Data".to_string(),
            AttributeValue::B(Blob::new(record.payload.clone())),
        );
        item
    }

    /// Convert a DynamoDB item back to a record.
    fn item_to_record(item: &HashMap<String, AttributeValue>) -> StoreResult<LockRecord> {
        let lock_id = item
            .get("LockID")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| StoreError::Backend("missing LockID attribute".to_string()))?
            .to_string();

        let owner = item
            .get("Owner")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| StoreError::Backend("missing Owner attribute".to_string()))?
            .to_string();

        let lease_duration_ms = item
            .get("LeaseDurationMilliseconds")
            .and_then(|v| v.as_n().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                StoreError::Backend("missing or invalid LeaseDurationMilliseconds".to_string())
            })?;

        let last_updated_ms = item
            .get("LastUpdatedTimeMilliseconds")
            .and_then(|v| v.as_n().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                StoreError::Backend("missing or invalid LastUpdatedTimeMilliseconds".to_string())
            })?;

        let created_at_ms = item
            .get("CreatedAtMilliseconds")
            .and_then(|v| v.as_n().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                StoreError::Backend("missing or invalid CreatedAtMilliseconds".to_string())
            })?;

        let record_version = item
            .get("RecordVersionNumber")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| StoreError::Backend("missing RecordVersionNumber".to_string()))?
            .to_string();

        let shard = item
            .get("Shard")
            .and_then(|v| v.as_n().ok())
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| StoreError::Backend("missing or invalid Shard".to_string()))?;

        let ttl_epoch_s = item
            .get("TTL")
            .and_then(|v| v.as_n().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| StoreError::Backend("missing or invalid TTL".to_string()))?;

        let payload = item
            .get("Data")
            .and_then(|v| v.as_b().ok())
            .map(|b| b.as_ref().to_vec())
            .unwrap_or_default();

        Ok(LockRecord {
            lock_id,
            owner,
            lease_duration_ms,
            last_updated_ms,
            created_at_ms,
            record_version,
            shard,
            ttl_epoch_s,
            payload,
        })
    }
}

#[async_trait]
impl LockStore for DynamoLockStore {
    #[instrument(skip(self), fields(lock_id = %id, table_name = %self.table_name))]
    async fn get(&self, id: &str) -> StoreResult<Option<LockRecord>> {
        let start_time = std::time::Instant::now();

        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("LockID", AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, lock_id = %id, "failed to get lock record");
                metrics::counter!(
                    "fleetlock_locks_ddb_errors_total",
                    "operation" => "get_item"
                )
                .increment(1);
                StoreError::Backend(format!("DynamoDB get_item failed: {}", e))
            })?;

        metrics::histogram!("fleetlock_locks_ddb_get_duration_seconds")
            .record(start_time.elapsed().as_secs_f64());

        match resp.item() {
            Some(item) => Ok(Some(Self::item_to_record(item)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, record), fields(lock_id = %record.lock_id, table_name = %self.table_name))]
    async fn put_new(&self, record: &LockRecord) -> StoreResult<()> {
        let start_time = std::time::Instant::now();

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(Self::record_to_item(record)))
            .condition_expression("attribute_not_exists(LockID)")
            .send()
            .await;

        metrics::histogram!("fleetlock_locks_ddb_put_duration_seconds")
            .record(start_time.elapsed().as_secs_f64());

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_conditional_check_failed_exception() {
                    metrics::counter!(
                        "fleetlock_locks_ddb_precondition_failed_total",
                        "operation" => "put_new"
                    )
                    .increment(1);
                    Err(StoreError::PreconditionFailed)
                } else {
                    error!(
                        error = %service_err,
                        lock_id = %record.lock_id,
                        "failed to put new lock record"
                    );
                    metrics::counter!(
                        "fleetlock_locks_ddb_errors_total",
                        "operation" => "put_item"
                    )
                    .increment(1);
                    Err(StoreError::Backend(format!(
                        "DynamoDB put_item failed: {}",
                        service_err
                    )))
                }
            }
        }
    }

    #[instrument(skip(self, record, prior), fields(lock_id = %record.lock_id, table_name = %self.table_name))]
    async fn put_existing(
        &self,
        record: &LockRecord,
        prior: &LockRecord,
        now_ms: i64,
    ) -> StoreResult<()> {
        let start_time = std::time::Instant::now();
        let expiry_floor = now_ms - record.lease_duration_ms;

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(Self::record_to_item(record)))
            .condition_expression("#rvn = :rvn AND (#owner = :owner OR #lut < :lut_floor)")
            .expression_attribute_names("#rvn", "RecordVersionNumber")
            .expression_attribute_names("#owner", "Owner")
            .expression_attribute_names("#lut", "LastUpdatedTimeMilliseconds")
            .expression_attribute_values(":rvn", AttributeValue::S(prior.record_version.clone()))
            .expression_attribute_values(":owner", AttributeValue::S(record.owner.clone()))
            .expression_attribute_values(":lut_floor", AttributeValue::N(expiry_floor.to_string()))
            .send()
            .await;

        metrics::histogram!("fleetlock_locks_ddb_put_duration_seconds")
            .record(start_time.elapsed().as_secs_f64());

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_conditional_check_failed_exception() {
                    // Expected when the lease was lost or another writer won.
                    debug!(lock_id = %record.lock_id, "conditional update not applied");
                    metrics::counter!(
                        "fleetlock_locks_ddb_precondition_failed_total",
                        "operation" => "put_existing"
                    )
                    .increment(1);
                    Err(StoreError::PreconditionFailed)
                } else {
                    error!(
                        error = %service_err,
                        lock_id = %record.lock_id,
                        "failed to update lock record"
                    );
                    metrics::counter!(
                        "fleetlock_locks_ddb_errors_total",
                        "operation" => "put_item"
                    )
                    .increment(1);
                    Err(StoreError::Backend(format!(
                        "DynamoDB put_item failed: {}",
                        service_err
                    )))
                }
            }
        }
    }

    #[instrument(skip(self, record), fields(lock_id = %record.lock_id, table_name = %self.table_name))]
    async fn delete(&self, record: &LockRecord) -> StoreResult<()> {
        let start_time = std::time::Instant::now();

        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("LockID", AttributeValue::S(record.lock_id.clone()))
            .condition_expression("#rvn = :rvn AND #owner = :owner")
            .expression_attribute_names("#rvn", "RecordVersionNumber")
            .expression_attribute_names("#owner", "Owner")
            .expression_attribute_values(":rvn", AttributeValue::S(record.record_version.clone()))
            .expression_attribute_values(":owner", AttributeValue::S(record.owner.clone()))
            .send()
            .await;

        metrics::histogram!("fleetlock_locks_ddb_delete_duration_seconds")
            .record(start_time.elapsed().as_secs_f64());

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_conditional_check_failed_exception() {
                    debug!(lock_id = %record.lock_id, "conditional delete not applied");
                    metrics::counter!(
                        "fleetlock_locks_ddb_precondition_failed_total",
                        "operation" => "delete"
                    )
                    .increment(1);
                    Err(StoreError::PreconditionFailed)
                } else {
                    error!(
                        error = %service_err,
                        lock_id = %record.lock_id,
                        "failed to delete lock record"
                    );
                    metrics::counter!(
                        "fleetlock_locks_ddb_errors_total",
                        "operation" => "delete_item"
                    )
                    .increment(1);
                    Err(StoreError::Backend(format!(
                        "DynamoDB delete_item failed: {}",
                        service_err
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;

    fn record() -> LockRecord {
        LockRecord {
            lock_id: "job-1".to_string(),
            owner: "host-1-42".to_string(),
            lease_duration_ms: 10_000,
            last_updated_ms: 1_700_000_000_000,
            created_at_ms: 1_699_999_990_000,
            record_version: clock::new_version_id(),
            shard: 1,
            ttl_epoch_s: 1_700_000_100,
            payload: b"{\"message_id\":\"m-1\"}".to_vec(),
        }
    }

    #[test]
    fn test_item_codec_round_trip() {
        let original = record();
        let item = DynamoLockStore::record_to_item(&original);
        let decoded = DynamoLockStore::item_to_record(&item).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_item_missing_owner_is_backend_error() {
        let mut item = DynamoLockStore::record_to_item(&record());
        item.remove("Owner");
        let err = DynamoLockStore::item_to_record(&item).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn test_item_missing_payload_decodes_empty() {
        let mut item = DynamoLockStore::record_to_item(&record());
        item.remove("Data");
        let decoded = DynamoLockStore::item_to_record(&item).unwrap();
        assert!(decoded.payload.is_empty());
    }
}
