// SPDX-License-Identifier: PMPL-1.0-or-later
//! SurrealDB document store

use super::DocumentStore;
use crate::{
    error::{StoreError, StoreResult},
    models::{DeviceToken, ScanEvent, TagAssignment},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::{
    engine::local::{Db, Mem},
    Surreal,
};

const DEVICES: &str = "user_tokens";
const TAGS: &str = "rfid_tags";
const SCANS: &str = "rfid_scans";

/// Stored shape of a device record. Metadata is kept as JSON text so
/// arbitrary client-supplied values survive the round trip unchanged.
#[derive(Debug, Serialize, Deserialize)]
struct DeviceRow {
    identity: String,
    fcm_token: String,
    metadata: String,
    updated_at: DateTime<Utc>,
}

impl From<&DeviceToken> for DeviceRow {
    fn from(device: &DeviceToken) -> Self {
        Self {
            identity: device.identity.clone(),
            fcm_token: device.token.clone(),
            metadata: serde_json::Value::Object(device.metadata.clone()).to_string(),
            updated_at: device.registered_at,
        }
    }
}

impl TryFrom<DeviceRow> for DeviceToken {
    type Error = StoreError;

    fn try_from(row: DeviceRow) -> StoreResult<Self> {
        let metadata = serde_json::from_str(&row.metadata).map_err(|e| {
            StoreError::Corrupt(format!("metadata for {}: {}", row.identity, e))
        })?;
        Ok(DeviceToken {
            identity: row.identity,
            token: row.fcm_token,
            metadata,
            registered_at: row.updated_at,
        })
    }
}

/// Stored shape of a scan event, with a sortable millisecond timestamp.
#[derive(Debug, Serialize, Deserialize)]
struct ScanRow {
    rfid_id: String,
    user_id: String,
    location: Option<String>,
    timestamp: DateTime<Utc>,
    timestamp_ms: i64,
    notification_sent: bool,
    message_id: Option<String>,
    error: Option<String>,
}

impl From<&ScanEvent> for ScanRow {
    fn from(event: &ScanEvent) -> Self {
        Self {
            rfid_id: event.scan_id.clone(),
            user_id: event.identity.clone(),
            location: event.location.clone(),
            timestamp: event.timestamp,
            timestamp_ms: event.timestamp.timestamp_millis(),
            notification_sent: event.notification_sent,
            message_id: event.message_id.clone(),
            error: event.error.clone(),
        }
    }
}

impl From<ScanRow> for ScanEvent {
    fn from(row: ScanRow) -> Self {
        ScanEvent {
            scan_id: row.rfid_id,
            identity: row.user_id,
            location: row.location,
            timestamp: row.timestamp,
            notification_sent: row.notification_sent,
            message_id: row.message_id,
            error: row.error,
        }
    }
}

/// Database connection wrapper
#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Db>,
}

impl SurrealStore {
    /// Connect to SurrealDB; `memory` selects the in-process engine.
    pub async fn connect(path: &str) -> StoreResult<Self> {
        let db = if path == "memory" {
            Surreal::new::<Mem>(()).await?
        } else {
            Self::open_persistent(path).await?
        };

        db.use_ns("rfid_push").use_db("gateway").await?;

        Self::init_schema(&db).await?;

        Ok(Self { db })
    }

    #[cfg(feature = "rocksdb")]
    async fn open_persistent(path: &str) -> StoreResult<Surreal<Db>> {
        Ok(Surreal::new::<surrealdb::engine::local::RocksDb>(path).await?)
    }

    #[cfg(not(feature = "rocksdb"))]
    async fn open_persistent(path: &str) -> StoreResult<Surreal<Db>> {
        Err(StoreError::Unsupported(format!(
            "{path} (build with the `rocksdb` feature for on-disk storage)"
        )))
    }

    /// Initialize database schema
    async fn init_schema(db: &Surreal<Db>) -> StoreResult<()> {
        db.query(
            r#"
            DEFINE TABLE user_tokens SCHEMALESS;
            DEFINE INDEX fcm_token_idx ON user_tokens COLUMNS fcm_token;

            DEFINE TABLE rfid_tags SCHEMALESS;
            DEFINE INDEX tag_identity_idx ON rfid_tags COLUMNS identity;

            DEFINE TABLE rfid_scans SCHEMALESS;
            DEFINE INDEX scan_time_idx ON rfid_scans COLUMNS timestamp_ms;
        "#,
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SurrealStore {
    async fn upsert_device(&self, device: &DeviceToken) -> StoreResult<()> {
        // UPDATE on a record id creates the record when absent
        let _: Option<DeviceRow> = self
            .db
            .update((DEVICES, device.identity.as_str()))
            .content(DeviceRow::from(device))
            .await?;
        Ok(())
    }

    async fn get_device(&self, identity: &str) -> StoreResult<Option<DeviceToken>> {
        let row: Option<DeviceRow> = self.db.select((DEVICES, identity)).await?;
        row.map(DeviceToken::try_from).transpose()
    }

    async fn list_devices(&self) -> StoreResult<Vec<DeviceToken>> {
        let rows: Vec<DeviceRow> = self.db.select(DEVICES).await?;
        rows.into_iter().map(DeviceToken::try_from).collect()
    }

    async fn delete_device(&self, identity: &str) -> StoreResult<bool> {
        let removed: Option<DeviceRow> = self.db.delete((DEVICES, identity)).await?;
        Ok(removed.is_some())
    }

    async fn put_tag(&self, assignment: &TagAssignment) -> StoreResult<()> {
        let _: Option<TagAssignment> = self
            .db
            .update((TAGS, assignment.tag_id.as_str()))
            .content(assignment.clone())
            .await?;
        Ok(())
    }

    async fn get_tag(&self, tag_id: &str) -> StoreResult<Option<TagAssignment>> {
        Ok(self.db.select((TAGS, tag_id)).await?)
    }

    async fn delete_tag(&self, tag_id: &str) -> StoreResult<bool> {
        let removed: Option<TagAssignment> = self.db.delete((TAGS, tag_id)).await?;
        Ok(removed.is_some())
    }

    async fn tags_for_identity(&self, identity: &str) -> StoreResult<Vec<TagAssignment>> {
        let mut result = self
            .db
            .query("SELECT * FROM rfid_tags WHERE identity = $identity")
            .bind(("identity", identity.to_string()))
            .await?;

        Ok(result.take(0)?)
    }

    async fn insert_scan(&self, event: &ScanEvent) -> StoreResult<()> {
        let _: Vec<ScanRow> = self
            .db
            .create(SCANS)
            .content(ScanRow::from(event))
            .await?;
        Ok(())
    }

    async fn list_scans(&self, limit: usize) -> StoreResult<Vec<ScanEvent>> {
        let query = format!(
            "SELECT * FROM rfid_scans ORDER BY timestamp_ms DESC LIMIT {}",
            limit
        );
        let mut result = self.db.query(query).await?;
        let rows: Vec<ScanRow> = result.take(0)?;

        Ok(rows.into_iter().map(ScanEvent::from).collect())
    }
}
