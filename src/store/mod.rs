// SPDX-License-Identifier: PMPL-1.0-or-later
//! Persistence port for device tokens, tag assignments and scan events.
//!
//! The registry and scan router only talk to [`DocumentStore`]; adapters
//! decide how records are kept. Every adapter provides per-key atomic
//! upserts and returns collections in its own natural order.

mod memory;
mod surreal;

pub use memory::MemoryStore;
pub use surreal::SurrealStore;

use crate::error::StoreResult;
use crate::models::{DeviceToken, ScanEvent, TagAssignment};
use async_trait::async_trait;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or fully replace the device record keyed by its identity.
    async fn upsert_device(&self, device: &DeviceToken) -> StoreResult<()>;

    async fn get_device(&self, identity: &str) -> StoreResult<Option<DeviceToken>>;

    async fn list_devices(&self) -> StoreResult<Vec<DeviceToken>>;

    /// Returns whether a record existed.
    async fn delete_device(&self, identity: &str) -> StoreResult<bool>;

    /// Insert or move a tag assignment keyed by tag id.
    async fn put_tag(&self, assignment: &TagAssignment) -> StoreResult<()>;

    async fn get_tag(&self, tag_id: &str) -> StoreResult<Option<TagAssignment>>;

    async fn delete_tag(&self, tag_id: &str) -> StoreResult<bool>;

    async fn tags_for_identity(&self, identity: &str) -> StoreResult<Vec<TagAssignment>>;

    /// Append a scan event.
    async fn insert_scan(&self, event: &ScanEvent) -> StoreResult<()>;

    /// Most recent scan events first.
    async fn list_scans(&self, limit: usize) -> StoreResult<Vec<ScanEvent>>;
}
