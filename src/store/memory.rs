// SPDX-License-Identifier: PMPL-1.0-or-later
//! In-process document store

use super::DocumentStore;
use crate::error::StoreResult;
use crate::models::{DeviceToken, ScanEvent, TagAssignment};
use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;

/// Store kept entirely in memory; collections iterate in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: RwLock<IndexMap<String, DeviceToken>>,
    tags: RwLock<IndexMap<String, TagAssignment>>,
    scans: RwLock<Vec<ScanEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert_device(&self, device: &DeviceToken) -> StoreResult<()> {
        self.devices
            .write()
            .await
            .insert(device.identity.clone(), device.clone());
        Ok(())
    }

    async fn get_device(&self, identity: &str) -> StoreResult<Option<DeviceToken>> {
        Ok(self.devices.read().await.get(identity).cloned())
    }

    async fn list_devices(&self) -> StoreResult<Vec<DeviceToken>> {
        Ok(self.devices.read().await.values().cloned().collect())
    }

    async fn delete_device(&self, identity: &str) -> StoreResult<bool> {
        Ok(self.devices.write().await.shift_remove(identity).is_some())
    }

    async fn put_tag(&self, assignment: &TagAssignment) -> StoreResult<()> {
        self.tags
            .write()
            .await
            .insert(assignment.tag_id.clone(), assignment.clone());
        Ok(())
    }

    async fn get_tag(&self, tag_id: &str) -> StoreResult<Option<TagAssignment>> {
        Ok(self.tags.read().await.get(tag_id).cloned())
    }

    async fn delete_tag(&self, tag_id: &str) -> StoreResult<bool> {
        Ok(self.tags.write().await.shift_remove(tag_id).is_some())
    }

    async fn tags_for_identity(&self, identity: &str) -> StoreResult<Vec<TagAssignment>> {
        Ok(self
            .tags
            .read()
            .await
            .values()
            .filter(|t| t.identity == identity)
            .cloned()
            .collect())
    }

    async fn insert_scan(&self, event: &ScanEvent) -> StoreResult<()> {
        self.scans.write().await.push(event.clone());
        Ok(())
    }

    async fn list_scans(&self, limit: usize) -> StoreResult<Vec<ScanEvent>> {
        Ok(self
            .scans
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let store = MemoryStore::new();
        store
            .upsert_device(&DeviceToken::new("a", "t1", Metadata::new()))
            .await
            .unwrap();
        store
            .upsert_device(&DeviceToken::new("b", "t2", Metadata::new()))
            .await
            .unwrap();
        store
            .upsert_device(&DeviceToken::new("a", "t3", Metadata::new()))
            .await
            .unwrap();

        let devices = store.list_devices().await.unwrap();
        let tokens: Vec<&str> = devices.iter().map(|d| d.token.as_str()).collect();
        assert_eq!(tokens, ["t3", "t2"]);
    }

    #[tokio::test]
    async fn test_tags_move_between_identities() {
        let store = MemoryStore::new();
        store.put_tag(&TagAssignment::new("card-1", "a")).await.unwrap();
        store.put_tag(&TagAssignment::new("card-1", "b")).await.unwrap();

        assert!(store.tags_for_identity("a").await.unwrap().is_empty());
        assert_eq!(store.get_tag("card-1").await.unwrap().unwrap().identity, "b");
        assert!(store.delete_tag("card-1").await.unwrap());
        assert!(!store.delete_tag("card-1").await.unwrap());
    }
}
