// SPDX-License-Identifier: PMPL-1.0-or-later
//! Device token registry
//!
//! Holds at most one delivery token per identity and resolves physical tags
//! to their owning identity. Store failures propagate as
//! `StoreUnavailable`; nothing is retried here.

use crate::error::{NotifyError, Result};
use crate::models::{DeviceToken, Metadata, RegisterMode, TagAssignment};
use crate::store::DocumentStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry over an injected document store
#[derive(Clone)]
pub struct TokenRegistry {
    store: Arc<dyn DocumentStore>,
}

/// Keys are compared without surrounding whitespace everywhere.
fn key(raw: &str) -> &str {
    raw.trim()
}

impl TokenRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Register `token` for `identity`, replacing any earlier record.
    pub async fn register(&self, identity: &str, token: &str, metadata: Metadata) -> Result<DeviceToken> {
        self.register_with(identity, token, metadata, RegisterMode::Replace)
            .await
    }

    /// Register with an explicit metadata policy.
    pub async fn register_with(
        &self,
        identity: &str,
        token: &str,
        metadata: Metadata,
        mode: RegisterMode,
    ) -> Result<DeviceToken> {
        let identity = key(identity);
        let token = key(token);
        if identity.is_empty() {
            return Err(NotifyError::invalid("Missing user_id"));
        }
        if token.is_empty() {
            return Err(NotifyError::invalid("Missing FCM token"));
        }

        let metadata = match mode {
            RegisterMode::Replace => metadata,
            RegisterMode::Merge => {
                let mut merged = self
                    .store
                    .get_device(identity)
                    .await?
                    .map(|existing| existing.metadata)
                    .unwrap_or_default();
                merged.extend(metadata);
                merged
            }
        };

        let device = DeviceToken::new(identity, token, metadata);
        self.store.upsert_device(&device).await?;

        info!(
            identity = %device.identity,
            token = %device.masked(),
            platform = device.platform().unwrap_or("unknown"),
            "Device token registered"
        );
        Ok(device)
    }

    pub async fn get(&self, identity: &str) -> Result<DeviceToken> {
        let identity = key(identity);
        self.store
            .get_device(identity)
            .await?
            .ok_or_else(|| NotifyError::not_found(format!("No token registered for {identity}")))
    }

    /// Every registered device, in store order.
    pub async fn list_all(&self) -> Result<Vec<DeviceToken>> {
        Ok(self.store.list_devices().await?)
    }

    /// Remove the record keyed by `key` as an identity, or failing that the
    /// record holding `key` as its token. Absent keys are a no-op.
    pub async fn remove(&self, raw_key: &str) -> Result<bool> {
        let key = key(raw_key);
        if key.is_empty() {
            return Ok(false);
        }
        if self.store.delete_device(key).await? {
            info!(identity = %key, "Device token removed");
            return Ok(true);
        }

        let owner = self
            .store
            .list_devices()
            .await?
            .into_iter()
            .find(|d| d.token == key);

        match owner {
            Some(device) => {
                let removed = self.store.delete_device(&device.identity).await?;
                info!(identity = %device.identity, token = %device.masked(), "Device token removed");
                Ok(removed)
            }
            None => {
                debug!("Nothing to remove");
                Ok(false)
            }
        }
    }

    /// Resolve a scanned tag to its owning identity.
    pub async fn find_by_physical_tag(&self, tag_id: &str) -> Result<String> {
        let tag_id = key(tag_id);
        match self.store.get_tag(tag_id).await? {
            Some(assignment) => {
                debug!(tag = %tag_id, identity = %assignment.identity, "Tag resolved");
                Ok(assignment.identity)
            }
            None => Err(NotifyError::not_found("No user found for this RFID card")),
        }
    }

    /// Assign a tag to a registered identity, moving it if already owned.
    pub async fn assign_tag(&self, tag_id: &str, identity: &str) -> Result<TagAssignment> {
        let tag_id = key(tag_id);
        if tag_id.is_empty() {
            return Err(NotifyError::invalid("RFID ID is required"));
        }
        // Fails with NotFound for unknown identities
        let owner = self.get(identity).await?;
        let identity = owner.identity.as_str();

        let assignment = TagAssignment::new(tag_id, identity);
        self.store.put_tag(&assignment).await?;
        info!(tag = %tag_id, identity = %identity, "RFID card assigned");
        Ok(assignment)
    }

    pub async fn unassign_tag(&self, tag_id: &str) -> Result<bool> {
        Ok(self.store.delete_tag(key(tag_id)).await?)
    }

    pub async fn tags_for(&self, identity: &str) -> Result<Vec<String>> {
        Ok(self
            .store
            .tags_for_identity(key(identity))
            .await?
            .into_iter()
            .map(|t| t.tag_id)
            .collect())
    }
}
