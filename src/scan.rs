// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! RFID scan handling
//!
//! A scan moves through Received, Resolved, Dispatched and Recorded.
//! Validation and resolution failures reject the scan before anything is
//! stored. Once a send has been attempted the event is always recorded,
//! and its `notification_sent` flag is the audit trail for delivery.

use crate::dispatcher::Dispatcher;
use crate::error::{NotifyError, Result};
use crate::metrics::Metrics;
use crate::models::{DeviceToken, DispatchTarget, MessageKind, NotificationBody, ScanEvent};
use crate::registry::TokenRegistry;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_TITLE: &str = "RFID Card Scanned";
const UNKNOWN_LOCATION: &str = "unknown location";

/// A recorded scan together with its owner's contact details
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub event: ScanEvent,
    /// Owner email from the device metadata, when known
    pub user_email: Option<String>,
}

impl ScanOutcome {
    pub fn message_id(&self) -> Option<&str> {
        self.event.message_id.as_deref()
    }
}

pub struct ScanRouter {
    registry: TokenRegistry,
    dispatcher: Arc<Dispatcher>,
    metrics: Option<Arc<Metrics>>,
}

/// A scan whose tag and owner device are known.
struct ResolvedScan<'a> {
    scan_id: &'a str,
    location: Option<&'a str>,
    identity: String,
    device: DeviceToken,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl ScanRouter {
    pub fn new(registry: TokenRegistry, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Notify the owner of `scan_id` and record the scan.
    ///
    /// Returns `DeliveryFailed` after recording when the send did not go
    /// through.
    pub async fn handle_scan(
        &self,
        scan_id: &str,
        location: Option<&str>,
        title: Option<&str>,
        body: Option<&str>,
    ) -> Result<ScanOutcome> {
        // Received, Resolved
        let resolved = match self.resolve(scan_id, location).await {
            Ok(resolved) => resolved,
            Err(e) => {
                self.record("rejected");
                return Err(e);
            }
        };
        let ResolvedScan {
            scan_id,
            location,
            identity,
            device,
        } = resolved;

        // Dispatched
        let notification = NotificationBody::new(
            non_empty(title).unwrap_or(DEFAULT_TITLE),
            match non_empty(body) {
                Some(text) => text.to_string(),
                None => format!(
                    "Your RFID card was scanned at {}",
                    location.unwrap_or(UNKNOWN_LOCATION)
                ),
            },
        );
        let mut data = BTreeMap::new();
        data.insert("rfidId".to_string(), scan_id.to_string());
        data.insert("location".to_string(), location.unwrap_or_default().to_string());

        let delivery = self
            .dispatcher
            .dispatch_with_data(
                &notification,
                DispatchTarget::SingleToken(device.token.clone()),
                MessageKind::RfidScan,
                data,
            )
            .await
            .map_err(|e| e.to_string())
            .and_then(|summary| {
                let first = summary.results.into_iter().next();
                match first {
                    Some(r) if r.success => Ok(r.message_id),
                    Some(r) => Err(r.error_detail.unwrap_or_else(|| "send failed".to_string())),
                    None => Err("no delivery attempted".to_string()),
                }
            });

        // Recorded
        let event = ScanEvent {
            scan_id: scan_id.to_string(),
            identity: identity.clone(),
            location: location.map(str::to_string),
            timestamp: Utc::now(),
            notification_sent: delivery.is_ok(),
            message_id: delivery.as_ref().ok().cloned().flatten(),
            error: delivery.as_ref().err().cloned(),
        };
        if let Err(e) = self.registry.store().insert_scan(&event).await {
            warn!(rfid = %scan_id, identity = %identity, error = %e, "Failed to record RFID scan");
            self.record("store_failed");
            return Err(e.into());
        }

        match delivery {
            Ok(_) => {
                info!(
                    rfid = %scan_id,
                    identity = %identity,
                    message_id = event.message_id.as_deref().unwrap_or(""),
                    "RFID notification sent"
                );
                self.record("notified");
                Ok(ScanOutcome {
                    user_email: device.email().map(str::to_string),
                    event,
                })
            }
            Err(detail) => {
                warn!(rfid = %scan_id, identity = %identity, error = %detail, "RFID notification failed");
                self.record("delivery_failed");
                Err(NotifyError::DeliveryFailed(format!(
                    "Failed to send notification: {detail}"
                )))
            }
        }
    }

    async fn resolve<'a>(&self, scan_id: &'a str, location: Option<&'a str>) -> Result<ResolvedScan<'a>> {
        let scan_id = non_empty(Some(scan_id)).ok_or_else(|| NotifyError::invalid("RFID ID is required"))?;
        info!(rfid = %scan_id, "Looking up RFID card");

        let identity = self.registry.find_by_physical_tag(scan_id).await?;
        let device = match self.registry.get(&identity).await {
            Ok(device) if !device.token.trim().is_empty() => device,
            Ok(_) | Err(NotifyError::NotFound(_)) => {
                warn!(rfid = %scan_id, identity = %identity, "No FCM token for card owner");
                return Err(NotifyError::not_found("No FCM token found for user"));
            }
            Err(e) => return Err(e),
        };

        Ok(ResolvedScan {
            scan_id,
            location: non_empty(location),
            identity,
            device,
        })
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_scan(outcome);
        }
    }

    /// Most recent scans first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<ScanEvent>> {
        Ok(self.registry.store().list_scans(limit).await?)
    }
}
