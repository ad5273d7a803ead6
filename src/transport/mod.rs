// SPDX-License-Identifier: PMPL-1.0-or-later
//! Push delivery transports

mod fcm;

pub use fcm::FcmTransport;

use crate::error::TransportError;
use crate::models::{mask_token, PushMessage};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Sends one message to one delivery token and returns the provider's
/// message id.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<String, TransportError>;
}

/// Transport used when no provider credentials are configured.
///
/// Logs every message and reports a synthetic message id.
#[derive(Debug, Default)]
pub struct DryRunTransport {
    sent: AtomicU64,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryTransport for DryRunTransport {
    async fn send(&self, message: &PushMessage) -> Result<String, TransportError> {
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            token = %mask_token(&message.token),
            title = %message.title,
            kind = message.data.get("type").map(String::as_str).unwrap_or("unknown"),
            "Dry-run push (no FCM credentials configured)"
        );
        Ok(format!("dry-run/{n}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_dry_run_ids_increase() {
        let transport = DryRunTransport::new();
        let message = PushMessage {
            token: "t".repeat(40),
            title: "Hi".into(),
            body: "There".into(),
            data: BTreeMap::new(),
        };
        assert_eq!(transport.send(&message).await.unwrap(), "dry-run/1");
        assert_eq!(transport.send(&message).await.unwrap(), "dry-run/2");
    }
}
