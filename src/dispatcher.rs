// SPDX-License-Identifier: PMPL-1.0-or-later
//! Notification fan-out
//!
//! One message per target, each send independent of the others. Results
//! come back in target order whatever the configured concurrency.

use crate::error::{NotifyError, Result};
use crate::metrics::Metrics;
use crate::models::{
    mask_token, redact_token, DispatchResult, DispatchSummary, DispatchTarget, MessageKind,
    NotificationBody, PushMessage,
};
use crate::registry::TokenRegistry;
use crate::transport::DeliveryTransport;
use chrono::{SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// One resolved send target.
struct Recipient {
    /// Identity for broadcasts, masked token otherwise
    label: String,
    token: String,
}

pub struct Dispatcher {
    registry: TokenRegistry,
    transport: Arc<dyn DeliveryTransport>,
    concurrency: usize,
    metrics: Option<Arc<Metrics>>,
}

impl Dispatcher {
    pub fn new(registry: TokenRegistry, transport: Arc<dyn DeliveryTransport>) -> Self {
        Self {
            registry,
            transport,
            concurrency: 1,
            metrics: None,
        }
    }

    /// Allow up to `concurrency` sends in flight during a broadcast.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Send `body` to the selected targets.
    pub async fn dispatch(&self, body: &NotificationBody, target: DispatchTarget) -> Result<DispatchSummary> {
        let kind = match target {
            DispatchTarget::SingleToken(_) => MessageKind::Direct,
            DispatchTarget::AllRegistered => MessageKind::Broadcast,
        };
        self.dispatch_with_data(body, target, kind, BTreeMap::new())
            .await
    }

    /// Send with a message kind and extra data keys merged into the payload.
    pub async fn dispatch_with_data(
        &self,
        body: &NotificationBody,
        target: DispatchTarget,
        kind: MessageKind,
        extra: BTreeMap<String, String>,
    ) -> Result<DispatchSummary> {
        if body.title.trim().is_empty() || body.text.trim().is_empty() {
            return Err(NotifyError::invalid("Missing title or body"));
        }

        let recipients = self.resolve(target).await?;

        let mut data = extra;
        data.insert(
            "timestamp".to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        data.insert("type".to_string(), kind.as_str().to_string());

        let results: Vec<DispatchResult> = stream::iter(recipients)
            .map(|recipient| self.send_one(recipient, body, &data))
            .buffered(self.concurrency)
            .collect()
            .await;

        let summary = DispatchSummary::from_results(results);
        info!(
            kind = kind.as_str(),
            sent = summary.sent_count,
            failed = summary.failed_count,
            "Dispatch complete"
        );
        Ok(summary)
    }

    async fn resolve(&self, target: DispatchTarget) -> Result<Vec<Recipient>> {
        match target {
            DispatchTarget::SingleToken(token) => {
                let token = token.trim().to_string();
                if token.is_empty() {
                    return Err(NotifyError::invalid("Missing token or sendToAll flag"));
                }
                Ok(vec![Recipient {
                    label: mask_token(&token),
                    token,
                }])
            }
            DispatchTarget::AllRegistered => {
                let recipients: Vec<Recipient> = self
                    .registry
                    .list_all()
                    .await?
                    .into_iter()
                    .filter(|d| !d.token.trim().is_empty())
                    .map(|d| Recipient {
                        label: d.identity,
                        token: d.token,
                    })
                    .collect();

                if recipients.is_empty() {
                    return Err(NotifyError::invalid("No devices registered"));
                }
                info!(devices = recipients.len(), "Broadcasting to registered devices");
                Ok(recipients)
            }
        }
    }

    async fn send_one(
        &self,
        recipient: Recipient,
        body: &NotificationBody,
        data: &BTreeMap<String, String>,
    ) -> DispatchResult {
        let message = PushMessage {
            token: recipient.token,
            title: body.title.clone(),
            body: body.text.clone(),
            data: data.clone(),
        };

        let result = match self.transport.send(&message).await {
            Ok(message_id) => DispatchResult::sent(recipient.label, message_id),
            Err(err) => {
                let detail = redact_token(&err.to_string(), &message.token);
                warn!(
                    recipient = %recipient.label,
                    token = %mask_token(&message.token),
                    error = %detail,
                    "Push send failed"
                );
                DispatchResult::failed(recipient.label, detail)
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_send(result.success);
        }
        result
    }
}
