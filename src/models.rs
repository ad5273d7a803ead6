// SPDX-License-Identifier: PMPL-1.0-or-later
//! Data models for device tokens, tag assignments and scan events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form device metadata (platform, app version, email, ...)
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// The current delivery token registered for an identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceToken {
    /// Stable user/account key
    pub identity: String,
    /// Opaque delivery token issued by the push provider
    pub token: String,
    /// Device metadata as supplied at registration
    #[serde(default)]
    pub metadata: Metadata,
    /// Last registration time
    pub registered_at: DateTime<Utc>,
}

impl DeviceToken {
    pub fn new(identity: impl Into<String>, token: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            identity: identity.into(),
            token: token.into(),
            metadata,
            registered_at: Utc::now(),
        }
    }

    /// Masked token preview, safe for logs and responses
    pub fn masked(&self) -> String {
        mask_token(&self.token)
    }

    pub fn platform(&self) -> Option<&str> {
        self.metadata_str("platform")
    }

    pub fn email(&self) -> Option<&str> {
        self.metadata_str("email")
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Association from a physical RFID tag to its owning identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagAssignment {
    pub tag_id: String,
    pub identity: String,
    pub assigned_at: DateTime<Utc>,
}

impl TagAssignment {
    pub fn new(tag_id: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            tag_id: tag_id.into(),
            identity: identity.into(),
            assigned_at: Utc::now(),
        }
    }
}

/// Record of one resolved scan; written once, never updated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    pub scan_id: String,
    pub identity: String,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub notification_sent: bool,
    pub message_id: Option<String>,
    /// Delivery error with tokens masked, when the send failed
    #[serde(default)]
    pub error: Option<String>,
}

/// How a registration treats existing metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegisterMode {
    /// Last write wins; prior metadata is discarded
    #[default]
    Replace,
    /// Top-level metadata keys are merged, new values winning
    Merge,
}

/// Title and text of a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationBody {
    pub title: String,
    pub text: String,
}

impl NotificationBody {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }
}

/// Target selector for a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
    /// Exactly one delivery token
    SingleToken(String),
    /// Every currently registered token
    AllRegistered,
}

/// Value of the `type` data key attached to each message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Direct,
    Broadcast,
    RfidScan,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Broadcast => "broadcast",
            Self::RfidScan => "rfid_scan",
        }
    }
}

/// One message handed to a delivery transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    /// String-only data payload, as FCM requires
    pub data: BTreeMap<String, String>,
}

/// Outcome of a single attempted delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    /// Identity for broadcasts, masked token for direct sends
    pub target: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl DispatchResult {
    pub fn sent(target: String, message_id: String) -> Self {
        Self {
            target,
            success: true,
            message_id: Some(message_id),
            error_detail: None,
        }
    }

    pub fn failed(target: String, error_detail: String) -> Self {
        Self {
            target,
            success: false,
            message_id: None,
            error_detail: Some(error_detail),
        }
    }
}

/// Aggregated outcome of a dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub sent_count: usize,
    pub failed_count: usize,
    pub results: Vec<DispatchResult>,
}

impl DispatchSummary {
    pub fn from_results(results: Vec<DispatchResult>) -> Self {
        let sent_count = results.iter().filter(|r| r.success).count();
        Self {
            sent_count,
            failed_count: results.len() - sent_count,
            results,
        }
    }

    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    /// At least one target received the message
    pub fn any_sent(&self) -> bool {
        self.failed_count < self.attempted()
    }
}

/// Shorten a delivery token for display.
///
/// Long tokens keep 20 leading and 10 trailing characters; short ones keep
/// at most 8 leading characters so the secret part is never echoed.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 30 {
        let head: String = chars[..20].iter().collect();
        let tail: String = chars[chars.len() - 10..].iter().collect();
        format!("{head}...{tail}")
    } else {
        let head: String = chars.iter().take(8.min(chars.len() / 2)).collect();
        format!("{head}...")
    }
}

/// Replace every occurrence of `token` in `text` with its masked form
pub fn redact_token(text: &str, token: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    text.replace(token, &mask_token(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_long_token() {
        let token = "a".repeat(20) + &"b".repeat(100) + &"c".repeat(10);
        let masked = mask_token(&token);
        assert_eq!(masked, format!("{}...{}", "a".repeat(20), "c".repeat(10)));
    }

    #[test]
    fn test_mask_short_token_hides_most_of_it() {
        assert_eq!(mask_token("abcdefgh"), "abcd...");
        assert_eq!(mask_token(""), "...");
        assert!(!mask_token("0123456789abcdefghij").contains("ghij"));
    }

    #[test]
    fn test_redact_token() {
        let token = "x".repeat(40);
        let text = format!("Requested entity was not found: {token}");
        let redacted = redact_token(&text, &token);
        assert!(!redacted.contains(&token));
        assert!(redacted.contains("..."));
    }

    #[test]
    fn test_summary_counts() {
        let summary = DispatchSummary::from_results(vec![
            DispatchResult::sent("a".into(), "m1".into()),
            DispatchResult::failed("b".into(), "boom".into()),
            DispatchResult::sent("c".into(), "m2".into()),
        ]);
        assert_eq!(summary.sent_count, 2);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.attempted(), 3);
        assert!(summary.any_sent());
    }

    #[test]
    fn test_device_metadata_accessors() {
        let mut metadata = Metadata::new();
        metadata.insert("platform".into(), "android".into());
        metadata.insert("email".into(), "ana@example.com".into());
        let device = DeviceToken::new("user-1", "tok", metadata);
        assert_eq!(device.platform(), Some("android"));
        assert_eq!(device.email(), Some("ana@example.com"));
    }
}
