// SPDX-License-Identifier: PMPL-1.0-or-later
//! Firebase Cloud Messaging (HTTP v1) transport
//!
//! Authenticates with a service account: a signed RS256 assertion is
//! exchanged for an OAuth2 access token, which is cached until shortly
//! before it expires.

use super::DeliveryTransport;
use crate::config::FcmConfig;
use crate::error::TransportError;
use crate::models::{redact_token, PushMessage};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const FCM_BASE_URL: &str = "https://fcm.googleapis.com";
const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// FCM HTTP v1 client
pub struct FcmTransport {
    config: FcmConfig,
    base_url: String,
    client: reqwest::Client,
    access: Mutex<Option<AccessToken>>,
}

impl FcmTransport {
    /// Create a transport; fails if the HTTP client cannot be built.
    pub fn new(config: FcmConfig) -> Result<Self, TransportError> {
        Self::with_base_url(config, FCM_BASE_URL)
    }

    /// Create a transport against a non-default FCM host.
    pub fn with_base_url(config: FcmConfig, base_url: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            access: Mutex::new(None),
        })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.config.project_id
        )
    }

    /// Build the signed service-account assertion
    fn assertion(&self) -> Result<String, TransportError> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.config.client_email,
            scope: MESSAGING_SCOPE,
            aud: &self.config.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.config.private_key.as_bytes())
            .map_err(|e| TransportError::Credentials(format!("invalid private key: {e}")))?;

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| TransportError::Credentials(e.to_string()))
    }

    /// Return a cached access token or fetch a fresh one
    async fn access_token(&self) -> Result<String, TransportError> {
        let mut cached = self.access.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.assertion()?;
        let response = self
            .client
            .post(&self.config.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(TransportError::Unauthorized(format!(
                "token endpoint returned {status}: {detail}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Credentials(e.to_string()))?;
        debug!(expires_in = token.expires_in, "Obtained FCM access token");

        let value = token.access_token.clone();
        *cached = Some(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    async fn forget_access_token(&self) {
        *self.access.lock().await = None;
    }
}

/// Request body for `messages:send`
fn message_body(message: &PushMessage) -> serde_json::Value {
    json!({
        "message": {
            "token": message.token,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "data": message.data,
        }
    })
}

/// Map an FCM error response to a transport error.
fn classify_error(status: u16, body: &str) -> TransportError {
    let parsed: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    let error = &parsed["error"];
    let detail = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    let fcm_code = error["details"]
        .as_array()
        .and_then(|details| details.iter().find_map(|d| d["errorCode"].as_str()));

    match (status, fcm_code) {
        (_, Some("UNREGISTERED")) | (404, _) => TransportError::InvalidToken(detail),
        (400, Some("INVALID_ARGUMENT")) => TransportError::InvalidToken(detail),
        (401 | 403, _) | (_, Some("THIRD_PARTY_AUTH_ERROR" | "SENDER_ID_MISMATCH")) => {
            TransportError::Unauthorized(detail)
        }
        _ => TransportError::Rejected { status, detail },
    }
}

#[async_trait]
impl DeliveryTransport for FcmTransport {
    async fn send(&self, message: &PushMessage) -> Result<String, TransportError> {
        let access_token = self.access_token().await?;

        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(access_token)
            .json(&message_body(message))
            .send()
            .await
            .map_err(|e| TransportError::Network(redact_token(&e.to_string(), &message.token)))?;

        let status = response.status();
        if status.is_success() {
            let sent: SendResponse = response
                .json()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            return Ok(sent.name);
        }

        let body = response.text().await.unwrap_or_default();
        let error = classify_error(status.as_u16(), &redact_token(&body, &message.token));
        if matches!(error, TransportError::Unauthorized(_)) {
            warn!(%status, "FCM rejected credentials, dropping cached access token");
            self.forget_access_token().await;
        }
        Err(error)
    }
}
