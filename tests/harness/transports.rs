// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Scripted delivery transports.

use async_trait::async_trait;
use rfid_push_gateway::{models::PushMessage, transport::DeliveryTransport, TransportError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Accepts every message and remembers it.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<PushMessage>>,
}

impl RecordingTransport {
    pub fn messages(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryTransport for RecordingTransport {
    async fn send(&self, message: &PushMessage) -> Result<String, TransportError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(format!("projects/test/messages/{}", sent.len()))
    }
}

/// Rejects every message as if the token were stale.
#[derive(Default)]
pub struct FailingTransport {
    attempts: AtomicUsize,
}

impl FailingTransport {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryTransport for FailingTransport {
    async fn send(&self, message: &PushMessage) -> Result<String, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::InvalidToken(format!(
            "Requested entity was not found ({})",
            message.token
        )))
    }
}

/// Fails exactly the tokens it was built with.
pub struct SelectiveTransport {
    failing: HashSet<String>,
    attempts: AtomicUsize,
}

impl SelectiveTransport {
    pub fn failing<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing: tokens.into_iter().map(Into::into).collect(),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryTransport for SelectiveTransport {
    async fn send(&self, message: &PushMessage) -> Result<String, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&message.token) {
            Err(TransportError::Unauthorized("sender mismatch".to_string()))
        } else {
            Ok(format!("projects/test/messages/{}", message.token.len()))
        }
    }
}
