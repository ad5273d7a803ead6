// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared fixtures for gateway integration tests.
//!
//! Provides scripted delivery transports and helpers for wiring a registry,
//! dispatcher and scan router over an in-memory store.

#![allow(dead_code)]

pub mod transports;

use rfid_push_gateway::{
    models::Metadata, store::MemoryStore, transport::DeliveryTransport, Dispatcher, ScanRouter,
    TokenRegistry,
};
use serde_json::json;
use std::sync::Arc;

/// Everything a scan or dispatch test needs, sharing one store.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub registry: TokenRegistry,
    pub dispatcher: Arc<Dispatcher>,
    pub router: ScanRouter,
}

impl Fixture {
    pub fn new(transport: Arc<dyn DeliveryTransport>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let registry = TokenRegistry::new(store.clone());
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), transport));
        let router = ScanRouter::new(registry.clone(), dispatcher.clone());
        Self {
            store,
            registry,
            dispatcher,
            router,
        }
    }

    /// Register an identity with a platform/email metadata block.
    pub async fn register(&self, identity: &str, token: &str) {
        let metadata = device_metadata("android", &format!("{identity}@example.org"));
        self.registry
            .register(identity, token, metadata)
            .await
            .expect("register");
    }

    /// Register an identity and give it one RFID card.
    pub async fn register_with_card(&self, identity: &str, token: &str, card: &str) {
        self.register(identity, token).await;
        self.registry
            .assign_tag(card, identity)
            .await
            .expect("assign tag");
    }
}

pub fn device_metadata(platform: &str, email: &str) -> Metadata {
    json!({ "platform": platform, "appVersion": "1.4.2", "email": email })
        .as_object()
        .cloned()
        .unwrap_or_default()
}

/// A token long enough to exercise masking.
pub fn long_token(seed: &str) -> String {
    format!("{seed}:{}", "A".repeat(140))
}
