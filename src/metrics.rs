// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for sends, scans and rate-limit rejections.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    push_sends: IntCounterVec,
    rfid_scans: IntCounterVec,
    rate_limited: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let push_sends = IntCounterVec::new(
            Opts::new("push_sends_total", "Push messages attempted, by outcome"),
            &["outcome"],
        )?;
        let rfid_scans = IntCounterVec::new(
            Opts::new("rfid_scans_total", "RFID scans handled, by outcome"),
            &["outcome"],
        )?;
        let rate_limited = IntCounterVec::new(
            Opts::new("rate_limited_total", "Requests rejected by the rate limiter"),
            &["policy"],
        )?;

        registry.register(Box::new(push_sends.clone()))?;
        registry.register(Box::new(rfid_scans.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;

        Ok(Self {
            registry,
            push_sends,
            rfid_scans,
            rate_limited,
        })
    }

    pub fn record_send(&self, success: bool) {
        let outcome = if success { "sent" } else { "failed" };
        self.push_sends.with_label_values(&[outcome]).inc();
    }

    /// `outcome` is one of `notified`, `delivery_failed`, `store_failed`, `rejected`
    pub fn record_scan(&self, outcome: &str) {
        self.rfid_scans.with_label_values(&[outcome]).inc();
    }

    pub fn record_rate_limited(&self, policy: &str) {
        self.rate_limited.with_label_values(&[policy]).inc();
    }

    /// Render every metric in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
