// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! RFID Push Gateway
//!
//! Registers mobile push tokens and turns RFID card scans into push
//! notifications:
//!
//! - One delivery token per identity, last write wins
//! - RFID tag to identity resolution
//! - Single-token and broadcast dispatch with per-target results
//! - Scan events recorded whether or not delivery succeeded
//! - Per-caller fixed-window rate limiting

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod scan;
pub mod store;
pub mod transport;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{NotifyError, StoreError, TransportError};
pub use limiter::{RateLimitResult, RateLimiter};
pub use registry::TokenRegistry;
pub use scan::{ScanOutcome, ScanRouter};
