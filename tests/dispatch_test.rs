// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Registry and dispatcher integration tests.

mod harness;

use harness::{
    device_metadata, long_token,
    transports::{FailingTransport, RecordingTransport, SelectiveTransport},
    Fixture,
};
use rfid_push_gateway::{
    models::{DispatchTarget, NotificationBody},
    NotifyError,
};
use std::sync::Arc;

#[tokio::test]
async fn test_register_twice_keeps_latest_token() {
    let fixture = Fixture::new(Arc::new(RecordingTransport::default()));

    let first = fixture
        .registry
        .register("ana", "token-one", device_metadata("android", "ana@example.org"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    fixture
        .registry
        .register("ana", "token-two", device_metadata("ios", "ana@example.org"))
        .await
        .unwrap();

    let devices = fixture.registry.list_all().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].token, "token-two");
    assert!(devices[0].registered_at > first.registered_at);
}

#[tokio::test]
async fn test_get_returns_last_registered_values() {
    let fixture = Fixture::new(Arc::new(RecordingTransport::default()));
    let metadata = device_metadata("ios", "bo@example.org");

    fixture.registry.register("bo", "old", device_metadata("android", "x")).await.unwrap();
    fixture.registry.register("bo", "new", metadata.clone()).await.unwrap();

    let device = fixture.registry.get("bo").await.unwrap();
    assert_eq!(device.token, "new");
    assert_eq!(device.metadata, metadata);

    assert!(matches!(
        fixture.registry.get("nobody").await,
        Err(NotifyError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_broadcast_counts_partial_failures() {
    let tokens: Vec<String> = (0..5).map(|i| long_token(&format!("device-{i}"))).collect();
    let transport = Arc::new(SelectiveTransport::failing([tokens[1].clone(), tokens[3].clone()]));
    let fixture = Fixture::new(transport.clone());
    for (i, token) in tokens.iter().enumerate() {
        fixture.register(&format!("user-{i}"), token).await;
    }

    let summary = fixture
        .dispatcher
        .dispatch(&NotificationBody::new("Hello", "Everyone"), DispatchTarget::AllRegistered)
        .await
        .unwrap();

    assert_eq!(summary.sent_count, 3);
    assert_eq!(summary.failed_count, 2);
    assert_eq!(summary.results.len(), 5);
    assert_eq!(transport.attempts(), 5);

    let failed: Vec<&str> = summary
        .results
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.target.as_str())
        .collect();
    assert_eq!(failed, ["user-1", "user-3"]);
}

#[tokio::test]
async fn test_broadcast_with_every_send_failing_still_summarises() {
    let transport = Arc::new(FailingTransport::default());
    let fixture = Fixture::new(transport.clone());
    fixture.register("a", &long_token("a")).await;
    fixture.register("b", &long_token("b")).await;

    let summary = fixture
        .dispatcher
        .dispatch(&NotificationBody::new("T", "B"), DispatchTarget::AllRegistered)
        .await
        .unwrap();

    assert_eq!(summary.sent_count, 0);
    assert_eq!(summary.failed_count, 2);
    assert!(!summary.any_sent());
    for result in &summary.results {
        let detail = result.error_detail.as_deref().unwrap();
        assert!(!detail.contains(&long_token("a")));
        assert!(!detail.contains(&long_token("b")));
    }
}

#[tokio::test]
async fn test_broadcast_sees_registry_snapshot() {
    let transport = Arc::new(RecordingTransport::default());
    let fixture = Fixture::new(transport.clone());
    fixture.register("a", "tok-a").await;
    fixture.register("b", "tok-b").await;
    fixture.registry.remove("tok-a").await.unwrap();

    let summary = fixture
        .dispatcher
        .dispatch(&NotificationBody::new("T", "B"), DispatchTarget::AllRegistered)
        .await
        .unwrap();

    assert_eq!(summary.results.len(), 1);
    let messages = transport.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].token, "tok-b");
    assert_eq!(messages[0].data["type"], "broadcast");
}

#[tokio::test]
async fn test_single_token_failure_is_reported_not_raised() {
    let fixture = Fixture::new(Arc::new(FailingTransport::default()));

    let summary = fixture
        .dispatcher
        .dispatch(
            &NotificationBody::new("T", "B"),
            DispatchTarget::SingleToken(long_token("lonely")),
        )
        .await
        .unwrap();

    assert_eq!(summary.sent_count, 0);
    assert_eq!(summary.failed_count, 1);
    assert!(summary.results[0].target.ends_with("AAAAAAAAAA"));
    assert!(summary.results[0].target.contains("..."));
}
