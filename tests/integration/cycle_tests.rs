//! End-to-end relay cycles over in-memory feeds.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use daily_relay::config::{LoaderConfig, OriginGonePolicy};
use daily_relay::inventory::loader::load_inventory;
use daily_relay::inventory::SharedInventory;
use daily_relay::models::item::AttachmentRef;
use daily_relay::relay::delivery::DeliveryStatus;
use daily_relay::relay::CycleOutcome;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::test_helpers::{
    permalink, record, relay, seeded_inventory, FakeSource, FakeTarget, ROLE_ID,
};

fn quick_loader() -> LoaderConfig {
    LoaderConfig {
        progress_interval: 100,
        pace_millis: 0,
    }
}

async fn loaded(source: &FakeSource) -> SharedInventory {
    let inventory = seeded_inventory();
    load_inventory(source, &inventory, &quick_loader())
        .await
        .expect("load");
    inventory
}

/// Attachment too large for the default budget, so it is never downloaded.
fn huge(name: &str) -> AttachmentRef {
    AttachmentRef::new(
        format!("https://cdn.example.invalid/{name}"),
        64 * 1024 * 1024,
        name,
    )
}

#[tokio::test]
async fn text_only_item_is_posted_with_mention_and_origin() {
    let source = Arc::new(FakeSource::new(vec![record(7, "hello", vec![])]));
    let target = Arc::new(FakeTarget::default());
    let inventory = loaded(&source).await;
    let relay = relay(
        inventory.clone(),
        Arc::clone(&source),
        Arc::clone(&target),
        OriginGonePolicy::default(),
    );

    let outcome = relay.run_cycle().await;

    let CycleOutcome::Delivered {
        source_message_id,
        report,
    } = outcome
    else {
        panic!("expected delivery, got {outcome:?}");
    };
    assert_eq!(source_message_id, 7);
    assert_eq!(report.status, DeliveryStatus::Delivered);

    let sent = target.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].content, format!("<@&{ROLE_ID}>\nhello\n\n{}", permalink(7)));
    assert!(sent[0].files.is_empty());
    assert_eq!(sent[0].mention_role, Some(ROLE_ID));
    assert!(inventory.lock().await.is_empty());
}

#[tokio::test]
async fn text_only_item_never_refetches_origin() {
    let source = Arc::new(FakeSource::new(vec![record(7, "hello", vec![])]));
    let target = Arc::new(FakeTarget::default());
    let relay = relay(
        loaded(&source).await,
        Arc::clone(&source),
        target,
        OriginGonePolicy::default(),
    );

    relay.run_cycle().await;

    assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_inventory_sends_nothing() {
    let source = Arc::new(FakeSource::new(vec![]));
    let target = Arc::new(FakeTarget::default());
    let relay = relay(
        seeded_inventory(),
        source,
        Arc::clone(&target),
        OriginGonePolicy::default(),
    );

    assert_eq!(relay.run_cycle().await, CycleOutcome::Empty);
    assert_eq!(target.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn draining_inventory_posts_each_item_once() {
    let records = (1..=5).map(|id| record(id, &format!("item {id}"), vec![])).collect();
    let source = Arc::new(FakeSource::new(records));
    let target = Arc::new(FakeTarget::default());
    let relay = relay(
        loaded(&source).await,
        source,
        Arc::clone(&target),
        OriginGonePolicy::default(),
    );

    let mut seen = HashSet::new();
    for _ in 0..5 {
        match relay.run_cycle().await {
            CycleOutcome::Delivered {
                source_message_id, ..
            } => assert!(seen.insert(source_message_id), "item posted twice"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(seen, (1..=5).collect());
    assert_eq!(relay.run_cycle().await, CycleOutcome::Empty);
    assert_eq!(target.sent().len(), 5);
}

#[tokio::test]
async fn refreshed_urls_replace_load_time_urls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fresh.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let stale = AttachmentRef::new("https://cdn.example.invalid/expired.png", 5, "expired.png");
    let source = Arc::new(FakeSource::new(vec![record(9, "pic", vec![stale])]));
    let target = Arc::new(FakeTarget::default());
    let inventory = loaded(&source).await;
    source.update(record(
        9,
        "pic",
        vec![AttachmentRef::new(format!("{}/fresh.png", server.uri()), 5, "fresh.png")],
    ));
    let relay = relay(
        inventory,
        Arc::clone(&source),
        Arc::clone(&target),
        OriginGonePolicy::default(),
    );

    let outcome = relay.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Delivered { .. }));
    assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 1);
    let sent = target.sent();
    assert_eq!(sent[0].files.len(), 1);
    assert_eq!(sent[0].files[0].filename, "fresh.png");
    assert_eq!(sent[0].files[0].bytes.as_ref(), b"fresh");
    assert!(!sent[0].content.contains("expired.png"));
}

#[tokio::test]
async fn origin_gone_with_stale_links_posts_snapshot_urls() {
    let source = Arc::new(FakeSource::new(vec![record(4, "caption", vec![huge("a.mp4")])]));
    let target = Arc::new(FakeTarget::default());
    let inventory = loaded(&source).await;
    source.delete(4);
    let relay = relay(
        inventory.clone(),
        source,
        Arc::clone(&target),
        OriginGonePolicy::StaleLinks,
    );

    let outcome = relay.run_cycle().await;

    let CycleOutcome::Delivered { report, .. } = outcome else {
        panic!("expected delivery, got {outcome:?}");
    };
    assert_eq!(report.status, DeliveryStatus::PartialDelivered);
    assert_eq!(report.fallback_links, 1);
    let content = &target.sent()[0].content;
    assert!(content.contains("https://cdn.example.invalid/a.mp4"));
    assert!(inventory.lock().await.is_empty());
}

#[tokio::test]
async fn origin_gone_drop_attachments_keeps_text() {
    let source = Arc::new(FakeSource::new(vec![record(4, "caption", vec![huge("a.mp4")])]));
    let target = Arc::new(FakeTarget::default());
    let inventory = loaded(&source).await;
    source.delete(4);
    let relay = relay(
        inventory,
        source,
        Arc::clone(&target),
        OriginGonePolicy::DropAttachments,
    );

    let outcome = relay.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Delivered { .. }));
    assert_eq!(
        target.sent()[0].content,
        format!("<@&{ROLE_ID}>\ncaption\n\n{}", permalink(4))
    );
}

#[tokio::test]
async fn origin_gone_drop_attachments_without_text_is_skipped() {
    let source = Arc::new(FakeSource::new(vec![record(4, "", vec![huge("a.mp4")])]));
    let target = Arc::new(FakeTarget::default());
    let inventory = loaded(&source).await;
    source.delete(4);
    let relay = relay(
        inventory.clone(),
        source,
        Arc::clone(&target),
        OriginGonePolicy::DropAttachments,
    );

    let outcome = relay.run_cycle().await;

    assert!(matches!(
        outcome,
        CycleOutcome::Skipped {
            source_message_id: 4,
            ..
        }
    ));
    assert_eq!(target.attempts.load(Ordering::SeqCst), 0);
    assert!(inventory.lock().await.is_empty());
}

#[tokio::test]
async fn origin_gone_skip_policy_sends_nothing() {
    let source = Arc::new(FakeSource::new(vec![record(4, "caption", vec![huge("a.mp4")])]));
    let target = Arc::new(FakeTarget::default());
    let inventory = loaded(&source).await;
    source.delete(4);
    let relay = relay(
        inventory.clone(),
        source,
        Arc::clone(&target),
        OriginGonePolicy::Skip,
    );

    let outcome = relay.run_cycle().await;

    let CycleOutcome::Skipped { reason, .. } = outcome else {
        panic!("expected skip, got {outcome:?}");
    };
    assert!(reason.contains("origin gone"));
    assert_eq!(target.attempts.load(Ordering::SeqCst), 0);
    assert!(inventory.lock().await.is_empty());
}

#[tokio::test]
async fn send_failure_still_consumes_item() {
    let source = Arc::new(FakeSource::new(vec![
        record(1, "one", vec![]),
        record(2, "two", vec![]),
    ]));
    let target = Arc::new(FakeTarget::failing());
    let inventory = loaded(&source).await;
    let relay = relay(
        inventory.clone(),
        source,
        Arc::clone(&target),
        OriginGonePolicy::default(),
    );

    let outcome = relay.run_cycle().await;

    let CycleOutcome::Failed {
        source_message_id,
        error,
    } = outcome
    else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(error.starts_with("transport:"));
    let inventory = inventory.lock().await;
    assert_eq!(inventory.len(), 1);
    assert!(!inventory.contains(source_message_id));
    assert_eq!(target.attempts.load(Ordering::SeqCst), 1);
}
