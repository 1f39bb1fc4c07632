//! Size-gated download and fallback behavior of the delivery pipeline.

use std::time::Duration;

use daily_relay::models::item::{AttachmentRef, InventoryItem};
use daily_relay::relay::delivery::{AttachmentSource, DeliveryPipeline, DeliveryStatus};
use daily_relay::AppError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::test_helpers::{delivery_config, permalink, pipeline, FakeTarget, ROLE_ID};

fn item(attachments: Vec<AttachmentRef>) -> InventoryItem {
    InventoryItem {
        source_message_id: 3,
        text_content: "caption".into(),
        attachment_refs: attachments,
        origin_link: permalink(3),
    }
}

async fn serve(server: &MockServer, file: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/{file}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

fn attachment(server: &MockServer, file: &str, size: u64) -> AttachmentRef {
    AttachmentRef::new(format!("{}/{file}", server.uri()), size, file)
}

#[tokio::test]
async fn within_budget_all_files_inline() {
    let server = MockServer::start().await;
    serve(&server, "a.png", b"png-bytes").await;
    serve(&server, "b.mp3", b"mp3-bytes").await;
    let refs = vec![attachment(&server, "a.png", 9), attachment(&server, "b.mp3", 9)];
    let target = FakeTarget::default();

    let report = pipeline(1024)
        .deliver(&item(refs.clone()), AttachmentSource::Fresh(refs), &target)
        .await
        .expect("delivered");

    assert_eq!(report.status, DeliveryStatus::Delivered);
    assert_eq!(report.inline_files, 2);
    assert_eq!(report.fallback_links, 0);

    let sent = target.sent();
    assert_eq!(sent.len(), 1);
    let message = &sent[0];
    assert_eq!(message.files.len(), 2);
    assert_eq!(message.files[0].filename, "a.png");
    assert_eq!(message.files[0].bytes.as_ref(), b"png-bytes");
    assert_eq!(message.files[1].filename, "b.mp3");
    assert_eq!(
        message.content,
        format!("<@&{ROLE_ID}>\ncaption\n\n{}", permalink(3))
    );
    assert_eq!(message.mention_role, Some(ROLE_ID));
}

#[tokio::test]
async fn over_budget_sends_only_links_and_downloads_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
        .expect(0)
        .mount(&server)
        .await;
    let refs = vec![
        attachment(&server, "a.mp4", 600),
        attachment(&server, "b.mov", 600),
    ];
    let target = FakeTarget::default();

    let report = pipeline(1000)
        .deliver(&item(refs.clone()), AttachmentSource::Fresh(refs.clone()), &target)
        .await
        .expect("delivered");

    assert_eq!(report.status, DeliveryStatus::PartialDelivered);
    assert_eq!(report.inline_files, 0);
    assert_eq!(report.fallback_links, 2);

    let message = &target.sent()[0];
    assert!(message.files.is_empty());
    assert_eq!(
        message.content,
        format!(
            "<@&{ROLE_ID}>\ncaption\n{}\n{}\n\n{}",
            refs[0].url,
            refs[1].url,
            permalink(3)
        )
    );
}

#[tokio::test]
async fn total_exactly_at_budget_is_downloaded() {
    let server = MockServer::start().await;
    serve(&server, "a.png", b"0123456789").await;
    let refs = vec![attachment(&server, "a.png", 10)];
    let target = FakeTarget::default();

    let report = pipeline(10)
        .deliver(&item(refs.clone()), AttachmentSource::Fresh(refs), &target)
        .await
        .unwrap();

    assert_eq!(report.inline_files, 1);
    assert_eq!(report.fallback_links, 0);
}

#[tokio::test]
async fn mixed_outcome_keeps_successes_and_links_failures() {
    let server = MockServer::start().await;
    serve(&server, "a.png", b"a").await;
    serve(&server, "c.gif", b"c").await;
    Mock::given(method("GET"))
        .and(path("/b.webp"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let refs = vec![
        attachment(&server, "a.png", 1),
        attachment(&server, "b.webp", 1),
        attachment(&server, "c.gif", 1),
    ];
    let failed_url = refs[1].url.clone();
    let target = FakeTarget::default();

    let report = pipeline(1024)
        .deliver(&item(refs.clone()), AttachmentSource::Fresh(refs), &target)
        .await
        .unwrap();

    assert_eq!(report.status, DeliveryStatus::PartialDelivered);
    assert_eq!(report.inline_files, 2);
    assert_eq!(report.fallback_links, 1);

    let message = &target.sent()[0];
    let names: Vec<&str> = message.files.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(names, ["a.png", "c.gif"]);
    assert!(message.content.contains(&format!("\n{failed_url}\n")));
}

#[tokio::test]
async fn slow_download_is_demoted_after_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.mp3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    let refs = vec![attachment(&server, "slow.mp3", 4)];
    let mut config = delivery_config(1024);
    config.request_timeout_seconds = 1;
    let pipeline = DeliveryPipeline::new(&config, ROLE_ID).unwrap();
    let target = FakeTarget::default();

    let report = pipeline
        .deliver(&item(refs.clone()), AttachmentSource::Fresh(refs), &target)
        .await
        .unwrap();

    assert_eq!(report.inline_files, 0);
    assert_eq!(report.fallback_links, 1);
}

#[tokio::test]
async fn body_larger_than_budget_is_demoted() {
    let server = MockServer::start().await;
    serve(&server, "liar.png", &[0_u8; 64]).await;
    // Declared size fits, actual body does not.
    let refs = vec![attachment(&server, "liar.png", 1)];
    let target = FakeTarget::default();

    let report = pipeline(16)
        .deliver(&item(refs.clone()), AttachmentSource::Fresh(refs), &target)
        .await
        .unwrap();

    assert_eq!(report.inline_files, 0);
    assert_eq!(report.fallback_links, 1);
}

#[tokio::test]
async fn stale_snapshot_is_never_downloaded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let refs = vec![attachment(&server, "a.png", 1)];
    let target = FakeTarget::default();

    let report = pipeline(1024)
        .deliver(&item(refs.clone()), AttachmentSource::Stale(refs.clone()), &target)
        .await
        .unwrap();

    assert_eq!(report.inline_files, 0);
    assert_eq!(report.fallback_links, 1);
    assert!(target.sent()[0].content.contains(&refs[0].url));
}

#[tokio::test]
async fn send_failure_is_a_transport_error() {
    let target = FakeTarget::failing();

    let err = pipeline(1024)
        .deliver(&item(vec![]), AttachmentSource::none(), &target)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Transport(_)));
    assert!(target.sent().is_empty());
}

#[tokio::test]
async fn footer_label_is_rendered() {
    let mut config = delivery_config(1024);
    config.footer_label = Some("Original message:".into());
    let pipeline = DeliveryPipeline::new(&config, ROLE_ID).unwrap();
    let target = FakeTarget::default();

    pipeline
        .deliver(&item(vec![]), AttachmentSource::none(), &target)
        .await
        .unwrap();

    assert_eq!(
        target.sent()[0].content,
        format!("<@&{ROLE_ID}>\ncaption\n\nOriginal message:\n{}", permalink(3))
    );
}

/// One-shot server replying with a chunked body and no Content-Length.
async fn chunked_server(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0_u8; 2048];
        let _ = socket.read(&mut request).await;

        let mut response =
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
        for chunk in body.chunks(8) {
            response.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
            response.extend_from_slice(chunk);
            response.extend_from_slice(b"\r\n");
        }
        response.extend_from_slice(b"0\r\n\r\n");
        let _ = socket.write_all(&response).await;
    });
    format!("http://{addr}/stream.mp3")
}

#[tokio::test]
async fn chunked_body_over_budget_is_demoted() {
    let url = chunked_server(vec![7_u8; 64]).await;
    let refs = vec![AttachmentRef::new(url.clone(), 1, "stream.mp3")];
    let target = FakeTarget::default();

    let report = pipeline(16)
        .deliver(&item(refs.clone()), AttachmentSource::Fresh(refs), &target)
        .await
        .unwrap();

    assert_eq!(report.inline_files, 0);
    assert_eq!(report.fallback_links, 1);
    assert!(target.sent()[0].content.contains(&url));
}

#[tokio::test]
async fn chunked_body_within_budget_is_inlined() {
    let url = chunked_server(b"0123456789abc".to_vec()).await;
    let refs = vec![AttachmentRef::new(url, 13, "stream.mp3")];
    let target = FakeTarget::default();

    let report = pipeline(16)
        .deliver(&item(refs.clone()), AttachmentSource::Fresh(refs), &target)
        .await
        .unwrap();

    assert_eq!(report.inline_files, 1);
    assert_eq!(target.sent()[0].files[0].bytes.as_ref(), b"0123456789abc");
}
