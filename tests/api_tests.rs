//! HTTP surface tests, driven through the router with tower's oneshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use signald_webhook::config::Receiver;
use signald_webhook::templates::TemplateSet;
use signald_webhook::{AppContext, api, supervisor};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tower::ServiceExt;

fn context(socket_path: std::path::PathBuf) -> Arc<AppContext> {
    let receivers = HashMap::from([(
        "oncall".to_string(),
        Receiver {
            name: "oncall".to_string(),
            sender: "+4915501234567".to_string(),
            to: vec!["tel:+15551234567".to_string()],
            template: "{{ status }}: {{ groupLabels.alertname }}".to_string(),
        },
    )]);
    let templates = TemplateSet::from_globs(&[]).unwrap();
    Arc::new(AppContext::new(receivers, templates, socket_path))
}

fn alert_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/alert")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn valid_payload(receiver: &str) -> String {
    serde_json::json!({
        "receiver": receiver,
        "status": "firing",
        "groupLabels": {"alertname": "HighLoad"},
        "alerts": []
    })
    .to_string()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn invalid_json_is_a_decode_failure() {
    let context = context("/nonexistent.sock".into());
    let router = api::router(Arc::clone(&context));

    let response = router.oneshot(alert_request("{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "Decode failed");

    let text = context.metrics.gather().unwrap();
    assert!(text.contains(r#"signald_webhook_alerts_errors_total{type="decode"} 1"#));
    assert!(text.contains(r#"signald_webhook_alerts_errors_total{type="handle"} 0"#));
    assert!(text.contains("signald_webhook_alerts_received_total 1"));
}

#[tokio::test]
async fn unknown_receiver_is_a_handler_failure() {
    let context = context("/nonexistent.sock".into());
    let router = api::router(Arc::clone(&context));

    let response = router
        .oneshot(alert_request(&valid_payload("nobody")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "Handling alert failed");

    let text = context.metrics.gather().unwrap();
    assert!(text.contains(r#"signald_webhook_alerts_errors_total{type="handle"} 1"#));
    assert!(text.contains(r#"signald_webhook_alerts_errors_total{type="decode"} 0"#));
}

#[tokio::test]
async fn known_receiver_without_a_connection_is_a_handler_failure() {
    let context = context("/nonexistent.sock".into());
    let router = api::router(Arc::clone(&context));

    let response = router
        .oneshot(alert_request(&valid_payload("oncall")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = context.metrics.gather().unwrap();
    assert!(text.contains(r#"signald_webhook_alerts_errors_total{type="handle"} 1"#));
}

#[tokio::test]
async fn metrics_endpoint_serves_the_exposition_format() {
    let context = context("/nonexistent.sock".into());
    let router = api::router(context);

    let response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_string(response).await;
    assert!(text.contains("signald_webhook_alerts_received_total 0"));
    assert!(text.contains("signald_webhook_signal_connected 0"));
}

/// Accepts connections forever, greets each with a version event and
/// acknowledges every send request, forwarding it for inspection.
async fn fake_daemon(listener: UnixListener, seen: mpsc::UnboundedSender<serde_json::Value>) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let (read, mut write) = stream.into_split();

        write
            .write_all(
                b"{\"type\":\"version\",\"data\":{\"name\":\"signald\",\"version\":\"0.23.2\"}}\n",
            )
            .await
            .unwrap();

        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            let id = value["id"].as_str().unwrap();
            let ack = format!("{{\"type\":\"send\",\"id\":\"{id}\",\"data\":{{}}}}\n");
            seen.send(value).unwrap();
            write.write_all(ack.as_bytes()).await.unwrap();
        }
    }
}

#[tokio::test]
async fn alert_is_relayed_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("signald.sock");
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(fake_daemon(
        UnixListener::bind(&socket_path).unwrap(),
        seen_tx,
    ));

    let context = context(socket_path);
    tokio::spawn(supervisor::run(Arc::clone(&context)));

    // Wait for the supervisor to establish the connection.
    for _ in 0..100 {
        if context.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(context.is_connected());

    let router = api::router(Arc::clone(&context));
    let response = router
        .oneshot(alert_request(&valid_payload("oncall")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");

    let request = seen_rx.recv().await.unwrap();
    assert_eq!(request["username"], "+4915501234567");
    assert_eq!(request["recipientAddress"]["number"], "+15551234567");
    assert_eq!(request["messageBody"], "firing: HighLoad");

    let text = context.metrics.gather().unwrap();
    assert!(text.contains("signald_webhook_signal_connected 1"));
    assert!(
        text.contains(r#"signald_webhook_signal_info{name="signald",version="0.23.2"} 1"#)
    );
}
