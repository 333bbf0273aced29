//! Delivery of status updates to a local webhook receiver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;

use odm_events::{
    DeliveryService, EventBus, Notifier, NotificationStatus, StatusUpdate, WebhookDelivery,
    WebhookError,
};

#[derive(Default)]
struct Receiver {
    /// Requests to reject before accepting.
    fail_first: usize,
    calls: AtomicUsize,
    received: Mutex<Vec<(String, Value)>>,
}

async fn hook(
    State(receiver): State<Arc<Receiver>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let call = receiver.calls.fetch_add(1, Ordering::SeqCst);
    if call < receiver.fail_first {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    let event_type = headers
        .get("x-event-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    receiver.received.lock().unwrap().push((event_type, body));
    StatusCode::NO_CONTENT
}

async fn spawn_receiver(fail_first: usize) -> (String, Arc<Receiver>) {
    let receiver = Arc::new(Receiver {
        fail_first,
        ..Default::default()
    });
    let app = Router::new()
        .route("/hook", post(hook))
        .with_state(Arc::clone(&receiver));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/hook"), receiver)
}

fn fast_delivery(url: &str) -> WebhookDelivery {
    WebhookDelivery::new(url, Duration::from_secs(2))
        .unwrap()
        .with_retry_delays(vec![Duration::from_millis(5); 3])
}

#[tokio::test]
async fn delivers_payload_with_event_type() {
    let (url, receiver) = spawn_receiver(0).await;
    let update = StatusUpdate::new("REQ-1", 22002, NotificationStatus::End, "ODM Task completed");

    fast_delivery(&url).deliver("request.status", &update).await.unwrap();

    let received = receiver.received.lock().unwrap();
    let (event_type, body) = &received[0];
    assert_eq!(event_type, "request.status.end");
    assert_eq!(body["event_type"], "request.status.end");
    assert_eq!(body["message_id"], "status-REQ-1-22002-end");
    assert_eq!(body["payload"]["requestId"], "REQ-1");
    assert_eq!(body["payload"]["status"], "end");
}

#[tokio::test]
async fn retries_until_receiver_recovers() {
    let (url, receiver) = spawn_receiver(2).await;
    let update = StatusUpdate::new("REQ-1", 22001, NotificationStatus::Start, "ODM Task started");

    fast_delivery(&url).deliver("request.status", &update).await.unwrap();

    assert_eq!(receiver.calls.load(Ordering::SeqCst), 3);
    assert_eq!(receiver.received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn gives_up_after_all_retries() {
    let (url, receiver) = spawn_receiver(usize::MAX).await;
    let update = StatusUpdate::new("REQ-1", 22001, NotificationStatus::Error, "Upload failed");

    let result = fast_delivery(&url).deliver("request.status", &update).await;

    assert_matches!(result, Err(WebhookError::HttpStatus(503)));
    assert_eq!(receiver.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn service_forwards_every_published_update() {
    let (url, receiver) = spawn_receiver(0).await;
    let bus = Arc::new(EventBus::default());
    let service = DeliveryService::new(Some(fast_delivery(&url)), "odm.status");
    let handle = tokio::spawn(service.run(bus.subscribe()));

    let notifier = Notifier::new(Arc::clone(&bus));
    notifier.send_task_start("REQ-1", 22002);
    notifier.send_task_update("REQ-1", 22002, "ODM Task status: queued");
    drop(notifier);
    drop(bus);

    assert_eq!(handle.await.unwrap(), 0);

    let event_types: Vec<_> = receiver
        .received
        .lock()
        .unwrap()
        .iter()
        .map(|(event_type, _)| event_type.clone())
        .collect();
    assert_eq!(event_types, vec!["odm.status.start", "odm.status.update"]);
}
