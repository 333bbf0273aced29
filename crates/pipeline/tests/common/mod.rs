//! In-process fake NodeODM node and data lake shared by the pipeline
//! integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use odm_ckan::{CkanConfig, CkanUploader, DatasetConfig, OAuthConfig};
use odm_events::{EventBus, Notifier, StatusUpdate};
use odm_nodeodm::retry::RetryConfig;
use odm_nodeodm::{NodeOdmApi, NodeOdmConfig, Quality};
use odm_pipeline::{Processor, ProcessingService};
use tokio_util::sync::CancellationToken;

pub const TOKEN: &str = "node-token";
pub const REQUEST_ID: &str = "REQ-1";

// ---------------------------------------------------------------------------
// Fake node
// ---------------------------------------------------------------------------

/// How tasks created on the fake node behave.
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    /// Tasks whose name ends with this suffix fail.
    pub fail_suffix: Option<String>,
    /// Created tasks stay running forever.
    pub never_finish: bool,
    /// Archives contain no orthophoto.
    pub empty_results: bool,
    /// Status requests for created tasks always answer 503.
    pub status_unavailable: bool,
    /// Time the node takes to answer a task creation.
    pub create_delay: Option<Duration>,
}

#[derive(Debug)]
pub struct FakeTask {
    pub name: String,
    pub images: Vec<String>,
    /// Status codes reported by successive polls; the last one sticks.
    script: Vec<u16>,
    step: usize,
}

impl FakeTask {
    pub fn code(&self) -> u16 {
        self.script[self.step]
    }
}

#[derive(Default)]
pub struct Node {
    pub behaviour: Behaviour,
    pub tasks: HashMap<String, FakeTask>,
    pub created: usize,
    pub cancelled: Vec<String>,
    pub removed: Vec<String>,
    /// Remaining 503 answers to `task/{uuid}/info`, per uuid.
    pub info_failures: HashMap<String, usize>,
    /// `task/{uuid}/info` requests received, per uuid.
    pub info_calls: HashMap<String, usize>,
}

impl Node {
    /// Place a task on the node as if submitted earlier.
    pub fn insert(&mut self, uuid: &str, name: &str, code: u16) {
        self.tasks.insert(
            uuid.to_string(),
            FakeTask {
                name: name.to_string(),
                images: Vec::new(),
                script: vec![code],
                step: 0,
            },
        );
    }
}

pub type SharedNode = Arc<Mutex<Node>>;

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[derive(Deserialize)]
struct UuidForm {
    uuid: String,
}

async fn info(Query(q): Query<TokenQuery>) -> impl IntoResponse {
    if q.token.as_deref() != Some(TOKEN) {
        return Json(json!({"error": "Invalid authentication token"}));
    }
    Json(json!({"version": "2.2.1", "taskQueueCount": 0, "engine": "odm", "engineVersion": "3.5.0"}))
}

async fn task_list(State(node): State<SharedNode>) -> impl IntoResponse {
    let node = node.lock().unwrap();
    let list: Vec<_> = node.tasks.keys().map(|uuid| json!({"uuid": uuid})).collect();
    Json(json!(list))
}

async fn task_info(State(node): State<SharedNode>, UrlPath(uuid): UrlPath<String>) -> Response {
    let mut node = node.lock().unwrap();
    *node.info_calls.entry(uuid.clone()).or_default() += 1;
    if let Some(remaining) = node.info_failures.get_mut(&uuid).filter(|n| **n > 0) {
        *remaining -= 1;
        return (StatusCode::SERVICE_UNAVAILABLE, "node busy").into_response();
    }
    let Some(task) = node.tasks.get_mut(&uuid) else {
        return Json(json!({"error": format!("{uuid} not found")})).into_response();
    };
    let code = task.code();
    let progress = if code == 40 { 100.0 } else { 50.0 };
    let body = json!({
        "uuid": uuid,
        "name": task.name,
        "dateCreated": 1719820800000i64,
        "processingTime": 1000,
        "status": {"code": code},
        "imagesCount": task.images.len(),
        "progress": progress
    });
    task.step = (task.step + 1).min(task.script.len() - 1);
    Json(body).into_response()
}

async fn task_new(State(node): State<SharedNode>, mut multipart: Multipart) -> impl IntoResponse {
    let mut name = String::new();
    let mut images = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        match field.name().unwrap_or_default() {
            "name" => name = field.text().await.unwrap(),
            "images" => {
                images.push(field.file_name().unwrap_or_default().to_string());
                let _ = field.bytes().await.unwrap();
            }
            _ => {}
        }
    }

    let delay = node.lock().unwrap().behaviour.create_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut node = node.lock().unwrap();
    node.created += 1;
    let script = if node
        .behaviour
        .fail_suffix
        .as_deref()
        .is_some_and(|suffix| name.ends_with(suffix))
    {
        vec![20, 30]
    } else if node.behaviour.never_finish {
        vec![20]
    } else {
        vec![10, 20, 40]
    };
    let uuid = format!("uuid-{}", node.created);
    if node.behaviour.status_unavailable {
        node.info_failures.insert(uuid.clone(), usize::MAX);
    }
    node.tasks.insert(
        uuid.clone(),
        FakeTask {
            name,
            images,
            script,
            step: 0,
        },
    );
    Json(json!({"uuid": uuid}))
}

async fn task_cancel(State(node): State<SharedNode>, Form(form): Form<UuidForm>) -> impl IntoResponse {
    let mut node = node.lock().unwrap();
    let Some(task) = node.tasks.get_mut(&form.uuid) else {
        return Json(json!({"error": "not found"}));
    };
    task.script = vec![50];
    task.step = 0;
    node.cancelled.push(form.uuid);
    Json(json!({"success": true}))
}

async fn task_remove(State(node): State<SharedNode>, Form(form): Form<UuidForm>) -> impl IntoResponse {
    let mut node = node.lock().unwrap();
    let removed = node.tasks.remove(&form.uuid).is_some();
    if removed {
        node.removed.push(form.uuid);
    }
    Json(json!({"success": removed}))
}

async fn download(State(node): State<SharedNode>) -> impl IntoResponse {
    let empty = node.lock().unwrap().behaviour.empty_results;
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default();
        if empty {
            writer.start_file("log.json", options).unwrap();
            writer.write_all(b"{}").unwrap();
        } else {
            writer.start_file("odm_orthophoto/odm_orthophoto.tif", options).unwrap();
            writer.write_all(b"ortho").unwrap();
            writer.start_file("odm_report/report.pdf", options).unwrap();
            writer.write_all(b"report").unwrap();
        }
        writer.finish().unwrap();
    }
    (StatusCode::OK, buffer.into_inner())
}

/// Start a fake node; returns its config and shared state.
pub async fn spawn_node(behaviour: Behaviour) -> (NodeOdmConfig, SharedNode) {
    let node = Arc::new(Mutex::new(Node {
        behaviour,
        ..Default::default()
    }));
    let app = Router::new()
        .route("/info", get(info))
        .route("/task/list", get(task_list))
        .route("/task/new", post(task_new))
        .route("/task/cancel", post(task_cancel))
        .route("/task/remove", post(task_remove))
        .route("/task/{uuid}/info", get(task_info))
        .route("/task/{uuid}/download/all.zip", get(download))
        .with_state(Arc::clone(&node));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (node_config(addr.port()), node)
}

pub fn node_config(port: u16) -> NodeOdmConfig {
    NodeOdmConfig {
        host: "127.0.0.1".into(),
        port,
        token: TOKEN.into(),
        quality: Quality::Low,
        max_concurrent_tasks: 2,
        poll_interval: 0,
        poll_retries: 2,
        cancel_on_shutdown: false,
    }
}

// ---------------------------------------------------------------------------
// Fake data lake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Lake {
    pub packages: Vec<Value>,
    /// (package id, datatype_resource, uploaded file name)
    pub resources: Vec<(String, String, String)>,
}

pub type SharedLake = Arc<Mutex<Lake>>;

async fn token() -> impl IntoResponse {
    Json(json!({"access_token": "lake-token", "expires_in": 300}))
}

async fn package_search(State(lake): State<SharedLake>) -> impl IntoResponse {
    let lake = lake.lock().unwrap();
    let results: Vec<_> = (0..lake.packages.len())
        .map(|i| json!({"id": format!("pkg-{}", i + 1)}))
        .collect();
    Json(json!({"success": true, "result": {"count": results.len(), "results": results}}))
}

async fn package_create(State(lake): State<SharedLake>, Json(body): Json<Value>) -> impl IntoResponse {
    let mut lake = lake.lock().unwrap();
    lake.packages.push(body);
    let id = format!("pkg-{}", lake.packages.len());
    Json(json!({"success": true, "result": {"id": id}}))
}

async fn resource_create(State(lake): State<SharedLake>, mut multipart: Multipart) -> impl IntoResponse {
    let mut fields = HashMap::new();
    let mut file_name = String::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if name == "upload" {
            file_name = field.file_name().unwrap_or_default().to_string();
            let _ = field.bytes().await.unwrap();
        } else {
            fields.insert(name, field.text().await.unwrap());
        }
    }
    let package_id = fields.remove("package_id").unwrap_or_default();
    let datatype = fields.remove("datatype_resource").unwrap_or_default();
    let url = format!("https://lake.local/{package_id}/{datatype}/{file_name}");
    lake.lock()
        .unwrap()
        .resources
        .push((package_id, datatype, file_name));
    Json(json!({"success": true, "result": {"url": url}}))
}

pub async fn spawn_lake() -> (CkanConfig, SharedLake) {
    let lake: SharedLake = Arc::default();
    let app = Router::new()
        .route("/token", post(token))
        .route("/api/action/package_search", get(package_search))
        .route("/api/action/package_create", post(package_create))
        .route("/api/action/resource_create", post(resource_create))
        .with_state(Arc::clone(&lake));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = CkanConfig {
        url: format!("http://{addr}"),
        app_project: "drones".into(),
        organization_email: "ops@example.org".into(),
        organization_name: "Ops".into(),
        owner_org: "engineering".into(),
        auth: OAuthConfig {
            url: format!("http://{addr}/token"),
            username: "bot".into(),
            password: "pw".into(),
            client_id: "ckan".into(),
            client_secret: "secret".into(),
            grant_type: "password".into(),
            scope: "openid".into(),
        },
        data: DatasetConfig::default(),
    };
    (config, lake)
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Everything a test needs to drive one processor.
pub struct Harness {
    pub service: ProcessingService,
    pub notifier: Notifier,
    pub cancel: CancellationToken,
}

pub fn harness(node: NodeOdmConfig, ckan: CkanConfig) -> Harness {
    let notifier = Notifier::new(Arc::new(EventBus::default()));
    let cancel = CancellationToken::new();
    let processor = Processor::new(
        NodeOdmApi::from_config(&node),
        node,
        notifier.clone(),
        Arc::new(CkanUploader::new(ckan)),
        cancel.clone(),
    )
    .with_retry(RetryConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_attempts: 2,
        ..Default::default()
    });
    Harness {
        service: ProcessingService::new(processor),
        notifier,
        cancel,
    }
}

/// Drain every update published so far.
pub fn drain(receiver: &mut tokio::sync::broadcast::Receiver<StatusUpdate>) -> Vec<StatusUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = receiver.try_recv() {
        updates.push(update);
    }
    updates
}

/// A request directory with two images per requested datatype.
pub fn request_dir(root: &Path, datatype_ids: &[i32]) {
    let request = json!({
        "requestId": REQUEST_ID,
        "situationId": "SIT-9",
        "datatypeIds": datatype_ids,
        "start": "2024-07-01T08:00:00Z",
        "end": "2024-07-01T10:00:00Z",
        "feature": {
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[7.0, 45.0], [8.0, 45.0], [8.0, 46.0], [7.0, 45.0]]]
            }
        }
    });
    std::fs::write(root.join("request.json"), request.to_string()).unwrap();

    for id in datatype_ids {
        let dir = root.join(if *id == 22001 { "thermal" } else { "rgb" });
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["IMG_0001.jpg", "IMG_0002.jpg"] {
            std::fs::write(dir.join(name), b"jpeg").unwrap();
        }
    }
}
