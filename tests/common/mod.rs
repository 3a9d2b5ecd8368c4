#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use imgsearch::error::{Error, RemoteOp, Result};
use imgsearch::{BackendConfig, ImageRecord, SearchHit, VectorBackend};
use serde_json::{Value, json};

pub fn jpeg(len: usize) -> Vec<u8> {
    let mut data = vec![0x42u8; len];
    data[..3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
    data
}

pub fn png(len: usize) -> Vec<u8> {
    let mut data = vec![0x24u8; len];
    data[..8].copy_from_slice(b"\x89PNG\r\n\x1a\n");
    data
}

pub fn write(dir: &Path, name: &str, data: &[u8]) {
    std::fs::write(dir.join(name), data).unwrap();
}

pub fn hit(id: &str, similarity: f32, image: &[u8]) -> SearchHit {
    SearchHit {
        id: id.to_string(),
        encoded_image: STANDARD.encode(image),
        text: Some(format!("{}.jpg", id)),
        similarity,
    }
}

/// In-memory backend recording every call
#[derive(Default)]
pub struct MockBackend {
    /// Filenames in insert order
    pub inserted: Mutex<Vec<String>>,
    /// Filenames whose insert fails
    pub fail_insert: Vec<String>,
    /// Returned by every query
    pub hits: Vec<SearchHit>,
    pub queries: Mutex<Vec<(usize, Option<usize>)>>,
    pub deleted: Mutex<Vec<String>>,
    pub connects: AtomicUsize,
    pub fail_connect: bool,
}

impl VectorBackend for MockBackend {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(Error::remote(RemoteOp::Connect, "connection refused"));
        }
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, image: &ImageRecord) -> Result<String> {
        if self.fail_insert.iter().any(|f| f == image.filename()) {
            return Err(Error::remote(RemoteOp::Insert, "failed to get ID from created object"));
        }
        let mut inserted = self.inserted.lock().unwrap();
        inserted.push(image.filename().to_string());
        Ok(format!("id-{}", inserted.len()))
    }

    async fn query(
        &self,
        _image: &ImageRecord,
        limit: usize,
        offset: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push((limit, offset));
        Ok(self.hits.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(true)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.inserted.lock().unwrap().len() as u64)
    }
}

/// State of a fake Weaviate server
#[derive(Default)]
pub struct FakeWeaviate {
    pub classes: Mutex<Vec<Value>>,
    pub schema_creates: AtomicUsize,
    pub ready_checks: AtomicUsize,
    /// `(id, properties)` in insert order
    pub objects: Mutex<Vec<(String, Value)>>,
    pub queries: Mutex<Vec<String>>,
    /// Replaces the generated body of `Get` queries
    pub get_response: Mutex<Option<Value>>,
    /// Answer inserts without an id
    pub omit_ids: bool,
    /// Reject class creation as if another client created it first
    pub schema_conflict: bool,
}

type Shared = Arc<FakeWeaviate>;

async fn ready(State(state): State<Shared>) -> StatusCode {
    state.ready_checks.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn get_schema(State(state): State<Shared>) -> Json<Value> {
    Json(json!({ "classes": *state.classes.lock().unwrap() }))
}

async fn create_schema(State(state): State<Shared>, Json(class): Json<Value>) -> (StatusCode, Json<Value>) {
    if state.schema_conflict {
        let message = format!("class name {:?} already exists", class["class"].as_str().unwrap_or_default());
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": [{ "message": message }] })));
    }
    state.schema_creates.fetch_add(1, Ordering::SeqCst);
    state.classes.lock().unwrap().push(class.clone());
    (StatusCode::OK, Json(class))
}

async fn create_object(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut objects = state.objects.lock().unwrap();
    let id = format!("00000000-0000-0000-0000-{:012}", objects.len() + 1);
    objects.push((id.clone(), body["properties"].clone()));
    if state.omit_ids {
        Json(json!({ "class": body["class"] }))
    } else {
        Json(json!({ "id": id, "class": body["class"], "properties": body["properties"] }))
    }
}

async fn delete_object(
    State(state): State<Shared>,
    UrlPath((class, id)): UrlPath<(String, String)>,
) -> StatusCode {
    let mut objects = state.objects.lock().unwrap();
    match objects.iter().position(|(oid, _)| *oid == id) {
        Some(pos) if class == "Image" => {
            objects.remove(pos);
            StatusCode::NO_CONTENT
        }
        _ => StatusCode::NOT_FOUND,
    }
}

async fn graphql(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let query = body["query"].as_str().unwrap_or_default().to_string();
    state.queries.lock().unwrap().push(query.clone());

    if query.contains("Aggregate") {
        let count = state.objects.lock().unwrap().len();
        return Json(json!({ "data": { "Aggregate": { "Image": [{ "meta": { "count": count } }] } } }));
    }
    if let Some(response) = state.get_response.lock().unwrap().clone() {
        return Json(response);
    }
    let objects = state
        .objects
        .lock()
        .unwrap()
        .iter()
        .enumerate()
        .map(|(i, (id, props))| {
            let certainty = 1.0 - 0.1 * i as f64;
            json!({
                "image": props["image"],
                "text": props["text"],
                "_additional": { "id": id, "certainty": certainty, "distance": 2.0 * (1.0 - certainty) },
            })
        })
        .collect::<Vec<_>>();
    Json(json!({ "data": { "Get": { "Image": objects } } }))
}

/// Serve a fake Weaviate on a random local port
pub async fn spawn_fake_weaviate(state: Shared) -> SocketAddr {
    let app = Router::new()
        .route("/v1/.well-known/ready", get(ready))
        .route("/v1/schema", get(get_schema).post(create_schema))
        .route("/v1/objects", post(create_object))
        .route("/v1/objects/{class}/{id}", delete(delete_object))
        .route("/v1/graphql", post(graphql))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn config_for(addr: SocketAddr) -> BackendConfig {
    BackendConfig { host: addr.ip().to_string(), port: addr.port(), ..Default::default() }
}
