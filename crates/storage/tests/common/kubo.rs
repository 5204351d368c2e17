//! A minimal stand-in for the Kubo HTTP RPC API.

use axum::Router;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use super::fixtures::sha256_hash;

#[derive(Default)]
struct KuboState {
    blocks: Mutex<HashMap<String, Bytes>>,
    add_queries: Mutex<Vec<HashMap<String, String>>>,
}

/// Running mock node; the server task stops when the test runtime ends.
#[allow(dead_code)]
pub struct MockKubo {
    pub addr: SocketAddr,
    state: Arc<KuboState>,
}

#[allow(dead_code)]
impl MockKubo {
    pub async fn start() -> Self {
        let state = Arc::new(KuboState::default());
        let app = Router::new()
            .route("/api/v0/add", post(add))
            .route("/api/v0/cat", post(cat))
            .route("/api/v0/version", post(version))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn block_count(&self) -> usize {
        self.state.blocks.lock().unwrap().len()
    }

    /// Query parameters of every `add` call received so far.
    pub fn add_queries(&self) -> Vec<HashMap<String, String>> {
        self.state.add_queries.lock().unwrap().clone()
    }
}

fn kubo_error(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({ "Message": message, "Code": 0, "Type": "error" });
    (status, axum::Json(body)).into_response()
}

async fn add(
    State(state): State<Arc<KuboState>>,
    Query(query): Query<HashMap<String, String>>,
    mut multipart: Multipart,
) -> Response {
    state.add_queries.lock().unwrap().push(query);

    let mut data = Vec::new();
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => match field.bytes().await {
                Ok(bytes) => data.extend_from_slice(&bytes),
                Err(e) => return kubo_error(StatusCode::BAD_REQUEST, &e.to_string()),
            },
            Ok(None) => break,
            Err(e) => return kubo_error(StatusCode::BAD_REQUEST, &e.to_string()),
        }
    }

    // A sha256 hex digest stands in for the CID.
    let hash = sha256_hash(&data);
    let size = data.len();
    state
        .blocks
        .lock()
        .unwrap()
        .insert(hash.clone(), Bytes::from(data));

    let line = serde_json::json!({ "Name": "file", "Hash": hash, "Size": size.to_string() });
    (StatusCode::OK, format!("{line}\n")).into_response()
}

#[derive(Deserialize)]
struct CatQuery {
    arg: String,
    #[serde(default)]
    offset: u64,
    length: Option<u64>,
}

async fn cat(State(state): State<Arc<KuboState>>, Query(query): Query<CatQuery>) -> Response {
    let Some(data) = state.blocks.lock().unwrap().get(&query.arg).cloned() else {
        return kubo_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "block was not found locally (offline): ipld: could not find node",
        );
    };

    let len = data.len() as u64;
    let start = query.offset.min(len);
    let end = match query.length {
        Some(length) => start.saturating_add(length).min(len),
        None => len,
    };
    (StatusCode::OK, data.slice(start as usize..end as usize)).into_response()
}

async fn version() -> Response {
    axum::Json(serde_json::json!({ "Version": "0.29.0", "Commit": "", "Repo": "15" }))
        .into_response()
}
