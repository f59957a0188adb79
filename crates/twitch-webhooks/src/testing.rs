//! Local HTTP fixtures for tests.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use url::Url;

use crate::api::HelixTransport;
use crate::auth::TokenCache;
use crate::config::ClientConfig;
use crate::webhooks::HubContext;

/// Serve `app` on an ephemeral localhost port and return its base URL.
pub(crate) async fn spawn_mock(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("mock listener addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });
    format!("http://{addr}")
}

/// Stand-in for the Helix hub endpoint that records every request body.
pub(crate) struct MockHub {
    pub base: String,
    requests: Arc<Mutex<Vec<serde_json::Value>>>,
    status: Arc<AtomicU16>,
}

#[derive(Clone)]
struct HubState {
    requests: Arc<Mutex<Vec<serde_json::Value>>>,
    status: Arc<AtomicU16>,
}

async fn hub_endpoint(
    State(state): State<HubState>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    state.requests.lock().unwrap().push(body);
    StatusCode::from_u16(state.status.load(Ordering::SeqCst)).unwrap()
}

impl MockHub {
    pub(crate) async fn start() -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let status = Arc::new(AtomicU16::new(StatusCode::ACCEPTED.as_u16()));
        let app = Router::new()
            .route("/helix/webhooks/hub", post(hub_endpoint))
            .with_state(HubState {
                requests: requests.clone(),
                status: status.clone(),
            });
        let base = format!("{}/helix", spawn_mock(app).await);
        Self {
            base,
            requests,
            status,
        }
    }

    pub(crate) fn set_status(&self, status: StatusCode) {
        self.status.store(status.as_u16(), Ordering::SeqCst);
    }

    pub(crate) fn requests(&self) -> Vec<serde_json::Value> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn config(&self) -> ClientConfig {
        ClientConfig {
            client_id: "test-client".into(),
            callback_url: "https://bot.example.com/twitch/webhook".into(),
            api_base: self.base.clone(),
            ..ClientConfig::default()
        }
    }

    pub(crate) fn hub_context(&self, lease: Duration, queue_capacity: usize) -> Arc<HubContext> {
        hub_context_for(&self.base, lease, queue_capacity)
    }
}

/// Hub context pointing at an arbitrary Helix base.
pub(crate) fn hub_context_for(base: &str, lease: Duration, queue_capacity: usize) -> Arc<HubContext> {
    let http = reqwest::Client::new();
    let tokens = TokenCache::new("test-client".into(), String::new(), String::new(), http.clone());
    Arc::new(HubContext {
        transport: HelixTransport::new(http, base, Arc::new(tokens)),
        callback_url: Url::parse("https://bot.example.com/twitch/webhook").unwrap(),
        secret: "s3cret".into(),
        lease,
        queue_capacity,
    })
}
