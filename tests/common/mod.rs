#![allow(dead_code)]

use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use url::Url;
use warp::http::StatusCode;
use warp::Filter;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub content_type: Option<String>,
    pub body: Value,
}

impl RecordedRequest {
    pub fn image_data(&self) -> &str {
        self.body["imageData"].as_str().unwrap_or_default()
    }
}

#[derive(Default)]
struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
    status: AtomicU16,
    delay_ms: AtomicU64,
}

/// Upload endpoint on an ephemeral localhost port. Records every JSON POST
/// and answers with a configurable status after a configurable delay.
pub struct MockUploadServer {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockUploadServer {
    pub fn start() -> Self {
        let state = Arc::new(MockState {
            status: AtomicU16::new(200),
            ..MockState::default()
        });

        let with_state = {
            let state = Arc::clone(&state);
            warp::any().map(move || Arc::clone(&state))
        };

        let routes = warp::post()
            .and(warp::path::full())
            .and(warp::header::optional::<String>("content-type"))
            .and(warp::body::json::<Value>())
            .and(with_state)
            .and_then(handle_upload);

        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://{}/{}", self.addr, path.trim_start_matches('/')))
            .unwrap()
    }

    pub fn respond_with(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    pub fn delay_responses(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn handle_upload(
    path: warp::path::FullPath,
    content_type: Option<String>,
    body: Value,
    state: Arc<MockState>,
) -> Result<impl warp::Reply, Infallible> {
    state.requests.lock().unwrap().push(RecordedRequest {
        path: path.as_str().to_string(),
        content_type,
        body,
    });

    let delay = state.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        sleep(Duration::from_millis(delay)).await;
    }

    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = if status.is_success() {
        r#"{"success":true}"#.to_string()
    } else {
        r#"{"error":"rejected"}"#.to_string()
    };

    Ok(warp::reply::with_status(body, status))
}

/// Poll `condition` every 20ms, panicking after 5s.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}
