//! In-process mock of the video backend for async tests.
//!
//! Video ids select the payload behaviour:
//! - `1`: 1000 bytes with a content-length, `video/mp4`
//! - `2`: three 100 byte chunks, no content-length, `video/webm`
//! - `3`: two chunks then a transport error
//! - `4`: one chunk then the body never ends
//! - `5`: announces `HUGE_LEN` bytes, sends one chunk, then stalls
//! - `6`: `STEPPED_LEN` bytes with a content-length, in three paced chunks
//! - `404`: transfer URL resolves but the payload is missing
//! - `422`: `/api/download-url` answers with something that is not a URL
//! - `500`: `/api/download-url` fails

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{StreamExt, stream};
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::config::{BufferMode, Settings};

pub(crate) const FIXED_LEN: usize = 1000;
pub(crate) const CHUNK_LEN: usize = 100;
pub(crate) const STEPPED_LEN: usize = 3 * CHUNK_LEN;
pub(crate) const HUGE_LEN: u64 = 1 << 62;

struct MockState {
    base_url: String,
    last_authorization: Mutex<Option<String>>,
}

pub(crate) struct MockBackend {
    state: Arc<MockState>,
    download_dir: TempDir,
}

impl MockBackend {
    pub(crate) async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState {
            base_url: format!("http://{addr}"),
            last_authorization: Mutex::new(None),
        });

        let app = Router::new()
            .route("/api/get-video-by-id/{id}", get(video_details))
            .route("/api/download-url/{id}", get(download_url))
            .route("/media/{id}", get(media))
            .with_state(state.clone());

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            state,
            download_dir: tempfile::tempdir().unwrap(),
        }
    }

    pub(crate) fn settings(&self) -> Settings {
        Settings {
            api_base_url: self.state.base_url.clone(),
            api_token: None,
            download_dir: self.download_dir.path().to_path_buf(),
            buffering: BufferMode::Disk,
        }
    }

    pub(crate) fn download_dir(&self) -> &std::path::Path {
        self.download_dir.path()
    }

    pub(crate) fn last_authorization(&self) -> Option<String> {
        self.state.last_authorization.lock().clone()
    }
}

/// Deterministic payload so saved files can be compared byte for byte.
pub(crate) fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn video_details(Path(id): Path<u64>) -> Json<serde_json::Value> {
    let title = match id {
        1 => "Fixed length video".to_string(),
        2 => "Chunked video".to_string(),
        other => format!("Video {other}"),
    };
    Json(serde_json::json!({
        "tile": title,
        "videoThumbnail": format!("https://img.example/{id}.jpg"),
        "videoChannelName": "Mock Channel",
        "duration": "3:14",
        "channelId": 99,
    }))
}

async fn download_url(
    State(state): State<Arc<MockState>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Response {
    *state.last_authorization.lock() = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    match id {
        500 => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        422 => "this is not a url".into_response(),
        _ => Json(format!("{}/media/{id}", state.base_url)).into_response(),
    }
}

async fn media(Path(id): Path<u64>) -> Response {
    let chunk = || Ok::<_, io::Error>(Bytes::from(payload(CHUNK_LEN)));
    match id {
        1 => ([(header::CONTENT_TYPE, "video/mp4")], payload(FIXED_LEN)).into_response(),
        2 => {
            let body = Body::from_stream(stream::iter(vec![chunk(), chunk(), chunk()]));
            ([(header::CONTENT_TYPE, "video/webm")], body).into_response()
        }
        3 => {
            // The pause lets hyper flush the head and first chunks before the
            // body errors and the connection is torn down.
            let failure = stream::once(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(io::Error::other("connection reset"))
            });
            let body = Body::from_stream(stream::iter(vec![chunk(), chunk()]).chain(failure));
            ([(header::CONTENT_TYPE, "video/mp4")], body).into_response()
        }
        4 => {
            let body = Body::from_stream(
                stream::iter(vec![chunk()]).chain(stream::pending::<Result<Bytes, io::Error>>()),
            );
            ([(header::CONTENT_TYPE, "video/mp4")], body).into_response()
        }
        5 => {
            let body = Body::from_stream(
                stream::iter(vec![chunk()]).chain(stream::pending::<Result<Bytes, io::Error>>()),
            );
            let headers = [
                (header::CONTENT_TYPE, "video/mp4".to_string()),
                (header::CONTENT_LENGTH, HUGE_LEN.to_string()),
            ];
            (headers, body).into_response()
        }
        6 => {
            let body = Body::from_stream(stream::iter(0..3).then(move |step| async move {
                if step > 0 {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                chunk()
            }));
            let headers = [
                (header::CONTENT_TYPE, "video/mp4".to_string()),
                (header::CONTENT_LENGTH, STEPPED_LEN.to_string()),
            ];
            (headers, body).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
