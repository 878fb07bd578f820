#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{ header, StatusCode };
use axum::response::Response;
use axum::Router;
use chatstream::llm::LlmConfig;

pub const ROUTE: &str = "/v1/chat/completions";

pub async fn spawn_upstream(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock upstream");
    let addr = listener.local_addr().expect("mock upstream addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}{}", addr, ROUTE)
}

pub fn test_config(base_url: String) -> LlmConfig {
    let mut config = LlmConfig::new("sk-test");
    config.base_url = base_url;
    config.model = "test/model".to_string();
    config.site_url = "https://your-site.com".to_string();
    config.site_name = "MyAIApp".to_string();
    config
}

pub fn delta(content: &str) -> String {
    serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": content } }] }).to_string()
}

/// Frames each payload as one `data:` event.
pub fn sse_body(payloads: &[String]) -> String {
    payloads
        .iter()
        .map(|p| format!("data: {}\n\n", p))
        .collect()
}

pub fn sse_response(body: impl Into<Body>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(body.into())
        .expect("build sse response")
}

/// Delivers `body` in fixed-size chunks so lines straddle chunk boundaries.
pub fn chunked_body(body: String, chunk_size: usize) -> Body {
    let chunks: Vec<Result<Vec<u8>, Infallible>> = body
        .into_bytes()
        .chunks(chunk_size)
        .map(|c| Ok(c.to_vec()))
        .collect();
    Body::from_stream(futures::stream::iter(chunks))
}

/// Flips its flag when the server drops the response body.
pub struct DropFlag(pub Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A body that emits one delta every few milliseconds and never terminates.
pub fn endless_body(released: Arc<AtomicBool>) -> Body {
    let stream = futures::stream::unfold((0u64, DropFlag(released)), |(n, flag)| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let frame = format!("data: {}\n\n", delta(&format!("t{} ", n)));
        Some((Ok::<_, Infallible>(frame), (n + 1, flag)))
    });
    Body::from_stream(stream)
}
