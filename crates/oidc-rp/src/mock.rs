use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::http_client::HttpClient;

/// Replays queued responses in order and records every request it was sent.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockClient {
    responses: Arc<Mutex<VecDeque<http::Response<Vec<u8>>>>>,
    requests: Arc<Mutex<Vec<http::Request<Vec<u8>>>>>,
}

#[derive(Debug, thiserror::Error)]
#[error("mock client has no queued response")]
pub(crate) struct Exhausted;

impl MockClient {
    pub(crate) async fn push(&self, response: http::Response<Vec<u8>>) {
        self.responses.lock().await.push_back(response);
    }

    pub(crate) async fn push_json(&self, status: u16, body: Value) {
        self.push(json_response(status, body)).await;
    }

    pub(crate) async fn requests(&self) -> Vec<http::Request<Vec<u8>>> {
        self.requests.lock().await.drain(..).collect()
    }

    pub(crate) async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

impl HttpClient for MockClient {
    type Error = Exhausted;

    async fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
        self.requests.lock().await.push(request);
        self.responses.lock().await.pop_front().ok_or(Exhausted)
    }
}

pub(crate) fn json_response(status: u16, body: Value) -> http::Response<Vec<u8>> {
    http::Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(serde_json::to_vec(&body).unwrap())
        .unwrap()
}

/// Never answers; for exercising cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StalledClient;

impl HttpClient for StalledClient {
    type Error = Exhausted;

    async fn send_http(
        &self,
        _request: http::Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
        std::future::pending().await
    }
}
