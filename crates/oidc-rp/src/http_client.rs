//! HTTP transport boundary.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Sends one HTTP request and yields the complete response.
///
/// Implementations must not follow redirects; authorization servers answer
/// every endpoint this crate talks to directly.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait HttpClient {
    /// Error type returned by the HTTP client
    type Error: std::error::Error + Display + Send + Sync + 'static;

    /// Send an HTTP request and return the response.
    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>>;
}

#[cfg(feature = "reqwest-client")]
impl HttpClient for reqwest::Client {
    type Error = reqwest::Error;

    async fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
        let (parts, body) = request.into_parts();
        let resp = self
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?.to_vec();

        let mut response = http::Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl<T: HttpClient + Sync> HttpClient for Arc<T> {
    type Error = T::Error;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>> + Send
    {
        self.as_ref().send_http(request)
    }
}

#[cfg(target_arch = "wasm32")]
impl<T: HttpClient> HttpClient for Arc<T> {
    type Error = T::Error;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>> {
        self.as_ref().send_http(request)
    }
}

/// Send `request`, abandoning it as soon as `cancel` fires.
pub(crate) async fn send_cancellable<C: HttpClient>(
    client: &C,
    request: http::Request<Vec<u8>>,
    cancel: Option<&CancellationToken>,
) -> Result<http::Response<Vec<u8>>> {
    let result = match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::cancelled()),
                result = client.send_http(request) => result,
            }
        }
        None => client.send_http(request).await,
    };
    result.map_err(Error::transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mock::{MockClient, StalledClient};

    fn request() -> http::Request<Vec<u8>> {
        http::Request::get("https://as.example/jwks")
            .body(Vec::new())
            .unwrap()
    }

    #[tokio::test]
    async fn cancelling_abandons_an_in_flight_request() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });
        let err = send_cancellable(&StalledClient, request(), Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Cancelled));
        assert_eq!(err.category(), crate::error::ErrorCategory::Transport);
    }

    #[tokio::test]
    async fn cancelled_token_wins_over_a_ready_response() {
        let http = MockClient::default();
        http.push_json(200, serde_json::json!({})).await;
        let token = CancellationToken::new();
        token.cancel();
        let err = send_cancellable(&http, request(), Some(&token)).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Cancelled));
        assert_eq!(http.request_count().await, 0);

        let response = send_cancellable(&http, request(), None).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn transport_failures_are_wrapped() {
        let err = send_cancellable(&MockClient::default(), request(), None)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Transport));
    }
}
