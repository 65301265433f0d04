//! Signed webhook POSTs.
//!
//! [`WebhookSender`] makes exactly one attempt per call. Retries are the
//! delivery worker's business and live in the queue, not in a sleep loop.

use std::time::Duration;

use herald_core::signing::{
    signature_header_value, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER,
};
use herald_core::types::DbId;
use reqwest::header::CONTENT_TYPE;

/// Default timeout for a single delivery attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for a failed delivery attempt. Every variant is retryable.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The request could not be sent or the connection broke.
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    /// No response within the configured timeout.
    #[error("Webhook timed out")]
    Timeout,

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

impl From<reqwest::Error> for WebhookError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err)
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Everything needed to POST one queue entry.
#[derive(Debug, Clone, Copy)]
pub struct OutboundRequest<'a> {
    pub url: &'a str,
    pub secret: &'a str,
    pub event_type: &'a str,
    pub delivery_id: DbId,
    /// Exact bytes sent and signed.
    pub body: &'a [u8],
}

// ---------------------------------------------------------------------------
// WebhookSender
// ---------------------------------------------------------------------------

/// Delivers signed JSON bodies to tenant webhook endpoints.
#[derive(Clone)]
pub struct WebhookSender {
    client: reqwest::Client,
}

impl WebhookSender {
    /// Build a sender whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(WebhookError::Request)?;
        Ok(Self { client })
    }

    /// POST `request.body` once, signed with the webhook secret.
    ///
    /// Returns the response status on 2xx.
    pub async fn send(&self, request: &OutboundRequest<'_>) -> Result<u16, WebhookError> {
        let response = self
            .client
            .post(request.url)
            .header(CONTENT_TYPE, "application/json")
            .header(
                SIGNATURE_HEADER,
                signature_header_value(request.secret, request.body),
            )
            .header(EVENT_HEADER, request.event_type)
            .header(DELIVERY_HEADER, request.delivery_id.to_string())
            .body(request.body.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::HttpStatus(status.as_u16()));
        }
        Ok(status.as_u16())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use assert_matches::assert_matches;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use herald_core::signing::verify_signature;

    use super::*;

    #[derive(Clone)]
    struct Receiver {
        status: StatusCode,
        delay: Duration,
        seen: Arc<Mutex<Vec<(HeaderMap, Bytes)>>>,
    }

    async fn capture(
        State(receiver): State<Receiver>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        tokio::time::sleep(receiver.delay).await;
        receiver.seen.lock().unwrap().push((headers, body));
        receiver.status
    }

    /// Start a receiver on an ephemeral port and return its URL.
    async fn spawn_receiver(status: StatusCode, delay: Duration) -> (String, Receiver) {
        let receiver = Receiver {
            status,
            delay,
            seen: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/hook", post(capture))
            .with_state(receiver.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), receiver)
    }

    fn request<'a>(url: &'a str, body: &'a [u8]) -> OutboundRequest<'a> {
        OutboundRequest {
            url,
            secret: "whsec_test",
            event_type: "alert.triggered",
            delivery_id: 77,
            body,
        }
    }

    #[tokio::test]
    async fn success_sends_signed_body_and_headers() {
        let (url, receiver) = spawn_receiver(StatusCode::OK, Duration::ZERO).await;
        let sender = WebhookSender::new(DEFAULT_REQUEST_TIMEOUT).unwrap();
        let body = br#"{"type":"alert.triggered","tenant_id":1}"#;

        let status = sender.send(&request(&url, body)).await.unwrap();
        assert_eq!(status, 200);

        let seen = receiver.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (headers, received) = &seen[0];
        assert_eq!(&received[..], &body[..]);
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["x-herald-event"], "alert.triggered");
        assert_eq!(headers["x-herald-delivery"], "77");
        let signature = headers["x-herald-signature"].to_str().unwrap();
        assert!(verify_signature("whsec_test", received, signature));
    }

    #[tokio::test]
    async fn non_2xx_is_http_status_error() {
        let (url, _receiver) =
            spawn_receiver(StatusCode::SERVICE_UNAVAILABLE, Duration::ZERO).await;
        let sender = WebhookSender::new(DEFAULT_REQUEST_TIMEOUT).unwrap();

        let err = sender.send(&request(&url, b"{}")).await.unwrap_err();
        assert_matches!(err, WebhookError::HttpStatus(503));
    }

    #[tokio::test]
    async fn slow_receiver_times_out() {
        let (url, _receiver) = spawn_receiver(StatusCode::OK, Duration::from_secs(5)).await;
        let sender = WebhookSender::new(Duration::from_millis(200)).unwrap();

        let err = sender.send(&request(&url, b"{}")).await.unwrap_err();
        assert_matches!(err, WebhookError::Timeout);
    }

    #[tokio::test]
    async fn refused_connection_is_request_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = format!("http://{addr}/hook");
        let sender = WebhookSender::new(DEFAULT_REQUEST_TIMEOUT).unwrap();

        let err = sender.send(&request(&url, b"{}")).await.unwrap_err();
        assert_matches!(err, WebhookError::Request(_));
    }

    #[test]
    fn webhook_error_display_http_status() {
        let err = WebhookError::HttpStatus(502);
        assert_eq!(err.to_string(), "Webhook returned HTTP 502");
    }
}
