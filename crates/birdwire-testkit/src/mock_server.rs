//! Mock HTTP server for end-to-end tests.
//!
//! Thin wrapper around wiremock for the two endpoint shapes birdwire talks to:
//! form-encoded posts and long-lived streams.

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A recorded HTTP request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Query string
    pub query: Option<String>,
    /// Request body (if any)
    pub body: Option<String>,
    /// Request headers
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    /// First value of a header, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A mock API server.
pub struct MockApiServer {
    server: MockServer,
}

impl MockApiServer {
    /// Start a new mock server.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the base URL of the mock server.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    /// Answer form-encoded POSTs to `request_path` with `status` and `body`.
    pub async fn expect_form_post(&self, request_path: &str, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path(request_path))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Answer POSTs to `request_path` with a 200 whose body is `payload`.
    ///
    /// The server closes the connection after the payload, which a streaming
    /// client observes as the remote ending the stream.
    pub async fn expect_stream(&self, request_path: &str, payload: &str) {
        Mock::given(method("POST"))
            .and(path(request_path))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(payload)
                    .insert_header("content-type", "application/json"),
            )
            .mount(&self.server)
            .await;
    }

    /// Verify the number of received requests.
    ///
    /// # Panics
    ///
    /// Panics if the count doesn't match.
    pub async fn assert_request_count(&self, expected: usize) {
        let received = self.server.received_requests().await.unwrap_or_default();
        assert_eq!(
            received.len(),
            expected,
            "Expected {} requests but received {}",
            expected,
            received.len()
        );
    }

    /// Get all received requests.
    pub async fn received_requests(&self) -> Vec<RecordedRequest> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|req| RecordedRequest {
                method: req.method.to_string(),
                path: req.url.path().to_string(),
                query: req.url.query().map(String::from),
                body: String::from_utf8(req.body.clone()).ok(),
                headers: req
                    .headers
                    .iter()
                    .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
                    .collect(),
            })
            .collect()
    }
}
