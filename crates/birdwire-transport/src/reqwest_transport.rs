//! `reqwest`-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Method, RequestBuilder};
use tracing::{debug, instrument};

use crate::{
    HttpRequest, HttpResponse, STREAM_CONNECT_TIMEOUT, StreamingResponse, Transport,
    TransportError, TransportResult,
};

/// Production transport over `reqwest`.
///
/// Single calls use a client with an overall timeout; streaming calls use a
/// second client that only bounds the connect phase.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    streaming_client: Client,
}

impl ReqwestTransport {
    /// Create a transport whose single calls time out after `timeout`.
    ///
    /// # Errors
    /// Returns an error if the HTTP clients fail to build.
    pub fn new(timeout: Duration) -> TransportResult<Self> {
        let user_agent = format!("birdwire/{}", env!("CARGO_PKG_VERSION"));

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(&user_agent)
            .build()?;

        let streaming_client = Client::builder()
            .connect_timeout(STREAM_CONNECT_TIMEOUT)
            .user_agent(&user_agent)
            .build()?;

        Ok(Self {
            client,
            streaming_client,
        })
    }

    fn build(client: &Client, request: HttpRequest) -> TransportResult<RequestBuilder> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {e}", request.method)))?;

        let mut builder = client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        Ok(builder)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    async fn perform_request(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        let response = Self::build(&self.client, request)?.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        debug!(status, bytes = body.len(), "Request completed");
        Ok(HttpResponse { status, body })
    }

    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    async fn perform_streaming_request(
        &self,
        request: HttpRequest,
    ) -> TransportResult<StreamingResponse> {
        let response = Self::build(&self.streaming_client, request)?.send().await?;
        let status = response.status().as_u16();
        debug!(status, "Stream response head received");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();

        Ok(StreamingResponse { status, body })
    }
}
