//! Scripted in-memory transport.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use birdwire_transport::{
    HttpRequest, HttpResponse, StreamingResponse, Transport, TransportError, TransportResult,
};
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// One scripted step of a streaming body.
#[derive(Debug)]
pub enum StreamStep {
    /// Yield a chunk.
    Chunk(Bytes),
    /// Hold the stream until the sender fires or is dropped.
    WaitFor(oneshot::Receiver<()>),
    /// Yield a transport error.
    Fail(String),
}

/// What happens once every step has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The remote closes the connection.
    Close,
    /// The connection stays open without data.
    Hang,
}

/// A scripted streaming response.
#[derive(Debug)]
pub struct ScriptedStream {
    status: u16,
    steps: Vec<StreamStep>,
    end: StreamEnd,
}

impl ScriptedStream {
    /// A stream answering with `status`.
    #[must_use]
    pub const fn with_status(status: u16) -> Self {
        Self {
            status,
            steps: Vec::new(),
            end: StreamEnd::Hang,
        }
    }

    /// A stream answering 200.
    #[must_use]
    pub const fn ok() -> Self {
        Self::with_status(200)
    }

    /// Append a chunk.
    #[must_use]
    pub fn chunk(mut self, data: impl Into<Bytes>) -> Self {
        self.steps.push(StreamStep::Chunk(data.into()));
        self
    }

    /// Block until `gate` fires.
    #[must_use]
    pub fn wait_for(mut self, gate: oneshot::Receiver<()>) -> Self {
        self.steps.push(StreamStep::WaitFor(gate));
        self
    }

    /// Append a transport failure.
    #[must_use]
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push(StreamStep::Fail(message.into()));
        self
    }

    /// Close the connection after the scripted steps.
    #[must_use]
    pub const fn close(mut self) -> Self {
        self.end = StreamEnd::Close;
        self
    }

    /// Keep the connection open after the scripted steps.
    #[must_use]
    pub const fn hang(mut self) -> Self {
        self.end = StreamEnd::Hang;
        self
    }

    fn into_response(self) -> StreamingResponse {
        let body = stream::unfold(
            (self.steps.into_iter(), self.end),
            |(mut steps, end)| async move {
                loop {
                    match steps.next() {
                        Some(StreamStep::Chunk(data)) => return Some((Ok(data), (steps, end))),
                        Some(StreamStep::Fail(message)) => {
                            return Some((Err(TransportError::Connection(message)), (steps, end)));
                        }
                        Some(StreamStep::WaitFor(gate)) => {
                            let _ = gate.await;
                        }
                        None if end == StreamEnd::Close => return None,
                        None => futures_util::future::pending::<()>().await,
                    }
                }
            },
        )
        .boxed();

        StreamingResponse {
            status: self.status,
            body,
        }
    }
}

#[derive(Debug)]
enum Reply {
    Response(HttpResponse),
    Failure(String),
}

#[derive(Debug)]
enum StreamReply {
    Stream(ScriptedStream),
    Failure(String),
}

/// A transport that replays scripted replies in order and records every request.
///
/// Unscripted calls fail with [`TransportError::Connection`].
#[derive(Debug, Default, Clone)]
pub struct ScriptedTransport {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    streams: Arc<Mutex<VecDeque<StreamReply>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedTransport {
    /// Create a transport with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a buffered response.
    pub fn push_response(&self, status: u16, body: impl Into<Bytes>) {
        self.replies.lock().push_back(Reply::Response(HttpResponse {
            status,
            body: body.into(),
        }));
    }

    /// Script a transport failure for the next buffered call.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.replies.lock().push_back(Reply::Failure(message.into()));
    }

    /// Script a streaming response.
    pub fn push_stream(&self, stream: ScriptedStream) {
        self.streams.lock().push_back(StreamReply::Stream(stream));
    }

    /// Script a connect failure for the next streaming call.
    pub fn push_stream_failure(&self, message: impl Into<String>) {
        self.streams
            .lock()
            .push_back(StreamReply::Failure(message.into()));
    }

    /// Every request seen so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests seen so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform_request(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        self.requests.lock().push(request);

        match self.replies.lock().pop_front() {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Failure(message)) => Err(TransportError::Connection(message)),
            None => Err(TransportError::Connection("no scripted response".into())),
        }
    }

    async fn perform_streaming_request(
        &self,
        request: HttpRequest,
    ) -> TransportResult<StreamingResponse> {
        self.requests.lock().push(request);

        let reply = self.streams.lock().pop_front();
        match reply {
            Some(StreamReply::Stream(stream)) => Ok(stream.into_response()),
            Some(StreamReply::Failure(message)) => Err(TransportError::Connection(message)),
            None => Err(TransportError::Connection("no scripted stream".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_are_replayed_in_order() {
        let transport = ScriptedTransport::new();
        transport.push_response(401, "denied");
        transport.push_failure("reset by peer");

        let first = transport
            .perform_request(HttpRequest::new("POST", "https://example.com/a"))
            .await
            .unwrap();
        assert_eq!(first.status, 401);

        let second = transport
            .perform_request(HttpRequest::new("POST", "https://example.com/b"))
            .await;
        assert!(matches!(second, Err(TransportError::Connection(_))));

        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[tokio::test]
    async fn test_scripted_stream_yields_chunks_then_closes() {
        let transport = ScriptedTransport::new();
        transport.push_stream(ScriptedStream::ok().chunk("a").fail("boom").close());

        let mut response = transport
            .perform_streaming_request(HttpRequest::new("POST", "https://example.com"))
            .await
            .unwrap();

        assert_eq!(response.body.next().await.unwrap().unwrap(), Bytes::from("a"));
        assert!(response.body.next().await.unwrap().is_err());
        assert!(response.body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_gate_holds_stream() {
        let (open, gate) = oneshot::channel();
        let transport = ScriptedTransport::new();
        transport.push_stream(ScriptedStream::ok().wait_for(gate).chunk("late").close());

        let mut response = transport
            .perform_streaming_request(HttpRequest::new("POST", "https://example.com"))
            .await
            .unwrap();

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            response.body.next(),
        )
        .await;
        assert!(pending.is_err());

        open.send(()).unwrap();
        assert_eq!(response.body.next().await.unwrap().unwrap(), Bytes::from("late"));
    }
}
