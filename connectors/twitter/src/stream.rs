//! Long-lived signed streaming session.
//!
//! A [`StreamSession`] opens one signed streaming request, hands every body
//! chunk to a consumer callback from a single background task, and shuts
//! that task down cooperatively when asked.
//!
//! ```text
//! Idle --start--> Connecting --first chunk--> Streaming
//!  |                  |                           |
//!  |                  +--stop--> Stopping <--stop-+
//!  |                  |             |             |
//!  +------stop------> Stopped <-----+---failure---+
//! ```

use std::fmt;
use std::sync::Arc;

use birdwire_oauth::{OAuthError, ParameterSet, SignatureEngine, percent_encode};
use birdwire_transport::{
    AUTHORIZATION, CONTENT_TYPE, FORM_URLENCODED, HttpRequest, StreamingResponse, Transport,
};
use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::TwitterConfig,
    error::{StreamError, TwitterError, TwitterResult},
};

/// Name of the query parameter carrying tracked keywords.
pub const TRACK_PARAMETER: &str = "track";

/// Longest error body kept when the stream endpoint rejects the request.
const MAX_ERROR_BODY: usize = 1024;

/// Lifecycle of a [`StreamSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Constructed, not started.
    Idle,
    /// Request issued, no data yet.
    Connecting,
    /// At least one chunk received.
    Streaming,
    /// Stop requested, waiting for the receive task to exit.
    Stopping,
    /// Terminal.
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

type ErrorCallback = Box<dyn FnOnce(&StreamError) + Send>;

struct Inner {
    state: SessionState,
    error: Option<StreamError>,
    on_error: Option<ErrorCallback>,
}

/// State shared between the controller and the receive task.
struct Shared {
    inner: Mutex<Inner>,
    /// Held by the receive task for the whole of one delivery.
    delivery: tokio::sync::Mutex<()>,
    stop_tx: watch::Sender<bool>,
    done_tx: watch::Sender<bool>,
}

impl Shared {
    fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    fn take_error(&self) -> TwitterResult<()> {
        self.inner.lock().error.take().map_or(Ok(()), |e| Err(e.into()))
    }

    /// Record the end of the receive task and move to `Stopped`.
    fn finish(&self, error: Option<StreamError>) {
        let callback = {
            let mut inner = self.inner.lock();
            inner.state = SessionState::Stopped;
            match error {
                Some(error) => match inner.on_error.take() {
                    Some(callback) => Some((callback, error)),
                    None => {
                        inner.error = Some(error);
                        None
                    }
                },
                None => None,
            }
        };

        if let Some((callback, error)) = callback {
            callback(&error);
        }
        self.done_tx.send_replace(true);
    }
}

/// Finishes the session when the receive task ends, including by panic or
/// runtime shutdown.
struct Finisher {
    shared: Arc<Shared>,
    error: Option<StreamError>,
}

impl Drop for Finisher {
    fn drop(&mut self) {
        self.shared.finish(self.error.take());
    }
}

/// One authenticated streaming connection.
///
/// Not restartable: once [`SessionState::Stopped`], build a new session.
pub struct StreamSession {
    engine: SignatureEngine,
    transport: Arc<dyn Transport>,
    stream_url: String,
    shared: Arc<Shared>,
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("stream_url", &self.stream_url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    /// Create an idle session against `stream_url` (no query string).
    #[must_use]
    pub fn new(
        engine: SignatureEngine,
        transport: Arc<dyn Transport>,
        stream_url: impl Into<String>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (done_tx, _) = watch::channel(false);

        Self {
            engine,
            transport,
            stream_url: stream_url.into(),
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: SessionState::Idle,
                    error: None,
                    on_error: None,
                }),
                delivery: tokio::sync::Mutex::new(()),
                stop_tx,
                done_tx,
            }),
        }
    }

    /// Create an idle session against the configured filter endpoint.
    #[must_use]
    pub fn from_config(config: &TwitterConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(config.signature_engine(), transport, config.filter_url())
    }

    /// Register a callback invoked once, from the receive task, if the stream fails.
    ///
    /// A failure delivered here is not returned again by [`stop`](Self::stop)
    /// or [`finished`](Self::finished).
    #[must_use]
    pub fn on_error(self, callback: impl FnOnce(&StreamError) + Send + 'static) -> Self {
        self.shared.inner.lock().on_error = Some(Box::new(callback));
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Start tracking `keywords`, delivering body chunks to `on_chunk`.
    ///
    /// Returns as soon as the receive task is spawned. Chunks are delivered
    /// in arrival order, one at a time; a slow consumer slows the read.
    ///
    /// # Errors
    /// [`TwitterError::InvalidState`] unless the session is idle;
    /// [`TwitterError::OAuth`] if no keyword is given or signing fails.
    ///
    /// # Panics
    /// Must be called from within a tokio runtime.
    #[instrument(skip(self, on_chunk), fields(url = %self.stream_url))]
    pub fn start<F>(&self, keywords: &[&str], on_chunk: F) -> TwitterResult<()>
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        let track = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        if track.is_empty() {
            return Err(
                OAuthError::InvalidParameters("at least one keyword is required".into()).into(),
            );
        }

        let mut inner = self.shared.inner.lock();
        if inner.state != SessionState::Idle {
            return Err(TwitterError::InvalidState {
                operation: "start",
                state: inner.state,
            });
        }

        let params = ParameterSet::from([(TRACK_PARAMETER, track.as_str())]);
        let authorization = self.engine.sign("POST", &self.stream_url, &params)?;
        let request = HttpRequest::new(
            "POST",
            format!("{}?{TRACK_PARAMETER}={}", self.stream_url, percent_encode(&track)),
        )
        .header(AUTHORIZATION, authorization)
        .header(CONTENT_TYPE, FORM_URLENCODED)
        .body("");

        inner.state = SessionState::Connecting;
        tokio::spawn(receive(
            Arc::clone(&self.transport),
            request,
            Arc::clone(&self.shared),
            self.shared.stop_tx.subscribe(),
            on_chunk,
        ));
        drop(inner);

        info!(track = %track, "Stream session started");
        Ok(())
    }

    /// Stop the session and wait for the receive task to exit.
    ///
    /// Waits for a delivery already in progress to return, then requests the
    /// stop; no chunk is delivered after that. Bytes already buffered by the
    /// transport are dropped. Later calls return `Ok(())` once stopped.
    ///
    /// Cancel safe: if this future is dropped after the stop was requested,
    /// the receive task still finishes the transition to
    /// [`SessionState::Stopped`].
    ///
    /// # Errors
    /// The stream's failure, if it failed before stopping and the failure
    /// has not been observed yet.
    pub async fn stop(&self) -> TwitterResult<()> {
        {
            let mut inner = self.shared.inner.lock();
            let state = inner.state;
            match state {
                SessionState::Idle => {
                    inner.state = SessionState::Stopped;
                    drop(inner);
                    self.shared.done_tx.send_replace(true);
                    debug!("Idle stream session stopped");
                    return Ok(());
                }
                SessionState::Stopped => {
                    drop(inner);
                    return self.shared.take_error();
                }
                SessionState::Connecting | SessionState::Streaming | SessionState::Stopping => {}
            }
        }

        let delivery = self.shared.delivery.lock().await;
        {
            let mut inner = self.shared.inner.lock();
            if matches!(
                inner.state,
                SessionState::Connecting | SessionState::Streaming
            ) {
                inner.state = SessionState::Stopping;
            }
            self.shared.stop_tx.send_replace(true);
        }
        drop(delivery);

        let mut done_rx = self.shared.done_tx.subscribe();
        // The sender lives in `shared`, which we hold
        let _ = done_rx.wait_for(|done| *done).await;

        info!("Stream session stopped");
        self.shared.take_error()
    }

    /// Wait until the session is stopped, by [`stop`](Self::stop) or by the
    /// stream ending on its own.
    ///
    /// # Errors
    /// [`TwitterError::InvalidState`] on an idle session; otherwise the
    /// stream's failure if not yet observed.
    pub async fn finished(&self) -> TwitterResult<()> {
        let mut done_rx = self.shared.done_tx.subscribe();
        let state = self.state();
        if state == SessionState::Idle {
            return Err(TwitterError::InvalidState {
                operation: "wait on",
                state,
            });
        }

        let _ = done_rx.wait_for(|done| *done).await;
        self.shared.take_error()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        // The task unwinds at its next await point; nobody waits for it.
        self.shared.stop_tx.send_replace(true);
    }
}

/// Resolves once a stop has been requested.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    // The sender outlives every receiver, so this only returns on a stop
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

/// The background receive activity.
async fn receive<F>(
    transport: Arc<dyn Transport>,
    request: HttpRequest,
    shared: Arc<Shared>,
    mut stop_rx: watch::Receiver<bool>,
    on_chunk: F,
) where
    F: FnMut(Bytes) + Send + 'static,
{
    let mut finisher = Finisher {
        shared: Arc::clone(&shared),
        error: None,
    };

    let connected = tokio::select! {
        biased;
        () = stop_requested(&mut stop_rx) => None,
        result = transport.perform_streaming_request(request) => Some(result),
    };

    finisher.error = match connected {
        None => {
            debug!("Stop requested while connecting");
            None
        }
        Some(Ok(response)) => read_body(response, &shared, &mut stop_rx, on_chunk).await,
        Some(Err(e)) => {
            warn!(error = %e, "Stream connection failed");
            Some(StreamError::Transport(e.to_string()))
        }
    };
}

/// Deliver body chunks until stop, failure or remote close.
///
/// Returns the failure, if any.
async fn read_body<F>(
    mut response: StreamingResponse,
    shared: &Shared,
    stop_rx: &mut watch::Receiver<bool>,
    mut on_chunk: F,
) -> Option<StreamError>
where
    F: FnMut(Bytes),
{
    if !response.is_success() {
        let first = tokio::select! {
            biased;
            () = stop_requested(stop_rx) => return None,
            first = response.body.next() => first,
        };
        let message = match first {
            Some(Ok(chunk)) => {
                String::from_utf8_lossy(&chunk[..chunk.len().min(MAX_ERROR_BODY)]).into_owned()
            }
            _ => String::new(),
        };
        warn!(status = response.status, "Stream rejected");
        return Some(StreamError::Http {
            status: response.status,
            message,
        });
    }

    loop {
        let next = tokio::select! {
            biased;
            () = stop_requested(stop_rx) => return None,
            next = response.body.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                if chunk.is_empty() {
                    continue;
                }
                // `stop` raises the flag only while holding this lock
                let _delivery = shared.delivery.lock().await;
                if *stop_rx.borrow() {
                    return None;
                }
                {
                    let mut inner = shared.inner.lock();
                    if inner.state == SessionState::Connecting {
                        inner.state = SessionState::Streaming;
                        debug!("First chunk received");
                    }
                }
                on_chunk(chunk);
            }
            Some(Err(e)) => {
                warn!(error = %e, "Stream read failed");
                return Some(StreamError::Transport(e.to_string()));
            }
            None => {
                info!("Stream closed by remote");
                return Some(StreamError::ConnectionClosed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use birdwire_oauth::Credentials;
    use birdwire_testkit::{ScriptedStream, ScriptedTransport};
    use tokio::sync::{mpsc, oneshot};

    const FILTER_URL: &str = "https://stream.twitter.com/1.1/statuses/filter.json";

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Chunk(String),
        Error(StreamError),
    }

    fn session(transport: &ScriptedTransport) -> StreamSession {
        birdwire_testkit::init_test_tracing();
        let engine = SignatureEngine::new(Arc::new(Credentials::new("ck", "cs", "at", "ats")));
        StreamSession::new(engine, Arc::new(transport.clone()), FILTER_URL)
    }

    fn recorder() -> (Arc<Mutex<Vec<Event>>>, impl FnMut(Bytes) + Send + 'static) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let on_chunk = move |chunk: Bytes| {
            sink.lock()
                .push(Event::Chunk(String::from_utf8_lossy(&chunk).into_owned()));
        };
        (events, on_chunk)
    }

    async fn wait_for_state(session: &StreamSession, wanted: SessionState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while session.state() != wanted {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("session never reached {wanted}"));
    }

    #[tokio::test]
    async fn test_start_issues_signed_request_with_track_query() {
        let transport = ScriptedTransport::new();
        transport.push_stream(ScriptedStream::ok().hang());
        let session = session(&transport);

        let (_events, on_chunk) = recorder();
        session.start(&["example", " test"], on_chunk).unwrap();
        wait_for_state(&session, SessionState::Connecting).await;
        while transport.request_count() == 0 {
            tokio::task::yield_now().await;
        }

        let request = &transport.requests()[0];
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, format!("{FILTER_URL}?track=example%2Ctest"));
        assert_eq!(request.header_value(CONTENT_TYPE), Some(FORM_URLENCODED));
        let auth = request.header_value(AUTHORIZATION).unwrap();
        assert!(auth.starts_with("OAuth "));
        assert!(!auth.contains("track"));

        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_first_chunk_skips_consumer() {
        let transport = ScriptedTransport::new();
        transport.push_stream(ScriptedStream::ok().hang());
        let session = session(&transport);

        let (events, on_chunk) = recorder();
        session.start(&["rust"], on_chunk).unwrap();
        assert_eq!(session.state(), SessionState::Connecting);

        session.stop().await.unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(events.lock().is_empty());

        // Second stop is a no-op
        session.stop().await.unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_chunks_in_order_then_close_is_stream_error() {
        let transport = ScriptedTransport::new();
        transport.push_stream(ScriptedStream::ok().chunk("a").chunk("b").chunk("c").close());

        let (events, on_chunk) = recorder();
        let errors = Arc::clone(&events);
        let session = session(&transport)
            .on_error(move |e| errors.lock().push(Event::Error(e.clone())));

        session.start(&["rust"], on_chunk).unwrap();
        session.finished().await.unwrap();

        assert_eq!(
            *events.lock(),
            vec![
                Event::Chunk("a".into()),
                Event::Chunk("b".into()),
                Event::Chunk("c".into()),
                Event::Error(StreamError::ConnectionClosed),
            ]
        );
        assert_eq!(session.state(), SessionState::Stopped);
        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_is_surfaced_once_through_stop() {
        let transport = ScriptedTransport::new();
        transport.push_stream(ScriptedStream::ok().chunk("a").fail("connection reset").close());
        let session = session(&transport);

        let (events, on_chunk) = recorder();
        session.start(&["rust"], on_chunk).unwrap();
        wait_for_state(&session, SessionState::Stopped).await;

        let err = session.stop().await.unwrap_err();
        assert!(matches!(
            err,
            TwitterError::Stream(StreamError::Transport(ref m)) if m.contains("connection reset")
        ));
        session.stop().await.unwrap();
        assert_eq!(*events.lock(), vec![Event::Chunk("a".into())]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_delivery_after_stop_requested_mid_chunk() {
        let transport = ScriptedTransport::new();
        transport.push_stream(ScriptedStream::ok().chunk("a").chunk("b").chunk("c").close());
        let session = Arc::new(session(&transport));

        let (in_b_tx, mut in_b_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let (events, mut record) = recorder();

        session
            .start(&["rust"], move |chunk: Bytes| {
                let is_b = chunk == "b";
                record(chunk);
                if is_b {
                    in_b_tx.send(()).unwrap();
                    // Hold delivery of "b" until stop has been called
                    release_rx.recv().unwrap();
                }
            })
            .unwrap();

        in_b_rx.recv().await.unwrap();
        let stopper = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.stop().await })
        };

        // Stop waits for the delivery in progress before raising the flag
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!stopper.is_finished());
        assert_eq!(session.state(), SessionState::Streaming);
        release_tx.send(()).unwrap();

        stopper.await.unwrap().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(
            *events.lock(),
            vec![Event::Chunk("a".into()), Event::Chunk("b".into())]
        );
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_state() {
        let transport = ScriptedTransport::new();
        transport.push_stream(ScriptedStream::ok().hang());
        let session = session(&transport);

        let (_events, on_chunk) = recorder();
        session.start(&["rust"], on_chunk).unwrap();
        while transport.request_count() == 0 {
            tokio::task::yield_now().await;
        }

        let (_events, again) = recorder();
        let err = session.start(&["rust"], again).unwrap_err();
        assert!(matches!(
            err,
            TwitterError::InvalidState {
                operation: "start",
                state: SessionState::Connecting
            }
        ));

        session.stop().await.unwrap();
        let (_events, after_stop) = recorder();
        assert!(matches!(
            session.start(&["rust"], after_stop),
            Err(TwitterError::InvalidState {
                state: SessionState::Stopped,
                ..
            })
        ));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_stop_still_reaches_stopped() {
        let transport = ScriptedTransport::new();
        transport.push_stream(ScriptedStream::ok().hang());
        let session = session(&transport);

        let (events, on_chunk) = recorder();
        session.start(&["rust"], on_chunk).unwrap();
        while transport.request_count() == 0 {
            tokio::task::yield_now().await;
        }

        // Polled once: the stop is requested, then the caller gives up
        let abandoned = tokio::time::timeout(Duration::ZERO, session.stop()).await;
        assert!(abandoned.is_err());
        assert_eq!(session.state(), SessionState::Stopping);

        tokio::time::timeout(Duration::from_secs(5), session.finished())
            .await
            .expect("receive task never finished")
            .unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        session.stop().await.unwrap();
        assert!(events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_stops_both_wait_for_exit() {
        let transport = ScriptedTransport::new();
        transport.push_stream(ScriptedStream::ok().chunk("a").hang());
        let session = session(&transport);

        let (_events, on_chunk) = recorder();
        session.start(&["rust"], on_chunk).unwrap();
        wait_for_state(&session, SessionState::Streaming).await;

        let (first, second) = tokio::join!(session.stop(), session.stop());
        first.unwrap();
        second.unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_panicking_consumer_still_stops_session() {
        let transport = ScriptedTransport::new();
        transport.push_stream(ScriptedStream::ok().chunk("boom").hang());
        let session = session(&transport);

        session
            .start(&["rust"], |_chunk: Bytes| panic!("consumer failed"))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), session.finished())
            .await
            .expect("session never stopped")
            .unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_on_idle_session_is_terminal() {
        let transport = ScriptedTransport::new();
        let session = session(&transport);

        session.stop().await.unwrap();
        assert_eq!(session.state(), SessionState::Stopped);

        let (_events, on_chunk) = recorder();
        assert!(session.start(&["rust"], on_chunk).is_err());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_keywords_are_rejected() {
        let transport = ScriptedTransport::new();
        let session = session(&transport);

        let (_events, on_chunk) = recorder();
        let err = session.start(&[" ", ""], on_chunk).unwrap_err();

        assert!(matches!(
            err,
            TwitterError::OAuth(OAuthError::InvalidParameters(_))
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_rejected_stream_reports_status() {
        let transport = ScriptedTransport::new();
        transport.push_stream(ScriptedStream::with_status(420).chunk("Enhance Your Calm").close());
        let session = session(&transport);

        let (events, on_chunk) = recorder();
        session.start(&["rust"], on_chunk).unwrap();

        let err = session.finished().await.unwrap_err();
        assert!(matches!(
            err,
            TwitterError::Stream(StreamError::Http { status: 420, ref message }) if message == "Enhance Your Calm"
        ));
        assert!(events.lock().is_empty());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_connect_failure_goes_straight_to_stopped() {
        let transport = ScriptedTransport::new();
        transport.push_stream_failure("dns lookup failed");
        let session = session(&transport);

        let (_events, on_chunk) = recorder();
        session.start(&["rust"], on_chunk).unwrap();

        let err = session.finished().await.unwrap_err();
        assert!(matches!(err, TwitterError::Stream(StreamError::Transport(_))));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_first_chunk_moves_to_streaming() {
        let (open, gate) = oneshot::channel();
        let transport = ScriptedTransport::new();
        transport.push_stream(ScriptedStream::ok().wait_for(gate).chunk("hello").hang());
        let session = session(&transport);

        let (events, on_chunk) = recorder();
        session.start(&["rust"], on_chunk).unwrap();
        assert_eq!(session.state(), SessionState::Connecting);

        open.send(()).unwrap();
        wait_for_state(&session, SessionState::Streaming).await;
        assert_eq!(*events.lock(), vec![Event::Chunk("hello".into())]);

        session.stop().await.unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_finished_on_idle_session_is_invalid_state() {
        let transport = ScriptedTransport::new();
        let session = session(&transport);

        assert!(matches!(
            session.finished().await,
            Err(TwitterError::InvalidState { .. })
        ));
    }
}
