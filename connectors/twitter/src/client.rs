//! Signed single-call client.

use std::sync::Arc;

use birdwire_oauth::{ParameterSet, SignatureEngine};
use birdwire_transport::{AUTHORIZATION, CONTENT_TYPE, FORM_URLENCODED, HttpRequest, Transport};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::TwitterConfig,
    error::{CallError, TwitterError, TwitterResult},
};

/// Issues one signed, form-encoded call per invocation.
///
/// Calls are never retried here; see [`TwitterError::is_retryable`] for
/// building a policy on top.
#[derive(Clone)]
pub struct RequestClient {
    engine: SignatureEngine,
    transport: Arc<dyn Transport>,
    update_url: String,
}

impl std::fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestClient")
            .field("engine", &self.engine)
            .field("update_url", &self.update_url)
            .finish_non_exhaustive()
    }
}

impl RequestClient {
    /// Create a client posting status updates to the default endpoint.
    #[must_use]
    pub fn new(engine: SignatureEngine, transport: Arc<dyn Transport>) -> Self {
        Self {
            engine,
            transport,
            update_url: TwitterConfig::default().update_url(),
        }
    }

    /// Create a client from configuration.
    #[must_use]
    pub fn from_config(config: &TwitterConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            engine: config.signature_engine(),
            transport,
            update_url: config.update_url(),
        }
    }

    /// Override the status update endpoint.
    #[must_use]
    pub fn with_update_url(mut self, url: impl Into<String>) -> Self {
        self.update_url = url.into();
        self
    }

    /// POST `body` as a form to `url`, signed over exactly those parameters.
    ///
    /// # Errors
    /// [`TwitterError::OAuth`] if signing fails (nothing is sent);
    /// [`TwitterError::Call`] for a non-2xx status or a transport failure.
    #[instrument(skip(self, body), fields(params = body.len()))]
    pub async fn post(&self, url: &str, body: &ParameterSet) -> TwitterResult<()> {
        let signed = self.engine.sign_request("POST", url, body)?;

        let mut request = HttpRequest::new(signed.method, signed.url)
            .header(AUTHORIZATION, signed.authorization)
            .header(CONTENT_TYPE, FORM_URLENCODED);
        if let Some(form) = signed.body {
            request = request.body(form);
        }

        debug!("Sending signed request");
        let response = match self.transport.perform_request(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Transport failed");
                return Err(CallError::transport(&e).into());
            }
        };

        if response.is_success() {
            debug!(status = response.status, "Request accepted");
            Ok(())
        } else {
            warn!(status = response.status, "Request rejected");
            Err(CallError::status(response.status, response.text()).into())
        }
    }

    /// Post one status update.
    ///
    /// # Errors
    /// Same as [`RequestClient::post`].
    pub async fn post_status(&self, status: &str) -> TwitterResult<()> {
        let body = ParameterSet::from([("status", status)]);
        self.post(&self.update_url, &body).await
    }

    /// Post status updates in order, stopping at the first failure.
    ///
    /// Returns how many were posted.
    ///
    /// # Errors
    /// The error of the first status that failed.
    pub async fn post_statuses<S: AsRef<str>>(&self, statuses: &[S]) -> TwitterResult<usize> {
        for (index, status) in statuses.iter().enumerate() {
            if let Err(e) = self.post_status(status.as_ref()).await {
                warn!(index, error = %e, "Stopping batch after failed status");
                return Err(e);
            }
        }
        info!(count = statuses.len(), "Posted status batch");
        Ok(statuses.len())
    }
}
