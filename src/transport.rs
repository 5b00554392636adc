use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, trace};
use url::Url;
use uuid::Uuid;

use crate::card::{MessageCard, to_json};
use crate::error::{SendError, TransportError};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const CORRELATION_HEADER: &str = "x-correlation-id";
const BODY_PREVIEW_LIMIT: usize = 256;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Status and body returned by the webhook endpoint.
#[derive(Clone, Debug)]
pub struct WebhookResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Sends raw JSON bodies to an HTTP endpoint.
pub trait Transport: Send + Sync {
    fn post_json<'a>(
        &'a self,
        url: &'a Url,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<WebhookResponse, TransportError>>;

    /// Releases the underlying connections. Only called on handles the sink owns.
    fn close(&self) {}
}

/// reqwest-backed transport.
#[derive(Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Build a transport with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client fails to build.
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .user_agent(concat!("teams-sink/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| TransportError::Client { source: err })?;

        Ok(Self::from_client(http))
    }

    /// Wrap a client configured by the caller.
    #[must_use]
    pub const fn from_client(http: reqwest::Client) -> Self {
        Self {
            http,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Transport for HttpTransport {
    fn post_json<'a>(
        &'a self,
        url: &'a Url,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<WebhookResponse, TransportError>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }

            let correlation_id = Uuid::now_v7().to_string();
            let started = Instant::now();
            let response = self
                .http
                .post(url.clone())
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .header(CORRELATION_HEADER, &correlation_id)
                .body(body)
                .send()
                .await?;

            let status = response.status();
            let body = if status.is_success() {
                String::new()
            } else {
                let bytes = response.bytes().await?;
                body_preview(&bytes)
            };

            debug!(
                %correlation_id,
                %status,
                latency_ms = started.elapsed().as_millis(),
                "webhook post completed"
            );
            Ok(WebhookResponse { status, body })
        })
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            trace!("http transport closed");
        }
    }
}

/// Whether the sink closes its transport on shutdown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Ownership {
    /// Created by the sink; closed on shutdown.
    Owned,
    /// Supplied by the caller; never closed by the sink.
    Borrowed,
}

#[derive(Clone)]
pub struct TransportHandle {
    inner: Arc<dyn Transport>,
    ownership: Ownership,
    released: Arc<AtomicBool>,
}

impl TransportHandle {
    pub fn owned(transport: Arc<dyn Transport>) -> Self {
        Self::with_ownership(transport, Ownership::Owned)
    }

    pub fn borrowed(transport: Arc<dyn Transport>) -> Self {
        Self::with_ownership(transport, Ownership::Borrowed)
    }

    fn with_ownership(inner: Arc<dyn Transport>, ownership: Ownership) -> Self {
        Self {
            inner,
            ownership,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub const fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn transport(&self) -> &dyn Transport {
        self.inner.as_ref()
    }

    /// Closes the transport if owned. Later calls, from any clone, do nothing.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.ownership {
            Ownership::Owned => {
                self.inner.close();
                debug!("owned transport released");
            }
            Ownership::Borrowed => trace!("borrowed transport left open"),
        }
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("ownership", &self.ownership)
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Posts cards to the configured webhook through a [`TransportHandle`].
#[derive(Clone, Debug)]
pub struct WebhookPoster {
    target: Url,
    handle: TransportHandle,
}

impl WebhookPoster {
    #[must_use]
    pub const fn new(target: Url, handle: TransportHandle) -> Self {
        Self { target, handle }
    }

    #[must_use]
    pub const fn handle(&self) -> &TransportHandle {
        &self.handle
    }

    /// Post one card; any non-2xx status is a failure.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] when the card cannot be serialized, the
    /// transport fails, or the endpoint answers with a non-success status.
    pub async fn send(&self, card: &MessageCard) -> Result<(), SendError> {
        let body = to_json(card)?;
        let response = self
            .handle
            .transport()
            .post_json(&self.target, body)
            .await?;
        if response.status.is_success() {
            Ok(())
        } else {
            Err(SendError::HttpStatus {
                status: response.status,
                body: response.body,
            })
        }
    }
}

pub(crate) fn body_preview(body: &[u8]) -> String {
    if body.is_empty() {
        return "<empty>".to_string();
    }
    let end = body.len().min(BODY_PREVIEW_LIMIT);
    let mut preview = String::from_utf8_lossy(&body[..end]).to_string();
    if body.len() > BODY_PREVIEW_LIMIT {
        preview.push_str("...");
    }
    preview.replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::{HttpTransport, Ownership, Transport, TransportHandle, body_preview};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingClose(AtomicUsize);

    impl Transport for CountingClose {
        fn post_json<'a>(
            &'a self,
            _url: &'a url::Url,
            _body: Vec<u8>,
        ) -> super::BoxFuture<'a, Result<super::WebhookResponse, crate::error::TransportError>>
        {
            Box::pin(async { Err(crate::error::TransportError::Other("unused".into())) })
        }

        fn close(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn owned_handle_closes_once() {
        let transport = Arc::new(CountingClose::default());
        let handle = TransportHandle::owned(transport.clone());
        let copy = handle.clone();
        handle.release();
        copy.release();
        assert_eq!(transport.0.load(Ordering::SeqCst), 1);
        assert_eq!(handle.ownership(), Ownership::Owned);
    }

    #[test]
    fn borrowed_handle_never_closes() {
        let transport = Arc::new(CountingClose::default());
        let handle = TransportHandle::borrowed(transport.clone());
        handle.release();
        assert_eq!(transport.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn closed_http_transport_rejects_posts() {
        let transport =
            HttpTransport::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        transport.close();
        let url = url::Url::parse("http://127.0.0.1:9/hook").unwrap();
        let err = transport.post_json(&url, b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, crate::error::TransportError::Closed));
    }

    #[test]
    fn body_preview_truncates_and_flattens() {
        assert_eq!(body_preview(b""), "<empty>");
        assert_eq!(body_preview(b"a\nb"), "a\\nb");
        let long = vec![b'x'; 300];
        let preview = body_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.len(), 259);
    }
}
