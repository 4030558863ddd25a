//! The boundary between the pipeline and the network.
//!
//! The pipeline hands a finalized [`RequestContext`] to a [`Transport`] and
//! gets back a [`FetchResponse`] or a [`TransportError`]. [`ReqwestTransport`]
//! is the default implementation; tests and unusual environments can supply
//! their own.

use crate::response::FetchResponse;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use http::{HeaderMap, Method};
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

/// A boxed error from a transport implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A boxed stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, BoxError>> + Send + Sync>>;

/// A request body.
///
/// Bodies are cheap to clone. A [`Body::Stream`] shares one underlying
/// stream between its clones and can only be sent once.
#[derive(Debug, Clone)]
pub enum Body {
    /// A structured value, serialized as JSON before sending.
    Json(Value),
    /// Text, sent as-is.
    Text(String),
    /// Raw bytes, sent as-is.
    Bytes(Bytes),
    /// Form fields, sent URL-encoded.
    Form(Vec<(String, String)>),
    /// A streaming body, passed through untouched.
    Stream(StreamBody),
}

impl Body {
    /// Creates a streaming body.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, BoxError>> + Send + Sync + 'static,
    {
        Body::Stream(StreamBody::new(Box::pin(stream)))
    }

    /// Returns `true` for streaming bodies.
    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

/// A take-once handle to a body stream.
#[derive(Clone)]
pub struct StreamBody {
    inner: Arc<Mutex<Option<ByteStream>>>,
}

impl StreamBody {
    fn new(stream: ByteStream) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(stream))),
        }
    }

    /// Takes the stream, leaving every clone of this handle empty.
    pub fn take(&self) -> Option<ByteStream> {
        self.inner.lock().ok()?.take()
    }
}

impl fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBody").finish_non_exhaustive()
    }
}

/// Duplex mode for streaming request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplex {
    /// The request body is sent completely before the response is read.
    Half,
}

/// The resolved request of one attempt.
///
/// Built by the pipeline, offered to `on_request` hooks (which may replace it
/// wholesale), then handed to the [`Transport`] unchanged.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The HTTP method.
    pub method: Method,
    /// The fully-qualified URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Optional request body.
    pub body: Option<Body>,
    /// Cancels the request when fired.
    pub signal: CancellationToken,
    /// Duplex mode for streaming bodies.
    pub duplex: Option<Duplex>,
}

impl RequestContext {
    /// Creates a context with no headers, no body and a fresh signal.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            signal: CancellationToken::new(),
            duplex: None,
        }
    }
}

/// Ways a transport call can fail.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The request's cancellation token fired.
    #[error("The operation was aborted")]
    Aborted,

    /// The request could not be completed (DNS, connection refused, reset...).
    #[error("{0}")]
    Failed(BoxError),
}

/// Trait for pluggable HTTP backends.
///
/// Implementations must honour [`RequestContext::signal`] by returning
/// [`TransportError::Aborted`] once it fires.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and returns the response.
    async fn send(&self, request: RequestContext) -> std::result::Result<FetchResponse, TransportError>;
}

/// A [`Transport`] backed by `reqwest`.
///
/// Response bodies are buffered before the call settles, so cancellation and
/// timeouts also cover reading the body.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default `reqwest` client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn into_reqwest_body(body: Body) -> std::result::Result<reqwest::Body, TransportError> {
    Ok(match body {
        Body::Json(value) => serde_json::to_vec(&value)
            .map_err(|e| TransportError::Failed(Box::new(e)))?
            .into(),
        Body::Text(text) => text.into(),
        Body::Bytes(bytes) => bytes.into(),
        Body::Form(fields) => url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish()
            .into(),
        Body::Stream(stream) => {
            let stream = stream
                .take()
                .ok_or_else(|| TransportError::Failed("stream body was already sent".into()))?;
            reqwest::Body::wrap_stream(stream)
        }
    })
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: RequestContext) -> std::result::Result<FetchResponse, TransportError> {
        let RequestContext {
            method,
            url,
            headers,
            body,
            signal,
            ..
        } = request;

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(into_reqwest_body(body)?);
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let url = response.url().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(FetchResponse::new(status, headers, body).with_url(url))
        };

        tokio::select! {
            biased;
            _ = signal.cancelled() => Err(TransportError::Aborted),
            result = exchange => result.map_err(|e| TransportError::Failed(Box::new(e))),
        }
    }
}
