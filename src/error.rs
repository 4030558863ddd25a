//! Error types for fetch calls.
//!
//! HTTP and network failures only surface here when the call asked for them
//! to be raised (see [`FetchOptions::throw_on_error`](crate::FetchOptions::throw_on_error));
//! otherwise they are reported through [`Reply::error`](crate::Reply::error).
//! Everything else (cancellation, validation, plugin and configuration
//! problems) always propagates as an `Err`.

use crate::schema::Issue;
use serde_json::Value;

/// The main error type for fetch calls.
///
/// # Examples
///
/// ```no_run
/// use fetchling::{Client, Error, FetchOptions};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client.fetch_data("/users/1", FetchOptions::new()).await {
///     Ok(data) => println!("Success: {:?}", data),
///     Err(Error::HttpError { status, body, .. }) => {
///         eprintln!("HTTP error {}: {}", status, body);
///     }
///     Err(Error::Validation { issues }) => {
///         eprintln!("Response did not match schema: {:?}", issues);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The caller's cancellation token fired while the call was in flight.
    ///
    /// Never retried and never routed through `on_error` hooks.
    #[error("Request cancelled")]
    Cancelled,

    /// The configured timeout elapsed before the transport settled.
    #[error("Request timed out")]
    Timeout,

    /// A non-2xx response (or a network failure, with `status` 0) raised
    /// because the call was made with `throw` set.
    ///
    /// # Fields
    ///
    /// * `status` - The HTTP status code, `0` for network failures
    /// * `status_text` - The reason phrase, `"Network Error"` for network failures
    /// * `body` - The parsed error body, the raw response text, or a caller override
    #[error("HTTP error {status} {status_text}: {body}")]
    HttpError {
        /// The HTTP status code
        status: u16,
        /// The reason phrase
        status_text: String,
        /// The error body
        body: Value,
    },

    /// An input or output schema rejected the value.
    ///
    /// Schema mismatches are contract errors and bypass the retry path.
    #[error("Validation failed: {}", format_issues(.issues))]
    Validation {
        /// The issues reported by the schema
        issues: Vec<Issue>,
    },

    /// A plugin failed during its `init` step.
    #[error("Plugin `{plugin}` failed to initialize: {message}")]
    Plugin {
        /// The failing plugin's id
        plugin: String,
        /// What went wrong
        message: String,
    },

    /// Raised by a lifecycle hook to abort the call.
    ///
    /// The library never produces this variant itself. Hook implementations
    /// return it when they reject a request or response; the call stops at
    /// that hook, no later hook runs and the call is not retried.
    ///
    /// ```
    /// use async_trait::async_trait;
    /// use fetchling::{Error, Hooks, RequestContext, Result};
    ///
    /// struct RequireTenant;
    ///
    /// #[async_trait]
    /// impl Hooks for RequireTenant {
    ///     async fn on_request(&self, ctx: &RequestContext) -> Result<Option<RequestContext>> {
    ///         if !ctx.headers.contains_key("x-tenant") {
    ///             return Err(Error::Hook("missing x-tenant header".to_string()));
    ///         }
    ///         Ok(None)
    ///     }
    /// }
    /// ```
    #[error("Hook failed: {0}")]
    Hook(String),

    /// Invalid configuration was provided, such as a relative URL without a
    /// base URL or an invalid header value.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize decoded data into the requested type.
    #[error("Failed to deserialize response: {serde_error}")]
    DeserializationFailed {
        /// The value that failed to deserialize, rendered as text
        raw_response: String,
        /// The serde error message
        serde_error: String,
    },

    /// The response body was read more than once.
    ///
    /// Clone the response before the first read if a second reader needs it.
    #[error("Response body already consumed")]
    BodyUsed,

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns the HTTP status code for raised HTTP/network errors.
    ///
    /// # Examples
    ///
    /// ```
    /// use fetchling::Error;
    ///
    /// let err = Error::HttpError {
    ///     status: 404,
    ///     status_text: "Not Found".to_string(),
    ///     body: serde_json::json!({ "message": "not found" }),
    /// };
    /// assert_eq!(err.status(), Some(404));
    /// assert_eq!(Error::Timeout.status(), None);
    /// ```
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` for raised network-level failures.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::HttpError { status: 0, .. })
    }

    /// Returns `true` if the call was cancelled or timed out.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Timeout)
    }

    /// Returns the schema issues for validation failures.
    pub fn issues(&self) -> Option<&[Issue]> {
        match self {
            Error::Validation { issues } => Some(issues),
            _ => None,
        }
    }
}

fn format_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A specialized `Result` type for fetch calls.
pub type Result<T> = std::result::Result<T, Error>;
