//! # Fetchling - HTTP calls with hooks, plugins, schemas and retries
//!
//! Fetchling drives every HTTP call through a small pipeline: plugins rewrite
//! the call, hooks observe (and may replace) the request and response, the
//! body is decoded and validated, and failures go through a single error
//! routine that decides between retrying, raising and returning the error.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fetchling::{Client, FetchOptions, RetryPolicy};
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fetchling::Error> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .timeout(Duration::from_secs(30))
//!         .retry(RetryPolicy::exponential(3, Duration::from_millis(100), Duration::from_secs(10)))
//!         .build()?;
//!
//!     // Errors come back in the reply...
//!     let reply = client
//!         .fetch("/users/:id", FetchOptions::new().with_param("id", "123"))
//!         .await?;
//!     if let Some(error) = &reply.error {
//!         eprintln!("Failed with {} {}", error.status, error.status_text);
//!     }
//!
//!     // ...or are raised.
//!     let user: User = client.fetch_json("/users/123", FetchOptions::new()).await?;
//!     println!("User {}: {}", user.id, user.name);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **`{ data, error }` replies** - HTTP and network errors are values unless a call opts into raising them
//! - **Lifecycle hooks** - `on_request`, `on_response`, `on_success`, `on_error` and `on_retry`, run in order
//! - **Plugins** - Rewrite URLs and options per call and contribute hooks
//! - **Schema validation** - Validate request bodies and response data through the [`schema::Schema`] trait
//! - **Retries** - Linear or exponential backoff with status allow-lists and custom predicates
//! - **Timeouts and cancellation** - Per-attempt timeouts and caller cancellation tokens
//! - **Structured logging** - Every attempt is traced with `tracing`
//!
//! ## Error Handling
//!
//! ```no_run
//! use fetchling::{Client, Error, FetchOptions};
//!
//! # async fn example() -> Result<(), Error> {
//! # let client = Client::builder().base_url("https://api.example.com")?.build()?;
//! match client.fetch_data("/endpoint", FetchOptions::new()).await {
//!     Ok(data) => println!("Success: {:?}", data),
//!     Err(Error::HttpError { status, body, .. }) if status == 0 => {
//!         eprintln!("Network error: {}", body);
//!     }
//!     Err(Error::HttpError { status, body, .. }) => {
//!         eprintln!("HTTP error {}: {}", status, body);
//!     }
//!     Err(Error::Validation { issues }) => {
//!         eprintln!("Schema rejected the response: {:?}", issues);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retry Policies
//!
//! ```no_run
//! use fetchling::{Client, RetryPolicy, retry::{OrPredicate, RetryOn5xx, RetryOnNetworkError}};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), fetchling::Error> {
//! let client = Client::builder()
//!     .base_url("https://api.example.com")?
//!     .retry(
//!         RetryPolicy::exponential(5, Duration::from_millis(100), Duration::from_secs(30))
//!             .with_jitter(true)
//!             .retry_if(OrPredicate::new(vec![
//!                 Box::new(RetryOn5xx),
//!                 Box::new(RetryOnNetworkError),
//!             ])),
//!     )
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod hooks;
mod options;
mod plugin;
pub mod plugins;
pub mod request;
mod response;
pub mod retry;
pub mod schema;
mod transport;

pub use client::{Client, ClientBuilder};
pub use error::{Error, Result};
pub use hooks::{ErrorContext, Hooks, ResponseContext, ResponseOverride, SuccessContext};
pub use options::{Auth, FetchOptions, PathParams, Token};
pub use plugin::{initialize_plugins, Initialized, Plugin, PluginInit};
pub use response::{
    default_json_parse, detect_response_type, Data, ErrorInfo, FetchResponse, JsonParser, Reply,
    ResponseType,
};
pub use retry::{RetryPolicy, RetryPredicate};
pub use transport::{
    Body, BoxError, ByteStream, Duplex, ReqwestTransport, RequestContext, StreamBody, Transport,
    TransportError,
};
