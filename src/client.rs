//! The fetch client and its execution pipeline.
//!
//! The [`Client`] type is the main entry point for making HTTP calls.
//! Use [`ClientBuilder`] to configure shared defaults and create clients.

use crate::{
    hooks::{
        run_on_error, run_on_request, run_on_response, run_on_retry, run_on_success, ErrorContext,
        Hooks, ResponseContext, SuccessContext,
    },
    options::{Auth, FetchOptions},
    plugin::{initialize_plugins, Initialized, Plugin},
    request::{build_body, build_headers, build_url, resolve_method, TimeoutGuard},
    response::{default_json_parse, detect_response_type, Data, ErrorInfo, FetchResponse, Reply, ResponseType},
    retry::RetryPolicy,
    schema::{parse_with_schema, Issue},
    transport::{Body, Duplex, ReqwestTransport, RequestContext, Transport, TransportError},
    Error, Result,
};
use http::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// An HTTP client that runs every call through plugins, hooks, validation
/// and retries.
///
/// The client is designed to be reused across multiple calls; clones share
/// the transport and defaults.
///
/// # Examples
///
/// ```no_run
/// use fetchling::{Client, FetchOptions, RetryPolicy};
/// use serde::{Deserialize, Serialize};
/// use std::time::Duration;
///
/// #[derive(Serialize)]
/// struct CreateUser {
///     name: String,
/// }
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), fetchling::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .retry(RetryPolicy::exponential(3, Duration::from_millis(100), Duration::from_secs(10)))
///     .build()?;
///
/// // GET request
/// let user = client.get::<User>("/users/123").await?;
/// if let Some(user) = user.data {
///     println!("User: {}", user.name);
/// }
///
/// // POST request
/// let created = client
///     .post::<_, User>("/users", &CreateUser { name: "Alice".to_string() })
///     .await?;
/// println!("Created after {} attempt(s)", created.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    defaults: FetchOptions,
}

/// How one attempt ended.
enum Attempt {
    Done(Reply<Data>),
    Retry,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fetchling::Client;
    ///
    /// # async fn example() -> Result<(), fetchling::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://api.example.com")?
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client without defaults, backed by `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        ClientBuilder::new().build()
    }

    /// Executes a call.
    ///
    /// HTTP and network errors resolve to a [`Reply`] carrying the error,
    /// unless the options ask for them to be raised. Cancellation,
    /// timeouts, schema failures, plugin failures and hook failures are
    /// always returned as `Err`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fetchling::{Client, FetchOptions};
    ///
    /// # async fn example() -> Result<(), fetchling::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://api.example.com")?
    ///     .build()?;
    ///
    /// let reply = client
    ///     .fetch("/users/:id", FetchOptions::new().with_param("id", "1"))
    ///     .await?;
    ///
    /// match reply.error {
    ///     Some(error) => println!("{} {}", error.status, error.status_text),
    ///     None => println!("{:?}", reply.data),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn fetch(&self, url: &str, options: FetchOptions) -> Result<Reply<Data>> {
        let options = options.merged_over(&self.inner.defaults);
        let first_attempt = options.retry_attempt;
        let mut attempt = first_attempt;

        loop {
            let mut attempt_options = options.clone();
            attempt_options.retry_attempt = attempt;

            match self
                .execute(url, attempt_options, attempt - first_attempt + 1)
                .await?
            {
                Attempt::Done(reply) => return Ok(reply),
                Attempt::Retry => attempt += 1,
            }
        }
    }

    /// Executes a call and returns its data, raising HTTP and network
    /// errors as [`Error::HttpError`].
    pub async fn fetch_data(&self, url: &str, options: FetchOptions) -> Result<Data> {
        self.fetch(url, options.throw_on_error(true))
            .await?
            .into_result()
    }

    /// Executes a call and deserializes its data into `T`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fetchling::{Client, FetchOptions};
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct User { name: String }
    ///
    /// # async fn example() -> Result<(), fetchling::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://api.example.com")?
    ///     .build()?;
    ///
    /// let user: User = client.fetch_json("/users/123", FetchOptions::new()).await?;
    /// println!("User: {}", user.name);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn fetch_json<T>(&self, url: &str, options: FetchOptions) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.fetch_data(url, options).await?.deserialize()
    }

    /// Makes a GET request to the specified path.
    pub async fn get<Res>(&self, path: &str) -> Result<Reply<Res>>
    where
        Res: DeserializeOwned,
    {
        let options = FetchOptions::new().with_method(Method::GET);
        self.typed(path, options).await
    }

    /// Makes a POST request to the specified path with a JSON body.
    pub async fn post<Req, Res>(&self, path: &str, body: &Req) -> Result<Reply<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let options = FetchOptions::new().with_method(Method::POST).with_json(body)?;
        self.typed(path, options).await
    }

    /// Makes a PUT request to the specified path with a JSON body.
    pub async fn put<Req, Res>(&self, path: &str, body: &Req) -> Result<Reply<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let options = FetchOptions::new().with_method(Method::PUT).with_json(body)?;
        self.typed(path, options).await
    }

    /// Makes a PATCH request to the specified path with a JSON body.
    pub async fn patch<Req, Res>(&self, path: &str, body: &Req) -> Result<Reply<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let options = FetchOptions::new().with_method(Method::PATCH).with_json(body)?;
        self.typed(path, options).await
    }

    /// Makes a DELETE request to the specified path.
    pub async fn delete<Res>(&self, path: &str) -> Result<Reply<Res>>
    where
        Res: DeserializeOwned,
    {
        let options = FetchOptions::new().with_method(Method::DELETE);
        self.typed(path, options).await
    }

    /// Makes a HEAD request. Successful replies carry an empty string.
    pub async fn head(&self, path: &str) -> Result<Reply<Data>> {
        self.fetch(path, FetchOptions::new().with_method(Method::HEAD))
            .await
    }

    async fn typed<Res>(&self, path: &str, options: FetchOptions) -> Result<Reply<Res>>
    where
        Res: DeserializeOwned,
    {
        let Reply {
            data,
            error,
            status,
            headers,
            attempts,
        } = self.fetch(path, options).await?;

        Ok(Reply {
            data: data.map(Data::deserialize).transpose()?,
            error,
            status,
            headers,
            attempts,
        })
    }

    /// Runs a single attempt.
    async fn execute(&self, url: &str, options: FetchOptions, attempts: usize) -> Result<Attempt> {
        let Initialized {
            url,
            mut options,
            hooks,
        } = initialize_plugins(url, options).await?;

        let target = build_url(&url, &options)?;
        let method = resolve_method(&url, &options);

        if let Some(schema) = options.input.clone().filter(|_| options.validates()) {
            match options.body.take() {
                Some(Body::Json(value)) => {
                    options.body = Some(Body::Json(parse_with_schema(schema.as_ref(), value).await?));
                }
                Some(_) => {
                    return Err(Error::Validation {
                        issues: vec![Issue::new("request body is not JSON")],
                    })
                }
                None => {}
            }
        }

        let headers = build_headers(&options, options.body.as_ref()).await?;
        let body = options.body.clone().map(build_body).transpose()?;

        let signal = options
            .signal
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default();

        let request = RequestContext {
            method,
            url: target,
            headers,
            body,
            signal,
            duplex: options.duplex,
        };
        let mut request = run_on_request(&hooks, request).await?;

        if request.duplex.is_none() && request.body.as_ref().is_some_and(Body::is_stream) {
            request.duplex = Some(Duplex::Half);
        }

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            attempt = options.retry_attempt,
            "Executing HTTP request"
        );

        let start_time = Instant::now();
        let mut timeout = TimeoutGuard::arm(options.timeout, &request.signal);
        let sent = self.inner.transport.send(request.clone()).await;
        timeout.disarm();

        let response = match sent {
            Ok(response) => response,
            Err(TransportError::Aborted) if timeout.fired() => {
                tracing::warn!(url = %request.url, timeout = ?options.timeout, "Request timed out");
                return Err(Error::Timeout);
            }
            Err(TransportError::Aborted) => return Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attempt = options.retry_attempt,
                    method = %request.method,
                    url = %request.url,
                    "Request failed"
                );
                let context = ErrorContext {
                    response: None,
                    response_text: None,
                    request,
                    error: ErrorInfo::network(e),
                };
                return handle_error(context, &hooks, &options, None, attempts).await;
            }
        };

        let ResponseContext {
            mut response,
            request,
        } = run_on_response(&hooks, ResponseContext { response, request }).await?;

        tracing::info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis() as u64,
            attempts = attempts,
            "Received HTTP response"
        );

        if !response.ok() {
            let hook_response = clone_for_hooks(&response, &options)?;
            let text = response.text()?;
            let status = response.status();

            if status.is_client_error() {
                tracing::error!(status = status.as_u16(), response = %text, "Client error (4xx)");
            } else if status.is_server_error() {
                tracing::warn!(status = status.as_u16(), response = %text, "Server error (5xx)");
            }

            let parsed = serde_json::from_str::<Value>(&text).ok();
            let error = ErrorInfo::from_response(status, response.status_text(), parsed.as_ref());
            let throw_body = match parsed {
                Some(Value::Object(_)) => None,
                Some(other) => Some(other),
                None => Some(Value::String(text.clone())),
            };

            let context = ErrorContext {
                response: Some(hook_response.unwrap_or(response)),
                response_text: Some(text),
                request,
                error,
            };
            return handle_error(context, &hooks, &options, throw_body, attempts).await;
        }

        if request.method == Method::HEAD {
            let data = Data::Json(Value::String(String::new()));
            return Ok(Attempt::Done(Reply::success(data, &response, attempts)));
        }

        let response_type = options
            .response_type
            .unwrap_or_else(|| detect_response_type(response.headers()));
        let hook_response = clone_for_hooks(&response, &options)?;
        let data = decode(&mut response, response_type, &options)?;

        let data = match options.output.as_ref().filter(|_| options.validates()) {
            Some(schema) => match data {
                Data::Json(value) => Data::Json(parse_with_schema(schema.as_ref(), value).await?),
                _ => {
                    return Err(Error::Validation {
                        issues: vec![Issue::new("response data is not JSON")],
                    })
                }
            },
            None => data,
        };

        let reply = Reply::success(data.clone(), &response, attempts);
        let context = SuccessContext {
            data,
            response: hook_response.unwrap_or(response),
            request,
        };
        run_on_success(&hooks, &context).await?;

        Ok(Attempt::Done(reply))
    }
}

/// Routes an HTTP or network failure through `on_error` hooks, then decides
/// between retrying, raising and returning the error.
async fn handle_error(
    context: ErrorContext,
    hooks: &[Arc<dyn Hooks>],
    options: &FetchOptions,
    throw_body: Option<Value>,
    attempts: usize,
) -> Result<Attempt> {
    run_on_error(hooks, &context).await?;

    if let Some(retry) = &options.retry {
        let attempt = options.retry_attempt;
        if retry.should_attempt_retry(attempt, context.response.as_ref()) {
            if let Some(response) = context.response {
                let retry_context = ResponseContext {
                    response,
                    request: context.request,
                };
                run_on_retry(hooks, &retry_context).await?;
            }

            let delay = retry.delay(attempt);
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt = attempt,
                status = context.error.status,
                "Retrying request after delay"
            );
            pause(delay, options.signal.as_ref()).await?;

            return Ok(Attempt::Retry);
        }
    }

    let error = context.error;
    if options.throws() {
        return Err(Error::HttpError {
            status: error.status,
            status_text: error.status_text.clone(),
            body: throw_body.unwrap_or_else(|| error.to_value()),
        });
    }

    Ok(Attempt::Done(Reply::failure(
        error,
        context.response.as_ref(),
        attempts,
    )))
}

/// Sleeps for `delay`, returning early with [`Error::Cancelled`] if the
/// caller cancels.
async fn pause(delay: Duration, signal: Option<&CancellationToken>) -> Result<()> {
    let Some(signal) = signal else {
        tokio::time::sleep(delay).await;
        return Ok(());
    };

    tokio::select! {
        biased;
        _ = signal.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

fn clone_for_hooks(response: &FetchResponse, options: &FetchOptions) -> Result<Option<FetchResponse>> {
    if options.clones_response() {
        response.try_clone().map(Some)
    } else {
        Ok(None)
    }
}

fn decode(response: &mut FetchResponse, response_type: ResponseType, options: &FetchOptions) -> Result<Data> {
    Ok(match response_type {
        ResponseType::Json | ResponseType::Text => {
            let text = response.text()?;
            let value = match &options.json_parser {
                Some(parse) => parse(&text)?,
                None => default_json_parse(&text)?,
            };
            Data::Json(value)
        }
        ResponseType::Blob | ResponseType::ArrayBuffer => Data::Bytes(response.bytes()?),
        ResponseType::FormData => Data::Form(response.form_data()?),
    })
}

/// Builder for configuring and creating a [`Client`].
///
/// Everything set here becomes a default that call-site [`FetchOptions`]
/// are layered over.
///
/// # Examples
///
/// ```no_run
/// use fetchling::{Auth, Client, RetryPolicy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), fetchling::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .retry(RetryPolicy::linear(3, Duration::from_millis(500)).retry_on_status([502, 503]))
///     .auth(Auth::Bearer("secret-token".into()))
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    defaults: FetchOptions,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with no defaults.
    pub fn new() -> Self {
        Self {
            transport: None,
            defaults: FetchOptions::new(),
        }
    }

    /// Sets the base URL for relative paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.defaults = self.defaults.with_base_url(url)?;
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        self.defaults = self.defaults.with_header(name, value)?;
        Ok(self)
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.defaults = self.defaults.with_timeout(timeout);
        self
    }

    /// Sets the default retry policy.
    pub fn retry(mut self, retry: impl Into<RetryPolicy>) -> Self {
        self.defaults = self.defaults.with_retry(retry);
        self
    }

    /// Adds a hook that runs on every call, after plugin hooks and before
    /// call-site hooks.
    pub fn hook(mut self, hook: impl Hooks + 'static) -> Self {
        self.defaults = self.defaults.with_hook(hook);
        self
    }

    /// Adds a plugin applied to every call.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.defaults = self.defaults.with_plugin(plugin);
        self
    }

    /// Raises HTTP and network errors by default.
    pub fn throw_on_error(mut self, throw: bool) -> Self {
        self.defaults = self.defaults.throw_on_error(throw);
        self
    }

    /// Replaces the default text decoder.
    pub fn json_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&str) -> Result<Value> + Send + Sync + 'static,
    {
        self.defaults = self.defaults.with_json_parser(parser);
        self
    }

    /// Sets how the `Authorization` header is produced.
    pub fn auth(mut self, auth: Auth) -> Self {
        self.defaults = self.defaults.with_auth(auth);
        self
    }

    /// Replaces the `reqwest` transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the default transport cannot be built.
    pub fn build(self) -> Result<Client> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                defaults: self.defaults,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
