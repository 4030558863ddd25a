//! Per-call configuration.

use crate::hooks::Hooks;
use crate::plugin::Plugin;
use crate::response::{JsonParser, ResponseType};
use crate::retry::RetryPolicy;
use crate::schema::Schema;
use crate::transport::{Body, Duplex};
use crate::{Error, Result};
use futures_util::future::BoxFuture;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A credential that may need to be fetched right before each attempt.
#[derive(Clone)]
pub enum Token {
    /// A fixed value.
    Static(String),
    /// Resolved on every attempt; `None` sends no `Authorization` header.
    Dynamic(Arc<dyn Fn() -> BoxFuture<'static, Option<String>> + Send + Sync>),
}

impl Token {
    /// Creates a token resolved by `resolve` on every attempt.
    ///
    /// # Examples
    ///
    /// ```
    /// use fetchling::Token;
    ///
    /// let token = Token::dynamic(|| async { std::env::var("API_TOKEN").ok() });
    /// # let _ = token;
    /// ```
    pub fn dynamic<F, Fut>(resolve: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        Token::Dynamic(Arc::new(move || -> BoxFuture<'static, Option<String>> {
            Box::pin(resolve())
        }))
    }

    pub(crate) async fn resolve(&self) -> Option<String> {
        match self {
            Token::Static(value) => Some(value.clone()),
            Token::Dynamic(resolve) => resolve().await,
        }
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token::Static(value.to_string())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Token::Static(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Static(_) => f.write_str("Token::Static(..)"),
            Token::Dynamic(_) => f.write_str("Token::Dynamic(..)"),
        }
    }
}

/// How the `Authorization` header is produced.
#[derive(Debug, Clone)]
pub enum Auth {
    /// `Authorization: Bearer <token>`
    Bearer(Token),
    /// `Authorization: Basic <base64(username:password)>`
    Basic {
        /// The user name.
        username: String,
        /// The password.
        password: String,
    },
    /// `Authorization: <prefix> <value>`
    Custom {
        /// The scheme name.
        prefix: String,
        /// The credential.
        value: Token,
    },
}

/// Values substituted into `:name` path segments.
#[derive(Debug, Clone, Default)]
pub enum PathParams {
    /// No substitution.
    #[default]
    None,
    /// Substituted by name.
    Named(Vec<(String, String)>),
    /// Substituted in order of appearance.
    Positional(Vec<String>),
}

/// Configuration for a single call.
///
/// Options are chainable; fields are public so plugins can rewrite them.
///
/// # Examples
///
/// ```
/// use fetchling::{FetchOptions, RetryPolicy};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), fetchling::Error> {
/// let options = FetchOptions::new()
///     .with_param("id", "42")
///     .with_query_param("expand", "profile")
///     .with_header("x-request-id", "abc123")?
///     .with_timeout(Duration::from_secs(5))
///     .with_retry(RetryPolicy::linear(2, Duration::from_millis(250)));
/// # let _ = options;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct FetchOptions {
    /// The HTTP method; inferred when unset.
    pub method: Option<Method>,
    /// Request headers.
    pub headers: HeaderMap,
    /// The request body.
    pub body: Option<Body>,
    /// Query parameters, merged over any query in the URL.
    pub query: Vec<(String, String)>,
    /// Path parameter values.
    pub params: PathParams,
    /// Base for relative URLs.
    pub base_url: Option<Url>,
    /// Authorization header source.
    pub auth: Option<Auth>,
    /// Validates successful response data.
    pub output: Option<Arc<dyn Schema>>,
    /// Validates JSON request bodies.
    pub input: Option<Arc<dyn Schema>>,
    /// Cancels an attempt that has not settled in time.
    pub timeout: Option<Duration>,
    /// Caller cancellation.
    pub signal: Option<CancellationToken>,
    /// Raise HTTP and network errors instead of returning them in the reply.
    /// Unset falls back to the client default, then `false`.
    pub throw: Option<bool>,
    /// Retry policy for HTTP and network errors.
    pub retry: Option<RetryPolicy>,
    /// The 0-indexed attempt this call starts at.
    pub retry_attempt: usize,
    /// Skip input and output schemas. Unset falls back to the client default.
    pub disable_validation: Option<bool>,
    /// Lifecycle hooks, run after plugin hooks.
    pub hooks: Vec<Arc<dyn Hooks>>,
    /// Plugins, initialized in order.
    pub plugins: Vec<Arc<dyn Plugin>>,
    /// Replaces the default text decoder.
    pub json_parser: Option<JsonParser>,
    /// Overrides content-type based decoding.
    pub response_type: Option<ResponseType>,
    /// Give success and error hooks a copy of the response with its body intact.
    /// Unset falls back to the client default.
    pub clone_response: Option<bool>,
    /// Explicit duplex mode.
    pub duplex: Option<Duplex>,
}

impl FetchOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets a header, replacing any value with the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets several headers at once, replacing existing values per name and
    /// keeping every value of a multi-valued header.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `body` as the JSON request body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be represented as JSON.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        self.body = Some(Body::Json(value));
        Ok(self)
    }

    /// Sets a URL-encoded form body.
    pub fn with_form(
        mut self,
        fields: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.body = Some(Body::Form(fields));
        self
    }

    /// Sets a query parameter, replacing earlier values for the same key.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.query.retain(|(k, _)| *k != key);
        self.query.push((key, value.into()));
        self
    }

    /// Sets several query parameters.
    pub fn with_query_params(
        self,
        params: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        params
            .into_iter()
            .fold(self, |options, (k, v)| options.with_query_param(k, v))
    }

    /// Sets the value for the `:name` path segment.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let mut named = match std::mem::take(&mut self.params) {
            PathParams::Named(named) => named,
            _ => Vec::new(),
        };
        named.retain(|(k, _)| *k != name);
        named.push((name, value.into()));
        self.params = PathParams::Named(named);
        self
    }

    /// Sets path parameter values by position.
    pub fn with_positional_params(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.params = PathParams::Positional(values.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the base URL for relative paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets how the `Authorization` header is produced.
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets the schema successful response data must satisfy.
    pub fn with_output(mut self, schema: impl Schema + 'static) -> Self {
        self.output = Some(Arc::new(schema));
        self
    }

    /// Sets the schema JSON request bodies must satisfy.
    pub fn with_input(mut self, schema: impl Schema + 'static) -> Self {
        self.input = Some(Arc::new(schema));
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the caller's cancellation token.
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Raises HTTP and network errors as [`Error::HttpError`].
    pub fn throw_on_error(mut self, throw: bool) -> Self {
        self.throw = Some(throw);
        self
    }

    /// Sets the retry policy. A bare number is a linear policy without delay.
    pub fn with_retry(mut self, retry: impl Into<RetryPolicy>) -> Self {
        self.retry = Some(retry.into());
        self
    }

    /// Skips input and output schemas.
    pub fn without_validation(mut self) -> Self {
        self.disable_validation = Some(true);
        self
    }

    /// Appends a lifecycle hook.
    pub fn with_hook(mut self, hook: impl Hooks + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Appends a plugin.
    pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Replaces the default text decoder.
    pub fn with_json_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&str) -> Result<Value> + Send + Sync + 'static,
    {
        self.json_parser = Some(Arc::new(parser));
        self
    }

    /// Decodes successful bodies as `response_type` regardless of content type.
    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    /// Hands success and error hooks a clone of the response taken before
    /// the body is read.
    pub fn clone_response(mut self, clone: bool) -> Self {
        self.clone_response = Some(clone);
        self
    }

    /// Whether HTTP and network errors are raised.
    pub fn throws(&self) -> bool {
        self.throw.unwrap_or(false)
    }

    /// Whether input and output schemas run.
    pub fn validates(&self) -> bool {
        !self.disable_validation.unwrap_or(false)
    }

    /// Whether hooks receive an unread copy of the response.
    pub fn clones_response(&self) -> bool {
        self.clone_response.unwrap_or(false)
    }

    /// Sets the duplex mode explicitly.
    pub fn with_duplex(mut self, duplex: Duplex) -> Self {
        self.duplex = Some(duplex);
        self
    }

    /// Layers these call-site options over client defaults.
    ///
    /// Call-site values win, including flags explicitly set to `false`.
    /// Headers merge by name, keeping every value of a call-site header.
    /// Query parameters, hooks and plugins are concatenated defaults-first.
    pub(crate) fn merged_over(self, defaults: &FetchOptions) -> FetchOptions {
        let mut headers = defaults.headers.clone();
        headers.extend(self.headers);

        let mut query = defaults.query.clone();
        for (key, value) in self.query {
            query.retain(|(k, _)| *k != key);
            query.push((key, value));
        }

        let params = match self.params {
            PathParams::None => defaults.params.clone(),
            params => params,
        };

        FetchOptions {
            method: self.method.or_else(|| defaults.method.clone()),
            headers,
            body: self.body.or_else(|| defaults.body.clone()),
            query,
            params,
            base_url: self.base_url.or_else(|| defaults.base_url.clone()),
            auth: self.auth.or_else(|| defaults.auth.clone()),
            output: self.output.or_else(|| defaults.output.clone()),
            input: self.input.or_else(|| defaults.input.clone()),
            timeout: self.timeout.or(defaults.timeout),
            signal: self.signal.or_else(|| defaults.signal.clone()),
            throw: self.throw.or(defaults.throw),
            retry: self.retry.or_else(|| defaults.retry.clone()),
            retry_attempt: self.retry_attempt,
            disable_validation: self.disable_validation.or(defaults.disable_validation),
            hooks: defaults.hooks.iter().cloned().chain(self.hooks).collect(),
            plugins: defaults.plugins.iter().cloned().chain(self.plugins).collect(),
            json_parser: self.json_parser.or_else(|| defaults.json_parser.clone()),
            response_type: self.response_type.or(defaults.response_type),
            clone_response: self.clone_response.or(defaults.clone_response),
            duplex: self.duplex.or(defaults.duplex),
        }
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("query", &self.query)
            .field("params", &self.params)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("auth", &self.auth)
            .field("output", &self.output.is_some())
            .field("input", &self.input.is_some())
            .field("timeout", &self.timeout)
            .field("throw", &self.throw)
            .field("retry", &self.retry)
            .field("retry_attempt", &self.retry_attempt)
            .field("disable_validation", &self.disable_validation)
            .field("hooks", &self.hooks.len())
            .field("plugins", &self.plugins.len())
            .field("response_type", &self.response_type)
            .field("clone_response", &self.clone_response)
            .field("duplex", &self.duplex)
            .finish_non_exhaustive()
    }
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::try_from(name)
        .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
    let value = HeaderValue::try_from(value)
        .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_case_insensitive_last_write_wins() {
        let options = FetchOptions::new()
            .with_header("X-Trace", "one")
            .unwrap()
            .with_header("x-trace", "two")
            .unwrap();

        assert_eq!(options.headers.len(), 1);
        assert_eq!(options.headers["x-trace"], "two");
    }

    #[test]
    fn test_invalid_header_is_configuration_error() {
        let result = FetchOptions::new().with_header("bad header", "x");
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_query_param_replaces_same_key() {
        let options = FetchOptions::new()
            .with_query_param("page", "1")
            .with_query_params([("limit", "10"), ("page", "2")]);

        assert_eq!(
            options.query,
            vec![
                ("limit".to_string(), "10".to_string()),
                ("page".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn test_merge_prefers_call_site() {
        let defaults = FetchOptions::new()
            .with_header("accept", "application/json")
            .unwrap()
            .with_header("x-client", "default")
            .unwrap()
            .with_query_param("v", "1")
            .with_timeout(Duration::from_secs(30))
            .throw_on_error(true);

        let merged = FetchOptions::new()
            .with_header("x-client", "call")
            .unwrap()
            .with_query_param("page", "3")
            .with_timeout(Duration::from_secs(1))
            .merged_over(&defaults);

        assert_eq!(merged.headers["accept"], "application/json");
        assert_eq!(merged.headers["x-client"], "call");
        assert_eq!(merged.query.len(), 2);
        assert_eq!(merged.timeout, Some(Duration::from_secs(1)));
        assert!(merged.throws());
    }

    #[test]
    fn test_merge_call_site_can_clear_default_flags() {
        let defaults = FetchOptions::new()
            .throw_on_error(true)
            .without_validation()
            .clone_response(true);

        let merged = FetchOptions::new()
            .throw_on_error(false)
            .clone_response(false)
            .merged_over(&defaults);
        assert!(!merged.throws());
        assert!(!merged.clones_response());
        assert!(!merged.validates());

        let mut call = FetchOptions::new();
        call.disable_validation = Some(false);
        assert!(call.merged_over(&defaults).validates());

        let unset = FetchOptions::new().merged_over(&FetchOptions::new());
        assert!(!unset.throws());
        assert!(unset.validates());
        assert!(!unset.clones_response());
    }

    #[test]
    fn test_multi_valued_headers_survive_merge() {
        let mut call_headers = HeaderMap::new();
        call_headers.append("accept", HeaderValue::from_static("application/json"));
        call_headers.append("accept", HeaderValue::from_static("text/plain"));

        let options = FetchOptions::new().with_headers(call_headers);
        assert_eq!(options.headers.get_all("accept").iter().count(), 2);

        let defaults = FetchOptions::new()
            .with_header("accept", "*/*")
            .unwrap()
            .with_header("x-client", "default")
            .unwrap();
        let merged = options.merged_over(&defaults);

        let accept: Vec<_> = merged.headers.get_all("accept").iter().collect();
        assert_eq!(accept, vec!["application/json", "text/plain"]);
        assert_eq!(merged.headers["x-client"], "default");
    }

    #[test]
    fn test_with_param_replaces_same_name() {
        let options = FetchOptions::new()
            .with_param("id", "1")
            .with_param("id", "2");

        match options.params {
            PathParams::Named(named) => assert_eq!(named, vec![("id".to_string(), "2".to_string())]),
            other => panic!("Expected named params, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dynamic_token_resolves_each_time() {
        let token = Token::dynamic(|| async { Some("fresh".to_string()) });
        assert_eq!(token.resolve().await.as_deref(), Some("fresh"));
        assert_eq!(Token::from("fixed").resolve().await.as_deref(), Some("fixed"));
    }
}
