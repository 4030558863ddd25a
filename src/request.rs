//! Builders that turn resolved options into the parts of a request.

use crate::options::{Auth, FetchOptions, PathParams};
use crate::transport::Body;
use crate::{Error, Result};
use base64::Engine;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

const PREFIXED_METHODS: [(&str, Method); 5] = [
    ("get", Method::GET),
    ("post", Method::POST),
    ("put", Method::PUT),
    ("patch", Method::PATCH),
    ("delete", Method::DELETE),
];

/// Splits an `@method/` prefix off `url`.
///
/// Unknown prefixes are left in place.
fn split_method_prefix(url: &str) -> (Option<Method>, &str) {
    let Some(rest) = url.strip_prefix('@') else {
        return (None, url);
    };
    let name_len = rest.find('/').unwrap_or(rest.len());
    let lowered = rest[..name_len].to_ascii_lowercase();

    match PREFIXED_METHODS.iter().find(|(name, _)| *name == lowered) {
        Some((_, method)) => {
            // The remainder keeps its leading slash.
            let path = &rest[name_len..];
            (Some(method.clone()), if path.is_empty() { "/" } else { path })
        }
        None => (None, url),
    }
}

/// Chooses the HTTP method for a call.
///
/// An explicit method wins, then an `@method/` URL prefix; otherwise calls
/// with a body are `POST` and calls without one are `GET`.
///
/// # Examples
///
/// ```
/// use fetchling::{request::resolve_method, FetchOptions};
/// use http::Method;
///
/// assert_eq!(resolve_method("/users", &FetchOptions::new()), Method::GET);
/// assert_eq!(resolve_method("@put/users/1", &FetchOptions::new()), Method::PUT);
/// assert_eq!(resolve_method("/users", &FetchOptions::new().with_body("x")), Method::POST);
/// ```
pub fn resolve_method(url: &str, options: &FetchOptions) -> Method {
    if let Some(method) = &options.method {
        return method.clone();
    }
    if let (Some(method), _) = split_method_prefix(url) {
        return method;
    }
    if options.body.is_some() {
        Method::POST
    } else {
        Method::GET
    }
}

/// Computes the final URL: base URL, path with parameters substituted, and
/// the query string with option query parameters merged over any inline ones.
///
/// # Errors
///
/// Returns an error for relative URLs without a base URL, for path
/// parameters without a value, and for unparsable URLs.
///
/// # Examples
///
/// ```
/// use fetchling::{request::build_url, FetchOptions};
///
/// # fn example() -> Result<(), fetchling::Error> {
/// let options = FetchOptions::new()
///     .with_base_url("https://api.example.com/v1")?
///     .with_param("id", "42")
///     .with_query_param("expand", "profile");
///
/// let url = build_url("@get/users/:id?fields=name", &options)?;
/// assert_eq!(
///     url.as_str(),
///     "https://api.example.com/v1/users/42?fields=name&expand=profile"
/// );
/// # Ok(())
/// # }
/// ```
pub fn build_url(url: &str, options: &FetchOptions) -> Result<Url> {
    let (_, url) = split_method_prefix(url);
    let (path, inline_query) = match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    };
    let path = substitute_params(path, &options.params)?;

    let mut target = match Url::parse(&path) {
        Ok(absolute) if absolute.has_host() => absolute,
        _ => {
            let base = options.base_url.as_ref().ok_or_else(|| {
                Error::ConfigurationError(format!("relative URL `{}` requires a base URL", path))
            })?;
            let joined = format!(
                "{}/{}",
                base.as_str().trim_end_matches('/'),
                path.trim_start_matches('/')
            );
            Url::parse(&joined)?
        }
    };

    let mut pairs: Vec<(String, String)> = inline_query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    for (key, value) in &options.query {
        pairs.retain(|(k, _)| k != key);
        pairs.push((key.clone(), value.clone()));
    }

    if pairs.is_empty() {
        target.set_query(None);
    } else {
        target.query_pairs_mut().clear().extend_pairs(&pairs);
    }

    Ok(target)
}

fn substitute_params(path: &str, params: &PathParams) -> Result<String> {
    if matches!(params, PathParams::None) {
        return Ok(path.to_string());
    }

    let mut position = 0;
    let segments = path
        .split('/')
        .map(|segment| {
            let Some(name) = segment.strip_prefix(':').filter(|n| !n.is_empty()) else {
                return Ok(segment.to_string());
            };

            let value = match params {
                PathParams::Named(named) => named
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.as_str()),
                PathParams::Positional(values) => {
                    let value = values.get(position).map(String::as_str);
                    position += 1;
                    value
                }
                PathParams::None => None,
            };

            value.map(encode_segment).ok_or_else(|| {
                Error::ConfigurationError(format!("missing value for path parameter `:{}`", name))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(segments.join("/"))
}

fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Serializes structured bodies; text, bytes and streams pass through.
///
/// JSON becomes its string form and form fields become URL-encoded text.
pub fn build_body(body: Body) -> Result<Body> {
    Ok(match body {
        Body::Json(value) => Body::Text(
            serde_json::to_string(&value).map_err(|e| Error::SerializationFailed(e.to_string()))?,
        ),
        Body::Form(fields) => Body::Text(
            url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields)
                .finish(),
        ),
        other => other,
    })
}

/// Merges option headers with the `Authorization` header and a detected
/// `Content-Type`.
///
/// `body` is the body before [`build_body`], so its kind is still known.
/// Auth replaces any `Authorization` already present; the content type is
/// only added when none was set.
///
/// # Errors
///
/// Returns an error if a resolved credential is not a valid header value.
pub async fn build_headers(options: &FetchOptions, body: Option<&Body>) -> Result<HeaderMap> {
    let mut headers = options.headers.clone();

    if let Some(auth) = &options.auth {
        if let Some(value) = authorization(auth).await {
            let value = HeaderValue::try_from(value)
                .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
    }

    if !headers.contains_key(CONTENT_TYPE) {
        let detected = match body {
            Some(Body::Json(_)) => Some("application/json"),
            Some(Body::Form(_)) => Some("application/x-www-form-urlencoded"),
            Some(Body::Text(_)) => Some("text/plain;charset=UTF-8"),
            _ => None,
        };
        if let Some(content_type) = detected {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }

    Ok(headers)
}

async fn authorization(auth: &Auth) -> Option<String> {
    match auth {
        Auth::Bearer(token) => Some(format!("Bearer {}", token.resolve().await?)),
        Auth::Basic { username, password } => {
            let encoded = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", username, password));
            Some(format!("Basic {}", encoded))
        }
        Auth::Custom { prefix, value } => Some(format!("{} {}", prefix, value.resolve().await?)),
    }
}

/// A scheduled cancellation of one attempt.
///
/// Disarming is idempotent and also happens on drop, so the timer never
/// outlives the attempt.
pub struct TimeoutGuard {
    handle: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl TimeoutGuard {
    /// Cancels `signal` after `timeout`, if a timeout is set.
    pub fn arm(timeout: Option<Duration>, signal: &CancellationToken) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let handle = timeout.map(|timeout| {
            let signal = signal.clone();
            let fired = fired.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                fired.store(true, Ordering::SeqCst);
                signal.cancel();
            })
        });

        Self { handle, fired }
    }

    /// Stops the timer if it has not fired yet.
    pub fn disarm(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Returns `true` if the timer cancelled the attempt.
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Token;
    use serde_json::json;

    fn with_base() -> FetchOptions {
        FetchOptions::new()
            .with_base_url("https://api.example.com/v1/")
            .unwrap()
    }

    #[test]
    fn test_method_prefix() {
        assert_eq!(split_method_prefix("@post/users"), (Some(Method::POST), "/users"));
        assert_eq!(split_method_prefix("@DELETE/users/1"), (Some(Method::DELETE), "/users/1"));
        assert_eq!(split_method_prefix("@get"), (Some(Method::GET), "/"));
        assert_eq!(split_method_prefix("@teapot/brew"), (None, "@teapot/brew"));
        assert_eq!(split_method_prefix("/plain"), (None, "/plain"));
    }

    #[test]
    fn test_explicit_method_beats_prefix() {
        let options = FetchOptions::new().with_method(Method::PATCH);
        assert_eq!(resolve_method("@post/users", &options), Method::PATCH);
    }

    #[test]
    fn test_build_url_joins_base() {
        let url = build_url("/users/1", &with_base()).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/users/1");

        let url = build_url("users", &with_base()).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/users");
    }

    #[test]
    fn test_absolute_url_ignores_base() {
        let url = build_url("http://other.test/ping?x=1", &with_base()).unwrap();
        assert_eq!(url.as_str(), "http://other.test/ping?x=1");
    }

    #[test]
    fn test_relative_url_without_base_fails() {
        let result = build_url("/users", &FetchOptions::new());
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_named_and_positional_params() {
        let named = with_base()
            .with_param("org", "acme corp")
            .with_param("id", "7");
        let url = build_url("/orgs/:org/users/:id", &named).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/orgs/acme%20corp/users/7");

        let positional = with_base().with_positional_params(["acme", "7"]);
        let url = build_url("/orgs/:org/users/:id", &positional).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/orgs/acme/users/7");
    }

    #[test]
    fn test_missing_param_is_error() {
        let options = with_base().with_param("org", "acme");
        let result = build_url("/orgs/:org/users/:id", &options);
        assert!(matches!(result, Err(Error::ConfigurationError(msg)) if msg.contains(":id")));
    }

    #[test]
    fn test_query_merges_over_inline() {
        let options = with_base()
            .with_query_param("page", "2")
            .with_query_param("q", "a b");
        let url = build_url("/search?page=1&sort=asc", &options).unwrap();

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("sort".to_string(), "asc".to_string()),
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "a b".to_string()),
            ]
        );
    }

    #[test]
    fn test_build_body_serializes_structured_bodies() {
        let body = build_body(Body::Json(json!({"a": 1}))).unwrap();
        assert!(matches!(body, Body::Text(ref text) if text == r#"{"a":1}"#));

        let body = build_body(Body::Form(vec![("q".into(), "a b".into())])).unwrap();
        assert!(matches!(body, Body::Text(ref text) if text == "q=a+b"));
    }

    #[tokio::test]
    async fn test_headers_detect_content_type_and_auth() {
        let options = FetchOptions::new().with_auth(Auth::Bearer(Token::from("secret")));
        let body = Body::Json(json!({}));
        let headers = build_headers(&options, Some(&body)).await.unwrap();

        assert_eq!(headers[AUTHORIZATION], "Bearer secret");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_explicit_content_type_is_kept() {
        let options = FetchOptions::new()
            .with_header("content-type", "application/vnd.custom+json")
            .unwrap();
        let body = Body::Json(json!({}));
        let headers = build_headers(&options, Some(&body)).await.unwrap();

        assert_eq!(headers[CONTENT_TYPE], "application/vnd.custom+json");
    }

    #[tokio::test]
    async fn test_basic_and_absent_dynamic_auth() {
        let basic = FetchOptions::new().with_auth(Auth::Basic {
            username: "user".into(),
            password: "pass".into(),
        });
        let headers = build_headers(&basic, None).await.unwrap();
        assert_eq!(headers[AUTHORIZATION], "Basic dXNlcjpwYXNz");

        let absent = FetchOptions::new().with_auth(Auth::Bearer(Token::dynamic(|| async { None })));
        let headers = build_headers(&absent, None).await.unwrap();
        assert!(!headers.contains_key(AUTHORIZATION));
    }

    #[tokio::test]
    async fn test_timeout_guard_fires_and_disarms() {
        let signal = CancellationToken::new();
        let guard = TimeoutGuard::arm(Some(Duration::from_millis(10)), &signal);
        signal.cancelled().await;
        assert!(guard.fired());

        let signal = CancellationToken::new();
        let mut guard = TimeoutGuard::arm(Some(Duration::from_millis(10)), &signal);
        guard.disarm();
        guard.disarm();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!guard.fired());
        assert!(!signal.is_cancelled());
    }
}
