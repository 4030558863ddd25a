//! Responses as seen by hooks, and the decoded reply returned to callers.
//!
//! [`FetchResponse`] is what the transport hands back. Its body is a
//! single-use resource: the first call to [`FetchResponse::bytes`] (or any
//! reader built on it) takes the body, and later reads fail with
//! [`Error::BodyUsed`]. Call [`FetchResponse::try_clone`] before the first
//! read when a second reader needs the body.
//!
//! [`Reply`] is the `{ data, error }` pair a call resolves to.

use crate::transport::TransportError;
use crate::{Error, Result};
use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

/// A response produced by a [`Transport`](crate::Transport).
#[derive(Debug)]
pub struct FetchResponse {
    status: StatusCode,
    status_text: String,
    headers: HeaderMap,
    url: Option<Url>,
    body: Option<Bytes>,
}

impl FetchResponse {
    /// Creates a response. The status text defaults to the canonical reason
    /// phrase of `status`.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            url: None,
            body: Some(body.into()),
        }
    }

    /// Overrides the status text.
    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    /// Records the final URL the response was served from.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// The HTTP status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The reason phrase.
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The URL the response was served from, when the transport knows it.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Returns `true` for 2xx statuses.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns `true` once the body has been read.
    pub fn body_used(&self) -> bool {
        self.body.is_none()
    }

    /// Takes the raw body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BodyUsed`] if the body was already read.
    pub fn bytes(&mut self) -> Result<Bytes> {
        self.body.take().ok_or(Error::BodyUsed)
    }

    /// Takes the body as text, replacing invalid UTF-8 sequences.
    pub fn text(&mut self) -> Result<String> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Takes the body and deserializes it as JSON.
    pub fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.bytes()?;
        serde_json::from_slice(&bytes).map_err(|e| Error::DeserializationFailed {
            raw_response: String::from_utf8_lossy(&bytes).into_owned(),
            serde_error: e.to_string(),
        })
    }

    /// Takes the body and decodes it as `application/x-www-form-urlencoded`.
    pub fn form_data(&mut self) -> Result<Vec<(String, String)>> {
        let bytes = self.bytes()?;
        Ok(url::form_urlencoded::parse(&bytes).into_owned().collect())
    }

    /// Returns an independent copy of the response, body included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BodyUsed`] if the body was already read.
    pub fn try_clone(&self) -> Result<Self> {
        let body = self.body.clone().ok_or(Error::BodyUsed)?;
        Ok(Self {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            url: self.url.clone(),
            body: Some(body),
        })
    }
}

/// How a successful response body is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Text decoded through the JSON parser.
    Json,
    /// Text decoded through the JSON parser; non-JSON text stays a string.
    Text,
    /// Raw bytes.
    Blob,
    /// Raw bytes.
    ArrayBuffer,
    /// URL-encoded form fields.
    FormData,
}

const TEXT_CONTENT_TYPES: [&str; 4] = [
    "image/svg",
    "application/xml",
    "application/xhtml",
    "application/html",
];

/// Chooses a decoding strategy from the `Content-Type` header.
///
/// A missing content type is treated as JSON, `application/json` and any
/// `application/*+json` as JSON, `text/*` and a few markup types as text,
/// and everything else as a blob.
///
/// # Examples
///
/// ```
/// use fetchling::{detect_response_type, ResponseType};
/// use http::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("content-type", "application/problem+json; charset=utf-8".parse().unwrap());
/// assert_eq!(detect_response_type(&headers), ResponseType::Json);
/// ```
pub fn detect_response_type(headers: &HeaderMap) -> ResponseType {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return ResponseType::Json;
    };

    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if is_json_essence(&essence) {
        ResponseType::Json
    } else if essence.starts_with("text/") || TEXT_CONTENT_TYPES.contains(&essence.as_str()) {
        ResponseType::Text
    } else {
        ResponseType::Blob
    }
}

fn is_json_essence(essence: &str) -> bool {
    let Some(subtype) = essence.strip_prefix("application/") else {
        return false;
    };
    subtype == "json"
        || subtype.strip_suffix("+json").is_some_and(|suffix| {
            suffix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "_!#$%&*.^`~-".contains(c))
        })
}

/// Converts response text into a JSON value.
pub type JsonParser = Arc<dyn Fn(&str) -> Result<Value> + Send + Sync>;

/// The default text decoder.
///
/// Blank text decodes to `null` and text that is not valid JSON is kept as a
/// JSON string, so decoding a successful response never fails here.
///
/// # Examples
///
/// ```
/// use fetchling::default_json_parse;
/// use serde_json::json;
///
/// assert_eq!(default_json_parse("").unwrap(), json!(null));
/// assert_eq!(default_json_parse("{\"id\":1}").unwrap(), json!({"id": 1}));
/// assert_eq!(default_json_parse("plain").unwrap(), json!("plain"));
/// ```
pub fn default_json_parse(text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

/// Decoded data of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// JSON and text responses.
    Json(Value),
    /// Blob and array-buffer responses.
    Bytes(Bytes),
    /// Form-data responses.
    Form(Vec<(String, String)>),
}

impl Data {
    /// Returns the JSON value, if this is JSON data.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Data::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Consumes the data, returning the JSON value if this is JSON data.
    pub fn into_json(self) -> Option<Value> {
        match self {
            Data::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the raw bytes, if this is binary data.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Data::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Deserializes JSON data into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] if the data is not JSON or
    /// does not match `T`.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        let value = match self {
            Data::Json(value) => value,
            other => {
                return Err(Error::DeserializationFailed {
                    raw_response: format!("{:?}", other),
                    serde_error: "response data is not JSON".to_string(),
                })
            }
        };
        let raw_response = value.to_string();
        serde_json::from_value(value).map_err(|e| Error::DeserializationFailed {
            raw_response,
            serde_error: e.to_string(),
        })
    }
}

/// The normalized error object of a failed call.
///
/// Serializes as the parsed error body with `status` and `statusText`
/// merged in, e.g. `{"message": "not found", "status": 404, "statusText": "Not Found"}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    /// The HTTP status code, `0` for network failures.
    pub status: u16,

    /// The reason phrase, `"Network Error"` for network failures.
    #[serde(rename = "statusText")]
    pub status_text: String,

    /// Fields of the JSON error body, or `message` for network failures.
    #[serde(flatten)]
    pub fields: Map<String, Value>,

    /// The transport failure behind a network error.
    #[serde(skip)]
    pub cause: Option<Arc<TransportError>>,
}

impl ErrorInfo {
    /// Builds the error object for a non-2xx response.
    ///
    /// Object bodies contribute their fields; any other body contributes
    /// nothing beyond the status.
    pub fn from_response(status: StatusCode, status_text: &str, body: Option<&Value>) -> Self {
        let mut fields = match body {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        fields.remove("status");
        fields.remove("statusText");

        Self {
            status: status.as_u16(),
            status_text: status_text.to_string(),
            fields,
            cause: None,
        }
    }

    /// Builds the error object for a transport failure.
    pub fn network(cause: TransportError) -> Self {
        let mut fields = Map::new();
        fields.insert("message".to_string(), Value::String(cause.to_string()));

        Self {
            status: 0,
            status_text: "Network Error".to_string(),
            fields,
            cause: Some(Arc::new(cause)),
        }
    }

    /// Returns the `message` field, if the error body had one.
    pub fn message(&self) -> Option<&str> {
        self.fields.get("message")?.as_str()
    }

    /// Returns an error body field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns `true` for network-level failures.
    pub fn is_network(&self) -> bool {
        self.status == 0
    }

    /// Renders the error object as JSON.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("status".to_string(), Value::from(self.status));
        map.insert(
            "statusText".to_string(),
            Value::String(self.status_text.clone()),
        );
        Value::Object(map)
    }
}

/// The result of a call: data on success, a normalized error otherwise.
///
/// Exactly one of `data` and `error` is set.
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
/// let reply = client.fetch("/users/1", FetchOptions::new()).await?;
/// match (reply.data, reply.error) {
///     (Some(data), _) => println!("User: {:?}", data),
///     (_, Some(error)) => println!("Failed with {}: {:?}", error.status, error.message()),
///     _ => unreachable!(),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Reply<T> {
    /// The decoded (and validated) data.
    pub data: Option<T>,

    /// The normalized error.
    pub error: Option<ErrorInfo>,

    /// The status of the final response, `None` after a network failure.
    pub status: Option<StatusCode>,

    /// The headers of the final response.
    pub headers: HeaderMap,

    /// The number of attempts made, `1` when no retry happened.
    pub attempts: usize,
}

impl<T> Reply<T> {
    pub(crate) fn success(data: T, response: &FetchResponse, attempts: usize) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: Some(response.status()),
            headers: response.headers().clone(),
            attempts,
        }
    }

    pub(crate) fn failure(error: ErrorInfo, response: Option<&FetchResponse>, attempts: usize) -> Self {
        Self {
            data: None,
            error: Some(error),
            status: response.map(FetchResponse::status),
            headers: response.map(|r| r.headers().clone()).unwrap_or_default(),
            attempts,
        }
    }

    /// Returns `true` if the call produced data.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Returns `true` if the call required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header of the final response by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Maps the data to a different type, preserving the metadata.
    pub fn map<U, F>(self, f: F) -> Reply<U>
    where
        F: FnOnce(T) -> U,
    {
        Reply {
            data: self.data.map(f),
            error: self.error,
            status: self.status,
            headers: self.headers,
            attempts: self.attempts,
        }
    }

    /// Converts the reply into a `Result`, raising the error as
    /// [`Error::HttpError`].
    pub fn into_result(self) -> Result<T> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(error)) => Err(Error::HttpError {
                status: error.status,
                status_text: error.status_text.clone(),
                body: error.to_value(),
            }),
            (None, None) => Err(Error::ConfigurationError(
                "reply carries neither data nor error".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde_json::json;

    fn headers_with(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[test]
    fn test_detect_response_type() {
        assert_eq!(detect_response_type(&HeaderMap::new()), ResponseType::Json);
        assert_eq!(
            detect_response_type(&headers_with("application/json; charset=utf-8")),
            ResponseType::Json
        );
        assert_eq!(
            detect_response_type(&headers_with("application/vnd.api+json")),
            ResponseType::Json
        );
        assert_eq!(
            detect_response_type(&headers_with("text/html")),
            ResponseType::Text
        );
        assert_eq!(
            detect_response_type(&headers_with("application/xml")),
            ResponseType::Text
        );
        assert_eq!(
            detect_response_type(&headers_with("image/png")),
            ResponseType::Blob
        );
        assert_eq!(
            detect_response_type(&headers_with("application/jsonp")),
            ResponseType::Blob
        );
    }

    #[test]
    fn test_body_is_single_use() {
        let mut response = FetchResponse::new(StatusCode::OK, HeaderMap::new(), "hello");
        let mut copy = response.try_clone().unwrap();

        assert_eq!(response.text().unwrap(), "hello");
        assert!(response.body_used());
        assert!(matches!(response.text(), Err(Error::BodyUsed)));
        assert!(matches!(response.try_clone(), Err(Error::BodyUsed)));
        assert_eq!(copy.text().unwrap(), "hello");
    }

    #[test]
    fn test_default_json_parse_never_fails() {
        assert_eq!(default_json_parse("").unwrap(), Value::Null);
        assert_eq!(default_json_parse("   \n").unwrap(), Value::Null);
        assert_eq!(default_json_parse("[1,2]").unwrap(), json!([1, 2]));
        assert_eq!(default_json_parse("<p>hi</p>").unwrap(), json!("<p>hi</p>"));
    }

    #[test]
    fn test_error_info_merges_status() {
        let body = json!({"message": "not found", "status": "ignored"});
        let info = ErrorInfo::from_response(StatusCode::NOT_FOUND, "Not Found", Some(&body));

        assert_eq!(info.message(), Some("not found"));
        assert_eq!(
            info.to_value(),
            json!({"message": "not found", "status": 404, "statusText": "Not Found"})
        );
        assert_eq!(serde_json::to_value(&info).unwrap(), info.to_value());
    }

    #[test]
    fn test_network_error_info() {
        let info = ErrorInfo::network(TransportError::Failed("connection refused".into()));

        assert!(info.is_network());
        assert_eq!(info.status_text, "Network Error");
        assert_eq!(info.message(), Some("connection refused"));
        assert!(info.cause.is_some());
    }

    #[test]
    fn test_reply_into_result() {
        let response = FetchResponse::new(StatusCode::OK, HeaderMap::new(), "");
        let reply = Reply::success(json!(1), &response, 1);
        assert_eq!(reply.into_result().unwrap(), json!(1));

        let info = ErrorInfo::from_response(StatusCode::BAD_GATEWAY, "Bad Gateway", None);
        let reply: Reply<Value> = Reply::failure(info, None, 3);
        assert!(reply.was_retried());
        match reply.into_result() {
            Err(Error::HttpError { status, body, .. }) => {
                assert_eq!(status, 502);
                assert_eq!(body["statusText"], "Bad Gateway");
            }
            other => panic!("Expected HttpError, got {:?}", other),
        }
    }

    #[test]
    fn test_data_deserialize() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct User {
            id: u32,
        }

        let user: User = Data::Json(json!({"id": 7})).deserialize().unwrap();
        assert_eq!(user, User { id: 7 });
        assert!(Data::Bytes(Bytes::from_static(b"x"))
            .deserialize::<User>()
            .is_err());
    }
}
