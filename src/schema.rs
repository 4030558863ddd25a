//! Pluggable validation for request bodies and response data.
//!
//! A [`Schema`] receives a decoded JSON value and either returns the
//! (possibly transformed) value or the list of [`Issue`]s that made it
//! invalid. Two adapters ship with the crate: [`SerdeSchema`] validates by
//! round-tripping through a serde type, and [`FnSchema`] wraps a closure.

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// A single validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Human-readable description of the problem.
    pub message: String,

    /// Location of the offending value, outermost key first.
    pub path: Vec<String>,
}

impl Issue {
    /// Creates an issue with no path.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
        }
    }

    /// Sets the location of the issue.
    pub fn at<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path = path.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path.join("."), self.message)
        }
    }
}

/// A validator for JSON values.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use fetchling::schema::{Issue, Schema};
/// use serde_json::Value;
///
/// struct NonEmptyArray;
///
/// #[async_trait]
/// impl Schema for NonEmptyArray {
///     async fn validate(&self, value: Value) -> Result<Value, Vec<Issue>> {
///         match &value {
///             Value::Array(items) if !items.is_empty() => Ok(value),
///             _ => Err(vec![Issue::new("expected a non-empty array")]),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Schema: Send + Sync {
    /// Validates `value`, returning the value to use downstream or the
    /// issues found.
    async fn validate(&self, value: Value) -> std::result::Result<Value, Vec<Issue>>;
}

/// Validates by deserializing into `T` and serializing back.
///
/// Fields unknown to `T` are dropped and serde defaults are filled in, so
/// the downstream value is the normalized form of `T`.
pub struct SerdeSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeSchema<T> {
    /// Creates a schema for `T`.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Schema for SerdeSchema<T>
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    async fn validate(&self, value: Value) -> std::result::Result<Value, Vec<Issue>> {
        let typed: T = serde_json::from_value(value).map_err(|e| vec![Issue::new(e.to_string())])?;
        serde_json::to_value(&typed).map_err(|e| vec![Issue::new(e.to_string())])
    }
}

/// Wraps a synchronous closure as a [`Schema`].
///
/// # Examples
///
/// ```
/// use fetchling::schema::{FnSchema, Issue};
/// use serde_json::Value;
///
/// let positive = FnSchema::new(|value: Value| match value.as_i64() {
///     Some(n) if n > 0 => Ok(value),
///     _ => Err(vec![Issue::new("expected a positive integer")]),
/// });
/// # let _ = positive;
/// ```
pub struct FnSchema<F> {
    validate: F,
}

impl<F> FnSchema<F>
where
    F: Fn(Value) -> std::result::Result<Value, Vec<Issue>> + Send + Sync,
{
    /// Creates a schema from `validate`.
    pub fn new(validate: F) -> Self {
        Self { validate }
    }
}

#[async_trait]
impl<F> Schema for FnSchema<F>
where
    F: Fn(Value) -> std::result::Result<Value, Vec<Issue>> + Send + Sync,
{
    async fn validate(&self, value: Value) -> std::result::Result<Value, Vec<Issue>> {
        (self.validate)(value)
    }
}

/// Runs `value` through `schema`, converting rejections into
/// [`Error::Validation`].
///
/// A schema that rejects without reporting any issue still fails the call.
pub async fn parse_with_schema(schema: &dyn Schema, value: Value) -> Result<Value> {
    match schema.validate(value).await {
        Ok(value) => Ok(value),
        Err(mut issues) => {
            if issues.is_empty() {
                issues.push(Issue::new("value rejected by schema"));
            }
            tracing::error!(issues = issues.len(), "Schema validation failed");
            Err(Error::Validation { issues })
        }
    }
}
