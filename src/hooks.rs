//! Lifecycle hooks and the contexts they observe.
//!
//! Hooks run strictly in registration order, one at a time: plugin hooks
//! first, then client defaults, then call-site hooks. `on_request` and
//! `on_response` may replace what later hooks and the pipeline see; the
//! other categories only observe.

use crate::response::{Data, ErrorInfo, FetchResponse};
use crate::transport::RequestContext;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A response paired with the request that produced it.
#[derive(Debug)]
pub struct ResponseContext {
    /// The working response.
    pub response: FetchResponse,
    /// The request as sent.
    pub request: RequestContext,
}

/// What an `on_response` hook may hand back.
#[derive(Debug)]
pub enum ResponseOverride {
    /// Replaces the working response.
    Response(FetchResponse),
    /// Replaces the working response with the context's response; the
    /// context's request is ignored.
    Context(ResponseContext),
}

impl ResponseOverride {
    fn into_response(self) -> FetchResponse {
        match self {
            ResponseOverride::Response(response) => response,
            ResponseOverride::Context(context) => context.response,
        }
    }
}

impl From<FetchResponse> for ResponseOverride {
    fn from(response: FetchResponse) -> Self {
        ResponseOverride::Response(response)
    }
}

impl From<ResponseContext> for ResponseOverride {
    fn from(context: ResponseContext) -> Self {
        ResponseOverride::Context(context)
    }
}

/// The outcome of a successful call, after validation.
#[derive(Debug)]
pub struct SuccessContext {
    /// The decoded, validated data.
    pub data: Data,
    /// The response. Its body has been read unless the call set
    /// [`FetchOptions::clone_response`](crate::FetchOptions::clone_response).
    pub response: FetchResponse,
    /// The request as sent.
    pub request: RequestContext,
}

/// A failed attempt.
///
/// Produced either by a non-2xx response or by a network failure, never both.
#[derive(Debug)]
pub struct ErrorContext {
    /// The failed response; `None` for network failures.
    pub response: Option<FetchResponse>,
    /// The raw body of the failed response.
    pub response_text: Option<String>,
    /// The request as sent.
    pub request: RequestContext,
    /// The normalized error.
    pub error: ErrorInfo,
}

/// Callbacks invoked at each stage of a call.
///
/// Every method defaults to doing nothing, so implementations only override
/// the stages they care about. An `Err` from any hook aborts the call with
/// that error.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use fetchling::{Hooks, RequestContext, Result};
///
/// struct RequestId;
///
/// #[async_trait]
/// impl Hooks for RequestId {
///     async fn on_request(&self, ctx: &RequestContext) -> Result<Option<RequestContext>> {
///         let mut next = ctx.clone();
///         next.headers.insert("x-request-id", "42".parse().unwrap());
///         Ok(Some(next))
///     }
/// }
/// ```
#[async_trait]
pub trait Hooks: Send + Sync {
    /// Called before the request is sent. Returning `Some` replaces the
    /// request context wholesale.
    async fn on_request(&self, _ctx: &RequestContext) -> Result<Option<RequestContext>> {
        Ok(None)
    }

    /// Called when the transport returns a response, before its status is
    /// inspected. Returning `Some` replaces the working response.
    async fn on_response(&self, _ctx: &ResponseContext) -> Result<Option<ResponseOverride>> {
        Ok(None)
    }

    /// Called after a successful response was decoded and validated.
    async fn on_success(&self, _ctx: &SuccessContext) -> Result<()> {
        Ok(())
    }

    /// Called for every HTTP or network error, whether or not a retry follows.
    async fn on_error(&self, _ctx: &ErrorContext) -> Result<()> {
        Ok(())
    }

    /// Called before waiting for a retry of a failed response.
    ///
    /// Not called when the failure was at the network level.
    async fn on_retry(&self, _ctx: &ResponseContext) -> Result<()> {
        Ok(())
    }
}

pub(crate) async fn run_on_request(
    hooks: &[Arc<dyn Hooks>],
    mut request: RequestContext,
) -> Result<RequestContext> {
    for hook in hooks {
        if let Some(replacement) = hook.on_request(&request).await? {
            request = replacement;
        }
    }
    Ok(request)
}

pub(crate) async fn run_on_response(
    hooks: &[Arc<dyn Hooks>],
    mut context: ResponseContext,
) -> Result<ResponseContext> {
    for hook in hooks {
        if let Some(replacement) = hook.on_response(&context).await? {
            context.response = replacement.into_response();
        }
    }
    Ok(context)
}

pub(crate) async fn run_on_success(hooks: &[Arc<dyn Hooks>], context: &SuccessContext) -> Result<()> {
    for hook in hooks {
        hook.on_success(context).await?;
    }
    Ok(())
}

pub(crate) async fn run_on_error(hooks: &[Arc<dyn Hooks>], context: &ErrorContext) -> Result<()> {
    for hook in hooks {
        hook.on_error(context).await?;
    }
    Ok(())
}

pub(crate) async fn run_on_retry(hooks: &[Arc<dyn Hooks>], context: &ResponseContext) -> Result<()> {
    for hook in hooks {
        hook.on_retry(context).await?;
    }
    Ok(())
}
