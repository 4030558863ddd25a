//! A plugin that traces every stage of a call.

use crate::hooks::{ErrorContext, Hooks, ResponseContext, ResponseOverride, SuccessContext};
use crate::plugin::Plugin;
use crate::transport::RequestContext;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Emits a `tracing` event at every stage of a call.
///
/// Requests and successes log at `debug`, responses at `info`, errors at
/// `error` and retries at `warn`. Verbose mode adds request headers, decoded
/// data and error bodies.
///
/// # Examples
///
/// ```no_run
/// use fetchling::{plugins::LoggerPlugin, Client};
///
/// # fn example() -> Result<(), fetchling::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .plugin(LoggerPlugin::new().verbose(true))
///     .build()?;
/// # let _ = client;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LoggerPlugin {
    enabled: bool,
    hooks: Arc<LoggerHooks>,
}

#[derive(Debug)]
struct LoggerHooks {
    verbose: bool,
}

impl LoggerPlugin {
    /// Creates an enabled, non-verbose logger.
    pub fn new() -> Self {
        Self {
            enabled: true,
            hooks: Arc::new(LoggerHooks { verbose: false }),
        }
    }

    /// Turns the logger on or off.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Includes headers and bodies in the events.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.hooks = Arc::new(LoggerHooks { verbose });
        self
    }
}

impl Default for LoggerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for LoggerPlugin {
    fn id(&self) -> &str {
        "logger"
    }

    fn name(&self) -> &str {
        "Logger"
    }

    fn hooks(&self) -> Option<Arc<dyn Hooks>> {
        if self.enabled {
            Some(self.hooks.clone())
        } else {
            None
        }
    }
}

#[async_trait]
impl Hooks for LoggerHooks {
    async fn on_request(&self, ctx: &RequestContext) -> Result<Option<RequestContext>> {
        if self.verbose {
            tracing::debug!(method = %ctx.method, url = %ctx.url, headers = ?ctx.headers, "Request being sent");
        } else {
            tracing::debug!(method = %ctx.method, url = %ctx.url, "Request being sent");
        }
        Ok(None)
    }

    async fn on_response(&self, ctx: &ResponseContext) -> Result<Option<ResponseOverride>> {
        tracing::info!(
            method = %ctx.request.method,
            url = %ctx.request.url,
            status = ctx.response.status().as_u16(),
            "Response received"
        );
        Ok(None)
    }

    async fn on_success(&self, ctx: &SuccessContext) -> Result<()> {
        if self.verbose {
            tracing::debug!(url = %ctx.request.url, data = ?ctx.data, "Request succeeded");
        } else {
            tracing::debug!(url = %ctx.request.url, "Request succeeded");
        }
        Ok(())
    }

    async fn on_error(&self, ctx: &ErrorContext) -> Result<()> {
        if self.verbose {
            tracing::error!(
                url = %ctx.request.url,
                status = ctx.error.status,
                status_text = %ctx.error.status_text,
                response = ctx.response_text.as_deref().unwrap_or_default(),
                "Request failed"
            );
        } else {
            tracing::error!(
                url = %ctx.request.url,
                status = ctx.error.status,
                status_text = %ctx.error.status_text,
                "Request failed"
            );
        }
        Ok(())
    }

    async fn on_retry(&self, ctx: &ResponseContext) -> Result<()> {
        tracing::warn!(
            url = %ctx.request.url,
            status = ctx.response.status().as_u16(),
            "Retrying request"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_logger_contributes_no_hooks() {
        assert!(LoggerPlugin::new().hooks().is_some());
        assert!(LoggerPlugin::new().enabled(false).hooks().is_none());
    }

    #[tokio::test]
    async fn test_logger_hooks_never_replace_request() {
        let plugin = LoggerPlugin::new().verbose(true);
        let hooks = plugin.hooks().unwrap();
        let request = RequestContext::new(http::Method::GET, url::Url::parse("http://localhost/").unwrap());

        assert!(hooks.on_request(&request).await.unwrap().is_none());
    }
}
