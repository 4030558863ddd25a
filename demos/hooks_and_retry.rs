//! Example demonstrating hooks, plugins, retries and cancellation.
//!
//! This example shows how to:
//! - Add a request hook that stamps every request
//! - Write a plugin that rewrites URLs and contributes hooks
//! - Retry failed responses with exponential backoff
//! - Cancel a call from another task
//!
//! Run with: `cargo run --example hooks_and_retry`

use async_trait::async_trait;
use fetchling::plugins::LoggerPlugin;
use fetchling::{
    Client, Error, ErrorContext, FetchOptions, Hooks, Plugin, PluginInit, RequestContext,
    ResponseContext, RetryPolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Adds an `x-request-id` header to every attempt.
struct RequestId {
    next: AtomicUsize,
}

#[async_trait]
impl Hooks for RequestId {
    async fn on_request(&self, ctx: &RequestContext) -> fetchling::Result<Option<RequestContext>> {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        let mut next = ctx.clone();
        next.headers.insert(
            "x-request-id",
            id.to_string()
                .parse()
                .map_err(|e| Error::Hook(format!("invalid request id: {}", e)))?,
        );
        Ok(Some(next))
    }
}

/// Counts failures and retries.
struct FailureCounter;

#[async_trait]
impl Hooks for FailureCounter {
    async fn on_error(&self, ctx: &ErrorContext) -> fetchling::Result<()> {
        println!("Attempt failed: {} {}", ctx.error.status, ctx.error.status_text);
        Ok(())
    }

    async fn on_retry(&self, ctx: &ResponseContext) -> fetchling::Result<()> {
        println!("Retrying {} after {}", ctx.request.url, ctx.response.status());
        Ok(())
    }
}

/// Routes every call through httpbin's `/anything` echo endpoint.
struct Echo {
    failures: Arc<FailureCounter>,
}

#[async_trait]
impl Plugin for Echo {
    fn id(&self) -> &str {
        "echo"
    }

    async fn init(&self, url: &str, _options: &FetchOptions) -> fetchling::Result<PluginInit> {
        Ok(PluginInit::url(format!("/anything{}", url)))
    }

    fn hooks(&self) -> Option<Arc<dyn Hooks>> {
        Some(self.failures.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("fetchling=info,hooks_and_retry=info")
        .init();

    let client = Client::builder()
        .base_url("https://httpbin.org")?
        .plugin(LoggerPlugin::new())
        .hook(RequestId {
            next: AtomicUsize::new(1),
        })
        .build()?;

    println!("=== Plugin Rewrites And Hooks ===");
    let echo = Echo {
        failures: Arc::new(FailureCounter),
    };
    let reply = client
        .fetch("/users/1", FetchOptions::new().with_plugin(echo))
        .await?;
    if let Some(data) = reply.data.as_ref().and_then(|d| d.as_json()) {
        println!("Echoed URL: {}", data["url"]);
        println!("Echoed request id: {}", data["headers"]["X-Request-Id"]);
    }
    println!();

    println!("=== Exponential Retry On 503 ===");
    let retry = RetryPolicy::exponential(3, Duration::from_millis(200), Duration::from_secs(2))
        .with_jitter(true)
        .retry_on_status([502, 503, 504]);
    let reply = client
        .fetch(
            "/status/503",
            FetchOptions::new()
                .with_retry(retry)
                .with_hook(FailureCounter),
        )
        .await?;
    println!(
        "Gave up after {} attempts with status {:?}",
        reply.attempts,
        reply.error.map(|e| e.status)
    );
    println!();

    println!("=== Cancellation ===");
    let signal = CancellationToken::new();
    let canceller = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });
    match client
        .fetch("/delay/5", FetchOptions::new().with_signal(signal))
        .await
    {
        Err(Error::Cancelled) => println!("Call was cancelled"),
        other => println!("Unexpected outcome: {:?}", other.map(|r| r.status)),
    }

    Ok(())
}
