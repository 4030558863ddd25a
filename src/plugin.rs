//! Plugins bundle option rewriting and hooks into a reusable unit.
//!
//! Before every attempt, [`initialize_plugins`] gives each plugin a chance to
//! rewrite the URL and options, then collects the hook lists: plugin hooks in
//! plugin order, followed by the hooks carried in the options.

use crate::hooks::Hooks;
use crate::options::FetchOptions;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// What a plugin's `init` step returns.
#[derive(Debug)]
pub struct PluginInit {
    /// The URL to use from here on.
    pub url: String,
    /// Replacement options, or `None` to keep the current ones.
    pub options: Option<FetchOptions>,
}

impl PluginInit {
    /// Keeps the options, possibly rewriting the URL.
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: None,
        }
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// An extension that can rewrite calls and contribute hooks.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use fetchling::{FetchOptions, Plugin, PluginInit, Result};
///
/// /// Routes every call to version 2 of the API.
/// struct ApiV2;
///
/// #[async_trait]
/// impl Plugin for ApiV2 {
///     fn id(&self) -> &str {
///         "api-v2"
///     }
///
///     async fn init(&self, url: &str, options: &FetchOptions) -> Result<PluginInit> {
///         let options = options.clone().with_header("x-api-version", "2")?;
///         Ok(PluginInit::url(format!("/v2{}", url)).with_options(options))
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync {
    /// A unique identifier.
    fn id(&self) -> &str;

    /// A human-readable name. Defaults to the id.
    fn name(&self) -> &str {
        self.id()
    }

    /// Rewrites the URL and options before the request is built.
    ///
    /// An error aborts the call before any hook runs.
    async fn init(&self, url: &str, _options: &FetchOptions) -> Result<PluginInit> {
        Ok(PluginInit::url(url))
    }

    /// Hooks contributed by this plugin.
    fn hooks(&self) -> Option<Arc<dyn Hooks>> {
        None
    }
}

/// The resolved inputs of one attempt.
pub struct Initialized {
    /// The URL after every plugin's rewrite.
    pub url: String,
    /// The options after every plugin's rewrite.
    pub options: FetchOptions,
    /// All hooks, in the order they run.
    pub hooks: Vec<Arc<dyn Hooks>>,
}

/// Runs every plugin's `init` in order and aggregates hooks.
///
/// Each plugin sees the URL and options produced by the plugins before it.
/// The hooks carried in the options are captured before any plugin runs, so
/// a plugin replacing the options never drops them.
///
/// # Errors
///
/// Returns the first error raised by a plugin's `init`.
pub async fn initialize_plugins(url: &str, options: FetchOptions) -> Result<Initialized> {
    let plugins = options.plugins.clone();
    let call_site_hooks = options.hooks.clone();
    let mut url = url.to_string();
    let mut options = options;
    let mut hooks = Vec::new();

    for plugin in &plugins {
        let init = plugin.init(&url, &options).await.inspect_err(|e| {
            tracing::warn!(plugin = plugin.id(), error = %e, "Plugin initialization failed");
        })?;

        if init.url != url {
            tracing::debug!(plugin = plugin.id(), from = %url, to = %init.url, "Plugin rewrote URL");
        }
        url = init.url;
        if let Some(replacement) = init.options {
            options = replacement;
        }

        hooks.extend(plugin.hooks());
    }

    hooks.extend(call_site_hooks);

    Ok(Initialized { url, options, hooks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct Noop;

    #[async_trait]
    impl Hooks for Noop {}

    struct Prefix {
        id: &'static str,
        hooks: Arc<dyn Hooks>,
    }

    #[async_trait]
    impl Plugin for Prefix {
        fn id(&self) -> &str {
            self.id
        }

        async fn init(&self, url: &str, options: &FetchOptions) -> Result<PluginInit> {
            let options = options.clone().with_query_param(self.id, "1");
            Ok(PluginInit::url(format!("/{}{}", self.id, url)).with_options(options))
        }

        fn hooks(&self) -> Option<Arc<dyn Hooks>> {
            Some(self.hooks.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl Plugin for Broken {
        fn id(&self) -> &str {
            "broken"
        }

        async fn init(&self, _url: &str, _options: &FetchOptions) -> Result<PluginInit> {
            Err(Error::Plugin {
                plugin: "broken".to_string(),
                message: "missing credentials".to_string(),
            })
        }
    }

    fn same(a: &Arc<dyn Hooks>, b: &Arc<dyn Hooks>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
    }

    #[tokio::test]
    async fn test_plugins_apply_in_order_and_hooks_precede_call_site() {
        let first_hooks: Arc<dyn Hooks> = Arc::new(Noop);
        let second_hooks: Arc<dyn Hooks> = Arc::new(Noop);
        let call_site: Arc<dyn Hooks> = Arc::new(Noop);

        let mut options = FetchOptions::new()
            .with_plugin(Prefix {
                id: "a",
                hooks: first_hooks.clone(),
            })
            .with_plugin(Prefix {
                id: "b",
                hooks: second_hooks.clone(),
            });
        options.hooks.push(call_site.clone());

        let initialized = initialize_plugins("/users", options).await.unwrap();

        assert_eq!(initialized.url, "/b/a/users");
        assert_eq!(initialized.options.query.len(), 2);
        assert_eq!(initialized.hooks.len(), 3);
        assert!(same(&initialized.hooks[0], &first_hooks));
        assert!(same(&initialized.hooks[1], &second_hooks));
        assert!(same(&initialized.hooks[2], &call_site));
    }

    #[tokio::test]
    async fn test_plugin_init_failure_aborts() {
        let options = FetchOptions::new().with_plugin(Broken);
        let result = initialize_plugins("/users", options).await;

        assert!(matches!(result, Err(Error::Plugin { ref plugin, .. }) if plugin == "broken"));
    }

    struct Reset;

    #[async_trait]
    impl Plugin for Reset {
        fn id(&self) -> &str {
            "reset"
        }

        async fn init(&self, url: &str, _options: &FetchOptions) -> Result<PluginInit> {
            let options = FetchOptions::new().with_base_url("http://localhost:1")?;
            Ok(PluginInit::url(url).with_options(options))
        }
    }

    #[tokio::test]
    async fn test_replaced_options_keep_call_site_hooks() {
        let call_site: Arc<dyn Hooks> = Arc::new(Noop);
        let mut options = FetchOptions::new().with_plugin(Reset);
        options.hooks.push(call_site.clone());

        let initialized = initialize_plugins("/users", options).await.unwrap();

        assert!(initialized.options.hooks.is_empty());
        assert!(initialized.options.base_url.is_some());
        assert_eq!(initialized.hooks.len(), 1);
        assert!(same(&initialized.hooks[0], &call_site));
    }

    #[tokio::test]
    async fn test_without_plugins_keeps_call_site_hooks() {
        let options = FetchOptions::new().with_hook(Noop);
        let initialized = initialize_plugins("/users", options).await.unwrap();

        assert_eq!(initialized.url, "/users");
        assert_eq!(initialized.hooks.len(), 1);
    }
}
