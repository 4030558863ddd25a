//! Per-route methods and schemas.
//!
//! [`RoutesPlugin`] looks up each call by its URL and fills in the method and
//! schemas the call leaves unset.

use crate::options::FetchOptions;
use crate::plugin::{Plugin, PluginInit};
use crate::schema::Schema;
use crate::{Error, Result};
use async_trait::async_trait;
use http::Method;
use std::collections::HashMap;
use std::sync::Arc;

/// The method and schemas attached to one route.
#[derive(Clone, Default)]
pub struct Route {
    method: Option<Method>,
    input: Option<Arc<dyn Schema>>,
    output: Option<Arc<dyn Schema>>,
}

impl Route {
    /// Creates a route with no method or schemas.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the method used when the call does not set one.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the schema request bodies must satisfy.
    pub fn input(mut self, schema: impl Schema + 'static) -> Self {
        self.input = Some(Arc::new(schema));
        self
    }

    /// Sets the schema response data must satisfy.
    pub fn output(mut self, schema: impl Schema + 'static) -> Self {
        self.output = Some(Arc::new(schema));
        self
    }
}

/// Attaches methods and schemas to calls by route.
///
/// Routes are keyed by the URL as passed to the call, without its query
/// string, e.g. `/users/:id` or `@post/users`. Values set on the call win
/// over the route's. In strict mode, calls to unknown routes fail.
///
/// # Examples
///
/// ```
/// use fetchling::plugins::{Route, RoutesPlugin};
/// use fetchling::schema::SerdeSchema;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// let routes = RoutesPlugin::new()
///     .route("/users/:id", Route::new().output(SerdeSchema::<User>::new()))
///     .strict(true);
/// # let _ = routes;
/// ```
#[derive(Clone, Default)]
pub struct RoutesPlugin {
    routes: HashMap<String, Route>,
    strict: bool,
}

impl RoutesPlugin {
    /// Creates an empty, non-strict route table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a route.
    pub fn route(mut self, key: impl Into<String>, route: Route) -> Self {
        self.routes.insert(key.into(), route);
        self
    }

    /// Rejects calls to routes missing from the table.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

#[async_trait]
impl Plugin for RoutesPlugin {
    fn id(&self) -> &str {
        "routes"
    }

    fn name(&self) -> &str {
        "Route schemas"
    }

    async fn init(&self, url: &str, options: &FetchOptions) -> Result<PluginInit> {
        let key = url.split_once('?').map_or(url, |(path, _)| path);

        let Some(route) = self.routes.get(key) else {
            if self.strict {
                return Err(Error::Plugin {
                    plugin: self.id().to_string(),
                    message: format!("unknown route `{}`", key),
                });
            }
            return Ok(PluginInit::url(url));
        };

        let mut options = options.clone();
        if options.method.is_none() {
            options.method = route.method.clone();
        }
        if options.input.is_none() {
            options.input = route.input.clone();
        }
        if options.output.is_none() {
            options.output = route.output.clone();
        }

        Ok(PluginInit::url(url).with_options(options))
    }
}
