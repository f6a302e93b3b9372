//! [`Router`](crate::Router) is an ordered stack of middleware and routes.
//!
//! Every request walks the stack in registration order. Middleware layers
//! match path prefixes and see the request with the matched prefix stripped
//! from [`Conn::url`]; routes match whole paths and run the handlers
//! registered for the request method.
//!
//! ```rust
//! use junction::{sync_fn, Next, Router};
//!
//! let mut api = Router::new();
//! api.get("/users/:id", sync_fn(|conn| {
//!     let body = format!("user {}", conn.param("id").unwrap_or_default());
//!     Ok(conn.send(body))
//! }));
//!
//! let mut router = Router::new();
//! router
//!     .middleware("/", sync_fn(|_| Ok(Next::Continue)))
//!     .middleware("/api", api);
//! ```
//!
//! Parameter callbacks run before the first layer capturing a parameter, once
//! per request and distinct value:
//! ```rust
//! use junction::{sync_fn, sync_param_fn, Next, Router};
//!
//! let mut router = Router::new();
//! router
//!     .param("user", sync_param_fn(|conn, value, _| {
//!         let name = value.to_uppercase();
//!         conn.params_mut().set("user", name);
//!         Ok(Next::Continue)
//!     }))
//!     .get("/hello/:user", sync_fn(|conn| {
//!         let body = format!("Hello, {}", conn.param("user").unwrap_or_default());
//!         Ok(conn.send(body))
//!     }));
//! ```
use crate::conn::{pathname, protohost, Conn};
use crate::error::{Error, Result};
use crate::handler::{catch, BoxFuture, Callback, ErrorHandler, Handler, Next, ParamHandler, SyncBudget};
use crate::layer::{Layer, LayerKind};
use crate::params::Params;
use crate::pattern::PathMatch;
use crate::route::Route;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use hyper::header::{self, HeaderValue};
use hyper::Method;
use regex::Regex;
use serde::Deserialize;

/// Options fixed when a [`Router`] is created.
/// ```rust
/// use junction::RouterOptions;
///
/// let options: RouterOptions = serde_json::from_str(r#"{ "strict": true }"#).unwrap();
/// assert!(options.strict);
/// assert!(!options.case_sensitive);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterOptions {
    /// Treat `/Foo` and `/foo` as different paths.
    pub case_sensitive: bool,
    /// Treat `/foo` and `/foo/` as different paths.
    pub strict: bool,
    /// Keep the parameters captured by the parent router visible inside this
    /// one.
    pub merge_params: bool,
}

/// The argument of a legacy [`Router::param_arg`] call.
#[derive(Clone)]
pub enum ParamArg {
    Handler(Arc<dyn ParamHandler>),
    Pattern(Regex),
}

impl ParamArg {
    pub fn handler(handler: impl ParamHandler) -> Self {
        ParamArg::Handler(Arc::new(handler))
    }
}

impl fmt::Debug for ParamArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamArg::Handler(_) => f.write_str("Handler(..)"),
            ParamArg::Pattern(regex) => write!(f, "Pattern({})", regex.as_str()),
        }
    }
}

type ParamTransform = Box<dyn Fn(&str, &ParamArg) -> Option<ParamArg> + Send + Sync>;

/// Router dispatches requests through an ordered stack of layers.
pub struct Router {
    stack: Vec<Layer>,
    params: HashMap<String, Vec<Arc<dyn ParamHandler>>>,
    param_transforms: Vec<ParamTransform>,
    options: RouterOptions,
}

impl Router {
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            stack: Vec::new(),
            params: HashMap::new(),
            param_transforms: Vec::new(),
            options,
        }
    }

    /// Makes routes registered afterwards match paths case sensitively.
    pub fn case_sensitive(mut self) -> Self {
        self.options.case_sensitive = true;
        self
    }

    /// Makes routes registered afterwards reject a trailing slash their
    /// pattern doesn't have.
    pub fn strict(mut self) -> Self {
        self.options.strict = true;
        self
    }

    /// Merges the parameters captured by a parent router into this router's
    /// parameters. On a name clash this router's value wins.
    pub fn merge_params(mut self) -> Self {
        self.options.merge_params = true;
        self
    }

    /// The options routes are compiled with.
    pub fn config(&self) -> RouterOptions {
        self.options
    }

    /// Appends a middleware layer matching `path` and everything below it.
    ///
    /// While the handler runs, the matched prefix is moved from
    /// [`Conn::url`] to [`Conn::base_url`]. Mounting a sub-router is
    /// registering it as middleware:
    /// ```rust
    /// use junction::{sync_fn, Router};
    ///
    /// let mut admin = Router::new();
    /// admin.get("/users", sync_fn(|conn| {
    ///     assert_eq!(conn.url(), "/users");
    ///     assert_eq!(conn.base_url(), "/admin");
    ///     Ok(conn.send("admins"))
    /// }));
    ///
    /// let mut router = Router::new();
    /// router.middleware("/admin", admin);
    /// ```
    pub fn middleware(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.use_all(path, Some(Callback::handler(handler)))
    }

    /// Appends an error-handling layer matching `path` and everything below
    /// it. It only runs while an error is propagating.
    pub fn error_handler(&mut self, path: &str, handler: impl ErrorHandler) -> &mut Self {
        self.use_all(path, Some(Callback::error(handler)))
    }

    /// Appends one prefix-matching layer per callback.
    ///
    /// # Panics
    ///
    /// Panics if `callbacks` is empty.
    pub fn use_all(&mut self, path: &str, callbacks: impl IntoIterator<Item = Callback>) -> &mut Self {
        let before = self.stack.len();

        for callback in callbacks {
            tracing::debug!(path, handler = %callback.name(), "use");
            self.stack
                .push(Layer::middleware(path, self.options.case_sensitive, callback));
        }

        if self.stack.len() == before {
            panic!("use_all() requires at least one callback for '{}'", path);
        }

        self
    }

    /// Appends a route matching exactly `path` and returns it for method
    /// registration.
    pub fn route(&mut self, path: &str) -> &mut Route {
        self.stack.push(Layer::exact(
            path,
            self.options.case_sensitive,
            self.options.strict,
        ));

        match self.stack.last_mut().and_then(Layer::route_mut) {
            Some(route) => route,
            None => unreachable!("a route layer was just pushed"),
        }
    }

    /// Register a handler for `GET` requests
    pub fn get(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.route(path).get(handler);
        self
    }

    /// Register a handler for `HEAD` requests
    pub fn head(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.route(path).head(handler);
        self
    }

    /// Register a handler for `OPTIONS` requests
    pub fn options(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.route(path).options(handler);
        self
    }

    /// Register a handler for `POST` requests
    pub fn post(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.route(path).post(handler);
        self
    }

    /// Register a handler for `PUT` requests
    pub fn put(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.route(path).put(handler);
        self
    }

    /// Register a handler for `PATCH` requests
    pub fn patch(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.route(path).patch(handler);
        self
    }

    /// Register a handler for `DELETE` requests
    pub fn delete(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.route(path).delete(handler);
        self
    }

    /// Register a handler for every method.
    pub fn all(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.route(path).all(handler);
        self
    }

    /// Registers a callback for the route parameter `name`.
    ///
    /// Callbacks run in registration order before the handler of the first
    /// layer capturing `name`, and are not run again for the same value
    /// during the same request. A callback returning [`Next::SkipRoute`]
    /// skips that layer; an error skips to the next error handler.
    pub fn param(&mut self, name: &str, handler: impl ParamHandler) -> &mut Self {
        self.param_arg(name, ParamArg::handler(handler))
    }

    /// Registers a param callback given in one of the legacy forms. The
    /// transforms added with [`param_transform`](Router::param_transform) are
    /// applied in order; the result must be a handler.
    ///
    /// # Panics
    ///
    /// Panics if the argument is not a handler once transformed.
    pub fn param_arg(&mut self, name: &str, mut arg: ParamArg) -> &mut Self {
        let name = match name.strip_prefix(':') {
            Some(stripped) => {
                tracing::warn!(
                    "router.param({:?}, ..) is deprecated: use router.param({:?}, ..) instead",
                    name,
                    stripped
                );
                stripped
            }
            None => name,
        };

        for transform in &self.param_transforms {
            if let Some(transformed) = transform(name, &arg) {
                arg = transformed;
            }
        }

        match arg {
            ParamArg::Handler(handler) => {
                self.params.entry(name.to_owned()).or_default().push(handler);
            }
            arg => panic!("invalid param() call for {}, got {:?}", name, arg),
        }

        self
    }

    /// Adds a transform applied to the arguments of later
    /// [`param_arg`](Router::param_arg) calls. The first transform returning
    /// `Some` replaces the argument seen by the following ones.
    #[deprecated(note = "use path parameters with `Router::param` instead")]
    pub fn param_transform<F>(&mut self, transform: F) -> &mut Self
    where
        F: Fn(&str, &ParamArg) -> Option<ParamArg> + Send + Sync + 'static,
    {
        tracing::warn!("router.param(fn) is deprecated: refactor to use path params");
        self.param_transforms.push(Box::new(transform));
        self
    }

    /// Runs `conn` through the stack.
    ///
    /// Returns [`Next::Done`] if a handler finished the response,
    /// [`Next::Error`] if an error reached the end of the stack unhandled, and
    /// [`Next::Continue`] otherwise. `url`, `base_url` and the params of
    /// `conn` are the same on return as they were on entry.
    pub async fn handle(&self, conn: &mut Conn) -> Next {
        let parent_params = conn.params.clone();
        let mut dispatch = Dispatch::new(conn);

        tracing::debug!(method = %conn.method(), url = %conn.url, "dispatching");
        let next = self.run(conn, &mut dispatch, &parent_params).await;

        dispatch.restore(conn);
        conn.base_url = dispatch.parent_url;
        conn.params = parent_params;

        match next {
            Next::Continue if *conn.method() == Method::OPTIONS && !dispatch.options.is_empty() => {
                send_options(conn, &dispatch.options)
            }
            next => next,
        }
    }

    async fn run(&self, conn: &mut Conn, dispatch: &mut Dispatch, parent_params: &Params) -> Next {
        let mut idx = 0;
        let mut layer_error: Option<Error> = None;
        let mut called: HashMap<String, ParamCall> = HashMap::new();
        let mut budget = SyncBudget::default();

        loop {
            dispatch.restore(conn);

            if idx >= self.stack.len() {
                return pending(layer_error);
            }

            let path = match pathname(&conn.url) {
                Some(path) => path.to_owned(),
                None => return pending(layer_error),
            };

            let mut found = None;
            while idx < self.stack.len() {
                let layer = &self.stack[idx];
                idx += 1;

                let matched = match layer.matches(&path) {
                    Ok(Some(matched)) => matched,
                    Ok(None) => continue,
                    Err(err) => {
                        layer_error.get_or_insert(err);
                        continue;
                    }
                };

                if let Some(route) = layer.route() {
                    if layer_error.is_some() {
                        continue;
                    }

                    let method = conn.method();
                    let handles = route.handles_method(method);
                    if !handles && *method == Method::OPTIONS {
                        dispatch.append_methods(route.supported_methods());
                    }
                    if !handles && *method != Method::HEAD {
                        continue;
                    }
                }

                found = Some((layer, matched));
                break;
            }

            let (layer, PathMatch { path: layer_path, params }) = match found {
                Some(found) => found,
                None => return pending(layer_error),
            };

            if let Some(route) = layer.route() {
                conn.route = Some(route.path().to_owned());
            }

            conn.params = if self.options.merge_params {
                params.merged_over(parent_params)
            } else {
                params
            };

            let next = match self.process_params(layer, &mut called, conn, &mut budget).await {
                Next::Continue => match layer.kind() {
                    LayerKind::Route(route) => budget.run(Box::pin(route.dispatch(conn))).await,
                    LayerKind::Middleware(callback) => {
                        if dispatch.trim_prefix(conn, &layer_path, &path) {
                            tracing::debug!(layer = %layer.path(), handler = %callback.name(), "dispatching");
                            budget.run(callback.invoke(layer_error.take(), conn)).await
                        } else {
                            pending(layer_error.take())
                        }
                    }
                },
                Next::Error(err) => Next::Error(layer_error.take().unwrap_or(err)),
                Next::SkipRoute => pending(layer_error.take()),
                Next::SkipRouter => match layer_error.take() {
                    Some(err) => Next::Error(err),
                    None => Next::SkipRouter,
                },
                Next::Done => Next::Done,
            };

            match next {
                Next::Continue | Next::SkipRoute => layer_error = None,
                Next::Error(err) => layer_error = Some(err),
                Next::SkipRouter => return Next::Continue,
                Next::Done => return Next::Done,
            }
        }
    }

    /// Runs the param callbacks for the parameters `layer` captured.
    async fn process_params(
        &self,
        layer: &Layer,
        called: &mut HashMap<String, ParamCall>,
        conn: &mut Conn,
        budget: &mut SyncBudget,
    ) -> Next {
        if self.params.is_empty() {
            return Next::Continue;
        }

        for key in layer.keys() {
            let name = key.to_string();

            let value = match conn.params.get_key(key) {
                Some(value) => value.to_owned(),
                None => continue,
            };

            let callbacks = match self.params.get(&name) {
                Some(callbacks) => callbacks,
                None => continue,
            };

            if let Some(call) = called.get(&name) {
                let replay = matches!(&call.result, Some(next) if !matches!(next, Next::SkipRoute));
                if call.matched == value || replay {
                    conn.params.insert(key.clone(), call.value.clone());
                    match &call.result {
                        Some(next) => return next.clone(),
                        None => continue,
                    }
                }
            }

            let mut call = ParamCall {
                matched: value.clone(),
                value: value.clone(),
                result: None,
            };

            for callback in callbacks {
                tracing::debug!(param = %name, value = %value, "param callback");
                let next = budget.run(catch(|| callback.call(conn, &value, &name))).await;
                call.value = conn.params.get_key(key).unwrap_or_default().to_owned();

                if !matches!(next, Next::Continue) {
                    call.result = Some(next.clone());
                    called.insert(name, call);
                    return next;
                }
            }

            called.insert(name, call);
        }

        Next::Continue
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("stack", &self.stack)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

/// A router mounted inside another one.
impl Handler for Router {
    fn call<'a>(&'a self, conn: &'a mut Conn) -> BoxFuture<'a, Result> {
        Box::pin(async move { Ok(self.handle(conn).await) })
    }
}

/// The cached outcome of the param callbacks for one parameter name.
#[derive(Debug)]
struct ParamCall {
    matched: String,
    value: String,
    result: Option<Next>,
}

/// State of one request's walk through a router.
struct Dispatch {
    protohost: String,
    parent_url: String,
    removed: String,
    slash_added: bool,
    options: Vec<String>,
}

impl Dispatch {
    fn new(conn: &Conn) -> Self {
        Self {
            protohost: protohost(&conn.url).unwrap_or_default().to_owned(),
            parent_url: conn.base_url.clone(),
            removed: String::new(),
            slash_added: false,
            options: Vec::new(),
        }
    }

    /// Strips the prefix matched by a middleware layer from the url. Returns
    /// false when the prefix doesn't end on a segment boundary.
    fn trim_prefix(&mut self, conn: &mut Conn, layer_path: &str, path: &str) -> bool {
        if layer_path.is_empty() {
            return true;
        }

        if !path.starts_with(layer_path) {
            return false;
        }
        if let Some(c) = path[layer_path.len()..].chars().next() {
            if c != '/' && c != '.' {
                return false;
            }
        }

        let rest = conn
            .url
            .get(self.protohost.len() + layer_path.len()..)
            .unwrap_or_default();
        conn.url = format!("{}{}", self.protohost, rest);

        if self.protohost.is_empty() && !conn.url.starts_with('/') {
            conn.url.insert(0, '/');
            self.slash_added = true;
        }

        self.removed = layer_path.to_owned();
        conn.base_url = format!(
            "{}{}",
            self.parent_url,
            layer_path.strip_suffix('/').unwrap_or(layer_path)
        );

        true
    }

    /// Puts back what [`trim_prefix`](Dispatch::trim_prefix) removed.
    fn restore(&mut self, conn: &mut Conn) {
        if self.slash_added {
            if conn.url.starts_with('/') {
                conn.url.remove(0);
            }
            self.slash_added = false;
        }

        if !self.removed.is_empty() {
            let rest = conn.url.get(self.protohost.len()..).unwrap_or_default();
            conn.url = format!("{}{}{}", self.protohost, self.removed, rest);
            conn.base_url = self.parent_url.clone();
            self.removed.clear();
        }
    }

    fn append_methods(&mut self, methods: Vec<String>) {
        for method in methods {
            if !self.options.contains(&method) {
                self.options.push(method);
            }
        }
    }
}

fn pending(err: Option<Error>) -> Next {
    match err {
        Some(err) => Next::Error(err),
        None => Next::Continue,
    }
}

/// Answers an `OPTIONS` request no route handled with the methods the
/// matching routes support.
fn send_options(conn: &mut Conn, methods: &[String]) -> Next {
    let body = methods.join(",");

    let allow = match HeaderValue::from_str(&body) {
        Ok(allow) => allow,
        Err(err) => return Next::Error(Error::new(err)),
    };

    conn.set_header(header::ALLOW, allow).set_header(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    conn.send(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{sync_fn, sync_param_fn};

    use hyper::{Body, Request};

    fn conn(uri: &str) -> Conn {
        Conn::new(Request::get(uri).body(Body::empty()).unwrap())
    }

    #[tokio::test]
    async fn trims_absolute_form_targets() {
        let mut router = Router::new();
        router.middleware(
            "/api",
            sync_fn(|conn| {
                assert_eq!(conn.url(), "http://example.com/ping?x=1");
                assert_eq!(conn.base_url(), "/api");
                Ok(conn.send("pong"))
            }),
        );

        let mut conn = conn("http://example.com/api/ping?x=1");
        assert!(matches!(router.handle(&mut conn).await, Next::Done));
        assert_eq!(conn.url(), "http://example.com/api/ping?x=1");
        assert_eq!(conn.base_url(), "");
    }

    #[tokio::test]
    async fn adds_and_removes_a_leading_slash() {
        let mut router = Router::new();
        router.middleware(
            "/api",
            sync_fn(|conn| {
                assert_eq!(conn.url(), "/?q=1");
                Ok(Next::Continue)
            }),
        );

        let mut conn = conn("/api?q=1");
        assert!(matches!(router.handle(&mut conn).await, Next::Continue));
        assert_eq!(conn.url(), "/api?q=1");
    }

    #[tokio::test]
    async fn param_errors_skip_the_layer() {
        let mut router = Router::new();
        router
            .param(
                "id",
                sync_param_fn(|_, value, _| match value {
                    "bad" => Err(Error::new("bad id")),
                    _ => Ok(Next::Continue),
                }),
            )
            .middleware("/:id", sync_fn(|_| Ok(Next::Continue)))
            .get("/:id", sync_fn(|conn| Ok(conn.send("unreachable"))));

        let mut conn = conn("/bad");
        match router.handle(&mut conn).await {
            Next::Error(err) => assert_eq!(err.to_string(), "bad id"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!conn.is_sent());
    }

    #[test]
    #[should_panic(expected = "invalid param() call for id")]
    fn param_patterns_need_a_transform() {
        let mut router = Router::new();
        router.param_arg("id", ParamArg::Pattern(Regex::new("^\\d+$").unwrap()));
    }

    #[test]
    #[should_panic(expected = "requires at least one callback")]
    fn use_all_requires_callbacks() {
        Router::new().use_all("/", Vec::new());
    }

    #[test]
    fn options_from_json() {
        let options: RouterOptions =
            serde_json::from_str(r#"{ "case_sensitive": true, "merge_params": true }"#).unwrap();
        let router = Router::with_options(options);
        assert!(router.config().case_sensitive);
        assert!(router.config().merge_params);
        assert!(!router.config().strict);
    }
}
