//! [`Application`](crate::Application) wraps a lazily built [`Router`] with
//! settings, sub-application mounting and a default final response.
use crate::conn::Conn;
use crate::error::Result;
use crate::finalhandler;
use crate::handler::{BoxFuture, Callback, ErrorHandler, Handler, Next, ParamHandler};
use crate::route::Route;
use crate::router::{ParamArg, Router, RouterOptions};
use crate::settings::Settings;

use std::borrow::Cow;
use std::sync::Arc;

use futures_util::future;
use hyper::header::HeaderValue;
use hyper::{Body, Request, Response};
use parking_lot::RwLock;
use serde_json::Value;

const TRUST_PROXY: &str = "trust proxy";

/// An application: a router plus the settings it is configured with.
///
/// The router is created on the first registration call, using the
/// `case sensitive routing` and `strict routing` settings in effect then.
/// ```rust
/// use junction::{sync_fn, Application};
///
/// let mut app = Application::new();
/// app.enable("strict routing");
/// app.get("/", sync_fn(|conn| Ok(conn.send("Hello, World!"))));
///
/// assert!(app.enabled("x-powered-by"));
/// assert_eq!(app.setting("env"), Some("development".into()));
/// ```
#[derive(Debug)]
pub struct Application {
    settings: Arc<Settings>,
    mount: Arc<MountPoint>,
    router: Option<Router>,
}

/// Where an application is mounted, shared with the applications mounted
/// inside it.
#[derive(Debug)]
struct MountPoint {
    path: RwLock<String>,
    parent: RwLock<Option<Arc<MountPoint>>>,
}

impl MountPoint {
    fn full_path(&self) -> String {
        match &*self.parent.read() {
            Some(parent) => {
                let mut path = parent.full_path();
                path.push_str(&self.path.read());
                path
            }
            None => String::new(),
        }
    }
}

impl Application {
    pub fn new() -> Self {
        let settings = Settings::new();
        settings.set("x-powered-by", true);
        settings.set("etag", "weak");
        settings.set("env", "development");
        settings.set("query parser", "extended");
        settings.set("subdomain offset", 2);
        settings.set_default(TRUST_PROXY, false);
        settings.set("jsonp callback name", "callback");

        tracing::debug!("booting in development mode");

        Self {
            settings: Arc::new(settings),
            mount: Arc::new(MountPoint {
                path: RwLock::new(String::from("/")),
                parent: RwLock::new(None),
            }),
            router: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Assigns a setting.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        tracing::debug!(key, "set");
        self.settings.set(key, value);
        self
    }

    /// Looks a setting up, falling back to the applications this one is
    /// mounted in.
    pub fn setting(&self, key: &str) -> Option<Value> {
        self.settings.get(key)
    }

    pub fn enable(&mut self, key: &str) -> &mut Self {
        self.set(key, true)
    }

    pub fn disable(&mut self, key: &str) -> &mut Self {
        self.set(key, false)
    }

    pub fn enabled(&self, key: &str) -> bool {
        self.settings.enabled(key)
    }

    pub fn disabled(&self, key: &str) -> bool {
        self.settings.disabled(key)
    }

    /// The path this application was mounted at, `/` if it isn't mounted.
    pub fn mountpath(&self) -> String {
        self.mount.path.read().clone()
    }

    /// The full path of the application: the mount paths of every application
    /// it is mounted in, joined. Empty for the top-level application.
    /// ```rust
    /// use junction::Application;
    ///
    /// let blog = Application::new();
    /// let mut admin = Application::new();
    /// let mut app = Application::new();
    ///
    /// let blog_paths = blog.path_handle();
    /// admin.mount("/blog", blog);
    /// app.mount("/admin", admin);
    ///
    /// assert_eq!(blog_paths(), "/admin/blog");
    /// ```
    pub fn path(&self) -> String {
        self.mount.full_path()
    }

    /// Returns a function computing [`path`](Application::path), usable after
    /// the application has been moved into a parent by
    /// [`mount`](Application::mount).
    pub fn path_handle(&self) -> impl Fn() -> String + Send + Sync + 'static {
        let mount = Arc::clone(&self.mount);
        move || mount.full_path()
    }

    /// The router, if any route or middleware was registered.
    pub fn router(&self) -> Option<&Router> {
        self.router.as_ref()
    }

    fn lazy_router(&mut self) -> &mut Router {
        if self.router.is_none() {
            let options = RouterOptions {
                case_sensitive: self.enabled("case sensitive routing"),
                strict: self.enabled("strict routing"),
                merge_params: false,
            };

            let mut router = Router::with_options(options);
            router.middleware(
                "/",
                Init {
                    settings: Arc::clone(&self.settings),
                },
            );
            self.router = Some(router);
        }

        match self.router.as_mut() {
            Some(router) => router,
            None => unreachable!("the router was just created"),
        }
    }

    pub fn middleware(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.lazy_router().middleware(path, handler);
        self
    }

    pub fn error_handler(&mut self, path: &str, handler: impl ErrorHandler) -> &mut Self {
        self.lazy_router().error_handler(path, handler);
        self
    }

    /// Appends one middleware layer per callback, see [`Router::use_all`].
    pub fn use_all(&mut self, path: &str, callbacks: impl IntoIterator<Item = Callback>) -> &mut Self {
        self.lazy_router().use_all(path, callbacks);
        self
    }

    pub fn route(&mut self, path: &str) -> &mut Route {
        self.lazy_router().route(path)
    }

    pub fn param(&mut self, name: &str, handler: impl ParamHandler) -> &mut Self {
        self.lazy_router().param(name, handler);
        self
    }

    pub fn param_arg(&mut self, name: &str, arg: ParamArg) -> &mut Self {
        self.lazy_router().param_arg(name, arg);
        self
    }

    #[deprecated(note = "use path parameters with `Application::param` instead")]
    #[allow(deprecated)]
    pub fn param_transform<F>(&mut self, transform: F) -> &mut Self
    where
        F: Fn(&str, &ParamArg) -> Option<ParamArg> + Send + Sync + 'static,
    {
        self.lazy_router().param_transform(transform);
        self
    }

    /// Register a handler for `GET` requests
    pub fn get(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.lazy_router().get(path, handler);
        self
    }

    /// Register a handler for `HEAD` requests
    pub fn head(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.lazy_router().head(path, handler);
        self
    }

    /// Register a handler for `OPTIONS` requests
    pub fn options(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.lazy_router().options(path, handler);
        self
    }

    /// Register a handler for `POST` requests
    pub fn post(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.lazy_router().post(path, handler);
        self
    }

    /// Register a handler for `PUT` requests
    pub fn put(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.lazy_router().put(path, handler);
        self
    }

    /// Register a handler for `PATCH` requests
    pub fn patch(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.lazy_router().patch(path, handler);
        self
    }

    /// Register a handler for `DELETE` requests
    pub fn delete(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.lazy_router().delete(path, handler);
        self
    }

    /// Register a handler for every method.
    pub fn all(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.lazy_router().all(path, handler);
        self
    }

    /// Mounts `child` at `path`.
    ///
    /// The child sees requests below `path` with the prefix stripped. Its
    /// settings fall back to this application's for keys it never set;
    /// `trust proxy` is inherited too unless the child changed it.
    pub fn mount(&mut self, path: &str, child: Application) -> &mut Self {
        tracing::debug!(path, "mounting application");

        *child.mount.path.write() = path.to_owned();
        *child.mount.parent.write() = Some(Arc::clone(&self.mount));

        if child.settings.is_default(TRUST_PROXY) {
            child.settings.remove(TRUST_PROXY);
        }
        child.settings.set_parent(Arc::clone(&self.settings));

        self.middleware(
            path,
            Mounted {
                path: path.to_owned(),
                router: child.router,
            },
        )
    }

    /// Runs `conn` through the application. When no handler finished the
    /// response, a `404` or error page is written.
    pub async fn handle(&self, conn: &mut Conn) {
        let next = match &self.router {
            Some(router) => router.handle(conn).await,
            None => {
                tracing::debug!("no routes defined on app");
                Next::Continue
            }
        };

        let env = match self.setting("env") {
            Some(Value::String(env)) => env,
            _ => String::new(),
        };
        finalhandler::finish(conn, next, &env);
    }

    /// Serves a single request.
    /// ```rust
    /// use junction::{sync_fn, Application};
    /// use hyper::{Body, Request, StatusCode};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let mut app = Application::new();
    /// app.get("/", sync_fn(|conn| Ok(conn.send("home"))));
    ///
    /// let res = app.serve(Request::get("/").body(Body::empty()).unwrap()).await;
    /// assert_eq!(res.status(), StatusCode::OK);
    ///
    /// let res = app.serve(Request::get("/nope").body(Body::empty()).unwrap()).await;
    /// assert_eq!(res.status(), StatusCode::NOT_FOUND);
    /// # }
    /// ```
    pub async fn serve(&self, req: Request<Body>) -> Response<Body> {
        let mut conn = Conn::new(req);
        self.handle(&mut conn).await;
        conn.into_response()
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

/// The first layer of every application router.
struct Init {
    settings: Arc<Settings>,
}

impl Handler for Init {
    fn call<'a>(&'a self, conn: &'a mut Conn) -> BoxFuture<'a, Result> {
        if self.settings.enabled("x-powered-by") {
            conn.set_header("x-powered-by", HeaderValue::from_static("Junction"));
        }
        Box::pin(future::ready(Ok(Next::Continue)))
    }

    fn name(&self) -> Cow<'static, str> {
        "init".into()
    }
}

/// A sub-application registered with [`Application::mount`].
struct Mounted {
    path: String,
    router: Option<Router>,
}

impl Handler for Mounted {
    fn call<'a>(&'a self, conn: &'a mut Conn) -> BoxFuture<'a, Result> {
        match &self.router {
            Some(router) => Box::pin(async move { Ok(router.handle(conn).await) }),
            None => Box::pin(future::ready(Ok(Next::Continue))),
        }
    }

    fn name(&self) -> Cow<'static, str> {
        format!("mounted app {}", self.path).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{sync_fn, sync_param_fn};
    use serde_json::json;

    #[test]
    fn default_settings() {
        let app = Application::new();
        assert_eq!(app.setting("etag"), Some(json!("weak")));
        assert_eq!(app.setting("subdomain offset"), Some(json!(2)));
        assert_eq!(app.setting("jsonp callback name"), Some(json!("callback")));
        assert_eq!(app.setting("trust proxy"), Some(json!(false)));
        assert!(app.settings().is_default("trust proxy"));
        assert!(app.router().is_none());
        assert_eq!(app.mountpath(), "/");
        assert_eq!(app.path(), "");
    }

    #[test]
    fn router_reads_routing_settings_once() {
        let mut app = Application::new();
        app.enable("case sensitive routing");
        app.get("/", sync_fn(|_| Ok(Next::Continue)));
        app.enable("strict routing");

        let options = app.router().map(Router::config).unwrap();
        assert!(options.case_sensitive);
        assert!(!options.strict);
    }

    fn tag(name: &'static str) -> Callback {
        Callback::handler(sync_fn(move |conn| {
            conn.set_header(name, HeaderValue::from_static("1"));
            Ok(Next::Continue)
        }))
    }

    #[tokio::test]
    async fn proxies_reach_the_router() {
        let mut app = Application::new();
        app.use_all("/items", vec![tag("x-first"), tag("x-second")]);

        #[allow(deprecated)]
        app.param_transform(|_, arg| match arg {
            ParamArg::Pattern(regex) => {
                let regex = regex.clone();
                Some(ParamArg::handler(sync_param_fn(move |_, value, _| {
                    if regex.is_match(value) {
                        Ok(Next::Continue)
                    } else {
                        Ok(Next::SkipRoute)
                    }
                })))
            }
            ParamArg::Handler(_) => None,
        });
        app.param_arg("id", ParamArg::Pattern(regex::Regex::new("^\\d+$").unwrap()));
        app.get("/items/:id", sync_fn(|conn| Ok(conn.send("item"))));

        let res = app.serve(Request::get("/items/12").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), hyper::StatusCode::OK);
        assert_eq!(res.headers()["x-first"], "1");
        assert_eq!(res.headers()["x-second"], "1");

        let res = app.serve(Request::get("/items/abc").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), hyper::StatusCode::NOT_FOUND);
    }

    #[test]
    fn mounting_links_settings() {
        let mut parent = Application::new();
        parent.set("trust proxy", true).set("title", "parent");

        let mut changed = Application::new();
        changed.set("trust proxy", "loopback");
        let changed_settings = Arc::clone(&changed.settings);

        let child = Application::new();
        let child_settings = Arc::clone(&child.settings);

        parent.mount("/child", child).mount("/changed", changed);

        assert_eq!(child_settings.get("trust proxy"), Some(json!(true)));
        assert_eq!(child_settings.get("title"), Some(json!("parent")));
        assert_eq!(changed_settings.get("trust proxy"), Some(json!("loopback")));

        parent.set("title", "renamed");
        assert_eq!(child_settings.get("title"), Some(json!("renamed")));
    }
}
