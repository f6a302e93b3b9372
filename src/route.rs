use crate::conn::Conn;
use crate::error::Error;
use crate::handler::{Callback, ErrorHandler, Handler, Next, SyncBudget};

use hyper::Method;

/// The handlers registered at one exact path, tagged with the method they
/// answer.
///
/// A route is created with [`Router::route`](crate::Router::route), which
/// returns it for chained registration:
/// ```rust
/// use junction::{sync_fn, Router};
///
/// let mut router = Router::new();
/// router
///     .route("/book")
///     .get(sync_fn(|conn| Ok(conn.send("a book"))))
///     .post(sync_fn(|conn| Ok(conn.send("added"))));
/// ```
#[derive(Debug)]
pub struct Route {
    path: String,
    endpoints: Vec<(Option<Method>, Callback)>,
    methods: Vec<Method>,
    all: bool,
}

impl Route {
    pub(crate) fn new(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            endpoints: Vec::new(),
            methods: Vec::new(),
            all: false,
        }
    }

    /// The path this route was created for.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Appends a callback answering `method`, or every method when `None`.
    pub fn add(&mut self, method: Option<Method>, callback: Callback) -> &mut Self {
        tracing::debug!(path = %self.path, method = ?method, "route endpoint");

        match &method {
            Some(method) if !self.methods.contains(method) => self.methods.push(method.clone()),
            Some(_) => {}
            None => self.all = true,
        }

        self.endpoints.push((method, callback));
        self
    }

    /// Register a handler for every method.
    pub fn all(&mut self, handler: impl Handler) -> &mut Self {
        self.add(None, Callback::handler(handler))
    }

    /// Register an error handler for errors raised by earlier handlers of
    /// this route.
    pub fn error_handler(&mut self, method: Option<Method>, handler: impl ErrorHandler) -> &mut Self {
        self.add(method, Callback::error(handler))
    }

    pub fn method(&mut self, method: Method, handler: impl Handler) -> &mut Self {
        self.add(Some(method), Callback::handler(handler))
    }

    /// Register a handler for `GET` requests
    pub fn get(&mut self, handler: impl Handler) -> &mut Self {
        self.method(Method::GET, handler)
    }

    /// Register a handler for `HEAD` requests
    pub fn head(&mut self, handler: impl Handler) -> &mut Self {
        self.method(Method::HEAD, handler)
    }

    /// Register a handler for `OPTIONS` requests
    pub fn options(&mut self, handler: impl Handler) -> &mut Self {
        self.method(Method::OPTIONS, handler)
    }

    /// Register a handler for `POST` requests
    pub fn post(&mut self, handler: impl Handler) -> &mut Self {
        self.method(Method::POST, handler)
    }

    /// Register a handler for `PUT` requests
    pub fn put(&mut self, handler: impl Handler) -> &mut Self {
        self.method(Method::PUT, handler)
    }

    /// Register a handler for `PATCH` requests
    pub fn patch(&mut self, handler: impl Handler) -> &mut Self {
        self.method(Method::PATCH, handler)
    }

    /// Register a handler for `DELETE` requests
    pub fn delete(&mut self, handler: impl Handler) -> &mut Self {
        self.method(Method::DELETE, handler)
    }

    /// Whether the route answers `method`. `HEAD` is answered by `GET`
    /// handlers unless the route has its own.
    pub fn handles_method(&self, method: &Method) -> bool {
        if self.all {
            return true;
        }

        if *method == Method::HEAD && !self.methods.contains(&Method::HEAD) {
            return self.methods.contains(&Method::GET);
        }

        self.methods.contains(method)
    }

    /// The methods this route answers, uppercased, in registration order.
    /// ```rust
    /// use junction::{sync_fn, Next, Router};
    ///
    /// let mut router = Router::new();
    /// let route = router
    ///     .route("/")
    ///     .get(sync_fn(|_| Ok(Next::Continue)))
    ///     .post(sync_fn(|_| Ok(Next::Continue)));
    ///
    /// assert_eq!(route.supported_methods(), ["GET", "POST", "HEAD"]);
    /// ```
    pub fn supported_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self
            .methods
            .iter()
            .map(|method| method.as_str().to_ascii_uppercase())
            .collect();

        if self.methods.contains(&Method::GET) && !self.methods.contains(&Method::HEAD) {
            methods.push(String::from("HEAD"));
        }

        methods
    }

    /// Runs the handlers answering the request method, in registration order.
    ///
    /// Returns [`Next::Continue`] when the route ran out of handlers or one of
    /// them skipped the route, the pending error if one was left unhandled,
    /// and passes [`Next::SkipRouter`] and [`Next::Done`] through.
    pub(crate) async fn dispatch(&self, conn: &mut Conn) -> Next {
        if self.endpoints.is_empty() {
            return Next::Continue;
        }

        let mut method = conn.method().clone();
        if method == Method::HEAD && !self.methods.contains(&Method::HEAD) {
            method = Method::GET;
        }

        conn.route = Some(self.path.clone());

        let mut budget = SyncBudget::default();
        let mut err: Option<Error> = None;

        for (endpoint, callback) in &self.endpoints {
            if matches!(endpoint, Some(m) if *m != method) {
                continue;
            }

            tracing::debug!(route = %self.path, handler = %callback.name(), "dispatching");
            match budget.run(callback.invoke(err.take(), conn)).await {
                Next::Continue => {}
                Next::Error(e) => err = Some(e),
                Next::SkipRoute => return Next::Continue,
                Next::SkipRouter => return Next::SkipRouter,
                Next::Done => return Next::Done,
            }
        }

        match err {
            Some(err) => Next::Error(err),
            None => Next::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{sync_error_fn, sync_fn};
    use crate::params::Params;

    use hyper::{Body, Request};

    fn conn(method: Method) -> Conn {
        Conn::new(Request::builder().method(method).uri("/").body(Body::empty()).unwrap())
    }

    fn mark(name: &'static str) -> impl Handler {
        sync_fn(move |conn| {
            let seen = conn.param("seen").unwrap_or_default().to_owned();
            conn.params_mut().set("seen", seen + name);
            Ok(Next::Continue)
        })
    }

    fn seen(conn: &Conn) -> &str {
        conn.param("seen").unwrap_or_default()
    }

    #[tokio::test]
    async fn runs_matching_methods_in_order() {
        let mut route = Route::new("/");
        route.get(mark("a")).post(mark("b")).all(mark("c")).get(mark("d"));

        let mut get = conn(Method::GET);
        assert!(matches!(route.dispatch(&mut get).await, Next::Continue));
        assert_eq!(seen(&get), "acd");
        assert_eq!(get.route_path(), Some("/"));

        let mut post = conn(Method::POST);
        route.dispatch(&mut post).await;
        assert_eq!(seen(&post), "bc");
    }

    #[tokio::test]
    async fn head_falls_back_to_get() {
        let mut route = Route::new("/");
        route.get(mark("g")).post(mark("p"));
        assert!(route.handles_method(&Method::HEAD));

        let mut head = conn(Method::HEAD);
        route.dispatch(&mut head).await;
        assert_eq!(seen(&head), "g");

        route.head(mark("h"));
        let mut head = conn(Method::HEAD);
        route.dispatch(&mut head).await;
        assert_eq!(seen(&head), "h");
    }

    #[tokio::test]
    async fn skip_route_ends_the_route() {
        let mut route = Route::new("/");
        route
            .get(mark("a"))
            .get(sync_fn(|_| Ok(Next::SkipRoute)))
            .get(mark("b"));

        let mut conn = conn(Method::GET);
        assert!(matches!(route.dispatch(&mut conn).await, Next::Continue));
        assert_eq!(seen(&conn), "a");
    }

    #[tokio::test]
    async fn errors_reach_route_error_handlers() {
        let mut route = Route::new("/");
        route
            .get(sync_fn(|_| Err(Error::new("broken"))))
            .get(mark("skipped"))
            .error_handler(None, sync_error_fn(|err, conn| Ok(conn.send(err.to_string()))));

        let mut conn = conn(Method::GET);
        assert!(matches!(route.dispatch(&mut conn).await, Next::Done));
        assert!(conn.param("seen").is_none());
    }

    #[tokio::test]
    async fn unhandled_errors_are_returned() {
        let mut route = Route::new("/");
        route.get(sync_fn(|_| Err(Error::new("broken"))));

        let mut conn = conn(Method::GET);
        match route.dispatch(&mut conn).await {
            Next::Error(err) => assert_eq!(err.to_string(), "broken"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_routes_continue() {
        let route = Route::new("/");
        let mut conn = conn(Method::GET);
        assert!(matches!(route.dispatch(&mut conn).await, Next::Continue));
        assert_eq!(conn.params(), &Params::default());
        assert!(conn.route_path().is_none());
    }

    #[test]
    fn supported_methods() {
        let mut route = Route::new("/");
        route.post(mark("")).get(mark("")).get(mark(""));
        assert_eq!(route.supported_methods(), ["POST", "GET", "HEAD"]);
        assert!(!route.handles_method(&Method::PUT));

        route.all(mark(""));
        assert!(route.handles_method(&Method::PUT));
    }
}
