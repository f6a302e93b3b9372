//! Handlers and the continuation protocol.
//!
//! Every handler returns a [`Next`] telling the stack what to do after it:
//! ```ignore
//!  Next::Continue      run the next matching layer
//!  Next::Error(err)    skip to the next error handler
//!  Next::SkipRoute     skip the remaining handlers of the current route
//!  Next::SkipRouter    leave the current router
//!  Next::Done          the handler finished the response, stop
//! ```
//! Returning `Err(err)` from a handler is the same as returning
//! `Ok(Next::Error(err))`, so `?` works inside handlers. A panicking handler is
//! caught at the layer boundary and turned into [`Error::Panic`].
use crate::conn::Conn;
use crate::error::{Error, Result};

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::{self, FutureExt};

/// An owned dynamically typed future, as returned by every handler.
pub type BoxFuture<'a, T> = futures_util::future::BoxFuture<'a, T>;

/// What the stack should do once a handler returns.
#[derive(Debug, Clone)]
pub enum Next {
    /// Continue with the next matching layer.
    Continue,
    /// Propagate an error to the next error handler.
    Error(Error),
    /// Skip the remaining handlers of the current route.
    SkipRoute,
    /// Skip the remaining layers of the current router and return to its
    /// mount point.
    SkipRouter,
    /// The handler finished the request; nothing else runs.
    Done,
}

impl From<Error> for Next {
    fn from(err: Error) -> Self {
        Next::Error(err)
    }
}

/// A request handler or middleware.
///
/// Use [`handler_fn`] or [`sync_fn`] to turn a closure into a handler.
/// ```rust
/// use junction::{Conn, Handler, Next, BoxFuture, Result};
///
/// struct Hello;
///
/// impl Handler for Hello {
///     fn call<'a>(&'a self, conn: &'a mut Conn) -> BoxFuture<'a, Result> {
///         Box::pin(async move { Ok(conn.send("hello")) })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, conn: &'a mut Conn) -> BoxFuture<'a, Result>;

    /// A name for logs.
    fn name(&self) -> Cow<'static, str> {
        type_name::<Self>().into()
    }
}

/// An error-handling middleware. Only runs while an error is propagating.
pub trait ErrorHandler: Send + Sync + 'static {
    fn call<'a>(&'a self, err: Error, conn: &'a mut Conn) -> BoxFuture<'a, Result>;

    fn name(&self) -> Cow<'static, str> {
        type_name::<Self>().into()
    }
}

/// A callback run when a named route parameter is captured, before the
/// handler of the layer that captured it. It receives the captured value and
/// the parameter name.
pub trait ParamHandler: Send + Sync + 'static {
    fn call<'a>(&'a self, conn: &'a mut Conn, value: &'a str, name: &'a str) -> BoxFuture<'a, Result>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call<'a>(&'a self, conn: &'a mut Conn) -> BoxFuture<'a, Result> {
        (**self).call(conn)
    }

    fn name(&self) -> Cow<'static, str> {
        (**self).name()
    }
}

/// Adapts an async closure into a [`Handler`].
/// ```rust
/// use junction::{handler_fn, Router};
///
/// let mut router = Router::new();
/// router.get("/", handler_fn(|conn| Box::pin(async move {
///     Ok(conn.send("Hello, World!"))
/// })));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'c> Fn(&'c mut Conn) -> BoxFuture<'c, Result> + Send + Sync + 'static,
{
    HandlerFn(f)
}

/// Adapts a synchronous closure into a [`Handler`].
/// ```rust
/// use junction::{sync_fn, Next, Router};
///
/// let mut router = Router::new();
/// router.middleware("/", sync_fn(|conn| {
///     conn.params_mut().set("seen", "yes");
///     Ok(Next::Continue)
/// }));
/// ```
pub fn sync_fn<F>(f: F) -> SyncFn<F>
where
    F: Fn(&mut Conn) -> Result + Send + Sync + 'static,
{
    SyncFn(f)
}

/// Adapts an async closure into an [`ErrorHandler`].
pub fn error_fn<F>(f: F) -> ErrorFn<F>
where
    F: for<'c> Fn(Error, &'c mut Conn) -> BoxFuture<'c, Result> + Send + Sync + 'static,
{
    ErrorFn(f)
}

/// Adapts a synchronous closure into an [`ErrorHandler`].
/// ```rust
/// use junction::{sync_error_fn, Router};
/// use hyper::StatusCode;
///
/// let mut router = Router::new();
/// router.error_handler("/", sync_error_fn(|err, conn| {
///     conn.set_status(StatusCode::INTERNAL_SERVER_ERROR);
///     Ok(conn.send(err.to_string()))
/// }));
/// ```
pub fn sync_error_fn<F>(f: F) -> SyncErrorFn<F>
where
    F: Fn(Error, &mut Conn) -> Result + Send + Sync + 'static,
{
    SyncErrorFn(f)
}

/// Adapts an async closure into a [`ParamHandler`].
pub fn param_fn<F>(f: F) -> ParamFn<F>
where
    F: for<'c> Fn(&'c mut Conn, &'c str, &'c str) -> BoxFuture<'c, Result> + Send + Sync + 'static,
{
    ParamFn(f)
}

/// Adapts a synchronous closure into a [`ParamHandler`].
pub fn sync_param_fn<F>(f: F) -> SyncParamFn<F>
where
    F: Fn(&mut Conn, &str, &str) -> Result + Send + Sync + 'static,
{
    SyncParamFn(f)
}

/// See [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F>(F);

/// See [`sync_fn`].
#[derive(Clone)]
pub struct SyncFn<F>(F);

/// See [`error_fn`].
#[derive(Clone)]
pub struct ErrorFn<F>(F);

/// See [`sync_error_fn`].
#[derive(Clone)]
pub struct SyncErrorFn<F>(F);

/// See [`param_fn`].
#[derive(Clone)]
pub struct ParamFn<F>(F);

/// See [`sync_param_fn`].
#[derive(Clone)]
pub struct SyncParamFn<F>(F);

impl<F> Handler for HandlerFn<F>
where
    F: for<'c> Fn(&'c mut Conn) -> BoxFuture<'c, Result> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, conn: &'a mut Conn) -> BoxFuture<'a, Result> {
        (self.0)(conn)
    }
}

impl<F> Handler for SyncFn<F>
where
    F: Fn(&mut Conn) -> Result + Send + Sync + 'static,
{
    fn call<'a>(&'a self, conn: &'a mut Conn) -> BoxFuture<'a, Result> {
        Box::pin(future::ready((self.0)(conn)))
    }
}

impl<F> ErrorHandler for ErrorFn<F>
where
    F: for<'c> Fn(Error, &'c mut Conn) -> BoxFuture<'c, Result> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, err: Error, conn: &'a mut Conn) -> BoxFuture<'a, Result> {
        (self.0)(err, conn)
    }
}

impl<F> ErrorHandler for SyncErrorFn<F>
where
    F: Fn(Error, &mut Conn) -> Result + Send + Sync + 'static,
{
    fn call<'a>(&'a self, err: Error, conn: &'a mut Conn) -> BoxFuture<'a, Result> {
        Box::pin(future::ready((self.0)(err, conn)))
    }
}

impl<F> ParamHandler for ParamFn<F>
where
    F: for<'c> Fn(&'c mut Conn, &'c str, &'c str) -> BoxFuture<'c, Result> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, conn: &'a mut Conn, value: &'a str, name: &'a str) -> BoxFuture<'a, Result> {
        (self.0)(conn, value, name)
    }
}

impl<F> ParamHandler for SyncParamFn<F>
where
    F: Fn(&mut Conn, &str, &str) -> Result + Send + Sync + 'static,
{
    fn call<'a>(&'a self, conn: &'a mut Conn, value: &'a str, name: &'a str) -> BoxFuture<'a, Result> {
        Box::pin(future::ready((self.0)(conn, value, name)))
    }
}

/// A handler registered on a layer or route, tagged with its kind.
#[derive(Clone)]
pub enum Callback {
    Handler(Arc<dyn Handler>),
    Error(Arc<dyn ErrorHandler>),
}

impl Callback {
    pub fn handler(handler: impl Handler) -> Self {
        Callback::Handler(Arc::new(handler))
    }

    pub fn error(handler: impl ErrorHandler) -> Self {
        Callback::Error(Arc::new(handler))
    }

    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Callback::Handler(h) => h.name(),
            Callback::Error(h) => h.name(),
        }
    }

    /// Runs the callback. A normal handler is skipped while `err` is pending
    /// and an error handler is skipped while it is not; skipping passes the
    /// current state along unchanged.
    pub(crate) fn invoke<'a>(&'a self, err: Option<Error>, conn: &'a mut Conn) -> BoxFuture<'a, Next> {
        match (self, err) {
            (Callback::Handler(handler), None) => catch(move || handler.call(conn)),
            (Callback::Error(handler), Some(err)) => catch(move || handler.call(err, conn)),
            (Callback::Handler(_), Some(err)) => Box::pin(future::ready(Next::Error(err))),
            (Callback::Error(_), None) => Box::pin(future::ready(Next::Continue)),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Handler(_) => write!(f, "Handler({})", self.name()),
            Callback::Error(_) => write!(f, "Error({})", self.name()),
        }
    }
}

/// Runs `call` and its future, promoting an `Err` or a panic into
/// `Next::Error`. `call` runs inside the guard, so synchronous handlers that
/// panic before returning a future are caught too.
pub(crate) fn catch<'a, F>(call: F) -> BoxFuture<'a, Next>
where
    F: FnOnce() -> BoxFuture<'a, Result> + Send + 'a,
{
    let fut = async move { call().await };
    Box::pin(AssertUnwindSafe(fut).catch_unwind().map(|outcome| match outcome {
        Ok(Ok(next)) => next,
        Ok(Err(err)) => Next::Error(err),
        Err(payload) => Next::Error(Error::from_panic(payload)),
    }))
}

/// Wraps a future, recording whether it ever returned `Pending`.
pub(crate) struct Tracked<F> {
    inner: F,
    suspended: bool,
}

impl<F> Tracked<F> {
    pub(crate) fn new(inner: F) -> Self {
        Self {
            inner,
            suspended: false,
        }
    }
}

impl<F: Future + Unpin> Future for Tracked<F> {
    type Output = (F::Output, bool);

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(output) => Poll::Ready((output, self.suspended)),
            Poll::Pending => {
                self.suspended = true;
                Poll::Pending
            }
        }
    }
}

/// Consecutive handlers that may complete without suspending before the
/// dispatch loop yields to the scheduler.
pub(crate) const SYNC_LIMIT: usize = 100;

/// Counts synchronous completions and yields once [`SYNC_LIMIT`] is reached,
/// so a long chain of ready handlers cannot starve the executor.
#[derive(Debug, Default)]
pub(crate) struct SyncBudget {
    sync: usize,
}

impl SyncBudget {
    pub(crate) async fn run(&mut self, fut: BoxFuture<'_, Next>) -> Next {
        let (next, suspended) = Tracked::new(fut).await;

        if suspended {
            self.sync = 0;
        } else {
            self.sync += 1;
            if self.sync >= SYNC_LIMIT {
                self.sync = 0;
                tokio::task::yield_now().await;
            }
        }

        next
    }
}
