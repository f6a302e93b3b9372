//! # Junction
//!
//! Junction is an HTTP middleware and routing library for [hyper](https://hyper.rs).
//!
//! Handlers are registered in order against path patterns and HTTP methods.
//! Every request walks that ordered stack: each matching handler runs in turn
//! and tells the stack what to do next, whether that is to continue, to report
//! an error, to skip the rest of a route or router, or to stop because the
//! response is finished.
//!
//! ## Features
//!
//! **Ordered middleware:** Layers run strictly in registration order. A
//! middleware registered at `/api` runs for `/api`, `/api/users` and
//! `/api.json`, but not for `/apiary`.
//!
//! **Mounting:** Routers and applications nest. A router mounted at `/admin`
//! sees `/admin/users` as `/users`, with `/admin` moved to
//! [`Conn::base_url`]. Both are restored when it returns.
//!
//! **Error handlers:** A handler returning `Err`, or panicking, skips every
//! normal handler until an [`ErrorHandler`] deals with the error.
//!
//! **Parameters in your routing pattern:** Give the path segment a name and
//! the router captures and percent-decodes the value for you. Parameter
//! callbacks registered with [`Router::param`] load what the value refers to,
//! once per request.
//!
//! **Automatic `OPTIONS` responses** listing the methods of the matching routes,
//! and `HEAD` requests answered by `GET` handlers.
//!
//! ## Usage
//!
//! Here is a simple example:
//!
//! ```rust,no_run
//! use junction::{handler_fn, sync_fn, sync_error_fn, Application, Error, Next};
//! use hyper::StatusCode;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = Application::new();
//!
//!     app.middleware("/", sync_fn(|conn| {
//!         tracing::info!(url = %conn.url(), "request");
//!         Ok(Next::Continue)
//!     }));
//!
//!     app.get("/", sync_fn(|conn| Ok(conn.send("Hello, World!"))));
//!
//!     app.get("/hello/:user", handler_fn(|conn| Box::pin(async move {
//!         let body = format!("Hello, {}", conn.param("user").unwrap_or_default());
//!         Ok(conn.send(body))
//!     })));
//!
//!     app.get("/teapot", sync_fn(|_| {
//!         Err(Error::status_code(StatusCode::IM_A_TEAPOT, "short and stout"))
//!     }));
//!
//!     app.error_handler("/", sync_error_fn(|err, conn| {
//!         conn.set_status(err.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));
//!         Ok(conn.send(err.to_string()))
//!     }));
//!
//!     hyper::Server::bind(&([127, 0, 0, 1], 3000).into())
//!         .serve(app.into_service())
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ### Named parameters
//!
//! `:user` is a *named parameter*. The values are accessible via
//! [`Conn::param`].
//!
//! Named parameters only match a single path segment:
//!
//! ```ignore
//! Pattern: /user/:user
//!
//!  /user/gordon              match
//!  /user/you                 match
//!  /user/gordon/profile      no match
//!  /user/                    no match
//! ```
//!
//! A `?` makes a parameter optional, and a parenthesised expression restricts
//! what it matches:
//!
//! ```ignore
//! Pattern: /user/:id(\d+)/:tab?
//!
//!  /user/42                  match: id="42"
//!  /user/42/posts            match: id="42", tab="posts"
//!  /user/gordon              no match
//! ```
//!
//! ### Wildcards
//!
//! `*` matches everything, slashes included. Its value is captured under the
//! next positional key:
//!
//! ```ignore
//! Pattern: /src/*
//!
//!  /src/somefile.rs          match: 0="somefile.rs"
//!  /src/subdir/somefile.rs   match: 0="subdir/somefile.rs"
//! ```
//!
//! ### Continuations
//!
//! Every handler returns a [`Next`]. Returning [`Next::SkipRoute`] passes the
//! request to the next matching route, which makes it easy to add
//! preconditions:
//!
//! ```rust
//! use junction::{sync_fn, Next, Router};
//!
//! let mut router = Router::new();
//! router
//!     .route("/user/:id")
//!     .get(sync_fn(|conn| match conn.param("id") {
//!         Some("0") => Ok(Next::SkipRoute),
//!         _ => Ok(Next::Continue),
//!     }))
//!     .get(sync_fn(|conn| Ok(conn.send("regular user"))));
//!
//! router.get("/user/:id", sync_fn(|conn| Ok(conn.send("special user"))));
//! ```
//!
//! ### Logging
//!
//! Junction reports what it does through [`tracing`](https://docs.rs/tracing)
//! events: layer registration and dispatch at `DEBUG`, deprecated calls at
//! `WARN`, and errors that reach the end of an application at `ERROR` (unless
//! the `env` setting is `test`). Install a subscriber to see them.

#![forbid(unsafe_code)]

mod application;
mod conn;
mod error;
mod finalhandler;
mod handler;
mod layer;
mod params;
pub mod pattern;
mod route;
mod router;
mod service;
mod settings;

#[doc(inline)]
pub use application::Application;
#[doc(inline)]
pub use conn::Conn;
#[doc(inline)]
pub use error::{BoxError, Error, Result};
#[doc(inline)]
pub use handler::{
    error_fn, handler_fn, param_fn, sync_error_fn, sync_fn, sync_param_fn, BoxFuture, Callback,
    ErrorFn, ErrorHandler, Handler, HandlerFn, Next, ParamFn, ParamHandler, SyncErrorFn, SyncFn,
    SyncParamFn,
};
#[doc(inline)]
pub use params::{ParamKey, Params};
#[doc(inline)]
pub use route::Route;
#[doc(inline)]
pub use router::{ParamArg, Router, RouterOptions};
#[doc(inline)]
pub use service::{AppService, MakeAppService, ResponseFut};
#[doc(inline)]
pub use settings::Settings;
