//! Serving an [`Application`] with hyper.
use crate::application::Application;

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{future, ready};
use hyper::service::Service;
use hyper::{Body, Request, Response};

impl Application {
    /// Converts the `Application` into a `Service` which you can serve
    /// directly with `Hyper`. If you have an existing `Service` that you want
    /// to incorporate an `Application` into, see
    /// [`Application::serve`](crate::Application::serve).
    /// ```rust,no_run
    /// # use junction::{sync_fn, Application};
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut app = Application::new();
    /// app.get("/", sync_fn(|conn| Ok(conn.send("Hello, World!"))));
    ///
    /// hyper::Server::bind(&([127, 0, 0, 1], 3030).into())
    ///     .serve(app.into_service())
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn into_service(self) -> MakeAppService {
        MakeAppService(AppService(Arc::new(self)))
    }
}

#[doc(hidden)]
pub struct MakeAppService(AppService);

impl<T> Service<T> for MakeAppService {
    type Response = AppService;
    type Error = Infallible;
    type Future = future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _: T) -> Self::Future {
        future::ok(self.0.clone())
    }
}

/// A hyper service answering every request with an [`Application`].
#[doc(hidden)]
#[derive(Clone)]
pub struct AppService(Arc<Application>);

impl AppService {
    pub fn new(app: Application) -> Self {
        AppService(Arc::new(app))
    }
}

impl Service<Request<Body>> for AppService {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = ResponseFut;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let app = Arc::clone(&self.0);
        ResponseFut {
            inner: Box::pin(async move { app.serve(req).await }),
        }
    }
}

/// The response future of [`AppService`].
pub struct ResponseFut {
    inner: Pin<Box<dyn Future<Output = Response<Body>> + Send>>,
}

impl Future for ResponseFut {
    type Output = Result<Response<Body>, Infallible>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let response = ready!(self.inner.as_mut().poll(cx));
        Poll::Ready(Ok(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::sync_fn;

    use hyper::StatusCode;

    #[tokio::test]
    async fn serves_requests() {
        let mut app = Application::new();
        app.get("/hello/:name", sync_fn(|conn| {
            let body = format!("Hello, {}", conn.param("name").unwrap_or_default());
            Ok(conn.send(body))
        }));

        let mut service = AppService::new(app);
        let res = service
            .call(Request::get("/hello/world").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-powered-by"], "Junction");
        let body = hyper::body::to_bytes(res.into_body()).await.unwrap();
        assert_eq!(&body[..], b"Hello, world");
    }

    #[tokio::test]
    async fn make_service_shares_the_app() {
        let mut make = Application::new().into_service();
        let mut first = make.call(()).await.unwrap();
        let mut second = make.call(()).await.unwrap();

        for service in [&mut first, &mut second] {
            let res = service
                .call(Request::get("/").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::NOT_FOUND);
        }
        assert!(Arc::ptr_eq(&first.0, &second.0));
    }
}
