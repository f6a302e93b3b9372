//! The per-request context threaded through the stack.
use crate::handler::Next;
use crate::params::Params;

use hyper::header::{HeaderValue, IntoHeaderName};
use hyper::{Body, Method, Request, Response, StatusCode};

/// A request travelling through the middleware stack, together with the
/// response being built for it.
///
/// While a mounted router runs, [`url`](Conn::url) is relative to the mount
/// point and [`base_url`](Conn::base_url) holds the stripped prefix. Both are
/// restored when the router finishes.
/// ```rust
/// use junction::Conn;
/// use hyper::{Body, Request};
///
/// let req = Request::get("/users/42?fields=name").body(Body::empty()).unwrap();
/// let conn = Conn::new(req);
/// assert_eq!(conn.url(), "/users/42?fields=name");
/// assert_eq!(conn.path(), "/users/42");
/// assert_eq!(conn.base_url(), "");
/// ```
#[derive(Debug)]
pub struct Conn {
    request: Request<Body>,
    response: Response<Body>,
    pub(crate) url: String,
    original_url: String,
    pub(crate) base_url: String,
    pub(crate) params: Params,
    pub(crate) route: Option<String>,
    sent: bool,
}

impl Conn {
    pub fn new(request: Request<Body>) -> Self {
        let url = request.uri().to_string();
        Self {
            request,
            response: Response::new(Body::empty()),
            original_url: url.clone(),
            url,
            base_url: String::new(),
            params: Params::default(),
            route: None,
            sent: false,
        }
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// The request target, relative to the current mount point.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Rewrites the request target seen by the following layers.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    /// The request target as received, never modified by mounting.
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    /// The path prefixes stripped by the routers the request was mounted
    /// through.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The path component of [`url`](Conn::url).
    pub fn path(&self) -> &str {
        pathname(&self.url).unwrap_or("")
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// The path of the route currently handling the request.
    pub fn route_path(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request<Body> {
        &mut self.request
    }

    /// A request header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    pub fn response(&self) -> &Response<Body> {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response<Body> {
        &mut self.response
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        *self.response.status_mut() = status;
        self
    }

    pub fn set_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) -> &mut Self {
        self.response.headers_mut().insert(name, value);
        self
    }

    /// Sets the response body and marks the response as finished. Returns
    /// [`Next::Done`] so a handler can end with `Ok(conn.send(..))`.
    pub fn send(&mut self, body: impl Into<Body>) -> Next {
        *self.response.body_mut() = body.into();
        self.sent = true;
        Next::Done
    }

    /// Whether a handler finished the response.
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn into_response(self) -> Response<Body> {
        self.response
    }
}

/// The scheme and authority of an absolute-form request target, e.g.
/// `http://example.com` for `http://example.com/a?b`.
pub(crate) fn protohost(url: &str) -> Option<&str> {
    if url.is_empty() || url.starts_with('/') {
        return None;
    }

    let path_len = url.find('?').unwrap_or(url.len());
    let fqdn = url[..path_len].find("://")?;

    match url[fqdn + 3..].find('/') {
        Some(slash) => Some(&url[..fqdn + 3 + slash]),
        None => Some(""),
    }
}

/// The path component of a request target, without query or fragment.
pub(crate) fn pathname(url: &str) -> Option<&str> {
    if url.is_empty() {
        return None;
    }

    let rest = match protohost(url) {
        Some("") => return Some("/"),
        Some(host) => &url[host.len()..],
        None => url,
    };

    let end = rest.find(|c| c == '?' || c == '#').unwrap_or(rest.len());
    match &rest[..end] {
        "" => Some("/"),
        path => Some(path),
    }
}
