//! The response written when a request leaves the application unhandled.
use crate::conn::{pathname, Conn};
use crate::error::Error;
use crate::handler::Next;

use std::borrow::Cow;

use hyper::header::{self, HeaderValue};
use hyper::{Body, Method, StatusCode};

/// Writes a `404` when nothing answered the request, or an error page when an
/// error reached the end of the stack. `env` selects how much of the error is
/// shown: only the reason phrase in `production`.
pub(crate) fn finish(conn: &mut Conn, next: Next, env: &str) {
    let (status, message) = match next {
        Next::Done => return,
        Next::Error(err) => {
            let status = error_status(&err, conn.status());
            let message = match env {
                "production" => status.canonical_reason().unwrap_or_default().to_owned(),
                _ => err.to_string(),
            };

            if env != "test" {
                tracing::error!(error = %err, status = status.as_u16(), "unhandled error");
            }

            if conn.is_sent() {
                return;
            }
            (status, message)
        }
        _ => {
            if conn.is_sent() {
                tracing::debug!("cannot 404 after the response was sent");
                return;
            }

            let resource = pathname(conn.original_url()).unwrap_or("resource");
            let message = format!("Cannot {} {}", conn.method(), resource);
            (StatusCode::NOT_FOUND, message)
        }
    };

    send(conn, status, &message);
}

/// The error's own status, else the response status if it is already an
/// error, else `500`.
fn error_status(err: &Error, current: StatusCode) -> StatusCode {
    match err.status() {
        Some(status) => status,
        None if current.is_client_error() || current.is_server_error() => current,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn send(conn: &mut Conn, status: StatusCode, message: &str) {
    let body = document(message);
    let head = *conn.method() == Method::HEAD;

    let response = conn.response_mut();
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.remove(header::CONTENT_ENCODING);
    headers.remove(header::CONTENT_LANGUAGE);
    headers.remove(header::CONTENT_RANGE);
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

    if head {
        conn.send(Body::empty());
    } else {
        conn.send(body);
    }
}

fn document(message: &str) -> String {
    let body = html_escape(message)
        .replace('\n', "<br>")
        .replace("  ", " &nbsp;");

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Error</title>\n</head>\n<body>\n<pre>{}</pre>\n</body>\n</html>\n",
        body
    )
}

fn html_escape(s: &str) -> Cow<'_, str> {
    if s.contains(['&', '<', '>', '"', '\'']) {
        let mut escaped = String::with_capacity(s.len() + 8);
        for c in s.chars() {
            match c {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '"' => escaped.push_str("&quot;"),
                '\'' => escaped.push_str("&#39;"),
                _ => escaped.push(c),
            }
        }
        Cow::Owned(escaped)
    } else {
        Cow::Borrowed(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Request;

    fn conn(method: Method, uri: &str) -> Conn {
        Conn::new(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
    }

    async fn body(conn: Conn) -> String {
        let bytes = hyper::body::to_bytes(conn.into_response().into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn not_found() {
        let mut conn = conn(Method::GET, "/missing?page=2");
        finish(&mut conn, Next::Continue, "test");

        assert_eq!(conn.status(), StatusCode::NOT_FOUND);
        let headers = conn.response().headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::CONTENT_SECURITY_POLICY], "default-src 'none'");
        assert!(body(conn).await.contains("<pre>Cannot GET /missing</pre>"));
    }

    #[tokio::test]
    async fn error_messages_are_escaped() {
        let mut conn = conn(Method::GET, "/");
        finish(&mut conn, Next::Error(Error::new("<b>bad</b>\nline  two")), "test");

        assert_eq!(conn.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body(conn)
            .await
            .contains("<pre>&lt;b&gt;bad&lt;/b&gt;<br>line &nbsp;two</pre>"));
    }

    #[tokio::test]
    async fn production_hides_messages() {
        let mut conn = conn(Method::GET, "/");
        let err = Error::status_code(StatusCode::FORBIDDEN, "secret detail");
        finish(&mut conn, Next::Error(err), "production");

        assert_eq!(conn.status(), StatusCode::FORBIDDEN);
        let body = body(conn).await;
        assert!(body.contains("<pre>Forbidden</pre>"));
        assert!(!body.contains("secret"));
    }

    #[test]
    fn statuses() {
        let plain = Error::new("x");
        assert_eq!(error_status(&plain, StatusCode::OK), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_status(&plain, StatusCode::BAD_GATEWAY), StatusCode::BAD_GATEWAY);

        let decode = Error::Decode { value: "%".into() };
        assert_eq!(error_status(&decode, StatusCode::BAD_GATEWAY), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn head_requests_get_no_body() {
        let mut conn = conn(Method::HEAD, "/nothing");
        finish(&mut conn, Next::Continue, "test");

        assert_eq!(conn.status(), StatusCode::NOT_FOUND);
        assert_ne!(conn.response().headers()[header::CONTENT_LENGTH], "0");
        assert_eq!(body(conn).await, "");
    }

    #[test]
    fn sent_responses_are_left_alone() {
        let mut conn = conn(Method::GET, "/");
        conn.set_status(StatusCode::ACCEPTED);
        conn.send("done");
        finish(&mut conn, Next::Continue, "test");
        assert_eq!(conn.status(), StatusCode::ACCEPTED);
    }
}
