//! Error responses produced by the gateway itself.
//!
//! Bodies are short plain-text messages with a trailing newline, the same
//! shape clients get from a stock HTTP error page.

use axum::{
    body::Body,
    http::{header, HeaderValue, Response, StatusCode},
};

/// Build a plain-text error response.
pub fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(format!("{message}\n")));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}
