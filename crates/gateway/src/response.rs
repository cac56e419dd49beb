//! Error responses produced by the gateway itself.

use bytes::Bytes;
use http::{HeaderValue, Request, Response, StatusCode, header};

use crate::SERVER_NAME;

/// `400 Bad Request` with `why` as the body.
pub fn bad_request<B>(request: &Request<B>, why: &str) -> Response<Bytes> {
    error_response(request, StatusCode::BAD_REQUEST, why.to_owned())
}

/// `404 Not Found` naming the requested `target`.
pub fn not_found<B>(request: &Request<B>, target: &str) -> Response<Bytes> {
    error_response(request, StatusCode::NOT_FOUND, format!("The resource '{target}' was not found"))
}

/// `500 Internal Server Error` carrying the underlying error message.
pub fn server_error<B>(request: &Request<B>, what: &str) -> Response<Bytes> {
    error_response(request, StatusCode::INTERNAL_SERVER_ERROR, format!("An error occured: '{what}'"))
}

fn error_response<B>(request: &Request<B>, status: StatusCode, body: String) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(body));
    *response.status_mut() = status;
    *response.version_mut() = request.version();

    let headers = response.headers_mut();
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Version;

    fn request() -> Request<()> {
        Request::builder().uri("/missing.png").version(Version::HTTP_10).body(()).unwrap()
    }

    #[test]
    fn not_found_names_the_target() {
        let response = not_found(&request(), "/missing.png");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.version(), Version::HTTP_10);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(response.body(), "The resource '/missing.png' was not found");
    }

    #[test]
    fn server_error_keeps_the_message() {
        let response = server_error(&request(), "Permission denied (os error 13)");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), "An error occured: 'Permission denied (os error 13)'");
        assert_eq!(response.headers()[header::SERVER], SERVER_NAME);
    }

    #[test]
    fn bad_request_body_is_the_reason() {
        let response = bad_request(&request(), "Unknown HTTP-method");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), "Unknown HTTP-method");
    }
}
