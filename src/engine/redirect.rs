//! Redirect policy.
//!
//! What changes on the request when a 3xx is followed:
//!
//! ```text
//! 307          → method and body kept
//! other 3xx    → method becomes GET, body dropped
//! host changed → cookies copied to the new host, Host and Origin removed
//! ```

use http::{Method, StatusCode};
use url::Url;

use crate::error::{EngineError, EngineResult};
use crate::http::parser::ResponseHead;
use crate::http::request::{host_of, HttpRequest};

/// Resolve the `Location` of a 3xx response against the current URI.
pub fn redirect_location(head: &ResponseHead, current: &Url) -> EngineResult<Url> {
    let location = head
        .headers
        .get("Location")
        .ok_or(EngineError::MissingRedirectLocation(head.status.as_u16()))?;
    current
        .join(location)
        .map_err(|_| EngineError::InvalidRedirectLocation(location.to_string()))
}

/// Rewrite `request` to follow a redirect to `location`.
pub fn apply_redirect(request: &mut HttpRequest, status: StatusCode, location: Url) {
    if status != StatusCode::TEMPORARY_REDIRECT {
        request.method = Method::GET;
        request.body = None;
    }

    let old_host = host_of(&request.uri);
    let new_host = host_of(&location);
    if old_host != new_host {
        if let (Some(old_host), Some(new_host)) = (&old_host, &new_host) {
            request.cookies.copy_domain(old_host, new_host);
        }
        request.headers.remove("Host");
        request.headers.remove("Origin");
    }

    request.uri = location;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::headers::HeaderList;
    use crate::http::request::{HttpVersion, RequestBody};

    fn head(status: StatusCode, location: Option<&str>) -> ResponseHead {
        let mut headers = HeaderList::new();
        if let Some(location) = location {
            headers.push("location", location);
        }
        ResponseHead {
            version: HttpVersion::HTTP_11,
            status,
            reason: String::new(),
            headers,
            content_headers: HeaderList::new(),
        }
    }

    #[test]
    fn relative_and_absolute_locations() {
        let current = Url::parse("http://a.test/dir/page?x=1").unwrap();
        let resolved = redirect_location(&head(StatusCode::FOUND, Some("next")), &current).unwrap();
        assert_eq!(resolved.as_str(), "http://a.test/dir/next");
        let resolved = redirect_location(&head(StatusCode::FOUND, Some("/root")), &current).unwrap();
        assert_eq!(resolved.as_str(), "http://a.test/root");
        let resolved = redirect_location(&head(StatusCode::FOUND, Some("https://b.test/y")), &current).unwrap();
        assert_eq!(resolved.host_str(), Some("b.test"));
    }

    #[test]
    fn missing_location() {
        let current = Url::parse("http://a.test/").unwrap();
        let err = redirect_location(&head(StatusCode::MOVED_PERMANENTLY, None), &current).unwrap_err();
        assert!(matches!(err, EngineError::MissingRedirectLocation(301)));
    }

    #[test]
    fn post_becomes_get_and_cookies_follow_host_change() {
        let mut request = HttpRequest::post("http://a.test/login", RequestBody::text("u=1", "text/plain"))
            .unwrap()
            .with_header("Host", "a.test")
            .with_header("Origin", "http://a.test")
            .with_header("Accept", "*/*");
        request.set_cookie("sid", "42");

        apply_redirect(&mut request, StatusCode::FOUND, Url::parse("http://b.test/home").unwrap());

        assert_eq!(request.method, Method::GET);
        assert!(request.body.is_none());
        assert_eq!(request.uri.host_str(), Some("b.test"));
        assert!(!request.headers.contains("Host"));
        assert!(!request.headers.contains("Origin"));
        assert!(request.headers.contains("Accept"));
        assert_eq!(request.cookies.get("b.test", "sid"), Some("42"));
    }

    #[test]
    fn temporary_redirect_keeps_method_and_body() {
        let mut request = HttpRequest::post("http://a.test/x", RequestBody::text("data", "text/plain"))
            .unwrap()
            .with_header("Origin", "http://a.test");
        apply_redirect(&mut request, StatusCode::TEMPORARY_REDIRECT, Url::parse("http://a.test/y").unwrap());
        assert_eq!(request.method, Method::POST);
        assert!(request.body.is_some());
        assert!(request.headers.contains("Origin"), "same host keeps Origin");
    }
}
