//! Alternative-service advertisement.
//!
//! Every response from the stream listener carries an `Alt-Svc` header
//! pointing clients at the datagram (HTTP/3) endpoint. The header is
//! advisory metadata set unconditionally on the response; it can neither
//! block nor fail a request.

use http::header::{HeaderValue, ALT_SVC};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::ALT_SVC_MAX_AGE;

/// Layer that stamps responses with the HTTP/3 discovery header.
pub fn alt_svc_layer(port: u16) -> SetResponseHeaderLayer<HeaderValue> {
    let value = format!("h3=\":{port}\"; ma={ALT_SVC_MAX_AGE}");
    SetResponseHeaderLayer::overriding(
        ALT_SVC,
        HeaderValue::from_str(&value).expect("alt-svc value is valid ASCII"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn test_router() -> Router {
        Router::new()
            .route("/hello", get(|| async { "hi" }))
            .layer(alt_svc_layer(4433))
    }

    #[tokio::test]
    async fn responses_carry_the_discovery_header() {
        let response = test_router()
            .oneshot(Request::builder().uri("/hello").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(ALT_SVC).unwrap().to_str().unwrap(),
            format!("h3=\":4433\"; ma={ALT_SVC_MAX_AGE}")
        );
    }

    #[tokio::test]
    async fn even_error_responses_are_stamped()  {
        let response = test_router()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(ALT_SVC));
    }
}
