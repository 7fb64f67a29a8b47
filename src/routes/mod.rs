//! HTTP route handlers for the key-value API.
//!
//! The router maps the path-addressed store surface: the first path segment
//! selects a bucket, the wildcard remainder is the key, so keys may contain
//! slashes. Request tracing is enabled via middleware that generates a
//! unique request ID for each incoming request.
//!
//! The same router instance serves both transports; the stream listener
//! additionally wraps it with the Alt-Svc discovery layer.

pub mod health;
pub mod keys;

use axum::{
    middleware,
    routing::get,
    Router,
};

use crate::middleware::request_id_layer;
use crate::state::AppState;

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    // Static segment first so the probe is not swallowed by the bucket capture
    let health_routes = Router::new().route("/health", get(health::health));

    let kv_routes = Router::new()
        .route("/{bucket}", get(keys::list))
        .route(
            "/{bucket}/{*key}",
            get(keys::fetch).put(keys::store).delete(keys::remove),
        );

    Router::new()
        .merge(health_routes)
        .merge(kv_routes)
        .with_state(state)
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::store::Store;

    fn test_router() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("kv.db")).expect("open store");
        let router = create_router(AppState::new(store));
        (dir, router)
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes()
            .to_vec()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (_dir, router) = test_router();

        let put = Request::builder()
            .method("PUT")
            .uri("/users/alice")
            .body(Body::from("hello"))
            .unwrap();
        let response = router.clone().oneshot(put).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let get = Request::builder()
            .uri("/users/alice")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"hello");
    }

    #[tokio::test]
    async fn get_missing_key_is_404() {
        let (_dir, router) = test_router();

        let get = Request::builder()
            .uri("/users/missing")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_then_get_is_404() {
        let (_dir, router) = test_router();

        let put = Request::builder()
            .method("PUT")
            .uri("/users/alice")
            .body(Body::from("hello"))
            .unwrap();
        router.clone().oneshot(put).await.unwrap();

        let delete = Request::builder()
            .method("DELETE")
            .uri("/users/alice")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let get = Request::builder()
            .uri("/users/alice")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_in_missing_bucket_is_404() {
        let (_dir, router) = test_router();

        let delete = Request::builder()
            .method("DELETE")
            .uri("/ghosts/anything")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_returns_keys_as_json() {
        let (_dir, router) = test_router();

        for key in ["b", "a"] {
            let put = Request::builder()
                .method("PUT")
                .uri(format!("/files/{key}"))
                .body(Body::from("x"))
                .unwrap();
            router.clone().oneshot(put).await.unwrap();
        }

        let list = Request::builder()
            .uri("/files")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(list).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let keys: Vec<String> = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn keys_with_slashes_round_trip() {
        let (_dir, router) = test_router();

        let put = Request::builder()
            .method("PUT")
            .uri("/docs/2024/q1/report")
            .body(Body::from("quarterly"))
            .unwrap();
        let response = router.clone().oneshot(put).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let get = Request::builder()
            .uri("/docs/2024/q1/report")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"quarterly");
    }

    #[tokio::test]
    async fn health_probe_responds() {
        let (_dir, router) = test_router();

        let get = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"ok");
    }
}
