//! Whole-request deadline.

use crate::error::ApiError;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::Duration;

/// Fail a request that runs past `deadline` with a `backend_unavailable` error.
///
/// The handler future is dropped on expiry, which cancels any retrieval it
/// started.
pub async fn request_deadline(
    State(deadline): State<Duration>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    match tokio::time::timeout(deadline, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(
                method = %method,
                path = %path,
                deadline_secs = deadline.as_secs_f64(),
                "request deadline exceeded"
            );
            ApiError::Unavailable("request timed out".to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::StatusCode;
    use axum::middleware;
    use axum::routing::get;
    use tower::ServiceExt;

    fn router(deadline: Duration) -> Router {
        Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .route("/fast", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(deadline, request_deadline))
    }

    fn get_request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_overrun_returns_error_payload() {
        let response = router(Duration::from_millis(50))
            .oneshot(get_request("/slow"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "backend_unavailable");
        assert_eq!(json["error"], "request timed out");
    }

    #[tokio::test]
    async fn test_fast_request_passes_through() {
        let response = router(Duration::from_millis(50))
            .oneshot(get_request("/fast"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
