use axum::body::Body;
use axum::http::{Request, StatusCode};

mod common;
use common::TestApp;

#[tokio::test]
async fn liveness_routes_answer_200() {
    let t = TestApp::new("health").await;

    let (status, _, body) = t.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("running"));

    let (status, _, _) = t.get("/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = t.get("/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let t = TestApp::new("request-id").await;

    let (_, headers, _) = t
        .send(
            Request::builder()
                .uri("/healthz")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(headers.get("x-request-id").unwrap(), "req-123");

    let (_, headers, _) = t.get("/healthz").await;
    let generated = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(generated.len(), 16);
}
