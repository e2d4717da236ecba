mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{hand, jpeg, FailingProvider, FixedHands, ALERT_MESSAGE, RESPONSE_MESSAGE};
use palm_alert::server::router;

const LIMIT: usize = 1024 * 1024;

fn raw_request(content_type: &str, body: impl Into<Body>) -> Request<Body> {
    Request::post("/detect-hand")
        .header(header::CONTENT_TYPE, content_type)
        .body(body.into())
        .unwrap()
}

fn multipart_request(field: &str, data: &[u8]) -> Request<Body> {
    const BOUNDARY: &str = "esp32camboundary";
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"frame.jpg\"\r\n\
         Content-Type: image/jpeg\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    raw_request(
        &format!("multipart/form-data; boundary={BOUNDARY}"),
        body,
    )
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body)
        .unwrap_or_else(|e| panic!("non-JSON response {body:?} ({status}): {e}"));
    (status, json)
}

#[tokio::test]
async fn invalid_image() {
    let (pipeline, sink) = common::pipeline(FixedHands(vec![hand(true)]));
    let (status, body) = send(
        router(pipeline, LIMIT),
        raw_request("image/jpeg", "this is not a jpeg"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"status": "error", "message": "Invalid image"}));
    assert!(sink.alerts().is_empty());
}

#[tokio::test]
async fn no_hand() {
    let (pipeline, sink) = common::pipeline(FixedHands(Vec::new()));
    let (status, body) = send(router(pipeline, LIMIT), raw_request("image/jpeg", jpeg())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"warning": false, "message": "No open palm detected"})
    );
    assert!(sink.alerts().is_empty());
}

#[tokio::test]
async fn closed_hand() {
    let (pipeline, sink) = common::pipeline(FixedHands(vec![hand(false)]));
    let (status, body) = send(router(pipeline, LIMIT), raw_request("image/jpeg", jpeg())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["warning"], json!(false));
    assert!(sink.alerts().is_empty());
}

#[tokio::test]
async fn open_hand_publishes_one_alert() {
    let (pipeline, sink) = common::pipeline(FixedHands(vec![hand(true)]));
    let (status, body) = send(router(pipeline, LIMIT), raw_request("image/jpeg", jpeg())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"warning": true, "message": RESPONSE_MESSAGE}));

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].event, "HAND_OPEN");
    assert_eq!(alerts[0].message, ALERT_MESSAGE);
    assert!(alerts[0].timestamp > 0.0);
}

#[tokio::test]
async fn multipart_upload() {
    let (pipeline, sink) = common::pipeline(FixedHands(vec![hand(true)]));
    let (status, body) = send(router(pipeline, LIMIT), multipart_request("file", &jpeg())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["warning"], json!(true));
    assert_eq!(sink.alerts().len(), 1);
}

#[tokio::test]
async fn multipart_garbage_is_invalid_image() {
    let (pipeline, sink) = common::pipeline(FixedHands(vec![hand(true)]));
    let (status, body) = send(
        router(pipeline, LIMIT),
        multipart_request("file", b"\x00\x01\x02"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("Invalid image"));
    assert!(sink.alerts().is_empty());
}

#[tokio::test]
async fn multipart_without_file_field() {
    let (pipeline, sink) = common::pipeline(FixedHands(vec![hand(true)]));
    let app = router(pipeline, LIMIT);
    let response = app
        .oneshot(multipart_request("image", &jpeg()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(sink.alerts().is_empty());
}

#[tokio::test]
async fn detection_failure() {
    let (pipeline, sink) = common::pipeline(FailingProvider);
    let (status, body) = send(router(pipeline, LIMIT), raw_request("image/jpeg", jpeg())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"status": "error", "message": "Detection failed"}));
    assert!(sink.alerts().is_empty());
}

#[tokio::test]
async fn upload_limit() {
    let (pipeline, sink) = common::pipeline(FixedHands(vec![hand(true)]));
    let app = router(pipeline, 16);
    let response = app
        .oneshot(raw_request("image/jpeg", jpeg()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(sink.alerts().is_empty());
}

#[tokio::test]
async fn only_post_is_routed() {
    let (pipeline, _) = common::pipeline(FixedHands(Vec::new()));
    let app = router(pipeline, LIMIT);

    let response = app
        .clone()
        .oneshot(
            Request::get("/detect-hand")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = app
        .oneshot(
            Request::post("/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
