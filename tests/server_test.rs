mod common;

use common::{
    file_part, grader_with, init_logging, multipart_body, multipart_content_type, sample_jpeg,
    Part, StubModel,
};
use kneegrade::server::{routes, MODEL_UNAVAILABLE, PREDICTION_FAILED};
use kneegrade::{describe, GradeResult, ModelState};
use serde_json::Value;
use warp::http::StatusCode;

const LIMIT: u64 = 16 * 1024 * 1024;

async fn post_predict(state: ModelState, limit: u64, body: Vec<u8>) -> warp::http::Response<bytes::Bytes> {
    let filter = routes(state, limit);
    warp::test::request()
        .method("POST")
        .path("/predict")
        .header("content-type", multipart_content_type())
        .body(body)
        .reply(&filter)
        .await
}

fn error_message(body: &[u8]) -> String {
    let value: Value = serde_json::from_slice(body).expect("error body is JSON");
    value["error"].as_str().expect("error field").to_string()
}

async fn failed_state() -> ModelState {
    let state = ModelState::new();
    state.begin_loading().await.unwrap();
    state.publish(Err("weights missing".into())).await.unwrap();
    state
}

#[tokio::test]
async fn test_predict_returns_grade() {
    init_logging();
    let model = StubModel::new(vec![0.05, 0.1, 0.6, 0.15, 0.1]);
    let state = ModelState::ready(grader_with(model.clone()));

    let jpeg = sample_jpeg();
    let body = multipart_body(&[file_part("file", "knee.jpg", &jpeg)]);
    let res = post_predict(state, LIMIT, body).await;

    assert_eq!(res.status(), StatusCode::OK);
    let result: GradeResult = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(result.grade, 2);
    assert_eq!(result.description, describe(2));
    assert_eq!(result.probabilities.len(), 5);
    let sum: f32 = result.probabilities.iter().sum();
    assert!((sum - 1.0).abs() < 1e-4);
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_predict_accepts_image_field_and_png() {
    let model = StubModel::new(vec![0.0, 0.0, 0.0, 0.0, 1.0]);
    let state = ModelState::ready(grader_with(model.clone()));

    let png = common::encode(image::RgbImage::new(300, 200), image::ImageFormat::Png);
    let body = multipart_body(&[
        Part {
            name: "comment",
            filename: None,
            content_type: None,
            data: b"left knee",
        },
        Part {
            name: "image",
            filename: Some("knee.png"),
            content_type: Some("image/png"),
            data: &png,
        },
    ]);
    let res = post_predict(state, LIMIT, body).await;

    assert_eq!(res.status(), StatusCode::OK);
    let value: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(value["grade"], 4);
    assert_eq!(value["description"], describe(4));
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_predict_before_model_loaded() {
    let state = ModelState::new();
    let jpeg = sample_jpeg();
    let res = post_predict(state.clone(), LIMIT, multipart_body(&[file_part("file", "knee.jpg", &jpeg)])).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_message(res.body()), MODEL_UNAVAILABLE);

    state.begin_loading().await.unwrap();
    let res = post_predict(state, LIMIT, multipart_body(&[file_part("file", "knee.jpg", &jpeg)])).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_predict_after_load_failure() {
    let state = failed_state().await;
    let jpeg = sample_jpeg();
    let res = post_predict(state, LIMIT, multipart_body(&[file_part("file", "knee.jpg", &jpeg)])).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_message(res.body()), MODEL_UNAVAILABLE);
}

#[tokio::test]
async fn test_unavailable_takes_precedence_over_bad_upload() {
    let state = failed_state().await;
    let res = post_predict(state, LIMIT, multipart_body(&[])).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_missing_file_part() {
    let model = StubModel::new(vec![0.2; 5]);
    let state = ModelState::ready(grader_with(model.clone()));

    let body = multipart_body(&[Part {
        name: "comment",
        filename: None,
        content_type: None,
        data: b"no image here",
    }]);
    let res = post_predict(state, LIMIT, body).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(res.body()), "No file part in the request");
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_empty_filename() {
    let model = StubModel::new(vec![0.2; 5]);
    let state = ModelState::ready(grader_with(model.clone()));

    let jpeg = sample_jpeg();
    let res = post_predict(state, LIMIT, multipart_body(&[file_part("file", "", &jpeg)])).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(res.body()), "No selected file");
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_empty_file() {
    let model = StubModel::new(vec![0.2; 5]);
    let state = ModelState::ready(grader_with(model.clone()));

    let res = post_predict(state, LIMIT, multipart_body(&[file_part("file", "knee.jpg", b"")])).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(res.body()), "Uploaded file is empty");
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_non_image_content_type() {
    let model = StubModel::new(vec![0.2; 5]);
    let state = ModelState::ready(grader_with(model.clone()));

    let body = multipart_body(&[Part {
        name: "file",
        filename: Some("notes.txt"),
        content_type: Some("text/plain"),
        data: b"hello",
    }]);
    let res = post_predict(state, LIMIT, body).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_non_multipart_body() {
    let state = ModelState::ready(grader_with(StubModel::new(vec![0.2; 5])));
    let filter = routes(state, LIMIT);
    let res = warp::test::request()
        .method("POST")
        .path("/predict")
        .header("content-type", "application/json")
        .body(r#"{"image": "base64"}"#)
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_undecodable_image() {
    let model = StubModel::new(vec![0.2; 5]);
    let state = ModelState::ready(grader_with(model.clone()));

    let res = post_predict(
        state,
        LIMIT,
        multipart_body(&[file_part("file", "knee.jpg", b"definitely not a jpeg")]),
    )
    .await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_message(res.body()), PREDICTION_FAILED);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_upload_too_large() {
    let model = StubModel::new(vec![0.2; 5]);
    let state = ModelState::ready(grader_with(model.clone()));

    let jpeg = sample_jpeg();
    let res = post_predict(state, 256, multipart_body(&[file_part("file", "knee.jpg", &jpeg)])).await;

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_index_serves_form() {
    let filter = routes(ModelState::new(), LIMIT);
    let res = warp::test::request().path("/").reply(&filter).await;

    assert_eq!(res.status(), StatusCode::OK);
    let content_type = res.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/html"));
    let html = String::from_utf8(res.body().to_vec()).unwrap();
    assert!(html.contains("name=\"file\""));
    assert!(html.contains("/predict"));
    // The description already carries the "Grade N:" prefix and wording.
    assert!(html.contains("body.description"));
    assert!(!html.contains("Grade ${body.grade}"));
    assert!(!html.contains("Mild"));
}

#[tokio::test]
async fn test_health_always_ok() {
    let filter = routes(failed_state().await, LIMIT);
    let res = warp::test::request().path("/health").reply(&filter).await;

    assert_eq!(res.status(), StatusCode::OK);
    let value: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(value["status"], "healthy");
}

#[tokio::test]
async fn test_ready_tracks_state() {
    let state = ModelState::new();
    let filter = routes(state.clone(), LIMIT);

    let res = warp::test::request().path("/ready").reply(&filter).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let value: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(value["status"], "uninitialized");

    state.begin_loading().await.unwrap();
    let res = warp::test::request().path("/ready").reply(&filter).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    state
        .publish(Ok(grader_with(StubModel::new(vec![0.2; 5]))))
        .await
        .unwrap();
    let res = warp::test::request().path("/ready").reply(&filter).await;
    assert_eq!(res.status(), StatusCode::OK);
    let value: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(value["status"], "ready");
    assert_eq!(value["model"], "custom");
}

#[tokio::test]
async fn test_ready_reports_failure_reason() {
    let filter = routes(failed_state().await, LIMIT);
    let res = warp::test::request().path("/ready").reply(&filter).await;

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let value: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(value["status"], "failed");
    assert_eq!(value["reason"], "weights missing");
}

#[tokio::test]
async fn test_unknown_route_and_wrong_method() {
    let filter = routes(ModelState::new(), LIMIT);

    let res = warp::test::request().path("/nope").reply(&filter).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = warp::test::request().method("GET").path("/predict").reply(&filter).await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_concurrent_predictions() {
    let model = StubModel::new(vec![0.1, 0.1, 0.1, 0.6, 0.1]);
    let state = ModelState::ready(grader_with(model.clone()));
    let jpeg = sample_jpeg();

    let requests = (0..4).map(|_| {
        post_predict(
            state.clone(),
            LIMIT,
            multipart_body(&[file_part("file", "knee.jpg", &jpeg)]),
        )
    });
    let responses = futures_util::future::join_all(requests).await;

    for res in responses {
        assert_eq!(res.status(), StatusCode::OK);
        let result: GradeResult = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(result.grade, 3);
    }
    assert_eq!(model.calls(), 4);
}
