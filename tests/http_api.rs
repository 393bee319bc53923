mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use common::harness;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use tower::ServiceExt;

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&b).expect("serialize body")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body bytes");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn app() -> (Router, common::Harness) {
    let h = harness();
    (learning_orchestrator::app(h.state.clone()), h)
}

#[tokio::test]
async fn health_and_ready() {
    let (router, _h) = app();
    let response = router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("req"))
        .await
        .expect("health call");
    assert_eq!(response.status(), StatusCode::OK);

    let (status, body) = call(&router, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn enrollment_endpoints() {
    let (router, _h) = app();

    let (status, body) = call(&router, "POST", "/enrollments", Some(json!({"studentId": 1, "courseId": 100}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "ACTIVE");
    assert_eq!(body["progress"], 0.0);
    assert_eq!(body["studentName"], "Ada Lovelace");
    assert!(body.get("completedAt").is_none());
    let id = body["id"].as_i64().expect("id");

    let (status, body) = call(&router, "POST", "/enrollments", Some(json!({"studentId": 1, "courseId": 100}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "DUPLICATE_ENROLLMENT");
    assert_eq!(body["status"], 409);
    assert!(body["message"].as_str().is_some());

    let (status, body) = call(&router, "POST", "/enrollments", Some(json!({"studentId": 42, "courseId": 100}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "SERVICE_COMMUNICATION_ERROR");

    let (status, body) = call(&router, "GET", &format!("/enrollments/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["courseTitle"], "Rust Basics");

    let (status, body) = call(&router, "GET", "/enrollments/student/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, body) = call(&router, "GET", "/enrollments/course/100", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["studentId"], 1);

    let (status, body) = call(&router, "GET", "/enrollments/9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn collaborator_outage_on_enroll_is_bad_gateway() {
    let (router, h) = app();
    h.catalog.offline.store(true, Ordering::SeqCst);
    let (status, body) = call(&router, "POST", "/enrollments", Some(json!({"studentId": 1, "courseId": 100}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "SERVICE_COMMUNICATION_ERROR");
}

#[tokio::test]
async fn malformed_input_is_a_validation_error() {
    let (router, _h) = app();

    let (status, body) = call(&router, "POST", "/enrollments", Some(json!({"studentId": "one"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, body) = call(&router, "POST", "/enrollments", Some(json!({"studentId": 0, "courseId": 100}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, body) = call(&router, "GET", "/enrollments/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn progress_quiz_and_certificate_endpoints() {
    let (router, _h) = app();
    let (_, body) = call(&router, "POST", "/enrollments", Some(json!({"studentId": 2, "courseId": 200}))).await;
    let id = body["id"].as_i64().expect("id");

    let (status, body) = call(&router, "POST", &format!("/certificates/generate/{id}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "INVALID_STATE");

    let (status, first) = call(&router, "POST", "/progress/lessons", Some(json!({"enrollmentId": id, "lessonId": 1}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["completed"], true);
    let (_, again) = call(&router, "POST", "/progress/lessons", Some(json!({"enrollmentId": id, "lessonId": 1}))).await;
    assert_eq!(first["completedAt"], again["completedAt"]);

    let (status, quiz) = call(
        &router,
        "POST",
        "/progress/quizzes",
        Some(json!({"enrollmentId": id, "quizId": 7, "answers": {"1": 10, "2": 20, "3": 30, "4": 41}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quiz["score"], 75);
    assert_eq!(quiz["totalQuestions"], 4);
    assert_eq!(quiz["passed"], true);

    call(&router, "POST", "/progress/lessons", Some(json!({"enrollmentId": id, "lessonId": 2}))).await;

    let (_, lessons) = call(&router, "GET", &format!("/progress/enrollments/{id}/lessons"), None).await;
    assert_eq!(lessons.as_array().map(Vec::len), Some(2));
    let (_, attempts) = call(&router, "GET", &format!("/progress/enrollments/{id}/quizzes"), None).await;
    assert_eq!(attempts.as_array().map(Vec::len), Some(1));

    let (status, cert) = call(&router, "POST", &format!("/certificates/generate/{id}"), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let code = cert["certificateCode"].as_str().expect("code").to_string();
    assert_eq!(cert["studentName"], "Alan Turing");

    let (status, repeat) = call(&router, "POST", &format!("/certificates/generate/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(repeat["certificateCode"], code.as_str());

    let (status, verified) = call(&router, "GET", &format!("/certificates/verify/{code}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["enrollmentId"], id);

    let (status, _) = call(&router, "GET", &format!("/certificates/enrollment/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, mine) = call(&router, "GET", "/certificates/student/2", None).await;
    assert_eq!(mine.as_array().map(Vec::len), Some(1));

    let (status, body) = call(&router, "GET", "/certificates/verify/UNKNOWN-CODE", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}
