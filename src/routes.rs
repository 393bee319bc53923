use axum::{
    extract::{FromRequest, FromRequestParts, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    certificates::{CertificateIssuer, Issuance},
    config::Config,
    enrollment::EnrollmentManager,
    error::AppError,
    gateway::Collaborators,
    grading::QuizGrader,
    models::*,
    progress::ProgressTracker,
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub enrollments: Arc<EnrollmentManager>,
    pub progress: Arc<ProgressTracker>,
    pub grader: Arc<QuizGrader>,
    pub certificates: Arc<CertificateIssuer>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, remote: Collaborators, cfg: &Config) -> Self {
        Self {
            enrollments: Arc::new(EnrollmentManager::new(store.clone(), remote.clone())),
            progress: Arc::new(ProgressTracker::new(store.clone(), remote.catalog.clone())),
            grader: Arc::new(QuizGrader::new(store.clone(), remote.catalog.clone())),
            certificates: Arc::new(CertificateIssuer::new(
                store.clone(),
                remote,
                cfg.public_base_path.clone(),
            )),
            store,
        }
    }
}

/// `Json` whose rejections come back as `VALIDATION_ERROR` bodies.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

impl<T: Serialize> IntoResponse for AppJson<T> {
    fn into_response(self) -> Response {
        Json(self.0).into_response()
    }
}

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

type ApiResult<T> = Result<AppJson<T>, AppError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        // enrollment
        .route("/enrollments", post(enroll))
        .route("/enrollments/:id", get(get_enrollment))
        .route("/enrollments/student/:student_id", get(student_enrollments))
        .route("/enrollments/course/:course_id", get(course_enrollments))
        // progress + quizzes
        .route("/progress/lessons", post(mark_lesson))
        .route("/progress/quizzes", post(submit_quiz))
        .route("/progress/enrollments/:id/lessons", get(lesson_history))
        .route("/progress/enrollments/:id/quizzes", get(quiz_history))
        // certificates
        .route("/certificates/generate/:enrollment_id", post(generate_certificate))
        .route("/certificates/verify/:code", get(verify_certificate))
        .route("/certificates/enrollment/:enrollment_id", get(enrollment_certificate))
        .route("/certificates/student/:student_id", get(student_certificates))
        .route("/ready", get(ready))
        .with_state(state)
}

async fn enroll(
    State(st): State<AppState>,
    AppJson(req): AppJson<EnrollmentRequest>,
) -> Result<(StatusCode, AppJson<EnrollmentResponse>), AppError> {
    let created = st.enrollments.enroll(req).await?;
    Ok((StatusCode::CREATED, AppJson(created)))
}

async fn get_enrollment(
    State(st): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<EnrollmentResponse> {
    Ok(AppJson(st.enrollments.get(id).await?))
}

async fn student_enrollments(
    State(st): State<AppState>,
    AppPath(student_id): AppPath<i64>,
) -> ApiResult<Vec<EnrollmentResponse>> {
    Ok(AppJson(st.enrollments.by_student(student_id).await?))
}

async fn course_enrollments(
    State(st): State<AppState>,
    AppPath(course_id): AppPath<i64>,
) -> ApiResult<Vec<EnrollmentResponse>> {
    Ok(AppJson(st.enrollments.by_course(course_id).await?))
}

async fn mark_lesson(
    State(st): State<AppState>,
    AppJson(req): AppJson<LessonProgressRequest>,
) -> ApiResult<ProgressResponse> {
    Ok(AppJson(st.progress.mark_lesson_complete(req).await?))
}

async fn submit_quiz(
    State(st): State<AppState>,
    AppJson(submission): AppJson<QuizSubmission>,
) -> ApiResult<QuizResult> {
    Ok(AppJson(st.grader.submit_quiz(submission).await?))
}

async fn lesson_history(
    State(st): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<Vec<ProgressResponse>> {
    Ok(AppJson(st.progress.lessons(id).await?))
}

async fn quiz_history(
    State(st): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<Vec<QuizResult>> {
    Ok(AppJson(st.progress.quiz_history(id).await?))
}

async fn generate_certificate(
    State(st): State<AppState>,
    AppPath(enrollment_id): AppPath<i64>,
) -> Result<(StatusCode, AppJson<CertificateResponse>), AppError> {
    Ok(match st.certificates.generate(enrollment_id).await? {
        Issuance::Issued(c) => (StatusCode::CREATED, AppJson(c)),
        Issuance::Existing(c) => (StatusCode::OK, AppJson(c)),
    })
}

async fn verify_certificate(
    State(st): State<AppState>,
    AppPath(code): AppPath<String>,
) -> ApiResult<CertificateResponse> {
    Ok(AppJson(st.certificates.verify(&code).await?))
}

async fn enrollment_certificate(
    State(st): State<AppState>,
    AppPath(enrollment_id): AppPath<i64>,
) -> ApiResult<CertificateResponse> {
    Ok(AppJson(st.certificates.by_enrollment(enrollment_id).await?))
}

async fn student_certificates(
    State(st): State<AppState>,
    AppPath(student_id): AppPath<i64>,
) -> ApiResult<Vec<CertificateResponse>> {
    Ok(AppJson(st.certificates.by_student(student_id).await?))
}

async fn ready(State(st): State<AppState>) -> Response {
    match st.store.ping().await {
        Ok(()) => Json(serde_json::json!({ "status": "ready", "storage": true })).into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "readiness check: storage unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "degraded", "storage": false })),
            )
                .into_response()
        }
    }
}
