use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::HashMap;

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "enrollment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    // No transition leads here yet; kept so stored rows round-trip.
    Dropped,
}

// student_id / course_id are owned by the profile and catalog services.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub status: EnrollmentStatus,
    pub progress: f64,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct LessonProgress {
    pub id: i64,
    pub enrollment_id: i64,
    pub lesson_id: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct QuizAttempt {
    pub id: i64,
    pub enrollment_id: i64,
    pub quiz_id: i64,
    pub score: i32,
    pub total_questions: i32,
    pub passed: bool,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewQuizAttempt {
    pub enrollment_id: i64,
    pub quiz_id: i64,
    pub score: i32,
    pub total_questions: i32,
    pub passed: bool,
    pub attempted_at: DateTime<Utc>,
}

/// A certificate row joined with the ids of its enrollment.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct Certificate {
    pub id: i64,
    pub enrollment_id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub certificate_code: String,
    pub student_name: String,
    pub course_title: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub enrollment_id: i64,
    pub certificate_code: String,
    pub student_name: String,
    pub course_title: String,
    pub issued_at: DateTime<Utc>,
}

// --- request bodies ---

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRequest {
    pub student_id: i64,
    pub course_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgressRequest {
    pub enrollment_id: i64,
    pub lesson_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QuizSubmission {
    pub enrollment_id: i64,
    pub quiz_id: i64,
    /// questionId -> answerId
    #[serde(default)]
    pub answers: HashMap<i64, i64>,
}

// --- response bodies ---

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentResponse {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub course_title: String,
    pub student_name: String,
    pub status: EnrollmentStatus,
    pub progress: f64,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl EnrollmentResponse {
    pub fn new(enrollment: Enrollment, student_name: String, course_title: String) -> Self {
        Self {
            id: enrollment.id,
            student_id: enrollment.student_id,
            course_id: enrollment.course_id,
            course_title,
            student_name,
            status: enrollment.status,
            progress: enrollment.progress,
            enrolled_at: enrollment.enrolled_at,
            completed_at: enrollment.completed_at,
            last_accessed_at: enrollment.last_accessed_at,
        }
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub id: i64,
    pub enrollment_id: i64,
    pub lesson_id: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<LessonProgress> for ProgressResponse {
    fn from(row: LessonProgress) -> Self {
        Self {
            id: row.id,
            enrollment_id: row.enrollment_id,
            lesson_id: row.lesson_id,
            completed: row.completed,
            completed_at: row.completed_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub attempt_id: i64,
    pub quiz_id: i64,
    pub score: i32,
    pub total_questions: i32,
    pub passed: bool,
    pub attempted_at: DateTime<Utc>,
}

impl From<QuizAttempt> for QuizResult {
    fn from(a: QuizAttempt) -> Self {
        Self {
            attempt_id: a.id,
            quiz_id: a.quiz_id,
            score: a.score,
            total_questions: a.total_questions,
            passed: a.passed,
            attempted_at: a.attempted_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateResponse {
    pub id: i64,
    pub enrollment_id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub student_name: String,
    pub course_title: String,
    pub certificate_code: String,
    pub issued_at: DateTime<Utc>,
    pub verification_url: String,
}

impl CertificateResponse {
    pub fn new(cert: Certificate, base_path: &str) -> Self {
        let verification_url = format!(
            "{}/certificates/verify/{}",
            base_path.trim_end_matches('/'),
            cert.certificate_code
        );
        Self {
            id: cert.id,
            enrollment_id: cert.enrollment_id,
            student_id: cert.student_id,
            course_id: cert.course_id,
            student_name: cert.student_name,
            course_title: cert.course_title,
            certificate_code: cert.certificate_code,
            issued_at: cert.issued_at,
            verification_url,
        }
    }
}
