use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::*;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("{table} references missing enrollment {enrollment_id}")]
    MissingEnrollment { table: &'static str, enrollment_id: i64 },
}

/// Result of latching a lesson as completed.
#[derive(Debug, Clone, PartialEq)]
pub enum LessonMark {
    /// This call flipped the latch (row created or updated).
    Completed(LessonProgress),
    /// The row was already completed; returned unchanged.
    AlreadyCompleted(LessonProgress),
}

impl LessonMark {
    pub fn into_row(self) -> LessonProgress {
        match self {
            LessonMark::Completed(r) | LessonMark::AlreadyCompleted(r) => r,
        }
    }

    /// A fresh latch always recomputes; a repeat only while still ACTIVE.
    pub fn needs_recompute(&self, status: EnrollmentStatus) -> bool {
        matches!(self, LessonMark::Completed(_)) || status == EnrollmentStatus::Active
    }
}

/// Outcome of [`Store::complete_lesson`].
#[derive(Debug, Clone, PartialEq)]
pub struct LessonCompletion {
    pub mark: LessonMark,
    /// Set when a lesson total was supplied and a recompute ran.
    pub recompute: Option<Recompute>,
}

/// Enrollment state on both sides of a serialized recompute.
#[derive(Debug, Clone, PartialEq)]
pub struct Recompute {
    pub previous: Enrollment,
    pub current: Enrollment,
}

impl Recompute {
    pub fn completed_now(&self) -> bool {
        self.previous.status == EnrollmentStatus::Active
            && self.current.status == EnrollmentStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CertificateInsert {
    Issued(Certificate),
    /// Another caller already holds the enrollment's certificate.
    EnrollmentTaken(Certificate),
    /// The generated code is in use; draw another.
    CodeTaken,
}

/// Persistence for the orchestration aggregates.
///
/// Implementations enforce the uniqueness constraints themselves (student and
/// course per enrollment, lesson per enrollment, certificate per enrollment
/// and per code) so racing callers observe the winner instead of a duplicate.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    /// `None` when (student, course) is already enrolled.
    async fn insert_enrollment(
        &self,
        student_id: i64,
        course_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Enrollment>, StoreError>;
    async fn enrollment(&self, id: i64) -> Result<Option<Enrollment>, StoreError>;
    async fn enrollments_by_student(&self, student_id: i64) -> Result<Vec<Enrollment>, StoreError>;
    async fn enrollments_by_course(&self, course_id: i64) -> Result<Vec<Enrollment>, StoreError>;

    /// Latches (enrollment, lesson) as completed and, given the course's
    /// lesson total, recomputes progress in the same transaction.
    ///
    /// With `total_lessons = None` only the latch is written. A lesson that
    /// was already completed still recomputes while the enrollment is ACTIVE,
    /// so a count missed by an earlier call is picked up on retry.
    async fn complete_lesson(
        &self,
        enrollment_id: i64,
        lesson_id: i64,
        total_lessons: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<LessonCompletion, StoreError>;
    async fn lessons(&self, enrollment_id: i64) -> Result<Vec<LessonProgress>, StoreError>;

    /// Counts completed lessons and applies
    /// [`apply_lesson_counts`](crate::progress::apply_lesson_counts) while
    /// holding the enrollment exclusively. `None` if the enrollment is gone.
    async fn recompute_progress(
        &self,
        enrollment_id: i64,
        total_lessons: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Recompute>, StoreError>;

    async fn insert_quiz_attempt(&self, attempt: NewQuizAttempt) -> Result<QuizAttempt, StoreError>;
    async fn quiz_attempts(&self, enrollment_id: i64) -> Result<Vec<QuizAttempt>, StoreError>;

    async fn insert_certificate(&self, cert: NewCertificate) -> Result<CertificateInsert, StoreError>;
    async fn certificate_by_enrollment(&self, enrollment_id: i64) -> Result<Option<Certificate>, StoreError>;
    async fn certificate_by_code(&self, code: &str) -> Result<Option<Certificate>, StoreError>;
    async fn certificates_by_student(&self, student_id: i64) -> Result<Vec<Certificate>, StoreError>;
}
