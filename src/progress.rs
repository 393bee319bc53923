use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    error::{require_positive, AppError},
    gateway::{CatalogClient, CATALOG_SERVICE},
    models::*,
    store::{LessonMark, Recompute, Store},
};

/// Next state of `enrollment` given `completed` of `total` lessons done.
///
/// `None` means nothing to write: an unknown lesson total, or a dropped
/// enrollment. A completed enrollment keeps its status and `completed_at`,
/// and its progress never moves down.
pub fn apply_lesson_counts(
    enrollment: &Enrollment,
    completed: i64,
    total: i64,
    now: DateTime<Utc>,
) -> Option<Enrollment> {
    if total <= 0 {
        return None;
    }
    let computed = (completed as f64 / total as f64 * 100.0).min(100.0);
    let mut next = enrollment.clone();

    match enrollment.status {
        EnrollmentStatus::Dropped => return None,
        EnrollmentStatus::Completed => {
            next.progress = enrollment.progress.max(computed);
        }
        EnrollmentStatus::Active => {
            next.progress = computed;
            if computed >= 100.0 {
                next.status = EnrollmentStatus::Completed;
                next.completed_at = enrollment.completed_at.or(Some(now));
            }
        }
    }
    next.last_accessed_at = Some(now);
    Some(next)
}

pub struct ProgressTracker {
    store: Arc<dyn Store>,
    catalog: Arc<dyn CatalogClient>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn Store>, catalog: Arc<dyn CatalogClient>) -> Self {
        Self { store, catalog }
    }

    /// Latches (enrollment, lesson) as completed. Repeat calls return the
    /// original row untouched.
    ///
    /// The lesson total is fetched before anything is written; the latch and
    /// the recompute then commit together or not at all. Without a total only
    /// the latch is written and progress waits for the next mark.
    pub async fn mark_lesson_complete(
        &self,
        req: LessonProgressRequest,
    ) -> Result<ProgressResponse, AppError> {
        require_positive("enrollmentId", req.enrollment_id)?;
        require_positive("lessonId", req.lesson_id)?;

        let enrollment = self
            .store
            .enrollment(req.enrollment_id)
            .await?
            .ok_or_else(|| AppError::enrollment_not_found(req.enrollment_id))?;
        let total = self.lesson_total(&enrollment).await;

        let outcome = self
            .store
            .complete_lesson(enrollment.id, req.lesson_id, total, Utc::now())
            .await?;
        match &outcome.mark {
            LessonMark::AlreadyCompleted(row) => {
                tracing::debug!(enrollment_id = enrollment.id, lesson_id = row.lesson_id, "lesson already completed");
            }
            LessonMark::Completed(row) => {
                tracing::debug!(enrollment_id = enrollment.id, lesson_id = row.lesson_id, "lesson completed");
            }
        }
        if let (Some(r), Some(total)) = (&outcome.recompute, total) {
            log_recompute(r, total);
        }
        Ok(outcome.mark.into_row().into())
    }

    /// Refreshes the aggregate progress from the catalog's lesson total.
    ///
    /// An unreachable catalog leaves the stored progress as it is and
    /// returns `Ok(None)`.
    pub async fn recompute(&self, enrollment: &Enrollment) -> Result<Option<Recompute>, AppError> {
        let Some(total) = self.lesson_total(enrollment).await else {
            return Ok(None);
        };
        let outcome = self
            .store
            .recompute_progress(enrollment.id, total, Utc::now())
            .await?;
        if let Some(r) = &outcome {
            log_recompute(r, total);
        }
        Ok(outcome)
    }

    async fn lesson_total(&self, enrollment: &Enrollment) -> Option<i64> {
        match self.catalog.total_lesson_count(enrollment.course_id).await {
            Ok(n) => Some(n),
            Err(err) => {
                tracing::warn!(
                    service = CATALOG_SERVICE,
                    enrollment_id = enrollment.id,
                    course_id = enrollment.course_id,
                    error = %err,
                    "lesson count unavailable, progress left unchanged"
                );
                None
            }
        }
    }

    pub async fn lessons(&self, enrollment_id: i64) -> Result<Vec<ProgressResponse>, AppError> {
        self.require_enrollment(enrollment_id).await?;
        let rows = self.store.lessons(enrollment_id).await?;
        Ok(rows.into_iter().map(ProgressResponse::from).collect())
    }

    pub async fn quiz_history(&self, enrollment_id: i64) -> Result<Vec<QuizResult>, AppError> {
        self.require_enrollment(enrollment_id).await?;
        let rows = self.store.quiz_attempts(enrollment_id).await?;
        Ok(rows.into_iter().map(QuizResult::from).collect())
    }

    async fn require_enrollment(&self, id: i64) -> Result<Enrollment, AppError> {
        self.store
            .enrollment(id)
            .await?
            .ok_or_else(|| AppError::enrollment_not_found(id))
    }
}

fn log_recompute(r: &Recompute, total: i64) {
    let enrollment_id = r.current.id;
    tracing::debug!(enrollment_id, progress = r.current.progress, total, "progress recomputed");
    if r.completed_now() {
        tracing::info!(enrollment_id, course_id = r.current.course_id, "enrollment completed");
    }
}
