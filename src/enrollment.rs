use chrono::Utc;
use std::{
    collections::{BTreeSet, HashMap},
    future::Future,
    sync::Arc,
};
use tokio::task::JoinSet;

use crate::{
    config::{UNKNOWN_COURSE, UNKNOWN_STUDENT},
    error::{require_positive, AppError},
    gateway::{Collaborators, Enrichment},
    models::*,
    store::Store,
};

pub struct EnrollmentManager {
    store: Arc<dyn Store>,
    remote: Collaborators,
}

impl EnrollmentManager {
    pub fn new(store: Arc<dyn Store>, remote: Collaborators) -> Self {
        Self { store, remote }
    }

    /// Creates an ACTIVE enrollment after both the student and the course
    /// have been confirmed by their owning services.
    pub async fn enroll(&self, req: EnrollmentRequest) -> Result<EnrollmentResponse, AppError> {
        require_positive("studentId", req.student_id)?;
        require_positive("courseId", req.course_id)?;

        let student = self
            .remote
            .profile
            .student_by_id(req.student_id)
            .await
            .map_err(AppError::hard_dependency)?;
        let course = self
            .remote
            .catalog
            .course_by_id(req.course_id)
            .await
            .map_err(AppError::hard_dependency)?;

        let enrollment = self
            .store
            .insert_enrollment(req.student_id, req.course_id, Utc::now())
            .await?
            .ok_or_else(|| {
                AppError::DuplicateEnrollment(format!(
                    "Student {} is already enrolled in course {}",
                    req.student_id, req.course_id
                ))
            })?;

        tracing::info!(
            enrollment_id = enrollment.id,
            student_id = enrollment.student_id,
            course_id = enrollment.course_id,
            "enrollment created"
        );
        let student_name = Enrichment::Resolved(student).require_name().student_name();
        Ok(EnrollmentResponse::new(enrollment, student_name, course.title))
    }

    pub async fn get(&self, id: i64) -> Result<EnrollmentResponse, AppError> {
        let enrollment = self
            .store
            .enrollment(id)
            .await?
            .ok_or_else(|| AppError::enrollment_not_found(id))?;
        let (student, course) = tokio::join!(
            self.remote.enrich_student(enrollment.student_id),
            self.remote.enrich_course(enrollment.course_id),
        );
        Ok(EnrollmentResponse::new(enrollment, student.student_name(), course.course_title()))
    }

    /// All enrollments of one student; the name is looked up once and the
    /// course titles concurrently.
    pub async fn by_student(&self, student_id: i64) -> Result<Vec<EnrollmentResponse>, AppError> {
        let rows = self.store.enrollments_by_student(student_id).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let course_ids: BTreeSet<i64> = rows.iter().map(|e| e.course_id).collect();
        let (student, titles) = tokio::join!(
            self.remote.enrich_student(student_id),
            self.resolve_all(course_ids, |remote, id| async move {
                remote.enrich_course(id).await.course_title()
            }),
        );
        let student_name = student.student_name();

        Ok(rows
            .into_iter()
            .map(|e| {
                let title = titles.get(&e.course_id).cloned().unwrap_or_else(|| UNKNOWN_COURSE.to_string());
                EnrollmentResponse::new(e, student_name.clone(), title)
            })
            .collect())
    }

    pub async fn by_course(&self, course_id: i64) -> Result<Vec<EnrollmentResponse>, AppError> {
        let rows = self.store.enrollments_by_course(course_id).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let student_ids: BTreeSet<i64> = rows.iter().map(|e| e.student_id).collect();
        let (course, names) = tokio::join!(
            self.remote.enrich_course(course_id),
            self.resolve_all(student_ids, |remote, id| async move {
                remote.enrich_student(id).await.student_name()
            }),
        );
        let course_title = course.course_title();

        Ok(rows
            .into_iter()
            .map(|e| {
                let name = names.get(&e.student_id).cloned().unwrap_or_else(|| UNKNOWN_STUDENT.to_string());
                EnrollmentResponse::new(e, name, course_title.clone())
            })
            .collect())
    }

    /// Runs one lookup task per distinct id. A task that dies leaves its id
    /// out of the map, and callers fall back to the placeholder.
    async fn resolve_all<F, Fut>(&self, ids: BTreeSet<i64>, lookup: F) -> HashMap<i64, String>
    where
        F: Fn(Collaborators, i64) -> Fut,
        Fut: Future<Output = String> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for id in ids {
            let fut = lookup(self.remote.clone(), id);
            tasks.spawn(async move { (id, fut.await) });
        }
        let mut resolved = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, value)) => {
                    resolved.insert(id, value);
                }
                Err(err) => tracing::warn!(error = %err, "enrichment task failed"),
            }
        }
        resolved
    }
}
