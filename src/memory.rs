use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::{
    models::*,
    progress::apply_lesson_counts,
    store::{CertificateInsert, LessonCompletion, LessonMark, Recompute, Store, StoreError},
};

#[derive(Default)]
struct Tables {
    enrollment_seq: i64,
    lesson_seq: i64,
    attempt_seq: i64,
    certificate_seq: i64,
    enrollments: BTreeMap<i64, Enrollment>,
    lessons: BTreeMap<(i64, i64), LessonProgress>,
    attempts: Vec<QuizAttempt>,
    certificates: Vec<Certificate>,
}

impl Tables {
    fn apply_counts(&mut self, previous: Enrollment, total_lessons: i64, now: DateTime<Utc>) -> Recompute {
        let completed = self
            .lessons
            .values()
            .filter(|l| l.enrollment_id == previous.id && l.completed)
            .count() as i64;
        let current = match apply_lesson_counts(&previous, completed, total_lessons, now) {
            Some(next) => {
                self.enrollments.insert(previous.id, next.clone());
                next
            }
            None => previous.clone(),
        };
        Recompute { previous, current }
    }
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

/// Process-local store. One lock serializes every operation, which gives the
/// same guarantees the Postgres constraints and row locks do.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_enrollment(
        &self,
        student_id: i64,
        course_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Enrollment>, StoreError> {
        let mut t = self.tables.lock().await;
        if t.enrollments
            .values()
            .any(|e| e.student_id == student_id && e.course_id == course_id)
        {
            return Ok(None);
        }
        let enrollment = Enrollment {
            id: next(&mut t.enrollment_seq),
            student_id,
            course_id,
            status: EnrollmentStatus::Active,
            progress: 0.0,
            enrolled_at: now,
            completed_at: None,
            last_accessed_at: None,
        };
        t.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(Some(enrollment))
    }

    async fn enrollment(&self, id: i64) -> Result<Option<Enrollment>, StoreError> {
        Ok(self.tables.lock().await.enrollments.get(&id).cloned())
    }

    async fn enrollments_by_student(&self, student_id: i64) -> Result<Vec<Enrollment>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.enrollments.values().filter(|e| e.student_id == student_id).cloned().collect())
    }

    async fn enrollments_by_course(&self, course_id: i64) -> Result<Vec<Enrollment>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.enrollments.values().filter(|e| e.course_id == course_id).cloned().collect())
    }

    async fn complete_lesson(
        &self,
        enrollment_id: i64,
        lesson_id: i64,
        total_lessons: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<LessonCompletion, StoreError> {
        let mut guard = self.tables.lock().await;
        let t = &mut *guard;
        let Some(previous) = t.enrollments.get(&enrollment_id).cloned() else {
            return Err(StoreError::MissingEnrollment { table: "lesson_progress", enrollment_id });
        };

        let mark = match t.lessons.get_mut(&(enrollment_id, lesson_id)) {
            Some(row) if row.completed => LessonMark::AlreadyCompleted(row.clone()),
            Some(row) => {
                row.completed = true;
                row.completed_at = Some(now);
                LessonMark::Completed(row.clone())
            }
            None => {
                let row = LessonProgress {
                    id: next(&mut t.lesson_seq),
                    enrollment_id,
                    lesson_id,
                    completed: true,
                    completed_at: Some(now),
                };
                t.lessons.insert((enrollment_id, lesson_id), row.clone());
                LessonMark::Completed(row)
            }
        };

        let recompute = match total_lessons {
            Some(total) if mark.needs_recompute(previous.status) => {
                Some(t.apply_counts(previous, total, now))
            }
            _ => None,
        };
        Ok(LessonCompletion { mark, recompute })
    }

    async fn lessons(&self, enrollment_id: i64) -> Result<Vec<LessonProgress>, StoreError> {
        let t = self.tables.lock().await;
        let mut rows: Vec<_> = t
            .lessons
            .values()
            .filter(|l| l.enrollment_id == enrollment_id)
            .cloned()
            .collect();
        rows.sort_by_key(|l| l.id);
        Ok(rows)
    }

    async fn recompute_progress(
        &self,
        enrollment_id: i64,
        total_lessons: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Recompute>, StoreError> {
        let mut t = self.tables.lock().await;
        let Some(previous) = t.enrollments.get(&enrollment_id).cloned() else {
            return Ok(None);
        };
        Ok(Some(t.apply_counts(previous, total_lessons, now)))
    }

    async fn insert_quiz_attempt(&self, a: NewQuizAttempt) -> Result<QuizAttempt, StoreError> {
        let mut t = self.tables.lock().await;
        if !t.enrollments.contains_key(&a.enrollment_id) {
            return Err(StoreError::MissingEnrollment {
                table: "quiz_attempts",
                enrollment_id: a.enrollment_id,
            });
        }
        let attempt = QuizAttempt {
            id: next(&mut t.attempt_seq),
            enrollment_id: a.enrollment_id,
            quiz_id: a.quiz_id,
            score: a.score,
            total_questions: a.total_questions,
            passed: a.passed,
            attempted_at: a.attempted_at,
        };
        t.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn quiz_attempts(&self, enrollment_id: i64) -> Result<Vec<QuizAttempt>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.attempts.iter().filter(|a| a.enrollment_id == enrollment_id).cloned().collect())
    }

    async fn insert_certificate(&self, c: NewCertificate) -> Result<CertificateInsert, StoreError> {
        let mut t = self.tables.lock().await;
        let Some(enrollment) = t.enrollments.get(&c.enrollment_id).cloned() else {
            return Err(StoreError::MissingEnrollment {
                table: "certificates",
                enrollment_id: c.enrollment_id,
            });
        };
        if let Some(existing) = t.certificates.iter().find(|x| x.enrollment_id == c.enrollment_id) {
            return Ok(CertificateInsert::EnrollmentTaken(existing.clone()));
        }
        if t.certificates.iter().any(|x| x.certificate_code == c.certificate_code) {
            return Ok(CertificateInsert::CodeTaken);
        }
        let cert = Certificate {
            id: next(&mut t.certificate_seq),
            enrollment_id: c.enrollment_id,
            student_id: enrollment.student_id,
            course_id: enrollment.course_id,
            certificate_code: c.certificate_code,
            student_name: c.student_name,
            course_title: c.course_title,
            issued_at: c.issued_at,
        };
        t.certificates.push(cert.clone());
        Ok(CertificateInsert::Issued(cert))
    }

    async fn certificate_by_enrollment(&self, enrollment_id: i64) -> Result<Option<Certificate>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.certificates.iter().find(|c| c.enrollment_id == enrollment_id).cloned())
    }

    async fn certificate_by_code(&self, code: &str) -> Result<Option<Certificate>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.certificates.iter().find(|c| c.certificate_code == code).cloned())
    }

    async fn certificates_by_student(&self, student_id: i64) -> Result<Vec<Certificate>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.certificates.iter().filter(|c| c.student_id == student_id).cloned().collect())
    }
}
