use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, query, query_as, query_scalar, PgConnection, Pool, Postgres};

use crate::{
    models::*,
    progress::apply_lesson_counts,
    store::{CertificateInsert, LessonCompletion, LessonMark, Recompute, Store, StoreError},
};

pub type Db = Pool<Postgres>;

pub async fn connect(url: &str, max_connections: u32) -> Result<Db, StoreError> {
    Ok(PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?)
}

const ENROLLMENT_COLUMNS: &str =
    "id, student_id, course_id, status, progress, enrolled_at, completed_at, last_accessed_at";

const LESSON_COLUMNS: &str = "id, enrollment_id, lesson_id, completed, completed_at";

const ATTEMPT_COLUMNS: &str =
    "id, enrollment_id, quiz_id, score, total_questions, passed, attempted_at";

const CERTIFICATE_SELECT: &str = r#"
    SELECT c.id, c.enrollment_id, e.student_id, e.course_id,
           c.certificate_code, c.student_name, c.course_title, c.issued_at
    FROM certificates c
    JOIN enrollments e ON e.id = c.enrollment_id
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: Db,
}

impl PgStore {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        // crate-relative path for sqlx migrations
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

async fn lock_enrollment(conn: &mut PgConnection, id: i64) -> Result<Option<Enrollment>, StoreError> {
    let sql = format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = $1 FOR UPDATE");
    Ok(query_as::<_, Enrollment>(&sql).bind(id).fetch_optional(&mut *conn).await?)
}

/// Counts completed lessons and writes the next enrollment state. The caller
/// holds the row lock on `previous`.
async fn apply_counts(
    conn: &mut PgConnection,
    previous: Enrollment,
    total_lessons: i64,
    now: DateTime<Utc>,
) -> Result<Recompute, StoreError> {
    let completed: i64 = query_scalar(
        "SELECT COUNT(*) FROM lesson_progress WHERE enrollment_id = $1 AND completed",
    )
    .bind(previous.id)
    .fetch_one(&mut *conn)
    .await?;

    let Some(next) = apply_lesson_counts(&previous, completed, total_lessons, now) else {
        return Ok(Recompute { current: previous.clone(), previous });
    };

    let sql = format!(
        r#"
        UPDATE enrollments
        SET progress = $2, status = $3, completed_at = $4, last_accessed_at = $5
        WHERE id = $1
        RETURNING {ENROLLMENT_COLUMNS}
        "#
    );
    let current = query_as::<_, Enrollment>(&sql)
        .bind(previous.id)
        .bind(next.progress)
        .bind(next.status)
        .bind(next.completed_at)
        .bind(next.last_accessed_at)
        .fetch_one(&mut *conn)
        .await?;
    Ok(Recompute { previous, current })
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_enrollment(
        &self,
        student_id: i64,
        course_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Enrollment>, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO enrollments (student_id, course_id, status, progress, enrolled_at)
            VALUES ($1, $2, $3, 0, $4)
            ON CONFLICT (student_id, course_id) DO NOTHING
            RETURNING {ENROLLMENT_COLUMNS}
            "#
        );
        Ok(query_as::<_, Enrollment>(&sql)
            .bind(student_id)
            .bind(course_id)
            .bind(EnrollmentStatus::Active)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn enrollment(&self, id: i64) -> Result<Option<Enrollment>, StoreError> {
        let sql = format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = $1");
        Ok(query_as::<_, Enrollment>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn enrollments_by_student(&self, student_id: i64) -> Result<Vec<Enrollment>, StoreError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE student_id = $1 ORDER BY id"
        );
        Ok(query_as::<_, Enrollment>(&sql).bind(student_id).fetch_all(&self.pool).await?)
    }

    async fn enrollments_by_course(&self, course_id: i64) -> Result<Vec<Enrollment>, StoreError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE course_id = $1 ORDER BY id"
        );
        Ok(query_as::<_, Enrollment>(&sql).bind(course_id).fetch_all(&self.pool).await?)
    }

    async fn complete_lesson(
        &self,
        enrollment_id: i64,
        lesson_id: i64,
        total_lessons: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<LessonCompletion, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Enrollment row first, then lesson rows: the same order as
        // recompute_progress, so concurrent marks queue instead of deadlocking.
        let previous = lock_enrollment(&mut *tx, enrollment_id)
            .await?
            .ok_or(StoreError::MissingEnrollment { table: "lesson_progress", enrollment_id })?;

        // Returns a row only when this statement flipped the latch.
        let sql = format!(
            r#"
            INSERT INTO lesson_progress (enrollment_id, lesson_id, completed, completed_at)
            VALUES ($1, $2, TRUE, $3)
            ON CONFLICT (enrollment_id, lesson_id) DO UPDATE
                SET completed = TRUE, completed_at = EXCLUDED.completed_at
                WHERE lesson_progress.completed = FALSE
            RETURNING {LESSON_COLUMNS}
            "#
        );
        let flipped = query_as::<_, LessonProgress>(&sql)
            .bind(enrollment_id)
            .bind(lesson_id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
        let mark = match flipped {
            Some(row) => LessonMark::Completed(row),
            None => {
                let sql = format!(
                    "SELECT {LESSON_COLUMNS} FROM lesson_progress WHERE enrollment_id = $1 AND lesson_id = $2"
                );
                let existing = query_as::<_, LessonProgress>(&sql)
                    .bind(enrollment_id)
                    .bind(lesson_id)
                    .fetch_one(&mut *tx)
                    .await?;
                LessonMark::AlreadyCompleted(existing)
            }
        };

        let recompute = match total_lessons {
            Some(total) if mark.needs_recompute(previous.status) => {
                Some(apply_counts(&mut *tx, previous, total, now).await?)
            }
            _ => None,
        };
        tx.commit().await?;

        Ok(LessonCompletion { mark, recompute })
    }

    async fn lessons(&self, enrollment_id: i64) -> Result<Vec<LessonProgress>, StoreError> {
        let sql = format!(
            "SELECT {LESSON_COLUMNS} FROM lesson_progress WHERE enrollment_id = $1 ORDER BY id"
        );
        Ok(query_as::<_, LessonProgress>(&sql).bind(enrollment_id).fetch_all(&self.pool).await?)
    }

    async fn recompute_progress(
        &self,
        enrollment_id: i64,
        total_lessons: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Recompute>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let Some(previous) = lock_enrollment(&mut *tx, enrollment_id).await? else {
            return Ok(None);
        };
        let outcome = apply_counts(&mut *tx, previous, total_lessons, now).await?;
        tx.commit().await?;
        Ok(Some(outcome))
    }

    async fn insert_quiz_attempt(&self, a: NewQuizAttempt) -> Result<QuizAttempt, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO quiz_attempts (enrollment_id, quiz_id, score, total_questions, passed, attempted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ATTEMPT_COLUMNS}
            "#
        );
        Ok(query_as::<_, QuizAttempt>(&sql)
            .bind(a.enrollment_id)
            .bind(a.quiz_id)
            .bind(a.score)
            .bind(a.total_questions)
            .bind(a.passed)
            .bind(a.attempted_at)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn quiz_attempts(&self, enrollment_id: i64) -> Result<Vec<QuizAttempt>, StoreError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE enrollment_id = $1 ORDER BY id"
        );
        Ok(query_as::<_, QuizAttempt>(&sql).bind(enrollment_id).fetch_all(&self.pool).await?)
    }

    async fn insert_certificate(&self, c: NewCertificate) -> Result<CertificateInsert, StoreError> {
        // Both unique constraints (enrollment, code) are absorbed here; the
        // follow-up read tells them apart.
        let inserted: Option<i64> = query_scalar(
            r#"
            INSERT INTO certificates (enrollment_id, certificate_code, student_name, course_title, issued_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            RETURNING id
            "#,
        )
        .bind(c.enrollment_id)
        .bind(&c.certificate_code)
        .bind(&c.student_name)
        .bind(&c.course_title)
        .bind(c.issued_at)
        .fetch_optional(&self.pool)
        .await?;

        match (inserted, self.certificate_by_enrollment(c.enrollment_id).await?) {
            (Some(id), Some(cert)) if cert.id == id => Ok(CertificateInsert::Issued(cert)),
            (_, Some(cert)) => Ok(CertificateInsert::EnrollmentTaken(cert)),
            (_, None) => Ok(CertificateInsert::CodeTaken),
        }
    }

    async fn certificate_by_enrollment(&self, enrollment_id: i64) -> Result<Option<Certificate>, StoreError> {
        let sql = format!("{CERTIFICATE_SELECT} WHERE c.enrollment_id = $1");
        Ok(query_as::<_, Certificate>(&sql).bind(enrollment_id).fetch_optional(&self.pool).await?)
    }

    async fn certificate_by_code(&self, code: &str) -> Result<Option<Certificate>, StoreError> {
        let sql = format!("{CERTIFICATE_SELECT} WHERE c.certificate_code = $1");
        Ok(query_as::<_, Certificate>(&sql).bind(code).fetch_optional(&self.pool).await?)
    }

    async fn certificates_by_student(&self, student_id: i64) -> Result<Vec<Certificate>, StoreError> {
        let sql = format!("{CERTIFICATE_SELECT} WHERE e.student_id = $1 ORDER BY c.id");
        Ok(query_as::<_, Certificate>(&sql).bind(student_id).fetch_all(&self.pool).await?)
    }
}
