#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learning_orchestrator::{
    config::Config,
    gateway::{
        AnswerDetail, CatalogClient, Collaborators, CourseSummary, ProfileClient, QuestionDetail,
        QuizDetail, RemoteError, StudentSummary,
    },
    memory::MemoryStore,
    models::*,
    store::{CertificateInsert, LessonCompletion, Recompute, Store, StoreError},
    AppState,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// In-process catalog with switchable outages.
#[derive(Default)]
pub struct StubCatalog {
    courses: Mutex<HashMap<i64, (CourseSummary, i64)>>,
    quizzes: Mutex<HashMap<i64, QuizDetail>>,
    pub offline: AtomicBool,
    pub lesson_count_offline: AtomicBool,
    pub lesson_count_calls: AtomicUsize,
    pub course_calls: AtomicUsize,
    /// Added to every course lookup.
    pub course_delay: Mutex<Duration>,
}

impl StubCatalog {
    pub fn add_course(&self, id: i64, title: &str, lessons: i64) {
        let course = CourseSummary { id, title: title.into(), status: Some("PUBLISHED".into()) };
        self.courses.lock().unwrap().insert(id, (course, lessons));
    }

    pub fn set_lesson_count(&self, id: i64, lessons: i64) {
        if let Some(entry) = self.courses.lock().unwrap().get_mut(&id) {
            entry.1 = lessons;
        }
    }

    pub fn add_quiz(&self, quiz: QuizDetail) {
        self.quizzes.lock().unwrap().insert(quiz.id, quiz);
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Timeout { service: "catalog-service", after: Duration::from_millis(5) });
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogClient for StubCatalog {
    async fn course_by_id(&self, id: i64) -> Result<CourseSummary, RemoteError> {
        self.course_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.course_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_online()?;
        self.courses
            .lock()
            .unwrap()
            .get(&id)
            .map(|(c, _)| c.clone())
            .ok_or(RemoteError::NotFound { resource: "Course", id })
    }

    async fn quiz_by_id(&self, id: i64) -> Result<QuizDetail, RemoteError> {
        self.check_online()?;
        self.quizzes
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(RemoteError::NotFound { resource: "Quiz", id })
    }

    async fn total_lesson_count(&self, course_id: i64) -> Result<i64, RemoteError> {
        self.lesson_count_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if self.lesson_count_offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable { service: "catalog-service", reason: "status 503".into() });
        }
        self.courses
            .lock()
            .unwrap()
            .get(&course_id)
            .map(|(_, n)| *n)
            .ok_or(RemoteError::NotFound { resource: "Course", id: course_id })
    }
}

#[derive(Default)]
pub struct StubProfile {
    students: Mutex<HashMap<i64, StudentSummary>>,
    pub offline: AtomicBool,
}

impl StubProfile {
    pub fn add_student(&self, id: i64, first: &str, last: &str) {
        let s = StudentSummary {
            id,
            first_name: first.into(),
            last_name: last.into(),
            email: Some(format!("{}@example.org", first.to_lowercase())),
        };
        self.students.lock().unwrap().insert(id, s);
    }
}

#[async_trait]
impl ProfileClient for StubProfile {
    async fn student_by_id(&self, id: i64) -> Result<StudentSummary, RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable { service: "student-service", reason: "connection refused".into() });
        }
        self.students
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(RemoteError::NotFound { resource: "Student", id })
    }
}

/// [`MemoryStore`] whose next `complete_lesson` can be made to fail before
/// anything is written, like a transaction that rolled back.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_next_completion: AtomicBool,
}

#[async_trait]
impl Store for FlakyStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn insert_enrollment(
        &self,
        student_id: i64,
        course_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Enrollment>, StoreError> {
        self.inner.insert_enrollment(student_id, course_id, now).await
    }

    async fn enrollment(&self, id: i64) -> Result<Option<Enrollment>, StoreError> {
        self.inner.enrollment(id).await
    }

    async fn enrollments_by_student(&self, student_id: i64) -> Result<Vec<Enrollment>, StoreError> {
        self.inner.enrollments_by_student(student_id).await
    }

    async fn enrollments_by_course(&self, course_id: i64) -> Result<Vec<Enrollment>, StoreError> {
        self.inner.enrollments_by_course(course_id).await
    }

    async fn complete_lesson(
        &self,
        enrollment_id: i64,
        lesson_id: i64,
        total_lessons: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<LessonCompletion, StoreError> {
        if self.fail_next_completion.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.complete_lesson(enrollment_id, lesson_id, total_lessons, now).await
    }

    async fn lessons(&self, enrollment_id: i64) -> Result<Vec<LessonProgress>, StoreError> {
        self.inner.lessons(enrollment_id).await
    }

    async fn recompute_progress(
        &self,
        enrollment_id: i64,
        total_lessons: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Recompute>, StoreError> {
        self.inner.recompute_progress(enrollment_id, total_lessons, now).await
    }

    async fn insert_quiz_attempt(&self, attempt: NewQuizAttempt) -> Result<QuizAttempt, StoreError> {
        self.inner.insert_quiz_attempt(attempt).await
    }

    async fn quiz_attempts(&self, enrollment_id: i64) -> Result<Vec<QuizAttempt>, StoreError> {
        self.inner.quiz_attempts(enrollment_id).await
    }

    async fn insert_certificate(&self, cert: NewCertificate) -> Result<CertificateInsert, StoreError> {
        self.inner.insert_certificate(cert).await
    }

    async fn certificate_by_enrollment(&self, enrollment_id: i64) -> Result<Option<Certificate>, StoreError> {
        self.inner.certificate_by_enrollment(enrollment_id).await
    }

    async fn certificate_by_code(&self, code: &str) -> Result<Option<Certificate>, StoreError> {
        self.inner.certificate_by_code(code).await
    }

    async fn certificates_by_student(&self, student_id: i64) -> Result<Vec<Certificate>, StoreError> {
        self.inner.certificates_by_student(student_id).await
    }
}

pub struct Harness<S = MemoryStore> {
    pub state: AppState,
    pub store: Arc<S>,
    pub catalog: Arc<StubCatalog>,
    pub profile: Arc<StubProfile>,
}

/// Student 1 "Ada Lovelace", course 100 "Rust Basics" with four lessons,
/// quiz 7 with four questions (answer 10n correct, 10n+1 wrong).
pub fn harness() -> Harness {
    harness_on(Arc::new(MemoryStore::new()))
}

pub fn harness_on<S: Store + 'static>(store: Arc<S>) -> Harness<S> {
    let catalog = Arc::new(StubCatalog::default());
    let profile = Arc::new(StubProfile::default());

    profile.add_student(1, "Ada", "Lovelace");
    profile.add_student(2, "Alan", "Turing");
    catalog.add_course(100, "Rust Basics", 4);
    catalog.add_course(200, "Async Rust", 2);
    catalog.add_quiz(quiz(7, 4, None));

    let remote = Collaborators::new(catalog.clone(), profile.clone());
    let state = AppState::new(store.clone(), remote, &Config::default());
    Harness { state, store, catalog, profile }
}

pub fn quiz(id: i64, questions: i64, passing_score: Option<i32>) -> QuizDetail {
    QuizDetail {
        id,
        passing_score,
        questions: (1..=questions)
            .map(|n| QuestionDetail {
                id: n,
                answers: vec![
                    AnswerDetail { id: 10 * n, correct: true },
                    AnswerDetail { id: 10 * n + 1, correct: false },
                ],
            })
            .collect(),
    }
}
