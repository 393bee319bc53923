//! Typed access to the catalog and profile services.
//!
//! Every call carries its own deadline and reports failure as a
//! [`RemoteError`]. Callers decide whether a failure is fatal (existence
//! checks, quiz answer keys) or degrades to a placeholder via [`Enrichment`].

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

use crate::config::{Config, UNKNOWN_COURSE, UNKNOWN_STUDENT};

pub const CATALOG_SERVICE: &str = "catalog-service";
pub const STUDENT_SERVICE: &str = "student-service";

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("{resource} not found with ID: {id}")]
    NotFound { resource: &'static str, id: i64 },
    #[error("{service} did not answer within {after:?}")]
    Timeout { service: &'static str, after: Duration },
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },
    #[error("{service} returned an unreadable body: {reason}")]
    Decode { service: &'static str, reason: String },
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }
}

// --- collaborator payloads ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl StudentSummary {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Quiz definition including the answer key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizDetail {
    pub id: i64,
    #[serde(default)]
    pub passing_score: Option<i32>,
    #[serde(default)]
    pub questions: Vec<QuestionDetail>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDetail {
    pub id: i64,
    #[serde(default)]
    pub answers: Vec<AnswerDetail>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDetail {
    pub id: i64,
    #[serde(default)]
    pub correct: bool,
}

// --- collaborator contracts ---

#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn course_by_id(&self, id: i64) -> Result<CourseSummary, RemoteError>;
    async fn quiz_by_id(&self, id: i64) -> Result<QuizDetail, RemoteError>;
    async fn total_lesson_count(&self, course_id: i64) -> Result<i64, RemoteError>;
}

#[async_trait]
pub trait ProfileClient: Send + Sync {
    async fn student_by_id(&self, id: i64) -> Result<StudentSummary, RemoteError>;
}

/// Outcome of a soft-dependency lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment<T> {
    Resolved(T),
    Unavailable,
}

impl<T> Enrichment<T> {
    /// Absorbs `result`, logging the failure it replaces.
    pub fn from_result(service: &'static str, id: i64, result: Result<T, RemoteError>) -> Self {
        match result {
            Ok(v) => Enrichment::Resolved(v),
            Err(err) => {
                tracing::warn!(service, id, error = %err, "enrichment unavailable, using placeholder");
                Enrichment::Unavailable
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Enrichment::Resolved(_))
    }
}

impl Enrichment<StudentSummary> {
    /// A profile whose name is blank counts as unavailable.
    pub fn require_name(self) -> Self {
        match self {
            Enrichment::Resolved(s) if s.display_name().is_empty() => {
                tracing::warn!(service = STUDENT_SERVICE, id = s.id, "student profile has no name, using placeholder");
                Enrichment::Unavailable
            }
            other => other,
        }
    }

    /// "First Last", or [`UNKNOWN_STUDENT`].
    pub fn student_name(&self) -> String {
        match self {
            Enrichment::Resolved(s) => s.display_name(),
            Enrichment::Unavailable => UNKNOWN_STUDENT.to_string(),
        }
    }
}

impl Enrichment<CourseSummary> {
    /// Course title, or [`UNKNOWN_COURSE`].
    pub fn course_title(&self) -> String {
        match self {
            Enrichment::Resolved(c) => c.title.clone(),
            Enrichment::Unavailable => UNKNOWN_COURSE.to_string(),
        }
    }
}

/// Both collaborators, shared by the services.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogClient>,
    pub profile: Arc<dyn ProfileClient>,
}

impl Collaborators {
    pub fn new(catalog: Arc<dyn CatalogClient>, profile: Arc<dyn ProfileClient>) -> Self {
        Self { catalog, profile }
    }

    /// reqwest-backed clients for the configured service URLs.
    pub fn http(cfg: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(cfg.remote_timeout)
            .build()?;
        Ok(Self {
            catalog: Arc::new(HttpCatalogClient::new(client.clone(), &cfg.catalog_url, cfg.remote_timeout)),
            profile: Arc::new(HttpProfileClient::new(client, &cfg.student_url, cfg.remote_timeout)),
        })
    }

    pub async fn enrich_student(&self, id: i64) -> Enrichment<StudentSummary> {
        Enrichment::from_result(STUDENT_SERVICE, id, self.profile.student_by_id(id).await).require_name()
    }

    pub async fn enrich_course(&self, id: i64) -> Enrichment<CourseSummary> {
        Enrichment::from_result(CATALOG_SERVICE, id, self.catalog.course_by_id(id).await)
    }
}

// --- HTTP implementations ---

#[derive(Clone)]
struct RemoteHttp {
    client: Client,
    base_url: String,
    timeout: Duration,
    service: &'static str,
}

impl RemoteHttp {
    fn new(client: Client, base_url: &str, timeout: Duration, service: &'static str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            service,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        resource: &'static str,
        id: i64,
    ) -> Result<T, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        let service = self.service;
        let call = async {
            let resp = self.client.get(&url).send().await.map_err(|e| RemoteError::Unavailable {
                service,
                reason: e.to_string(),
            })?;
            match resp.status() {
                StatusCode::NOT_FOUND => Err(RemoteError::NotFound { resource, id }),
                s if !s.is_success() => Err(RemoteError::Unavailable {
                    service,
                    reason: format!("status {s}"),
                }),
                _ => resp.json::<T>().await.map_err(|e| RemoteError::Decode {
                    service,
                    reason: e.to_string(),
                }),
            }
        };
        tracing::debug!(%url, "remote call");
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| RemoteError::Timeout { service, after: self.timeout })?
    }
}

pub struct HttpCatalogClient {
    http: RemoteHttp,
}

impl HttpCatalogClient {
    pub fn new(client: Client, base_url: &str, timeout: Duration) -> Self {
        Self { http: RemoteHttp::new(client, base_url, timeout, CATALOG_SERVICE) }
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn course_by_id(&self, id: i64) -> Result<CourseSummary, RemoteError> {
        self.http.get_json(&format!("/courses/{id}"), "Course", id).await
    }

    async fn quiz_by_id(&self, id: i64) -> Result<QuizDetail, RemoteError> {
        self.http.get_json(&format!("/content/quizzes/{id}"), "Quiz", id).await
    }

    async fn total_lesson_count(&self, course_id: i64) -> Result<i64, RemoteError> {
        self.http
            .get_json(&format!("/courses/{course_id}/lesson-count"), "Course", course_id)
            .await
    }
}

pub struct HttpProfileClient {
    http: RemoteHttp,
}

impl HttpProfileClient {
    pub fn new(client: Client, base_url: &str, timeout: Duration) -> Self {
        Self { http: RemoteHttp::new(client, base_url, timeout, STUDENT_SERVICE) }
    }
}

#[async_trait]
impl ProfileClient for HttpProfileClient {
    async fn student_by_id(&self, id: i64) -> Result<StudentSummary, RemoteError> {
        self.http.get_json(&format!("/students/{id}"), "Student", id).await
    }
}
