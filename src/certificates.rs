use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::{CERTIFICATE_CODE_HEX_LEN, CERTIFICATE_CODE_PREFIX, MAX_CODE_ATTEMPTS},
    error::{require_positive, AppError},
    gateway::Collaborators,
    models::*,
    store::{CertificateInsert, Store},
};

/// `CERT-` followed by 12 uppercase hex digits from a v4 UUID.
pub fn new_certificate_code() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{CERTIFICATE_CODE_PREFIX}{}", &hex[..CERTIFICATE_CODE_HEX_LEN])
}

#[derive(Debug, Clone, PartialEq)]
pub enum Issuance {
    Issued(CertificateResponse),
    /// The enrollment already had a certificate.
    Existing(CertificateResponse),
}

impl Issuance {
    pub fn certificate(&self) -> &CertificateResponse {
        match self {
            Issuance::Issued(c) | Issuance::Existing(c) => c,
        }
    }
}

pub struct CertificateIssuer {
    store: Arc<dyn Store>,
    remote: Collaborators,
    base_path: String,
}

impl CertificateIssuer {
    pub fn new(store: Arc<dyn Store>, remote: Collaborators, base_path: impl Into<String>) -> Self {
        Self { store, remote, base_path: base_path.into() }
    }

    /// Issues the enrollment's certificate, or returns the one it already has.
    pub async fn generate(&self, enrollment_id: i64) -> Result<Issuance, AppError> {
        require_positive("enrollmentId", enrollment_id)?;
        let enrollment = self
            .store
            .enrollment(enrollment_id)
            .await?
            .ok_or_else(|| AppError::enrollment_not_found(enrollment_id))?;

        if enrollment.status != EnrollmentStatus::Completed {
            return Err(AppError::InvalidState(
                "Certificate can only be generated for completed courses".into(),
            ));
        }
        if let Some(existing) = self.store.certificate_by_enrollment(enrollment_id).await? {
            return Ok(Issuance::Existing(self.response(existing)));
        }

        let (student, course) = tokio::join!(
            self.remote.enrich_student(enrollment.student_id),
            self.remote.enrich_course(enrollment.course_id),
        );
        let student_name = student.student_name();
        let course_title = course.course_title();

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let insert = NewCertificate {
                enrollment_id,
                certificate_code: new_certificate_code(),
                student_name: student_name.clone(),
                course_title: course_title.clone(),
                issued_at: Utc::now(),
            };
            match self.store.insert_certificate(insert).await? {
                CertificateInsert::Issued(cert) => {
                    tracing::info!(
                        enrollment_id,
                        code = %cert.certificate_code,
                        "certificate issued"
                    );
                    return Ok(Issuance::Issued(self.response(cert)));
                }
                CertificateInsert::EnrollmentTaken(cert) => {
                    tracing::debug!(enrollment_id, "certificate issued concurrently, returning it");
                    return Ok(Issuance::Existing(self.response(cert)));
                }
                CertificateInsert::CodeTaken => {
                    tracing::warn!(enrollment_id, attempt, "certificate code collision, drawing another");
                }
            }
        }
        Err(AppError::Internal(format!(
            "no unique certificate code after {MAX_CODE_ATTEMPTS} attempts"
        )))
    }

    /// Public lookup by code.
    pub async fn verify(&self, code: &str) -> Result<CertificateResponse, AppError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::Validation("certificate code must not be empty".into()));
        }
        self.store
            .certificate_by_code(code)
            .await?
            .map(|c| self.response(c))
            .ok_or_else(|| AppError::NotFound(format!("Invalid certificate code: {code}")))
    }

    pub async fn by_enrollment(&self, enrollment_id: i64) -> Result<CertificateResponse, AppError> {
        self.store
            .certificate_by_enrollment(enrollment_id)
            .await?
            .map(|c| self.response(c))
            .ok_or_else(|| {
                AppError::NotFound(format!("Certificate not found for enrollment: {enrollment_id}"))
            })
    }

    pub async fn by_student(&self, student_id: i64) -> Result<Vec<CertificateResponse>, AppError> {
        let rows = self.store.certificates_by_student(student_id).await?;
        Ok(rows.into_iter().map(|c| self.response(c)).collect())
    }

    fn response(&self, cert: Certificate) -> CertificateResponse {
        CertificateResponse::new(cert, &self.base_path)
    }
}
