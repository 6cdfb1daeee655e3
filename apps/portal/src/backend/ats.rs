//! ATS score check. Submits a resume PDF to the backend for scoring.
//!
//! The scoring itself happens server-side; this module validates the upload,
//! builds the multipart form and decodes the report.

use std::path::Path;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::backend::{BackendClient, BackendError, Payload};
use crate::session::{Access, SessionState};

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtsError {
    #[error("Please log in to use the ATS score check")]
    NotSignedIn,

    #[error("'{0}' is not a PDF file")]
    NotPdf(String),

    #[error("Could not read resume: {0}")]
    Io(String),

    #[error("ATS service unreachable: {0}")]
    Network(String),

    #[error("Analysis failed: {0}")]
    Rejected(String),

    #[error("ATS service returned an unreadable report: {0}")]
    Malformed(String),
}

impl From<BackendError> for AtsError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Http(e) => AtsError::Network(e.to_string()),
            BackendError::Api { status, message } if status >= 500 => {
                AtsError::Network(format!("status {status}: {message}"))
            }
            BackendError::Api { message, .. } | BackendError::Rejected(message) => {
                AtsError::Rejected(message)
            }
            other => AtsError::Malformed(other.to_string()),
        }
    }
}

/// A resume ready for upload. Only PDFs are accepted.
#[derive(Debug, Clone)]
pub struct ResumeFile {
    file_name: String,
    contents: Bytes,
}

impl ResumeFile {
    pub fn new(file_name: impl Into<String>, contents: impl Into<Bytes>) -> Result<Self, AtsError> {
        let file_name = file_name.into();
        let contents = contents.into();
        if !contents.starts_with(PDF_MAGIC) {
            return Err(AtsError::NotPdf(file_name));
        }
        Ok(Self {
            file_name,
            contents,
        })
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, AtsError> {
        let path = path.as_ref();
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| AtsError::Io(format!("{}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "resume.pdf".to_string());
        Self::new(file_name, contents)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

/// One ATS check request: the resume plus the signed-in user's email and
/// optional job targeting.
#[derive(Debug, Clone)]
pub struct AtsSubmission {
    pub resume: ResumeFile,
    pub email: String,
    pub job_title: Option<String>,
    pub company: Option<String>,
}

impl AtsSubmission {
    /// Builds a submission for whoever is signed in. Fails while the session is
    /// still resolving or when the identity has no email.
    pub fn for_session(state: &SessionState, resume: ResumeFile) -> Result<Self, AtsError> {
        let email = match state.access() {
            Access::Granted(identity) => identity.email.clone(),
            _ => None,
        }
        .filter(|e| !e.is_empty())
        .ok_or(AtsError::NotSignedIn)?;

        Ok(Self {
            resume,
            email,
            job_title: None,
            company: None,
        })
    }

    pub fn targeting(mut self, job_title: Option<String>, company: Option<String>) -> Self {
        self.job_title = job_title.filter(|s| !s.trim().is_empty());
        self.company = company.filter(|s| !s.trim().is_empty());
        self
    }

    fn into_form(self) -> Result<Form, AtsError> {
        let part = Part::bytes(self.resume.contents.to_vec())
            .file_name(self.resume.file_name)
            .mime_str("application/pdf")
            .map_err(|e| AtsError::Malformed(e.to_string()))?;

        let mut form = Form::new().part("resume", part).text("email", self.email);
        if let Some(job_title) = self.job_title {
            form = form.text("jobTitle", job_title);
        }
        if let Some(company) = self.company {
            form = form.text("company", company);
        }
        Ok(form)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtsReport {
    pub score: u32,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub missing_keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl AtsReport {
    pub fn band(&self) -> ScoreBand {
        if self.score >= 80 {
            ScoreBand::Excellent
        } else if self.score >= 70 {
            ScoreBand::Good
        } else if self.score >= 60 {
            ScoreBand::Fair
        } else {
            ScoreBand::Poor
        }
    }
}

impl BackendClient {
    /// `POST /api/ats/check-score`. Not retried on failure.
    pub async fn check_ats_score(&self, submission: AtsSubmission) -> Result<AtsReport, AtsError> {
        info!(
            file = %submission.resume.file_name(),
            bytes = submission.resume.len(),
            "Submitting resume for ATS scoring"
        );
        let form = submission.into_form()?;
        let req = self
            .client
            .post(self.url("/api/ats/check-score"))
            .multipart(form);
        let report: AtsReport = self.call(req, Payload::Data).await?;
        info!(score = report.score, "ATS analysis complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(name: &str) -> ResumeFile {
        ResumeFile::new(name, b"%PDF-1.7\n%fake".to_vec()).unwrap()
    }

    #[test]
    fn test_rejects_non_pdf_content() {
        let err = ResumeFile::new("resume.docx", b"PK\x03\x04".to_vec()).unwrap_err();
        assert_eq!(err, AtsError::NotPdf("resume.docx".to_string()));

        let err = ResumeFile::new("empty.pdf", Vec::new()).unwrap_err();
        assert!(matches!(err, AtsError::NotPdf(_)));
    }

    #[test]
    fn test_accepts_pdf_magic() {
        let file = pdf("cv.pdf");
        assert_eq!(file.file_name(), "cv.pdf");
        assert!(!file.is_empty());
    }

    #[tokio::test]
    async fn test_from_path_reads_file_name_and_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jane-cv.pdf");
        std::fs::write(&path, b"%PDF-1.5\nbody").unwrap();

        let file = ResumeFile::from_path(&path).await.unwrap();
        assert_eq!(file.file_name(), "jane-cv.pdf");
        assert_eq!(file.len(), 13);

        let missing = ResumeFile::from_path(dir.path().join("nope.pdf")).await;
        assert!(matches!(missing, Err(AtsError::Io(_))));
    }

    #[test]
    fn test_score_bands() {
        let band = |score| {
            AtsReport {
                score,
                strengths: vec![],
                improvements: vec![],
                missing_keywords: vec![],
            }
            .band()
        };
        assert_eq!(band(95), ScoreBand::Excellent);
        assert_eq!(band(80), ScoreBand::Excellent);
        assert_eq!(band(79), ScoreBand::Good);
        assert_eq!(band(60), ScoreBand::Fair);
        assert_eq!(band(59), ScoreBand::Poor);
    }

    #[test]
    fn test_submission_requires_signed_in_identity() {
        let state = SessionState::default();
        let err = AtsSubmission::for_session(&state, pdf("cv.pdf")).unwrap_err();
        assert_eq!(err, AtsError::NotSignedIn);
    }

    #[test]
    fn test_blank_targeting_is_dropped() {
        let submission = AtsSubmission {
            resume: pdf("cv.pdf"),
            email: "a@x.com".to_string(),
            job_title: None,
            company: None,
        }
        .targeting(Some("  ".to_string()), Some("Acme".to_string()));

        assert_eq!(submission.job_title, None);
        assert_eq!(submission.company.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_report_reads_camel_case() {
        let report: AtsReport = serde_json::from_value(serde_json::json!({
            "score": 72,
            "strengths": ["Clear layout"],
            "missingKeywords": ["Kubernetes"]
        }))
        .unwrap();
        assert_eq!(report.missing_keywords, vec!["Kubernetes"]);
        assert!(report.improvements.is_empty());
        assert_eq!(report.band(), ScoreBand::Good);
    }
}
