use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{multipart, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use shared::{
    domain::{EmployeeId, Role},
    error::ErrorBody,
    protocol::{DataEnvelope, Designation, Employee, PromotionRecord},
};

pub mod error;
mod workflow;

pub use error::ClientError;
pub use workflow::{
    LetterDownloadError, PromotionForm, PromotionWorkflow, SubmitOutcome, WorkflowEvent,
    WorkflowState,
};

/// Extensions offered by the letter file picker. Declarative only; the
/// backend is the authority on what it accepts.
pub const LETTER_PICKER_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];

/// Authenticated-client context: the bearer token and role loaded from
/// the persisted local session. Passed in explicitly; collaborators
/// never read ambient global state.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub role: Role,
}

impl AuthSession {
    pub fn new(token: impl Into<String>, role: Role) -> Self {
        Self {
            token: token.into(),
            role,
        }
    }
}

/// A letter selected for upload: explicit filename + byte buffer.
#[derive(Debug, Clone)]
pub struct LetterUpload {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A stored letter fetched for saving; `filename` is the original
/// filename recorded at upload time.
#[derive(Debug, Clone)]
pub struct LetterDownload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Fully resolved promotion request, ready for the multipart POST.
#[derive(Debug, Clone)]
pub struct PromotionSubmission {
    pub employee_id: EmployeeId,
    pub from_designation: String,
    pub to_designation: String,
    pub effective_date: DateTime<Utc>,
    pub reason: String,
    pub remarks: String,
    pub letter: Option<LetterUpload>,
}

/// Seam over the promotion backend: the two directory fetches plus the
/// promotion record operations. Implemented by [`HrClient`] and by
/// in-memory fakes in tests.
#[async_trait]
pub trait PromotionApi: Send + Sync {
    async fn list_employees(&self) -> Result<Vec<Employee>, ClientError>;
    async fn list_active_designations(&self) -> Result<Vec<Designation>, ClientError>;
    async fn list_promotions(&self) -> Result<Vec<PromotionRecord>, ClientError>;
    async fn submit_promotion(
        &self,
        submission: PromotionSubmission,
    ) -> Result<PromotionRecord, ClientError>;
    async fn download_letter(&self, record: &PromotionRecord)
        -> Result<LetterDownload, ClientError>;
}

/// HTTP client for the HR backend. Sends the session bearer token on
/// every request and checks the role gate before issuing one.
pub struct HrClient {
    http: Client,
    base_url: String,
    session: AuthSession,
}

impl HrClient {
    pub fn new(base_url: impl Into<String>, session: AuthSession) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            base_url,
            session,
        }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    /// Role gate, applied once per request at the API boundary.
    fn authorize(&self) -> Result<(), ClientError> {
        if self.session.role.can_manage_promotions() {
            Ok(())
        } else {
            Err(ClientError::Permission(format!(
                "role '{}' may not manage promotions",
                self.session.role.as_str()
            )))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.authorize()?;
        let response = self
            .http
            .get(self.endpoint(path))
            .bearer_auth(&self.session.token)
            .send()
            .await?;
        decode_json(response).await
    }
}

#[async_trait]
impl PromotionApi for HrClient {
    async fn list_employees(&self) -> Result<Vec<Employee>, ClientError> {
        self.get_json("employees").await
    }

    async fn list_active_designations(&self) -> Result<Vec<Designation>, ClientError> {
        let envelope: DataEnvelope<Designation> = self.get_json("designations").await?;
        Ok(envelope
            .data
            .into_iter()
            .filter(|designation| designation.is_active())
            .collect())
    }

    async fn list_promotions(&self) -> Result<Vec<PromotionRecord>, ClientError> {
        let envelope: DataEnvelope<PromotionRecord> = self.get_json("promotions").await?;
        Ok(envelope.data)
    }

    async fn submit_promotion(
        &self,
        submission: PromotionSubmission,
    ) -> Result<PromotionRecord, ClientError> {
        self.authorize()?;

        debug!(
            employee_id = %submission.employee_id,
            to_designation = %submission.to_designation,
            has_letter = submission.letter.is_some(),
            "promotion: submitting record"
        );

        let PromotionSubmission {
            employee_id,
            from_designation,
            to_designation,
            effective_date,
            reason,
            remarks,
            letter,
        } = submission;

        let mut form = multipart::Form::new()
            .text("employeeId", employee_id.0)
            .text("fromDesignation", from_designation)
            .text("toDesignation", to_designation)
            .text("effectiveDate", effective_date.to_rfc3339())
            .text("reason", reason)
            .text("remarks", remarks);

        if let Some(letter) = letter {
            let mut part = multipart::Part::bytes(letter.bytes).file_name(letter.filename);
            if let Some(mime) = &letter.mime_type {
                part = part.mime_str(mime).map_err(|err| {
                    ClientError::Validation(format!("invalid letter mime type '{mime}': {err}"))
                })?;
            }
            form = form.part("promotionLetter", part);
        }

        let response = self
            .http
            .post(self.endpoint("promotions"))
            .bearer_auth(&self.session.token)
            .multipart(form)
            .send()
            .await?;
        decode_json(response).await
    }

    async fn download_letter(
        &self,
        record: &PromotionRecord,
    ) -> Result<LetterDownload, ClientError> {
        self.authorize()?;

        let Some(letter) = &record.promotion_letter else {
            return Err(ClientError::NotFound(format!(
                "promotion {} has no letter attached",
                record.id
            )));
        };

        let response = self
            .http
            .get(self.endpoint(&format!("promotions/{}/download-letter", record.id)))
            .bearer_auth(&self.session.token)
            .send()
            .await?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await?;

        Ok(LetterDownload {
            filename: letter.original_name.clone(),
            bytes: bytes.to_vec(),
        })
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|err| ClientError::InvalidResponse(err.to_string()))
}

/// Maps non-success statuses onto the error taxonomy, surfacing the
/// backend `{message}` body verbatim when present.
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .map(|body| body.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    Err(match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ClientError::Validation(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Permission(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        _ => ClientError::Backend {
            status: status.as_u16(),
            message,
        },
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
