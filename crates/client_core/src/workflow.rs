use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use shared::{
    domain::{EmployeeId, PromotionId},
    protocol::{Designation, Employee, PromotionRecord},
};

use crate::{error::ClientError, LetterUpload, PromotionApi, PromotionSubmission};

/// Externally visible workflow state. Success and failure are transition
/// outcomes, not resting states: a successful submission lands in `Idle`,
/// a failed one back in `DialogOpen` with the form intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    DialogOpen,
    Submitting,
}

/// Transient promotion form, scoped to one employee. Reset to defaults on
/// every dialog open, destroyed on close or successful submission.
#[derive(Debug, Clone)]
pub struct PromotionForm {
    pub employee: Employee,
    pub to_designation: Option<String>,
    pub effective_date: Option<DateTime<Utc>>,
    pub reason: String,
    pub remarks: String,
    pub letter: Option<LetterUpload>,
}

impl PromotionForm {
    fn for_employee(employee: Employee) -> Self {
        Self {
            employee,
            to_designation: None,
            effective_date: None,
            reason: String::new(),
            remarks: String::new(),
            letter: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    RosterUpdated(Vec<Employee>),
    DesignationsUpdated(Vec<Designation>),
    PromotionsUpdated(Vec<PromotionRecord>),
    DialogOpened { employee_id: EmployeeId },
    DialogClosed,
    PromotionRecorded { record: PromotionRecord },
    SubmissionRejected { warning: String },
    SubmissionFailed { message: String },
    LetterSaved { promotion_id: PromotionId, path: PathBuf },
    FetchFailed { what: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Recorded(PromotionRecord),
    Rejected { warning: String },
    Failed { message: String },
}

#[derive(Debug, Error)]
pub enum LetterDownloadError {
    #[error(transparent)]
    Api(#[from] ClientError),
    #[error("failed to save letter to {path}: {source}")]
    Save {
        path: PathBuf,
        source: std::io::Error,
    },
}

enum DialogState {
    Idle,
    Open(PromotionForm),
    Submitting(PromotionForm),
}

impl DialogState {
    fn state(&self) -> WorkflowState {
        match self {
            DialogState::Idle => WorkflowState::Idle,
            DialogState::Open(_) => WorkflowState::DialogOpen,
            DialogState::Submitting(_) => WorkflowState::Submitting,
        }
    }
}

struct WorkflowInner {
    dialog: DialogState,
    roster: Vec<Employee>,
    designations: Vec<Designation>,
    promotions: Vec<PromotionRecord>,
}

/// Orchestrates the directory and promotion clients and drives the
/// `Idle -> DialogOpen -> Submitting` machine. One instance per page
/// session; at most one submission in flight per instance.
pub struct PromotionWorkflow {
    api: Arc<dyn PromotionApi>,
    inner: Mutex<WorkflowInner>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl PromotionWorkflow {
    pub fn new(api: Arc<dyn PromotionApi>) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            api,
            inner: Mutex::new(WorkflowInner {
                dialog: DialogState::Idle,
                roster: Vec::new(),
                designations: Vec::new(),
                promotions: Vec::new(),
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: WorkflowEvent) {
        let _ = self.events.send(event);
    }

    pub async fn state(&self) -> WorkflowState {
        self.inner.lock().await.dialog.state()
    }

    pub async fn form(&self) -> Option<PromotionForm> {
        let inner = self.inner.lock().await;
        match &inner.dialog {
            DialogState::Open(form) | DialogState::Submitting(form) => Some(form.clone()),
            DialogState::Idle => None,
        }
    }

    pub async fn roster(&self) -> Vec<Employee> {
        self.inner.lock().await.roster.clone()
    }

    pub async fn designations(&self) -> Vec<Designation> {
        self.inner.lock().await.designations.clone()
    }

    pub async fn promotions(&self) -> Vec<PromotionRecord> {
        self.inner.lock().await.promotions.clone()
    }

    /// Employees that already have a promotion letter on file, derived
    /// from the cached promotion list.
    pub async fn employees_with_letters(&self) -> HashSet<EmployeeId> {
        let inner = self.inner.lock().await;
        inner
            .promotions
            .iter()
            .filter(|record| record.has_letter())
            .map(|record| record.employee.id.clone())
            .collect()
    }

    /// Issues the three initial fetches as independent tasks; they may
    /// complete in any order and each failure is non-fatal.
    pub fn spawn_initial_fetches(self: &Arc<Self>) {
        let workflow = Arc::clone(self);
        tokio::spawn(async move {
            workflow.refresh_roster().await;
        });
        let workflow = Arc::clone(self);
        tokio::spawn(async move {
            workflow.refresh_designations().await;
        });
        let workflow = Arc::clone(self);
        tokio::spawn(async move {
            workflow.refresh_promotions().await;
        });
    }

    pub async fn refresh_roster(&self) -> bool {
        match self.api.list_employees().await {
            Ok(employees) => {
                self.inner.lock().await.roster = employees.clone();
                self.emit(WorkflowEvent::RosterUpdated(employees));
                true
            }
            Err(err) => {
                warn!("roster: employee fetch failed: {err}");
                self.emit(WorkflowEvent::FetchFailed {
                    what: "employees",
                    message: err.to_string(),
                });
                false
            }
        }
    }

    pub async fn refresh_designations(&self) -> bool {
        match self.api.list_active_designations().await {
            Ok(designations) => {
                self.inner.lock().await.designations = designations.clone();
                self.emit(WorkflowEvent::DesignationsUpdated(designations));
                true
            }
            Err(err) => {
                warn!("roster: designation fetch failed: {err}");
                self.emit(WorkflowEvent::FetchFailed {
                    what: "designations",
                    message: err.to_string(),
                });
                false
            }
        }
    }

    pub async fn refresh_promotions(&self) -> bool {
        match self.api.list_promotions().await {
            Ok(promotions) => {
                self.inner.lock().await.promotions = promotions.clone();
                self.emit(WorkflowEvent::PromotionsUpdated(promotions));
                true
            }
            Err(err) => {
                warn!("roster: promotion fetch failed: {err}");
                self.emit(WorkflowEvent::FetchFailed {
                    what: "promotions",
                    message: err.to_string(),
                });
                false
            }
        }
    }

    /// Opens the promotion dialog for an employee, resetting the form to
    /// defaults regardless of prior dialog state. Refused only while a
    /// submission is in flight.
    pub async fn open_dialog(&self, employee: Employee) -> bool {
        let employee_id = employee.id.clone();
        {
            let mut inner = self.inner.lock().await;
            if matches!(inner.dialog, DialogState::Submitting(_)) {
                warn!(
                    employee_id = %employee_id,
                    "promotion: dialog open ignored while a submission is in flight"
                );
                return false;
            }
            inner.dialog = DialogState::Open(PromotionForm::for_employee(employee));
        }
        self.emit(WorkflowEvent::DialogOpened { employee_id });
        true
    }

    /// Closes the dialog and discards the form. Ignored while a
    /// submission is in flight.
    pub async fn close_dialog(&self) -> bool {
        {
            let mut inner = self.inner.lock().await;
            match inner.dialog {
                DialogState::Submitting(_) => return false,
                DialogState::Idle => return true,
                DialogState::Open(_) => inner.dialog = DialogState::Idle,
            }
        }
        self.emit(WorkflowEvent::DialogClosed);
        true
    }

    async fn with_open_form(&self, apply: impl FnOnce(&mut PromotionForm)) -> bool {
        let mut inner = self.inner.lock().await;
        match &mut inner.dialog {
            DialogState::Open(form) => {
                apply(form);
                true
            }
            _ => false,
        }
    }

    pub async fn select_designation(&self, designation: impl Into<String>) -> bool {
        let designation = designation.into();
        self.with_open_form(|form| form.to_designation = Some(designation))
            .await
    }

    pub async fn set_effective_date(&self, date: Option<DateTime<Utc>>) -> bool {
        self.with_open_form(|form| form.effective_date = date).await
    }

    pub async fn set_reason(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.with_open_form(|form| form.reason = reason).await
    }

    pub async fn set_remarks(&self, remarks: impl Into<String>) -> bool {
        let remarks = remarks.into();
        self.with_open_form(|form| form.remarks = remarks).await
    }

    /// Selects a letter for upload, replacing any previous selection.
    pub async fn attach_letter(&self, letter: LetterUpload) -> bool {
        self.with_open_form(|form| form.letter = Some(letter)).await
    }

    pub async fn remove_letter(&self) -> bool {
        self.with_open_form(|form| form.letter = None).await
    }

    /// Submits the open form. Guarded: with no target designation
    /// selected the transition is rejected and no network call is made.
    /// On success the roster and promotion list are refreshed once each
    /// and the dialog closes; on failure the dialog re-opens with the
    /// form untouched.
    pub async fn submit(&self) -> SubmitOutcome {
        let submission = {
            let mut inner = self.inner.lock().await;
            match std::mem::replace(&mut inner.dialog, DialogState::Idle) {
                DialogState::Idle => {
                    return self.reject("no promotion dialog is open");
                }
                DialogState::Submitting(form) => {
                    inner.dialog = DialogState::Submitting(form);
                    return self.reject("a promotion submission is already in flight");
                }
                DialogState::Open(form) => {
                    let target = form
                        .to_designation
                        .as_deref()
                        .map(str::trim)
                        .filter(|target| !target.is_empty())
                        .map(str::to_string);
                    let Some(to_designation) = target else {
                        inner.dialog = DialogState::Open(form);
                        return self.reject("no target designation selected");
                    };

                    let submission = PromotionSubmission {
                        employee_id: form.employee.id.clone(),
                        from_designation: form.employee.designation.clone(),
                        to_designation,
                        effective_date: form.effective_date.unwrap_or_else(Utc::now),
                        reason: form.reason.clone(),
                        remarks: form.remarks.clone(),
                        letter: form.letter.clone(),
                    };
                    inner.dialog = DialogState::Submitting(form);
                    submission
                }
            }
        };

        match self.api.submit_promotion(submission).await {
            Ok(record) => {
                info!(
                    promotion_id = %record.id,
                    employee_id = %record.employee.id,
                    "promotion: record created"
                );
                self.refresh_roster().await;
                self.refresh_promotions().await;
                self.inner.lock().await.dialog = DialogState::Idle;
                self.emit(WorkflowEvent::PromotionRecorded {
                    record: record.clone(),
                });
                self.emit(WorkflowEvent::DialogClosed);
                SubmitOutcome::Recorded(record)
            }
            Err(err) => {
                {
                    let mut inner = self.inner.lock().await;
                    if let DialogState::Submitting(form) =
                        std::mem::replace(&mut inner.dialog, DialogState::Idle)
                    {
                        inner.dialog = DialogState::Open(form);
                    }
                }
                let message = match err.backend_message() {
                    Some(message) => format!("Promotion failed: {message}"),
                    None => format!("Promotion failed: {err}"),
                };
                warn!("promotion: submission failed: {err}");
                self.emit(WorkflowEvent::SubmissionFailed {
                    message: message.clone(),
                });
                SubmitOutcome::Failed { message }
            }
        }
    }

    fn reject(&self, warning: &str) -> SubmitOutcome {
        warn!("promotion: submission rejected: {warning}");
        self.emit(WorkflowEvent::SubmissionRejected {
            warning: warning.to_string(),
        });
        SubmitOutcome::Rejected {
            warning: warning.to_string(),
        }
    }

    /// Downloads the stored letter for a cached promotion record and
    /// saves it under the record's original filename in `target_dir`.
    /// A record with no letter fails with `NotFound` and produces no
    /// file-save side effect.
    pub async fn download_letter(
        &self,
        promotion_id: &PromotionId,
        target_dir: &Path,
    ) -> Result<PathBuf, LetterDownloadError> {
        let record = {
            let inner = self.inner.lock().await;
            inner
                .promotions
                .iter()
                .find(|record| &record.id == promotion_id)
                .cloned()
        };
        let Some(record) = record else {
            return Err(ClientError::NotFound(format!(
                "unknown promotion record {promotion_id}"
            ))
            .into());
        };

        let download = self.api.download_letter(&record).await?;

        // The stored filename is backend data; keep only its final path
        // component so it cannot escape the download directory.
        let filename = Path::new(&download.filename)
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "promotion-letter".into());
        let path = target_dir.join(filename);

        tokio::fs::create_dir_all(target_dir)
            .await
            .map_err(|source| LetterDownloadError::Save {
                path: target_dir.to_path_buf(),
                source,
            })?;
        tokio::fs::write(&path, &download.bytes)
            .await
            .map_err(|source| LetterDownloadError::Save {
                path: path.clone(),
                source,
            })?;

        info!(
            promotion_id = %record.id,
            path = %path.display(),
            "promotion: letter saved"
        );
        self.emit(WorkflowEvent::LetterSaved {
            promotion_id: record.id.clone(),
            path: path.clone(),
        });
        Ok(path)
    }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
