//! Final submission: whole-form validation, sanitising, the in-flight guard
//! and the collaborator that receives the record.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::RegistrationId,
    error::{ApiError, ErrorCode},
    protocol::{RegistrationSubmission, SubmissionReceipt},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    sanitize::sanitize_record,
    validation::{ErrorMap, FieldValidationEngine},
};

pub const GENERIC_FAILURE_MESSAGE: &str = "Registration failed. Please try again.";
pub const DUPLICATE_EMAIL_MESSAGE: &str = "An account with this email already exists";

#[async_trait]
pub trait RegistrationSubmitter: Send + Sync {
    async fn submit(
        &self,
        submission: RegistrationSubmission,
    ) -> Result<SubmissionReceipt, ApiError>;
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{} field(s) failed validation", .0.len())]
    Invalid(ErrorMap),
    #[error("a submission is already in flight")]
    InFlight,
    #[error("field '{field}' contains disallowed content")]
    Suspicious { field: String },
    #[error("submission is only available on the final step")]
    NotAtFinalStep,
    #[error("{message}")]
    Rejected {
        message: String,
        #[source]
        source: ApiError,
    },
}

impl SubmitError {
    /// Message suitable for the single top-level error slot.
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Invalid(_) => "Please fix the highlighted fields".to_string(),
            SubmitError::InFlight => "Submission already in progress".to_string(),
            SubmitError::Suspicious { .. } => "Invalid input detected".to_string(),
            SubmitError::NotAtFinalStep => "Please complete every step first".to_string(),
            SubmitError::Rejected { message, .. } => message.clone(),
        }
    }
}

/// Single-flight guard shared by everything submitting one form.
#[derive(Debug, Clone, Default)]
pub struct SubmissionGate {
    busy: Arc<AtomicBool>,
}

impl SubmissionGate {
    pub fn try_acquire(&self) -> Option<InFlight> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held while a submission is outstanding; releases the gate on drop.
#[derive(Debug)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// A validated, sanitised record that owns the in-flight slot.
#[derive(Debug)]
pub struct PendingSubmission {
    submission: RegistrationSubmission,
    _in_flight: InFlight,
}

impl PendingSubmission {
    pub fn submission(&self) -> &RegistrationSubmission {
        &self.submission
    }

    /// Hands the record to `submitter` once. Rejections are logged and turned
    /// into the generic failure message; nothing is retried.
    pub async fn send(
        self,
        submitter: &dyn RegistrationSubmitter,
    ) -> Result<SubmissionReceipt, SubmitError> {
        let fields = self.submission.record.len();
        match submitter.submit(self.submission).await {
            Ok(receipt) => {
                info!(
                    registration_id = receipt.registration_id.0,
                    fields, "registration accepted"
                );
                Ok(receipt)
            }
            Err(source) => {
                warn!(code = ?source.code, error = %source.message, "registration rejected");
                Err(SubmitError::Rejected {
                    message: GENERIC_FAILURE_MESSAGE.to_string(),
                    source,
                })
            }
        }
    }
}

impl FieldValidationEngine {
    /// Validates the whole form and, if clean, claims the in-flight slot and
    /// produces the sanitised record. On validation failure every failing
    /// field is marked touched so its message is visible.
    pub fn begin_submission(&mut self) -> Result<PendingSubmission, SubmitError> {
        let errors = self.validate_all();
        if !errors.is_empty() {
            let failing: BTreeSet<String> = errors.keys().cloned().collect();
            self.mark_touched(failing);
            self.replace_errors(errors.clone());
            return Err(SubmitError::Invalid(errors));
        }
        self.replace_errors(ErrorMap::new());

        let record = sanitize_record(self.values());
        if let Some(field) = self.screen.find_suspicious(&record) {
            warn!(field = %field, "submission refused by content screen");
            return Err(SubmitError::Suspicious { field });
        }

        let in_flight = self.gate.try_acquire().ok_or(SubmitError::InFlight)?;
        Ok(PendingSubmission {
            submission: RegistrationSubmission {
                record,
                submitted_at: Utc::now(),
            },
            _in_flight: in_flight,
        })
    }

    pub async fn submit(
        &mut self,
        submitter: &dyn RegistrationSubmitter,
    ) -> Result<SubmissionReceipt, SubmitError> {
        self.begin_submission()?.send(submitter).await
    }

    pub fn submission_gate(&self) -> SubmissionGate {
        self.gate.clone()
    }
}

/// In-memory collaborator standing in for the registration backend.
#[derive(Debug)]
pub struct MockRegistrationApi {
    latency: Duration,
    failure: std::sync::Mutex<Option<ApiError>>,
    received: Mutex<Vec<RegistrationSubmission>>,
    calls: AtomicUsize,
    next_id: AtomicI64,
}

impl MockRegistrationApi {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            failure: std::sync::Mutex::new(None),
            received: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            next_id: AtomicI64::new(1),
        }
    }

    /// Every following call rejects with `error` until cleared.
    pub fn fail_with(&self, error: Option<ApiError>) {
        let mut failure = self
            .failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *failure = error;
    }

    /// Accepted submissions, in arrival order.
    pub async fn received(&self) -> Vec<RegistrationSubmission> {
        self.received.lock().await.clone()
    }

    /// Number of accepted submissions.
    pub async fn accepted(&self) -> usize {
        self.received.lock().await.len()
    }

    /// Every invocation, rejected ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for MockRegistrationApi {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl RegistrationSubmitter for MockRegistrationApi {
    async fn submit(
        &self,
        submission: RegistrationSubmission,
    ) -> Result<SubmissionReceipt, ApiError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let failure = self
            .failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let mut received = self.received.lock().await;
        if let Some(error) = failure {
            return Err(error);
        }
        let duplicate = submission.email().is_some_and(|email| {
            received
                .iter()
                .any(|prior| prior.email().is_some_and(|e| e.eq_ignore_ascii_case(email)))
        });
        if duplicate {
            return Err(ApiError::conflict(DUPLICATE_EMAIL_MESSAGE));
        }

        received.push(submission);
        Ok(SubmissionReceipt {
            registration_id: RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            accepted_at: Utc::now(),
        })
    }
}

#[async_trait]
impl RegistrationSubmitter for storage::Storage {
    async fn submit(
        &self,
        submission: RegistrationSubmission,
    ) -> Result<SubmissionReceipt, ApiError> {
        let email = submission
            .email()
            .ok_or_else(|| ApiError::new(ErrorCode::Validation, "Email is required"))?
            .to_string();
        let record_json = serde_json::to_string(&submission.record)
            .map_err(|err| ApiError::internal(err.to_string()))?;

        match self
            .insert_registration(&email, &record_json, submission.submitted_at)
            .await
        {
            Ok(Some(registration_id)) => Ok(SubmissionReceipt {
                registration_id,
                accepted_at: Utc::now(),
            }),
            Ok(None) => Err(ApiError::conflict(DUPLICATE_EMAIL_MESSAGE)),
            Err(err) => Err(ApiError::unavailable(format!("{err:#}"))),
        }
    }
}
