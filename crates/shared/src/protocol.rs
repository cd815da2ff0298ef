use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AppointmentStatus, FormRecord, ProviderId, RegistrationId, SlotKind};

/// Sanitised registration handed to the submission collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationSubmission {
    pub record: FormRecord,
    pub submitted_at: DateTime<Utc>,
}

impl RegistrationSubmission {
    pub fn email(&self) -> Option<&str> {
        self.record.text("email")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub registration_id: RegistrationId,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub provider_id: ProviderId,
    pub patient_name: String,
    pub date: NaiveDate,
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSummary {
    pub appointment_id: String,
    pub provider_id: ProviderId,
    pub patient_name: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub status: AppointmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Bookable slot published by a provider, rendered over the weekly grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub kind: SlotKind,
    pub max_patients: u32,
    pub current_patients: u32,
    #[serde(default)]
    pub is_recurring: bool,
}
