use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Comment, Flag, Report, ReportStatus, Reputation, Role, SuspendedUser, User};

// -- JWT Claims --

/// JWT claims shared by the auth handlers and the request middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub barangay: String,
    #[serde(default)]
    pub municipality: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Reports --

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReportRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub media: Vec<String>,
}

/// Owner edit of a live report. Absent or blank fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateReportRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_urgent: Option<bool>,
    pub media: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RejectRequest {
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveRequest {
    pub resolution_description: String,
    #[serde(default)]
    pub proof_media: Vec<String>,
}

/// Owner reference resolved against the active store, then the suspended store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerSummary {
    pub id: String,
    pub name: String,
    pub suspended: bool,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    #[serde(flatten)]
    pub report: Report,
    pub owner: Option<OwnerSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total: u64,
    pub awaiting_approval: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub resolved: u64,
}

impl ReportSummary {
    pub fn record(&mut self, status: ReportStatus, count: u64) {
        match status {
            ReportStatus::AwaitingApproval => self.awaiting_approval = count,
            ReportStatus::Pending => self.pending = count,
            ReportStatus::InProgress => self.in_progress = count,
        }
        self.total = self.awaiting_approval + self.pending + self.in_progress;
    }
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

// -- Comments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct CommentsResponse {
    pub report_id: String,
    pub comments: Vec<Comment>,
}

// -- Moderation --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagRequest {
    pub reason: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FlagsResponse {
    pub report_id: String,
    pub flags: Vec<Flag>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoveReportRequest {
    pub reason: Option<String>,
}

/// Report ids for bulk removal. Entries may use any identity representation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchRemoveRequest {
    pub report_ids: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovalOutcome {
    pub report_id: String,
    pub title: String,
    pub owner_notified: bool,
    pub flaggers_notified: usize,
}

#[derive(Debug, Serialize)]
pub struct BatchRemoveResponse {
    pub deleted_count: usize,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuspendRequest {
    pub reason: String,
}

/// One row of the administrator user listing, covering both stores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserListing {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: String,
    pub address: String,
    pub role: Role,
    pub reputation: Reputation,
    pub last_login: Option<DateTime<Utc>>,
    pub suspended: bool,
    pub suspended_at: Option<DateTime<Utc>>,
    pub suspension_reason: Option<String>,
    pub suspended_by: Option<String>,
}

fn address_of(user: &User) -> String {
    if user.barangay.is_empty() && user.municipality.is_empty() {
        "No address provided".to_string()
    } else if user.municipality.is_empty() {
        user.barangay.clone()
    } else if user.barangay.is_empty() {
        user.municipality.clone()
    } else {
        format!("{}, {}", user.barangay, user.municipality)
    }
}

impl From<&User> for UserListing {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            name: user.display_name(),
            email: user.email.clone(),
            address: address_of(user),
            role: user.role,
            reputation: user.reputation.clone(),
            last_login: user.last_login,
            suspended: false,
            suspended_at: None,
            suspension_reason: None,
            suspended_by: None,
        }
    }
}

impl From<&SuspendedUser> for UserListing {
    fn from(record: &SuspendedUser) -> Self {
        Self {
            // Suspended users are listed under their original identity.
            id: record.original_user_id.clone(),
            suspended: true,
            suspended_at: Some(record.suspended_at),
            suspension_reason: Some(record.reason.clone()),
            suspended_by: Some(record.suspended_by.clone()),
            ..UserListing::from(&record.snapshot)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: UserListing,
    pub report_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub total_users: u64,
    pub active_users: u64,
    pub suspended_users: u64,
    pub total_reports: u64,
}

#[derive(Debug, Serialize)]
pub struct SuspensionResponse {
    pub suspension_id: String,
    pub original_user_id: String,
    pub name: String,
    pub suspended_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub user_id: String,
    pub name: String,
    /// True when the account was already active and only the stale
    /// suspension record was removed.
    pub already_active: bool,
}

// -- Media --

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
