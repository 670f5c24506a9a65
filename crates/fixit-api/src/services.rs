use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use fixit_db::Database;
use fixit_types::models::{Reputation, User};
use fixit_types::notice::Notice;

use crate::error::ApiError;

/// Outbound message delivery (transactional mail).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ApiError>;
}

/// Reputation bookkeeping for report owners.
#[async_trait]
pub trait ReputationService: Send + Sync {
    async fn award_verified_report(&self, user_id: &str) -> Result<(), ApiError>;
    async fn award_resolved_report(&self, user_id: &str) -> Result<(), ApiError>;
}

/// Binary media storage. Uploads may be retried; duplicates are acceptable.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, bytes: Bytes, content_type: Option<&str>) -> Result<String, ApiError>;

    /// Fetch a stored object by key: `(bytes, content type)`.
    async fn fetch(&self, key: &str) -> Result<Option<(Vec<u8>, String)>, ApiError>;
}

/// Collaborators shared by every manager. Built once at startup.
#[derive(Clone)]
pub struct Services {
    pub notifier: Arc<dyn Notifier>,
    pub reputation: Arc<dyn ReputationService>,
    pub media: Arc<dyn MediaStore>,
}

impl Services {
    /// Best-effort delivery of `notice` to `user`. Failures are logged and
    /// reported as `false`, never returned.
    pub async fn notify(&self, user: &User, notice: &Notice) -> bool {
        if user.email.trim().is_empty() {
            debug!("No email on file for user {}, skipping notice", user.id);
            return false;
        }
        match self
            .notifier
            .send(&user.email, &notice.subject(), &notice.body())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to notify user {} <{}>: {}", user.id, user.email, e);
                false
            }
        }
    }

    pub async fn award_verified(&self, user_id: &str) {
        if let Err(e) = self.reputation.award_verified_report(user_id).await {
            warn!("Verified-report reputation award failed for {}: {}", user_id, e);
        }
    }

    pub async fn award_resolved(&self, user_id: &str) {
        if let Err(e) = self.reputation.award_resolved_report(user_id).await {
            warn!("Resolved-report reputation award failed for {}: {}", user_id, e);
        }
    }
}

// -- Mail --

const MAIL_API_URL: &str = "https://api.brevo.com/v3/smtp/email";

#[derive(Serialize)]
struct MailAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MailRequest<'a> {
    sender: MailAddress<'a>,
    to: Vec<MailAddress<'a>>,
    subject: &'a str,
    html_content: &'a str,
}

/// Transactional mail over an HTTP API.
pub struct MailApiNotifier {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl MailApiNotifier {
    pub fn new(api_key: String, from_email: String, from_name: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: MAIL_API_URL.to_string(),
            api_key,
            from_email,
            from_name,
        }
    }

    pub fn with_api_url(mut self, api_url: String) -> Self {
        self.api_url = api_url;
        self
    }
}

#[async_trait]
impl Notifier for MailApiNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ApiError> {
        let request = MailRequest {
            sender: MailAddress {
                email: &self.from_email,
                name: Some(&self.from_name),
            },
            to: vec![MailAddress { email: to, name: None }],
            subject,
            html_content: body,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::DependencyFailure(format!("mail request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApiError::DependencyFailure(format!(
                "mail API returned {}",
                response.status()
            )));
        }

        info!("Email sent to {}: {}", to, subject);
        Ok(())
    }
}

/// Logs notices instead of sending them. Used when no mail API key is set.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), ApiError> {
        info!("Notice for {} (mail disabled): {}", to, subject);
        Ok(())
    }
}

// -- Reputation --

/// Keeps reputation counters on the user row, or on the suspension
/// snapshot while the owner is suspended.
pub struct DbReputation {
    db: Arc<Database>,
}

impl DbReputation {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn award(&self, user_id: &str, what: &str, f: fn(&mut Reputation)) -> Result<(), ApiError> {
        let failed = |e: anyhow::Error| {
            ApiError::DependencyFailure(format!("reputation update failed: {}", e))
        };
        let updated = self.db.update_reputation(user_id, f).map_err(failed)?
            || self.db.update_suspended_reputation(user_id, f).map_err(failed)?;
        if !updated {
            return Err(ApiError::DependencyFailure(format!(
                "user {} is in neither store",
                user_id
            )));
        }
        info!("Awarded {} reputation to {}", what, user_id);
        Ok(())
    }
}

#[async_trait]
impl ReputationService for DbReputation {
    async fn award_verified_report(&self, user_id: &str) -> Result<(), ApiError> {
        self.award(user_id, "verified-report", |r| r.award_verified())
    }

    async fn award_resolved_report(&self, user_id: &str) -> Result<(), ApiError> {
        self.award(user_id, "resolved-report", |r| r.award_resolved())
    }
}
