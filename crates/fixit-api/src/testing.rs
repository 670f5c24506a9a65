//! Test doubles shared by the manager tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::Utc;
use uuid::Uuid;

use fixit_db::Database;
use fixit_types::models::{Reputation, Role, User};

use crate::error::ApiError;
use crate::middleware::Principal;
use crate::services::{DbReputation, MediaStore, Notifier, ReputationService, Services};

#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records every delivered message; addresses in `failing` are rejected.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMail>>,
    failing: Vec<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<SentMail> {
        self.sent().into_iter().filter(|m| m.to == address).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ApiError> {
        if self.failing.iter().any(|a| a == to) {
            return Err(ApiError::DependencyFailure(format!("mailbox {} unavailable", to)));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Reputation service that always fails.
pub struct BrokenReputation;

#[async_trait]
impl ReputationService for BrokenReputation {
    async fn award_verified_report(&self, _user_id: &str) -> Result<(), ApiError> {
        Err(ApiError::DependencyFailure("reputation offline".into()))
    }

    async fn award_resolved_report(&self, _user_id: &str) -> Result<(), ApiError> {
        Err(ApiError::DependencyFailure("reputation offline".into()))
    }
}

#[derive(Default)]
pub struct MemoryMedia {
    objects: Mutex<Vec<(String, Vec<u8>, String)>>,
}

#[async_trait]
impl MediaStore for MemoryMedia {
    async fn upload(&self, bytes: Bytes, content_type: Option<&str>) -> Result<String, ApiError> {
        let key = Uuid::new_v4().to_string();
        self.objects.lock().unwrap().push((
            key.clone(),
            bytes.to_vec(),
            content_type.unwrap_or("application/octet-stream").to_string(),
        ));
        Ok(format!("memory://{}", key))
    }

    async fn fetch(&self, key: &str) -> Result<Option<(Vec<u8>, String)>, ApiError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _, _)| k == key)
            .map(|(_, bytes, ct)| (bytes.clone(), ct.clone())))
    }
}

pub fn test_services(db: Arc<Database>, notifier: Arc<RecordingNotifier>) -> Services {
    Services {
        notifier,
        reputation: Arc::new(DbReputation::new(db)),
        media: Arc::new(MemoryMedia::default()),
    }
}

pub fn new_user(username: &str, role: Role) -> User {
    User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        password_hash: "not-a-real-hash".to_string(),
        first_name: format!("{}-first", username),
        last_name: format!("{}-last", username),
        email: format!("{}@example.com", username),
        barangay: "San Isidro".to_string(),
        municipality: "Tanauan".to_string(),
        role,
        reputation: Reputation::default(),
        last_login: None,
        created_at: Utc::now(),
    }
}

pub fn seed_user(db: &Database, username: &str, role: Role) -> User {
    let user = new_user(username, role);
    db.insert_user(&user).unwrap();
    user
}

pub fn principal(user: &User) -> Principal {
    Principal {
        id: user.id.clone(),
        role: user.role,
    }
}

/// In-memory database, recording notifier, and an administrator account.
pub struct Fixture {
    pub db: Arc<Database>,
    pub notifier: Arc<RecordingNotifier>,
    pub services: Services,
    pub admin: User,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_notifier(RecordingNotifier::new())
    }

    pub fn with_notifier(notifier: RecordingNotifier) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let notifier = Arc::new(notifier);
        let services = test_services(db.clone(), notifier.clone());
        let admin = seed_user(&db, "admin", Role::Admin);
        Self {
            db,
            notifier,
            services,
            admin,
        }
    }

    pub fn admin(&self) -> Principal {
        principal(&self.admin)
    }

    pub fn member(&self, username: &str) -> (User, Principal) {
        let user = seed_user(&self.db, username, Role::Member);
        let p = principal(&user);
        (user, p)
    }
}
