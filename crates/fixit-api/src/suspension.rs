use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use fixit_db::{Database, UserInsert};
use fixit_types::api::{OwnerSummary, RestoreResponse, SuspendRequest, SuspensionResponse};
use fixit_types::models::{SuspendedUser, User};
use fixit_types::notice::Notice;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::{Principal, canonical_key};
use crate::services::Services;

fn username_conflict(username: &str) -> ApiError {
    ApiError::Conflict(format!(
        "username '{}' now belongs to another account",
        username
    ))
}

/// A user found in either store.
#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub user: User,
    pub suspension: Option<SuspendedUser>,
}

impl ResolvedUser {
    pub fn is_suspended(&self) -> bool {
        self.suspension.is_some()
    }
}

/// Look a user up by original id: active store first, then suspended store.
pub fn lookup_user(db: &Database, user_id: &str) -> anyhow::Result<Option<ResolvedUser>> {
    if let Some(user) = db.get_user_by_id(user_id)? {
        return Ok(Some(ResolvedUser {
            user,
            suspension: None,
        }));
    }
    Ok(db
        .get_suspended_by_original_id(user_id)?
        .map(|record| ResolvedUser {
            user: record.snapshot.clone(),
            suspension: Some(record),
        }))
}

pub fn owner_summary(db: &Database, owner_id: &str) -> anyhow::Result<Option<OwnerSummary>> {
    Ok(lookup_user(db, owner_id)?.map(|found| OwnerSummary {
        id: found.user.id.clone(),
        name: found.user.display_name(),
        suspended: found.is_suspended(),
    }))
}

/// The caller's active record. Suspended accounts are refused.
pub fn require_active_user(db: &Database, user_id: &str) -> Result<User, ApiError> {
    match lookup_user(db, user_id)? {
        Some(found) if found.is_suspended() => {
            Err(ApiError::Forbidden("account is suspended".into()))
        }
        Some(found) => Ok(found.user),
        None => Err(ApiError::not_found("User")),
    }
}

/// Best-effort notice to a user in either store. Returns whether it was sent.
pub(crate) async fn notify_account<F>(
    db: &Database,
    services: &Services,
    user_id: &str,
    build: F,
) -> bool
where
    F: FnOnce(String) -> Notice,
{
    let found = match lookup_user(db, user_id) {
        Ok(Some(found)) => found,
        Ok(None) => {
            warn!("Cannot notify {}: user not found in either store", user_id);
            return false;
        }
        Err(e) => {
            warn!("Cannot notify {}: lookup failed: {:#}", user_id, e);
            return false;
        }
    };
    let notice = build(found.user.display_name());
    services.notify(&found.user, &notice).await
}

/// Moves accounts between the active and suspended stores.
///
/// Both directions write the destination record before deleting the source,
/// so an interrupted move leaves a duplicate that the next call reconciles,
/// never a lost account.
pub struct Suspensions<'a> {
    db: &'a Database,
    services: &'a Services,
}

#[derive(Debug, Clone)]
pub struct Restoration {
    pub user: User,
    pub already_active: bool,
}

impl<'a> Suspensions<'a> {
    pub fn new(db: &'a Database, services: &'a Services) -> Self {
        Self { db, services }
    }

    pub async fn suspend(
        &self,
        actor: &Principal,
        user_id: &str,
        reason: &str,
    ) -> Result<SuspendedUser, ApiError> {
        actor.require_admin()?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ApiError::Validation("a suspension reason is required".into()));
        }
        if self.db.get_suspended_by_original_id(user_id)?.is_some() {
            return Err(ApiError::Conflict("user is already suspended".into()));
        }
        let user = self
            .db
            .get_user_by_id(user_id)?
            .ok_or_else(|| ApiError::not_found("User"))?;
        if user.id == actor.id {
            return Err(ApiError::Validation(
                "administrators cannot suspend their own account".into(),
            ));
        }

        let record = SuspendedUser {
            id: Uuid::new_v4().to_string(),
            original_user_id: user.id.clone(),
            snapshot: user,
            reason: reason.to_string(),
            suspended_at: Utc::now(),
            suspended_by: actor.id.clone(),
        };
        if !self.db.insert_suspended(&record)? {
            return Err(ApiError::Conflict("user is already suspended".into()));
        }
        if !self.db.delete_user(&record.original_user_id)? {
            warn!(
                "User {} left the active store before suspension completed",
                record.original_user_id
            );
        }
        info!(
            "User {} suspended by {} (record {})",
            record.original_user_id, actor.id, record.id
        );

        let notice = Notice::AccountSuspended {
            recipient_name: record.snapshot.display_name(),
            reason: record.reason.clone(),
        };
        self.services.notify(&record.snapshot, &notice).await;

        Ok(record)
    }

    /// Write a restored snapshot back to the active store. An id that
    /// reappeared meanwhile is updated in place; a username now held by a
    /// different account is a conflict.
    fn reinstate(&self, user: &User) -> Result<(), ApiError> {
        match self.db.try_insert_user(user)? {
            UserInsert::Inserted => Ok(()),
            UserInsert::IdTaken => {
                warn!("User {} reappeared during restore, updating in place", user.id);
                self.db.upsert_user(user)?;
                Ok(())
            }
            UserInsert::UsernameTaken => Err(username_conflict(&user.username)),
        }
    }

    /// Restore a suspended account under its original id. `identifier` may
    /// be the suspension record's id or the user's original id.
    pub async fn unsuspend(
        &self,
        actor: &Principal,
        identifier: &str,
    ) -> Result<Restoration, ApiError> {
        actor.require_admin()?;

        let record = self
            .db
            .find_suspended(identifier)?
            .ok_or_else(|| ApiError::not_found("Suspended user"))?;
        let original_id = record.original_user_id.clone();

        if let Some(active) = self.db.get_user_by_id(&original_id)? {
            self.db.delete_suspended(&record.id)?;
            info!(
                "User {} was already active; removed stale suspension {}",
                original_id, record.id
            );
            return Ok(Restoration {
                user: active,
                already_active: true,
            });
        }

        if let Some(other) = self.db.get_user_by_username(&record.snapshot.username)? {
            if other.id != original_id {
                return Err(username_conflict(&record.snapshot.username));
            }
        }

        let mut user = record.snapshot.clone();
        user.id = original_id.clone();
        self.reinstate(&user)?;
        self.db.delete_suspended(&record.id)?;
        info!("User {} unsuspended by {}", original_id, actor.id);

        let notice = Notice::AccountRestored {
            recipient_name: user.display_name(),
        };
        self.services.notify(&user, &notice).await;

        Ok(Restoration {
            user,
            already_active: false,
        })
    }
}

// -- Handlers --

pub async fn suspend_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<String>,
    Json(req): Json<SuspendRequest>,
) -> Result<Json<SuspensionResponse>, ApiError> {
    let user_id = canonical_key(&user_id, "User")?;
    let record = state
        .suspensions()
        .suspend(&principal, &user_id, &req.reason)
        .await?;
    Ok(Json(SuspensionResponse {
        suspension_id: record.id,
        original_user_id: record.original_user_id,
        name: record.snapshot.display_name(),
        suspended_at: record.suspended_at,
        reason: record.reason,
    }))
}

pub async fn unsuspend_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(identifier): Path<String>,
) -> Result<Json<RestoreResponse>, ApiError> {
    let identifier = canonical_key(&identifier, "Suspended user")?;
    let restored = state
        .suspensions()
        .unsuspend(&principal, &identifier)
        .await?;
    Ok(Json(RestoreResponse {
        name: restored.user.display_name(),
        user_id: restored.user.id,
        already_active: restored.already_active,
    }))
}
