use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{Duration, Utc};

use fixit_db::Database;
use fixit_types::api::{UserDetail, UserListing, UserStats};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::{Principal, canonical_key};
use crate::suspension::lookup_user;

/// Window used for the "recently active" statistic.
const ACTIVE_WINDOW_DAYS: i64 = 30;

/// Every account across both stores. Suspended accounts appear under their
/// original id; a suspension record whose user is also active is skipped.
pub fn list_users(db: &Database, actor: &Principal) -> Result<Vec<UserListing>, ApiError> {
    actor.require_admin()?;

    let mut listings: Vec<UserListing> = db.list_users()?.iter().map(UserListing::from).collect();
    for record in db.list_suspended()? {
        if listings.iter().any(|l| l.id == record.original_user_id) {
            continue;
        }
        listings.push(UserListing::from(&record));
    }
    Ok(listings)
}

pub fn suspended_users(db: &Database, actor: &Principal) -> Result<Vec<UserListing>, ApiError> {
    actor.require_admin()?;
    Ok(db.list_suspended()?.iter().map(UserListing::from).collect())
}

pub fn user_detail(db: &Database, actor: &Principal, user_id: &str) -> Result<UserDetail, ApiError> {
    actor.require_admin()?;

    let found = lookup_user(db, user_id)?.ok_or_else(|| ApiError::not_found("User"))?;
    let user = match &found.suspension {
        Some(record) => UserListing::from(record),
        None => UserListing::from(&found.user),
    };
    let report_count = db.count_reports_by_owner(&found.user.id)?;
    Ok(UserDetail { user, report_count })
}

pub fn user_stats(db: &Database, actor: &Principal) -> Result<UserStats, ApiError> {
    actor.require_admin()?;

    let suspended_users = db.count_suspended()?;
    let since = Utc::now() - Duration::days(ACTIVE_WINDOW_DAYS);
    Ok(UserStats {
        total_users: db.count_accounts()?,
        active_users: db.count_users_active_since(since)?,
        suspended_users,
        total_reports: db.count_reports(None)?,
    })
}

// -- Handlers --

pub async fn get_users(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<UserListing>>, ApiError> {
    Ok(Json(list_users(&state.db, &principal)?))
}

pub async fn get_suspended_users(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<UserListing>>, ApiError> {
    Ok(Json(suspended_users(&state.db, &principal)?))
}

pub async fn get_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<String>,
) -> Result<Json<UserDetail>, ApiError> {
    let user_id = canonical_key(&user_id, "User")?;
    Ok(Json(user_detail(&state.db, &principal, &user_id)?))
}

pub async fn get_user_stats(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<UserStats>, ApiError> {
    Ok(Json(user_stats(&state.db, &principal)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ReportLifecycle;
    use crate::suspension::Suspensions;
    use crate::testing::Fixture;
    use fixit_types::api::CreateReportRequest;
    use fixit_types::models::SuspendedUser;

    #[tokio::test]
    async fn test_listing_spans_both_stores() {
        let fx = Fixture::new();
        let (ana, _) = fx.member("ana");
        let (ben, _) = fx.member("ben");
        Suspensions::new(&fx.db, &fx.services)
            .suspend(&fx.admin(), &ben.id, "spam")
            .await
            .unwrap();

        let listings = list_users(&fx.db, &fx.admin()).unwrap();
        assert_eq!(listings.len(), 3);
        let ben_row = listings.iter().find(|l| l.username == "ben").unwrap();
        assert_eq!(ben_row.id, ben.id);
        assert!(ben_row.suspended);
        assert_eq!(ben_row.suspension_reason.as_deref(), Some("spam"));
        let ana_row = listings.iter().find(|l| l.id == ana.id).unwrap();
        assert!(!ana_row.suspended);
        assert_eq!(ana_row.address, "San Isidro, Tanauan");

        let suspended = suspended_users(&fx.db, &fx.admin()).unwrap();
        assert_eq!(suspended.len(), 1);

        let (_, member) = fx.member("cara");
        assert_eq!(list_users(&fx.db, &member).unwrap_err().kind(), "forbidden");
    }

    #[tokio::test]
    async fn test_detail_and_stats() {
        let fx = Fixture::new();
        let (ana, ana_p) = fx.member("ana");
        let (ben, _) = fx.member("ben");
        ReportLifecycle::new(&fx.db, &fx.services)
            .create(
                &ana_p,
                CreateReportRequest {
                    title: "Fallen tree".into(),
                    description: "Blocking the road".into(),
                    category: "roads".into(),
                    location: "Km 3".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        fx.db.update_last_login(&ana.id, Utc::now()).unwrap();
        Suspensions::new(&fx.db, &fx.services)
            .suspend(&fx.admin(), &ana.id, "spam")
            .await
            .unwrap();

        let detail = user_detail(&fx.db, &fx.admin(), &ana.id).unwrap();
        assert!(detail.user.suspended);
        assert_eq!(detail.report_count, 1);
        let detail = user_detail(&fx.db, &fx.admin(), &ben.id).unwrap();
        assert_eq!(detail.report_count, 0);
        let err = user_detail(&fx.db, &fx.admin(), "nobody").unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let stats = user_stats(&fx.db, &fx.admin()).unwrap();
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.suspended_users, 1);
        assert_eq!(stats.active_users, 0);
        assert_eq!(stats.total_reports, 1);
    }

    #[tokio::test]
    async fn test_stray_suspension_counts_once() {
        let fx = Fixture::new();
        let (ana, _) = fx.member("ana");
        let (ben, _) = fx.member("ben");
        Suspensions::new(&fx.db, &fx.services)
            .suspend(&fx.admin(), &ben.id, "spam")
            .await
            .unwrap();

        // Leftover record from an interrupted suspension of an active user.
        let stray = SuspendedUser {
            id: uuid::Uuid::new_v4().to_string(),
            original_user_id: ana.id.clone(),
            snapshot: ana.clone(),
            reason: "interrupted".into(),
            suspended_at: Utc::now(),
            suspended_by: fx.admin().id,
        };
        assert!(fx.db.insert_suspended(&stray).unwrap());

        let listings = list_users(&fx.db, &fx.admin()).unwrap();
        let stats = user_stats(&fx.db, &fx.admin()).unwrap();
        assert_eq!(listings.len(), 3);
        assert_eq!(stats.total_users, listings.len() as u64);
    }
}
