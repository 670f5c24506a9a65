use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use futures_util::future::join_all;
use serde_json::Value;
use tracing::info;

use fixit_db::Database;
use fixit_types::api::{
    BatchRemoveRequest, BatchRemoveResponse, FlagRequest, FlagsResponse, RemovalOutcome,
    RemoveReportRequest, ReportResponse,
};
use fixit_types::identity::{canonical_id, same_identity};
use fixit_types::models::{Flag, Report};
use fixit_types::notice::{DEFAULT_REMOVAL_REASON, Notice};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::lifecycle::with_owners;
use crate::middleware::{Principal, canonical_key};
use crate::services::Services;
use crate::suspension::notify_account;

/// Flags and moderator removal.
pub struct Moderation<'a> {
    db: &'a Database,
    services: &'a Services,
}

impl<'a> Moderation<'a> {
    pub fn new(db: &'a Database, services: &'a Services) -> Self {
        Self { db, services }
    }

    /// At most one flag per author and report.
    pub fn flag(
        &self,
        actor: &Principal,
        report_id: &str,
        req: FlagRequest,
    ) -> Result<Vec<Flag>, ApiError> {
        let reason = req.reason.trim();
        if reason.is_empty() {
            return Err(ApiError::Validation("a flag reason is required".into()));
        }
        let description = req
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let flags = self
            .db
            .update_report(report_id, |report| {
                if report.has_flag_from(&actor.id) {
                    return Err(ApiError::Conflict(
                        "you have already flagged this report".into(),
                    ));
                }
                report.flags.push(Flag {
                    author_id: actor.id.clone(),
                    reason: reason.to_string(),
                    description,
                    created_at: Utc::now(),
                });
                Ok(report.flags.clone())
            })?
            .ok_or_else(|| ApiError::not_found("Report"))??;

        info!(
            "Report {} flagged by {} ({} flags)",
            report_id,
            actor.id,
            flags.len()
        );
        Ok(flags)
    }

    /// Remove one author's flag. Missing flags are not an error.
    pub fn dismiss_flag(
        &self,
        actor: &Principal,
        report_id: &str,
        author_id: &str,
    ) -> Result<Vec<Flag>, ApiError> {
        actor.require_admin()?;
        self.db
            .update_report(report_id, |report| {
                report.flags.retain(|f| !same_identity(&f.author_id, author_id));
                Ok::<_, ApiError>(report.flags.clone())
            })?
            .ok_or_else(|| ApiError::not_found("Report"))?
    }

    pub fn dismiss_all(&self, actor: &Principal, report_id: &str) -> Result<usize, ApiError> {
        actor.require_admin()?;
        let cleared = self
            .db
            .update_report(report_id, |report| {
                Ok::<_, ApiError>(std::mem::take(&mut report.flags).len())
            })?
            .ok_or_else(|| ApiError::not_found("Report"))??;
        info!("Cleared {} flags on report {}", cleared, report_id);
        Ok(cleared)
    }

    /// Delete a report regardless of status, then tell the owner and thank
    /// every distinct flagger.
    ///
    /// Flaggers are captured before the delete; each notice is independent of
    /// the others and of the deletion.
    pub async fn moderator_remove(
        &self,
        actor: &Principal,
        report_id: &str,
        reason: Option<&str>,
    ) -> Result<RemovalOutcome, ApiError> {
        actor.require_admin()?;

        let report = self
            .db
            .get_report(report_id)?
            .ok_or_else(|| ApiError::not_found("Report"))?;
        let flaggers = report.flagger_ids();

        if !self.db.delete_report(&report.id)? {
            return Err(ApiError::not_found("Report"));
        }
        info!(
            "Report {} removed by moderator {} ({} flaggers)",
            report.id,
            actor.id,
            flaggers.len()
        );

        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REMOVAL_REASON)
            .to_string();
        let owner_notified =
            notify_account(self.db, self.services, &report.owner_id, |recipient_name| {
                Notice::ReportRemoved {
                    recipient_name,
                    title: report.title.clone(),
                    reason,
                }
            })
            .await;

        let thanks = flaggers.iter().map(|flagger| {
            notify_account(self.db, self.services, flagger, |recipient_name| {
                Notice::FlaggerThanks {
                    recipient_name,
                    title: report.title.clone(),
                }
            })
        });
        let flaggers_notified = join_all(thanks).await.into_iter().filter(|sent| *sent).count();

        Ok(RemovalOutcome {
            report_id: report.id,
            title: report.title,
            owner_notified,
            flaggers_notified,
        })
    }

    /// Bulk delete without notifications. Ids in any supported identity form
    /// are accepted; unresolvable ones are skipped.
    pub fn batch_remove(&self, actor: &Principal, report_ids: &[Value]) -> Result<usize, ApiError> {
        actor.require_admin()?;

        let mut ids: Vec<String> = Vec::with_capacity(report_ids.len());
        for id in report_ids.iter().filter_map(canonical_id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Err(ApiError::Validation("no valid report ids given".into()));
        }

        let deleted = self.db.delete_reports(&ids)?;
        info!(
            "Batch removal by {}: {} of {} reports deleted",
            actor.id,
            deleted,
            ids.len()
        );
        Ok(deleted)
    }

    pub fn flagged(&self, actor: &Principal) -> Result<Vec<Report>, ApiError> {
        actor.require_admin()?;
        Ok(self.db.list_flagged_reports()?)
    }
}

// -- Handlers --

pub async fn flag_report(
    State(state): State<AppState>,
    principal: Principal,
    Path(report_id): Path<String>,
    Json(req): Json<FlagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    let flags = state.moderation().flag(&principal, &report_id, req)?;
    Ok((StatusCode::CREATED, Json(FlagsResponse { report_id, flags })))
}

pub async fn dismiss_flag(
    State(state): State<AppState>,
    principal: Principal,
    Path((report_id, user_id)): Path<(String, String)>,
) -> Result<Json<FlagsResponse>, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    let flags = state
        .moderation()
        .dismiss_flag(&principal, &report_id, &user_id)?;
    Ok(Json(FlagsResponse { report_id, flags }))
}

pub async fn dismiss_all_flags(
    State(state): State<AppState>,
    principal: Principal,
    Path(report_id): Path<String>,
) -> Result<Json<FlagsResponse>, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    state.moderation().dismiss_all(&principal, &report_id)?;
    Ok(Json(FlagsResponse {
        report_id,
        flags: Vec::new(),
    }))
}

/// DELETE /admin/reports/{id} with an optional `{"reason": ...}` body.
pub async fn remove_report(
    State(state): State<AppState>,
    principal: Principal,
    Path(report_id): Path<String>,
    body: Bytes,
) -> Result<Json<RemovalOutcome>, ApiError> {
    let req: RemoveReportRequest = if body.is_empty() {
        RemoveReportRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Validation(format!("invalid request body: {}", e)))?
    };
    let report_id = canonical_key(&report_id, "Report")?;
    let outcome = state
        .moderation()
        .moderator_remove(&principal, &report_id, req.reason.as_deref())
        .await?;
    Ok(Json(outcome))
}

pub async fn batch_remove_reports(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<BatchRemoveRequest>,
) -> Result<Json<BatchRemoveResponse>, ApiError> {
    let deleted_count = state.moderation().batch_remove(&principal, &req.report_ids)?;
    Ok(Json(BatchRemoveResponse { deleted_count }))
}

pub async fn flagged_reports(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<ReportResponse>>, ApiError> {
    let reports = state.moderation().flagged(&principal)?;
    Ok(Json(with_owners(&state.db, reports)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ReportLifecycle;
    use crate::testing::{Fixture, RecordingNotifier};
    use fixit_types::api::CreateReportRequest;
    use fixit_types::models::ReportStatus;
    use serde_json::json;

    fn create(fx: &Fixture, owner: &Principal, title: &str) -> Report {
        ReportLifecycle::new(&fx.db, &fx.services)
            .create(
                owner,
                CreateReportRequest {
                    title: title.into(),
                    description: "Streetlight out since Monday".into(),
                    category: "lighting".into(),
                    location: "Rizal St.".into(),
                    ..Default::default()
                },
            )
            .unwrap()
    }

    fn flag(reason: &str) -> FlagRequest {
        FlagRequest {
            reason: reason.into(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_approve_flag_and_remove_scenario() {
        let fx = Fixture::new();
        let (_, owner) = fx.member("owner");
        let (_, ana) = fx.member("ana");
        let (_, ben) = fx.member("ben");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let moderation = Moderation::new(&fx.db, &fx.services);

        let report = create(&fx, &owner, "Broken light");
        assert_eq!(report.status, ReportStatus::AwaitingApproval);

        let approved = lifecycle.approve(&fx.admin(), &report.id).await.unwrap();
        assert_eq!(approved.status, ReportStatus::Pending);
        assert_eq!(fx.notifier.sent_to("owner@example.com").len(), 1);

        moderation.flag(&ana, &report.id, flag("duplicate")).unwrap();
        let flags = moderation.flag(&ben, &report.id, flag("offensive")).unwrap();
        assert_eq!(flags.len(), 2);

        let outcome = moderation
            .moderator_remove(&fx.admin(), &report.id, Some("validated duplicate"))
            .await
            .unwrap();
        assert!(outcome.owner_notified);
        assert_eq!(outcome.flaggers_notified, 2);
        assert!(fx.db.get_report(&report.id).unwrap().is_none());

        let owner_mail = fx.notifier.sent_to("owner@example.com");
        assert_eq!(owner_mail.len(), 2);
        assert!(owner_mail[1].body.contains("validated duplicate"));
        for flagger in ["ana@example.com", "ben@example.com"] {
            let mail = fx.notifier.sent_to(flagger);
            assert_eq!(mail.len(), 1, "{}", flagger);
            assert!(mail[0].subject.starts_with("Thank you for flagging"));
        }
    }

    #[tokio::test]
    async fn test_duplicate_flag_conflicts() {
        let fx = Fixture::new();
        let (_, owner) = fx.member("owner");
        let (_, ana) = fx.member("ana");
        let moderation = Moderation::new(&fx.db, &fx.services);
        let report = create(&fx, &owner, "Broken light");

        moderation.flag(&ana, &report.id, flag("duplicate")).unwrap();
        let err = moderation
            .flag(&ana, &report.id, flag("still a duplicate"))
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert_eq!(fx.db.get_report(&report.id).unwrap().unwrap().flags.len(), 1);

        let err = moderation.flag(&ana, &report.id, flag("  ")).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        let err = moderation.flag(&ana, "missing", flag("spam")).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_dismiss_flags() {
        let fx = Fixture::new();
        let (_, owner) = fx.member("owner");
        let (_, ana) = fx.member("ana");
        let (_, ben) = fx.member("ben");
        let moderation = Moderation::new(&fx.db, &fx.services);
        let report = create(&fx, &owner, "Broken light");

        moderation.flag(&ana, &report.id, flag("duplicate")).unwrap();
        moderation.flag(&ben, &report.id, flag("offensive")).unwrap();

        let err = moderation
            .dismiss_flag(&ana, &report.id, &ben.id)
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");

        let upper = ana.id.to_uppercase();
        let flags = moderation
            .dismiss_flag(&fx.admin(), &report.id, &upper)
            .unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].author_id, ben.id);

        // Dismissing a flag that does not exist is a no-op.
        let flags = moderation
            .dismiss_flag(&fx.admin(), &report.id, &ana.id)
            .unwrap();
        assert_eq!(flags.len(), 1);

        assert_eq!(moderation.flagged(&fx.admin()).unwrap().len(), 1);
        assert_eq!(moderation.dismiss_all(&fx.admin(), &report.id).unwrap(), 1);
        assert!(moderation.flagged(&fx.admin()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_failing_flagger_does_not_block_others() {
        let fx = Fixture::with_notifier(RecordingNotifier::failing_for(&["ana@example.com"]));
        let (_, owner) = fx.member("owner");
        let (_, ana) = fx.member("ana");
        let (_, ben) = fx.member("ben");
        let moderation = Moderation::new(&fx.db, &fx.services);
        let report = create(&fx, &owner, "Broken light");

        moderation.flag(&ana, &report.id, flag("duplicate")).unwrap();
        moderation.flag(&ben, &report.id, flag("offensive")).unwrap();

        let outcome = moderation
            .moderator_remove(&fx.admin(), &report.id, None)
            .await
            .unwrap();
        assert_eq!(outcome.flaggers_notified, 1);
        assert!(fx.db.get_report(&report.id).unwrap().is_none());
        assert_eq!(fx.notifier.sent_to("ben@example.com").len(), 1);

        let owner_mail = fx.notifier.sent_to("owner@example.com");
        assert!(owner_mail[0].body.contains(DEFAULT_REMOVAL_REASON));
    }

    #[tokio::test]
    async fn test_moderator_remove_requires_admin() {
        let fx = Fixture::new();
        let (_, owner) = fx.member("owner");
        let moderation = Moderation::new(&fx.db, &fx.services);
        let report = create(&fx, &owner, "Broken light");

        let err = moderation
            .moderator_remove(&owner, &report.id, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        assert!(fx.db.get_report(&report.id).unwrap().is_some());

        let err = moderation
            .moderator_remove(&fx.admin(), "missing", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_batch_remove_normalizes_ids_and_sends_nothing() {
        let fx = Fixture::new();
        let (_, owner) = fx.member("owner");
        let moderation = Moderation::new(&fx.db, &fx.services);
        let a = create(&fx, &owner, "A");
        let b = create(&fx, &owner, "B");
        let c = create(&fx, &owner, "C");

        let ids = vec![
            json!(a.id),
            json!({ "$uuid": b.id.to_uppercase() }),
            json!(format!("Uuid(\"{}\")", a.id)),
            json!(null),
            json!(""),
        ];
        assert_eq!(moderation.batch_remove(&fx.admin(), &ids).unwrap(), 2);
        assert!(fx.db.get_report(&c.id).unwrap().is_some());
        assert!(fx.notifier.sent().is_empty());

        let err = moderation
            .batch_remove(&fx.admin(), &[json!(null)])
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        let err = moderation.batch_remove(&owner, &[json!(c.id)]).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }
}
