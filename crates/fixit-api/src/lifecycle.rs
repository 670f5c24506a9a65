use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use fixit_db::Database;
use fixit_types::api::{
    CountResponse, CreateReportRequest, MessageResponse, RejectRequest, ReportResponse,
    ReportSummary, ResolveRequest, StatusQuery, UpdateReportRequest, UpdateStatusRequest,
};
use fixit_types::models::{Report, ReportStatus, ResolvedReport};
use fixit_types::notice::Notice;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::{Principal, canonical_key};
use crate::services::Services;
use crate::suspension::{notify_account, owner_summary, require_active_user};

/// Owns report submission, status transitions and resolution archival.
pub struct ReportLifecycle<'a> {
    db: &'a Database,
    services: &'a Services,
}

fn required(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn non_blank(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

/// Coordinates are kept only as a valid pair.
fn geo(latitude: Option<f64>, longitude: Option<f64>) -> (Option<f64>, Option<f64>, bool) {
    match (latitude, longitude) {
        (Some(lat), Some(lng))
            if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) =>
        {
            (Some(lat), Some(lng), true)
        }
        _ => (None, None, false),
    }
}

fn replace_if_present(target: &mut String, value: Option<&String>) {
    if let Some(v) = value.map(|v| v.trim()).filter(|v| !v.is_empty()) {
        *target = v.to_string();
    }
}

impl<'a> ReportLifecycle<'a> {
    pub fn new(db: &'a Database, services: &'a Services) -> Self {
        Self { db, services }
    }

    pub fn create(&self, author: &Principal, req: CreateReportRequest) -> Result<Report, ApiError> {
        let title = required("title", &req.title)?;
        let description = required("description", &req.description)?;
        let category = required("category", &req.category)?;
        let location = required("location", &req.location)?;

        let owner = require_active_user(self.db, &author.id)?;
        let (latitude, longitude, geo_tagged) = geo(req.latitude, req.longitude);
        let now = Utc::now();

        let report = Report {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.id,
            title,
            description,
            category,
            location,
            latitude,
            longitude,
            geo_tagged,
            is_urgent: req.is_urgent,
            media: non_blank(&req.media),
            comments: Vec::new(),
            flags: Vec::new(),
            status: ReportStatus::initial(req.is_urgent),
            verified_by: None,
            verified_at: None,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_report(&report)?;

        info!(
            "Report {} created by {} ({})",
            report.id, report.owner_id, report.status
        );
        Ok(report)
    }

    pub async fn approve(&self, actor: &Principal, report_id: &str) -> Result<Report, ApiError> {
        actor.require_admin()?;

        let report = self
            .db
            .update_report(report_id, |report| {
                if report.status != ReportStatus::AwaitingApproval {
                    return Err(ApiError::InvalidTransition {
                        from: report.status.to_string(),
                        to: ReportStatus::Pending.to_string(),
                    });
                }
                report.status = ReportStatus::Pending;
                report.updated_at = Utc::now();
                Ok(report.clone())
            })?
            .ok_or_else(|| ApiError::not_found("Report"))??;

        info!("Report {} approved by {}", report.id, actor.id);

        notify_account(self.db, self.services, &report.owner_id, |recipient_name| {
            Notice::ReportApproved {
                recipient_name,
                report_id: report.id.clone(),
                title: report.title.clone(),
            }
        })
        .await;

        Ok(report)
    }

    /// Rejection deletes the report outright; nothing is archived.
    pub async fn reject(
        &self,
        actor: &Principal,
        report_id: &str,
        reasons: Vec<String>,
    ) -> Result<Report, ApiError> {
        actor.require_admin()?;

        let report = self
            .db
            .delete_report_if(report_id, |report| {
                if report.status != ReportStatus::AwaitingApproval {
                    return Err(ApiError::InvalidTransition {
                        from: report.status.to_string(),
                        to: "rejected".into(),
                    });
                }
                Ok(())
            })?
            .ok_or_else(|| ApiError::not_found("Report"))??;
        info!("Report {} rejected by {}", report.id, actor.id);

        let reasons = non_blank(&reasons);
        notify_account(self.db, self.services, &report.owner_id, |recipient_name| {
            Notice::ReportRejected {
                recipient_name,
                report_id: report.id.clone(),
                title: report.title.clone(),
                reasons,
            }
        })
        .await;

        Ok(report)
    }

    pub fn update_status(
        &self,
        actor: &Principal,
        report_id: &str,
        status: &str,
    ) -> Result<Report, ApiError> {
        actor.require_admin()?;

        let target = match status.trim() {
            "resolved" => {
                return Err(ApiError::Validation(
                    "reports are resolved through the resolve operation".into(),
                ));
            }
            other => other
                .parse::<ReportStatus>()
                .map_err(ApiError::Validation)?,
        };
        if target == ReportStatus::AwaitingApproval {
            return Err(ApiError::Validation(
                "status must be one of: pending, in-progress".into(),
            ));
        }

        let report = self
            .db
            .update_report(report_id, |report| {
                if report.status == ReportStatus::AwaitingApproval {
                    return Err(ApiError::InvalidTransition {
                        from: report.status.to_string(),
                        to: target.to_string(),
                    });
                }
                report.status = target;
                report.updated_at = Utc::now();
                Ok(report.clone())
            })?
            .ok_or_else(|| ApiError::not_found("Report"))??;

        info!("Report {} moved to {} by {}", report.id, target, actor.id);
        Ok(report)
    }

    /// Archive a live report as a [`ResolvedReport`], then remove it from the
    /// live store.
    ///
    /// The archive insert and the live delete are separate writes. A retry
    /// after a failure between them finds the existing archive (unique on the
    /// original report id) and only finishes the delete.
    pub async fn resolve(
        &self,
        actor: &Principal,
        report_id: &str,
        req: ResolveRequest,
    ) -> Result<ResolvedReport, ApiError> {
        actor.require_admin()?;

        let resolution = required("resolution description", &req.resolution_description)?;
        let proof_media = non_blank(&req.proof_media);
        if proof_media.is_empty() {
            return Err(ApiError::Validation(
                "at least one proof media reference is required".into(),
            ));
        }

        let live = self.db.get_report(report_id)?;
        let archived = self.db.get_resolved_by_original_id(report_id)?;

        let report = match (live, archived) {
            (None, Some(existing)) => {
                info!("Report {} was already resolved", report_id);
                return Ok(existing);
            }
            (None, None) => return Err(ApiError::not_found("Report")),
            (Some(report), Some(existing)) => {
                warn!(
                    "Report {} is archived but still live, finishing resolution",
                    report_id
                );
                self.db.delete_report(&report.id)?;
                self.services.award_resolved(&report.owner_id).await;
                return Ok(existing);
            }
            (Some(report), None) => report,
        };

        if report.status == ReportStatus::AwaitingApproval {
            return Err(ApiError::InvalidTransition {
                from: report.status.to_string(),
                to: "resolved".into(),
            });
        }

        let candidate = ResolvedReport::from_report(
            Uuid::new_v4().to_string(),
            &report,
            resolution,
            proof_media,
            actor.id.clone(),
            Utc::now(),
        );
        let record = if self.db.insert_resolved(&candidate)? {
            candidate
        } else {
            // Lost a race with a concurrent resolve of the same report.
            self.db
                .get_resolved_by_original_id(&report.id)?
                .ok_or_else(|| anyhow::anyhow!("archive for report {} vanished", report.id))?
        };

        self.db.delete_report(&report.id)?;
        info!(
            "Report {} resolved by {} (archive {})",
            report.id, actor.id, record.id
        );

        self.services.award_resolved(&report.owner_id).await;
        Ok(record)
    }

    /// Owner retraction of a live report.
    pub fn delete(&self, actor: &Principal, report_id: &str) -> Result<(), ApiError> {
        let report = self
            .db
            .get_report(report_id)?
            .ok_or_else(|| ApiError::not_found("Report"))?;
        if !report.is_owned_by(&actor.id) {
            return Err(ApiError::Forbidden(
                "only the owner can delete this report".into(),
            ));
        }
        if !self.db.delete_report(&report.id)? {
            return Err(ApiError::not_found("Report"));
        }
        info!("Report {} retracted by its owner", report.id);
        Ok(())
    }

    /// Mark a report verified. Verifying twice is a no-op and awards once.
    pub async fn verify(&self, actor: &Principal, report_id: &str) -> Result<Report, ApiError> {
        actor.require_admin()?;

        let (report, newly_verified) = self
            .db
            .update_report(report_id, |report| {
                if report.verified_at.is_some() {
                    return Ok::<_, ApiError>((report.clone(), false));
                }
                let now = Utc::now();
                report.verified_by = Some(actor.id.clone());
                report.verified_at = Some(now);
                report.updated_at = now;
                Ok((report.clone(), true))
            })?
            .ok_or_else(|| ApiError::not_found("Report"))??;

        if newly_verified {
            info!("Report {} verified by {}", report.id, actor.id);
            self.services.award_verified(&report.owner_id).await;
        }
        Ok(report)
    }

    /// Owner edit of content fields. Status is never touched here.
    pub fn update(
        &self,
        actor: &Principal,
        report_id: &str,
        req: UpdateReportRequest,
    ) -> Result<Report, ApiError> {
        self.db
            .update_report(report_id, |report| {
                if !report.is_owned_by(&actor.id) {
                    return Err(ApiError::Forbidden(
                        "only the owner can edit this report".into(),
                    ));
                }
                replace_if_present(&mut report.title, req.title.as_ref());
                replace_if_present(&mut report.description, req.description.as_ref());
                replace_if_present(&mut report.category, req.category.as_ref());
                replace_if_present(&mut report.location, req.location.as_ref());
                if req.latitude.is_some() || req.longitude.is_some() {
                    let (lat, lng, tagged) = geo(req.latitude, req.longitude);
                    report.latitude = lat;
                    report.longitude = lng;
                    report.geo_tagged = tagged;
                }
                if let Some(urgent) = req.is_urgent {
                    report.is_urgent = urgent;
                }
                if let Some(media) = &req.media {
                    report.media = non_blank(media);
                }
                report.updated_at = Utc::now();
                Ok(report.clone())
            })?
            .ok_or_else(|| ApiError::not_found("Report"))?
    }

    // -- Queries --

    pub fn get(&self, report_id: &str) -> Result<Report, ApiError> {
        self.db
            .get_report(report_id)?
            .ok_or_else(|| ApiError::not_found("Report"))
    }

    pub fn list(&self, status: Option<&str>) -> Result<Vec<Report>, ApiError> {
        let status = match status.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(raw.parse::<ReportStatus>().map_err(ApiError::Validation)?),
            None => None,
        };
        Ok(self.db.list_reports(status)?)
    }

    pub fn by_owner(&self, owner_id: &str) -> Result<Vec<Report>, ApiError> {
        Ok(self.db.list_reports_by_owner(owner_id)?)
    }

    pub fn awaiting(&self, actor: &Principal) -> Result<Vec<Report>, ApiError> {
        actor.require_admin()?;
        Ok(self.db.list_reports(Some(ReportStatus::AwaitingApproval))?)
    }

    pub fn summary(&self) -> Result<ReportSummary, ApiError> {
        let mut summary = ReportSummary::default();
        for status in ReportStatus::ALL {
            summary.record(status, self.db.count_reports(Some(status))?);
        }
        summary.resolved = self.db.count_resolved()?;
        Ok(summary)
    }

    pub fn resolved(&self) -> Result<Vec<ResolvedReport>, ApiError> {
        Ok(self.db.list_resolved()?)
    }

    pub fn resolved_count(&self) -> Result<u64, ApiError> {
        Ok(self.db.count_resolved()?)
    }
}

/// Attach the owner summary (active store first, then suspended).
pub(crate) fn with_owner(db: &Database, report: Report) -> Result<ReportResponse, ApiError> {
    let owner = owner_summary(db, &report.owner_id)?;
    Ok(ReportResponse { report, owner })
}

pub(crate) fn with_owners(
    db: &Database,
    reports: Vec<Report>,
) -> Result<Vec<ReportResponse>, ApiError> {
    reports.into_iter().map(|r| with_owner(db, r)).collect()
}

// -- Handlers --

pub async fn create_report(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.lifecycle().create(&principal, req)?;
    Ok((StatusCode::CREATED, Json(with_owner(&state.db, report)?)))
}

pub async fn list_reports(
    State(state): State<AppState>,
    _principal: Principal,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<ReportResponse>>, ApiError> {
    let reports = state.lifecycle().list(query.status.as_deref())?;
    Ok(Json(with_owners(&state.db, reports)?))
}

pub async fn my_reports(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<ReportResponse>>, ApiError> {
    let reports = state.lifecycle().by_owner(&principal.id)?;
    Ok(Json(with_owners(&state.db, reports)?))
}

pub async fn reports_by_owner(
    State(state): State<AppState>,
    _principal: Principal,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ReportResponse>>, ApiError> {
    let user_id = canonical_key(&user_id, "User")?;
    let reports = state.lifecycle().by_owner(&user_id)?;
    Ok(Json(with_owners(&state.db, reports)?))
}

pub async fn report_summary(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<Json<ReportSummary>, ApiError> {
    Ok(Json(state.lifecycle().summary()?))
}

pub async fn list_resolved(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<Json<Vec<ResolvedReport>>, ApiError> {
    Ok(Json(state.lifecycle().resolved()?))
}

pub async fn count_resolved(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<Json<CountResponse>, ApiError> {
    Ok(Json(CountResponse {
        count: state.lifecycle().resolved_count()?,
    }))
}

pub async fn get_report(
    State(state): State<AppState>,
    _principal: Principal,
    Path(report_id): Path<String>,
) -> Result<Json<ReportResponse>, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    let report = state.lifecycle().get(&report_id)?;
    Ok(Json(with_owner(&state.db, report)?))
}

pub async fn update_report(
    State(state): State<AppState>,
    principal: Principal,
    Path(report_id): Path<String>,
    Json(req): Json<UpdateReportRequest>,
) -> Result<Json<ReportResponse>, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    let report = state.lifecycle().update(&principal, &report_id, req)?;
    Ok(Json(with_owner(&state.db, report)?))
}

pub async fn delete_report(
    State(state): State<AppState>,
    principal: Principal,
    Path(report_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    state.lifecycle().delete(&principal, &report_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn awaiting_reports(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<ReportResponse>>, ApiError> {
    let reports = state.lifecycle().awaiting(&principal)?;
    Ok(Json(with_owners(&state.db, reports)?))
}

pub async fn approve_report(
    State(state): State<AppState>,
    principal: Principal,
    Path(report_id): Path<String>,
) -> Result<Json<ReportResponse>, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    let report = state.lifecycle().approve(&principal, &report_id).await?;
    Ok(Json(with_owner(&state.db, report)?))
}

pub async fn reject_report(
    State(state): State<AppState>,
    principal: Principal,
    Path(report_id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    let report = state
        .lifecycle()
        .reject(&principal, &report_id, req.reasons)
        .await?;
    Ok(Json(MessageResponse {
        message: format!("Report \"{}\" rejected and deleted", report.title),
    }))
}

pub async fn verify_report(
    State(state): State<AppState>,
    principal: Principal,
    Path(report_id): Path<String>,
) -> Result<Json<ReportResponse>, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    let report = state.lifecycle().verify(&principal, &report_id).await?;
    Ok(Json(with_owner(&state.db, report)?))
}

pub async fn update_report_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(report_id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ReportResponse>, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    let report = state
        .lifecycle()
        .update_status(&principal, &report_id, &req.status)?;
    Ok(Json(with_owner(&state.db, report)?))
}

pub async fn resolve_report(
    State(state): State<AppState>,
    principal: Principal,
    Path(report_id): Path<String>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolvedReport>, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    let record = state
        .lifecycle()
        .resolve(&principal, &report_id, req)
        .await?;
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, RecordingNotifier};
    use fixit_types::models::Role;

    fn request(title: &str, urgent: bool) -> CreateReportRequest {
        CreateReportRequest {
            title: title.into(),
            description: "Water has been leaking for two days".into(),
            category: "water".into(),
            location: "Purok 3".into(),
            latitude: Some(14.08),
            longitude: Some(121.15),
            is_urgent: urgent,
            media: vec!["http://media/1.jpg".into(), "  ".into()],
        }
    }

    fn resolve_request() -> ResolveRequest {
        ResolveRequest {
            resolution_description: "Pipe replaced".into(),
            proof_media: vec!["http://media/proof.jpg".into()],
        }
    }

    #[test]
    fn test_create_initial_status_and_validation() {
        let fx = Fixture::new();
        let (_, ana) = fx.member("ana");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);

        let normal = lifecycle.create(&ana, request("Leak", false)).unwrap();
        assert_eq!(normal.status, ReportStatus::AwaitingApproval);
        assert!(normal.geo_tagged);
        assert_eq!(normal.media, vec!["http://media/1.jpg".to_string()]);
        assert!(normal.comments.is_empty() && normal.flags.is_empty());

        let urgent = lifecycle.create(&ana, request("Flood", true)).unwrap();
        assert_eq!(urgent.status, ReportStatus::Pending);

        let err = lifecycle.create(&ana, request("   ", false)).unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let mut bad_coords = request("Pothole", false);
        bad_coords.latitude = Some(123.0);
        let report = lifecycle.create(&ana, bad_coords).unwrap();
        assert!(!report.geo_tagged);
        assert_eq!(report.latitude, None);
    }

    #[test]
    fn test_unknown_author_cannot_create() {
        let fx = Fixture::new();
        let (ana_user, ana) = fx.member("ana");
        fx.db.delete_user(&ana_user.id).unwrap();
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let err = lifecycle.create(&ana, request("Leak", false)).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_approve_notifies_owner_once() {
        let fx = Fixture::new();
        let (_, ana) = fx.member("ana");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let report = lifecycle.create(&ana, request("Leak", false)).unwrap();

        let err = lifecycle.approve(&ana, &report.id).await.unwrap_err();
        assert_eq!(err.kind(), "forbidden");

        let approved = lifecycle.approve(&fx.admin(), &report.id).await.unwrap();
        assert_eq!(approved.status, ReportStatus::Pending);
        assert_eq!(fx.notifier.sent_to("ana@example.com").len(), 1);

        let err = lifecycle.approve(&fx.admin(), &report.id).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");

        let err = lifecycle.approve(&fx.admin(), "missing").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_reject_deletes_without_archive() {
        let fx = Fixture::new();
        let (_, ana) = fx.member("ana");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let report = lifecycle.create(&ana, request("Leak", false)).unwrap();

        lifecycle
            .reject(&fx.admin(), &report.id, vec!["Duplicate".into()])
            .await
            .unwrap();

        assert!(fx.db.get_report(&report.id).unwrap().is_none());
        assert!(fx.db.get_resolved_by_original_id(&report.id).unwrap().is_none());
        let sent = fx.notifier.sent_to("ana@example.com");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("Duplicate"));

        let urgent = lifecycle.create(&ana, request("Flood", true)).unwrap();
        let err = lifecycle.reject(&fx.admin(), &urgent.id, vec![]).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
    }

    #[tokio::test]
    async fn test_reject_after_approval_keeps_report() {
        let fx = Fixture::new();
        let (_, ana) = fx.member("ana");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let report = lifecycle.create(&ana, request("Leak", false)).unwrap();

        lifecycle.approve(&fx.admin(), &report.id).await.unwrap();
        let err = lifecycle
            .reject(&fx.admin(), &report.id, vec!["Duplicate".into()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");

        let stored = fx.db.get_report(&report.id).unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Pending);
        let sent = fx.notifier.sent_to("ana@example.com");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.contains("has been approved"));

        let err = lifecycle.reject(&fx.admin(), "missing", vec![]).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_update_status_rules() {
        let fx = Fixture::new();
        let (_, ana) = fx.member("ana");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let report = lifecycle.create(&ana, request("Leak", false)).unwrap();

        let err = lifecycle
            .update_status(&fx.admin(), &report.id, "in-progress")
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");

        lifecycle.approve(&fx.admin(), &report.id).await.unwrap();
        let moved = lifecycle
            .update_status(&fx.admin(), &report.id, "in-progress")
            .unwrap();
        assert_eq!(moved.status, ReportStatus::InProgress);

        // Backward moves are allowed.
        let moved = lifecycle
            .update_status(&fx.admin(), &report.id, "pending")
            .unwrap();
        assert_eq!(moved.status, ReportStatus::Pending);

        for bad in ["resolved", "closed", "awaiting-approval"] {
            let err = lifecycle
                .update_status(&fx.admin(), &report.id, bad)
                .unwrap_err();
            assert_eq!(err.kind(), "validation_error", "status {}", bad);
        }
    }

    #[tokio::test]
    async fn test_resolve_requires_proof_and_keeps_report_live() {
        let fx = Fixture::new();
        let (_, ana) = fx.member("ana");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let report = lifecycle.create(&ana, request("Flood", true)).unwrap();

        let err = lifecycle
            .resolve(
                &fx.admin(),
                &report.id,
                ResolveRequest {
                    resolution_description: "Fixed".into(),
                    proof_media: vec![],
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(fx.db.get_report(&report.id).unwrap().is_some());
        assert!(fx.db.get_resolved_by_original_id(&report.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_archives_and_awards() {
        let fx = Fixture::new();
        let (ana_user, ana) = fx.member("ana");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let report = lifecycle.create(&ana, request("Flood", true)).unwrap();

        let record = lifecycle
            .resolve(&fx.admin(), &report.id, resolve_request())
            .await
            .unwrap();
        assert_eq!(record.original_report_id, report.id);
        assert_eq!(record.title, "Flood");
        assert_eq!(record.resolved_by, fx.admin.id);
        assert!(fx.db.get_report(&report.id).unwrap().is_none());

        let owner = fx.db.get_user_by_id(&ana_user.id).unwrap().unwrap();
        assert_eq!(owner.reputation.resolved_reports, 1);

        // A second resolve returns the same archive without another award.
        let again = lifecycle
            .resolve(&fx.admin(), &report.id, resolve_request())
            .await
            .unwrap();
        assert_eq!(again.id, record.id);
        assert_eq!(fx.db.count_resolved().unwrap(), 1);
        let owner = fx.db.get_user_by_id(&ana_user.id).unwrap().unwrap();
        assert_eq!(owner.reputation.resolved_reports, 1);
    }

    #[tokio::test]
    async fn test_resolve_retry_after_partial_failure() {
        let fx = Fixture::new();
        let (_, ana) = fx.member("ana");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let report = lifecycle.create(&ana, request("Flood", true)).unwrap();

        // Archive written, live delete never happened.
        let stale = ResolvedReport::from_report(
            Uuid::new_v4().to_string(),
            &report,
            "Pipe replaced".into(),
            vec!["http://media/proof.jpg".into()],
            fx.admin.id.clone(),
            Utc::now(),
        );
        assert!(fx.db.insert_resolved(&stale).unwrap());

        let record = lifecycle
            .resolve(&fx.admin(), &report.id, resolve_request())
            .await
            .unwrap();
        assert_eq!(record.id, stale.id);
        assert!(fx.db.get_report(&report.id).unwrap().is_none());
        assert_eq!(fx.db.count_resolved().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resolve_rejects_awaiting_and_missing() {
        let fx = Fixture::new();
        let (_, ana) = fx.member("ana");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let report = lifecycle.create(&ana, request("Leak", false)).unwrap();

        let err = lifecycle
            .resolve(&fx.admin(), &report.id, resolve_request())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");

        let err = lifecycle
            .resolve(&fx.admin(), "missing", resolve_request())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_delete_is_owner_only() {
        let fx = Fixture::new();
        let (_, ana) = fx.member("ana");
        let (_, ben) = fx.member("ben");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let report = lifecycle.create(&ana, request("Leak", false)).unwrap();

        assert_eq!(lifecycle.delete(&ben, &report.id).unwrap_err().kind(), "forbidden");
        assert_eq!(
            lifecycle.delete(&fx.admin(), &report.id).unwrap_err().kind(),
            "forbidden"
        );
        lifecycle.delete(&ana, &report.id).unwrap();
        assert!(fx.db.get_report(&report.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_verify_awards_once() {
        let fx = Fixture::new();
        let (ana_user, ana) = fx.member("ana");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let report = lifecycle.create(&ana, request("Flood", true)).unwrap();

        let verified = lifecycle.verify(&fx.admin(), &report.id).await.unwrap();
        assert_eq!(verified.verified_by.as_deref(), Some(fx.admin.id.as_str()));
        lifecycle.verify(&fx.admin(), &report.id).await.unwrap();

        let owner = fx.db.get_user_by_id(&ana_user.id).unwrap().unwrap();
        assert_eq!(owner.reputation.verified_reports, 1);
        assert_eq!(owner.reputation.points, 10);
    }

    #[tokio::test]
    async fn test_reputation_failure_does_not_undo_transition() {
        let fx = Fixture::with_notifier(RecordingNotifier::new());
        let mut services = fx.services.clone();
        services.reputation = std::sync::Arc::new(crate::testing::BrokenReputation);
        let (_, ana) = fx.member("ana");
        let lifecycle = ReportLifecycle::new(&fx.db, &services);
        let report = lifecycle.create(&ana, request("Flood", true)).unwrap();

        lifecycle
            .resolve(&fx.admin(), &report.id, resolve_request())
            .await
            .unwrap();
        assert!(fx.db.get_report(&report.id).unwrap().is_none());
        assert!(fx.db.get_resolved_by_original_id(&report.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_owner_update_and_summary() {
        let fx = Fixture::new();
        let (_, ana) = fx.member("ana");
        let (_, ben) = fx.member("ben");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let report = lifecycle.create(&ana, request("Leak", false)).unwrap();

        let edit = UpdateReportRequest {
            title: Some("Main line leak".into()),
            description: Some("   ".into()),
            ..Default::default()
        };
        let err = lifecycle.update(&ben, &report.id, edit.clone()).unwrap_err();
        assert_eq!(err.kind(), "forbidden");

        let updated = lifecycle.update(&ana, &report.id, edit).unwrap();
        assert_eq!(updated.title, "Main line leak");
        assert_eq!(updated.description, report.description);
        assert_eq!(updated.status, ReportStatus::AwaitingApproval);

        let urgent = lifecycle.create(&ana, request("Flood", true)).unwrap();
        lifecycle
            .resolve(&fx.admin(), &urgent.id, resolve_request())
            .await
            .unwrap();
        lifecycle.create(&ana, request("Pothole", true)).unwrap();

        let summary = lifecycle.summary().unwrap();
        assert_eq!(summary.awaiting_approval, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.in_progress, 0);
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.total, 2);

        assert_eq!(lifecycle.list(Some("pending")).unwrap().len(), 1);
        assert_eq!(lifecycle.list(None).unwrap().len(), 2);
        assert_eq!(lifecycle.list(Some("bogus")).unwrap_err().kind(), "validation_error");
        assert_eq!(lifecycle.by_owner(&ana.id).unwrap().len(), 2);
        assert_eq!(lifecycle.awaiting(&fx.admin()).unwrap().len(), 1);
        assert_eq!(lifecycle.awaiting(&ana).unwrap_err().kind(), "forbidden");
    }

    #[test]
    fn test_owner_summary_attached() {
        let fx = Fixture::new();
        let (ana_user, ana) = fx.member("ana");
        let lifecycle = ReportLifecycle::new(&fx.db, &fx.services);
        let report = lifecycle.create(&ana, request("Leak", false)).unwrap();

        let response = with_owner(&fx.db, report).unwrap();
        let owner = response.owner.unwrap();
        assert_eq!(owner.id, ana_user.id);
        assert!(!owner.suspended);
        assert_eq!(ana_user.role, Role::Member);
    }
}
