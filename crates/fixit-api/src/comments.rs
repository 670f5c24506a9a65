use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use fixit_db::Database;
use fixit_types::api::{CommentRequest, CommentsResponse};
use fixit_types::identity::same_identity;
use fixit_types::models::Comment;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::{Principal, canonical_key};
use crate::suspension::require_active_user;

/// Comments embedded in a report. Edits and deletes are author-only.
pub struct CommentThread<'a> {
    db: &'a Database,
}

fn comment_text(text: &str) -> Result<String, ApiError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::Validation("comment text is required".into()));
    }
    Ok(text.to_string())
}

fn ensure_author(comment: &Comment, actor: &Principal) -> Result<(), ApiError> {
    if same_identity(&comment.author_id, &actor.id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "only the author can change this comment".into(),
        ))
    }
}

impl<'a> CommentThread<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Author display fields are copied from the active record now and never
    /// joined again.
    pub fn add(&self, actor: &Principal, report_id: &str, text: &str) -> Result<Vec<Comment>, ApiError> {
        let text = comment_text(text)?;
        let author = require_active_user(self.db, &actor.id)?;

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            author_id: author.id.clone(),
            author_name: author.display_name(),
            first_name: author.first_name,
            last_name: author.last_name,
            barangay: author.barangay,
            municipality: author.municipality,
            text,
            created_at: Utc::now(),
            edited_at: None,
        };
        let comment_id = comment.id.clone();

        let comments = self
            .db
            .update_report(report_id, |report| {
                report.comments.push(comment);
                Ok::<_, ApiError>(report.comments.clone())
            })?
            .ok_or_else(|| ApiError::not_found("Report"))??;

        info!("Comment {} added to report {} by {}", comment_id, report_id, actor.id);
        Ok(comments)
    }

    pub fn edit(
        &self,
        actor: &Principal,
        report_id: &str,
        comment_id: &str,
        text: &str,
    ) -> Result<Vec<Comment>, ApiError> {
        let text = comment_text(text)?;
        self.db
            .update_report(report_id, |report| {
                let comment = report
                    .comment_mut(comment_id)
                    .ok_or_else(|| ApiError::not_found("Comment"))?;
                ensure_author(comment, actor)?;
                comment.text = text;
                comment.edited_at = Some(Utc::now());
                Ok::<_, ApiError>(report.comments.clone())
            })?
            .ok_or_else(|| ApiError::not_found("Report"))?
    }

    pub fn delete(
        &self,
        actor: &Principal,
        report_id: &str,
        comment_id: &str,
    ) -> Result<Vec<Comment>, ApiError> {
        let comments = self
            .db
            .update_report(report_id, |report| {
                let index = report
                    .comments
                    .iter()
                    .position(|c| same_identity(&c.id, comment_id))
                    .ok_or_else(|| ApiError::not_found("Comment"))?;
                ensure_author(&report.comments[index], actor)?;
                report.comments.remove(index);
                Ok::<_, ApiError>(report.comments.clone())
            })?
            .ok_or_else(|| ApiError::not_found("Report"))??;

        info!("Comment {} deleted from report {}", comment_id, report_id);
        Ok(comments)
    }
}

// -- Handlers --

pub async fn add_comment(
    State(state): State<AppState>,
    principal: Principal,
    Path(report_id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    let comments = state.comments().add(&principal, &report_id, &req.text)?;
    Ok((StatusCode::CREATED, Json(CommentsResponse { report_id, comments })))
}

pub async fn edit_comment(
    State(state): State<AppState>,
    principal: Principal,
    Path((report_id, comment_id)): Path<(String, String)>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<CommentsResponse>, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    let comments = state
        .comments()
        .edit(&principal, &report_id, &comment_id, &req.text)?;
    Ok(Json(CommentsResponse { report_id, comments }))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    principal: Principal,
    Path((report_id, comment_id)): Path<(String, String)>,
) -> Result<Json<CommentsResponse>, ApiError> {
    let report_id = canonical_key(&report_id, "Report")?;
    let comments = state
        .comments()
        .delete(&principal, &report_id, &comment_id)?;
    Ok(Json(CommentsResponse { report_id, comments }))
}
