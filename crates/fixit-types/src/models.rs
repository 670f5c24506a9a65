use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{canonical_id_str, same_identity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Status of a report while it lives in the report store.
///
/// Resolution is not a status: a resolved report leaves the live store and
/// exists only as a [`ResolvedReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    AwaitingApproval,
    Pending,
    InProgress,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 3] = [Self::AwaitingApproval, Self::Pending, Self::InProgress];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingApproval => "awaiting-approval",
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
        }
    }

    /// Status a freshly submitted report starts in.
    pub fn initial(is_urgent: bool) -> Self {
        if is_urgent {
            Self::Pending
        } else {
            Self::AwaitingApproval
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "awaiting-approval" => Ok(Self::AwaitingApproval),
            "pending" => Ok(Self::Pending),
            "in-progress" => Ok(Self::InProgress),
            other => Err(format!("unknown report status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reputation {
    pub points: i64,
    pub level: String,
    pub verified_reports: i64,
    pub resolved_reports: i64,
}

impl Reputation {
    pub const VERIFIED_POINTS: i64 = 10;
    pub const RESOLVED_POINTS: i64 = 25;

    pub fn level_for(points: i64) -> &'static str {
        match points {
            p if p >= 400 => "Champion",
            p if p >= 150 => "Trusted",
            p if p >= 50 => "Contributor",
            _ => "Newcomer",
        }
    }

    pub fn award_verified(&mut self) {
        self.verified_reports += 1;
        self.add_points(Self::VERIFIED_POINTS);
    }

    pub fn award_resolved(&mut self) {
        self.resolved_reports += 1;
        self.add_points(Self::RESOLVED_POINTS);
    }

    fn add_points(&mut self, points: i64) {
        self.points += points;
        self.level = Self::level_for(self.points).to_string();
    }
}

impl Default for Reputation {
    fn default() -> Self {
        Self {
            points: 0,
            level: Self::level_for(0).to_string(),
            verified_reports: 0,
            resolved_reports: 0,
        }
    }
}

/// A registered account in the active store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub barangay: String,
    pub municipality: String,
    pub role: Role,
    pub reputation: Reputation,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.username.clone()
        } else {
            name.to_string()
        }
    }
}

/// A suspended account: the full user snapshot plus suspension metadata.
///
/// `snapshot.id` always equals `original_user_id`, so restoring the
/// snapshot recreates the account under its original identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspendedUser {
    pub id: String,
    pub original_user_id: String,
    pub snapshot: User,
    pub reason: String,
    pub suspended_at: DateTime<Utc>,
    pub suspended_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author_id: String,
    /// Display fields are copied from the author when the comment is
    /// written and never re-read.
    pub author_name: String,
    pub first_name: String,
    pub last_name: String,
    pub barangay: String,
    pub municipality: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub author_id: String,
    pub reason: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A report in the live store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub geo_tagged: bool,
    pub is_urgent: bool,
    pub media: Vec<String>,
    pub comments: Vec<Comment>,
    pub flags: Vec<Flag>,
    pub status: ReportStatus,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        same_identity(&self.owner_id, user_id)
    }

    pub fn has_flag_from(&self, user_id: &str) -> bool {
        self.flags.iter().any(|f| same_identity(&f.author_id, user_id))
    }

    /// Distinct canonical ids of everyone who flagged this report, in
    /// first-flag order.
    pub fn flagger_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::with_capacity(self.flags.len());
        for flag in &self.flags {
            if let Some(id) = canonical_id_str(&flag.author_id) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    pub fn comment_mut(&mut self, comment_id: &str) -> Option<&mut Comment> {
        self.comments
            .iter_mut()
            .find(|c| same_identity(&c.id, comment_id))
    }
}

/// Archived snapshot of a report at the moment it was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedReport {
    pub id: String,
    pub original_report_id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_urgent: bool,
    pub media: Vec<String>,
    pub comments: Vec<Comment>,
    pub resolution_description: String,
    pub proof_media: Vec<String>,
    pub resolved_by: String,
    pub resolved_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ResolvedReport {
    pub fn from_report(
        id: String,
        report: &Report,
        resolution_description: String,
        proof_media: Vec<String>,
        resolved_by: String,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            original_report_id: report.id.clone(),
            owner_id: report.owner_id.clone(),
            title: report.title.clone(),
            description: report.description.clone(),
            category: report.category.clone(),
            location: report.location.clone(),
            latitude: report.latitude,
            longitude: report.longitude,
            is_urgent: report.is_urgent,
            media: report.media.clone(),
            comments: report.comments.clone(),
            resolution_description,
            proof_media,
            resolved_by,
            resolved_at,
            created_at: report.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_status_follows_urgency() {
        assert_eq!(ReportStatus::initial(true), ReportStatus::Pending);
        assert_eq!(ReportStatus::initial(false), ReportStatus::AwaitingApproval);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("in-progress".parse::<ReportStatus>(), Ok(ReportStatus::InProgress));
        assert!("resolved".parse::<ReportStatus>().is_err());
        assert!("Pending".parse::<ReportStatus>().is_err());
        let json = serde_json::to_string(&ReportStatus::AwaitingApproval).unwrap();
        assert_eq!(json, "\"awaiting-approval\"");
    }

    #[test]
    fn test_reputation_levels() {
        let mut rep = Reputation::default();
        assert_eq!(rep.level, "Newcomer");
        rep.award_resolved();
        rep.award_resolved();
        assert_eq!(rep.points, 50);
        assert_eq!(rep.resolved_reports, 2);
        assert_eq!(rep.level, "Contributor");
        rep.award_verified();
        assert_eq!(rep.verified_reports, 1);
        assert_eq!(rep.points, 60);
    }
}
