use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Outbound notices sent to residents by the lifecycle and moderation paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Notice {
    /// An awaiting-approval report was approved and is now public
    ReportApproved {
        recipient_name: String,
        report_id: String,
        title: String,
    },

    /// An awaiting-approval report was rejected and deleted
    ReportRejected {
        recipient_name: String,
        report_id: String,
        title: String,
        reasons: Vec<String>,
    },

    /// A live report was removed by a moderator
    ReportRemoved {
        recipient_name: String,
        title: String,
        reason: String,
    },

    /// Thanks to a resident whose flag led to a removal
    FlaggerThanks {
        recipient_name: String,
        title: String,
    },

    /// The recipient's account was suspended
    AccountSuspended {
        recipient_name: String,
        reason: String,
    },

    /// The recipient's account was reinstated
    AccountRestored { recipient_name: String },
}

/// Fallback removal reason when the moderator gives none.
pub const DEFAULT_REMOVAL_REASON: &str =
    "This report violated our community guidelines and was flagged by community members.";

/// Reasons listed when a rejection carries none of its own.
const DEFAULT_REJECTION_REASONS: &[&str] = &[
    "The report did not meet our community guidelines",
    "The issue was a duplicate or already reported",
    "Insufficient information was provided",
    "The issue is outside the scope of our service",
];

impl Notice {
    pub fn subject(&self) -> String {
        match self {
            Self::ReportApproved { report_id, .. } => {
                format!("Your FixIt report has been approved (ID: {})", report_id)
            }
            Self::ReportRejected { report_id, .. } => {
                format!("Your FixIt report was not approved (ID: {})", report_id)
            }
            Self::ReportRemoved { title, .. } => format!("Your report has been removed - {}", title),
            Self::FlaggerThanks { title, .. } => format!("Thank you for flagging - {}", title),
            Self::AccountSuspended { .. } => "Your FixIt account has been suspended".to_string(),
            Self::AccountRestored { .. } => "Your FixIt account has been reinstated".to_string(),
        }
    }

    /// HTML mail body. Every interpolated field is escaped; titles, names and
    /// reasons are user-supplied and reach other residents' inboxes.
    pub fn body(&self) -> String {
        match self {
            Self::ReportApproved { recipient_name, report_id, title } => {
                let (recipient_name, report_id, title) =
                    (escape(recipient_name), escape(report_id), escape(title));
                format!(
                    "<h2>Report Approved</h2>\
                     <p>Hi {recipient_name},</p>\
                     <p>Your report has been approved by our administrators and is now publicly visible.</p>\
                     <ul><li><strong>Report ID:</strong> {report_id}</li>\
                     <li><strong>Title:</strong> {title}</li>\
                     <li><strong>Status:</strong> Pending</li></ul>\
                     <p>Our team will now work on resolving this issue.</p>"
                )
            }
            Self::ReportRejected { recipient_name, report_id, title, reasons } => {
                let items: String = if reasons.is_empty() {
                    DEFAULT_REJECTION_REASONS
                        .iter()
                        .map(|r| format!("<li>{}</li>", r))
                        .collect()
                } else {
                    reasons.iter().map(|r| format!("<li>{}</li>", escape(r))).collect()
                };
                let (recipient_name, report_id, title) =
                    (escape(recipient_name), escape(report_id), escape(title));
                format!(
                    "<h2>Report Not Approved</h2>\
                     <p>Hi {recipient_name},</p>\
                     <p>Your report was not approved for public posting.</p>\
                     <ul><li><strong>Report ID:</strong> {report_id}</li>\
                     <li><strong>Title:</strong> {title}</li></ul>\
                     <p><strong>Reasons:</strong></p><ul>{items}</ul>\
                     <p>You are welcome to submit a new report with more details.</p>"
                )
            }
            Self::ReportRemoved { recipient_name, title, reason } => {
                let (recipient_name, title, reason) =
                    (escape(recipient_name), escape(title), escape(reason));
                format!(
                    "<h2>Report Removed</h2>\
                     <p>Hi {recipient_name},</p>\
                     <p>Your report \"{title}\" has been removed by a moderator.</p>\
                     <p><strong>Reason:</strong> {reason}</p>"
                )
            }
            Self::FlaggerThanks { recipient_name, title } => {
                let (recipient_name, title) = (escape(recipient_name), escape(title));
                format!(
                    "<h2>Thank You</h2>\
                     <p>Hi {recipient_name},</p>\
                     <p>The report \"{title}\" that you flagged has been reviewed and removed.</p>\
                     <p>Thank you for helping keep the community accurate.</p>"
                )
            }
            Self::AccountSuspended { recipient_name, reason } => {
                let (recipient_name, reason) = (escape(recipient_name), escape(reason));
                format!(
                    "<h2>Account Suspended</h2>\
                     <p>Hi {recipient_name},</p>\
                     <p>Your account has been suspended.</p>\
                     <p><strong>Reason:</strong> {reason}</p>"
                )
            }
            Self::AccountRestored { recipient_name } => {
                let recipient_name = escape(recipient_name);
                format!(
                    "<h2>Account Reinstated</h2>\
                     <p>Hi {recipient_name},</p>\
                     <p>Your account has been reinstated. You can sign in again.</p>"
                )
            }
        }
    }
}

fn escape(text: &str) -> Cow<'_, str> {
    html_escape::encode_text(text)
}
