//! Mirrors interview transitions onto the linked submission status.

use sqlx::PgConnection;
use tracing::debug;

use crate::error::Result;
use crate::models::interview::{Interview, InterviewStatus, SiblingRevision};
use crate::services::{interview_repo, submission_service};

use InterviewStatus::*;

/// Submission statuses that an interview rejection must not overwrite; the
/// candidate has already moved past (or out of) the interview stage.
pub const ADVANCED_SUBMISSION_STATUSES: [&str; 7] = [
    "Offer Pending",
    "Offer Released",
    "Offer Accepted",
    "Hired",
    "Withdrawn",
    "Rejected",
    "Interview Rejected",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Scheduled,
    Accepted,
    Proposed(InterviewStatus),
    Rescheduled,
    Completed,
    Cancelled,
    Rejected,
}

impl Projection {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Scheduled => "Interview Scheduled",
            Self::Accepted => "Interview Accepted",
            Self::Proposed(PendingConfirmation) => "Interview Pending Confirmation",
            Self::Proposed(_) => "Interview Pending Acceptance",
            Self::Rescheduled => "Interview Rescheduled",
            Self::Completed => "Interview Completed",
            Self::Cancelled => "Interview Cancelled",
            Self::Rejected => "Interview Rejected",
        }
    }

    /// Sibling-revision statuses that win over this projection.
    pub fn blocking_sibling_statuses(&self) -> &'static [InterviewStatus] {
        match self {
            Self::Accepted | Self::Proposed(_) | Self::Rescheduled => {
                &[PendingAcceptance, PendingConfirmation]
            }
            Self::Cancelled => &[
                PendingAcceptance,
                PendingConfirmation,
                Accepted,
                Completed,
                Rejected,
            ],
            Self::Scheduled | Self::Completed | Self::Rejected => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Apply(&'static str),
    Skip(String),
}

pub fn decide(
    projection: Projection,
    siblings: &[SiblingRevision],
    current_submission_status: &str,
) -> Decision {
    if projection == Projection::Rejected {
        let current = current_submission_status.trim();
        if ADVANCED_SUBMISSION_STATUSES
            .iter()
            .any(|s| s.eq_ignore_ascii_case(current))
        {
            return Decision::Skip(format!("submission already at '{}'", current));
        }
        return Decision::Apply(projection.label());
    }

    let blocking = projection.blocking_sibling_statuses();
    if let Some(sibling) = siblings.iter().find(|s| blocking.contains(&s.status)) {
        return Decision::Skip(format!(
            "revision {} is {}",
            sibling.revision, sibling.status
        ));
    }
    Decision::Apply(projection.label())
}

/// Runs on the caller's transaction so the projection commits or rolls back
/// together with the interview write.
pub async fn project(
    conn: &mut PgConnection,
    interview: &Interview,
    projection: Projection,
) -> Result<Decision> {
    let siblings = interview_repo::siblings(conn, interview).await?;
    let submission = submission_service::lock(conn, interview.submission_id).await?;

    let decision = decide(projection, &siblings, &submission.status);
    match &decision {
        Decision::Apply(label) => {
            submission_service::update_status(conn, submission.id, label).await?;
        }
        Decision::Skip(reason) => {
            debug!(
                interview_id = %interview.id,
                projection = projection.label(),
                reason = %reason,
                "submission status projection skipped"
            );
        }
    }
    Ok(decision)
}
