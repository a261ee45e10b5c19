use thiserror::Error;
use uuid::Uuid;

use crate::curriculum::Track;
use crate::progression::FeedError;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("progression feed unavailable: {0}")]
    Feed(#[from] FeedError),

    #[error("audit {0} not found")]
    NotFound(Uuid),

    #[error("group '{group_id}' not found for project '{project}'")]
    GroupNotFound { project: String, group_id: String },

    #[error("group '{group_id}' is '{status}', only finished groups can be audited")]
    GroupNotFinished { group_id: String, status: String },

    #[error("student '{0}' is not a member of this group")]
    NotAMember(String),

    #[error("student '{0}' is listed more than once")]
    DuplicateStudent(String),

    #[error("project '{project}' does not belong to the {track} track")]
    ProjectOutsideTrack { project: String, track: Track },

    #[error("an audit needs at least one student result")]
    EmptyResults,

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("group '{group_id}' of project '{project}' in promotion '{promotion_id}' is already audited")]
    Conflict {
        promotion_id: String,
        project: String,
        group_id: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AuditError {
    /// True for errors caused by the submitted payload rather than the service.
    pub fn is_invalid_submission(&self) -> bool {
        matches!(
            self,
            AuditError::GroupNotFinished { .. }
                | AuditError::NotAMember(_)
                | AuditError::DuplicateStudent(_)
                | AuditError::ProjectOutsideTrack { .. }
                | AuditError::EmptyResults
                | AuditError::BadRequest(_)
        )
    }
}
