use uuid::Uuid;

use crate::launcher::LaunchError;

/// Domain errors surfaced to callers of the lead-list service.
///
/// State conflicts and not-found are synchronous, side-effect-free
/// answers; everything else is infrastructure bubbling up.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("lead list {0} not found")]
    NotFound(Uuid),

    #[error("cannot {action} lead list with status '{status}'")]
    StateConflict { action: &'static str, status: String },

    #[error("{0}")]
    Validation(String),

    #[error("worker launch failed: {0}")]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
