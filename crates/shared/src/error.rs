use thiserror::Error;

/// Errors raised by selection, assembly and the content store
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid post limit {0}: must be at least 1")]
    InvalidLimit(i64),

    #[error("No new posts to generate from")]
    EmptyCandidatePool,

    #[error("Generation failed for episode {episode_id}: {message}")]
    GenerationFailure { episode_id: i64, message: String },

    #[error("Refusing to clear posts while {episodes} episode(s) still reference them; clear episodes first or use --all")]
    PostsReferenced { episodes: usize },

    #[error("Episode {0} not found")]
    EpisodeNotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// "Nothing new today" is a valid outcome, not a failure
    pub fn is_nothing_to_do(&self) -> bool {
        matches!(self, Error::EmptyCandidatePool)
    }

    /// Whether the next scheduled run may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::GenerationFailure { .. } | Error::EmptyCandidatePool
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_to_do() {
        assert!(Error::EmptyCandidatePool.is_nothing_to_do());
        assert!(!Error::InvalidLimit(0).is_nothing_to_do());
    }

    #[test]
    fn test_is_retryable() {
        assert!(
            Error::GenerationFailure {
                episode_id: 1,
                message: "boom".to_string()
            }
            .is_retryable()
        );
        assert!(!Error::InvalidLimit(-1).is_retryable());
        assert!(!Error::PostsReferenced { episodes: 2 }.is_retryable());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::InvalidLimit(0).to_string(),
            "Invalid post limit 0: must be at least 1"
        );
        assert!(Error::PostsReferenced { episodes: 3 }
            .to_string()
            .contains("3 episode(s)"));
    }
}
