use thiserror::Error;

use crate::models::session::SessionState;
use crate::store::Table;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No row found in {table}")]
    NotFound { table: Table },

    #[error("Unique key violated in {table}")]
    Conflict { table: Table },

    #[error("Malformed row in {table}: {source}")]
    Malformed {
        table: Table,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store does not support {0}")]
    Unsupported(&'static str),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found, check your code")]
    SessionNotFound,

    #[error("Could not find a free session code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: usize },

    #[error("Session has ended")]
    SessionEnded,

    #[error("Answer could not be saved: {0}")]
    AnswerWriteFailed(#[source] StoreError),

    #[error("Change feed for {table} was lost")]
    SubscriptionLost { table: Table },

    #[error("Session cannot go from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("Please enter a name")]
    InvalidName,

    #[error("Quiz not found")]
    QuizNotFound,

    #[error("Invalid quiz: {0}")]
    InvalidQuiz(String),

    #[error("{0}")]
    NotAllowed(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    /// Errors whose message can be shown to a teacher or student as is.
    /// Everything else is reported as a generic failure.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            SessionError::SessionNotFound
                | SessionError::SessionEnded
                | SessionError::InvalidTransition { .. }
                | SessionError::InvalidName
                | SessionError::QuizNotFound
                | SessionError::InvalidQuiz(_)
                | SessionError::NotAllowed(_)
                | SessionError::Token(_)
        )
    }

    pub fn user_message(&self) -> String {
        if self.is_user_visible() {
            self.to_string()
        } else {
            "Something went wrong, please try again".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_masked() {
        let error = SessionError::CodeGenerationExhausted { attempts: 10 };
        assert!(!error.is_user_visible());
        assert_eq!(error.user_message(), "Something went wrong, please try again");

        let error = SessionError::SessionNotFound;
        assert_eq!(error.user_message(), "Session not found, check your code");
    }
}
