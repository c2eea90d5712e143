use std::sync::Arc;

use log::info;

use super::lifecycle::SessionLifecycle;
use crate::{
    error::SessionError,
    models::{
        quiz::Quiz,
        session::{Session, SessionState},
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum CursorMove {
    Pushed(Session),
    Ended(Session),
    Unchanged(Session),
}

impl CursorMove {
    pub fn session(&self) -> &Session {
        match self {
            CursorMove::Pushed(session) | CursorMove::Ended(session) | CursorMove::Unchanged(session) => {
                session
            }
        }
    }
}

/// Moves the shared question pointer. Each move goes through
/// [`SessionLifecycle::push_question`], so it always stamps a fresh start time.
pub struct QuestionCursor {
    lifecycle: Arc<SessionLifecycle>,
}

impl QuestionCursor {
    pub fn new(lifecycle: Arc<SessionLifecycle>) -> Self {
        QuestionCursor { lifecycle }
    }

    /// Shows the next question, or ends the session after the last one.
    /// A `started` session has not shown a question yet, so it gets the one
    /// under the cursor.
    pub async fn advance(&self, session_id: &str, quiz: &Quiz) -> Result<CursorMove, SessionError> {
        let session = self.lifecycle.fetch(session_id).await?;
        if session.is_ended() {
            return Err(SessionError::SessionEnded);
        }

        let next = match session.session_state {
            SessionState::Active => session.current_question_index + 1,
            _ => session.current_question_index,
        };

        if next < quiz.len() {
            let session = self.lifecycle.push_question(session_id, next).await?;
            Ok(CursorMove::Pushed(session))
        } else {
            info!("Session {} ran out of questions", session_id);
            let session = self.lifecycle.end_session(session_id).await?;
            Ok(CursorMove::Ended(session))
        }
    }

    /// Goes back one question. At the first question this does nothing.
    pub async fn retreat(&self, session_id: &str) -> Result<CursorMove, SessionError> {
        let session = self.lifecycle.fetch(session_id).await?;
        if session.is_ended() {
            return Err(SessionError::SessionEnded);
        }

        match session.current_question_index.checked_sub(1) {
            Some(previous) => {
                let session = self.lifecycle.push_question(session_id, previous).await?;
                Ok(CursorMove::Pushed(session))
            }
            None => Ok(CursorMove::Unchanged(session)),
        }
    }
}
