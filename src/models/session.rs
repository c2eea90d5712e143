use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Table, TableRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Waiting,
    Started,
    Active,
    Ended,
}

impl SessionState {
    /// `waiting -> started -> active (-> active)* -> ended`, plus ending early
    /// from any live state. `started -> started` re-stamps the start time.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Waiting, Started)
                | (Started, Started)
                | (Started, Active)
                | (Active, Active)
                | (Waiting, Ended)
                | (Started, Ended)
                | (Active, Ended)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Waiting => "waiting",
            SessionState::Started => "started",
            SessionState::Active => "active",
            SessionState::Ended => "ended",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub session_code: String,
    pub quiz_id: String,
    pub teacher_name: String,
    pub session_state: SessionState,
    #[serde(default)]
    pub current_question_index: usize,
    #[serde(default)]
    pub current_question_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl TableRow for Session {
    const TABLE: Table = Table::Sessions;
}

/// The shared question pointer. Every client derives its countdown from `started_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub index: usize,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: String,
        session_code: String,
        quiz_id: String,
        teacher_name: String,
        now: DateTime<Utc>,
    ) -> Self {
        Session {
            id,
            session_code,
            quiz_id,
            teacher_name,
            session_state: SessionState::Waiting,
            current_question_index: 0,
            current_question_started_at: None,
            created_at: now,
            started_at: None,
            ended_at: None,
            is_active: true,
        }
    }

    /// The question on screen, if one has been pushed and the session is still running.
    pub fn cursor(&self) -> Option<Cursor> {
        match (self.session_state, self.current_question_started_at) {
            (SessionState::Active, Some(started_at)) => Some(Cursor {
                index: self.current_question_index,
                started_at,
            }),
            _ => None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.session_state == SessionState::Ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn transitions_follow_lifecycle() {
        assert!(Waiting.can_transition_to(Started));
        assert!(Started.can_transition_to(Started));
        assert!(Started.can_transition_to(Active));
        assert!(Active.can_transition_to(Active));
        assert!(Active.can_transition_to(Ended));

        assert!(!Waiting.can_transition_to(Active));
        assert!(!Active.can_transition_to(Started));
        for next in [Waiting, Started, Active, Ended] {
            assert!(!Ended.can_transition_to(next));
        }
    }

    #[test]
    fn cursor_only_while_active() {
        let now = Utc::now();
        let mut session = Session::new(
            "s1".to_string(),
            "123456".to_string(),
            "q1".to_string(),
            "Ms. Berg".to_string(),
            now,
        );
        assert_eq!(session.cursor(), None);

        session.session_state = Active;
        session.current_question_index = 2;
        session.current_question_started_at = Some(now);
        assert_eq!(session.cursor(), Some(Cursor { index: 2, started_at: now }));

        session.session_state = Ended;
        assert_eq!(session.cursor(), None);
    }

    #[test]
    fn rows_round_trip_through_schema() {
        let session = Session::new(
            "s1".to_string(),
            "654321".to_string(),
            "q1".to_string(),
            "Ms. Berg".to_string(),
            Utc::now(),
        );
        let row = session.to_row().unwrap();
        assert_eq!(row.get("session_state"), Some(&serde_json::json!("waiting")));
        assert_eq!(Session::from_row(row).unwrap(), session);
    }
}
