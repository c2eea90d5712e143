use log::warn;

use super::{answer::Answer, participant::Participant, session::{Session, SessionState}};
use crate::store::{ChangeEvent, ChangeKind, Table, TableRow};

/// What a client can learn about a session from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SessionCreated(Session),
    SessionStarted(Session),
    QuestionPushed(Session),
    ParticipantJoined(Participant),
    ParticipantLeft { participant_id: String },
    AnswerRecorded(Answer),
    SessionEnded(Session),
}

impl SessionEvent {
    pub fn from_session(session: Session) -> Self {
        match session.session_state {
            SessionState::Waiting => SessionEvent::SessionCreated(session),
            SessionState::Started => SessionEvent::SessionStarted(session),
            SessionState::Active => SessionEvent::QuestionPushed(session),
            SessionState::Ended => SessionEvent::SessionEnded(session),
        }
    }

    /// Translates a raw row change. Malformed rows are logged and dropped.
    pub fn from_change(change: ChangeEvent) -> Option<Self> {
        let ChangeEvent { kind, table, row } = change;

        match table {
            Table::Sessions => match kind {
                ChangeKind::Delete => None,
                ChangeKind::Insert | ChangeKind::Update => {
                    Session::from_row(row).map(SessionEvent::from_session).map_err(log_malformed).ok()
                }
            },
            Table::Participants => match Participant::from_row(row) {
                Ok(participant) if kind != ChangeKind::Delete && participant.is_connected => {
                    Some(SessionEvent::ParticipantJoined(participant))
                }
                Ok(participant) => Some(SessionEvent::ParticipantLeft {
                    participant_id: participant.id,
                }),
                Err(error) => {
                    log_malformed(error);
                    None
                }
            },
            Table::Answers => match kind {
                ChangeKind::Delete => None,
                ChangeKind::Insert | ChangeKind::Update => {
                    Answer::from_row(row).map(SessionEvent::AnswerRecorded).map_err(log_malformed).ok()
                }
            },
            Table::Quizzes | Table::Questions => None,
        }
    }
}

fn log_malformed(error: crate::error::StoreError) {
    warn!("Ignoring change: {}", error);
}
