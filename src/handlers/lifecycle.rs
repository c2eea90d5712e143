use std::sync::Arc;

use log::{info, warn};
use serde_json::{json, Value};
use uuid::Uuid;

use super::code_generator::SessionCodeGenerator;
use crate::{
    clock::Clock,
    error::{SessionError, StoreError},
    models::session::{Session, SessionState},
    store::{
        schema::{fetch_many, fetch_one, insert_row, patch},
        Filter, Row, SessionStore, Table, TableRow,
    },
};

/// Teacher-side writes to the session row: create, start, push a question, end.
pub struct SessionLifecycle {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    codes: SessionCodeGenerator,
}

impl SessionLifecycle {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, codes: SessionCodeGenerator) -> Self {
        SessionLifecycle { store, clock, codes }
    }

    /// Returns `(session_code, session_id)`.
    pub async fn create_session(
        &self,
        quiz_id: &str,
        teacher_name: &str,
    ) -> Result<(String, String), SessionError> {
        let code = self.codes.generate().await?;
        let session = Session::new(
            Uuid::new_v4().to_string(),
            code,
            quiz_id.to_string(),
            teacher_name.trim().to_string(),
            self.clock.now(),
        );
        let session = insert_row(self.store.as_ref(), &session).await?;

        info!(
            "Session {} created with code {} for quiz {}",
            session.id, session.session_code, quiz_id
        );
        Ok((session.session_code, session.id))
    }

    /// Moves the session out of the lobby. Calling it again while `started`
    /// stamps a fresh `started_at` instead of failing.
    pub async fn advance_to_started(&self, session_id: &str) -> Result<Session, SessionError> {
        let session = self.fetch(session_id).await?;
        if session.session_state == SessionState::Started {
            warn!("Session {} was already started, re-stamping start time", session_id);
        }

        let now = self.clock.now();
        self.transition(
            session,
            SessionState::Started,
            patch([("started_at", json!(now))]),
        )
        .await
    }

    /// Points every client at question `index` and stamps the shared start time.
    /// The index is not checked against the quiz length.
    pub async fn push_question(&self, session_id: &str, index: usize) -> Result<Session, SessionError> {
        let session = self.fetch(session_id).await?;
        let now = self.clock.now();

        let session = self
            .transition(
                session,
                SessionState::Active,
                patch([
                    ("current_question_index", json!(index)),
                    ("current_question_started_at", json!(now)),
                ]),
            )
            .await?;

        info!("Session {} pushed question {}", session_id, index);
        Ok(session)
    }

    pub async fn end_session(&self, session_id: &str) -> Result<Session, SessionError> {
        let session = self.fetch(session_id).await?;
        let now = self.clock.now();

        let session = self
            .transition(session, SessionState::Ended, patch([("ended_at", json!(now))]))
            .await?;

        info!("Session {} ended", session_id);
        Ok(session)
    }

    /// The session row, ended or not.
    pub async fn fetch(&self, session_id: &str) -> Result<Session, SessionError> {
        fetch_one(self.store.as_ref(), &Filter::by_id(session_id))
            .await
            .map_err(not_found)
    }

    pub async fn find_active(&self, session_code: &str) -> Result<Session, SessionError> {
        let sessions: Vec<Session> = fetch_many(
            self.store.as_ref(),
            &Filter::new()
                .eq("session_code", session_code)
                .eq("is_active", true),
            None,
        )
        .await?;

        sessions.into_iter().next().ok_or(SessionError::SessionNotFound)
    }

    async fn transition(
        &self,
        mut session: Session,
        next: SessionState,
        mut fields: Row,
    ) -> Result<Session, SessionError> {
        if session.is_ended() {
            return Err(SessionError::SessionEnded);
        }
        if !session.session_state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: session.session_state,
                to: next,
            });
        }

        fields.insert("session_state".to_string(), json!(next));
        fields.insert("is_active".to_string(), Value::Bool(next != SessionState::Ended));
        self.store
            .update(Table::Sessions, &Filter::by_id(&session.id), fields.clone())
            .await?;

        let mut row = session.to_row()?;
        row.extend(fields);
        session = Session::from_row(row)?;
        Ok(session)
    }
}

fn not_found(error: StoreError) -> SessionError {
    match error {
        StoreError::NotFound { .. } => SessionError::SessionNotFound,
        other => SessionError::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        handlers::code_generator::FixedCodes,
        store::SqliteStore,
    };
    use chrono::{Duration, TimeZone, Utc};

    fn lifecycle(codes: FixedCodes) -> (SessionLifecycle, Arc<ManualClock>) {
        let store: Arc<dyn SessionStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap()));
        let generator = SessionCodeGenerator::new(store.clone(), Arc::new(codes), 3);
        (SessionLifecycle::new(store, clock.clone(), generator), clock)
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let (lifecycle, clock) = lifecycle(FixedCodes::new(["483920"]));

        let (code, id) = lifecycle.create_session("quiz-1", "Ms. Berg").await.unwrap();
        assert_eq!(code, "483920");
        let session = lifecycle.fetch(&id).await.unwrap();
        assert_eq!(session.session_state, SessionState::Waiting);
        assert!(session.is_active);

        let started = lifecycle.advance_to_started(&id).await.unwrap();
        assert_eq!(started.session_state, SessionState::Started);
        assert_eq!(started.started_at, Some(clock.now()));

        clock.advance(Duration::seconds(5));
        let pushed = lifecycle.push_question(&id, 0).await.unwrap();
        assert_eq!(pushed.session_state, SessionState::Active);
        assert_eq!(pushed.current_question_started_at, Some(clock.now()));

        clock.advance(Duration::seconds(30));
        let ended = lifecycle.end_session(&id).await.unwrap();
        assert_eq!(ended.session_state, SessionState::Ended);
        assert!(!ended.is_active);
        assert_eq!(ended.ended_at, Some(clock.now()));
        assert_eq!(lifecycle.fetch(&id).await.unwrap(), ended);
    }

    #[tokio::test]
    async fn ended_sessions_reject_every_call() {
        let (lifecycle, _) = lifecycle(FixedCodes::new(["111111"]));
        let (_, id) = lifecycle.create_session("quiz-1", "Ms. Berg").await.unwrap();
        let ended = lifecycle.end_session(&id).await.unwrap();

        assert!(matches!(lifecycle.advance_to_started(&id).await, Err(SessionError::SessionEnded)));
        assert!(matches!(lifecycle.push_question(&id, 1).await, Err(SessionError::SessionEnded)));
        assert!(matches!(lifecycle.end_session(&id).await, Err(SessionError::SessionEnded)));
        assert_eq!(lifecycle.fetch(&id).await.unwrap().ended_at, ended.ended_at);
    }

    #[tokio::test]
    async fn start_is_repeatable_and_push_needs_start() {
        let (lifecycle, clock) = lifecycle(FixedCodes::new(["111111"]));
        let (_, id) = lifecycle.create_session("quiz-1", "Ms. Berg").await.unwrap();

        assert!(matches!(
            lifecycle.push_question(&id, 0).await,
            Err(SessionError::InvalidTransition {
                from: SessionState::Waiting,
                to: SessionState::Active
            })
        ));

        lifecycle.advance_to_started(&id).await.unwrap();
        clock.advance(Duration::seconds(3));
        let again = lifecycle.advance_to_started(&id).await.unwrap();
        assert_eq!(again.started_at, Some(clock.now()));

        lifecycle.push_question(&id, 0).await.unwrap();
        assert!(matches!(
            lifecycle.advance_to_started(&id).await,
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn codes_are_unique_among_active_sessions_only() {
        let (lifecycle, _) = lifecycle(FixedCodes::new(["222222", "222222", "333333", "222222"]));

        let (first, first_id) = lifecycle.create_session("quiz-1", "A").await.unwrap();
        let (second, _) = lifecycle.create_session("quiz-1", "B").await.unwrap();
        assert_eq!(first, "222222");
        assert_eq!(second, "333333");

        lifecycle.end_session(&first_id).await.unwrap();
        let (third, _) = lifecycle.create_session("quiz-1", "C").await.unwrap();
        assert_eq!(third, "222222");
    }

    #[tokio::test]
    async fn exhausted_codes_fail() {
        let (lifecycle, _) = lifecycle(FixedCodes::new(["444444"]));
        lifecycle.create_session("quiz-1", "A").await.unwrap();

        assert!(matches!(
            lifecycle.create_session("quiz-1", "B").await,
            Err(SessionError::CodeGenerationExhausted { attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn unknown_sessions() {
        let (lifecycle, _) = lifecycle(FixedCodes::new(["555555"]));
        assert!(matches!(lifecycle.fetch("missing").await, Err(SessionError::SessionNotFound)));
        assert!(matches!(lifecycle.find_active("555555").await, Err(SessionError::SessionNotFound)));
    }
}
