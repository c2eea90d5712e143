use std::sync::Arc;

use log::info;
use serde_json::json;
use uuid::Uuid;

use super::{code_generator::is_valid_code, lifecycle::SessionLifecycle};
use crate::{
    clock::Clock,
    error::SessionError,
    helpers::disambiguate_name,
    models::participant::Participant,
    store::{
        schema::{fetch_many, fetch_one, insert_row, patch},
        Filter, SessionStore, Table,
    },
};

/// Join, leave and roster reads for one session's participants.
pub struct ParticipantRegistry {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    lifecycle: Arc<SessionLifecycle>,
}

impl ParticipantRegistry {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, lifecycle: Arc<SessionLifecycle>) -> Self {
        ParticipantRegistry {
            store,
            clock,
            lifecycle,
        }
    }

    /// Adds a participant to the active session with `session_code`. A name
    /// already in use gets an ordinal suffix. Read-then-insert: two joins racing
    /// on the same name can both get it.
    pub async fn join(&self, session_code: &str, name: &str) -> Result<Participant, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidName);
        }
        let session_code = session_code.trim();
        if !is_valid_code(session_code) {
            return Err(SessionError::SessionNotFound);
        }

        let session = self.lifecycle.find_active(session_code).await?;
        let existing = self.all(&session.id).await?;
        let participant_name =
            disambiguate_name(name, existing.iter().map(|p| p.participant_name.as_str()));

        let participant = Participant {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            participant_name,
            joined_at: self.clock.now(),
            is_connected: true,
        };
        let participant = insert_row(self.store.as_ref(), &participant).await?;

        info!(
            "{} joined session {} as {}",
            name, session.session_code, participant.participant_name
        );
        Ok(participant)
    }

    /// Connected participants, oldest join first.
    pub async fn list_connected(&self, session_id: &str) -> Result<Vec<Participant>, SessionError> {
        let mut participants: Vec<Participant> = fetch_many(
            self.store.as_ref(),
            &Filter::new()
                .eq("session_id", session_id)
                .eq("is_connected", true),
            None,
        )
        .await?;
        participants.sort_by_key(|participant| participant.joined_at);
        Ok(participants)
    }

    /// Everyone who ever joined, connected or not.
    pub async fn all(&self, session_id: &str) -> Result<Vec<Participant>, SessionError> {
        let mut participants: Vec<Participant> =
            fetch_many(self.store.as_ref(), &Filter::new().eq("session_id", session_id), None).await?;
        participants.sort_by_key(|participant| participant.joined_at);
        Ok(participants)
    }

    /// Marks the participant as gone. The row stays for results and reconnects.
    pub async fn leave(&self, participant_id: &str) -> Result<(), SessionError> {
        self.store
            .update(
                Table::Participants,
                &Filter::by_id(participant_id),
                patch([("is_connected", json!(false))]),
            )
            .await?;
        info!("Participant {} left", participant_id);
        Ok(())
    }

    /// Brings a participant who left back into a session that is still running.
    pub async fn reconnect(&self, participant_id: &str) -> Result<Participant, SessionError> {
        let mut participant: Participant = fetch_one(self.store.as_ref(), &Filter::by_id(participant_id))
            .await
            .map_err(|_| SessionError::SessionNotFound)?;

        let session = self.lifecycle.fetch(&participant.session_id).await?;
        if session.is_ended() {
            return Err(SessionError::SessionEnded);
        }

        if !participant.is_connected {
            self.store
                .update(
                    Table::Participants,
                    &Filter::by_id(participant_id),
                    patch([("is_connected", json!(true))]),
                )
                .await?;
            participant.is_connected = true;
            info!("Participant {} reconnected", participant_id);
        }
        Ok(participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        handlers::code_generator::{FixedCodes, SessionCodeGenerator},
        store::SqliteStore,
    };
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        registry: ParticipantRegistry,
        lifecycle: Arc<SessionLifecycle>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn SessionStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap()));
        let generator =
            SessionCodeGenerator::new(store.clone(), Arc::new(FixedCodes::new(["483920", "777777"])), 3);
        let lifecycle = Arc::new(SessionLifecycle::new(store.clone(), clock.clone(), generator));
        let registry = ParticipantRegistry::new(store, clock.clone(), lifecycle.clone());
        Fixture {
            registry,
            lifecycle,
            clock,
        }
    }

    #[tokio::test]
    async fn duplicate_names_get_ordinals() {
        let f = fixture();
        f.lifecycle.create_session("quiz-1", "Ms. Berg").await.unwrap();

        let mut names = Vec::new();
        for _ in 0..3 {
            names.push(f.registry.join("483920", "Alex").await.unwrap().participant_name);
            f.clock.advance(Duration::seconds(1));
        }

        assert_eq!(names, vec!["Alex", "Alex (2)", "Alex (3)"]);
    }

    #[tokio::test]
    async fn join_needs_an_active_session() {
        let f = fixture();
        let (code, id) = f.lifecycle.create_session("quiz-1", "Ms. Berg").await.unwrap();

        assert!(matches!(f.registry.join("000000", "Mia").await, Err(SessionError::SessionNotFound)));
        assert!(matches!(f.registry.join("12ab56", "Mia").await, Err(SessionError::SessionNotFound)));
        assert!(matches!(f.registry.join(&code, "   ").await, Err(SessionError::InvalidName)));

        f.lifecycle.end_session(&id).await.unwrap();
        assert!(matches!(f.registry.join(&code, "Mia").await, Err(SessionError::SessionNotFound)));
    }

    #[tokio::test]
    async fn leave_keeps_the_row_and_hides_from_roster() {
        let f = fixture();
        let (code, id) = f.lifecycle.create_session("quiz-1", "Ms. Berg").await.unwrap();

        let mia = f.registry.join(&code, "Mia").await.unwrap();
        f.clock.advance(Duration::seconds(1));
        let noah = f.registry.join(&code, "Noah").await.unwrap();

        let roster = f.registry.list_connected(&id).await.unwrap();
        assert_eq!(roster, vec![mia.clone(), noah.clone()]);

        f.registry.leave(&mia.id).await.unwrap();
        let roster = f.registry.list_connected(&id).await.unwrap();
        assert_eq!(roster, vec![noah]);
        assert_eq!(f.registry.all(&id).await.unwrap().len(), 2);

        let back = f.registry.reconnect(&mia.id).await.unwrap();
        assert!(back.is_connected);
        assert_eq!(f.registry.list_connected(&id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn names_that_left_stay_taken() {
        let f = fixture();
        let (code, _) = f.lifecycle.create_session("quiz-1", "Ms. Berg").await.unwrap();

        let first = f.registry.join(&code, "Alex").await.unwrap();
        f.registry.leave(&first.id).await.unwrap();

        assert_eq!(f.registry.join(&code, "Alex").await.unwrap().participant_name, "Alex (2)");
    }
}
