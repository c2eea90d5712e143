#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeZone, Utc};
use classroom_quiz::{
    clock::ManualClock,
    config::{LifecycleConfig, SyncConfig},
    handlers::{code_generator::FixedCodes, AppContext},
    jwtoken::TokenKeys,
    models::quiz::{PackQuestion, QuestionType, Quiz, QuizPack},
    store::{SessionStore, SqliteStore},
    sync::{ClientSyncEngine, ViewUpdate},
};
use futures_channel::mpsc::UnboundedReceiver;
use futures_util::StreamExt;

pub const SESSION_CODE: &str = "483920";

pub struct Harness {
    pub ctx: Arc<AppContext>,
    pub store: Arc<SqliteStore>,
    pub clock: Arc<ManualClock>,
    pub quiz: Quiz,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap()
}

/// Short intervals so fallbacks and ticks show up within a test.
pub fn fast_sync() -> SyncConfig {
    SyncConfig {
        answer_poll: Duration::from_millis(50),
        session_poll: Duration::from_millis(50),
        participant_poll: Duration::from_millis(50),
        resubscribe_attempts: 3,
        resubscribe_delay: Duration::from_secs(30),
        tick: Duration::from_millis(50),
    }
}

pub fn geography_pack() -> QuizPack {
    QuizPack {
        title: "Nordic capitals".to_string(),
        description: None,
        questions: vec![
            PackQuestion {
                question_text: "Capital of Sweden?".to_string(),
                question_type: QuestionType::MultipleChoice,
                options: Some(vec![
                    "Oslo".to_string(),
                    "Stockholm".to_string(),
                    "Helsinki".to_string(),
                ]),
                correct_answer: "Stockholm".to_string(),
                explanation: Some("Stockholm has been the capital since 1523.".to_string()),
                time_limit: 30,
                points: 2,
            },
            PackQuestion {
                question_text: "Oslo is the capital of Norway.".to_string(),
                question_type: QuestionType::TrueFalse,
                options: None,
                correct_answer: "true".to_string(),
                explanation: None,
                time_limit: 20,
                points: 1,
            },
        ],
    }
}

pub async fn harness() -> Harness {
    harness_with(fast_sync()).await
}

pub async fn harness_with(sync: SyncConfig) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
    let clock = Arc::new(ManualClock::new(start_time()));
    let shared: Arc<dyn SessionStore> = store.clone();

    let ctx = Arc::new(AppContext::new(
        shared,
        clock.clone(),
        Arc::new(FixedCodes::new([SESSION_CODE])),
        LifecycleConfig::default(),
        sync,
        TokenKeys::from_secret("test-secret"),
    ));
    let quiz = ctx
        .catalog
        .insert_pack(geography_pack())
        .await
        .expect("quiz pack is valid");

    Harness {
        ctx,
        store,
        clock,
        quiz,
    }
}

impl Harness {
    pub fn engine(&self) -> (ClientSyncEngine, UnboundedReceiver<ViewUpdate>) {
        ClientSyncEngine::new(self.ctx.store.clone(), self.ctx.clock.clone(), self.ctx.sync.clone())
    }

    pub async fn create_session(&self) -> String {
        let (_, session_id) = self
            .ctx
            .lifecycle
            .create_session(&self.quiz.id, "Ms. Berg")
            .await
            .expect("session created");
        session_id
    }
}

/// Waits for the first update matching `wanted`, skipping the rest.
pub async fn wait_for<F>(updates: &mut UnboundedReceiver<ViewUpdate>, mut wanted: F) -> ViewUpdate
where
    F: FnMut(&ViewUpdate) -> bool,
{
    let search = async {
        while let Some(update) = updates.next().await {
            if wanted(&update) {
                return update;
            }
        }
        panic!("update channel closed");
    };
    tokio::time::timeout(Duration::from_secs(3), search)
        .await
        .expect("timed out waiting for a view update")
}

/// Drains whatever is queued right now.
pub fn drain(updates: &mut UnboundedReceiver<ViewUpdate>) -> Vec<ViewUpdate> {
    let mut drained = Vec::new();
    while let Ok(Some(update)) = updates.try_next() {
        drained.push(update);
    }
    drained
}
