pub mod answers;
pub mod catalog;
pub mod code_generator;
pub mod command_handler;
pub mod connection_handler;
pub mod cursor;
pub mod lifecycle;
pub mod registry;

use std::sync::Arc;

use crate::{
    clock::Clock,
    config::{LifecycleConfig, SyncConfig},
    jwtoken::TokenKeys,
    store::SessionStore,
};
use answers::AnswerCollector;
use catalog::QuizCatalog;
use code_generator::{CodeSource, SessionCodeGenerator};
use cursor::QuestionCursor;
use lifecycle::SessionLifecycle;
use registry::ParticipantRegistry;

/// Everything a connection needs, built once by the binary and shared.
pub struct AppContext {
    pub store: Arc<dyn SessionStore>,
    pub clock: Arc<dyn Clock>,
    pub lifecycle: Arc<SessionLifecycle>,
    pub registry: ParticipantRegistry,
    pub cursor: QuestionCursor,
    pub answers: AnswerCollector,
    pub catalog: QuizCatalog,
    pub tokens: TokenKeys,
    pub sync: SyncConfig,
}

impl AppContext {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeSource>,
        lifecycle: LifecycleConfig,
        sync: SyncConfig,
        tokens: TokenKeys,
    ) -> Self {
        let generator = SessionCodeGenerator::new(store.clone(), codes, lifecycle.code_attempts);
        let lifecycle = Arc::new(SessionLifecycle::new(store.clone(), clock.clone(), generator));

        AppContext {
            registry: ParticipantRegistry::new(store.clone(), clock.clone(), lifecycle.clone()),
            cursor: QuestionCursor::new(lifecycle.clone()),
            answers: AnswerCollector::new(store.clone(), clock.clone()),
            catalog: QuizCatalog::new(store.clone(), clock.clone()),
            lifecycle,
            store,
            clock,
            tokens,
            sync,
        }
    }
}
