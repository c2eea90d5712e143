use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_channel::{
    mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    oneshot,
};
use futures_timer::Delay;
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use super::{
    feed::{supervise, FeedMode, FeedPlan, FeedStatus},
    source::{ChangeSource, PollSource, PushSource},
    view::{ClientView, ViewSnapshot, ViewUpdate},
};
use crate::{
    clock::Clock,
    config::SyncConfig,
    error::{SessionError, StoreError},
    handlers::catalog::QuizCatalog,
    helpers::lock,
    models::{answer::Answer, events::SessionEvent, participant::Participant, session::Session},
    store::{
        schema::{fetch_many, fetch_one},
        Filter, SessionStore, Table,
    },
};

type SharedView = Arc<Mutex<Option<ClientView>>>;

struct Live {
    session_id: String,
    stops: Vec<oneshot::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Keeps one client's view of one session in step with the store.
///
/// [`initialize`](Self::initialize) reads the session, its roster and the
/// answers to the question on screen, then follows the `sessions`,
/// `participants` and `answers` feeds. Every change to the view goes out on
/// the update channel handed back by [`new`](Self::new).
pub struct ClientSyncEngine {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    catalog: QuizCatalog,
    updates: UnboundedSender<ViewUpdate>,
    view: SharedView,
    status: Arc<FeedStatus>,
    live: Option<Live>,
}

impl ClientSyncEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> (Self, UnboundedReceiver<ViewUpdate>) {
        let (updates, rx) = unbounded();
        let engine = ClientSyncEngine {
            catalog: QuizCatalog::new(store.clone(), clock.clone()),
            store,
            clock,
            config,
            updates,
            view: Arc::new(Mutex::new(None)),
            status: Arc::new(FeedStatus::default()),
            live: None,
        };
        (engine, rx)
    }

    /// Connects to `session_id`. Already connected to it: nothing happens.
    /// Connected elsewhere: that session is cleaned up first.
    pub async fn initialize(&mut self, session_id: &str) -> Result<(), SessionError> {
        if let Some(live) = &self.live {
            if live.session_id == session_id {
                debug!("Already following session {}", session_id);
                return Ok(());
            }
        }
        self.cleanup().await;

        // Subscribe before the first read so nothing written in between is lost.
        let push: Arc<dyn ChangeSource> = Arc::new(PushSource::new(self.store.clone()));
        let mut feeds = Vec::new();
        for (table, filter) in [
            (Table::Sessions, Filter::by_id(session_id)),
            (Table::Participants, Filter::new().eq("session_id", session_id)),
            (Table::Answers, Filter::new().eq("session_id", session_id)),
        ] {
            let first = push.open(table, filter.clone()).await;
            feeds.push((table, filter, first));
        }

        let (view, initial) = match self.load(session_id).await {
            Ok(loaded) => loaded,
            Err(error) => {
                for (_, _, first) in feeds {
                    if let Ok(stream) = first {
                        stream.close().await;
                    }
                }
                return Err(error);
            }
        };
        *lock(&self.view) = Some(view);
        for update in initial {
            let _ = self.updates.unbounded_send(update);
        }

        let (sink, events) = unbounded();
        let mut live = Live {
            session_id: session_id.to_string(),
            stops: Vec::new(),
            tasks: Vec::new(),
        };

        for (table, filter, first) in feeds {
            let poll: Arc<dyn ChangeSource> =
                Arc::new(PollSource::new(self.store.clone(), self.config.poll_interval(table)));
            let (stop, cancel) = oneshot::channel();
            let plan = FeedPlan {
                table,
                filter,
                resubscribe_attempts: self.config.resubscribe_attempts,
                resubscribe_delay: self.config.resubscribe_delay,
            };
            live.tasks.push(tokio::spawn(supervise(
                plan,
                first,
                push.clone(),
                poll,
                sink.clone(),
                self.status.clone(),
                cancel,
            )));
            live.stops.push(stop);
        }

        let (stop, cancel) = oneshot::channel();
        live.tasks.push(tokio::spawn(drive(
            self.store.clone(),
            self.view.clone(),
            self.clock.clone(),
            self.config.tick,
            events,
            self.updates.clone(),
            cancel,
        )));
        live.stops.push(stop);

        info!("Following session {}", session_id);
        self.live = Some(live);
        Ok(())
    }

    /// The session, its quiz, the connected roster and the answers to the
    /// question on screen, folded into a fresh view.
    async fn load(&self, session_id: &str) -> Result<(ClientView, Vec<ViewUpdate>), SessionError> {
        let session: Session = fetch_one(self.store.as_ref(), &Filter::by_id(session_id))
            .await
            .map_err(|error| match error {
                StoreError::NotFound { .. } => SessionError::SessionNotFound,
                other => SessionError::Store(other),
            })?;
        let quiz = self.catalog.fetch(&session.quiz_id).await?;
        let roster: Vec<Participant> = fetch_many(
            self.store.as_ref(),
            &Filter::new()
                .eq("session_id", session_id)
                .eq("is_connected", true),
            None,
        )
        .await?;
        let answers: Vec<Answer> = match session.cursor().and_then(|c| quiz.question(c.index)) {
            Some(question) => {
                fetch_many(
                    self.store.as_ref(),
                    &Filter::new()
                        .eq("session_id", session_id)
                        .eq("question_id", question.id.as_str()),
                    None,
                )
                .await?
            }
            None => Vec::new(),
        };

        Ok(ClientView::new(session, quiz, roster, answers, self.clock.now()))
    }

    /// Stops every feed and the countdown. Safe to call when not connected.
    pub async fn cleanup(&mut self) {
        let live = match self.live.take() {
            Some(live) => live,
            None => return,
        };

        for stop in live.stops {
            let _ = stop.send(());
        }
        for task in live.tasks {
            if let Err(error) = task.await {
                debug!("Sync task for {} ended badly: {}", live.session_id, error);
            }
        }
        *lock(&self.view) = None;
        info!("Stopped following session {}", live.session_id);
    }

    pub fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.live.as_ref().map(|live| live.session_id.as_str())
    }

    pub fn active_feeds(&self) -> Vec<(Table, FeedMode)> {
        self.status.snapshot()
    }

    pub fn view(&self) -> Option<ClientView> {
        lock(&self.view).clone()
    }

    pub fn snapshot(&self) -> Option<ViewSnapshot> {
        let now = self.clock.now();
        lock(&self.view).as_ref().map(|view| view.snapshot(now))
    }

    /// Seconds since the question on screen was pushed.
    pub fn time_taken(&self) -> Option<f64> {
        let now = self.clock.now();
        lock(&self.view).as_ref().and_then(|view| view.time_taken(now))
    }
}

impl Drop for ClientSyncEngine {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            for task in live.tasks {
                task.abort();
            }
        }
    }
}

enum Step {
    Event(SessionEvent),
    Tick,
}

/// Folds feed events and countdown ticks into the view. When the question on
/// screen changes its stored answers are read back in.
async fn drive(
    store: Arc<dyn SessionStore>,
    view: SharedView,
    clock: Arc<dyn Clock>,
    tick: Duration,
    mut events: UnboundedReceiver<SessionEvent>,
    updates: UnboundedSender<ViewUpdate>,
    mut cancel: oneshot::Receiver<()>,
) {
    let mut ticker = Delay::new(tick);

    loop {
        let step = tokio::select! {
            _ = &mut cancel => break,
            event = events.next() => match event {
                Some(event) => Step::Event(event),
                None => break,
            },
            _ = &mut ticker => {
                ticker.reset(tick);
                Step::Tick
            }
        };

        let mut produced = {
            let mut guard = lock(&view);
            match (guard.as_mut(), step) {
                (Some(view), Step::Event(event)) => view.apply(event, clock.now()),
                (Some(view), Step::Tick) => view.tick(clock.now()),
                (None, _) => Vec::new(),
            }
        };
        if produced
            .iter()
            .any(|update| matches!(update, ViewUpdate::QuestionChanged { .. }))
        {
            produced.extend(reload_answers(store.as_ref(), &view).await);
        }

        for update in produced {
            if updates.unbounded_send(update).is_err() {
                return;
            }
        }
    }
}

/// Reads the answers to the question on screen and merges them into the view.
async fn reload_answers(store: &dyn SessionStore, view: &SharedView) -> Vec<ViewUpdate> {
    let key = lock(view).as_ref().and_then(|view| {
        view.current_question()
            .map(|question| (view.session().id.clone(), question.id.clone()))
    });
    let (session_id, question_id) = match key {
        Some(key) => key,
        None => return Vec::new(),
    };

    let filter = Filter::new()
        .eq("session_id", session_id.as_str())
        .eq("question_id", question_id.as_str());
    let answers: Vec<Answer> = match fetch_many(store, &filter, None).await {
        Ok(answers) => answers,
        Err(error) => {
            warn!("Could not read answers to question {}: {}", question_id, error);
            return Vec::new();
        }
    };

    match lock(view).as_mut() {
        Some(view) => view.merge_answers(answers),
        None => Vec::new(),
    }
}
