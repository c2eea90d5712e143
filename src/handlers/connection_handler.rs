use std::{net::SocketAddr, sync::Arc};

use chrono::{DateTime, Utc};
use futures_channel::mpsc::unbounded;
use futures_util::{pin_mut, StreamExt};
use log::{info, warn};
use tokio::net::TcpStream;
use tungstenite::Message;
use uuid::Uuid;

use super::{
    command_handler::{execute_authorized_command, execute_unauthorized_command},
    AppContext,
};
use crate::{
    error::SessionError,
    helpers::parse_command,
    jwtoken::{Claims, Role},
    models::{
        communication::{Command, Response},
        quiz::QuestionPrompt,
    },
    server_messages::{send_message, Tx},
    sync::{ClientSyncEngine, ClientView, ViewUpdate},
};

/// One websocket client: a teacher or a student following one session.
pub struct Connection {
    pub(crate) id: String,
    pub(crate) ctx: Arc<AppContext>,
    pub(crate) tx: Tx,
    pub(crate) engine: ClientSyncEngine,
    pub(crate) claims: Option<Claims>,
    /// The push (index, start stamp) this student already answered.
    pub(crate) answered: Option<(usize, Option<DateTime<Utc>>)>,
}

impl Connection {
    pub fn new(id: String, ctx: Arc<AppContext>, tx: Tx, engine: ClientSyncEngine) -> Self {
        Connection {
            id,
            ctx,
            tx,
            engine,
            claims: None,
            answered: None,
        }
    }

    pub(crate) fn send(&self, response: &Response) {
        send_message(response, &self.tx, &self.id);
    }

    /// Starts following the session `claims` belong to.
    pub(crate) async fn attach(&mut self, claims: Claims) -> Result<(), SessionError> {
        if let Some(previous) = self.claims.take() {
            if previous.sub != claims.sub {
                self.release_presence(&previous).await;
            }
        }
        self.engine.initialize(&claims.session_id).await?;
        self.answered = None;
        self.claims = Some(claims);
        Ok(())
    }

    pub(crate) async fn detach(&mut self) {
        if let Some(claims) = self.claims.take() {
            self.release_presence(&claims).await;
        }
        self.engine.cleanup().await;
        self.answered = None;
    }

    pub(crate) fn require(&self, role: Role) -> Result<&Claims, SessionError> {
        match &self.claims {
            Some(claims) if claims.role == role => Ok(claims),
            Some(_) if role == Role::Teacher => Err(SessionError::NotAllowed("Only the teacher can do that")),
            Some(_) => Err(SessionError::NotAllowed("Only students can do that")),
            None => Err(SessionError::NotAllowed("Join a session first")),
        }
    }

    pub(crate) fn view(&self) -> Result<ClientView, SessionError> {
        self.engine
            .view()
            .ok_or(SessionError::NotAllowed("Join a session first"))
    }

    /// Key of the question push on screen.
    pub(crate) fn current_push(view: &ClientView) -> (usize, Option<DateTime<Utc>>) {
        let session = view.session();
        (session.current_question_index, session.current_question_started_at)
    }

    /// Marks a student as gone. Failures are logged only.
    async fn release_presence(&self, claims: &Claims) {
        if claims.role != Role::Student {
            return;
        }
        if let Err(error) = self.ctx.registry.leave(&claims.sub).await {
            warn!("Could not mark {} as left: {}", claims.sub, error);
        }
    }
}

pub async fn handle_connection(ctx: Arc<AppContext>, raw_stream: TcpStream, addr: SocketAddr) {
    info!("Incoming TCP connection from: {}", &addr);

    let ws_stream = match tokio_tungstenite::accept_async(raw_stream).await {
        Ok(stream) => stream,
        Err(error) => {
            warn!("Handshake with {} error: {}", addr, error);
            return;
        }
    };
    info!("WebSocket connection established: {}", &addr);

    let (tx, rx) = unbounded();
    let (engine, mut updates) = ClientSyncEngine::new(ctx.store.clone(), ctx.clock.clone(), ctx.sync.clone());
    let mut connection = Connection::new(Uuid::new_v4().to_string(), ctx, tx, engine);

    let (outgoing, mut incoming) = ws_stream.split();
    let receive_from_others = rx.map(Ok).forward(outgoing);
    pin_mut!(receive_from_others);

    loop {
        tokio::select! {
            message = incoming.next() => match message {
                Some(Ok(message)) if message.is_close() => break,
                Some(Ok(message)) if message.is_text() => handle_message(&mut connection, &message).await,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!("Connection {} error: {}", addr, error);
                    break;
                }
                None => break,
            },
            Some(update) = updates.next() => forward_update(&mut connection, update).await,
            _ = &mut receive_from_others => break,
        }
    }

    info!("{} disconnected", &addr);
    connection.detach().await;
}

pub async fn handle_message(connection: &mut Connection, message: &Message) {
    match parse_command(message) {
        Ok(Command::UnauthorizedCommand(command)) => execute_unauthorized_command(command, connection).await,
        Ok(Command::CommandTokenPair(command)) => execute_authorized_command(command, connection).await,
        Err(error) => {
            warn!("Error parsing command from {}: {}", connection.id, error);
            connection.send(&Response::ErrorResponse {
                error_text: error.to_string(),
            });
        }
    }
}

/// Turns a change in the local view into a message for this client.
pub async fn forward_update(connection: &mut Connection, update: ViewUpdate) {
    let role = connection.claims.as_ref().map(|claims| claims.role);

    match update {
        ViewUpdate::PhaseChanged(_) => {
            if let Some(view) = connection.engine.snapshot() {
                connection.send(&Response::View { view });
            }
        }
        ViewUpdate::QuestionChanged { index, remaining } => {
            let question = connection
                .engine
                .view()
                .and_then(|view| view.current_question().map(QuestionPrompt::from));
            connection.send(&Response::QuestionChanged {
                index,
                question,
                remaining,
            });
        }
        ViewUpdate::Tick { remaining } => connection.send(&Response::Timer { remaining }),
        ViewUpdate::TimeUp { question_index } => {
            connection.send(&Response::TimeUp { question_index });
            if role == Some(Role::Student) {
                submit_blank(connection).await;
            }
        }
        ViewUpdate::RosterChanged(participants) => connection.send(&Response::Roster { participants }),
        ViewUpdate::TallyChanged(tally) => {
            if role != Some(Role::Teacher) {
                return;
            }
            if let Some(question) = connection.engine.view().and_then(|view| view.current_question().cloned()) {
                connection.send(&Response::Tally {
                    options: tally.option_counts(&question),
                    correct_answer: question.correct_answer,
                    tally,
                    answers: None,
                });
            }
        }
        ViewUpdate::Ended(session) => {
            connection.send(&Response::SessionEnded {
                session: session.clone(),
            });
            if let Some(view) = connection.engine.view() {
                match connection.ctx.answers.scoreboard(&session.id, view.quiz()).await {
                    Ok(scores) => connection.send(&Response::Scoreboard { scores }),
                    Err(error) => warn!("No scoreboard for session {}: {}", session.id, error),
                }
            }
        }
    }
}

/// A student who let the time run out answered nothing, unless an answer is
/// already stored for the question.
async fn submit_blank(connection: &mut Connection) {
    let (claims, view) = match (connection.claims.clone(), connection.engine.view()) {
        (Some(claims), Some(view)) => (claims, view),
        _ => return,
    };
    let question = match view.current_question() {
        Some(question) => question,
        None => return,
    };
    let push = Connection::current_push(&view);
    if connection.answered == Some(push) {
        return;
    }

    connection
        .ctx
        .answers
        .submit_blank(
            &claims.session_id,
            &claims.sub,
            &question.id,
            f64::from(question.time_limit),
        )
        .await;
    connection.answered = Some(push);
}
