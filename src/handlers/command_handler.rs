use log::{info, warn};

use super::connection_handler::Connection;
use crate::{
    error::SessionError,
    jwtoken::{Claims, Role},
    models::{
        communication::{AuthorizedCommand, CommandTokenPair, Response, UnauthorizedCommand},
        quiz::Quiz,
    },
    server_messages::send_error,
};

pub async fn execute_unauthorized_command(command: UnauthorizedCommand, connection: &mut Connection) {
    let result = match command {
        UnauthorizedCommand::CreateSession { quiz_id, teacher_name } => {
            info!("Create session request from: {}", connection.id);
            create_session(connection, &quiz_id, &teacher_name).await
        }
        UnauthorizedCommand::JoinSession { session_code, name } => {
            info!("Join session request from: {}", connection.id);
            join_session(connection, &session_code, &name).await
        }
    };

    if let Err(error) = result {
        send_error(&error, &connection.tx, &connection.id);
    }
}

pub async fn execute_authorized_command(pair: CommandTokenPair, connection: &mut Connection) {
    let result = match authorize(connection, &pair.token).await {
        Ok(()) => execute(pair.command, connection).await,
        Err(error) => Err(error),
    };

    if let Err(error) = result {
        send_error(&error, &connection.tx, &connection.id);
    }
}

async fn create_session(connection: &mut Connection, quiz_id: &str, teacher_name: &str) -> Result<(), SessionError> {
    let teacher_name = teacher_name.trim();
    if teacher_name.is_empty() {
        return Err(SessionError::InvalidName);
    }
    let quiz = connection.ctx.catalog.fetch(quiz_id).await?;
    if quiz.is_empty() {
        return Err(SessionError::InvalidQuiz("quiz has no questions".to_string()));
    }

    let (session_code, session_id) = connection.ctx.lifecycle.create_session(&quiz.id, teacher_name).await?;
    let session = connection.ctx.lifecycle.fetch(&session_id).await?;
    let claims = Claims::teacher(&session, connection.ctx.clock.now())?;
    let token = connection.ctx.tokens.generate_token(&claims)?;

    connection.attach(claims).await?;
    connection.send(&Response::SessionCreated {
        token,
        session_code,
        session_id,
    });
    info!("Successful session creation for: {}", connection.id);
    Ok(())
}

async fn join_session(connection: &mut Connection, session_code: &str, name: &str) -> Result<(), SessionError> {
    let participant = connection.ctx.registry.join(session_code, name).await?;
    let claims = Claims::student(&participant, connection.ctx.clock.now())?;
    let token = connection.ctx.tokens.generate_token(&claims)?;

    connection.attach(claims).await?;
    connection.send(&Response::Joined { token, participant });
    info!("Successful session join for: {}", connection.id);
    Ok(())
}

/// Binds the token's identity to the connection. A student presenting a token
/// on a fresh connection is reconnected to their session.
async fn authorize(connection: &mut Connection, token: &str) -> Result<(), SessionError> {
    let now = connection.ctx.clock.now();
    let claims = connection.ctx.tokens.decode_token(token, now)?.claims;
    if connection.claims.as_ref() == Some(&claims) {
        return Ok(());
    }

    if claims.role == Role::Student {
        connection.ctx.registry.reconnect(&claims.sub).await?;
    }
    info!("Connection {} resumed as {} ({:?})", connection.id, claims.name, claims.role);
    connection.attach(claims).await
}

async fn execute(command: AuthorizedCommand, connection: &mut Connection) -> Result<(), SessionError> {
    match command {
        AuthorizedCommand::StartSession {} => {
            let session_id = connection.require(Role::Teacher)?.session_id.clone();
            if connection.ctx.registry.list_connected(&session_id).await?.is_empty() {
                return Err(SessionError::NotAllowed("Wait until at least one student has joined"));
            }
            connection.ctx.lifecycle.advance_to_started(&session_id).await?;
        }
        AuthorizedCommand::NextQuestion {} => {
            let session_id = connection.require(Role::Teacher)?.session_id.clone();
            let quiz = quiz(connection).await?;
            connection.ctx.cursor.advance(&session_id, &quiz).await?;
        }
        AuthorizedCommand::PreviousQuestion {} => {
            let session_id = connection.require(Role::Teacher)?.session_id.clone();
            connection.ctx.cursor.retreat(&session_id).await?;
        }
        AuthorizedCommand::EndSession {} => {
            let session_id = connection.require(Role::Teacher)?.session_id.clone();
            connection.ctx.lifecycle.end_session(&session_id).await?;
        }
        AuthorizedCommand::GetTally {} => {
            let session_id = connection.require(Role::Teacher)?.session_id.clone();
            let view = connection.view()?;
            let question = view
                .current_question()
                .ok_or(SessionError::NotAllowed("No question is showing"))?;

            let tally = connection.ctx.answers.tally(&session_id, question).await?;
            let answers = connection.ctx.answers.answers_for(&session_id, &question.id).await?;
            connection.send(&Response::Tally {
                options: tally.option_counts(question),
                correct_answer: question.correct_answer.clone(),
                tally,
                answers: Some(answers),
            });
        }
        AuthorizedCommand::GetScoreboard {} => {
            let session_id = session_id(connection)?;
            let quiz = quiz(connection).await?;
            let scores = connection.ctx.answers.scoreboard(&session_id, &quiz).await?;
            connection.send(&Response::Scoreboard { scores });
        }
        AuthorizedCommand::SubmitAnswer { answer } => {
            let claims = connection.require(Role::Student)?.clone();
            submit_answer(connection, &claims, answer.trim()).await?;
        }
        AuthorizedCommand::LeaveSession {} => {
            info!("Leave request from: {}", connection.id);
            connection.detach().await;
            connection.send(&Response::Left {});
        }
        AuthorizedCommand::Heartbeat {} => {
            info!("Heartbeat from: {}", connection.id);
            if let Some(claims) = connection.claims.clone().filter(|c| c.role == Role::Student) {
                if let Err(error) = connection.ctx.registry.reconnect(&claims.sub).await {
                    warn!("Presence refresh for {} failed: {}", claims.sub, error);
                }
            }
        }
        AuthorizedCommand::GetView {} => {
            let view = connection.view()?.snapshot(connection.ctx.clock.now());
            connection.send(&Response::View { view });
        }
    }
    Ok(())
}

async fn submit_answer(connection: &mut Connection, claims: &Claims, answer: &str) -> Result<(), SessionError> {
    let view = connection.view()?;
    let question = view
        .current_question()
        .ok_or(SessionError::NotAllowed("No question is showing"))?;
    if view.remaining(connection.ctx.clock.now()) == Some(0) {
        return Err(SessionError::NotAllowed("Time is up for this question"));
    }
    if !answer.is_empty() && !question.choices().iter().any(|choice| choice == answer) {
        return Err(SessionError::NotAllowed("That is not one of the choices"));
    }

    let time_taken = connection.engine.time_taken().unwrap_or(0.0);
    connection
        .ctx
        .answers
        .submit(&claims.session_id, &claims.sub, &question.id, answer, time_taken)
        .await;
    connection.answered = Some(Connection::current_push(&view));

    connection.send(&Response::AnswerAccepted {
        explanation: question.explanation.clone(),
    });
    Ok(())
}

fn session_id(connection: &Connection) -> Result<String, SessionError> {
    connection
        .claims
        .as_ref()
        .map(|claims| claims.session_id.clone())
        .ok_or(SessionError::NotAllowed("Join a session first"))
}

/// The quiz the session runs, from the local view when there is one.
async fn quiz(connection: &Connection) -> Result<Quiz, SessionError> {
    if let Some(view) = connection.engine.view() {
        return Ok(view.quiz().clone());
    }
    let session = connection.ctx.lifecycle.fetch(&session_id(connection)?).await?;
    connection.ctx.catalog.fetch(&session.quiz_id).await
}
