use chrono::{DateTime, Utc};
use serde::Serialize;

use super::countdown::{elapsed_secs, Countdown, Tick};
use crate::models::{
    answer::{Answer, Tally},
    events::SessionEvent,
    participant::Participant,
    quiz::{Question, QuestionPrompt, Quiz},
    session::{Session, SessionState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Lobby,
    /// Started, or pointed past the last question.
    AwaitingQuestion,
    Question,
    Ended,
}

/// What changed on screen after an event or a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    PhaseChanged(Phase),
    QuestionChanged { index: usize, remaining: Option<u32> },
    Tick { remaining: u32 },
    TimeUp { question_index: usize },
    RosterChanged(Vec<Participant>),
    TallyChanged(Tally),
    Ended(Session),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub session: Session,
    pub phase: Phase,
    pub quiz_title: String,
    pub question_count: usize,
    pub question: Option<QuestionPrompt>,
    pub remaining: Option<u32>,
    pub roster: Vec<Participant>,
    pub tally: Option<Tally>,
}

/// One client's picture of a session, built from the initial read and kept
/// current by folding in [`SessionEvent`]s. Folding the same event twice
/// leaves the view as it was.
#[derive(Debug, Clone)]
pub struct ClientView {
    session: Session,
    quiz: Quiz,
    roster: Vec<Participant>,
    answers: Vec<Answer>,
    countdown: Option<Countdown>,
}

impl ClientView {
    pub fn new(
        session: Session,
        quiz: Quiz,
        roster: Vec<Participant>,
        answers: Vec<Answer>,
        now: DateTime<Utc>,
    ) -> (Self, Vec<ViewUpdate>) {
        let mut view = ClientView {
            session,
            quiz,
            roster: Vec::new(),
            answers: Vec::new(),
            countdown: None,
        };
        for participant in roster.into_iter().filter(|p| p.is_connected) {
            view.merge_participant(participant);
        }

        let mut updates = vec![ViewUpdate::PhaseChanged(view.phase())];
        if view.session.is_ended() {
            updates.push(ViewUpdate::Ended(view.session.clone()));
        } else if let Some(update) = view.restart_countdown(now) {
            updates.push(update);
        }
        for answer in answers {
            view.merge_answer(answer);
        }

        updates.push(ViewUpdate::RosterChanged(view.roster.clone()));
        if let Some(tally) = view.tally() {
            updates.push(ViewUpdate::TallyChanged(tally));
        }
        (view, updates)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    /// Answers to the question on screen.
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    pub fn phase(&self) -> Phase {
        match self.session.session_state {
            SessionState::Waiting => Phase::Lobby,
            SessionState::Started => Phase::AwaitingQuestion,
            SessionState::Ended => Phase::Ended,
            SessionState::Active if self.current_question().is_some() => Phase::Question,
            SessionState::Active => Phase::AwaitingQuestion,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.session
            .cursor()
            .and_then(|cursor| self.quiz.question(cursor.index))
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<u32> {
        self.countdown.as_ref().map(|countdown| countdown.remaining(now))
    }

    /// Seconds spent on the question on screen so far.
    pub fn time_taken(&self, now: DateTime<Utc>) -> Option<f64> {
        self.countdown
            .as_ref()
            .map(|countdown| elapsed_secs(countdown.started_at, countdown.time_limit, now))
    }

    pub fn tally(&self) -> Option<Tally> {
        self.current_question()
            .map(|question| Tally::compute(&self.answers, question, self.roster.len()))
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> ViewSnapshot {
        ViewSnapshot {
            session: self.session.clone(),
            phase: self.phase(),
            quiz_title: self.quiz.title.clone(),
            question_count: self.quiz.len(),
            question: self.current_question().map(QuestionPrompt::from),
            remaining: self.remaining(now),
            roster: self.roster.clone(),
            tally: self.tally(),
        }
    }

    pub fn apply(&mut self, event: SessionEvent, now: DateTime<Utc>) -> Vec<ViewUpdate> {
        match event {
            SessionEvent::SessionCreated(session)
            | SessionEvent::SessionStarted(session)
            | SessionEvent::QuestionPushed(session)
            | SessionEvent::SessionEnded(session) => self.apply_session(session, now),
            SessionEvent::ParticipantJoined(participant) => {
                if participant.session_id != self.session.id || !self.merge_participant(participant) {
                    return Vec::new();
                }
                self.roster_updates()
            }
            SessionEvent::ParticipantLeft { participant_id } => {
                let before = self.roster.len();
                self.roster.retain(|participant| participant.id != participant_id);
                if self.roster.len() == before {
                    return Vec::new();
                }
                self.roster_updates()
            }
            SessionEvent::AnswerRecorded(answer) => {
                if answer.session_id != self.session.id || !self.merge_answer(answer) {
                    return Vec::new();
                }
                self.tally().map(ViewUpdate::TallyChanged).into_iter().collect()
            }
        }
    }

    /// Folds in answers read back from the store for the question on screen.
    pub fn merge_answers(&mut self, answers: Vec<Answer>) -> Vec<ViewUpdate> {
        let mut changed = false;
        let session_id = self.session.id.clone();
        for answer in answers.into_iter().filter(|answer| answer.session_id == session_id) {
            changed |= self.merge_answer(answer);
        }
        if !changed {
            return Vec::new();
        }
        self.tally().map(ViewUpdate::TallyChanged).into_iter().collect()
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<ViewUpdate> {
        let countdown = match self.countdown.as_mut() {
            Some(countdown) => countdown,
            None => return Vec::new(),
        };

        match countdown.tick(now) {
            Tick::Running(remaining) => vec![ViewUpdate::Tick { remaining }],
            Tick::TimeUp => vec![
                ViewUpdate::Tick { remaining: 0 },
                ViewUpdate::TimeUp {
                    question_index: countdown.question_index,
                },
            ],
            Tick::Expired => Vec::new(),
        }
    }

    fn apply_session(&mut self, session: Session, now: DateTime<Utc>) -> Vec<ViewUpdate> {
        if session.id != self.session.id || session == self.session {
            return Vec::new();
        }
        // Ended is terminal; a late row from before the end changes nothing.
        if self.session.is_ended() {
            return Vec::new();
        }

        let phase = self.phase();
        self.session = session;
        let mut updates = Vec::new();
        if self.phase() != phase {
            updates.push(ViewUpdate::PhaseChanged(self.phase()));
        }

        if self.session.is_ended() {
            self.countdown = None;
            updates.push(ViewUpdate::Ended(self.session.clone()));
        } else if let Some(update) = self.restart_countdown(now) {
            updates.push(update);
        }
        updates
    }

    /// Starts a countdown when the cursor moved. Returns `None` when it did not.
    fn restart_countdown(&mut self, now: DateTime<Utc>) -> Option<ViewUpdate> {
        let cursor = match self.session.cursor() {
            Some(cursor) => cursor,
            None => {
                self.countdown = None;
                return None;
            }
        };
        if let Some(countdown) = &self.countdown {
            if countdown.is_for(cursor.index, cursor.started_at) {
                return None;
            }
        }

        let question_id = self.current_question().map(|question| question.id.clone());
        self.answers
            .retain(|answer| Some(&answer.question_id) == question_id.as_ref());

        self.countdown = self
            .quiz
            .question(cursor.index)
            .map(|question| Countdown::new(cursor.index, cursor.started_at, question.time_limit));
        Some(ViewUpdate::QuestionChanged {
            index: cursor.index,
            remaining: self.remaining(now),
        })
    }

    /// Adds or refreshes a roster entry. Returns whether the roster changed.
    fn merge_participant(&mut self, participant: Participant) -> bool {
        if !participant.is_connected {
            let before = self.roster.len();
            self.roster.retain(|existing| existing.id != participant.id);
            return self.roster.len() != before;
        }

        match self.roster.iter_mut().find(|existing| existing.id == participant.id) {
            Some(existing) if *existing == participant => false,
            Some(existing) => {
                *existing = participant;
                true
            }
            None => {
                self.roster.push(participant);
                self.roster.sort_by_key(|participant| participant.joined_at);
                true
            }
        }
    }

    /// Keeps the answer if it is for the question on screen. Returns whether
    /// the answers changed.
    fn merge_answer(&mut self, answer: Answer) -> bool {
        let current = match self.current_question() {
            Some(question) => question.id.clone(),
            None => return false,
        };
        if answer.question_id != current {
            return false;
        }

        match self
            .answers
            .iter_mut()
            .find(|existing| existing.participant_id == answer.participant_id)
        {
            Some(existing) if *existing == answer || answer.answered_at < existing.answered_at => false,
            Some(existing) => {
                *existing = answer;
                true
            }
            None => {
                self.answers.push(answer);
                true
            }
        }
    }

    fn roster_updates(&self) -> Vec<ViewUpdate> {
        let mut updates = vec![ViewUpdate::RosterChanged(self.roster.clone())];
        if let Some(tally) = self.tally() {
            updates.push(ViewUpdate::TallyChanged(tally));
        }
        updates
    }
}
