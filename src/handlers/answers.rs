use std::{collections::HashMap, sync::Arc};

use log::{info, warn};
use serde_json::json;
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::{SessionError, StoreError},
    models::{
        answer::{Answer, AnswerEntry, ScoreEntry, Tally},
        participant::Participant,
        quiz::{Question, Quiz},
    },
    store::{
        schema::{fetch_many, insert_row, patch},
        Filter, SessionStore, Table,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Recorded(Answer),
    /// The participant had already answered; their answer was overwritten.
    Replaced(Answer),
    /// A blank was not written because the participant had already answered.
    Kept(Answer),
    /// The write failed and was logged. The student is not told.
    Dropped,
}

pub struct AnswerCollector {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl AnswerCollector {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        AnswerCollector { store, clock }
    }

    /// Records a student's answer. Never fails: a store error is logged and the
    /// quiz carries on as if the answer went through.
    pub async fn submit(
        &self,
        session_id: &str,
        participant_id: &str,
        question_id: &str,
        answer: &str,
        time_taken: f64,
    ) -> SubmitOutcome {
        match self
            .try_submit(session_id, participant_id, question_id, answer, time_taken)
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    "Dropping answer from {} to question {}: {}",
                    participant_id, question_id, error
                );
                SubmitOutcome::Dropped
            }
        }
    }

    /// Keeps at most one answer per participant and question; a second
    /// submission overwrites the first.
    pub async fn try_submit(
        &self,
        session_id: &str,
        participant_id: &str,
        question_id: &str,
        answer: &str,
        time_taken: f64,
    ) -> Result<SubmitOutcome, SessionError> {
        let key = answer_key(session_id, participant_id, question_id);
        let mut answer = self.draft(session_id, participant_id, question_id, answer, time_taken);

        if let Some(previous) = self.existing(&key).await? {
            answer.id = previous.id;
            return self.overwrite(&key, answer).await;
        }

        match insert_row(self.store.as_ref(), &answer).await {
            Ok(answer) => {
                info!("Answer recorded from {} for question {}", participant_id, question_id);
                Ok(SubmitOutcome::Recorded(answer))
            }
            // Lost a race with another submission for the same key.
            Err(StoreError::Conflict { .. }) => {
                if let Some(previous) = self.existing(&key).await? {
                    answer.id = previous.id;
                }
                self.overwrite(&key, answer).await
            }
            Err(error) => Err(SessionError::AnswerWriteFailed(error)),
        }
    }

    /// Records an empty answer for a student whose time ran out. Like
    /// [`submit`](Self::submit) it never fails.
    pub async fn submit_blank(
        &self,
        session_id: &str,
        participant_id: &str,
        question_id: &str,
        time_taken: f64,
    ) -> SubmitOutcome {
        match self
            .try_submit_blank(session_id, participant_id, question_id, time_taken)
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    "Dropping blank answer from {} to question {}: {}",
                    participant_id, question_id, error
                );
                SubmitOutcome::Dropped
            }
        }
    }

    /// Insert only: an answer already stored for the key is never replaced by a blank.
    pub async fn try_submit_blank(
        &self,
        session_id: &str,
        participant_id: &str,
        question_id: &str,
        time_taken: f64,
    ) -> Result<SubmitOutcome, SessionError> {
        let key = answer_key(session_id, participant_id, question_id);
        if let Some(previous) = self.existing(&key).await? {
            return Ok(SubmitOutcome::Kept(previous));
        }

        let blank = self.draft(session_id, participant_id, question_id, "", time_taken);
        match insert_row(self.store.as_ref(), &blank).await {
            Ok(blank) => {
                info!("Blank answer recorded from {} for question {}", participant_id, question_id);
                Ok(SubmitOutcome::Recorded(blank))
            }
            Err(conflict @ StoreError::Conflict { .. }) => match self.existing(&key).await? {
                Some(previous) => Ok(SubmitOutcome::Kept(previous)),
                None => Err(SessionError::AnswerWriteFailed(conflict)),
            },
            Err(error) => Err(SessionError::AnswerWriteFailed(error)),
        }
    }

    fn draft(
        &self,
        session_id: &str,
        participant_id: &str,
        question_id: &str,
        answer: &str,
        time_taken: f64,
    ) -> Answer {
        Answer {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            participant_id: participant_id.to_string(),
            question_id: question_id.to_string(),
            answer: answer.trim().to_string(),
            answered_at: self.clock.now(),
            time_taken: time_taken.max(0.0),
        }
    }

    async fn existing(&self, key: &Filter) -> Result<Option<Answer>, SessionError> {
        let existing: Vec<Answer> = fetch_many(self.store.as_ref(), key, None)
            .await
            .map_err(SessionError::AnswerWriteFailed)?;
        Ok(existing.into_iter().next())
    }

    async fn overwrite(&self, key: &Filter, answer: Answer) -> Result<SubmitOutcome, SessionError> {
        self.store
            .update(
                Table::Answers,
                key,
                patch([
                    ("answer", json!(answer.answer)),
                    ("answered_at", json!(answer.answered_at)),
                    ("time_taken", json!(answer.time_taken)),
                ]),
            )
            .await
            .map_err(SessionError::AnswerWriteFailed)?;

        info!(
            "Answer replaced from {} for question {}",
            answer.participant_id, answer.question_id
        );
        Ok(SubmitOutcome::Replaced(answer))
    }

    pub async fn answers(&self, session_id: &str, question_id: &str) -> Result<Vec<Answer>, SessionError> {
        Ok(fetch_many(
            self.store.as_ref(),
            &Filter::new()
                .eq("session_id", session_id)
                .eq("question_id", question_id),
            None,
        )
        .await?)
    }

    /// Answers to one question with the name of whoever gave them.
    pub async fn answers_for(&self, session_id: &str, question_id: &str) -> Result<Vec<AnswerEntry>, SessionError> {
        let answers = self.answers(session_id, question_id).await?;
        let names = self.participant_names(session_id).await?;

        Ok(answers
            .into_iter()
            .map(|answer| AnswerEntry {
                participant_name: names
                    .get(&answer.participant_id)
                    .cloned()
                    .unwrap_or_else(|| "Unknown".to_string()),
                answer,
            })
            .collect())
    }

    /// Counts and rates for `question`, against the connected roster.
    pub async fn tally(&self, session_id: &str, question: &Question) -> Result<Tally, SessionError> {
        let answers = self.answers(session_id, &question.id).await?;
        let roster: Vec<Participant> = fetch_many(
            self.store.as_ref(),
            &Filter::new()
                .eq("session_id", session_id)
                .eq("is_connected", true),
            None,
        )
        .await?;

        Ok(Tally::compute(&answers, question, roster.len()))
    }

    /// Points per participant over the whole quiz, best first. Includes
    /// participants who left.
    pub async fn scoreboard(&self, session_id: &str, quiz: &Quiz) -> Result<Vec<ScoreEntry>, SessionError> {
        let mut participants: Vec<Participant> =
            fetch_many(self.store.as_ref(), &Filter::new().eq("session_id", session_id), None).await?;
        participants.sort_by_key(|participant| participant.joined_at);
        let answers: Vec<Answer> =
            fetch_many(self.store.as_ref(), &Filter::new().eq("session_id", session_id), None).await?;

        let mut scores: Vec<ScoreEntry> = participants
            .into_iter()
            .map(|participant| ScoreEntry {
                participant_id: participant.id,
                participant_name: participant.participant_name,
                score: 0,
                correct_answers: 0,
            })
            .collect();

        for answer in &answers {
            let question = match quiz.question_by_id(&answer.question_id) {
                Some(question) if question.is_correct(&answer.answer) => question,
                _ => continue,
            };
            if let Some(entry) = scores
                .iter_mut()
                .find(|entry| entry.participant_id == answer.participant_id)
            {
                entry.score += question.points;
                entry.correct_answers += 1;
            }
        }

        // Stable, so ties keep join order.
        scores.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(scores)
    }

    async fn participant_names(&self, session_id: &str) -> Result<HashMap<String, String>, SessionError> {
        let participants: Vec<Participant> =
            fetch_many(self.store.as_ref(), &Filter::new().eq("session_id", session_id), None).await?;
        Ok(participants
            .into_iter()
            .map(|participant| (participant.id, participant.participant_name))
            .collect())
    }
}

fn answer_key(session_id: &str, participant_id: &str, question_id: &str) -> Filter {
    Filter::new()
        .eq("session_id", session_id)
        .eq("participant_id", participant_id)
        .eq("question_id", question_id)
}
