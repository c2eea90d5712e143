use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::quiz::Question;
use crate::store::{Table, TableRow};

/// One participant's answer to one question. An empty `answer` means the
/// question timed out without a choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: String,
    pub session_id: String,
    pub participant_id: String,
    pub question_id: String,
    pub answer: String,
    pub answered_at: DateTime<Utc>,
    pub time_taken: f64,
}

impl TableRow for Answer {
    const TABLE: Table = Table::Answers;
}

impl Answer {
    pub fn is_blank(&self) -> bool {
        self.answer.is_empty()
    }
}

/// An answer joined with the display name of whoever gave it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerEntry {
    #[serde(flatten)]
    pub answer: Answer,
    pub participant_name: String,
}

/// Live statistics for one question. Rates are percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tally {
    pub counts: BTreeMap<String, u32>,
    pub total_answers: usize,
    pub blank_answers: usize,
    pub total_participants: usize,
    pub correct_answers: usize,
    pub response_rate: f64,
    pub correct_rate: f64,
    pub average_time: f64,
}

impl Tally {
    pub fn compute(answers: &[Answer], question: &Question, roster_size: usize) -> Self {
        let mut tally = Tally {
            total_participants: roster_size,
            ..Tally::default()
        };
        let mut time_sum = 0.0;

        for answer in answers.iter().filter(|answer| answer.question_id == question.id) {
            if answer.is_blank() {
                tally.blank_answers += 1;
                continue;
            }
            *tally.counts.entry(answer.answer.clone()).or_insert(0) += 1;
            tally.total_answers += 1;
            time_sum += answer.time_taken;
            if question.is_correct(&answer.answer) {
                tally.correct_answers += 1;
            }
        }

        if roster_size > 0 {
            tally.response_rate = (tally.total_answers as f64 / roster_size as f64 * 100.0).min(100.0);
        }
        if tally.total_answers > 0 {
            tally.correct_rate = tally.correct_answers as f64 / tally.total_answers as f64 * 100.0;
            tally.average_time = time_sum / tally.total_answers as f64;
        }

        tally
    }

    /// Every choice of `question` with its count, zero included, in display order.
    pub fn option_counts(&self, question: &Question) -> Vec<(String, u32)> {
        question
            .choices()
            .into_iter()
            .map(|choice| {
                let count = self.counts.get(&choice).copied().unwrap_or(0);
                (choice, count)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreEntry {
    pub participant_id: String,
    pub participant_name: String,
    pub score: u32,
    pub correct_answers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::QuestionType;

    fn question() -> Question {
        Question {
            id: "q1".to_string(),
            quiz_id: "z".to_string(),
            position: 0,
            question_text: "Capital of Sweden?".to_string(),
            question_type: QuestionType::MultipleChoice,
            options: Some(vec!["Oslo".to_string(), "Stockholm".to_string()]),
            correct_answer: "Stockholm".to_string(),
            explanation: None,
            time_limit: 30,
            points: 2,
        }
    }

    fn answer(participant: &str, question: &str, text: &str, time_taken: f64) -> Answer {
        Answer {
            id: format!("{participant}-{question}"),
            session_id: "s1".to_string(),
            participant_id: participant.to_string(),
            question_id: question.to_string(),
            answer: text.to_string(),
            answered_at: Utc::now(),
            time_taken,
        }
    }

    #[test]
    fn tally_counts_rates_and_time() {
        let answers = vec![
            answer("a", "q1", "Stockholm", 4.0),
            answer("b", "q1", "Oslo", 8.0),
            answer("c", "q1", "", 30.0),
            answer("d", "q2", "Oslo", 1.0),
        ];

        let tally = Tally::compute(&answers, &question(), 4);

        assert_eq!(tally.counts.get("Stockholm"), Some(&1));
        assert_eq!(tally.counts.get("Oslo"), Some(&1));
        assert_eq!(tally.total_answers, 2);
        assert_eq!(tally.blank_answers, 1);
        assert_eq!(tally.response_rate, 50.0);
        assert_eq!(tally.correct_rate, 50.0);
        assert_eq!(tally.average_time, 6.0);
    }

    #[test]
    fn empty_roster_has_zero_rates() {
        let tally = Tally::compute(&[], &question(), 0);
        assert_eq!(tally.response_rate, 0.0);
        assert_eq!(tally.average_time, 0.0);
        assert_eq!(
            tally.option_counts(&question()),
            vec![("Oslo".to_string(), 0), ("Stockholm".to_string(), 0)]
        );
    }
}
