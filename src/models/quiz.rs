use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Table, TableRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub quiz_id: String,
    pub position: usize,
    pub question_text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
    pub time_limit: u32,
    pub points: u32,
}

impl TableRow for Question {
    const TABLE: Table = Table::Questions;
}

impl Question {
    /// The answers a student can pick, in display order.
    pub fn choices(&self) -> Vec<String> {
        match self.question_type {
            QuestionType::MultipleChoice => self.options.clone().unwrap_or_default(),
            QuestionType::TrueFalse => vec!["true".to_string(), "false".to_string()],
        }
    }

    pub fn is_correct(&self, answer: &str) -> bool {
        !answer.is_empty() && answer == self.correct_answer
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.question_text.trim().is_empty() {
            return Err(format!("question {} has no text", self.position + 1));
        }
        if self.time_limit == 0 {
            return Err(format!("question {} has no time limit", self.position + 1));
        }

        match self.question_type {
            QuestionType::MultipleChoice => {
                let options = match &self.options {
                    Some(options) if !options.is_empty() => options,
                    _ => return Err(format!("question {} needs options", self.position + 1)),
                };
                if !options.contains(&self.correct_answer) {
                    return Err(format!(
                        "question {}: correct answer \"{}\" is not one of the options",
                        self.position + 1,
                        self.correct_answer
                    ));
                }
            }
            QuestionType::TrueFalse => {
                if self.correct_answer != "true" && self.correct_answer != "false" {
                    return Err(format!(
                        "question {}: true/false answer must be \"true\" or \"false\"",
                        self.position + 1
                    ));
                }
            }
        }

        Ok(())
    }
}

/// A question as students see it: no correct answer, no explanation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPrompt {
    pub id: String,
    pub position: usize,
    pub question_text: String,
    pub question_type: QuestionType,
    pub choices: Vec<String>,
    pub time_limit: u32,
    pub points: u32,
}

impl From<&Question> for QuestionPrompt {
    fn from(question: &Question) -> Self {
        QuestionPrompt {
            id: question.id.clone(),
            position: question.position,
            question_text: question.question_text.clone(),
            question_type: question.question_type,
            choices: question.choices(),
            time_limit: question.time_limit,
            points: question.points,
        }
    }
}

/// Row of the `quizzes` table. Questions live in their own table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TableRow for QuizRecord {
    const TABLE: Table = Table::Quizzes;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn question_by_id(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == id)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("quiz has no title".to_string());
        }
        self.questions.iter().try_for_each(Question::validate)
    }
}

fn default_time_limit() -> u32 {
    30
}

fn default_points() -> u32 {
    1
}

/// A quiz as written in a pack file, before it has ids.
#[derive(Debug, Clone, Deserialize)]
pub struct QuizPack {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub questions: Vec<PackQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackQuestion {
    pub question_text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default = "default_time_limit")]
    pub time_limit: u32,
    #[serde(default = "default_points")]
    pub points: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capital_question() -> Question {
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
            points: 1,
        }
    }

    #[test]
    fn correct_answer_must_be_an_option() {
        let mut question = capital_question();
        assert!(question.validate().is_ok());

        question.correct_answer = "Helsinki".to_string();
        assert!(question.validate().is_err());

        question.options = None;
        assert!(question.validate().is_err());
    }

    #[test]
    fn true_false_choices() {
        let mut question = capital_question();
        question.question_type = QuestionType::TrueFalse;
        question.options = None;
        question.correct_answer = "true".to_string();

        assert!(question.validate().is_ok());
        assert_eq!(question.choices(), vec!["true", "false"]);
        assert!(question.is_correct("true"));
        assert!(!question.is_correct(""));

        let prompt = QuestionPrompt::from(&question);
        assert_eq!(prompt.choices, vec!["true", "false"]);
        assert!(!serde_json::to_string(&prompt).unwrap().contains("correct"));
    }

    #[test]
    fn pack_fills_defaults() {
        let pack: QuizPack = serde_json::from_str(
            r#"{
                "title": "Capitals",
                "questions": [
                    {"question_text": "Oslo is in Norway", "question_type": "true_false", "correct_answer": "true"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(pack.questions[0].time_limit, 30);
        assert_eq!(pack.questions[0].points, 1);
    }
}
