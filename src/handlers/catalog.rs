use std::{fs, path::Path, sync::Arc};

use log::info;
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::{SessionError, StoreError},
    models::quiz::{Question, Quiz, QuizPack, QuizRecord},
    store::{
        schema::{fetch_many, fetch_one, insert_row},
        Filter, SessionStore,
    },
};

/// Read access to quiz content, plus loading quiz packs from disk.
pub struct QuizCatalog {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl QuizCatalog {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        QuizCatalog { store, clock }
    }

    pub async fn fetch(&self, quiz_id: &str) -> Result<Quiz, SessionError> {
        let record: QuizRecord = fetch_one(self.store.as_ref(), &Filter::by_id(quiz_id))
            .await
            .map_err(|error| match error {
                StoreError::NotFound { .. } => SessionError::QuizNotFound,
                other => SessionError::Store(other),
            })?;
        let questions: Vec<Question> = fetch_many(
            self.store.as_ref(),
            &Filter::new().eq("quiz_id", quiz_id),
            Some("position"),
        )
        .await?;

        Ok(Quiz {
            id: record.id,
            title: record.title,
            description: record.description,
            questions,
        })
    }

    pub fn load_pack(path: impl AsRef<Path>) -> Result<QuizPack, SessionError> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub async fn import_pack(&self, path: impl AsRef<Path>) -> Result<Quiz, SessionError> {
        let path = path.as_ref();
        let quiz = self.insert_pack(Self::load_pack(path)?).await?;
        info!("Imported quiz {} ({}) from {}", quiz.title, quiz.id, path.display());
        Ok(quiz)
    }

    /// Validates a pack and stores it as a new quiz.
    pub async fn insert_pack(&self, pack: QuizPack) -> Result<Quiz, SessionError> {
        let quiz_id = Uuid::new_v4().to_string();
        let quiz = Quiz {
            id: quiz_id.clone(),
            title: pack.title.trim().to_string(),
            description: pack.description,
            questions: pack
                .questions
                .into_iter()
                .enumerate()
                .map(|(position, question)| Question {
                    id: Uuid::new_v4().to_string(),
                    quiz_id: quiz_id.clone(),
                    position,
                    question_text: question.question_text,
                    question_type: question.question_type,
                    options: question.options,
                    correct_answer: question.correct_answer,
                    explanation: question.explanation,
                    time_limit: question.time_limit,
                    points: question.points,
                })
                .collect(),
        };
        quiz.validate().map_err(SessionError::InvalidQuiz)?;

        let record = QuizRecord {
            id: quiz.id.clone(),
            title: quiz.title.clone(),
            description: quiz.description.clone(),
            created_at: self.clock.now(),
        };
        insert_row(self.store.as_ref(), &record).await?;
        for question in &quiz.questions {
            insert_row(self.store.as_ref(), question).await?;
        }

        Ok(quiz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::SystemClock, store::SqliteStore};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn catalog() -> QuizCatalog {
        QuizCatalog::new(Arc::new(SqliteStore::open_in_memory().unwrap()), Arc::new(SystemClock))
    }

    const PACK: &str = r#"{
        "title": "Capitals",
        "questions": [
            {
                "question_text": "Capital of Sweden?",
                "question_type": "multiple_choice",
                "options": ["Oslo", "Stockholm", "Helsinki"],
                "correct_answer": "Stockholm",
                "time_limit": 20
            },
            {
                "question_text": "Oslo is the capital of Norway",
                "question_type": "true_false",
                "correct_answer": "true",
                "points": 2
            }
        ]
    }"#;

    #[tokio::test]
    async fn imports_and_fetches_in_order() {
        let catalog = catalog();
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", PACK).unwrap();

        let imported = catalog.import_pack(file.path()).await.unwrap();
        let fetched = catalog.fetch(&imported.id).await.unwrap();

        assert_eq!(fetched, imported);
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched.questions[0].time_limit, 20);
        assert_eq!(fetched.questions[1].time_limit, 30);
        assert_eq!(fetched.questions[1].points, 2);
    }

    #[tokio::test]
    async fn rejects_invalid_packs() {
        let catalog = catalog();
        let pack: QuizPack = serde_json::from_str(
            r#"{"title": "Broken", "questions": [
                {"question_text": "?", "question_type": "multiple_choice",
                 "options": ["a", "b"], "correct_answer": "c"}
            ]}"#,
        )
        .unwrap();

        assert!(matches!(catalog.insert_pack(pack).await, Err(SessionError::InvalidQuiz(_))));
    }

    #[tokio::test]
    async fn unknown_quiz() {
        assert!(matches!(catalog().fetch("nope").await, Err(SessionError::QuizNotFound)));
    }
}
