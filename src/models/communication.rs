use serde::{Deserialize, Serialize};

use super::{
    answer::{AnswerEntry, ScoreEntry, Tally},
    participant::Participant,
    quiz::QuestionPrompt,
    session::Session,
};
use crate::sync::ViewSnapshot;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "response", content = "data", rename_all = "camelCase")]
pub enum Response {
    #[serde(rename_all = "camelCase")]
    SessionCreated {
        token: String,
        session_code: String,
        session_id: String,
    },
    Joined {
        token: String,
        participant: Participant,
    },
    View {
        view: ViewSnapshot,
    },
    QuestionChanged {
        index: usize,
        question: Option<QuestionPrompt>,
        remaining: Option<u32>,
    },
    Timer {
        remaining: u32,
    },
    #[serde(rename_all = "camelCase")]
    TimeUp {
        question_index: usize,
    },
    Roster {
        participants: Vec<Participant>,
    },
    #[serde(rename_all = "camelCase")]
    Tally {
        tally: Tally,
        options: Vec<(String, u32)>,
        correct_answer: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        answers: Option<Vec<AnswerEntry>>,
    },
    AnswerAccepted {
        explanation: Option<String>,
    },
    Scoreboard {
        scores: Vec<ScoreEntry>,
    },
    SessionEnded {
        session: Session,
    },
    Left {},
    #[serde(rename_all = "camelCase")]
    ErrorResponse {
        error_text: String,
    },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum UnauthorizedCommand {
    #[serde(rename_all = "camelCase")]
    CreateSession { quiz_id: String, teacher_name: String },
    #[serde(rename_all = "camelCase")]
    JoinSession { session_code: String, name: String },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum AuthorizedCommand {
    StartSession {},
    NextQuestion {},
    PreviousQuestion {},
    EndSession {},
    GetTally {},
    GetScoreboard {},
    SubmitAnswer { answer: String },
    LeaveSession {},
    Heartbeat {},
    GetView {},
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CommandTokenPair {
    #[serde(flatten)]
    pub command: AuthorizedCommand,
    pub token: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Command {
    CommandTokenPair(CommandTokenPair),
    UnauthorizedCommand(UnauthorizedCommand),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_with_and_without_token() {
        let join: Command =
            serde_json::from_value(json!({"command": "joinSession", "sessionCode": "483920", "name": "Mia"}))
                .unwrap();
        assert_eq!(
            join,
            Command::UnauthorizedCommand(UnauthorizedCommand::JoinSession {
                session_code: "483920".to_string(),
                name: "Mia".to_string()
            })
        );

        let submit: Command =
            serde_json::from_value(json!({"command": "submitAnswer", "answer": "Stockholm", "token": "t"}))
                .unwrap();
        assert_eq!(
            submit,
            Command::CommandTokenPair(CommandTokenPair {
                command: AuthorizedCommand::SubmitAnswer {
                    answer: "Stockholm".to_string()
                },
                token: "t".to_string()
            })
        );

        let next: Command = serde_json::from_value(json!({"command": "nextQuestion", "token": "t"})).unwrap();
        assert!(matches!(
            next,
            Command::CommandTokenPair(CommandTokenPair {
                command: AuthorizedCommand::NextQuestion {},
                ..
            })
        ));

        assert!(serde_json::from_value::<Command>(json!({"command": "nextQuestion"})).is_err());
    }

    #[test]
    fn responses_are_tagged() {
        let value = serde_json::to_value(Response::ErrorResponse {
            error_text: "Session not found, check your code".to_string(),
        })
        .unwrap();

        assert_eq!(
            value,
            json!({"response": "errorResponse", "data": {"errorText": "Session not found, check your code"}})
        );
        assert_eq!(
            serde_json::to_value(Response::TimeUp { question_index: 1 }).unwrap(),
            json!({"response": "timeUp", "data": {"questionIndex": 1}})
        );
    }
}
