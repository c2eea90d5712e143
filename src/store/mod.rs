//! The hosted table store every client talks to.
//!
//! Rows travel as JSON objects. Typed access goes through [`schema::TableRow`],
//! which validates a row against its schema struct at this boundary.

pub mod feed;
pub mod schema;
pub mod sqlite;

use std::fmt;

use async_trait::async_trait;
use futures_channel::mpsc::UnboundedReceiver;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

pub use schema::TableRow;
pub use sqlite::SqliteStore;

pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Sessions,
    Participants,
    Answers,
    Quizzes,
    Questions,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Sessions,
        Table::Participants,
        Table::Answers,
        Table::Quizzes,
        Table::Questions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Sessions => "sessions",
            Table::Participants => "participants",
            Table::Answers => "answers",
            Table::Quizzes => "quizzes",
            Table::Questions => "questions",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Conjunction of `column == value` clauses. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn by_id(id: &str) -> Self {
        Filter::new().eq("id", id)
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.clauses.push((column.to_string(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.clauses
            .iter()
            .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row change. For deletes `row` holds the row as it was before removal.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: Table,
    pub row: Row,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A live change feed. The stream ends when the store drops the subscription.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: UnboundedReceiver<ChangeEvent>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a row, assigning an `id` when the row has none, and returns it.
    async fn insert(&self, table: Table, row: Row) -> Result<Row, StoreError>;

    /// Merges `patch` into every row matching `filter`.
    async fn update(&self, table: Table, filter: &Filter, patch: Row) -> Result<(), StoreError>;

    async fn select_one(&self, table: Table, filter: &Filter) -> Result<Row, StoreError>;

    /// `order_by` of `None` keeps insertion order.
    async fn select_many(
        &self,
        table: Table,
        filter: &Filter,
        order_by: Option<&str>,
    ) -> Result<Vec<Row>, StoreError>;

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), StoreError>;

    async fn subscribe(&self, table: Table, filter: Filter) -> Result<Subscription, StoreError>;

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StoreError>;
}
