use std::{path::Path, sync::Mutex};

use async_trait::async_trait;
use log::{debug, info};
use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection, ErrorCode};
use serde_json::Value;
use uuid::Uuid;

use super::{
    feed::ChangeFeed, ChangeKind, Filter, Row, SessionStore, Subscription, SubscriptionId, Table,
};
use crate::{error::StoreError, helpers::lock};

// Answers carry a unique key so a participant can hold at most one answer per question.
const ANSWER_KEY_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS answers_one_per_question ON answers (
    json_extract(body, '$.session_id'),
    json_extract(body, '$.participant_id'),
    json_extract(body, '$.question_id')
)";

/// [`SessionStore`] over SQLite. Each table keeps JSON bodies plus an insertion sequence.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    feed: ChangeFeed,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("Opening session store at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        for table in Table::ALL {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    body TEXT NOT NULL
                )",
                table.name()
            ))?;
        }
        conn.execute_batch(ANSWER_KEY_INDEX)?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
            feed: ChangeFeed::new(),
        })
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    fn insert_sync(&self, table: Table, mut row: Row) -> Result<Row, StoreError> {
        let id = match row.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => {
                let id = Uuid::new_v4().to_string();
                row.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        let body = encode(table, &row)?;

        lock(&self.conn)
            .execute(
                &format!("INSERT INTO {} (id, body) VALUES (?1, ?2)", table.name()),
                params![id, body],
            )
            .map_err(|error| classify(table, error))?;

        debug!("Inserted {} into {}", id, table);
        Ok(row)
    }

    fn update_sync(&self, table: Table, filter: &Filter, mut patch: Row) -> Result<Vec<Row>, StoreError> {
        patch.remove("id");

        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;
        let matching = select(&tx, table, filter, None)?;

        let mut updated = Vec::with_capacity(matching.len());
        for (seq, mut row) in matching {
            for (column, value) in &patch {
                row.insert(column.clone(), value.clone());
            }
            tx.execute(
                &format!("UPDATE {} SET body = ?1 WHERE seq = ?2", table.name()),
                params![encode(table, &row)?, seq],
            )
            .map_err(|error| classify(table, error))?;
            updated.push(row);
        }
        tx.commit()?;

        Ok(updated)
    }

    fn delete_sync(&self, table: Table, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;
        let matching = select(&tx, table, filter, None)?;

        for (seq, _) in &matching {
            tx.execute(&format!("DELETE FROM {} WHERE seq = ?1", table.name()), params![seq])?;
        }
        tx.commit()?;

        Ok(matching.into_iter().map(|(_, row)| row).collect())
    }

    fn select_sync(&self, table: Table, filter: &Filter, order_by: Option<&str>) -> Result<Vec<Row>, StoreError> {
        let conn = lock(&self.conn);
        Ok(select(&conn, table, filter, order_by)?
            .into_iter()
            .map(|(_, row)| row)
            .collect())
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn insert(&self, table: Table, row: Row) -> Result<Row, StoreError> {
        let row = self.insert_sync(table, row)?;
        self.feed.publish(ChangeKind::Insert, table, &row);
        Ok(row)
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Row) -> Result<(), StoreError> {
        for row in self.update_sync(table, filter, patch)? {
            self.feed.publish(ChangeKind::Update, table, &row);
        }
        Ok(())
    }

    async fn select_one(&self, table: Table, filter: &Filter) -> Result<Row, StoreError> {
        self.select_sync(table, filter, None)?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound { table })
    }

    async fn select_many(
        &self,
        table: Table,
        filter: &Filter,
        order_by: Option<&str>,
    ) -> Result<Vec<Row>, StoreError> {
        self.select_sync(table, filter, order_by)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), StoreError> {
        for row in self.delete_sync(table, filter)? {
            self.feed.publish(ChangeKind::Delete, table, &row);
        }
        Ok(())
    }

    async fn subscribe(&self, table: Table, filter: Filter) -> Result<Subscription, StoreError> {
        Ok(self.feed.subscribe(table, filter))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StoreError> {
        if !self.feed.unsubscribe(id) {
            debug!("Subscription {} was already gone", id);
        }
        Ok(())
    }
}

fn select(
    conn: &Connection,
    table: Table,
    filter: &Filter,
    order_by: Option<&str>,
) -> Result<Vec<(i64, Row)>, StoreError> {
    let mut sql = format!("SELECT seq, body FROM {}", table.name());
    let mut bound = Vec::with_capacity(filter.clauses().len() * 2 + 1);

    for (i, (column, value)) in filter.clauses().iter().enumerate() {
        sql.push_str(if i == 0 { " WHERE " } else { " AND " });
        sql.push_str("json_extract(body, ?) IS ?");
        bound.push(SqlValue::Text(format!("$.{}", column)));
        bound.push(to_sql(value));
    }
    match order_by {
        Some(column) => {
            sql.push_str(" ORDER BY json_extract(body, ?), seq");
            bound.push(SqlValue::Text(format!("$.{}", column)));
        }
        None => sql.push_str(" ORDER BY seq"),
    }

    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt
        .query_map(params_from_iter(bound.iter()), |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(seq, body)| {
            serde_json::from_str::<Row>(&body)
                .map(|row| (seq, row))
                .map_err(|source| StoreError::Malformed { table, source })
        })
        .collect()
}

fn encode(table: Table, row: &Row) -> Result<String, StoreError> {
    serde_json::to_string(row).map_err(|source| StoreError::Malformed { table, source })
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn classify(table: Table, error: rusqlite::Error) -> StoreError {
    match error {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict { table }
        }
        other => StoreError::Sqlite(other),
    }
}
