use log::warn;
use serde::{de::DeserializeOwned, ser::Error as _, Serialize};
use serde_json::Value;

use super::{Filter, Row, SessionStore, Table};
use crate::error::StoreError;

/// Schema struct for one table. Rows are checked against it on the way in.
pub trait TableRow: Serialize + DeserializeOwned + Send {
    const TABLE: Table;

    fn from_row(row: Row) -> Result<Self, StoreError> {
        serde_json::from_value(Value::Object(row)).map_err(|source| StoreError::Malformed {
            table: Self::TABLE,
            source,
        })
    }

    fn to_row(&self) -> Result<Row, StoreError> {
        let malformed = |source| StoreError::Malformed {
            table: Self::TABLE,
            source,
        };
        match serde_json::to_value(self).map_err(malformed)? {
            Value::Object(row) => Ok(row),
            _ => Err(malformed(serde_json::Error::custom("row is not an object"))),
        }
    }
}

pub async fn insert_row<T: TableRow>(store: &dyn SessionStore, value: &T) -> Result<T, StoreError> {
    let row = store.insert(T::TABLE, value.to_row()?).await?;
    T::from_row(row)
}

pub async fn fetch_one<T: TableRow>(store: &dyn SessionStore, filter: &Filter) -> Result<T, StoreError> {
    T::from_row(store.select_one(T::TABLE, filter).await?)
}

/// Rows that fail validation are logged and left out.
pub async fn fetch_many<T: TableRow>(
    store: &dyn SessionStore,
    filter: &Filter,
    order_by: Option<&str>,
) -> Result<Vec<T>, StoreError> {
    let rows = store.select_many(T::TABLE, filter, order_by).await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| match T::from_row(row) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!("Skipping row: {}", error);
                None
            }
        })
        .collect())
}

/// Builds a patch row from `(column, value)` pairs.
pub fn patch<const N: usize>(fields: [(&str, Value); N]) -> Row {
    fields
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect()
}
