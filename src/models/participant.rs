use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Table, TableRow};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub session_id: String,
    pub participant_name: String,
    pub joined_at: DateTime<Utc>,
    pub is_connected: bool,
}

impl TableRow for Participant {
    const TABLE: Table = Table::Participants;
}
