use std::sync::{Mutex, MutexGuard, PoisonError};

use tungstenite::Message;

use crate::models::communication::Command;

pub fn parse_command(msg: &Message) -> Result<Command, serde_json::Error> {
    serde_json::from_str(msg.to_text().unwrap_or_default())
}

/// Locks a mutex, carrying on with the inner value if a holder panicked.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Picks a display name that nobody in `taken` uses yet: `name`, then
/// `name (2)`, `name (3)` and so on.
pub fn disambiguate_name<'a>(name: &str, taken: impl IntoIterator<Item = &'a str>) -> String {
    let prefix = format!("{} (", name);
    let same_base: Vec<&str> = taken
        .into_iter()
        .filter(|existing| *existing == name || existing.starts_with(&prefix))
        .collect();

    if !same_base.contains(&name) {
        return name.to_string();
    }

    let mut ordinal = same_base.len() + 1;
    loop {
        let candidate = format!("{} ({})", name, ordinal);
        if !same_base.contains(&candidate.as_str()) {
            return candidate;
        }
        ordinal += 1;
    }
}
