use futures_channel::mpsc::UnboundedSender;
use log::{debug, warn};
use tungstenite::protocol::Message;

use crate::{error::SessionError, models::communication::Response};

pub type Tx = UnboundedSender<Message>;

pub fn send_message(response: &Response, tx: &Tx, connection_id: &str) {
    let text = match serde_json::to_string(response) {
        Ok(text) => text,
        Err(error) => {
            warn!("Could not serialize response for {}: {}", connection_id, error);
            return;
        }
    };

    if tx.unbounded_send(Message::Text(text)).is_err() {
        debug!("Connection {} is gone, dropping message", connection_id);
    }
}

/// Reports `error` to the client, masking internal failures.
pub fn send_error(error: &SessionError, tx: &Tx, connection_id: &str) {
    if error.is_user_visible() {
        debug!("Refused request from {}: {}", connection_id, error);
    } else {
        warn!("Request from {} failed: {}", connection_id, error);
    }

    let response = Response::ErrorResponse {
        error_text: error.user_message(),
    };
    send_message(&response, tx, connection_id);
}
