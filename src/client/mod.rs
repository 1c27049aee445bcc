//! Client side of the relay: talks to the HTTP surface, keeps the local
//! transcript and drives regenerations.

mod backend;
mod carousel;
mod regeneration;
mod session;
#[cfg(test)]
mod testing;

pub use backend::{ChatBackend, HttpChatBackend, PartStream};
pub use carousel::ResponseCarousel;
pub use regeneration::{RegenerationCoordinator, RegenerationState};
pub use session::{ChatSession, EntryStatus, StopHandle, TranscriptEntry};

use crate::models::{Message, Role};
use crate::relay::ChatTurn;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("{message} (status {status})")]
    Status { status: u16, message: String },
    #[error("Malformed stream: {0}")]
    Protocol(String),
    /// In-band error event received while streaming.
    #[error("{0}")]
    Stream(String),
    #[error("Reply was not saved: {0}")]
    Unsaved(String),
    #[error("User turn {0} does not exist")]
    NoSuchTurn(usize),
    #[error("A reply is already streaming")]
    Busy,
    #[error("No conversation is open")]
    NoConversation,
    #[error("Nothing to retry")]
    NothingToRetry,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

/// Linear view of a stored transcript: each user message followed by the
/// newest reply that answers it. Older replies stay reachable through the
/// response set of their turn.
pub fn linear_view(messages: &[Message]) -> Vec<&Message> {
    let mut latest: HashMap<i64, &Message> = HashMap::new();
    let mut leading = Vec::new();
    let mut current_user = None;

    for message in messages {
        match message.role {
            Role::User => current_user = Some(message.id),
            Role::Assistant => match message.reply_to.or(current_user) {
                Some(user_id) => {
                    latest.insert(user_id, message);
                }
                None => leading.push(message),
            },
            Role::System => {}
        }
    }

    let mut view = leading;
    for user in messages.iter().filter(|m| m.role == Role::User) {
        view.push(user);
        if let Some(reply) = latest.get(&user.id) {
            view.push(reply);
        }
    }
    view
}

/// Provider history for answering user turn `turn`: the linear view cut
/// right after that user message. `None` when the turn does not exist.
pub fn history_for_turn(messages: &[Message], turn: usize) -> Option<Vec<ChatTurn>> {
    let view = linear_view(messages);
    let position = view
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == Role::User)
        .nth(turn)
        .map(|(i, _)| i)?;

    Some(
        view[..=position]
            .iter()
            .map(|m| ChatTurn::new(m.role, m.content.clone()))
            .collect(),
    )
}
