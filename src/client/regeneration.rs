//! Regeneration of an earlier turn.
//!
//! `Idle -> Requesting -> Streaming -> Settled`, with any failure going back
//! to `Idle`. The streamed text stays available as an optimistic reply until
//! the next regeneration starts, even when it could not be saved.

use super::{history_for_turn, ChatBackend, ClientError, ResponseCarousel};
use crate::forms::ChatRequest;
use crate::models::Message;
use crate::relay::StreamPart;
use futures_util::StreamExt;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegenerationState {
    Idle,
    Requesting { turn: usize, model: String },
    Streaming { turn: usize },
    Settled { turn: usize },
}

#[derive(Debug)]
pub struct RegenerationCoordinator {
    state: RegenerationState,
    optimistic: String,
    carousels: HashMap<usize, ResponseCarousel>,
    last_error: Option<ClientError>,
}

impl Default for RegenerationCoordinator {
    fn default() -> Self {
        Self {
            state: RegenerationState::Idle,
            optimistic: String::new(),
            carousels: HashMap::new(),
            last_error: None,
        }
    }
}

impl RegenerationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RegenerationState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            RegenerationState::Requesting { .. } | RegenerationState::Streaming { .. }
        )
    }

    /// Text streamed by the latest attempt and not yet part of a loaded set.
    pub fn optimistic_text(&self) -> Option<&str> {
        (!self.optimistic.is_empty()).then_some(self.optimistic.as_str())
    }

    pub fn last_error(&self) -> Option<&ClientError> {
        self.last_error.as_ref()
    }

    pub fn carousel(&self, turn: usize) -> Option<&ResponseCarousel> {
        self.carousels.get(&turn)
    }

    pub fn carousel_mut(&mut self, turn: usize) -> Option<&mut ResponseCarousel> {
        self.carousels.get_mut(&turn)
    }

    /// Load (or reload) the response set of a turn for browsing.
    pub fn load_turn(&mut self, turn: usize, responses: Vec<Message>) -> &ResponseCarousel {
        let carousel = self.carousels.entry(turn).or_default();
        carousel.load(responses);
        carousel
    }

    pub fn begin(&mut self, turn: usize, model: &str, user_turns: usize) -> Result<(), ClientError> {
        if self.is_busy() {
            return Err(ClientError::Busy);
        }
        if turn >= user_turns {
            return Err(ClientError::NoSuchTurn(turn));
        }
        self.state = RegenerationState::Requesting {
            turn,
            model: model.to_string(),
        };
        self.optimistic.clear();
        self.last_error = None;
        Ok(())
    }

    pub fn on_fragment(&mut self, text: &str) {
        match &self.state {
            RegenerationState::Requesting { turn, .. } => {
                self.state = RegenerationState::Streaming { turn: *turn };
            }
            RegenerationState::Streaming { .. } => {}
            _ => return,
        }
        self.optimistic.push_str(text);
    }

    /// Swap the optimistic reply for the reloaded response set. The newest
    /// entry becomes current.
    pub fn settle(&mut self, responses: Vec<Message>) {
        let turn = match self.state {
            RegenerationState::Requesting { turn, .. } | RegenerationState::Streaming { turn } => turn,
            _ => return,
        };
        self.load_turn(turn, responses);
        self.optimistic.clear();
        self.state = RegenerationState::Settled { turn };
    }

    pub fn fail(&mut self, err: ClientError) -> ClientError {
        tracing::warn!(state = ?self.state, "Regeneration failed: {}", err);
        self.state = RegenerationState::Idle;
        self.last_error = Some(err.clone());
        err
    }

    /// Ask `model` for a new answer to user turn `turn` and settle on the
    /// reloaded response set.
    #[tracing::instrument(name = "Regenerate turn.", skip(self, backend, transcript))]
    pub async fn regenerate(
        &mut self,
        backend: &dyn ChatBackend,
        conversation_id: Uuid,
        turn: usize,
        model: &str,
        transcript: &[Message],
    ) -> Result<&ResponseCarousel, ClientError> {
        let Some(history) = history_for_turn(transcript, turn) else {
            return Err(self.fail(ClientError::NoSuchTurn(turn)));
        };
        let user_turns = history.iter().filter(|t| t.role == crate::models::Role::User).count();
        self.begin(turn, model, user_turns)?;

        let request = ChatRequest {
            messages: history,
            model: model.to_string(),
            model_id: None,
            id: Some(conversation_id),
            turn: Some(turn),
        };
        let mut parts = match backend.stream_chat(request).await {
            Ok(parts) => parts,
            Err(err) => return Err(self.fail(err)),
        };

        let mut saved_as = None;
        let mut annotated = false;
        while let Some(part) = parts.next().await {
            match part {
                Ok(StreamPart::Text(text)) => self.on_fragment(&text),
                Ok(StreamPart::Annotation(annotation)) => {
                    annotated = true;
                    saved_as = annotation.message_id;
                }
                Ok(StreamPart::Error(message)) if annotated => {
                    return Err(self.fail(ClientError::Unsaved(message)));
                }
                Ok(StreamPart::Error(message)) => return Err(self.fail(ClientError::Stream(message))),
                Ok(StreamPart::Finish(_)) => break,
                Err(err) => return Err(self.fail(err)),
            }
        }
        drop(parts);

        if saved_as.is_none() {
            return Err(self.fail(ClientError::Unsaved("no message id in annotation".to_string())));
        }

        match backend.load_response_set(conversation_id, turn).await {
            Ok(responses) => {
                self.settle(responses);
                Ok(&self.carousels[&turn])
            }
            Err(err) => Err(self.fail(err)),
        }
    }
}
