//! Chat session
//!
//! Binds user input to the relay for one open conversation. The local
//! transcript is optimistic: entries appear before the server confirmed
//! them and carry their save status.
//!
//! A conversation opened with exactly one user message and no reply gets one
//! automatic reply. The marker is set before the reply is requested, so a
//! failed or stopped attempt does not fire again in this session.

use super::{linear_view, ChatBackend, ClientError, RegenerationCoordinator, ResponseCarousel};
use crate::forms::{ChatRequest, CreateConversation, SaveMessage};
use crate::models::{Message, Role};
use crate::relay::{ChatTurn, ModelAnnotation, StreamPart};
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Saved(i64),
    /// Sent to the server, no answer yet.
    Pending,
    Streaming,
    /// Stopped or interrupted; never saved.
    Incomplete,
    /// Complete but the save failed. See [`ChatSession::retry_save`].
    Unsaved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    pub model_id: Option<i32>,
    pub status: EntryStatus,
}

impl From<&Message> for TranscriptEntry {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            model_id: message.model_id,
            status: EntryStatus::Saved(message.id),
        }
    }
}

/// Stops whatever reply is streaming at the time of the call.
#[derive(Clone)]
pub struct StopHandle(Arc<watch::Sender<u64>>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_modify(|generation| *generation += 1);
    }
}

pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    model: String,
    conversation_id: Option<Uuid>,
    entries: Vec<TranscriptEntry>,
    auto_triggered: HashSet<Uuid>,
    streaming: bool,
    stop: Arc<watch::Sender<u64>>,
    regeneration: RegenerationCoordinator,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>) -> Self {
        let (stop, _) = watch::channel(0);
        Self {
            backend,
            model: model.into(),
            conversation_id: None,
            entries: Vec::new(),
            auto_triggered: HashSet::new(),
            streaming: false,
            stop: Arc::new(stop),
            regeneration: RegenerationCoordinator::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn conversation_id(&self) -> Option<Uuid> {
        self.conversation_id
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming || self.regeneration.is_busy()
    }

    pub fn regeneration(&self) -> &RegenerationCoordinator {
        &self.regeneration
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop.clone())
    }

    /// Load a conversation into the view. Returns whether the automatic
    /// reply fired.
    #[tracing::instrument(name = "Open conversation.", skip(self))]
    pub async fn open(&mut self, conversation_id: Uuid) -> Result<bool, ClientError> {
        let messages = self.backend.load_transcript(conversation_id).await?;
        if self.conversation_id != Some(conversation_id) {
            self.regeneration = RegenerationCoordinator::new();
        }
        self.conversation_id = Some(conversation_id);
        self.entries = linear_view(&messages).into_iter().map(TranscriptEntry::from).collect();

        self.auto_respond().await
    }

    /// Create a conversation under a fresh client-side id, save the first
    /// message and open it.
    pub async fn start_conversation(&mut self, first_message: &str, folder_id: Option<i32>) -> Result<Uuid, ClientError> {
        let id = Uuid::new_v4();
        let form = CreateConversation {
            id: Some(id),
            folder_id,
            ..Default::default()
        };
        self.backend.create_conversation(form).await?;
        self.backend.save_message(id, user_message(first_message)).await?;
        self.open(id).await?;
        Ok(id)
    }

    /// Fires the one automatic reply when the open conversation qualifies.
    pub async fn auto_respond(&mut self) -> Result<bool, ClientError> {
        let Some(id) = self.conversation_id else {
            return Ok(false);
        };
        if self.is_streaming() || self.auto_triggered.contains(&id) {
            return Ok(false);
        }
        let users = self.count(Role::User);
        let assistants = self.count(Role::Assistant);
        if users != 1 || assistants != 0 {
            return Ok(false);
        }

        self.auto_triggered.insert(id);
        tracing::debug!(conversation_id = %id, "Requesting automatic reply");
        self.respond().await?;
        Ok(true)
    }

    /// Save a user message and stream the reply to it.
    pub async fn send(&mut self, content: &str) -> Result<(), ClientError> {
        let id = self.conversation_id.ok_or(ClientError::NoConversation)?;
        if self.is_streaming() {
            return Err(ClientError::Busy);
        }

        self.entries.push(TranscriptEntry {
            role: Role::User,
            content: content.to_string(),
            model_id: None,
            status: EntryStatus::Pending,
        });
        let index = self.entries.len() - 1;
        match self.backend.save_message(id, user_message(content)).await {
            Ok(saved) => self.entries[index].status = EntryStatus::Saved(saved.id),
            Err(err) => {
                self.entries[index].status = EntryStatus::Unsaved;
                return Err(err);
            }
        }

        self.respond().await
    }

    /// Stream a reply to the latest user message with the session's model.
    pub async fn respond(&mut self) -> Result<(), ClientError> {
        let id = self.conversation_id.ok_or(ClientError::NoConversation)?;
        if self.is_streaming() {
            return Err(ClientError::Busy);
        }

        let history = self
            .entries
            .iter()
            .filter(|e| !matches!(e.status, EntryStatus::Incomplete))
            .map(|e| ChatTurn::new(e.role, e.content.clone()))
            .collect();
        let request = ChatRequest {
            messages: history,
            model: self.model.clone(),
            model_id: None,
            id: Some(id),
            turn: None,
        };

        self.streaming = true;
        let result = self.stream_reply(request).await;
        self.streaming = false;
        result
    }

    async fn stream_reply(&mut self, request: ChatRequest) -> Result<(), ClientError> {
        let mut stop = self.stop.subscribe();
        let mut parts = self.backend.stream_chat(request).await?;

        self.entries.push(TranscriptEntry {
            role: Role::Assistant,
            content: String::new(),
            model_id: None,
            status: EntryStatus::Streaming,
        });
        let index = self.entries.len() - 1;

        let mut annotation: Option<ModelAnnotation> = None;
        let mut failure: Option<String> = None;
        let mut stopped = false;
        loop {
            let part = tokio::select! {
                part = parts.next() => part,
                _ = stop.changed() => {
                    stopped = true;
                    break;
                }
            };
            match part {
                Some(Ok(StreamPart::Text(text))) => self.entries[index].content.push_str(&text),
                Some(Ok(StreamPart::Annotation(a))) => annotation = Some(a),
                Some(Ok(StreamPart::Error(message))) => failure = Some(message),
                Some(Ok(StreamPart::Finish(_))) | None => break,
                Some(Err(err)) => {
                    failure = Some(err.to_string());
                    break;
                }
            }
        }
        // dropping the body is what tells the relay to stop
        drop(parts);

        let entry = &mut self.entries[index];
        if stopped {
            tracing::info!(received = entry.content.len(), "Reply stopped");
            entry.status = EntryStatus::Incomplete;
            return Ok(());
        }

        match (annotation, failure) {
            (Some(ModelAnnotation {
                model_id,
                message_id: Some(message_id),
                ..
            }), None) => {
                entry.model_id = Some(model_id);
                entry.status = EntryStatus::Saved(message_id);
                Ok(())
            }
            (Some(annotation), failure) => {
                entry.model_id = Some(annotation.model_id);
                entry.status = EntryStatus::Unsaved;
                Err(ClientError::Unsaved(
                    failure.unwrap_or_else(|| "no message id in annotation".to_string()),
                ))
            }
            (None, failure) => {
                entry.status = EntryStatus::Incomplete;
                Err(ClientError::Stream(
                    failure.unwrap_or_else(|| "stream ended before completion".to_string()),
                ))
            }
        }
    }

    /// Post the newest unsaved entry through `saveMessage`.
    pub async fn retry_save(&mut self) -> Result<(), ClientError> {
        let id = self.conversation_id.ok_or(ClientError::NoConversation)?;
        let index = self
            .entries
            .iter()
            .rposition(|e| e.status == EntryStatus::Unsaved)
            .ok_or(ClientError::NothingToRetry)?;

        let entry = &self.entries[index];
        let turn = match entry.role {
            Role::Assistant => self.entries[..index]
                .iter()
                .filter(|e| e.role == Role::User)
                .count()
                .checked_sub(1),
            _ => None,
        };
        let form = SaveMessage {
            role: entry.role,
            content: entry.content.clone(),
            created_at: None,
            model_id: entry.model_id,
            turn,
        };

        let saved = self.backend.save_message(id, form).await?;
        self.entries[index].status = EntryStatus::Saved(saved.id);
        Ok(())
    }

    /// Regenerate the reply to user turn `turn` with `model` and show the
    /// new reply in place of the old one.
    pub async fn regenerate(&mut self, turn: usize, model: &str) -> Result<(), ClientError> {
        let id = self.conversation_id.ok_or(ClientError::NoConversation)?;
        if self.is_streaming() {
            return Err(ClientError::Busy);
        }

        let transcript = self.backend.load_transcript(id).await?;
        let shown = self
            .regeneration
            .regenerate(self.backend.as_ref(), id, turn, model, &transcript)
            .await?
            .current()
            .cloned();
        if let Some(reply) = shown {
            self.show_reply(turn, &reply);
        }
        Ok(())
    }

    /// Load the response set of a turn for browsing.
    pub async fn load_responses(&mut self, turn: usize) -> Result<&ResponseCarousel, ClientError> {
        let id = self.conversation_id.ok_or(ClientError::NoConversation)?;
        let responses = self.backend.load_response_set(id, turn).await?;
        Ok(self.regeneration.load_turn(turn, responses))
    }

    pub fn show_previous(&mut self, turn: usize) -> bool {
        let shown = self
            .regeneration
            .carousel_mut(turn)
            .and_then(|c| c.previous().cloned());
        self.show(turn, shown)
    }

    pub fn show_next(&mut self, turn: usize) -> bool {
        let shown = self.regeneration.carousel_mut(turn).and_then(|c| c.next().cloned());
        self.show(turn, shown)
    }

    fn show(&mut self, turn: usize, reply: Option<Message>) -> bool {
        match reply {
            Some(reply) => {
                self.show_reply(turn, &reply);
                true
            }
            None => false,
        }
    }

    /// Put `reply` right after the `turn`th user entry, replacing the reply
    /// shown there.
    fn show_reply(&mut self, turn: usize, reply: &Message) {
        let Some(position) = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.role == Role::User)
            .nth(turn)
            .map(|(i, _)| i)
        else {
            return;
        };

        let entry = TranscriptEntry::from(reply);
        match self.entries.get(position + 1) {
            Some(next) if next.role == Role::Assistant => self.entries[position + 1] = entry,
            _ => self.entries.insert(position + 1, entry),
        }
    }

    fn count(&self, role: Role) -> usize {
        self.entries.iter().filter(|e| e.role == role).count()
    }
}

fn user_message(content: &str) -> SaveMessage {
    SaveMessage {
        role: Role::User,
        content: content.to_string(),
        created_at: None,
        model_id: None,
        turn: None,
    }
}
