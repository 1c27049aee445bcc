//! In-memory [`ConversationStore`] used by relay, route and client tests.
//! Can be told to fail the next N message writes.

use super::store::{ConversationStore, StoreError};
use crate::models::{visible_transcript, Conversation, Message, NewMessage, Role, TurnRef};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    conversations: HashMap<Uuid, Conversation>,
    messages: Vec<Message>,
    next_id: i64,
}

impl State {
    fn user_messages(&self, owner: &str, conversation_id: Uuid) -> Vec<&Message> {
        let mut rows: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| m.chat_id == conversation_id && m.user_id == owner && m.role == Role::User)
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        rows
    }

    fn owned(&self, owner: &str, id: Uuid) -> Option<&Conversation> {
        self.conversations.get(&id).filter(|c| c.user_id == owner)
    }
}

#[derive(Default)]
pub struct MemoryConversationStore {
    state: Mutex<State>,
    failing_writes: AtomicU32,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `append_message` fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// All rows regardless of role, in insertion order.
    pub async fn all_messages(&self) -> Vec<Message> {
        self.state.lock().await.messages.clone()
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.lock().await.conversations.len()
    }

    fn take_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create_conversation(&self, conversation: Conversation) -> Result<Conversation, StoreError> {
        let mut state = self.state.lock().await;
        match state.conversations.get(&conversation.id) {
            Some(existing) if existing.user_id == conversation.user_id => Ok(existing.clone()),
            Some(_) => Err(StoreError::ConversationNotFound(conversation.id)),
            None => {
                state.conversations.insert(conversation.id, conversation.clone());
                Ok(conversation)
            }
        }
    }

    async fn fetch_conversation(&self, owner: &str, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        Ok(self.state.lock().await.owned(owner, id).cloned())
    }

    async fn append_message(
        &self,
        owner: &str,
        conversation_id: Uuid,
        message: NewMessage,
    ) -> Result<Message, StoreError> {
        if self.take_failure() {
            return Err(StoreError::Database("injected write failure".into()));
        }

        let mut state = self.state.lock().await;
        if state.owned(owner, conversation_id).is_none() {
            return Err(StoreError::ConversationNotFound(conversation_id));
        }

        let reply_to = match (message.role, message.answers) {
            (Role::Assistant, TurnRef::Latest) => state.user_messages(owner, conversation_id).last().map(|m| m.id),
            (Role::Assistant, TurnRef::Ordinal(k)) => Some(
                state
                    .user_messages(owner, conversation_id)
                    .get(k)
                    .map(|m| m.id)
                    .ok_or(StoreError::TurnNotFound(k))?,
            ),
            _ => None,
        };

        state.next_id += 1;
        let row = Message {
            id: state.next_id,
            chat_id: conversation_id,
            user_id: owner.to_string(),
            role: message.role,
            content: message.content,
            model_id: message.model_id,
            reply_to,
            created_at: message.created_at.unwrap_or_else(Utc::now),
        };
        state.messages.push(row.clone());
        if let Some(conv) = state.conversations.get_mut(&conversation_id) {
            conv.updated_at = Utc::now();
        }
        Ok(row)
    }

    async fn load_transcript(&self, owner: &str, conversation_id: Uuid) -> Result<Vec<Message>, StoreError> {
        let state = self.state.lock().await;
        let rows = state
            .messages
            .iter()
            .filter(|m| m.chat_id == conversation_id && m.user_id == owner)
            .cloned()
            .collect();
        Ok(visible_transcript(rows))
    }

    async fn load_response_set_for_turn(
        &self,
        owner: &str,
        conversation_id: Uuid,
        ordinal: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let state = self.state.lock().await;
        let user_message_id = state
            .user_messages(owner, conversation_id)
            .get(ordinal)
            .map(|m| m.id)
            .ok_or(StoreError::TurnNotFound(ordinal))?;

        let replies = state
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant && m.reply_to == Some(user_message_id))
            .cloned()
            .collect();
        Ok(visible_transcript(replies))
    }

    async fn user_turn_count(&self, owner: &str, conversation_id: Uuid) -> Result<usize, StoreError> {
        Ok(self.state.lock().await.user_messages(owner, conversation_id).len())
    }

    async fn rename_conversation(&self, owner: &str, id: Uuid, title: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.conversations.get_mut(&id).filter(|c| c.user_id == owner) {
            Some(conv) => {
                conv.title = title.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_conversation(&self, owner: &str, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if state.owned(owner, id).is_none() {
            return Ok(false);
        }
        state.messages.retain(|m| m.chat_id != id);
        state.conversations.remove(&id);
        Ok(true)
    }
}
