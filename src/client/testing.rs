//! In-process [`ChatBackend`] over a real [`StreamRelay`] and the memory
//! store, for client tests.

use super::{ChatBackend, ClientError, PartStream};
use crate::configuration::{Environment, ModelSettings, RelaySettings};
use crate::forms::{ChatRequest, CreateConversation, SaveMessage};
use crate::models::{Conversation, Message};
use crate::relay::provider::{Fragment, FragmentStream};
use crate::relay::{ChatTurn, ModelRegistry, ProviderAdapter, ProviderAdapters, ProviderError, ProviderKind, StreamRelay};
use crate::services::{ConversationStore, MemoryConversationStore, StoreError};
use actix_web::ResponseError;
use async_trait::async_trait;
use futures::stream;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub const OWNER: &str = "owner-1";

/// Replies `"reply from <model>"` in two fragments. A last user message
/// containing `stall` gets one fragment and then nothing.
pub struct EchoAdapter;

#[async_trait]
impl ProviderAdapter for EchoAdapter {
    async fn stream_completion(&self, model_name: &str, history: &[ChatTurn]) -> Result<FragmentStream, ProviderError> {
        let stall = history.last().is_some_and(|t| t.content.contains("stall"));
        let fragments = vec![
            Ok(Fragment::Text("reply from ".to_string())),
            Ok(Fragment::Text(model_name.to_string())),
        ];
        if stall {
            let first = stream::iter(fragments.into_iter().take(1));
            return Ok(Box::pin(first.chain(stream::pending())));
        }
        Ok(Box::pin(stream::iter(fragments)))
    }
}

fn store_error(err: StoreError) -> ClientError {
    let status = match err {
        StoreError::ConversationNotFound(_) | StoreError::TurnNotFound(_) => 404,
        StoreError::Database(_) => 500,
    };
    ClientError::Status {
        status,
        message: err.to_string(),
    }
}

pub struct RelayBackend {
    pub relay: StreamRelay,
    pub store: Arc<MemoryConversationStore>,
    stream_calls: AtomicUsize,
}

impl RelayBackend {
    pub fn new() -> Self {
        let registry = ModelRegistry::from_settings(&[
            ModelSettings {
                id: 1,
                slug: "openai:model-a".into(),
                display_name: "Model A".into(),
            },
            ModelSettings {
                id: 2,
                slug: "openai:model-b".into(),
                display_name: "Model B".into(),
            },
        ])
        .unwrap();
        let mut adapters = ProviderAdapters::default();
        adapters.insert(ProviderKind::OpenAi, Arc::new(EchoAdapter));
        let store = Arc::new(MemoryConversationStore::new());
        let settings = RelaySettings {
            first_fragment_timeout_secs: 5,
            channel_capacity: 1,
            save_attempts: 1,
            save_backoff_ms: 1,
        };
        let relay = StreamRelay::new(Arc::new(registry), adapters, store.clone(), settings, Environment::Development);

        Self {
            relay,
            store,
            stream_calls: AtomicUsize::new(0),
        }
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub async fn assistant_count(&self) -> usize {
        self.store
            .all_messages()
            .await
            .iter()
            .filter(|m| m.role == crate::models::Role::Assistant)
            .count()
    }
}

#[async_trait]
impl ChatBackend for RelayBackend {
    async fn create_conversation(&self, form: CreateConversation) -> Result<Conversation, ClientError> {
        self.store
            .create_conversation(form.into_conversation(OWNER))
            .await
            .map_err(store_error)
    }

    async fn save_message(&self, conversation_id: Uuid, form: SaveMessage) -> Result<Message, ClientError> {
        self.store
            .append_message(OWNER, conversation_id, form.into())
            .await
            .map_err(store_error)
    }

    async fn load_transcript(&self, conversation_id: Uuid) -> Result<Vec<Message>, ClientError> {
        self.store.load_transcript(OWNER, conversation_id).await.map_err(store_error)
    }

    async fn load_response_set(&self, conversation_id: Uuid, ordinal: usize) -> Result<Vec<Message>, ClientError> {
        self.store
            .load_response_set_for_turn(OWNER, conversation_id, ordinal)
            .await
            .map_err(store_error)
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<PartStream, ClientError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let handle = self
            .relay
            .open(OWNER, request.into_relay_request(None))
            .await
            .map_err(|err| ClientError::Status {
                status: err.status_code().as_u16(),
                message: err.to_string(),
            })?;
        Ok(Box::pin(handle.parts.map(Ok)))
    }
}
