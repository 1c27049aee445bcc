//! Provider adapters
//!
//! One adapter per upstream API. Each turns a chat history into a stream of
//! [`Fragment`]s; the relay never sees provider wire formats.

mod google;
mod openai;
mod sse;

pub use google::GoogleAdapter;
pub use openai::OpenAiCompatibleAdapter;
pub use sse::fragment_stream_from_sse;

use crate::configuration::ProviderSettings;
use crate::models::Role;
use crate::relay::registry::ProviderKind;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

/// One entry of the history sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    /// Provider-reported end of generation. May arrive more than once
    /// (reason and usage in separate events).
    Finish {
        reason: Option<String>,
        usage: Option<Usage>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ProviderError {
    pub reason: String,
    pub retriable: bool,
}

impl ProviderError {
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retriable: false,
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retriable: true,
        }
    }

    /// Rate limits and server-side failures are worth retrying.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let reason = format!("upstream returned {}: {}", status.as_u16(), body.trim());
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Self::transient(reason)
        } else {
            Self::fatal(reason)
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ProviderError::transient(err.to_string())
        } else {
            ProviderError::fatal(err.to_string())
        }
    }
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, ProviderError>> + Send>>;

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Open a streaming completion. Errors returned here happen before any
    /// fragment was produced.
    async fn stream_completion(&self, model_name: &str, history: &[ChatTurn]) -> Result<FragmentStream, ProviderError>;
}

/// Adapter per provider kind, shared by the relay and title generation.
#[derive(Clone, Default)]
pub struct ProviderAdapters {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl ProviderAdapters {
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let client = reqwest::Client::new();
        let mut adapters = Self::default();
        adapters.insert(
            ProviderKind::OpenAi,
            Arc::new(OpenAiCompatibleAdapter::new(
                client.clone(),
                settings.openai.base_url.clone(),
                settings.openai.api_key.clone(),
                true,
            )),
        );
        adapters.insert(
            ProviderKind::Google,
            Arc::new(GoogleAdapter::new(
                client.clone(),
                settings.google.base_url.clone(),
                settings.google.api_key.clone(),
            )),
        );
        adapters.insert(
            ProviderKind::LmStudio,
            Arc::new(OpenAiCompatibleAdapter::new(
                client,
                settings.lmstudio.base_url.clone(),
                settings.lmstudio.api_key.clone(),
                false,
            )),
        );
        adapters
    }

    pub fn insert(&mut self, kind: ProviderKind, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(kind, adapter);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&kind).cloned()
    }
}
