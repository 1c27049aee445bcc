//! Background conversation titles.
//!
//! Spawned after the first user message of a conversation is saved. The
//! task has its own error boundary: failures are logged and reported as a
//! [`WriteOutcome`], never propagated.

use super::store::{ConversationStore, WriteOutcome};
use crate::configuration::{Environment, TitleSettings};
use crate::models::Role;
use crate::relay::{ChatTurn, ModelRegistry, ProviderAdapters};
use crate::relay::provider::Fragment;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

const TITLE_PROMPT: &str = "Generate a short, descriptive title for a conversation that starts with the \
     following message. Reply with the title only, no quotes, no trailing punctuation.";

#[derive(Clone)]
pub struct TitleGenerator {
    registry: Arc<ModelRegistry>,
    adapters: ProviderAdapters,
    store: Arc<dyn ConversationStore>,
    settings: TitleSettings,
    environment: Environment,
}

impl TitleGenerator {
    pub fn new(
        registry: Arc<ModelRegistry>,
        adapters: ProviderAdapters,
        store: Arc<dyn ConversationStore>,
        settings: TitleSettings,
        environment: Environment,
    ) -> Self {
        Self {
            registry,
            adapters,
            store,
            settings,
            environment,
        }
    }

    /// Detach title generation for `conversation_id`. Returns `None` when
    /// titles are disabled.
    pub fn spawn(&self, owner: &str, conversation_id: Uuid, first_message: &str) -> Option<JoinHandle<WriteOutcome>> {
        if !self.settings.enabled {
            return None;
        }
        let generator = self.clone();
        let owner = owner.to_string();
        let first_message = first_message.to_string();
        let span = tracing::info_span!("Generate conversation title.", conversation_id = %conversation_id);

        Some(tokio::spawn(
            async move {
                let outcome = generator.run(&owner, conversation_id, &first_message).await;
                if let Some(error) = &outcome.error {
                    tracing::warn!("Title generation skipped: {}", error);
                }
                outcome
            }
            .instrument(span),
        ))
    }

    async fn run(&self, owner: &str, conversation_id: Uuid, first_message: &str) -> WriteOutcome {
        let title = match self.generate(first_message).await {
            Ok(title) => title,
            Err(error) => {
                return WriteOutcome {
                    success: false,
                    error: Some(error),
                }
            }
        };

        match self.store.rename_conversation(owner, conversation_id, &title).await {
            Ok(true) => {
                tracing::info!(title = %title, "Conversation titled");
                WriteOutcome {
                    success: true,
                    error: None,
                }
            }
            Ok(false) => WriteOutcome {
                success: false,
                error: Some(format!("conversation {} not found", conversation_id)),
            },
            Err(err) => WriteOutcome::from(Err::<(), _>(err)),
        }
    }

    pub async fn generate(&self, first_message: &str) -> Result<String, String> {
        let model = self
            .registry
            .resolve(&self.settings.model_slug)
            .map_err(|err| err.to_string())?;
        if model.provider.is_development_only() && !self.environment.is_development() {
            return Err(format!("{} is only available in development mode.", model.provider.label()));
        }
        let adapter = self
            .adapters
            .get(model.provider)
            .ok_or_else(|| format!("no adapter for {}", model.provider))?;

        let history = [
            ChatTurn::new(Role::System, TITLE_PROMPT),
            ChatTurn::new(Role::User, first_message),
        ];
        let mut stream = adapter
            .stream_completion(model.model_name(), &history)
            .await
            .map_err(|err| err.to_string())?;

        let mut raw = String::new();
        while let Some(fragment) = stream.next().await {
            if let Fragment::Text(text) = fragment.map_err(|err| err.to_string())? {
                raw.push_str(&text);
            }
        }

        clean_title(&raw, self.settings.max_length).ok_or_else(|| "model returned an empty title".to_string())
    }
}

/// First line, surrounding quotes removed, cut to `max_length` characters.
pub fn clean_title(raw: &str, max_length: usize) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let unquoted = line.trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”' | '`')).trim();
    let title: String = unquoted.chars().take(max_length).collect();
    let title = title.trim_end().to_string();
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::ModelSettings;
    use crate::models::{Conversation, DEFAULT_TITLE};
    use crate::relay::provider::{FragmentStream, ProviderAdapter, ProviderError};
    use crate::relay::ProviderKind;
    use crate::services::MemoryConversationStore;
    use async_trait::async_trait;

    struct Fixed(Result<&'static str, ProviderError>);

    #[async_trait]
    impl ProviderAdapter for Fixed {
        async fn stream_completion(&self, _model: &str, history: &[ChatTurn]) -> Result<FragmentStream, ProviderError> {
            assert_eq!(history[0].role, Role::System);
            let text = self.0.clone()?;
            Ok(Box::pin(futures::stream::iter(vec![Ok(Fragment::Text(text.to_string()))])))
        }
    }

    async fn generator(adapter: Fixed) -> (TitleGenerator, Arc<MemoryConversationStore>, Uuid) {
        let registry = ModelRegistry::from_settings(&[ModelSettings {
            id: 2,
            slug: "openai:gpt-4o-mini".into(),
            display_name: "GPT-4o Mini".into(),
        }])
        .unwrap();
        let mut adapters = ProviderAdapters::default();
        adapters.insert(ProviderKind::OpenAi, Arc::new(adapter));

        let store = Arc::new(MemoryConversationStore::new());
        let conversation = Conversation::new(None, "owner".into(), None, None, None);
        let id = conversation.id;
        store.create_conversation(conversation).await.unwrap();

        let generator = TitleGenerator::new(
            Arc::new(registry),
            adapters,
            store.clone(),
            TitleSettings::default(),
            Environment::Production,
        );
        (generator, store, id)
    }

    #[test]
    fn titles_are_unquoted_and_truncated() {
        assert_eq!(clean_title("\"Rust lifetimes\"\n", 40).as_deref(), Some("Rust lifetimes"));
        assert_eq!(clean_title("\n\n  'Hi'  ", 40).as_deref(), Some("Hi"));
        let long = "a".repeat(60);
        assert_eq!(clean_title(&long, 40).map(|t| t.chars().count()), Some(40));
        assert_eq!(clean_title("\"\"", 40), None);
    }

    #[tokio::test]
    async fn spawned_task_renames_conversation() {
        let (generator, store, id) = generator(Fixed(Ok("\"Trip to Lisbon\""))).await;

        let outcome = generator.spawn("owner", id, "Plan a trip to Lisbon").unwrap().await.unwrap();
        assert!(outcome.success);
        let conversation = store.fetch_conversation("owner", id).await.unwrap().unwrap();
        assert_eq!(conversation.title, "Trip to Lisbon");
    }

    #[tokio::test]
    async fn provider_failure_is_swallowed() {
        let (generator, store, id) = generator(Fixed(Err(ProviderError::fatal("Missing OPENAI_API_KEY")))).await;

        let outcome = generator.spawn("owner", id, "hello").unwrap().await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Missing OPENAI_API_KEY"));
        let conversation = store.fetch_conversation("owner", id).await.unwrap().unwrap();
        assert_eq!(conversation.title, DEFAULT_TITLE);
    }
}
