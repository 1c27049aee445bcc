//! Stream relay
//!
//! Opens a provider stream, forwards fragments to the HTTP body and persists
//! the full reply once the provider finishes.
//!
//! The pump reads the provider at its own pace into an unbounded backlog; a
//! forwarder drains the backlog into the bounded body channel as fast as the
//! client reads. Persistence therefore never waits on the client. Dropping
//! the receiving side before the provider finished counts as a stop: the
//! upstream stream is dropped and nothing is saved.

use super::errors::RelayError;
use super::protocol::{ModelAnnotation, StreamPart};
use super::provider::{ChatTurn, Fragment, FragmentStream, ProviderAdapters, ProviderError};
use super::registry::{ModelDescriptor, ModelRegistry, ProviderKind};
use crate::configuration::{Environment, RelaySettings};
use crate::models::{Message, NewMessage, TurnRef};
use crate::services::{ConversationStore, StoreError};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct RelayRequest {
    pub history: Vec<ChatTurn>,
    pub model: String,
    /// Set when the request came in on a provider-specific route.
    pub provider: Option<ProviderKind>,
    /// Without a conversation the reply is streamed but not saved.
    pub conversation_id: Option<Uuid>,
    pub turn: TurnRef,
}

/// How one relayed generation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    Persisted(Message),
    /// Completed with no conversation to save into.
    Completed(String),
    Unsaved { text: String, error: StoreError },
    Cancelled { partial: String },
    Interrupted { partial: String, error: ProviderError },
}

pub struct RelayHandle {
    pub model: ModelDescriptor,
    pub parts: ReceiverStream<StreamPart>,
    pub completion: JoinHandle<RelayOutcome>,
}

#[derive(Clone)]
pub struct StreamRelay {
    registry: Arc<ModelRegistry>,
    adapters: ProviderAdapters,
    store: Arc<dyn ConversationStore>,
    settings: RelaySettings,
    environment: Environment,
}

impl StreamRelay {
    pub fn new(
        registry: Arc<ModelRegistry>,
        adapters: ProviderAdapters,
        store: Arc<dyn ConversationStore>,
        settings: RelaySettings,
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

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Slug lookup plus the route and environment checks.
    pub fn resolve(&self, slug: &str, provider: Option<ProviderKind>) -> Result<&ModelDescriptor, RelayError> {
        let model = self.registry.resolve(slug)?;
        if provider.is_some_and(|kind| kind != model.provider) {
            return Err(RelayError::UnsupportedProvider(slug.to_string()));
        }
        if model.provider.is_development_only() && !self.environment.is_development() {
            return Err(RelayError::DevelopmentOnly(model.provider.label().to_string()));
        }
        Ok(model)
    }

    /// Errors returned here happened before any fragment; the caller maps
    /// them to an HTTP status.
    #[tracing::instrument(name = "Open relay stream.", skip(self, request), fields(model = %request.model))]
    pub async fn open(&self, owner: &str, request: RelayRequest) -> Result<RelayHandle, RelayError> {
        let model = self.resolve(&request.model, request.provider)?.clone();
        let adapter = self
            .adapters
            .get(model.provider)
            .ok_or_else(|| RelayError::UnsupportedProvider(model.slug.clone()))?;
        let turn = match request.conversation_id {
            Some(conversation_id) => self.check_target(owner, conversation_id, request.turn).await?,
            None => request.turn,
        };

        let wait = self.settings.first_fragment_timeout_secs;
        let opened = tokio::time::timeout(Duration::from_secs(wait), async {
            let mut stream = adapter.stream_completion(model.model_name(), &request.history).await?;
            let first = stream.next().await;
            Ok::<_, ProviderError>((stream, first))
        })
        .await;

        let (stream, first) = match opened {
            Err(_) => {
                tracing::warn!("No fragment from {} within {}s", model.slug, wait);
                return Err(RelayError::UpstreamUnavailable(ProviderError::transient(format!(
                    "no response within {}s",
                    wait
                ))));
            }
            Ok(Err(err)) | Ok(Ok((_, Some(Err(err))))) => {
                tracing::error!("Provider {} failed before streaming: {}", model.provider, err);
                return Err(RelayError::UpstreamUnavailable(err));
            }
            Ok(Ok((stream, Some(Ok(fragment))))) => (stream, Some(fragment)),
            Ok(Ok((stream, None))) => (stream, None),
        };

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let (backlog, queued) = mpsc::unbounded_channel();
        let span = tracing::info_span!("Relay pump.", model = %model.slug, conversation_id = ?request.conversation_id);
        let job = Job {
            owner: owner.to_string(),
            model: model.clone(),
            conversation_id: request.conversation_id,
            turn,
        };
        tokio::spawn(forward(queued, tx.clone()).instrument(span.clone()));
        let completion = tokio::spawn(self.clone().pump(job, first, stream, backlog, tx).instrument(span));

        Ok(RelayHandle {
            model,
            parts: ReceiverStream::new(rx),
            completion,
        })
    }

    /// The reply must have somewhere to land before anything is streamed.
    /// `Latest` is pinned to the user turn that exists now, so a message
    /// saved while the reply streams does not take it over.
    async fn check_target(&self, owner: &str, conversation_id: Uuid, turn: TurnRef) -> Result<TurnRef, RelayError> {
        if self.store.fetch_conversation(owner, conversation_id).await?.is_none() {
            return Err(RelayError::ConversationNotFound(conversation_id));
        }
        let user_turns = self.store.user_turn_count(owner, conversation_id).await?;
        match turn {
            TurnRef::Ordinal(ordinal) if ordinal >= user_turns => Err(StoreError::TurnNotFound(ordinal).into()),
            TurnRef::Latest if user_turns > 0 => Ok(TurnRef::Ordinal(user_turns - 1)),
            turn => Ok(turn),
        }
    }

    async fn pump(
        self,
        job: Job,
        first: Option<Fragment>,
        mut stream: FragmentStream,
        parts: mpsc::UnboundedSender<StreamPart>,
        // only watched for the client going away
        client: mpsc::Sender<StreamPart>,
    ) -> RelayOutcome {
        let mut text = String::new();
        let mut finish_reason: Option<String> = None;
        let mut pending = first;

        loop {
            let next = match pending.take() {
                Some(fragment) => Some(Ok(fragment)),
                None => tokio::select! {
                    biased;
                    item = stream.next() => item,
                    _ = client.closed() => {
                        tracing::info!(received = text.len(), "Client stopped reading, dropping upstream stream");
                        return RelayOutcome::Cancelled { partial: text };
                    }
                },
            };

            match next {
                Some(Ok(Fragment::Text(delta))) => {
                    text.push_str(&delta);
                    let _ = parts.send(StreamPart::Text(delta));
                }
                Some(Ok(Fragment::Finish { reason, usage })) => {
                    if let Some(usage) = usage {
                        tracing::info!(
                            prompt_tokens = ?usage.prompt_tokens,
                            completion_tokens = ?usage.completion_tokens,
                            "Token usage"
                        );
                    }
                    if reason.is_some() {
                        finish_reason = reason;
                    }
                }
                Some(Err(err)) => {
                    tracing::error!(received = text.len(), "Stream interrupted: {}", err);
                    let message = RelayError::StreamInterrupted(err.clone()).to_string();
                    let _ = parts.send(StreamPart::Error(message));
                    return RelayOutcome::Interrupted { partial: text, error: err };
                }
                None => break,
            }
        }
        drop(stream);

        // natural completion is saved whether or not anyone is still reading
        let outcome = match job.conversation_id {
            Some(conversation_id) => match self.persist(&job, conversation_id, &text).await {
                Ok(message) => RelayOutcome::Persisted(message),
                Err(error) => RelayOutcome::Unsaved { text, error },
            },
            None => RelayOutcome::Completed(text),
        };

        let message_id = match &outcome {
            RelayOutcome::Persisted(message) => Some(message.id),
            _ => None,
        };
        let _ = parts.send(StreamPart::Annotation(ModelAnnotation {
            model_name: job.model.slug.clone(),
            model_id: job.model.id,
            message_id,
        }));
        if let RelayOutcome::Unsaved { error, .. } = &outcome {
            let message = RelayError::PersistenceFailure(error.clone()).to_string();
            let _ = parts.send(StreamPart::Error(message));
        }
        let _ = parts.send(StreamPart::finish(finish_reason.unwrap_or_else(|| "stop".to_string())));

        outcome
    }

    /// Database errors are retried with linear backoff; a missing
    /// conversation or turn is not.
    async fn persist(&self, job: &Job, conversation_id: Uuid, text: &str) -> Result<Message, StoreError> {
        let attempts = self.settings.save_attempts.max(1);
        let mut last_error = StoreError::Database("no save attempted".to_string());

        for attempt in 1..=attempts {
            let message = NewMessage::assistant(text, Some(job.model.id), job.turn);
            match self.store.append_message(&job.owner, conversation_id, message).await {
                Ok(saved) => {
                    tracing::info!(message_id = saved.id, attempt, "Assistant reply saved");
                    return Ok(saved);
                }
                Err(err @ StoreError::Database(_)) => {
                    tracing::warn!(attempt, "Saving assistant reply failed: {}", err);
                    last_error = err;
                    if attempt < attempts {
                        let backoff = self.settings.save_backoff_ms * u64::from(attempt);
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
                Err(err) => {
                    tracing::error!("Assistant reply rejected by store: {}", err);
                    return Err(err);
                }
            }
        }

        tracing::error!("Giving up on saving assistant reply after {} attempts", attempts);
        Err(last_error)
    }
}

/// Moves queued parts into the body channel at the client's pace.
async fn forward(mut queued: mpsc::UnboundedReceiver<StreamPart>, tx: mpsc::Sender<StreamPart>) {
    while let Some(part) = queued.recv().await {
        if tx.send(part).await.is_err() {
            tracing::debug!("Body channel closed, discarding queued parts");
            break;
        }
    }
}

struct Job {
    owner: String,
    model: ModelDescriptor,
    conversation_id: Option<Uuid>,
    turn: TurnRef,
}
