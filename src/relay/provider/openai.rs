use super::sse::{ensure_success, fragment_stream_from_sse};
use super::{ChatTurn, Fragment, FragmentStream, ProviderAdapter, ProviderError, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// `/chat/completions` streaming client. Serves OpenAI itself and any
/// compatible local server (LM Studio).
pub struct OpenAiCompatibleAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    /// Hosted endpoints need a key and report usage on request.
    hosted: bool,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChunkUsage>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

impl OpenAiCompatibleAdapter {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>, hosted: bool) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            hosted,
        }
    }
}

pub(crate) fn parse_chunk(data: &str) -> Result<Vec<Fragment>, ProviderError> {
    if data.trim() == "[DONE]" {
        return Ok(vec![]);
    }
    let chunk: CompletionChunk = serde_json::from_str(data)
        .map_err(|err| ProviderError::fatal(format!("malformed completion chunk: {err}")))?;

    let mut fragments = Vec::new();
    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            fragments.push(Fragment::Text(text));
        }
        if choice.finish_reason.is_some() {
            fragments.push(Fragment::Finish {
                reason: choice.finish_reason,
                usage: None,
            });
        }
    }
    if let Some(usage) = chunk.usage {
        fragments.push(Fragment::Finish {
            reason: None,
            usage: Some(Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            }),
        });
    }
    Ok(fragments)
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    #[tracing::instrument(name = "OpenAI-compatible completion.", skip(self, history), fields(base_url = %self.base_url))]
    async fn stream_completion(&self, model_name: &str, history: &[ChatTurn]) -> Result<FragmentStream, ProviderError> {
        if self.hosted && self.api_key.is_none() {
            return Err(ProviderError::fatal("Missing OPENAI_API_KEY"));
        }

        let body = CompletionRequest {
            model: model_name,
            messages: history,
            stream: true,
            stream_options: self.hosted.then_some(StreamOptions { include_usage: true }),
        };

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = ensure_success(request.send().await?).await?;
        Ok(fragment_stream_from_sse(response, parse_chunk))
    }
}
