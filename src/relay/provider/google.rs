use super::sse::{ensure_success, fragment_stream_from_sse};
use super::{ChatTurn, Fragment, FragmentStream, ProviderAdapter, ProviderError, Usage};
use crate::models::Role;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Gemini `streamGenerateContent` over SSE.
pub struct GoogleAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

impl GoogleAdapter {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

/// System turns go into `systemInstruction`; assistant turns are `model`.
fn build_request(history: &[ChatTurn]) -> GenerateRequest {
    let mut system = Vec::new();
    let mut contents = Vec::new();
    for turn in history {
        let part = Part {
            text: turn.content.clone(),
        };
        match turn.role {
            Role::System => system.push(part),
            Role::User => contents.push(Content {
                role: Some("user".into()),
                parts: vec![part],
            }),
            Role::Assistant => contents.push(Content {
                role: Some("model".into()),
                parts: vec![part],
            }),
        }
    }
    GenerateRequest {
        contents,
        system_instruction: (!system.is_empty()).then_some(Content {
            role: None,
            parts: system,
        }),
    }
}

fn parse_chunk(data: &str) -> Result<Vec<Fragment>, ProviderError> {
    let chunk: GenerateChunk = serde_json::from_str(data)
        .map_err(|err| ProviderError::fatal(format!("malformed Gemini chunk: {err}")))?;

    let mut fragments = Vec::new();
    for candidate in chunk.candidates {
        let text: String = candidate.content.parts.into_iter().map(|p| p.text).collect();
        if !text.is_empty() {
            fragments.push(Fragment::Text(text));
        }
        if let Some(reason) = candidate.finish_reason {
            fragments.push(Fragment::Finish {
                reason: Some(reason.to_lowercase()),
                usage: None,
            });
        }
    }
    if let Some(usage) = chunk.usage_metadata {
        fragments.push(Fragment::Finish {
            reason: None,
            usage: Some(Usage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
            }),
        });
    }
    Ok(fragments)
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    #[tracing::instrument(name = "Gemini completion.", skip(self, history))]
    async fn stream_completion(&self, model_name: &str, history: &[ChatTurn]) -> Result<FragmentStream, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::fatal("Missing GOOGLE_API_KEY"))?;

        let response = self
            .client
            .post(format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, model_name
            ))
            .header("x-goog-api-key", api_key)
            .json(&build_request(history))
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(fragment_stream_from_sse(response, parse_chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn system_turns_become_instruction() {
        let request = build_request(&[
            ChatTurn::new(Role::System, "be brief"),
            ChatTurn::new(Role::User, "Hi"),
            ChatTurn::new(Role::Assistant, "Hello"),
        ]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
    }

    #[tokio::test]
    async fn streams_candidate_text() {
        let mock_server = MockServer::start().await;
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Bon\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"jour\"}]},\"finishReason\":\"STOP\"}],",
            "\"usageMetadata\":{\"promptTokenCount\":4,\"candidatesTokenCount\":2}}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/models/gemini-pro:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(header("x-goog-api-key", "g-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&mock_server)
            .await;

        let adapter = GoogleAdapter::new(reqwest::Client::new(), mock_server.uri(), Some("g-key".into()));
        let stream = adapter
            .stream_completion("gemini-pro", &[ChatTurn::new(Role::User, "Hi")])
            .await
            .expect("stream");
        let fragments: Vec<Fragment> = stream.map(|f| f.expect("fragment")).collect().await;

        assert_eq!(fragments[0], Fragment::Text("Bon".into()));
        assert_eq!(fragments[1], Fragment::Text("jour".into()));
        assert_eq!(
            fragments[2],
            Fragment::Finish {
                reason: Some("stop".into()),
                usage: None
            }
        );
        assert!(matches!(&fragments[3], Fragment::Finish { usage: Some(u), .. } if u.prompt_tokens == Some(4)));
    }

    #[tokio::test]
    async fn missing_key_is_fatal() {
        let adapter = GoogleAdapter::new(reqwest::Client::new(), "http://127.0.0.1:9".into(), None);
        let err = adapter
            .stream_completion("gemini-pro", &[ChatTurn::new(Role::User, "Hi")])
            .await
            .err()
            .expect("error");
        assert!(!err.retriable);
    }
}
