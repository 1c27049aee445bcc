use super::ClientError;
use crate::forms::{ChatRequest, CreateConversation, SaveMessage};
use crate::models::{Conversation, Message};
use crate::relay::{LineDecoder, StreamPart};
use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::pin::Pin;
use uuid::Uuid;

pub type PartStream = Pin<Box<dyn Stream<Item = Result<StreamPart, ClientError>> + Send>>;

/// Everything the chat view needs from the server.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn create_conversation(&self, form: CreateConversation) -> Result<Conversation, ClientError>;

    async fn save_message(&self, conversation_id: Uuid, form: SaveMessage) -> Result<Message, ClientError>;

    async fn load_transcript(&self, conversation_id: Uuid) -> Result<Vec<Message>, ClientError>;

    async fn load_response_set(&self, conversation_id: Uuid, ordinal: usize) -> Result<Vec<Message>, ClientError>;

    /// Pre-stream failures come back as `Err`; anything after the headers
    /// arrives as parts.
    async fn stream_chat(&self, request: ChatRequest) -> Result<PartStream, ClientError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    message: String,
    item: Option<T>,
    list: Option<Vec<T>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// [`ChatBackend`] over the relay's HTTP surface.
#[derive(Clone)]
pub struct HttpChatBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpChatBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header(ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn item<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let envelope = envelope::<T>(check(builder.send().await?).await?).await?;
        envelope
            .item
            .ok_or_else(|| ClientError::Protocol(format!("response carries no item: {}", envelope.message)))
    }

    async fn list<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Vec<T>, ClientError> {
        let envelope = envelope::<T>(check(builder.send().await?).await?).await?;
        Ok(envelope.list.unwrap_or_default())
    }
}

async fn envelope<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>, ClientError> {
    response
        .json::<Envelope<T>>()
        .await
        .map_err(|err| ClientError::Protocol(err.to_string()))
}

/// Turns a non-2xx answer into [`ClientError::Status`] with the server's
/// error text.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or(body);
    tracing::debug!(status = status.as_u16(), "Request rejected: {}", message);
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Decode the line protocol from a streaming body.
fn decode_parts(response: Response) -> PartStream {
    let mut decoder = LineDecoder::new();
    let parts = response
        .bytes_stream()
        .map(move |chunk| match chunk {
            Ok(bytes) => decoder
                .push(&bytes)
                .into_iter()
                .map(|part| part.map_err(|err| ClientError::Protocol(err.to_string())))
                .collect::<Vec<_>>(),
            Err(err) => vec![Err(ClientError::from(err))],
        })
        .flat_map(stream::iter);
    Box::pin(parts)
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn create_conversation(&self, form: CreateConversation) -> Result<Conversation, ClientError> {
        self.item(self.request(Method::POST, "/chat").json(&form)).await
    }

    async fn save_message(&self, conversation_id: Uuid, form: SaveMessage) -> Result<Message, ClientError> {
        let path = format!("/chat/{}/messages", conversation_id);
        self.item(self.request(Method::POST, &path).json(&form)).await
    }

    async fn load_transcript(&self, conversation_id: Uuid) -> Result<Vec<Message>, ClientError> {
        let path = format!("/chat/{}/messages", conversation_id);
        self.list(self.request(Method::GET, &path)).await
    }

    async fn load_response_set(&self, conversation_id: Uuid, ordinal: usize) -> Result<Vec<Message>, ClientError> {
        let path = format!("/chat/{}/turns/{}/responses", conversation_id, ordinal);
        self.list(self.request(Method::GET, &path)).await
    }

    #[tracing::instrument(name = "Stream chat.", skip(self, request), fields(model = %request.model))]
    async fn stream_chat(&self, request: ChatRequest) -> Result<PartStream, ClientError> {
        let response = self
            .request(Method::POST, "/api/chat")
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await?;
        Ok(decode_parts(check(response).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::relay::{ChatTurn, ModelAnnotation};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> HttpChatBackend {
        HttpChatBackend::new(reqwest::Client::new(), format!("{}/", server.uri()), Some("secret".into()))
    }

    fn chat_request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatTurn::new(Role::User, "Hi")],
            model: "openai:gpt-4o-mini".into(),
            model_id: None,
            id: None,
            turn: None,
        }
    }

    #[tokio::test]
    async fn stream_is_decoded_into_parts() {
        let server = MockServer::start().await;
        let body = [
            StreamPart::Text("Hel".into()).encode(),
            StreamPart::Text("lo".into()).encode(),
            StreamPart::Annotation(ModelAnnotation {
                model_name: "openai:gpt-4o-mini".into(),
                model_id: 1,
                message_id: Some(9),
            })
            .encode(),
            StreamPart::finish("stop").encode(),
        ]
        .concat();
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let parts: Vec<_> = backend(&server).stream_chat(chat_request()).await.unwrap().collect().await;
        let parts: Vec<StreamPart> = parts.into_iter().map(Result::unwrap).collect();

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], StreamPart::Text("Hel".into()));
        assert!(matches!(&parts[2], StreamPart::Annotation(a) if a.message_id == Some(9)));
    }

    #[tokio::test]
    async fn pre_stream_error_keeps_status_and_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(serde_json::json!({"error": "LM Studio is only available in development mode."})),
            )
            .mount(&server)
            .await;

        let err = backend(&server).stream_chat(chat_request()).await.err().unwrap();
        assert_eq!(
            err,
            ClientError::Status {
                status: 403,
                message: "LM Studio is only available in development mode.".into()
            }
        );
    }

    #[tokio::test]
    async fn list_envelope_is_unwrapped() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        let body = serde_json::json!({
            "message": "OK",
            "list": [{
                "id": 3,
                "chatId": id,
                "userId": "u",
                "role": "assistant",
                "content": "hello",
                "modelId": 1,
                "replyTo": 2,
                "createdAt": "2024-05-01T10:00:00Z"
            }]
        });
        Mock::given(method("GET"))
            .and(path(format!("/chat/{}/turns/0/responses", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let set = backend(&server).load_response_set(id, 0).await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].role, Role::Assistant);
        assert_eq!(set[0].reply_to, Some(2));
    }

    #[tokio::test]
    async fn missing_conversation_is_a_status_error() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path(format!("/chat/{}/messages", id)))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not found"})))
            .mount(&server)
            .await;

        let err = backend(&server).load_transcript(id).await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 404, .. }));
    }
}
