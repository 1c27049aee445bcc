use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Roles that belong in the visible transcript.
    pub fn is_visible(&self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role {other}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Append-only message row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub chat_id: Uuid,
    pub user_id: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub content: String,
    pub model_id: Option<i32>,
    /// For assistant rows: the user message this reply answers.
    pub reply_to: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Which user turn an assistant message answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnRef {
    /// The most recent user message at insertion time.
    #[default]
    Latest,
    /// The nth (zero based) user message of the conversation.
    Ordinal(usize),
}

/// Everything needed to append one message.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub model_id: Option<i32>,
    pub answers: TurnRef,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            model_id: None,
            answers: TurnRef::Latest,
            created_at: None,
        }
    }

    pub fn assistant(content: impl Into<String>, model_id: Option<i32>, answers: TurnRef) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            model_id,
            answers,
            created_at: None,
        }
    }
}

/// Keep user/assistant rows in creation order; ties fall back to the id.
pub fn visible_transcript(mut messages: Vec<Message>) -> Vec<Message> {
    messages.retain(|m| m.role.is_visible());
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    messages
}
