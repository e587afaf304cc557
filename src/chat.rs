//! Text chat with the mentor
//!
//! Single-shot `generateContent` calls carrying the full conversation so far.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::live::protocol::{Content, Part};
use crate::{Error, Result};

/// Longest error body quoted in an error message
const MAX_ERROR_BODY: usize = 512;

/// Author of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The student
    User,
    /// The mentor
    Model,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent the turn
    pub role: Role,
    /// Plain text of the turn
    pub text: String,
    /// When the turn was recorded
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a message stamped with the current time
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    fn to_content(&self) -> Content {
        Content {
            role: Some(self.role.as_str().to_string()),
            parts: vec![Part {
                text: Some(self.text.clone()),
                inline_data: None,
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

/// REST client for mentor chat
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
    system_instruction: String,
}

impl ChatClient {
    /// Create a chat client from the loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = SecretString::from(config.require_api_key()?.to_string());
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.chat.endpoint.trim_end_matches('/').to_string(),
            model: config.chat.model.clone(),
            api_key,
            system_instruction: config.system_instruction.clone(),
        })
    }

    /// Model answering this client's requests
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `message` after `history` and return the mentor's reply
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the reply carries no text
    pub async fn send(&self, history: &[ChatMessage], message: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = self.request(history, message);

        tracing::debug!(model = %self.model, turns = body.contents.len(), "sending chat request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "chat request failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            tracing::error!(%status, "chat request rejected");
            return Err(Error::Chat(format!("{status}: {body}")));
        }

        let reply: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Chat(format!("invalid response: {e}")))?;

        reply
            .text()
            .ok_or_else(|| Error::Chat("reply contained no text".to_string()))
    }

    fn request(&self, history: &[ChatMessage], message: &str) -> GenerateContentRequest {
        let mut contents: Vec<Content> = history.iter().map(ChatMessage::to_content).collect();
        contents.push(ChatMessage::new(Role::User, message).to_content());

        GenerateContentRequest {
            system_instruction: Content::text(&self.system_instruction),
            contents,
        }
    }
}

/// Chat history with the mentor
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Start an empty conversation
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Turns so far, oldest first
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Ask the mentor and record both turns once a reply arrives
    ///
    /// History is left untouched on failure.
    ///
    /// # Errors
    ///
    /// Returns error if the chat request fails
    pub async fn ask(&mut self, client: &ChatClient, message: &str) -> Result<String> {
        let reply = client.send(&self.messages, message).await?;
        self.record(message, &reply);
        Ok(reply)
    }

    fn record(&mut self, message: &str, reply: &str) {
        self.messages.push(ChatMessage::new(Role::User, message));
        self.messages.push(ChatMessage::new(Role::Model, reply));
    }
}
