//! Contracts for the AI collaborators
//!
//! The editor talks to three HTTP services it does not implement: an AI
//! edit endpoint, an agent search endpoint and an AI chat endpoint. This
//! module fixes their JSON shapes and the traits a host implements to
//! reach them.

use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

/// Kind of rewrite requested for a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    Grammar,
    Shorten,
    Lengthen,
    Rewrite,
    Table,
    Custom,
}

impl EditMode {
    /// System prompt the edit collaborator uses for this mode
    pub fn system_prompt(&self) -> &'static str {
        match self {
            EditMode::Grammar => "You improve clarity and fix grammar without changing meaning.",
            EditMode::Shorten => "You shorten the text while preserving core meaning.",
            EditMode::Lengthen => "You expand the text with concise, relevant detail.",
            EditMode::Rewrite => "You rewrite clearly and professionally.",
            EditMode::Table => {
                "Convert the selection into a concise Markdown table (no extra commentary)."
            }
            EditMode::Custom => "You are a helpful editing assistant.",
        }
    }

    /// Toolbar label
    pub fn label(&self) -> &'static str {
        match self {
            EditMode::Grammar => "Fix",
            EditMode::Shorten => "Shorten",
            EditMode::Lengthen => "Lengthen",
            EditMode::Rewrite => "Rewrite",
            EditMode::Table => "To Table",
            EditMode::Custom => "Custom",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssistError {
    /// The request is unusable and was not sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The collaborator answered with an error
    #[error("assistant error: {0}")]
    Rejected(String),

    /// The collaborator could not be reached
    #[error("assistant unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiEditRequest {
    pub mode: EditMode,
    pub selection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

impl AiEditRequest {
    pub fn new(mode: EditMode, selection: impl Into<String>, instruction: Option<String>) -> Self {
        Self {
            mode,
            selection: selection.into(),
            instruction,
        }
    }

    pub fn validate(&self) -> Result<(), AssistError> {
        if self.selection.trim().is_empty() {
            return Err(AssistError::InvalidRequest("No selection provided".into()));
        }
        if self.mode == EditMode::Custom
            && self.instruction.as_deref().map_or(true, |i| i.trim().is_empty())
        {
            return Err(AssistError::InvalidRequest(
                "custom edits need an instruction".into(),
            ));
        }
        Ok(())
    }

    /// Request body as posted to the edit endpoint: `{"edit": {...}}`
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({ "edit": self })
    }

    /// User message for the model
    pub fn user_prompt(&self) -> String {
        match &self.instruction {
            Some(instruction) => format!("{}\n\n{}", instruction.trim(), self.selection),
            None => self.selection.clone(),
        }
    }
}

/// `{suggestion}` on success, `{error}` on failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AiEditResponse {
    Suggestion { suggestion: String },
    Error { error: String },
}

impl AiEditResponse {
    pub fn into_result(self) -> Result<String, AssistError> {
        match self {
            AiEditResponse::Suggestion { suggestion } => Ok(suggestion),
            AiEditResponse::Error { error } => Err(AssistError::Rejected(error)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentResponse {
    Summary { summary: String },
    Error { error: String },
}

impl AgentResponse {
    pub fn into_result(self) -> Result<String, AssistError> {
        match self {
            AgentResponse::Summary { summary } => Ok(summary),
            AgentResponse::Error { error } => Err(AssistError::Rejected(error)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub text: Option<String>,
}

impl ChatResponse {
    /// Reply text, with the chat sidebar's fallback for empty answers
    pub fn text_or_default(&self) -> &str {
        self.text.as_deref().unwrap_or("No response")
    }
}

/// A line typed into the chat sidebar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    /// Regular chat message
    Message(String),
    /// `/agent <query>`: run a web search instead
    Agent(String),
}

impl ChatInput {
    /// `None` for blank input
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        match input.strip_prefix("/agent") {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
                let query = rest.trim();
                (!query.is_empty()).then(|| ChatInput::Agent(query.to_string()))
            }
            _ => Some(ChatInput::Message(input.to_string())),
        }
    }
}

/// AI edit collaborator
pub trait EditAssistant {
    fn suggest(
        &self,
        request: &AiEditRequest,
    ) -> impl Future<Output = Result<String, AssistError>> + Send;
}

/// Agent search collaborator
pub trait SearchAgent {
    fn search(&self, query: &str) -> impl Future<Output = Result<String, AssistError>> + Send;
}

/// AI chat collaborator
pub trait ChatAssistant {
    fn chat(
        &self,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<ChatResponse, AssistError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_request_body() {
        let request = AiEditRequest::new(EditMode::Shorten, "a long sentence", None);
        assert_eq!(
            request.to_body(),
            serde_json::json!({ "edit": { "mode": "shorten", "selection": "a long sentence" } })
        );
        request.validate().unwrap();
    }

    #[test]
    fn test_edit_request_validation() {
        assert!(AiEditRequest::new(EditMode::Rewrite, "  ", None)
            .validate()
            .is_err());
        assert!(AiEditRequest::new(EditMode::Custom, "text", None)
            .validate()
            .is_err());
        let custom = AiEditRequest::new(EditMode::Custom, "text", Some("Make it rhyme".into()));
        custom.validate().unwrap();
        assert_eq!(custom.user_prompt(), "Make it rhyme\n\ntext");
    }

    #[test]
    fn test_responses() {
        let ok: AiEditResponse = serde_json::from_str(r#"{"suggestion":"Short."}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), "Short.");

        let err: AiEditResponse = serde_json::from_str(r#"{"error":"No selection provided"}"#).unwrap();
        assert_eq!(
            err.into_result(),
            Err(AssistError::Rejected("No selection provided".into()))
        );

        let agent: AgentResponse = serde_json::from_str(r#"{"summary":"- fact"}"#).unwrap();
        assert_eq!(agent.into_result().unwrap(), "- fact");

        let chat: ChatResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(chat.text_or_default(), "No response");
    }

    #[test]
    fn test_chat_messages_serialize_lowercase_roles() {
        let request = ChatRequest {
            messages: vec![ChatMessage {
                role: Role::User,
                content: "hi".into(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({ "messages": [{ "role": "user", "content": "hi" }] })
        );
    }

    #[test]
    fn test_chat_input_parse() {
        assert_eq!(ChatInput::parse("   "), None);
        assert_eq!(
            ChatInput::parse("/agent rust crdt papers"),
            Some(ChatInput::Agent("rust crdt papers".into()))
        );
        assert_eq!(ChatInput::parse("/agent"), None);
        assert_eq!(
            ChatInput::parse("/agentive"),
            Some(ChatInput::Message("/agentive".into()))
        );
        assert_eq!(
            ChatInput::parse("hello"),
            Some(ChatInput::Message("hello".into()))
        );
    }

    #[test]
    fn test_modes() {
        assert_eq!(EditMode::Table.label(), "To Table");
        assert!(EditMode::Grammar.system_prompt().contains("grammar"));
        let mode: EditMode = serde_json::from_str("\"lengthen\"").unwrap();
        assert_eq!(mode, EditMode::Lengthen);
    }
}
