//! External collaborators
//!
//! Interfaces to services outside the orchestrator:
//! - [`DocumentExtractor`] turns non-HTML responses (PDF, office files) into text
//! - [`AssistantClient`] answers a job's custom instructions for each page
//!
//! Neither has a concrete implementation here; callers inject their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Text and structure recovered from a binary document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub text: String,
    pub structured_data: serde_json::Value,
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extracts content from raw bytes of the declared MIME type
    async fn extract(&self, bytes: &[u8], declared_type: &str) -> Result<ExtractedDocument, String>;

    /// Returns true if this extractor understands the MIME type
    fn supports(&self, content_type: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub content: String,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait AssistantClient: Send + Sync {
    /// Produces the next assistant turn for a transcript
    ///
    /// `context` carries extra grounding text, such as the page URL.
    async fn reply(
        &self,
        transcript: &[ChatMessage],
        context: Option<&str>,
    ) -> Result<AssistantReply, String>;
}

/// Builds the transcript sent for one page: instructions, then page text
pub fn page_transcript(instructions: &str, page_text: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(instructions), ChatMessage::user(page_text)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_transcript() {
        let transcript = page_transcript("Summarize", "Page body");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, ChatRole::System);
        assert_eq!(transcript[0].content, "Summarize");
        assert_eq!(transcript[1].role, ChatRole::User);
        assert_eq!(transcript[1].content, "Page body");
    }

    #[test]
    fn test_chat_role_serialization() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}
