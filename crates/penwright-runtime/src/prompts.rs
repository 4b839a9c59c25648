//! Prompt assembly for article generation.
//!
//! The system prompt fixes the output contract (one JSON object carrying
//! the required payload field). The user prompt carries only the topic.

use crate::providers::ChatMessage;

/// System prompt; `{field}` is replaced with the required payload field.
pub const ARTICLE_SYSTEM_PROMPT: &str = r#"You write complete, publishable blog articles.

Respond with a single JSON object and nothing else:
{
  "title": "string",
  "{field}": "string (the full article body as HTML)",
  "metaDescription": "string (at most 160 characters)",
  "tags": ["string"]
}
"#;

/// Build the system prompt for `required_field`.
pub fn system_prompt(required_field: &str) -> String {
    ARTICLE_SYSTEM_PROMPT.replace("{field}", required_field)
}

/// Build the user prompt for `topic`.
pub fn user_prompt(topic: &str) -> String {
    format!("Write an article about: {}", topic.trim())
}

/// Messages for one article generation call.
pub fn article_messages(topic: &str, required_field: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(required_field)),
        ChatMessage::user(user_prompt(topic)),
    ]
}
