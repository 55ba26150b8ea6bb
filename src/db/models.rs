use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extracted content stored alongside a book.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ProcessedText {
    pub text: String,
    pub pages: u32,
    #[serde(default)]
    pub info: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub pdf_url: Option<String>,
    pub processed_text: ProcessedText,
    pub total_pages: u32,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub book_id: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Summary {
    pub id: String,
    pub book_id: String,
    pub page_start: i64,
    pub page_end: i64,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    pub created_at: String,
}

/// Fields needed to insert a book row.
#[derive(Debug, Clone)]
pub struct NewBook<'a> {
    pub title: &'a str,
    pub processed_text: &'a ProcessedText,
    pub total_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("system"), None);
    }

    #[test]
    fn test_message_omits_missing_audio() {
        let msg = Message {
            id: "m".into(),
            conversation_id: "c".into(),
            role: Role::User,
            content: "hi".into(),
            audio_url: None,
            created_at: "now".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("audio_url").is_none());
        assert_eq!(value["role"], "user");
    }
}
