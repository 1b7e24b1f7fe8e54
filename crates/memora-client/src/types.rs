//! Wire types for the workflow-automation webhook API.
//!
//! The backend stores everything; these are the request/response shapes it
//! exchanges with the client.

use serde::{Deserialize, Serialize};

/// The dementia patient being helped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A family member or friend the patient needs to recognize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<i64>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub relationship: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_topics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub important_memories: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Person {
    /// Build the context block fed to the conversation-starter endpoint.
    pub fn conversation_context(&self) -> String {
        let mut context = format!("Name: {}\n", self.name);
        if let Some(nickname) = &self.nickname {
            context.push_str(&format!("Nickname: {nickname}\n"));
        }
        context.push_str(&format!("Relationship: {}\n", self.relationship));
        if let Some(details) = &self.details {
            context.push_str(&format!("About: {details}\n"));
        }
        if let Some(topics) = &self.conversation_topics {
            if !topics.is_empty() {
                context.push_str(&format!("Topics: {}\n", topics.join(", ")));
            }
        }
        if let Some(memories) = &self.important_memories {
            context.push_str(&format!("Memories: {memories}\n"));
        }
        context
    }
}

/// Generic `{success, data}` envelope from the `/api` endpoint.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
}

/// How sure the recognition backend is about a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Response from the recognition endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RecognizeResponse {
    pub matched: bool,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub person: Option<Person>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RecognizeResponse {
    pub(crate) fn no_match(message: &str) -> Self {
        Self {
            matched: false,
            confidence: None,
            person: None,
            message: Some(message.to_string()),
        }
    }
}
