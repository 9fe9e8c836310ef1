use crate::{
    client::{OpenAiClient, Order},
    ApiResponseOrError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created_at: u64,
    /// The thread ID that this message belongs to.
    pub thread_id: String,
    /// The entity that produced the message.
    pub role: Role,
    /// The content of the message.
    pub content: Vec<Content>,
    /// The assistant that produced the message.
    pub assistant_id: Option<String>,
    /// Null when the message was created manually rather than by a run.
    pub run_id: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl Message {
    /// The first text segment of the message, which is where the assistant
    /// puts its answer.
    pub fn first_text(&self) -> Option<&Text> {
        self.content.iter().find_map(|content| match content {
            Content::Text { text } => Some(text),
            _ => None,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text { text: Text },
    ImageFile { image_file: ImageFile },
    ImageUrl { image_url: ImageUrl },
    Refusal { refusal: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Text {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Text {
    /// File ids cited by `file_citation` annotations, in order of appearance.
    pub fn cited_file_ids(&self) -> impl Iterator<Item = &str> {
        self.annotations
            .iter()
            .filter_map(|annotation| annotation.file_citation.as_ref())
            .map(|citation| citation.file_id.as_str())
    }
}

/// A marker inside the text pointing at a source document, such as
/// `【4:0†facts.docx】`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub kind: String,
    /// The marker text as it appears in the message.
    pub text: String,
    pub start_index: u32,
    pub end_index: u32,
    #[serde(default)]
    pub file_citation: Option<FileCitation>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FileCitation {
    pub file_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageFile {
    pub file_id: String,
    pub detail: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CreateMessageRequest {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl CreateMessageRequest {
    pub fn user(content: impl Into<String>) -> Self {
        CreateMessageRequest {
            role: Role::User,
            content: content.into(),
            metadata: None,
        }
    }
}

impl OpenAiClient {
    pub async fn create_message(
        &self,
        thread_id: &str,
        request: CreateMessageRequest,
    ) -> ApiResponseOrError<Message> {
        self.post(format!("threads/{thread_id}/messages"), request)
            .await
    }

    /// Lists up to `limit` messages of a thread, most recent first.
    pub async fn list_messages(
        &self,
        thread_id: &str,
        limit: u32,
    ) -> ApiResponseOrError<Vec<Message>> {
        let page = self
            .list(format!("threads/{thread_id}/messages"), Order::Desc, limit)
            .await?;
        Ok(page.data)
    }
}
