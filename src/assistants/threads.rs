use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{assistants::ToolResources, client::OpenAiClient, ApiResponseOrError};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created_at: u64,
    /// A set of resources that are made available to the assistant's tools in this thread.
    pub tool_resources: Option<ToolResources>,
    pub metadata: Option<HashMap<String, String>>,
}

impl Thread {
    pub fn new(id: impl Into<String>) -> Self {
        Thread {
            id: id.into(),
            object: "thread".to_string(),
            created_at: 0,
            tool_resources: None,
            metadata: None,
        }
    }
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct CreateThreadRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_resources: Option<ToolResources>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl OpenAiClient {
    pub async fn create_thread(&self, request: CreateThreadRequest) -> ApiResponseOrError<Thread> {
        self.post("threads", request).await
    }

    pub async fn get_thread(&self, thread_id: &str) -> ApiResponseOrError<Thread> {
        self.get(format!("threads/{thread_id}")).await
    }
}
