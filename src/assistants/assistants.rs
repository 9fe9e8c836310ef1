use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    chat::structured_output::FunctionDefinition, client::OpenAiClient, ApiResponseOrError,
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created_at: u64,
    /// The name of the assistant. The maximum length is 256 characters.
    pub name: Option<String>,
    /// ID of the model to use.
    pub model: String,
    /// The system instructions that the assistant uses. The maximum length is 256,000 characters.
    pub instructions: Option<String>,
    #[serde(default)]
    pub tools: Vec<Tool>,
    /// Resources used by the assistant's tools, for example the vector stores
    /// searched by `file_search`.
    pub tool_resources: Option<ToolResources>,
    pub metadata: Option<HashMap<String, String>>,
}

impl Assistant {
    pub fn has_file_search(&self) -> bool {
        self.tools.iter().any(Tool::is_file_search)
    }

    /// The vector store the assistant searches, if a `file_search` tool is
    /// declared and bound to one.
    pub fn file_search_store(&self) -> Option<&str> {
        if !self.has_file_search() {
            return None;
        }
        self.tool_resources
            .as_ref()?
            .file_search
            .as_ref()?
            .vector_store_ids
            .first()
            .map(String::as_str)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
    CodeInterpreter,
    Function {
        function: FunctionDefinition,
    },
    FileSearch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_search: Option<FileSearch>,
    },
}

impl Tool {
    pub fn file_search() -> Self {
        Tool::FileSearch { file_search: None }
    }

    pub fn is_file_search(&self) -> bool {
        matches!(self, Tool::FileSearch { .. })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct FileSearch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_num_results: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ToolResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_interpreter: Option<CodeInterpreterResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_search: Option<FileSearchResources>,
}

impl ToolResources {
    pub fn file_search(vector_store_id: impl Into<String>) -> Self {
        ToolResources {
            code_interpreter: None,
            file_search: Some(FileSearchResources {
                vector_store_ids: vec![vector_store_id.into()],
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct CodeInterpreterResources {
    /// At most 20 files can be made available to the `code_interpreter` tool.
    #[serde(default)]
    pub file_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct FileSearchResources {
    /// At most one vector store can be attached to an assistant.
    #[serde(default)]
    pub vector_store_ids: Vec<String>,
}

#[derive(Serialize, Default, Debug, Clone)]
pub struct CreateAssistantRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_resources: Option<ToolResources>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

/// Partial update of an assistant. Fields left `None` are not touched; a
/// `tools` list replaces the existing one entirely.
#[derive(Serialize, Default, Debug, Clone, PartialEq)]
pub struct ModifyAssistantRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_resources: Option<ToolResources>,
}

impl OpenAiClient {
    pub async fn create_assistant(
        &self,
        request: CreateAssistantRequest,
    ) -> ApiResponseOrError<Assistant> {
        self.post("assistants", request).await
    }

    pub async fn get_assistant(&self, assistant_id: &str) -> ApiResponseOrError<Assistant> {
        self.get(format!("assistants/{assistant_id}")).await
    }

    pub async fn update_assistant(
        &self,
        assistant_id: &str,
        request: ModifyAssistantRequest,
    ) -> ApiResponseOrError<Assistant> {
        self.post(format!("assistants/{assistant_id}"), request)
            .await
    }
}
