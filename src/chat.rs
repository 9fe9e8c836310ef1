//! Given a chat conversation, the model will return a chat completion response.
//!
//! Only the non-streaming subset is modelled: the relay uses completions for
//! forced structured judgments, never for free-form chatting.
pub mod structured_output;

use crate::{client::OpenAiClient, ApiResponseOrError, Usage};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use structured_output::{FunctionDefinition, ResponseFormatJsonSchema};

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Option<Usage>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ChatCompletionChoice {
    pub index: u64,
    pub finish_reason: Option<String>,
    pub message: ChatCompletionMessage,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct ChatCompletionMessage {
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    /// Tool calls the model asks the caller to perform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageDetail {
    #[default]
    Auto,
    High,
    Low,
}

#[derive(Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
pub struct ImageUrl {
    /// Either a URL of the image or the base64 encoded image data.
    pub url: String,
    pub detail: ImageDetail,
}

#[derive(Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Parts(Vec<UserContentPart>),
}

impl From<String> for UserContent {
    fn from(value: String) -> Self {
        UserContent::Text(value)
    }
}

impl From<&str> for UserContent {
    fn from(value: &str) -> Self {
        UserContent::Text(value.to_string())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: UserContent,
    },
    Assistant(ChatCompletionMessage),
    Tool {
        content: String,
        tool_call_id: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<UserContent>) -> Self {
        ChatMessage::User {
            content: content.into(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[default]
    Function,
}

/// A function call requested by the model, either inside a chat completion
/// or by a run waiting in `requires_action`.
#[derive(Deserialize, Serialize, Clone, Debug, Eq, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: ToolKind,
    pub function: ToolCallFunction,
}

#[derive(Deserialize, Serialize, Clone, Debug, Eq, PartialEq)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON-encoded arguments as generated by the model. Not guaranteed to be valid JSON.
    pub arguments: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatCompletionTool {
    Function { function: FunctionDefinition },
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoiceMode {
    None,
    Auto,
    Required,
}

#[derive(Deserialize, Serialize, Clone, Debug, Eq, PartialEq)]
pub struct FunctionChoice {
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Eq, PartialEq)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(ToolChoiceMode),
    /// Forces the model to call the named function.
    Function {
        #[serde(rename = "type")]
        kind: ToolKind,
        function: FunctionChoice,
    },
}

impl ToolChoice {
    pub fn function(name: impl Into<String>) -> Self {
        ToolChoice::Function {
            kind: ToolKind::Function,
            function: FunctionChoice { name: name.into() },
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatCompletionResponseFormat {
    Text,
    JsonObject,
    JsonSchema { json_schema: ResponseFormatJsonSchema },
}

impl ChatCompletionResponseFormat {
    pub fn json_schema<T: schemars::JsonSchema>(strict: bool) -> Self {
        ChatCompletionResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema::new::<T>(strict),
        }
    }
}

#[derive(Serialize, Builder, Debug, Clone, PartialEq)]
#[builder(pattern = "owned")]
#[builder(name = "ChatCompletionBuilder")]
#[builder(setter(strip_option, into))]
pub struct ChatCompletionRequest {
    /// ID of the model to use.
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature between 0 and 2.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatCompletionTool>>,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ChatCompletionResponseFormat>,
}

impl ChatCompletionRequest {
    pub fn builder(model: &str, messages: impl Into<Vec<ChatMessage>>) -> ChatCompletionBuilder {
        ChatCompletionBuilder::create_empty()
            .model(model)
            .messages(messages)
    }
}

impl ChatCompletion {
    pub fn first_message(&self) -> Option<&ChatCompletionMessage> {
        self.choices.first().map(|choice| &choice.message)
    }

    pub fn first_tool_call(&self) -> Option<&ToolCall> {
        self.first_message()?.tool_calls.as_ref()?.first()
    }
}

impl OpenAiClient {
    pub async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> ApiResponseOrError<ChatCompletion> {
        self.post("chat/completions", request).await
    }
}
