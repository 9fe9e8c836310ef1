//! Judges whether a value the assistant extracted really describes the user.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::{
    api::AssistantApi,
    chat::{
        structured_output::FunctionDefinition, ChatCompletionRequest, ChatCompletionTool,
        ChatMessage, ToolChoice,
    },
    error::Result,
};

const VALIDATE_FUNCTION: &str = "validate_value";

const JUDGE_PROMPT: &str = "You are an AI that validates user-selected values from the context. \
If the value is a real interest or preference of the user, return `validation_result` as `true`. \
If the value is incorrectly highlighted or irrelevant, return `validation_result` as `false`.";

#[async_trait]
pub trait ValueValidator: Send + Sync {
    /// `true` only when the candidate is a genuine fact about the user given
    /// the conversational context. Failures of any kind answer `false`.
    async fn validate(&self, context: &str, candidate: &str) -> bool;
}

/// Validation of the user's selected value from the context.
#[derive(Debug, Deserialize, JsonSchema)]
struct ValidateValue {
    value: SelectedValue,
}

/// The user's selected value from the context with its validation result.
#[derive(Debug, Deserialize, JsonSchema)]
struct SelectedValue {
    /// The value text to validate.
    #[allow(dead_code)]
    value_text: String,
    /// Validation result.
    validation_result: Verdict,
}

#[derive(Debug, Deserialize, JsonSchema, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum Verdict {
    True,
    False,
}

/// Asks a chat model for the judgment through a forced function call, so the
/// answer is a schema field rather than prose.
pub struct ModelValueValidator {
    api: Arc<dyn AssistantApi>,
    model: String,
}

impl ModelValueValidator {
    pub fn new(api: Arc<dyn AssistantApi>, model: impl Into<String>) -> Self {
        Self {
            api,
            model: model.into(),
        }
    }

    fn request(&self, context: &str, candidate: &str) -> Result<ChatCompletionRequest> {
        let messages = vec![
            ChatMessage::system(JUDGE_PROMPT),
            ChatMessage::user(context),
            ChatMessage::system(format!(
                "Can this value `{candidate}` be true for the user or is it just a context?"
            )),
        ];
        let judge = FunctionDefinition::from_schema::<ValidateValue>(VALIDATE_FUNCTION, true);
        Ok(ChatCompletionRequest::builder(&self.model, messages)
            .temperature(0.3_f32)
            .tools(vec![ChatCompletionTool::Function { function: judge }])
            .tool_choice(ToolChoice::function(VALIDATE_FUNCTION))
            .build()?)
    }

    /// `None` when the model did not fill the judgment field.
    async fn judge(&self, context: &str, candidate: &str) -> Result<Option<Verdict>> {
        let completion = self
            .api
            .create_chat_completion(self.request(context, candidate)?)
            .await?;
        let Some(call) = completion.first_tool_call() else {
            return Ok(None);
        };
        if call.function.name != VALIDATE_FUNCTION {
            return Ok(None);
        }
        Ok(serde_json::from_str::<ValidateValue>(&call.function.arguments)
            .ok()
            .map(|arguments| arguments.value.validation_result))
    }
}

#[async_trait]
impl ValueValidator for ModelValueValidator {
    async fn validate(&self, context: &str, candidate: &str) -> bool {
        match self.judge(context, candidate).await {
            Ok(Some(verdict)) => {
                tracing::debug!(candidate, ?verdict, "value judged");
                verdict == Verdict::True
            }
            Ok(None) => {
                tracing::warn!(candidate, "judgment missing, value not validated");
                false
            }
            Err(err) => {
                tracing::warn!(candidate, error = %err, "judgment failed, value not validated");
                false
            }
        }
    }
}
