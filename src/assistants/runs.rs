use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{chat::ToolCall, client::OpenAiClient, ApiResponseOrError};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created_at: u64,
    /// The ID of the assistant used for this run.
    pub assistant_id: String,
    /// The ID of the thread associated with this run.
    pub thread_id: String,
    pub status: Status,
    /// Details on the action required to continue the run. Null if no action is required.
    pub required_action: Option<RequiredAction>,
    /// The last error that occurred during this run.
    pub last_error: Option<LastError>,
    /// Why the run ended `incomplete`, when it did.
    pub incomplete_details: Option<IncompleteDetails>,
    pub metadata: Option<HashMap<String, String>>,
}

impl Run {
    /// The tool calls the run is waiting on, in the order the model issued them.
    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        match &self.required_action {
            Some(RequiredAction::SubmitToolOutputs {
                submit_tool_outputs,
            }) => &submit_tool_outputs.tool_calls,
            None => &[],
        }
    }
}

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequiredAction {
    SubmitToolOutputs {
        submit_tool_outputs: SubmitToolOutputs,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SubmitToolOutputs {
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LastError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IncompleteDetails {
    pub reason: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct CreateRunRequest {
    pub assistant_id: String,
    /// Overrides the assistant's instructions for this run only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl CreateRunRequest {
    pub fn new(assistant_id: impl Into<String>) -> Self {
        CreateRunRequest {
            assistant_id: assistant_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SubmitToolOutputsRequest {
    pub tool_outputs: Vec<ToolOutput>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

impl OpenAiClient {
    pub async fn create_run(
        &self,
        thread_id: &str,
        request: CreateRunRequest,
    ) -> ApiResponseOrError<Run> {
        self.post(format!("threads/{thread_id}/runs"), request)
            .await
    }

    pub async fn get_run(&self, thread_id: &str, run_id: &str) -> ApiResponseOrError<Run> {
        self.get(format!("threads/{thread_id}/runs/{run_id}")).await
    }

    /// Answers every pending tool call of a run. The run goes back to
    /// `queued` and must be polled again.
    pub async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        request: SubmitToolOutputsRequest,
    ) -> ApiResponseOrError<Run> {
        self.post(
            format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            request,
        )
        .await
    }
}
