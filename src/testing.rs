//! In-process stand-in for the assistant service, shared by unit tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;

use crate::{
    api::{AssistantApi, KnowledgeDocument},
    assistants::{
        files::{File, FilePurpose},
        messages::{Annotation, Content, CreateMessageRequest, FileCitation, Message, Role, Text},
        runs::{
            CreateRunRequest, RequiredAction, Run, Status, SubmitToolOutputs,
            SubmitToolOutputsRequest,
        },
        threads::Thread,
        vector_stores::{
            FileBatchStatus, FileCounts, VectorStore, VectorStoreFileBatch, VectorStoreStatus,
        },
        Assistant, CreateAssistantRequest, ModifyAssistantRequest,
    },
    chat::{
        ChatCompletion, ChatCompletionChoice, ChatCompletionMessage, ChatCompletionRequest,
        ToolCall, ToolCallFunction, ToolKind,
    },
    ApiResponseOrError, OpenAiError,
};

/// Everything the fake has been told to return and everything it was asked.
#[derive(Default)]
pub struct Script {
    pub threads_created: usize,
    pub known_threads: HashSet<String>,
    pub created_messages: Vec<(String, CreateMessageRequest)>,
    pub run_requests: Vec<CreateRunRequest>,
    /// Returned by `get_run` front to back. Once drained, runs stay `in_progress`.
    pub polls: VecDeque<Run>,
    pub submitted: Vec<SubmitToolOutputsRequest>,
    pub messages: Vec<Message>,
    pub files: HashMap<String, File>,
    pub assistant: Option<Assistant>,
    pub assistants_created: usize,
    pub assistant_updates: Vec<ModifyAssistantRequest>,
    pub vector_stores_created: usize,
    pub indexed: Vec<(String, Vec<KnowledgeDocument>)>,
    pub completions: VecDeque<ChatCompletion>,
    pub completion_requests: Vec<ChatCompletionRequest>,
    /// Operation names that answer with a server error.
    pub failing: HashSet<&'static str>,
    /// Operation names that never answer.
    pub stalled: HashSet<&'static str>,
}

#[derive(Default)]
pub struct ScriptedApi {
    script: Mutex<Script>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    /// Parks forever when `operation` is stalled.
    async fn gate(&self, operation: &'static str) {
        let stalled = self.script().stalled.contains(operation);
        if stalled {
            std::future::pending::<()>().await;
        }
    }

    fn check(&self, operation: &'static str) -> ApiResponseOrError<MutexGuard<'_, Script>> {
        let script = self.script();
        if script.failing.contains(operation) {
            return Err(OpenAiError::new(
                format!("{operation} failed"),
                "server_error".to_string(),
            ));
        }
        Ok(script)
    }
}

pub fn run(id: &str, status: Status) -> Run {
    Run {
        id: id.to_string(),
        object: "thread.run".to_string(),
        created_at: 0,
        assistant_id: "asst_1".to_string(),
        thread_id: "thread_1".to_string(),
        status,
        required_action: None,
        last_error: None,
        incomplete_details: None,
        metadata: None,
    }
}

pub fn requires_action(id: &str, tool_calls: Vec<ToolCall>) -> Run {
    Run {
        required_action: Some(RequiredAction::SubmitToolOutputs {
            submit_tool_outputs: SubmitToolOutputs { tool_calls },
        }),
        ..run(id, Status::RequiresAction)
    }
}

pub fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        kind: ToolKind::Function,
        function: ToolCallFunction {
            name: name.to_string(),
            arguments: arguments.to_string(),
        },
    }
}

pub fn assistant_message(value: &str, annotations: Vec<Annotation>) -> Message {
    Message {
        id: "msg_1".to_string(),
        object: "thread.message".to_string(),
        created_at: 0,
        thread_id: "thread_1".to_string(),
        role: Role::Assistant,
        content: vec![Content::Text {
            text: Text {
                value: value.to_string(),
                annotations,
            },
        }],
        assistant_id: Some("asst_1".to_string()),
        run_id: Some("run_1".to_string()),
        metadata: None,
    }
}

pub fn citation(marker: &str, file_id: &str) -> Annotation {
    Annotation {
        kind: "file_citation".to_string(),
        text: marker.to_string(),
        start_index: 0,
        end_index: 0,
        file_citation: Some(FileCitation {
            file_id: file_id.to_string(),
        }),
    }
}

pub fn file(id: &str, filename: &str) -> File {
    File {
        id: id.to_string(),
        object: "file".to_string(),
        created_at: 0,
        bytes: 0,
        filename: filename.to_string(),
        purpose: FilePurpose::Assistants,
    }
}

pub fn assistant(id: &str) -> Assistant {
    Assistant {
        id: id.to_string(),
        object: "assistant".to_string(),
        created_at: 0,
        name: Some("Voice Assistant".to_string()),
        model: "gpt-4o".to_string(),
        instructions: None,
        tools: vec![crate::relay::tools::save_value_tool()],
        tool_resources: None,
        metadata: None,
    }
}

/// A completion whose first choice carries one tool call.
pub fn tool_completion(name: &str, arguments: &str) -> ChatCompletion {
    completion(ChatCompletionMessage {
        content: None,
        refusal: None,
        tool_calls: Some(vec![tool_call("call_judge", name, arguments)]),
    })
}

pub fn text_completion(content: &str) -> ChatCompletion {
    completion(ChatCompletionMessage {
        content: Some(content.to_string()),
        refusal: None,
        tool_calls: None,
    })
}

fn completion(message: ChatCompletionMessage) -> ChatCompletion {
    ChatCompletion {
        id: "chatcmpl-1".to_string(),
        object: "chat.completion".to_string(),
        created: 0,
        model: "gpt-4o".to_string(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            finish_reason: Some("stop".to_string()),
            message,
        }],
        usage: None,
    }
}

#[async_trait]
impl AssistantApi for ScriptedApi {
    async fn create_thread(&self) -> ApiResponseOrError<Thread> {
        let mut script = self.check("create_thread")?;
        script.threads_created += 1;
        let id = format!("thread_{}", script.threads_created);
        script.known_threads.insert(id.clone());
        Ok(Thread::new(id))
    }

    async fn get_thread(&self, thread_id: &str) -> ApiResponseOrError<Thread> {
        let script = self.check("get_thread")?;
        if !script.known_threads.contains(thread_id) {
            return Err(OpenAiError::new(
                format!("No thread found with id '{thread_id}'."),
                "invalid_request_error".to_string(),
            ));
        }
        Ok(Thread::new(thread_id))
    }

    async fn create_message(
        &self,
        thread_id: &str,
        request: CreateMessageRequest,
    ) -> ApiResponseOrError<Message> {
        self.gate("create_message").await;
        let mut script = self.check("create_message")?;
        let message = Message {
            role: Role::User,
            ..assistant_message(&request.content, Vec::new())
        };
        script.created_messages.push((thread_id.to_string(), request));
        Ok(message)
    }

    async fn list_messages(&self, _thread_id: &str) -> ApiResponseOrError<Vec<Message>> {
        Ok(self.check("list_messages")?.messages.clone())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        request: CreateRunRequest,
    ) -> ApiResponseOrError<Run> {
        let mut script = self.check("create_run")?;
        script.run_requests.push(request);
        Ok(Run {
            thread_id: thread_id.to_string(),
            ..run("run_1", Status::Queued)
        })
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> ApiResponseOrError<Run> {
        let mut script = self.check("get_run")?;
        Ok(script
            .polls
            .pop_front()
            .unwrap_or_else(|| run(run_id, Status::InProgress)))
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        request: SubmitToolOutputsRequest,
    ) -> ApiResponseOrError<Run> {
        self.gate("submit_tool_outputs").await;
        let mut script = self.check("submit_tool_outputs")?;
        script.submitted.push(request);
        Ok(run(run_id, Status::Queued))
    }

    async fn get_file(&self, file_id: &str) -> ApiResponseOrError<File> {
        let script = self.check("get_file")?;
        script.files.get(file_id).cloned().ok_or_else(|| {
            OpenAiError::new(
                format!("No such File object: {file_id}"),
                "invalid_request_error".to_string(),
            )
        })
    }

    async fn create_assistant(
        &self,
        request: CreateAssistantRequest,
    ) -> ApiResponseOrError<Assistant> {
        let mut script = self.check("create_assistant")?;
        script.assistants_created += 1;
        let assistant = Assistant {
            id: format!("asst_created_{}", script.assistants_created),
            name: request.name,
            model: request.model,
            instructions: request.instructions,
            tools: request.tools,
            tool_resources: request.tool_resources,
            ..assistant("")
        };
        script.assistant = Some(assistant.clone());
        Ok(assistant)
    }

    async fn get_assistant(&self, assistant_id: &str) -> ApiResponseOrError<Assistant> {
        let script = self.check("get_assistant")?;
        script
            .assistant
            .clone()
            .filter(|assistant| assistant.id == assistant_id)
            .ok_or_else(|| {
                OpenAiError::new(
                    format!("No assistant found with id '{assistant_id}'."),
                    "invalid_request_error".to_string(),
                )
            })
    }

    async fn update_assistant(
        &self,
        assistant_id: &str,
        request: ModifyAssistantRequest,
    ) -> ApiResponseOrError<Assistant> {
        let mut script = self.check("update_assistant")?;
        let mut assistant = script
            .assistant
            .clone()
            .filter(|assistant| assistant.id == assistant_id)
            .ok_or_else(|| {
                OpenAiError::new(
                    format!("No assistant found with id '{assistant_id}'."),
                    "invalid_request_error".to_string(),
                )
            })?;
        if let Some(tools) = request.tools.clone() {
            assistant.tools = tools;
        }
        if let Some(tool_resources) = request.tool_resources.clone() {
            assistant.tool_resources = Some(tool_resources);
        }
        script.assistant_updates.push(request);
        script.assistant = Some(assistant.clone());
        Ok(assistant)
    }

    async fn create_vector_store(&self, name: &str) -> ApiResponseOrError<VectorStore> {
        let mut script = self.check("create_vector_store")?;
        script.vector_stores_created += 1;
        Ok(VectorStore {
            id: format!("vs_{}", script.vector_stores_created),
            object: "vector_store".to_string(),
            created_at: 0,
            name: Some(name.to_string()),
            usage_bytes: 0,
            file_counts: FileCounts::default(),
            status: VectorStoreStatus::Completed,
            metadata: None,
        })
    }

    async fn upload_and_index(
        &self,
        vector_store_id: &str,
        documents: Vec<KnowledgeDocument>,
    ) -> ApiResponseOrError<VectorStoreFileBatch> {
        self.gate("upload_and_index").await;
        let mut script = self.check("upload_and_index")?;
        let total = documents.len() as u32;
        script.indexed.push((vector_store_id.to_string(), documents));
        Ok(VectorStoreFileBatch {
            id: "vsfb_1".to_string(),
            vector_store_id: vector_store_id.to_string(),
            status: FileBatchStatus::Completed,
            file_counts: FileCounts {
                completed: total,
                total,
                ..Default::default()
            },
        })
    }

    async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> ApiResponseOrError<ChatCompletion> {
        let mut script = self.check("create_chat_completion")?;
        script.completion_requests.push(request);
        script.completions.pop_front().ok_or_else(|| {
            OpenAiError::new("no completion scripted".to_string(), "server_error".to_string())
        })
    }
}
