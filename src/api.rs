//! The seam between the relay core and the remote assistant service.

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    assistants::{
        files::{File, FilePurpose},
        messages::{CreateMessageRequest, Message},
        runs::{CreateRunRequest, Run, SubmitToolOutputsRequest},
        threads::{CreateThreadRequest, Thread},
        vector_stores::{
            CreateVectorStoreRequest, FileBatchStatus, VectorStore, VectorStoreFileBatch,
        },
        Assistant, CreateAssistantRequest, ModifyAssistantRequest,
    },
    chat::{ChatCompletion, ChatCompletionRequest},
    client::OpenAiClient,
    ApiResponseOrError, OpenAiError,
};

const FILE_BATCH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A reference document to index into a knowledge store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeDocument {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Operations the relay needs from the conversational service.
///
/// Implementations hold no per-call state and are shared by every exchange.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn create_thread(&self) -> ApiResponseOrError<Thread>;
    async fn get_thread(&self, thread_id: &str) -> ApiResponseOrError<Thread>;

    async fn create_message(
        &self,
        thread_id: &str,
        request: CreateMessageRequest,
    ) -> ApiResponseOrError<Message>;
    /// Most recent message first.
    async fn list_messages(&self, thread_id: &str) -> ApiResponseOrError<Vec<Message>>;

    async fn create_run(&self, thread_id: &str, request: CreateRunRequest)
        -> ApiResponseOrError<Run>;
    async fn get_run(&self, thread_id: &str, run_id: &str) -> ApiResponseOrError<Run>;
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        request: SubmitToolOutputsRequest,
    ) -> ApiResponseOrError<Run>;

    async fn get_file(&self, file_id: &str) -> ApiResponseOrError<File>;

    async fn create_assistant(
        &self,
        request: CreateAssistantRequest,
    ) -> ApiResponseOrError<Assistant>;
    async fn get_assistant(&self, assistant_id: &str) -> ApiResponseOrError<Assistant>;
    async fn update_assistant(
        &self,
        assistant_id: &str,
        request: ModifyAssistantRequest,
    ) -> ApiResponseOrError<Assistant>;

    async fn create_vector_store(&self, name: &str) -> ApiResponseOrError<VectorStore>;
    /// Uploads the documents into the store and returns once indexing finished.
    async fn upload_and_index(
        &self,
        vector_store_id: &str,
        documents: Vec<KnowledgeDocument>,
    ) -> ApiResponseOrError<VectorStoreFileBatch>;

    async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> ApiResponseOrError<ChatCompletion>;
}

#[async_trait]
impl AssistantApi for OpenAiClient {
    async fn create_thread(&self) -> ApiResponseOrError<Thread> {
        OpenAiClient::create_thread(self, CreateThreadRequest::default()).await
    }

    async fn get_thread(&self, thread_id: &str) -> ApiResponseOrError<Thread> {
        OpenAiClient::get_thread(self, thread_id).await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        request: CreateMessageRequest,
    ) -> ApiResponseOrError<Message> {
        OpenAiClient::create_message(self, thread_id, request).await
    }

    async fn list_messages(&self, thread_id: &str) -> ApiResponseOrError<Vec<Message>> {
        OpenAiClient::list_messages(self, thread_id, 20).await
    }

    async fn create_run(
        &self,
        thread_id: &str,
        request: CreateRunRequest,
    ) -> ApiResponseOrError<Run> {
        OpenAiClient::create_run(self, thread_id, request).await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> ApiResponseOrError<Run> {
        OpenAiClient::get_run(self, thread_id, run_id).await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        request: SubmitToolOutputsRequest,
    ) -> ApiResponseOrError<Run> {
        OpenAiClient::submit_tool_outputs(self, thread_id, run_id, request).await
    }

    async fn get_file(&self, file_id: &str) -> ApiResponseOrError<File> {
        OpenAiClient::get_file(self, file_id).await
    }

    async fn create_assistant(
        &self,
        request: CreateAssistantRequest,
    ) -> ApiResponseOrError<Assistant> {
        OpenAiClient::create_assistant(self, request).await
    }

    async fn get_assistant(&self, assistant_id: &str) -> ApiResponseOrError<Assistant> {
        OpenAiClient::get_assistant(self, assistant_id).await
    }

    async fn update_assistant(
        &self,
        assistant_id: &str,
        request: ModifyAssistantRequest,
    ) -> ApiResponseOrError<Assistant> {
        OpenAiClient::update_assistant(self, assistant_id, request).await
    }

    async fn create_vector_store(&self, name: &str) -> ApiResponseOrError<VectorStore> {
        OpenAiClient::create_vector_store(
            self,
            CreateVectorStoreRequest {
                name: name.to_string(),
                metadata: None,
            },
        )
        .await
    }

    async fn upload_and_index(
        &self,
        vector_store_id: &str,
        documents: Vec<KnowledgeDocument>,
    ) -> ApiResponseOrError<VectorStoreFileBatch> {
        let mut file_ids = Vec::with_capacity(documents.len());
        for document in documents {
            let file = self
                .upload_file(
                    &document.filename,
                    &document.mime_type,
                    document.bytes,
                    FilePurpose::Assistants,
                )
                .await?;
            tracing::debug!(
                file_id = %file.id,
                filename = %file.filename,
                "uploaded knowledge file"
            );
            file_ids.push(file.id);
        }

        let mut batch = self.create_file_batch(vector_store_id, &file_ids).await?;
        while batch.status == FileBatchStatus::InProgress {
            tokio::time::sleep(FILE_BATCH_POLL_INTERVAL).await;
            batch = self.get_file_batch(vector_store_id, &batch.id).await?;
        }

        match batch.status {
            FileBatchStatus::Completed if batch.file_counts.failed == 0 => Ok(batch),
            status => Err(OpenAiError::new(
                format!(
                    "file batch {} ended {status} with {} of {} files failed",
                    batch.id, batch.file_counts.failed, batch.file_counts.total
                ),
                "indexing".to_string(),
            )),
        }
    }

    async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> ApiResponseOrError<ChatCompletion> {
        OpenAiClient::create_chat_completion(self, request).await
    }
}
