use std::collections::HashMap;

use crate::{client::OpenAiClient, ApiResponseOrError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VectorStore {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created_at: u64,
    pub name: Option<String>,
    #[serde(default)]
    pub usage_bytes: u64,
    pub file_counts: FileCounts,
    pub status: VectorStoreStatus,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileCounts {
    pub in_progress: u32,
    pub completed: u32,
    pub failed: u32,
    pub cancelled: u32,
    pub total: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreStatus {
    Expired,
    InProgress,
    Completed,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct CreateVectorStoreRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

/// A group of files being indexed into a vector store together.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VectorStoreFileBatch {
    pub id: String,
    pub vector_store_id: String,
    pub status: FileBatchStatus,
    pub file_counts: FileCounts,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FileBatchStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Serialize, Clone)]
struct CreateFileBatchRequest<'a> {
    file_ids: &'a [String],
}

impl OpenAiClient {
    pub async fn create_vector_store(
        &self,
        request: CreateVectorStoreRequest,
    ) -> ApiResponseOrError<VectorStore> {
        self.post("vector_stores", request).await
    }

    pub async fn create_file_batch(
        &self,
        vector_store_id: &str,
        file_ids: &[String],
    ) -> ApiResponseOrError<VectorStoreFileBatch> {
        self.post(
            format!("vector_stores/{vector_store_id}/file_batches"),
            CreateFileBatchRequest { file_ids },
        )
        .await
    }

    pub async fn get_file_batch(
        &self,
        vector_store_id: &str,
        batch_id: &str,
    ) -> ApiResponseOrError<VectorStoreFileBatch> {
        self.get(format!(
            "vector_stores/{vector_store_id}/file_batches/{batch_id}"
        ))
        .await
    }
}
