use crate::{client::OpenAiClient, ApiResponseOrError};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct File {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub bytes: u64,
    pub filename: String,
    pub purpose: FilePurpose,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FilePurpose {
    Assistants,
    AssistantsOutput,
    Batch,
    BatchOutput,
    FineTune,
    FineTuneResults,
    Vision,
}

impl OpenAiClient {
    pub async fn upload_file(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
        purpose: FilePurpose,
    ) -> ApiResponseOrError<File> {
        let file_part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)?;

        let form = Form::new()
            .part("file", file_part)
            .text("purpose", purpose.to_string());

        self.post_multipart("files", form).await
    }

    pub async fn get_file(&self, file_id: &str) -> ApiResponseOrError<File> {
        self.get(format!("files/{file_id}")).await
    }
}
