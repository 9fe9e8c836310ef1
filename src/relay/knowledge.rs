//! Binds the reference-document store to the shared assistant.
//!
//! The assistant is shared by every user, so the binding is global: once the
//! assistant searches a store, later attachments only record that store on
//! the user and never upload again.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{
    api::{AssistantApi, KnowledgeDocument},
    assistants::{Assistant, ModifyAssistantRequest, Tool, ToolResources},
    error::{RelayError, Result},
    users::{UserRecord, UserStore, UserUpdate},
};

pub const STORE_NAME: &str = "Knowledge Base";
pub const DEFAULT_INDEXING_DEADLINE: Duration = Duration::from_secs(600);

/// Outcome of [`KnowledgeManager::attach_knowledge`].
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeAttachment {
    /// The assistant as it stands after the attachment.
    pub assistant: Assistant,
    pub vector_store_id: String,
}

pub struct KnowledgeManager {
    api: Arc<dyn AssistantApi>,
    users: Arc<dyn UserStore>,
    documents_dir: PathBuf,
    indexing_deadline: Duration,
}

impl KnowledgeManager {
    pub fn new(
        api: Arc<dyn AssistantApi>,
        users: Arc<dyn UserStore>,
        documents_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api,
            users,
            documents_dir: documents_dir.into(),
            indexing_deadline: DEFAULT_INDEXING_DEADLINE,
        }
    }

    /// Caps how long uploading and indexing the documents may take.
    pub fn with_indexing_deadline(mut self, deadline: Duration) -> Self {
        self.indexing_deadline = deadline;
        self
    }

    /// Makes sure `assistant` declares `file_search` bound to a knowledge
    /// store and that the user records the store's id.
    ///
    /// Reuses, in order: the store the assistant is already bound to, then
    /// the store recorded on the user. Documents are uploaded only when
    /// neither exists.
    pub async fn attach_knowledge(
        &self,
        assistant: &Assistant,
        user: &UserRecord,
    ) -> Result<KnowledgeAttachment> {
        // Another exchange may have bound the assistant since `assistant`
        // was read.
        let current = self.api.get_assistant(&assistant.id).await?;
        if let Some(store_id) = current.file_search_store() {
            let vector_store_id = store_id.to_string();
            if assistant.file_search_store() != Some(store_id) {
                tracing::info!(
                    assistant_id = %current.id,
                    vector_store_id = %vector_store_id,
                    "assistant already bound to a knowledge store"
                );
            }
            self.record_store(user, &vector_store_id).await?;
            return Ok(KnowledgeAttachment {
                assistant: current,
                vector_store_id,
            });
        }

        let vector_store_id = match &user.vector_store_id {
            Some(store_id) => store_id.clone(),
            None => self.build_store(user).await?,
        };
        let assistant = self.bind(&current, &vector_store_id).await?;
        Ok(KnowledgeAttachment {
            assistant,
            vector_store_id,
        })
    }

    async fn build_store(&self, user: &UserRecord) -> Result<String> {
        let documents = load_documents(&self.documents_dir).await?;
        let store = self.api.create_vector_store(STORE_NAME).await?;
        let deadline = self.indexing_deadline;
        let indexing = self.api.upload_and_index(&store.id, documents);
        let batch = tokio::time::timeout(deadline, indexing)
            .await
            .map_err(|_| {
                RelayError::Knowledge(format!(
                    "indexing into {} did not finish within {deadline:?}",
                    store.id
                ))
            })??;
        tracing::info!(
            vector_store_id = %store.id,
            files = batch.file_counts.completed,
            "indexed knowledge documents"
        );
        self.record_store(user, &store.id).await?;
        Ok(store.id)
    }

    async fn bind(&self, assistant: &Assistant, vector_store_id: &str) -> Result<Assistant> {
        let mut tools = assistant.tools.clone();
        if !assistant.has_file_search() {
            tools.push(Tool::file_search());
        }
        let mut tool_resources = assistant.tool_resources.clone().unwrap_or_default();
        tool_resources.file_search = ToolResources::file_search(vector_store_id).file_search;

        let updated = self
            .api
            .update_assistant(
                &assistant.id,
                ModifyAssistantRequest {
                    tools: Some(tools),
                    tool_resources: Some(tool_resources),
                },
            )
            .await?;
        tracing::info!(assistant_id = %updated.id, vector_store_id, "bound knowledge store");
        Ok(updated)
    }

    async fn record_store(&self, user: &UserRecord, vector_store_id: &str) -> Result<()> {
        if user.vector_store_id.as_deref() == Some(vector_store_id) {
            return Ok(());
        }
        self.users
            .update_user(user.id, UserUpdate::vector_store_id(vector_store_id))
            .await?;
        Ok(())
    }
}

/// Reads every regular file directly under `dir`, sorted by name.
pub async fn load_documents(dir: &Path) -> Result<Vec<KnowledgeDocument>> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|err| {
        RelayError::Knowledge(format!("cannot read {}: {err}", dir.display()))
    })?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| RelayError::Knowledge(err.to_string()))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|err| RelayError::Knowledge(err.to_string()))?;
        if file_type.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();

    if paths.is_empty() {
        return Err(RelayError::Knowledge(format!(
            "no documents in {}",
            dir.display()
        )));
    }

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|err| RelayError::Knowledge(format!("{}: {err}", path.display())))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        documents.push(KnowledgeDocument {
            mime_type: mime_type(&path).to_string(),
            filename,
            bytes,
        });
    }
    Ok(documents)
}

fn mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("html") | Some("htm") => "text/html",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("pptx") => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        _ => "application/octet-stream",
    }
}
