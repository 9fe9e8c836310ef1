use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    api::AssistantApi,
    assistants::{Assistant, CreateAssistantRequest},
    error::Result,
    relay::{knowledge::KnowledgeManager, tools::save_value_tool},
    users::UserRecord,
};

pub const DEFAULT_ASSISTANT_NAME: &str = "Voice Assistant";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant. Your job is to ask the user \
questions and discover their key values as the conversation goes. Call the `save_value` function \
when you find exactly one value. If there are several, call the function several times. Keep the \
conversation relaxed and informal.";

/// How the shared assistant is found or created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantSettings {
    /// Reuse this assistant instead of creating one.
    pub assistant_id: Option<String>,
    pub name: String,
    pub instructions: String,
    pub model: String,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        AssistantSettings {
            assistant_id: None,
            name: DEFAULT_ASSISTANT_NAME.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Owns the one assistant every user talks to.
pub struct AssistantManager {
    api: Arc<dyn AssistantApi>,
    knowledge: KnowledgeManager,
    settings: AssistantSettings,
    cached: Mutex<Option<Assistant>>,
}

impl AssistantManager {
    pub fn new(
        api: Arc<dyn AssistantApi>,
        knowledge: KnowledgeManager,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            api,
            knowledge,
            settings,
            cached: Mutex::new(None),
        }
    }

    /// Returns the shared assistant, ready to search the knowledge store.
    ///
    /// The attachment check looks at the assistant's tools and at this
    /// user's record, so a user without a recorded store triggers an
    /// attachment even when the assistant already has one. The attachment
    /// step then only records the existing store on the user.
    pub async fn ensure_assistant(&self, user: &UserRecord) -> Result<Assistant> {
        // Held across the remote calls so concurrent first exchanges create
        // a single assistant.
        let mut cached = self.cached.lock().await;
        let assistant = match cached.as_ref() {
            Some(assistant) => assistant.clone(),
            None => self.obtain().await?,
        };

        let assistant = if assistant.has_file_search() && user.vector_store_id.is_some() {
            assistant
        } else {
            self.knowledge.attach_knowledge(&assistant, user).await?.assistant
        };
        *cached = Some(assistant.clone());
        Ok(assistant)
    }

    async fn obtain(&self) -> Result<Assistant> {
        if let Some(assistant_id) = &self.settings.assistant_id {
            let assistant = self.api.get_assistant(assistant_id).await?;
            tracing::info!(assistant_id = %assistant.id, "using configured assistant");
            return Ok(assistant);
        }

        let assistant = self
            .api
            .create_assistant(CreateAssistantRequest {
                model: self.settings.model.clone(),
                name: Some(self.settings.name.clone()),
                instructions: Some(self.settings.instructions.clone()),
                tools: vec![save_value_tool()],
                ..Default::default()
            })
            .await?;
        tracing::info!(assistant_id = %assistant.id, "created assistant");
        Ok(assistant)
    }
}
