use std::sync::Arc;

use crate::{
    api::AssistantApi,
    error::Result,
    relay::{assistant::AssistantManager, driver::RunDriver},
    users::{UserRecord, UserStore, UserUpdate},
};

/// Sent to the user whenever no answer could be produced.
pub const APOLOGY: &str = "Something went wrong, try again later";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Answer(String),
    Apology,
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Answer(text) => text,
            Reply::Apology => APOLOGY,
        }
    }

    pub fn is_answer(&self) -> bool {
        matches!(self, Reply::Answer(_))
    }
}

/// Per-message coordinator: user thread, then assistant, then run.
pub struct Conversation {
    api: Arc<dyn AssistantApi>,
    users: Arc<dyn UserStore>,
    assistants: AssistantManager,
    driver: RunDriver,
}

impl Conversation {
    pub fn new(
        api: Arc<dyn AssistantApi>,
        users: Arc<dyn UserStore>,
        assistants: AssistantManager,
        driver: RunDriver,
    ) -> Self {
        Self {
            api,
            users,
            assistants,
            driver,
        }
    }

    /// The id of the user's thread, created and persisted on first use.
    pub async fn ensure_thread(&self, user: &UserRecord) -> Result<String> {
        if let Some(thread_id) = &user.thread_id {
            let thread = self.api.get_thread(thread_id).await?;
            return Ok(thread.id);
        }

        let thread = self.api.create_thread().await?;
        self.users
            .update_user(user.id, UserUpdate::thread_id(&thread.id))
            .await?;
        tracing::info!(user_id = user.id, thread_id = %thread.id, "created thread");
        Ok(thread.id)
    }

    /// Answers `question` for the user, or apologizes.
    pub async fn answer(&self, telegram_id: i64, question: &str) -> Reply {
        if question.trim().is_empty() {
            tracing::warn!(telegram_id, "empty question");
            return Reply::Apology;
        }
        match self.try_answer(telegram_id, question).await {
            Ok(Some(answer)) => Reply::Answer(answer),
            Ok(None) => Reply::Apology,
            Err(err) => {
                tracing::error!(telegram_id, error = %err, "could not prepare exchange");
                Reply::Apology
            }
        }
    }

    async fn try_answer(&self, telegram_id: i64, question: &str) -> Result<Option<String>> {
        let mut user = self.users.get_or_create_user(telegram_id).await?;
        let thread_id = self.ensure_thread(&user).await?;
        user.thread_id = Some(thread_id.clone());

        let assistant = self.assistants.ensure_assistant(&user).await?;
        // Attachment may have recorded a store on the row.
        let user = self
            .users
            .get_user(telegram_id)
            .await?
            .unwrap_or(user);

        Ok(self
            .driver
            .exchange(&thread_id, &assistant.id, &user, question)
            .await)
    }
}
