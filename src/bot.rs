//! Telegram front end: one task per inbound message.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;

use crate::{
    analytics::{Analytics, Event},
    error::Result,
    media::SpeechService,
    relay::{Conversation, Reply, APOLOGY},
    telegram::{InboundEvent, Payload, TelegramClient},
    users::UserStore,
};

pub const START_REPLY: &str = "Send me voice message";
pub const TEXT_REPLY: &str = "I don't get it, just send me voice messages";

const LONG_POLL_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct Bot {
    telegram: TelegramClient,
    users: Arc<dyn UserStore>,
    conversation: Conversation,
    speech: SpeechService,
    analytics: Analytics,
    locks: UserLocks,
}

impl Bot {
    pub fn new(
        telegram: TelegramClient,
        users: Arc<dyn UserStore>,
        conversation: Conversation,
        speech: SpeechService,
        analytics: Analytics,
    ) -> Self {
        Self {
            telegram,
            users,
            conversation,
            speech,
            analytics,
            locks: UserLocks::default(),
        }
    }

    /// Long-polls Telegram forever, spawning a task per message.
    pub async fn run(self: Arc<Self>) {
        let mut offset = 0;
        loop {
            let updates = match self.telegram.get_updates(offset, LONG_POLL_SECS).await {
                Ok(updates) => updates,
                Err(err) => {
                    tracing::warn!(error = %err, "polling telegram failed");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(event) = InboundEvent::from_update(update) else {
                    continue;
                };
                let bot = Arc::clone(&self);
                tokio::spawn(async move { bot.handle(event).await });
            }
        }
    }

    pub async fn handle(&self, event: InboundEvent) {
        let sender_id = event.sender_id;
        let outcome = match &event.payload {
            Payload::Command(command) if command == "start" => self.on_start(&event).await,
            Payload::Command(_) | Payload::Text(_) => self.on_text(&event).await,
            Payload::Voice { file_id } => {
                let lock = self.locks.lock_for(sender_id).await;
                let outcome = {
                    let _guard = lock.lock().await;
                    self.on_voice(&event, file_id).await
                };
                self.locks.release(sender_id, lock).await;
                outcome
            }
            Payload::Photo { file_id } => self.on_photo(&event, file_id).await,
        };

        if let Err(err) = outcome {
            tracing::error!(sender_id, error = %err, "handling message failed");
            if let Err(err) = self
                .telegram
                .send_message(event.chat_id, APOLOGY, Some(event.message_id))
                .await
            {
                tracing::warn!(sender_id, error = %err, "could not send apology");
            }
        }
    }

    async fn on_start(&self, event: &InboundEvent) -> Result<()> {
        self.analytics.track(event.sender_id, Event::UserRegistration);
        self.users.get_or_create_user(event.sender_id).await?;
        self.telegram
            .send_message(event.chat_id, START_REPLY, None)
            .await
    }

    async fn on_text(&self, event: &InboundEvent) -> Result<()> {
        self.analytics.track(event.sender_id, Event::UserSendText);
        self.telegram
            .send_message(event.chat_id, TEXT_REPLY, Some(event.message_id))
            .await
    }

    async fn on_voice(&self, event: &InboundEvent, file_id: &str) -> Result<()> {
        self.analytics.track(event.sender_id, Event::UserSendVoice);
        let audio = self.telegram.download_file(file_id).await?;
        let question = self.speech.speech_to_text(audio).await?;
        tracing::debug!(sender_id = event.sender_id, "voice question received");

        match self.conversation.answer(event.sender_id, &question).await {
            Reply::Answer(answer) => {
                let voice = self.speech.text_to_speech(&answer).await?;
                self.telegram.send_voice(event.chat_id, voice, None).await
            }
            Reply::Apology => {
                self.telegram
                    .send_message(event.chat_id, APOLOGY, Some(event.message_id))
                    .await
            }
        }
    }

    async fn on_photo(&self, event: &InboundEvent, file_id: &str) -> Result<()> {
        self.analytics.track(event.sender_id, Event::UserSendPhoto);
        let image = self.telegram.download_file(file_id).await?;
        let mood = self.speech.image_to_mood_label(&image).await?;
        self.telegram
            .send_message(event.chat_id, &mood.to_string(), Some(event.message_id))
            .await?;
        self.analytics.track(event.sender_id, Event::PhotoRecognition);
        Ok(())
    }
}

/// One async mutex per sender, so a user's exchanges run one at a time.
///
/// Entries only live while some exchange of that sender holds or waits on
/// them.
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl UserLocks {
    async fn lock_for(&self, sender_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(sender_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Hands back a lock taken with [`UserLocks::lock_for`] and forgets the
    /// sender once nobody else holds it.
    async fn release(&self, sender_id: i64, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks
            .get(&sender_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&sender_id);
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
