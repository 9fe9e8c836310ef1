//! Minimal Telegram Bot API client: long polling, file download and replies.

use reqwest::multipart::{Form, Part};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{RelayError, Result};

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: Chat,
    pub text: Option<String>,
    pub voice: Option<Voice>,
    /// Every size Telegram generated, smallest first.
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TelegramUser {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Voice {
    pub file_id: String,
    #[serde(default)]
    pub duration: u32,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct TelegramFile {
    file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A `/command`, without the slash and any bot suffix.
    Command(String),
    Text(String),
    Voice { file_id: String },
    Photo { file_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub sender_id: i64,
    pub chat_id: i64,
    pub message_id: i64,
    pub payload: Payload,
}

impl InboundEvent {
    /// `None` for updates the bot does not handle (edits, stickers, channel
    /// posts without a sender).
    pub fn from_update(update: Update) -> Option<Self> {
        let message = update.message?;
        let sender_id = message.from.as_ref()?.id;
        let payload = if let Some(voice) = message.voice {
            Payload::Voice {
                file_id: voice.file_id,
            }
        } else if let Some(largest) = message
            .photo
            .and_then(|sizes| sizes.into_iter().max_by_key(|size| size.width * size.height))
        {
            Payload::Photo {
                file_id: largest.file_id,
            }
        } else {
            let text = message.text?;
            match text.strip_prefix('/') {
                Some(command) => {
                    let command = command.split_whitespace().next().unwrap_or_default();
                    let command = command.split('@').next().unwrap_or_default();
                    Payload::Command(command.to_string())
                }
                None => Payload::Text(text),
            }
        };
        Some(InboundEvent {
            sender_id,
            chat_id: message.chat.id,
            message_id: message.message_id,
            payload,
        })
    }
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct GetFile<'a> {
    file_id: &'a str,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TelegramClient {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, TELEGRAM_API_URL)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token)
    }

    async fn decode<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body: TelegramResponse<T> = response.json().await?;
        if !body.ok {
            return Err(RelayError::Transport(format!(
                "telegram {method} failed with HTTP {}: {}",
                status.as_u16(),
                body.description.unwrap_or_default()
            )));
        }
        body.result
            .ok_or_else(|| RelayError::Transport(format!("telegram {method} missing result")))
    }

    async fn call<B: Serialize, T: DeserializeOwned>(&self, method: &str, body: &B) -> Result<T> {
        tracing::debug!("Telegram Request {method}");
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;
        Self::decode(method, response).await
    }

    /// Long-polls for updates newer than `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &GetUpdates {
                offset,
                timeout: timeout_secs,
                allowed_updates: &["message"],
            },
        )
        .await
    }

    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let file: TelegramFile = self.call("getFile", &GetFile { file_id }).await?;
        let file_path = file
            .file_path
            .ok_or_else(|| RelayError::Transport(format!("telegram file {file_id} has no path")))?;

        let url = format!("{}/file/bot{}/{file_path}", self.base_url, self.token);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Transport(format!(
                "telegram file download failed with HTTP {}",
                status.as_u16()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<()> {
        let _: TelegramMessage = self
            .call(
                "sendMessage",
                &SendMessage {
                    chat_id,
                    text,
                    reply_to_message_id,
                },
            )
            .await?;
        Ok(())
    }

    /// Sends OGG/Opus audio as a voice note.
    pub async fn send_voice(
        &self,
        chat_id: i64,
        ogg: Vec<u8>,
        reply_to_message_id: Option<i64>,
    ) -> Result<()> {
        let voice = Part::bytes(ogg)
            .file_name("answer.ogg")
            .mime_str("audio/ogg")?;
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("voice", voice);
        if let Some(message_id) = reply_to_message_id {
            form = form.text("reply_to_message_id", message_id.to_string());
        }

        tracing::debug!("Telegram Request sendVoice");
        let response = self
            .client
            .post(self.method_url("sendVoice"))
            .multipart(form)
            .send()
            .await?;
        let _: TelegramMessage = Self::decode("sendVoice", response).await?;
        Ok(())
    }
}
