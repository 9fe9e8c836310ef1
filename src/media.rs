//! Speech and image transforms around the relay: voice in, voice out, and a
//! mood label for photos.

use std::{process::Stdio, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::{io::AsyncWriteExt, process::Command};

use crate::{
    audio::{SpeechRequest, TranscriptionRequest},
    chat::{
        ChatCompletionRequest, ChatCompletionResponseFormat, ChatMessage, ImageDetail, ImageUrl,
        UserContent, UserContentPart,
    },
    client::OpenAiClient,
    error::{RelayError, Result},
};

pub const TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const SPEECH_MODEL: &str = "tts-1";
pub const VISION_MODEL: &str = "gpt-4o";

const MOOD_PROMPT: &str = "Look at the person in the photo and tell which mood they are in.";

/// The mood read from a person's face.
#[derive(Debug, Clone, Copy, Deserialize, JsonSchema, PartialEq, Eq, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mood {
    Happy,
    Sad,
    Angry,
    Surprised,
    Calm,
    Neutral,
}

/// Mood recognized on the photo.
#[derive(Debug, Deserialize, JsonSchema)]
struct MoodRecognition {
    /// The dominant mood of the person on the photo.
    mood: Mood,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechSettings {
    pub transcription_language: Option<String>,
    pub voice: String,
    /// Program used to transcode synthesized MP3 into OGG/Opus.
    pub ffmpeg: String,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        SpeechSettings {
            transcription_language: Some("ru".to_string()),
            voice: "nova".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

pub struct SpeechService {
    client: Arc<OpenAiClient>,
    settings: SpeechSettings,
}

impl SpeechService {
    pub fn new(client: Arc<OpenAiClient>, settings: SpeechSettings) -> Self {
        Self { client, settings }
    }

    /// Transcribes a Telegram voice note (OGG/Opus).
    pub async fn speech_to_text(&self, audio: Vec<u8>) -> Result<String> {
        let mut request = TranscriptionRequest::builder(TRANSCRIPTION_MODEL)
            .file_name("voice.ogg")
            .mime_type("audio/ogg")
            .audio(audio);
        if let Some(language) = &self.settings.transcription_language {
            request = request.language(language.as_str());
        }
        let request = request.build()?;
        let transcription = self.client.create_transcription(request).await?;
        tracing::debug!(chars = transcription.text.len(), "voice transcribed");
        Ok(transcription.text)
    }

    /// Synthesizes `text` and returns OGG/Opus bytes ready to send as a voice note.
    pub async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>> {
        let request = SpeechRequest::builder(SPEECH_MODEL)
            .input(text)
            .voice(self.settings.voice.as_str())
            .build()?;
        let mp3 = self.client.create_speech(request).await?;
        transcode_to_ogg(&self.settings.ffmpeg, mp3).await
    }

    pub async fn image_to_mood_label(&self, image: &[u8]) -> Result<Mood> {
        let completion = self
            .client
            .create_chat_completion(mood_request(image)?)
            .await?;
        let content = completion
            .first_message()
            .and_then(|message| message.content.as_deref())
            .ok_or_else(|| RelayError::Media("mood recognition returned no content".to_string()))?;
        parse_mood(content)
    }
}

fn mood_request(image: &[u8]) -> Result<ChatCompletionRequest> {
    let url = format!("data:image/jpeg;base64,{}", STANDARD.encode(image));
    let message = ChatMessage::user(UserContent::Parts(vec![
        UserContentPart::Text {
            text: MOOD_PROMPT.to_string(),
        },
        UserContentPart::ImageUrl {
            image_url: ImageUrl {
                url,
                detail: ImageDetail::Low,
            },
        },
    ]));
    Ok(ChatCompletionRequest::builder(VISION_MODEL, vec![message])
        .response_format(ChatCompletionResponseFormat::json_schema::<MoodRecognition>(true))
        .build()?)
}

fn parse_mood(content: &str) -> Result<Mood> {
    serde_json::from_str::<MoodRecognition>(content)
        .map(|recognition| recognition.mood)
        .map_err(|err| RelayError::Media(format!("unexpected mood answer: {err}")))
}

const OGG_OPUS_ARGS: [&str; 7] = ["-i", "pipe:0", "-c:a", "libopus", "-f", "ogg", "pipe:1"];

/// Pipes `input` through `ffmpeg -i pipe:0 -c:a libopus -f ogg pipe:1`.
pub async fn transcode_to_ogg(ffmpeg: &str, input: Vec<u8>) -> Result<Vec<u8>> {
    pipe_through(ffmpeg, &OGG_OPUS_ARGS, input).await
}

async fn pipe_through(program: &str, args: &[&str], input: Vec<u8>) -> Result<Vec<u8>> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| RelayError::Media(format!("cannot start {program}: {err}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| RelayError::Media(format!("{program} stdin unavailable")))?;
    // Written concurrently: the child fills stdout before it drained stdin.
    let writer = tokio::spawn(async move {
        stdin.write_all(&input).await?;
        stdin.shutdown().await
    });

    let output = child.wait_with_output().await?;
    let written = writer
        .await
        .map_err(|err| RelayError::Media(err.to_string()))?;

    // A program that rejects its input exits before draining stdin, so its
    // status explains more than the broken pipe.
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let last_line = stderr.lines().last().unwrap_or_default();
        return Err(RelayError::Media(format!(
            "{program} exited with {}: {last_line}",
            output.status
        )));
    }
    written?;
    Ok(output.stdout)
}
