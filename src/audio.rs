//! Speech to text and text to speech.

use crate::{client::OpenAiClient, ApiResponseOrError};
use derive_builder::Builder;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transcription {
    pub text: String,
}

#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(pattern = "owned")]
#[builder(name = "TranscriptionBuilder")]
#[builder(setter(strip_option, into))]
pub struct TranscriptionRequest {
    /// ID of the model to use, such as `whisper-1`.
    pub model: String,
    /// Name the upload is sent under. Its extension tells the service the container format.
    pub file_name: String,
    pub mime_type: String,
    pub audio: Vec<u8>,
    /// ISO-639-1 language of the input audio. Supplying it improves accuracy and latency.
    #[builder(default)]
    pub language: Option<String>,
}

impl TranscriptionRequest {
    pub fn builder(model: &str) -> TranscriptionBuilder {
        TranscriptionBuilder::create_empty().model(model)
    }
}

#[derive(Serialize, Builder, Debug, Clone, PartialEq)]
#[builder(pattern = "owned")]
#[builder(name = "SpeechBuilder")]
#[builder(setter(strip_option, into))]
pub struct SpeechRequest {
    /// One of the TTS models, such as `tts-1`.
    pub model: String,
    pub input: String,
    /// The voice to use, such as `nova`.
    pub voice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub response_format: Option<SpeechFormat>,
}

impl SpeechRequest {
    pub fn builder(model: &str) -> SpeechBuilder {
        SpeechBuilder::create_empty().model(model)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpeechFormat {
    Mp3,
    Opus,
    Aac,
    Flac,
    Wav,
}

impl OpenAiClient {
    pub async fn create_transcription(
        &self,
        request: TranscriptionRequest,
    ) -> ApiResponseOrError<Transcription> {
        let file_part = Part::bytes(request.audio)
            .file_name(request.file_name)
            .mime_str(&request.mime_type)?;
        let mut form = Form::new()
            .part("file", file_part)
            .text("model", request.model);
        if let Some(language) = request.language {
            form = form.text("language", language);
        }
        self.post_multipart("audio/transcriptions", form).await
    }

    /// Returns the encoded audio bytes in the requested format (MP3 by default).
    pub async fn create_speech(&self, request: SpeechRequest) -> ApiResponseOrError<Vec<u8>> {
        self.post_for_bytes("audio/speech", request).await
    }
}
