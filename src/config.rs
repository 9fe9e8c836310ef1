//! Process configuration read from the environment (and `.env`).

use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};

use crate::{
    media::SpeechSettings,
    relay::{knowledge::DEFAULT_INDEXING_DEADLINE, AssistantSettings, RunSettings},
    Credentials,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub credentials: Credentials,
    pub assistant_id: Option<String>,
    pub amplitude_api_key: Option<String>,
    /// In-memory user store when unset.
    pub database_url: Option<String>,
    pub knowledge_dir: PathBuf,
    pub indexing_deadline: Duration,
    pub run: RunSettings,
    pub speech: SpeechSettings,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err).context("failed to load .env");
            }
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let optional = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let required = |name: &str| {
            optional(name).with_context(|| format!("environment variable {name} is not set"))
        };

        let defaults = RunSettings::default();
        let run = RunSettings {
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "RUN_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            deadline: Duration::from_secs(parse_or(
                &lookup,
                "RUN_DEADLINE_SECS",
                defaults.deadline.as_secs(),
            )?),
            max_action_cycles: parse_or(
                &lookup,
                "RUN_MAX_ACTION_CYCLES",
                defaults.max_action_cycles,
            )?,
        };

        let indexing_deadline = Duration::from_secs(parse_or(
            &lookup,
            "INDEXING_DEADLINE_SECS",
            DEFAULT_INDEXING_DEADLINE.as_secs(),
        )?);

        let speech_defaults = SpeechSettings::default();
        let speech = SpeechSettings {
            transcription_language: optional("TRANSCRIPTION_LANGUAGE")
                .or(speech_defaults.transcription_language),
            voice: optional("SPEECH_VOICE").unwrap_or(speech_defaults.voice),
            ffmpeg: optional("FFMPEG_PATH").unwrap_or(speech_defaults.ffmpeg),
        };

        Ok(Config {
            telegram_token: required("TELEGRAM_API_TOKEN")?,
            credentials: Credentials::new(
                required("OPENAI_KEY")?,
                optional("OPENAI_BASE_URL").unwrap_or_default(),
            ),
            assistant_id: optional("ASSISTANT_ID"),
            amplitude_api_key: optional("AMPLITUDE_API_KEY"),
            database_url: optional("DATABASE_URL"),
            knowledge_dir: optional("KNOWLEDGE_DIR")
                .unwrap_or_else(|| "knowledge".to_string())
                .into(),
            indexing_deadline,
            run,
            speech,
        })
    }

    pub fn assistant_settings(&self) -> AssistantSettings {
        AssistantSettings {
            assistant_id: self.assistant_id.clone(),
            ..Default::default()
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name).filter(|value| !value.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("environment variable {name} is not valid: {value:?}")),
        None => Ok(default),
    }
}
