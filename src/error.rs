//! Error types for the relay.

use std::time::Duration;

use crate::{assistants::runs::Status, audio, chat, OpenAiError};

/// Errors from the relay core and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("remote service error: {0}")]
    Remote(#[from] OpenAiError),
    #[error("run {run_id} ended with status {status}")]
    RunTerminalFailure { run_id: String, status: Status },
    #[error("run {run_id} is incomplete: {reason}")]
    RunIncomplete { run_id: String, reason: String },
    #[error("exchange on thread {thread_id} did not finish within {waited:?}")]
    RunTimeout { thread_id: String, waited: Duration },
    #[error("run {run_id} still requires action after {cycles} tool cycle(s)")]
    TooManyActionCycles { run_id: String, cycles: usize },
    #[error("tool call {tool_call_id} skipped: {reason}")]
    ValidationSkipped { tool_call_id: String, reason: String },
    #[error("thread {thread_id} has no text answer")]
    EmptyAnswer { thread_id: String },
    #[error("knowledge error: {0}")]
    Knowledge(String),
    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("user not found: {0}")]
    UserNotFound(i64),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("media error: {0}")]
    Media(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<chat::ChatCompletionBuilderError> for RelayError {
    fn from(err: chat::ChatCompletionBuilderError) -> Self {
        RelayError::InvalidRequest(err.to_string())
    }
}

impl From<audio::TranscriptionBuilderError> for RelayError {
    fn from(err: audio::TranscriptionBuilderError) -> Self {
        RelayError::InvalidRequest(err.to_string())
    }
}

impl From<audio::SpeechBuilderError> for RelayError {
    fn from(err: audio::SpeechBuilderError) -> Self {
        RelayError::InvalidRequest(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for RelayError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        RelayError::Store(sqlx::Error::Migrate(Box::new(err)))
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Media(err.to_string())
    }
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_failures_name_the_run() {
        let err = RelayError::RunTerminalFailure {
            run_id: "run_1".to_string(),
            status: Status::Expired,
        };
        assert_eq!(err.to_string(), "run run_1 ended with status expired");

        let err = RelayError::RunTimeout {
            thread_id: "thread_2".to_string(),
            waited: Duration::from_secs(120),
        };
        assert_eq!(
            err.to_string(),
            "exchange on thread thread_2 did not finish within 120s"
        );
    }

    #[test]
    fn incomplete_builders_are_invalid_requests() {
        let err: RelayError =
            chat::ChatCompletionBuilderError::UninitializedField("messages").into();
        assert!(matches!(
            err,
            RelayError::InvalidRequest(ref message) if message.contains("messages")
        ));
    }

    #[test]
    fn remote_errors_convert() {
        let err: RelayError =
            OpenAiError::new("Rate limit reached".to_string(), "requests".to_string()).into();
        assert!(matches!(err, RelayError::Remote(_)));
        assert_eq!(
            err.to_string(),
            "remote service error: Rate limit reached (requests)"
        );
    }

    #[test]
    fn skipped_tool_calls_carry_reason() {
        let err = RelayError::ValidationSkipped {
            tool_call_id: "call_9".to_string(),
            reason: "missing `value`".to_string(),
        };
        assert_eq!(err.to_string(), "tool call call_9 skipped: missing `value`");
    }
}
