//! Drives one question through a remote run to a text answer.
//!
//! A run is polled until it either completes or pauses on `requires_action`.
//! A paused run gets one output per pending tool call and is polled again;
//! the number of such action cycles per exchange is capped.

use std::{future::Future, sync::Arc, time::Duration};

use crate::{
    api::AssistantApi,
    assistants::{
        messages::{CreateMessageRequest, Message},
        runs::{CreateRunRequest, Run, Status, SubmitToolOutputsRequest, ToolOutput},
    },
    error::{RelayError, Result},
    relay::{citations, tools, validator::ValueValidator},
    users::{UserRecord, UserStore, UserUpdate},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Pause between two status polls.
    pub poll_interval: Duration,
    /// Upper bound on one whole exchange, remote calls included.
    pub deadline: Duration,
    /// How many `requires_action` round trips one exchange may take.
    pub max_action_cycles: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            poll_interval: Duration::from_secs(1),
            deadline: Duration::from_secs(120),
            max_action_cycles: 1,
        }
    }
}

pub struct RunDriver {
    api: Arc<dyn AssistantApi>,
    users: Arc<dyn UserStore>,
    validator: Arc<dyn ValueValidator>,
    settings: RunSettings,
}

impl RunDriver {
    pub fn new(
        api: Arc<dyn AssistantApi>,
        users: Arc<dyn UserStore>,
        validator: Arc<dyn ValueValidator>,
    ) -> Self {
        Self {
            api,
            users,
            validator,
            settings: RunSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Appends `question` to the thread, starts a run and waits until it
    /// completes or requires action, within the configured deadline.
    pub async fn ask(&self, thread_id: &str, assistant_id: &str, question: &str) -> Result<Run> {
        self.bounded(thread_id, self.start(thread_id, assistant_id, question))
            .await
    }

    /// Finishes the protocol for a run returned by [`RunDriver::ask`].
    ///
    /// Every failure is logged and turns into `None`.
    pub async fn retrieve_answer(
        &self,
        run: Run,
        user: &UserRecord,
        question: &str,
    ) -> Option<String> {
        let thread_id = run.thread_id.clone();
        let outcome = self
            .bounded(&thread_id, self.resolve(run, user, question))
            .await;
        settle(&thread_id, user, outcome)
    }

    /// [`RunDriver::ask`] followed by [`RunDriver::retrieve_answer`], with
    /// one deadline over both.
    pub async fn exchange(
        &self,
        thread_id: &str,
        assistant_id: &str,
        user: &UserRecord,
        question: &str,
    ) -> Option<String> {
        let outcome = self
            .bounded(thread_id, async {
                let run = self.start(thread_id, assistant_id, question).await?;
                self.resolve(run, user, question).await
            })
            .await;
        settle(thread_id, user, outcome)
    }

    async fn start(&self, thread_id: &str, assistant_id: &str, question: &str) -> Result<Run> {
        self.api
            .create_message(thread_id, CreateMessageRequest::user(question))
            .await?;
        let run = self
            .api
            .create_run(thread_id, CreateRunRequest::new(assistant_id))
            .await?;
        tracing::debug!(thread_id, run_id = %run.id, "run started");
        self.poll(run).await
    }

    async fn resolve(&self, run: Run, user: &UserRecord, question: &str) -> Result<String> {
        let thread_id = run.thread_id.clone();
        let mut run = self.poll(run).await?;
        let mut cycles = 0;
        while run.status == Status::RequiresAction {
            if cycles == self.settings.max_action_cycles {
                return Err(RelayError::TooManyActionCycles {
                    run_id: run.id,
                    cycles,
                });
            }
            cycles += 1;
            let resumed = self
                .satisfy_tool_calls(&thread_id, &run, user, question)
                .await?;
            run = self.poll(resumed).await?;
        }
        self.extract_answer(&thread_id).await
    }

    /// Runs `work` under the configured deadline. Every remote call inside
    /// it, not only status polling, counts against the deadline.
    async fn bounded<T>(
        &self,
        thread_id: &str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let deadline = self.settings.deadline;
        tokio::time::timeout(deadline, work)
            .await
            .map_err(|_| RelayError::RunTimeout {
                thread_id: thread_id.to_string(),
                waited: deadline,
            })?
    }

    async fn poll(&self, mut run: Run) -> Result<Run> {
        loop {
            match run.status {
                Status::Completed | Status::RequiresAction => {
                    tracing::debug!(run_id = %run.id, status = %run.status, "run settled");
                    return Ok(run);
                }
                Status::Incomplete => {
                    let reason = run
                        .incomplete_details
                        .map(|details| details.reason)
                        .unwrap_or_else(|| "unknown".to_string());
                    return Err(RelayError::RunIncomplete {
                        run_id: run.id,
                        reason,
                    });
                }
                Status::Failed | Status::Cancelled | Status::Expired => {
                    if let Some(last_error) = &run.last_error {
                        tracing::warn!(
                            run_id = %run.id,
                            code = %last_error.code,
                            message = %last_error.message,
                            "run reported an error"
                        );
                    }
                    return Err(RelayError::RunTerminalFailure {
                        run_id: run.id,
                        status: run.status,
                    });
                }
                Status::Queued | Status::InProgress | Status::Cancelling => {
                    tokio::time::sleep(self.settings.poll_interval).await;
                    run = self.api.get_run(&run.thread_id, &run.id).await?;
                }
            }
        }
    }

    /// Answers every pending tool call of `run`, in call order, and stores
    /// the values the validator accepted on the user.
    async fn satisfy_tool_calls(
        &self,
        thread_id: &str,
        run: &Run,
        user: &UserRecord,
        question: &str,
    ) -> Result<Run> {
        let calls = run.pending_tool_calls();
        let mut tool_outputs = Vec::with_capacity(calls.len());
        let mut validated: Vec<String> = Vec::new();

        for call in calls {
            let output = match tools::parse_save_value(call) {
                Ok(value) => {
                    if self.validator.validate(question, &value).await {
                        if !validated.contains(&value) {
                            validated.push(value.clone());
                        }
                    } else {
                        tracing::debug!(tool_call_id = %call.id, value = %value, "value rejected");
                    }
                    value
                }
                Err(err) => {
                    tracing::warn!(error = %err, "dropping tool call value");
                    String::new()
                }
            };
            tool_outputs.push(ToolOutput {
                tool_call_id: call.id.clone(),
                output,
            });
        }

        // The run has to be resumed even when the user row cannot be written.
        if let Err(err) = self
            .users
            .update_user(user.id, UserUpdate::values(validated))
            .await
        {
            tracing::warn!(user_id = user.id, error = %err, "could not store validated values");
        }

        let resumed = self
            .api
            .submit_tool_outputs(thread_id, &run.id, SubmitToolOutputsRequest { tool_outputs })
            .await?;
        tracing::debug!(run_id = %resumed.id, "tool outputs submitted");
        Ok(resumed)
    }

    /// The first text of the newest message, without citation markers and
    /// with the first cited file named at the end.
    async fn extract_answer(&self, thread_id: &str) -> Result<String> {
        let messages = self.api.list_messages(thread_id).await?;
        let text = messages
            .first()
            .and_then(Message::first_text)
            .ok_or_else(|| RelayError::EmptyAnswer {
                thread_id: thread_id.to_string(),
            })?;

        let answer = citations::strip_markers(text);
        let Some(file_id) = text.cited_file_ids().next() else {
            return Ok(answer);
        };
        match self.api.get_file(file_id).await {
            Ok(file) => Ok(citations::with_attribution(&answer, &file.filename)),
            Err(err) => {
                tracing::warn!(file_id, error = %err, "cited file lookup failed");
                Ok(answer)
            }
        }
    }
}

fn settle(thread_id: &str, user: &UserRecord, outcome: Result<String>) -> Option<String> {
    match outcome {
        Ok(answer) => Some(answer),
        Err(err) => {
            tracing::error!(thread_id, user_id = user.id, error = %err, "exchange failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{
            assistant_message, citation, file, requires_action, run, tool_call, ScriptedApi,
        },
        users::MemoryUserStore,
    };
    use async_trait::async_trait;

    /// Accepts exactly the listed values.
    struct Accepting(Vec<&'static str>);

    #[async_trait]
    impl ValueValidator for Accepting {
        async fn validate(&self, _context: &str, candidate: &str) -> bool {
            self.0.contains(&candidate)
        }
    }

    fn fast() -> RunSettings {
        RunSettings {
            poll_interval: Duration::from_millis(1),
            deadline: Duration::from_millis(200),
            max_action_cycles: 1,
        }
    }

    async fn setup(
        accepting: Vec<&'static str>,
    ) -> (Arc<ScriptedApi>, Arc<MemoryUserStore>, RunDriver, UserRecord) {
        let api = Arc::new(ScriptedApi::new());
        let users = Arc::new(MemoryUserStore::new());
        let user = users.create_user(42).await.unwrap();
        let driver = RunDriver::new(api.clone(), users.clone(), Arc::new(Accepting(accepting)))
            .with_settings(fast());
        (api, users, driver, user)
    }

    #[tokio::test]
    async fn completed_run_returns_message_text() {
        let (api, _, driver, user) = setup(vec![]).await;
        {
            let mut script = api.script();
            script.polls.push_back(run("run_1", Status::Completed));
            script.messages.push(assistant_message("Hello, friend", vec![]));
        }

        let answer = driver.exchange("thread_1", "asst_1", &user, "Hi").await;

        assert_eq!(answer.as_deref(), Some("Hello, friend"));
        let script = api.script();
        assert_eq!(script.created_messages.len(), 1);
        assert_eq!(script.created_messages[0].1.content, "Hi");
        assert_eq!(script.run_requests[0].assistant_id, "asst_1");
    }

    #[tokio::test]
    async fn answer_without_markers_is_returned_verbatim() {
        let (api, _, driver, user) = setup(vec![]).await;
        {
            let mut script = api.script();
            script.polls.push_back(run("run_1", Status::Completed));
            script.messages.push(assistant_message("  Hello, friend\n", vec![]));
        }

        let answer = driver.exchange("thread_1", "asst_1", &user, "Hi").await;

        assert_eq!(answer.as_deref(), Some("  Hello, friend\n"));
    }

    #[tokio::test]
    async fn citations_are_replaced_by_attribution() {
        let (api, _, driver, user) = setup(vec![]).await;
        {
            let mut script = api.script();
            script.polls.push_back(run("run_1", Status::Completed));
            script.messages.push(assistant_message(
                "The answer is 5【source:doc1】.",
                vec![citation("【source:doc1】", "file_1")],
            ));
            script.files.insert("file_1".to_string(), file("file_1", "facts.docx"));
        }

        let answer = driver.exchange("thread_1", "asst_1", &user, "q").await.unwrap();

        assert!(!answer.contains('【'));
        assert!(answer.starts_with("The answer is 5."));
        assert!(answer.ends_with("facts.docx"));
    }

    #[tokio::test]
    async fn failed_file_lookup_keeps_answer() {
        let (api, _, driver, user) = setup(vec![]).await;
        {
            let mut script = api.script();
            script.polls.push_back(run("run_1", Status::Completed));
            script.messages.push(assistant_message(
                "Five【4:0†source】",
                vec![citation("【4:0†source】", "file_missing")],
            ));
        }

        let answer = driver.exchange("thread_1", "asst_1", &user, "q").await;
        assert_eq!(answer.as_deref(), Some("Five"));
    }

    #[tokio::test]
    async fn tool_cycle_stores_validated_values_and_answers_every_call() {
        let (api, users, driver, user) = setup(vec!["hiking"]).await;
        {
            let mut script = api.script();
            script.polls.push_back(requires_action(
                "run_1",
                vec![
                    tool_call("call_1", "save_value", r#"{"value":"hiking"}"#),
                    tool_call("call_2", "save_value", r#"{"value":"the weather"}"#),
                ],
            ));
            script.polls.push_back(run("run_1", Status::Completed));
            script.messages.push(assistant_message("Noted!", vec![]));
        }

        let answer = driver.exchange("thread_1", "asst_1", &user, "I like hiking").await;

        assert_eq!(answer.as_deref(), Some("Noted!"));
        let stored = users.user(user.id).await.unwrap();
        assert_eq!(stored.values, ["hiking"]);
        let script = api.script();
        assert_eq!(script.submitted.len(), 1);
        let outputs: Vec<_> = script.submitted[0]
            .tool_outputs
            .iter()
            .map(|o| (o.tool_call_id.as_str(), o.output.as_str()))
            .collect();
        assert_eq!(outputs, [("call_1", "hiking"), ("call_2", "the weather")]);
    }

    #[tokio::test]
    async fn malformed_tool_call_gets_empty_output() {
        let (api, users, driver, user) = setup(vec!["music"]).await;
        {
            let mut script = api.script();
            script.polls.push_back(requires_action(
                "run_1",
                vec![
                    tool_call("call_1", "save_value", "not json"),
                    tool_call("call_2", "save_value", r#"{"other":"x"}"#),
                    tool_call("call_3", "save_value", r#"{"value":"music"}"#),
                ],
            ));
            script.polls.push_back(run("run_1", Status::Completed));
            script.messages.push(assistant_message("Ok", vec![]));
        }

        driver.exchange("thread_1", "asst_1", &user, "q").await.unwrap();

        assert_eq!(users.user(user.id).await.unwrap().values, ["music"]);
        let script = api.script();
        let outputs: Vec<_> = script.submitted[0]
            .tool_outputs
            .iter()
            .map(|o| o.output.as_str())
            .collect();
        assert_eq!(outputs, ["", "", "music"]);
    }

    #[tokio::test]
    async fn non_completed_terminal_statuses_yield_none() {
        for status in [
            Status::Failed,
            Status::Cancelled,
            Status::Expired,
            Status::Incomplete,
        ] {
            let (api, _, driver, user) = setup(vec![]).await;
            api.script().polls.push_back(run("run_1", status));
            assert_eq!(driver.exchange("thread_1", "asst_1", &user, "q").await, None, "{status}");
        }
    }

    #[tokio::test]
    async fn failure_after_tool_cycle_yields_none() {
        let (api, _, driver, user) = setup(vec![]).await;
        {
            let mut script = api.script();
            script.polls.push_back(requires_action(
                "run_1",
                vec![tool_call("call_1", "save_value", r#"{"value":"x"}"#)],
            ));
            script.polls.push_back(run("run_1", Status::Expired));
        }
        assert_eq!(driver.exchange("thread_1", "asst_1", &user, "q").await, None);
        assert_eq!(api.script().submitted.len(), 1);
    }

    #[tokio::test]
    async fn second_action_cycle_exceeds_cap() {
        let (api, _, driver, user) = setup(vec![]).await;
        {
            let mut script = api.script();
            for _ in 0..2 {
                script.polls.push_back(requires_action(
                    "run_1",
                    vec![tool_call("call_1", "save_value", r#"{"value":"x"}"#)],
                ));
            }
        }
        let run = driver.ask("thread_1", "asst_1", "q").await.unwrap();
        let err = driver.resolve(run, &user, "q").await.unwrap_err();
        assert!(matches!(err, RelayError::TooManyActionCycles { cycles: 1, .. }));
    }

    #[tokio::test]
    async fn raised_cap_allows_another_cycle() {
        let (api, users, _, user) = setup(vec![]).await;
        let driver = RunDriver::new(api.clone(), users, Arc::new(Accepting(vec![])))
            .with_settings(RunSettings {
                max_action_cycles: 2,
                ..fast()
            });
        {
            let mut script = api.script();
            for id in ["call_1", "call_2"] {
                script.polls.push_back(requires_action(
                    "run_1",
                    vec![tool_call(id, "save_value", r#"{"value":"x"}"#)],
                ));
            }
            script.polls.push_back(run("run_1", Status::Completed));
            script.messages.push(assistant_message("Done", vec![]));
        }
        let answer = driver.exchange("thread_1", "asst_1", &user, "q").await;
        assert_eq!(answer.as_deref(), Some("Done"));
        assert_eq!(api.script().submitted.len(), 2);
    }

    #[tokio::test]
    async fn stuck_run_times_out() {
        let (api, _, driver, _) = setup(vec![]).await;
        let err = driver.ask("thread_1", "asst_1", "q").await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::RunTimeout { ref thread_id, .. } if thread_id == "thread_1"
        ));
        assert!(!api.script().run_requests.is_empty());
    }

    #[tokio::test]
    async fn hung_tool_submission_is_cut_off_by_the_deadline() {
        let (api, _, driver, user) = setup(vec!["hiking"]).await;
        {
            let mut script = api.script();
            script.polls.push_back(requires_action(
                "run_1",
                vec![tool_call("call_1", "save_value", r#"{"value":"hiking"}"#)],
            ));
            script.stalled.insert("submit_tool_outputs");
        }

        let answer = tokio::time::timeout(
            Duration::from_secs(5),
            driver.exchange("thread_1", "asst_1", &user, "I like hiking"),
        )
        .await
        .expect("the exchange should end at the driver deadline");

        assert_eq!(answer, None);
    }

    #[tokio::test]
    async fn hung_message_send_times_out() {
        let (api, _, driver, _) = setup(vec![]).await;
        api.script().stalled.insert("create_message");

        let err = driver.ask("thread_1", "asst_1", "q").await.unwrap_err();

        assert!(matches!(err, RelayError::RunTimeout { waited, .. } if waited == fast().deadline));
        assert!(api.script().run_requests.is_empty());
    }

    #[tokio::test]
    async fn remote_errors_yield_none() {
        let (api, _, driver, user) = setup(vec![]).await;
        api.script().failing.insert("create_run");
        assert_eq!(driver.exchange("thread_1", "asst_1", &user, "q").await, None);

        let (api, _, driver, user) = setup(vec![]).await;
        {
            let mut script = api.script();
            script.polls.push_back(run("run_1", Status::Completed));
            script.failing.insert("list_messages");
        }
        assert_eq!(driver.exchange("thread_1", "asst_1", &user, "q").await, None);
    }

    #[tokio::test]
    async fn completed_run_without_text_yields_none() {
        let (api, _, driver, user) = setup(vec![]).await;
        api.script().polls.push_back(run("run_1", Status::Completed));
        let run = driver.ask("thread_1", "asst_1", "q").await.unwrap();
        let err = driver.resolve(run, &user, "q").await.unwrap_err();
        assert!(matches!(err, RelayError::EmptyAnswer { .. }));
    }
}
