//! The reasoning session bound to the connected tools.

use std::future::Future;

use serde_json::json;
use storage::{Event, EventKind, EventStore, SessionId};
use tracing::{debug, info, warn};

use crate::model::{Backend, Message, ModelRequest, ToolResult, Usage};
use crate::tools::ToolHost;
use crate::{Error, Result};

/// Tool rounds allowed per instruction before the session gives up.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 24;

/// Something that turns an instruction into text, one instruction at a time.
///
/// Implementations hold conversational state and are driven exclusively by
/// the [`RequestSerializer`](crate::RequestSerializer).
pub trait Agent: Send + 'static {
    /// Process one instruction to completion.
    fn run(&mut self, instruction: &str) -> impl Future<Output = Result<String>> + Send;

    /// Release the agent. Called once, after the last instruction.
    fn end(self) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// A long-lived conversation with a model that may call tools.
///
/// History accumulates across instructions. An instruction that fails leaves
/// no trace in the history apart from its transcript events.
pub struct AgentSession<B, H> {
    id: SessionId,
    name: String,
    preamble: String,
    backend: B,
    tools: H,
    store: EventStore,
    messages: Vec<Message>,
    usage: Usage,
    max_tool_rounds: usize,
}

impl<B: Backend, H: ToolHost> AgentSession<B, H> {
    /// Create a session and record its start.
    pub fn new(
        name: impl Into<String>,
        preamble: impl Into<String>,
        backend: B,
        tools: H,
        store: EventStore,
    ) -> Result<Self> {
        let id = SessionId::new();
        let name = name.into();
        store.append(&Event::new(
            id,
            EventKind::SessionStart {
                agent: name.clone(),
            },
        ))?;
        info!(session = %id, agent = %name, tools = tools.specs().len(), "agent session created");

        Ok(Self {
            id,
            name,
            preamble: preamble.into(),
            backend,
            tools,
            store,
            messages: Vec::new(),
            usage: Usage::default(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        })
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Tokens consumed by every model call so far.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Run one instruction through the model and tool loop.
    ///
    /// Every failure is reported as [`Error::Agent`].
    pub async fn run(&mut self, instruction: &str) -> Result<String> {
        let checkpoint = self.messages.len();

        match self.turn(instruction).await {
            Ok(text) => {
                if let Err(e) = self.record(EventKind::Reply {
                    content: text.clone(),
                }) {
                    self.messages.truncate(checkpoint);
                    warn!(session = %self.id, error = %e, "could not record reply");
                    return Err(Error::Agent(e.to_string()));
                }
                Ok(text)
            }
            Err(e) => {
                self.messages.truncate(checkpoint);
                warn!(session = %self.id, error = %e, "instruction failed");
                if let Err(log_error) = self.record(EventKind::Failure {
                    message: e.to_string(),
                }) {
                    warn!(session = %self.id, error = %log_error, "could not record failure");
                }
                Err(match e {
                    Error::Agent(_) => e,
                    other => Error::Agent(other.to_string()),
                })
            }
        }
    }

    async fn turn(&mut self, instruction: &str) -> Result<String> {
        self.record(EventKind::Instruction {
            content: instruction.to_string(),
        })?;
        self.messages.push(Message::user(instruction));

        for round in 1..=self.max_tool_rounds {
            let response = self
                .backend
                .call(ModelRequest {
                    system: Some(&self.preamble),
                    messages: &self.messages,
                    tools: self.tools.specs(),
                })
                .await
                .map_err(|e| {
                    if e.is_overloaded() {
                        warn!(session = %self.id, round, "model provider is overloaded");
                    }
                    Error::Agent(format!("model call failed: {e}"))
                })?;

            self.usage.input_tokens += response.usage.input_tokens;
            self.usage.output_tokens += response.usage.output_tokens;

            let calls = response.message.tool_calls();
            if calls.is_empty() {
                let text = response.message.text();
                if text.trim().is_empty() {
                    return Err(Error::Agent("model returned an empty reply".into()));
                }
                self.messages.push(response.message);
                debug!(session = %self.id, round, "final answer");
                return Ok(text);
            }
            self.messages.push(response.message);

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                self.record(EventKind::ToolCall {
                    name: call.name.clone(),
                    input: call.input.clone(),
                })?;
                let outcome = self.tools.execute(call).await;

                let (output, is_error) = match &outcome {
                    Ok(output) => (output.clone(), false),
                    Err(e) => {
                        warn!(session = %self.id, tool = %call.name, error = %e, "tool call failed");
                        (json!({ "error": e.to_string() }), true)
                    }
                };
                self.record(EventKind::ToolResult {
                    name: call.name.clone(),
                    output,
                    is_error,
                })?;
                results.push(ToolResult::for_call(call, outcome));
            }
            self.messages.push(Message::tool_results(results));
        }

        Err(Error::Agent(format!(
            "no final answer after {} tool rounds",
            self.max_tool_rounds
        )))
    }

    /// Record the end of the session and release it.
    pub fn end(self) -> Result<()> {
        self.record(EventKind::SessionEnd)?;
        info!(session = %self.id, tokens = self.usage.total_tokens(), "agent session ended");
        Ok(())
    }

    fn record(&self, kind: EventKind) -> Result<()> {
        self.store.append(&Event::new(self.id, kind))?;
        Ok(())
    }
}

impl<B, H> Agent for AgentSession<B, H>
where
    B: Backend + 'static,
    H: ToolHost + 'static,
{
    async fn run(&mut self, instruction: &str) -> Result<String> {
        AgentSession::run(self, instruction).await
    }

    fn end(self) -> Result<()> {
        AgentSession::end(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelError, Part};
    use crate::testing::{FakeHost, ScriptedBackend};
    use crate::tools::ToolError;

    fn session(backend: ScriptedBackend, host: FakeHost) -> AgentSession<ScriptedBackend, FakeHost> {
        AgentSession::new(
            "analyst",
            "be precise",
            backend,
            host,
            EventStore::in_memory().unwrap(),
        )
        .unwrap()
    }

    fn transcript(session: &AgentSession<ScriptedBackend, FakeHost>) -> Vec<&'static str> {
        session
            .store
            .load_session(session.id)
            .unwrap()
            .into_iter()
            .map(|e| e.kind.name())
            .collect()
    }

    #[tokio::test]
    async fn plain_reply_is_returned_and_recorded() {
        let backend = ScriptedBackend::new().reply("There are 42 contacts.");
        let mut session = session(backend, FakeHost::new());

        let text = session.run("How many contacts?").await.unwrap();

        assert_eq!(text, "There are 42 contacts.");
        assert_eq!(session.messages().len(), 2);
        assert_eq!(transcript(&session), ["session_start", "instruction", "reply"]);
    }

    #[tokio::test]
    async fn tool_calls_are_executed_and_fed_back() {
        let backend = ScriptedBackend::new()
            .tool_call("call_1", "count", json!({"collection": "Contact"}))
            .reply("There are 42 contacts.");
        let host = FakeHost::new().with_result("count", Ok(json!(42)));
        let mut session = session(backend.clone(), host);

        let text = session.run("How many contacts?").await.unwrap();

        assert_eq!(text, "There are 42 contacts.");
        assert_eq!(session.tools.executed().len(), 1);

        let second_request = &backend.requests()[1];
        let fed_back = second_request.last().unwrap();
        assert!(matches!(
            &fed_back.parts[0],
            Part::ToolResult(ToolResult::Success { output, .. }) if *output == json!(42)
        ));
        assert_eq!(
            transcript(&session),
            ["session_start", "instruction", "tool_call", "tool_result", "reply"]
        );
    }

    #[tokio::test]
    async fn tool_errors_reach_the_model_instead_of_failing() {
        let backend = ScriptedBackend::new()
            .tool_call("call_1", "find", json!({}))
            .reply("The query failed, try again later.");
        let host = FakeHost::new().with_result("find", Err(ToolError::Execution("bad filter".into())));
        let mut session = session(backend.clone(), host);

        assert!(session.run("Find users").await.is_ok());
        let fed_back = backend.requests()[1].last().unwrap().clone();
        assert!(matches!(&fed_back.parts[0], Part::ToolResult(r) if r.is_failure()));
    }

    #[tokio::test]
    async fn model_failure_rolls_back_history() {
        let backend = ScriptedBackend::new()
            .reply("First answer")
            .tool_call("call_1", "count", json!({}))
            .error(ModelError::Api {
                status: 503,
                message: "overloaded".into(),
            });
        let host = FakeHost::new().with_result("count", Ok(json!(1)));
        let mut session = session(backend, host);

        session.run("first").await.unwrap();
        let err = session.run("second").await.unwrap_err();

        assert!(matches!(err, Error::Agent(ref m) if m.contains("overloaded")));
        assert_eq!(session.messages().len(), 2);
        assert_eq!(transcript(&session).last(), Some(&"failure"));
    }

    #[tokio::test]
    async fn tool_round_limit_is_an_agent_failure() {
        let backend = ScriptedBackend::new()
            .tool_call("call_1", "count", json!({}))
            .tool_call("call_2", "count", json!({}));
        let host = FakeHost::new().with_result("count", Ok(json!(1)));
        let mut session = session(backend, host).with_max_tool_rounds(2);

        let err = session.run("loop forever").await.unwrap_err();

        assert!(matches!(err, Error::Agent(ref m) if m.contains("2 tool rounds")));
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn unrecorded_reply_is_not_kept_in_history() {
        let path = std::env::temp_dir().join(format!("agent-reply-{}.db", SessionId::new()));
        let mut session = AgentSession::new(
            "analyst",
            "be precise",
            ScriptedBackend::new().reply("First answer").reply("Second answer"),
            FakeHost::new(),
            EventStore::open(&path).unwrap(),
        )
        .unwrap();
        session.run("first").await.unwrap();

        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_replies BEFORE INSERT ON events \
                 WHEN NEW.kind = 'reply' BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();
        let err = session.run("second").await.unwrap_err();
        let _ = std::fs::remove_file(&path);

        assert!(matches!(err, Error::Agent(ref m) if m.contains("disk full")));
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn end_records_session_end() {
        let path = std::env::temp_dir().join(format!("agent-end-{}.db", SessionId::new()));
        let session = AgentSession::new(
            "analyst",
            "be precise",
            ScriptedBackend::new(),
            FakeHost::new(),
            EventStore::open(&path).unwrap(),
        )
        .unwrap();
        let id = session.id();

        session.end().unwrap();

        let events = EventStore::open(&path).unwrap().load_session(id).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(events.last().map(|e| e.kind.name()), Some("session_end"));
    }
}
