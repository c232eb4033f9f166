//! In-process fakes for tool processes and model backends.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::agent::Agent;
use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolSpec,
    Usage,
};
use crate::tools::{Connector, LaunchDescriptor, ToolClient, ToolError, ToolHost};

/// Shared record of what fake clients were asked to do.
#[derive(Clone, Default)]
pub struct FakeLog {
    inner: Arc<Mutex<LogInner>>,
}

#[derive(Default)]
struct LogInner {
    closed: Vec<String>,
    close_attempts: usize,
    calls: Vec<String>,
}

impl FakeLog {
    pub fn closed(&self) -> Vec<String> {
        self.inner.lock().unwrap().closed.clone()
    }

    pub fn close_attempts(&self) -> usize {
        self.inner.lock().unwrap().close_attempts
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }
}

/// Behaviour of one fake tool process.
#[derive(Clone, Default)]
pub struct FakeTool {
    tools: Vec<String>,
    connect_error: Option<String>,
    connect_delay: Option<Duration>,
    close_error: Option<String>,
}

impl FakeTool {
    pub fn offering(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_connect(message: &str) -> Self {
        Self {
            connect_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub fn failing_close(mut self, message: &str) -> Self {
        self.close_error = Some(message.into());
        self
    }
}

/// Connector that hands out [`FakeClient`]s keyed by descriptor name.
#[derive(Default)]
pub struct FakeConnector {
    tools: HashMap<String, FakeTool>,
    log: FakeLog,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: &str, tool: FakeTool) -> Self {
        self.tools.insert(name.into(), tool);
        self
    }

    pub fn log(&self) -> FakeLog {
        self.log.clone()
    }
}

impl Connector for FakeConnector {
    type Client = FakeClient;

    async fn connect(&self, descriptor: &LaunchDescriptor) -> Result<FakeClient, ToolError> {
        let tool = self
            .tools
            .get(&descriptor.name)
            .cloned()
            .ok_or_else(|| ToolError::Connect(format!("no fake named {}", descriptor.name)))?;

        if let Some(delay) = tool.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = tool.connect_error {
            return Err(ToolError::Connect(message));
        }

        Ok(FakeClient {
            name: descriptor.name.clone(),
            tools: tool.tools,
            close_error: tool.close_error,
            log: self.log.clone(),
        })
    }
}

/// A connected fake tool. Calls echo their name and arguments back.
pub struct FakeClient {
    name: String,
    tools: Vec<String>,
    close_error: Option<String>,
    log: FakeLog,
}

impl FakeClient {
    pub fn echoing() -> Self {
        Self {
            name: "echo".into(),
            tools: Vec::new(),
            close_error: None,
            log: FakeLog::default(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.calls()
    }
}

impl ToolClient for FakeClient {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
        Ok(self
            .tools
            .iter()
            .map(|name| ToolSpec {
                name: name.clone(),
                description: format!("{name} from {}", self.name),
                schema: json!({"type": "object"}),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Value, ToolError> {
        self.log.inner.lock().unwrap().calls.push(name.to_string());
        Ok(json!({"tool": name, "arguments": arguments}))
    }

    async fn close(&self) -> Result<(), ToolError> {
        let mut log = self.log.inner.lock().unwrap();
        log.close_attempts += 1;
        match &self.close_error {
            Some(message) => Err(ToolError::Execution(message.clone())),
            None => {
                log.closed.push(self.name.clone());
                Ok(())
            }
        }
    }
}

/// Tool host with canned results per tool name.
#[derive(Default)]
pub struct FakeHost {
    specs: Vec<ToolSpec>,
    results: HashMap<String, Result<Value, ToolError>>,
    executed: Mutex<Vec<ToolCall>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, tool: &str, result: Result<Value, ToolError>) -> Self {
        self.specs.push(ToolSpec {
            name: tool.into(),
            description: String::new(),
            schema: json!({"type": "object"}),
        });
        self.results.insert(tool.into(), result);
        self
    }

    pub fn executed(&self) -> Vec<ToolCall> {
        self.executed.lock().unwrap().clone()
    }
}

impl ToolHost for FakeHost {
    fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        self.executed.lock().unwrap().push(call.clone());
        self.results
            .get(&call.name)
            .cloned()
            .unwrap_or_else(|| Err(ToolError::NotFound(call.name.clone())))
    }
}

/// Backend that replays queued responses and records each request.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<VecDeque<Result<Message, ModelError>>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain text reply.
    pub fn reply(self, text: &str) -> Self {
        self.push(Ok(Message {
            role: Role::Assistant,
            parts: vec![Part::Text(text.into())],
        }))
    }

    /// Queue a reply that asks for one tool call.
    pub fn tool_call(self, id: &str, name: &str, input: Value) -> Self {
        self.push(Ok(Message {
            role: Role::Assistant,
            parts: vec![Part::ToolCall(ToolCall {
                id: id.into(),
                name: name.into(),
                input,
            })],
        }))
    }

    pub fn error(self, error: ModelError) -> Self {
        self.push(Err(error))
    }

    fn push(self, entry: Result<Message, ModelError>) -> Self {
        self.script.lock().unwrap().push_back(entry);
        self
    }

    /// Message histories sent with each call, oldest first.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

impl Backend for ScriptedBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        self.requests
            .lock()
            .unwrap()
            .push(request.messages.to_vec());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::InvalidResponse("script exhausted".into())));
        next.map(|message| ModelResponse {
            message,
            usage: Usage::default(),
        })
    }
}

/// Agent that answers every instruction with the same text.
#[derive(Clone)]
pub struct CannedAgent {
    reply: std::result::Result<String, String>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl CannedAgent {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.into()),
            seen: Arc::default(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.into()),
            seen: Arc::default(),
        }
    }

    /// Instructions received so far.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Agent for CannedAgent {
    async fn run(&mut self, instruction: &str) -> crate::Result<String> {
        self.seen.lock().unwrap().push(instruction.to_string());
        self.reply.clone().map_err(crate::Error::Agent)
    }
}
