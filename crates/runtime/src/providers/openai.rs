//! OpenAI chat-completions backend.

use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolResult,
    ToolSpec, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default API root; `/chat/completions` is appended.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini-2025-04-14";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum ApiMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ApiToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
}

impl OpenAiBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_API_BASE.to_string(),
            max_tokens: None,
        }
    }

    /// Point at an OpenAI-compatible endpoint.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn build(self) -> OpenAiBackend {
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        OpenAiBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            endpoint,
            max_tokens: self.max_tokens,
        }
    }
}

/// OpenAI chat-completions backend with function calling.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: Option<u32>,
}

impl OpenAiBackend {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(api_key, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn messages_to_api(system: Option<&str>, messages: &[Message]) -> Vec<ApiMessage> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system {
            out.push(ApiMessage::System {
                content: system.to_string(),
            });
        }

        for msg in messages {
            match msg.role {
                Role::System => out.push(ApiMessage::System {
                    content: msg.text(),
                }),
                Role::Assistant => {
                    let text = msg.text();
                    out.push(ApiMessage::Assistant {
                        content: (!text.is_empty()).then_some(text),
                        tool_calls: msg.tool_calls().iter().map(Self::call_to_api).collect(),
                    });
                }
                Role::User => {
                    // Tool results become one `tool` message each.
                    let mut text = String::new();
                    for part in &msg.parts {
                        match part {
                            Part::Text(t) => text.push_str(t),
                            Part::ToolResult(result) => out.push(Self::result_to_api(result)),
                            Part::ToolCall(_) => {}
                        }
                    }
                    if !text.is_empty() {
                        out.push(ApiMessage::User { content: text });
                    }
                }
            }
        }
        out
    }

    fn call_to_api(call: &ToolCall) -> ApiToolCall {
        let arguments = match &call.input {
            Value::Null => "{}".to_string(),
            input => input.to_string(),
        };
        ApiToolCall {
            id: call.id.clone(),
            kind: "function".to_string(),
            function: ApiFunctionCall {
                name: call.name.clone(),
                arguments,
            },
        }
    }

    fn result_to_api(result: &ToolResult) -> ApiMessage {
        let (tool_call_id, content) = match result {
            ToolResult::Success {
                tool_call_id,
                output,
            } => {
                let content = match output {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (tool_call_id.clone(), content)
            }
            ToolResult::Failure {
                tool_call_id,
                error,
            } => (tool_call_id.clone(), format!("error: {error}")),
        };
        ApiMessage::Tool {
            tool_call_id,
            content,
        }
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool {
        ApiTool {
            kind: "function",
            function: ApiFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.schema.clone(),
            },
        }
    }

    fn response_to_message(response: ApiResponse) -> Result<Message, ModelError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("no choices".into()))?;

        let mut parts = Vec::new();
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            parts.push(Part::Text(text));
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            let input = if call.function.arguments.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    ModelError::InvalidResponse(format!(
                        "arguments for {}: {e}",
                        call.function.name
                    ))
                })?
            };
            parts.push(Part::ToolCall(ToolCall {
                id: call.id,
                name: call.function.name,
                input,
            }));
        }

        Ok(Message {
            role: Role::Assistant,
            parts,
        })
    }
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({})", self.model)
    }
}

impl Backend for OpenAiBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_request = ApiRequest {
            model: &self.model,
            messages: Self::messages_to_api(request.system, request.messages),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
            max_completion_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(ModelError::Api { status, message });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let usage = api_response
            .usage
            .as_ref()
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        let message = Self::response_to_message(api_response)?;

        Ok(ModelResponse { message, usage })
    }
}
