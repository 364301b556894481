//! OpenAI-compatible chat completions backend.
//!
//! One client covers every configured provider family: OpenAI
//! natively, Anthropic and Google through their chat-completions
//! compatibility endpoints. Streaming responses are decoded with
//! `core::SseDecoder` and re-emitted as `StreamEvent`s over a channel.

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::core::SseDecoder;

use super::{
    ChatRequest, ChatResponse, Provider, StreamEvent, ToolCall, ToolContinueRequest,
    ToolDefinition, Usage,
};

pub struct OpenAiCompatProvider {
    client: HttpClient,
    url: String,
    api_key: String,
    name: &'static str,
}

impl OpenAiCompatProvider {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, name: &'static str) -> Self {
        Self {
            client: HttpClient::new(),
            url: url.into(),
            api_key: api_key.into(),
            name,
        }
    }

    fn build_messages(request: &ChatRequest) -> Vec<WireMessage> {
        let mut messages = vec![WireMessage::system(&request.system)];
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: m.role.as_str().into(),
            content: Some(m.content.clone()),
            tool_calls: None,
            tool_call_id: None,
        }));
        messages
    }

    /// Continuation message list: assistant tool_calls stub, then one
    /// `tool` message per result. The upstream API requires the
    /// assistant message before any tool results.
    fn build_continuation(request: &ToolContinueRequest) -> Vec<WireMessage> {
        let mut messages = vec![WireMessage::system(&request.system)];
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: m.role.as_str().into(),
            content: Some(m.content.clone()),
            tool_calls: None,
            tool_call_id: None,
        }));

        if !request.tool_results.is_empty() {
            let tool_calls = request
                .tool_results
                .iter()
                .map(|r| WireToolCall {
                    id: r.call_id.clone(),
                    call_type: "function".into(),
                    function: WireToolCallFunction {
                        name: r.name.clone(),
                        // Arguments were already executed; only the
                        // structure matters here.
                        arguments: "{}".into(),
                    },
                })
                .collect();

            messages.push(WireMessage {
                role: "assistant".into(),
                content: None,
                tool_calls: Some(tool_calls),
                tool_call_id: None,
            });

            for result in &request.tool_results {
                messages.push(WireMessage {
                    role: "tool".into(),
                    content: Some(result.output.clone()),
                    tool_calls: None,
                    tool_call_id: Some(result.call_id.clone()),
                });
            }
        }

        messages
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Option<Vec<WireTool>> {
        if tools.is_empty() {
            return None;
        }
        Some(
            tools
                .iter()
                .map(|t| WireTool {
                    tool_type: "function".into(),
                    function: WireFunction {
                        name: t.name.clone(),
                        description: Some(t.description.clone()),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
        )
    }

    async fn post(&self, body: &CompletionRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("(failed to read body: {e})"));
            anyhow::bail!("{} API error {}: {}", self.name, status, text);
        }

        Ok(response)
    }

    /// Decode the upstream SSE body and forward provider events.
    ///
    /// Parallel tool calls arrive interleaved by index; each index is
    /// tracked until both id and name are known, then started.
    async fn pump_sse(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
        struct InFlightCall {
            id: String,
            name: String,
            started: bool,
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut calls: HashMap<usize, InFlightCall> = HashMap::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                    break;
                }
            };

            for frame in decoder.push(&chunk) {
                if frame.is_done() {
                    continue;
                }
                let Some(payload) = frame.try_parse::<StreamChunk>() else {
                    continue;
                };

                for choice in payload.choices {
                    let delta = choice.delta;

                    if let Some(content) = delta.content
                        && !content.is_empty()
                    {
                        let _ = tx.send(StreamEvent::TextDelta(content)).await;
                    }

                    if let Some(reasoning) = delta.reasoning_content
                        && !reasoning.is_empty()
                    {
                        let _ = tx.send(StreamEvent::ReasoningDelta(reasoning)).await;
                    }

                    for tc in delta.tool_calls.unwrap_or_default() {
                        let call = calls.entry(tc.index).or_insert_with(|| InFlightCall {
                            id: String::new(),
                            name: String::new(),
                            started: false,
                        });

                        if let Some(id) = tc.id {
                            call.id = id;
                        }
                        if let Some(func) = &tc.function
                            && let Some(name) = &func.name
                        {
                            call.name = name.clone();
                        }

                        if !call.started && !call.id.is_empty() && !call.name.is_empty() {
                            call.started = true;
                            let _ = tx
                                .send(StreamEvent::FunctionCallStart {
                                    call_id: call.id.clone(),
                                    name: call.name.clone(),
                                })
                                .await;
                        }

                        if let Some(func) = &tc.function
                            && let Some(args) = &func.arguments
                            && !args.is_empty()
                            && call.started
                        {
                            let _ = tx
                                .send(StreamEvent::FunctionCallDelta {
                                    call_id: call.id.clone(),
                                    arguments_delta: args.clone(),
                                })
                                .await;
                        }
                    }

                    if choice.finish_reason.is_some() {
                        for (_, call) in calls.drain() {
                            if call.started {
                                let _ = tx
                                    .send(StreamEvent::FunctionCallEnd { call_id: call.id })
                                    .await;
                            }
                        }
                    }
                }

                if let Some(usage) = payload.usage {
                    let _ = tx.send(StreamEvent::Usage(usage.into())).await;
                }
            }
        }

        let _ = tx.send(StreamEvent::Done).await;
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn create_stream(&self, request: ChatRequest) -> Result<mpsc::Receiver<StreamEvent>> {
        let body = CompletionRequest {
            model: request.model.clone(),
            messages: Self::build_messages(&request),
            tools: Self::convert_tools(&request.tools),
            stream: true,
            max_tokens: request.max_tokens,
        };

        let response = self.post(&body).await?;

        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(Self::pump_sse(response, tx));
        Ok(rx)
    }

    async fn create(&self, request: ChatRequest) -> Result<ChatResponse> {
        let body = CompletionRequest {
            model: request.model.clone(),
            messages: Self::build_messages(&request),
            tools: Self::convert_tools(&request.tools),
            stream: false,
            max_tokens: request.max_tokens,
        };

        let response = self.post(&body).await?;
        let result: CompletionResponse = response.json().await?;

        let choice = result
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no choices in response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                call_id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ChatResponse {
            text: choice.message.content.unwrap_or_default(),
            reasoning: choice.message.reasoning_content,
            tool_calls,
            usage: result.usage.map(Into::into),
        })
    }

    async fn continue_with_tools_stream(
        &self,
        request: ToolContinueRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let body = CompletionRequest {
            model: request.model.clone(),
            messages: Self::build_continuation(&request),
            tools: Self::convert_tools(&request.tools),
            stream: true,
            max_tokens: None,
        };

        let response = self.post(&body).await?;

        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(Self::pump_sse(response, tx));
        Ok(rx)
    }
}

// ----------------------------------------------------------------------------
// Wire types (OpenAI chat completions format)
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system".into(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: WireToolCallFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u
                .total_tokens
                .unwrap_or(u.prompt_tokens + u.completion_tokens),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MessageRole, ProviderMessage};

    #[test]
    fn test_build_messages_prepends_system() {
        let request = ChatRequest::new("gpt-4o", "be helpful").with_messages(vec![
            ProviderMessage {
                role: MessageRole::User,
                content: "hi".into(),
            },
        ]);
        let messages = OpenAiCompatProvider::build_messages(&request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }

    #[test]
    fn test_continuation_orders_assistant_before_tools() {
        let request = ToolContinueRequest {
            model: "gpt-4o".into(),
            system: "sys".into(),
            messages: vec![],
            tool_results: vec![crate::provider::ToolOutcome {
                call_id: "c1".into(),
                name: "queryDatabase".into(),
                output: "{\"rowCount\":1}".into(),
            }],
            tools: vec![],
        };
        let messages = OpenAiCompatProvider::build_continuation(&request);
        let roles: Vec<_> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "assistant", "tool"]);
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_empty_tools_omitted() {
        assert!(OpenAiCompatProvider::convert_tools(&[]).is_none());
    }

    #[test]
    fn test_stream_chunk_parses_tool_delta() {
        let json = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"queryDatabase","arguments":""}}]},"finish_reason":null}],"usage":null}"#;
        let chunk: StreamChunk = serde_json::from_str(json).unwrap();
        let tc = &chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(tc.id.as_deref(), Some("call_1"));
    }
}
