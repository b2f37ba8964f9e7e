use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{NavPlaneError, NavResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser;
use crate::llm::types::{
    CallConfig, ChatMessage, FunctionCall, LlmResponse, StreamChunkKind, ToolCall, ToolDef,
};

/// Tool call accumulator entry: (id, type, name, accumulated arguments).
type ToolCallBuilder = (String, String, String, String);

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDef>,
        cfg: &CallConfig,
    ) -> NavResult<LlmResponse> {
        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(&tools)?;
            body["tool_choice"] = serde_json::json!("auto");
        }

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            messages = messages.len(),
            tools = tools.len(),
            "sending LLM request"
        );

        let mut request = self.client.post(&self.api_base).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(NavPlaneError::LlmProvider(format!("{}: {}", status, err_body)));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

#[derive(Default)]
struct StreamAccumulator {
    content: String,
    reasoning: String,
    tool_calls: BTreeMap<usize, ToolCallBuilder>,
}

impl StreamAccumulator {
    /// Folds one SSE line in. Returns true once the stream signals completion.
    fn apply(&mut self, line: &str) -> bool {
        if line.is_empty() {
            return false;
        }
        match sse_parser::parse_sse_line(line) {
            Ok(Some(chunk)) => match chunk.kind {
                StreamChunkKind::Reasoning => self.reasoning.push_str(&chunk.content),
                StreamChunkKind::Content => self.content.push_str(&chunk.content),
                StreamChunkKind::ToolCall => merge_tool_call_deltas(&chunk.content, &mut self.tool_calls),
                StreamChunkKind::Done => return true,
            },
            Ok(None) => {}
            Err(e) => tracing::debug!("SSE parse skipped: {e}"),
        }
        false
    }
}

impl OpenAiCompatibleProvider {
    /// Accumulates an SSE response into a single reply.
    async fn handle_stream(&self, response: reqwest::Response) -> NavResult<LlmResponse> {
        let mut byte_stream = response.bytes_stream();
        let mut lines = sse_parser::LineBuffer::new();

        let mut acc = StreamAccumulator::default();
        let mut done = false;
        'stream: while let Some(result) = byte_stream.next().await {
            for line in lines.push(&result?) {
                if acc.apply(&line) {
                    done = true;
                    break 'stream;
                }
            }
        }
        if let Some(line) = lines.finish().filter(|_| !done) {
            acc.apply(&line);
        }
        let StreamAccumulator {
            content: resp_content,
            reasoning: resp_reasoning,
            tool_calls: tc_builders,
        } = acc;

        let tool_calls = build_tool_calls(tc_builders);

        tracing::info!(
            content_len = resp_content.len(),
            reasoning_len = resp_reasoning.len(),
            tool_calls = tool_calls.len(),
            tools = ?tool_calls.iter().map(|tc| tc.function.name.as_str()).collect::<Vec<_>>(),
            "LLM stream complete"
        );

        Ok(LlmResponse {
            content: resp_content,
            reasoning: resp_reasoning,
            tool_calls,
        })
    }

    async fn handle_json(&self, response: reqwest::Response) -> NavResult<LlmResponse> {
        let json: serde_json::Value = response.json().await?;
        let parsed = parse_completion(&json);

        tracing::info!(
            content_len = parsed.content.len(),
            tool_calls = parsed.tool_calls.len(),
            "LLM JSON response received"
        );
        Ok(parsed)
    }
}

/// Extracts the first choice of a non-streaming chat completion.
fn parse_completion(json: &serde_json::Value) -> LlmResponse {
    let message = &json["choices"][0]["message"];
    let content = message["content"].as_str().unwrap_or("").to_string();
    let reasoning = message["reasoning_content"].as_str().unwrap_or("").to_string();

    let tool_calls: Vec<ToolCall> = message["tool_calls"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|tc| ToolCall {
                    id: tc["id"].as_str().unwrap_or("").to_string(),
                    call_type: tc["type"].as_str().unwrap_or("function").to_string(),
                    function: FunctionCall {
                        name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                        arguments: tc["function"]["arguments"]
                            .as_str()
                            .unwrap_or("{}")
                            .to_string(),
                    },
                })
                .collect()
        })
        .unwrap_or_default();

    LlmResponse {
        content,
        reasoning,
        tool_calls,
    }
}

/// Merge streaming tool-call delta fragments into the accumulator map (keyed by delta index).
fn merge_tool_call_deltas(chunk_content: &str, builders: &mut BTreeMap<usize, ToolCallBuilder>) {
    let Ok(deltas) = serde_json::from_str::<Vec<serde_json::Value>>(chunk_content) else {
        return;
    };
    for delta in deltas {
        let idx = delta["index"].as_u64().unwrap_or(0) as usize;
        let entry = builders.entry(idx).or_default();

        if let Some(id) = delta["id"].as_str().filter(|id| !id.is_empty()) {
            entry.0 = id.to_string();
        }
        if let Some(t) = delta["type"].as_str().filter(|t| !t.is_empty()) {
            entry.1 = t.to_string();
        }
        if let Some(name) = delta["function"]["name"].as_str() {
            entry.2.push_str(name);
        }
        if let Some(args) = delta["function"]["arguments"].as_str() {
            entry.3.push_str(args);
        }
    }
}

/// Convert accumulated tool-call builders into typed `ToolCall` structs.
fn build_tool_calls(builders: BTreeMap<usize, ToolCallBuilder>) -> Vec<ToolCall> {
    builders
        .into_values()
        .filter(|(_, _, name, _)| !name.is_empty())
        .map(|(id, call_type, name, arguments)| ToolCall {
            id,
            call_type: if call_type.is_empty() {
                "function".to_string()
            } else {
                call_type
            },
            function: FunctionCall { name, arguments },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Reads one HTTP request (headers plus Content-Length body) off `socket`.
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending a full request");
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length: usize = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }

    #[tokio::test]
    async fn streamed_text_survives_characters_split_across_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"Exposure set to 15 été\"}}]}\n\n";
        let cut = event.find('é').unwrap() + 1;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&event.as_bytes()[..cut]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            socket.write_all(&event.as_bytes()[cut..]).await.unwrap();
            socket.write_all(b"data: [DONE]\n\n").await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let provider = OpenAiCompatibleProvider::new(
            "local".into(),
            format!("http://{addr}/v1/chat/completions"),
            String::new(),
        );
        let cfg = CallConfig {
            model: "test".into(),
            stream: true,
            temperature: 0.1,
        };
        let reply = provider
            .chat(vec![ChatMessage::user("brighten")], Vec::new(), &cfg)
            .await
            .unwrap();
        assert_eq!(reply.content, "Exposure set to 15 été");
        server.await.unwrap();
    }

    #[test]
    fn split_tool_call_deltas_are_reassembled() {
        let mut builders = BTreeMap::new();
        merge_tool_call_deltas(
            r#"[{"index":0,"id":"call_1","type":"function","function":{"name":"click_component","arguments":"{\"compo"}}]"#,
            &mut builders,
        );
        merge_tool_call_deltas(
            r#"[{"index":0,"function":{"arguments":"nentId\":\"export\"}"}}]"#,
            &mut builders,
        );
        merge_tool_call_deltas(
            r#"[{"index":1,"id":"call_2","function":{"name":"get_ui_state","arguments":"{}"}}]"#,
            &mut builders,
        );

        let calls = build_tool_calls(builders);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].function.name, "click_component");
        assert_eq!(calls[0].function.arguments, r#"{"componentId":"export"}"#);
        assert_eq!(calls[1].call_type, "function");
    }

    #[test]
    fn completion_json_is_parsed() {
        let reply = parse_completion(&json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": { "name": "get_ui_state", "arguments": "{}" }
                    }]
                }
            }]
        }));
        assert!(reply.content.is_empty());
        assert_eq!(reply.tool_calls[0].id, "call_9");
    }
}
