use super::{record_failure, record_generation, record_request};
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use hf_local::{ChatMessage, ChatParameters, ChunkStream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

const ENDPOINT: &str = "chat";
const FINISH_REASON: &str = "completed";

/// Chat-completion request
///
/// `tools`, `tool_choice`, `tool_prompt` and `logit_bias` are accepted for
/// client compatibility and not forwarded to the model.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<RequestMessage>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub stream: bool,

    #[serde(flatten)]
    pub parameters: ChatParameters,

    #[serde(default)]
    pub tools: Option<Value>,

    #[serde(default)]
    pub tool_choice: Option<Value>,

    #[serde(default)]
    pub tool_prompt: Option<String>,

    #[serde(default)]
    pub logit_bias: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RequestMessage {
    pub role: String,

    #[serde(default)]
    pub content: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub tool_calls: Option<Value>,
}

impl From<RequestMessage> for ChatMessage {
    fn from(message: RequestMessage) -> Self {
        ChatMessage::new(message.role, message.content.unwrap_or_default())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub system_fingerprint: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: usize,
    pub finish_reason: String,
    pub message: ResponseMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub system_fingerprint: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: usize,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Fields shared by every object of one completion.
#[derive(Debug, Clone)]
struct CompletionHeader {
    id: String,
    created: i64,
    model: String,
}

impl CompletionHeader {
    fn new(model: &str) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
        }
    }

    fn chunk(&self, delta: Delta, finish_reason: Option<&str>, usage: Option<Usage>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            system_fingerprint: env!("CARGO_PKG_VERSION").to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(str::to_string),
            }],
            usage,
        }
    }
}

/// Chat completion over the whole transcript
pub async fn chat_completions(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ChatCompletionRequest>,
) -> ServerResult<Response> {
    record_request(ENDPOINT, request.stream);
    tracing::debug!(
        requested_model = request.model.as_deref().unwrap_or_default(),
        messages = request.messages.len(),
        stream = request.stream,
        tools = request.tools.is_some(),
        "chat completion requested"
    );

    let stream = request.stream;
    let parameters = request.parameters;
    let transcript: Vec<ChatMessage> = request.messages.into_iter().map(Into::into).collect();
    let header = CompletionHeader::new(state.inference.model_name());

    if stream {
        let started = state
            .inference
            .stream_chat(&transcript, &parameters)
            .await
            .map_err(|e| failure(e.into()))?;
        return Ok(Sse::new(chunk_events(header, started.prompt_tokens, started.chunks))
            .keep_alive(KeepAlive::default())
            .into_response());
    }

    let started = Instant::now();
    let completion = state
        .inference
        .chat(&transcript, &parameters)
        .await
        .map_err(|e| failure(e.into()))?;
    record_generation(started, completion.completion_tokens);

    Ok(Json(ChatCompletionResponse {
        id: header.id,
        object: "chat.completion".to_string(),
        created: header.created,
        model: header.model,
        system_fingerprint: env!("CARGO_PKG_VERSION").to_string(),
        choices: vec![ChatChoice {
            index: 0,
            finish_reason: FINISH_REASON.to_string(),
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: completion.text,
            },
            logprobs: None,
        }],
        usage: Usage::new(completion.prompt_tokens, completion.completion_tokens),
    })
    .into_response())
}

fn failure(err: ServerError) -> ServerError {
    record_failure(ENDPOINT);
    err
}

fn chunk_events(
    header: CompletionHeader,
    prompt_tokens: usize,
    mut chunks: ChunkStream,
) -> impl futures::Stream<Item = Result<Event, Infallible>> + Send + 'static {
    async_stream::stream! {
        let started = Instant::now();
        let opening = Delta {
            role: Some("assistant".to_string()),
            content: None,
        };
        if let Some(event) = encode(&header.chunk(opening, None, None)) {
            yield Ok(event);
        }

        let mut generated = 0usize;
        let mut failed = false;
        while let Some(item) = chunks.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(err) => {
                    tracing::error!(error = %err, "chat completion failed mid-stream");
                    record_failure(ENDPOINT);
                    failed = true;
                    break;
                }
            };
            generated += 1;
            let delta = Delta {
                role: None,
                content: Some(chunk.text),
            };
            match encode(&header.chunk(delta, None, None)) {
                Some(event) => yield Ok(event),
                None => {
                    failed = true;
                    break;
                }
            }
        }
        record_generation(started, generated);

        if !failed {
            let usage = Usage::new(prompt_tokens, generated);
            let closing = header.chunk(Delta::default(), Some(FINISH_REASON), Some(usage));
            if let Some(event) = encode(&closing) {
                yield Ok(event);
            }
            yield Ok(Event::default().data("[DONE]"));
        }
    }
}

fn encode(chunk: &ChatCompletionChunk) -> Option<Event> {
    match Event::default().json_data(chunk) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode stream event");
            None
        }
    }
}
