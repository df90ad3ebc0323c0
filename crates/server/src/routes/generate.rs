use super::{record_failure, record_generation, record_request};
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use hf_local::{ChunkStream, GenerationParameters};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

const ENDPOINT: &str = "generate";

/// Text-generation request
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub inputs: String,

    #[serde(default)]
    pub stream: bool,

    /// Omitted entirely means every field is absent.
    #[serde(default)]
    pub parameters: Option<GenerationParameters>,
}

/// One response unit: the whole completion in batch mode
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub generated_text: String,
}

/// One streamed response unit per generated token
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamedText {
    pub index: usize,
    pub generated_text: String,
}

/// Generate text for a single-turn input
///
/// The model named in the path is informational; requests always run on the
/// configured language model.
pub async fn generate(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Json(request): Json<GenerateRequest>,
) -> ServerResult<Response> {
    let parameters = request.parameters.unwrap_or_default();
    record_request(ENDPOINT, request.stream);
    tracing::debug!(model = %name, stream = request.stream, "text generation requested");

    if request.stream {
        let started = state
            .inference
            .stream_text(&request.inputs, &parameters)
            .await
            .map_err(|e| {
                record_failure(ENDPOINT);
                ServerError::from(e)
            })?;
        return Ok(Sse::new(text_events(started.chunks))
            .keep_alive(KeepAlive::default())
            .into_response());
    }

    let started = Instant::now();
    let completion = state
        .inference
        .generate_text(&request.inputs, &parameters)
        .await
        .map_err(|e| {
            record_failure(ENDPOINT);
            ServerError::from(e)
        })?;
    record_generation(started, completion.completion_tokens);

    Ok(Json(GenerateResponse {
        generated_text: completion.text,
    })
    .into_response())
}

fn text_events(
    mut chunks: ChunkStream,
) -> impl futures::Stream<Item = Result<Event, Infallible>> + Send + 'static {
    async_stream::stream! {
        let started = Instant::now();
        let mut generated = 0usize;
        while let Some(item) = chunks.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(err) => {
                    tracing::error!(error = %err, "text generation failed mid-stream");
                    record_failure(ENDPOINT);
                    break;
                }
            };
            generated += 1;
            let unit = StreamedText {
                index: chunk.index,
                generated_text: chunk.text,
            };
            match Event::default().json_data(&unit) {
                Ok(event) => yield Ok(event),
                Err(err) => {
                    tracing::error!(error = %err, "failed to encode stream event");
                    break;
                }
            }
        }
        record_generation(started, generated);
    }
}
