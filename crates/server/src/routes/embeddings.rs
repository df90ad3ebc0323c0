use super::record_failure;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use hf_local::{EmbeddingOptions, EmbeddingVector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const ENDPOINT: &str = "feature_extraction";

/// Feature-extraction request. A bare string is treated as a one-item list.
#[derive(Debug, Deserialize)]
pub struct FeatureExtractionRequest {
    pub inputs: Inputs,

    #[serde(default)]
    pub normalize: Option<bool>,

    #[serde(default)]
    pub truncate: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Inputs {
    Single(String),
    Many(Vec<String>),
}

impl Inputs {
    fn into_vec(self) -> Vec<String> {
        match self {
            Inputs::Single(text) => vec![text],
            Inputs::Many(texts) => texts,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeatureExtractionResponse {
    pub embeddings: Vec<EmbeddingVector>,
}

/// Per-token hidden state for every input, in input order
pub async fn feature_extraction(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Json(request): Json<FeatureExtractionRequest>,
) -> ServerResult<impl IntoResponse> {
    let inputs = request.inputs.into_vec();
    let options = EmbeddingOptions {
        normalize: request.normalize.unwrap_or(false),
        truncate: request.truncate.unwrap_or(false),
    };
    tracing::debug!(model = %name, inputs = inputs.len(), "feature extraction requested");
    metrics::counter!("embedding_inputs_total").increment(inputs.len() as u64);

    let embeddings = state
        .inference
        .embed(inputs, options)
        .await
        .map_err(|e| {
            record_failure(ENDPOINT);
            ServerError::from(e)
        })?;

    Ok(Json(FeatureExtractionResponse { embeddings }))
}
