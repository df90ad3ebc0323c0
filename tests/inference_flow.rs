//! End-to-end control flow over the stub engines: prompt, encode, map,
//! orchestrate, decode, and the embedding path beside it.

use embedding::stub::{StubEncoder, StubTokenizer};
use futures::StreamExt;
use generation::stub::ScriptedModel;
use hf_local::{
    ChatMessage, ChatParameters, EmbeddingConfig, EmbeddingOptions, EmbeddingPipeline,
    GenerationError, GenerationParameters, GeneratorParams, Inference, LanguageModel,
    ModelHandle, OptionValue, PromptBuilder, TokenGenerator,
};
use std::sync::Arc;

const L: usize = 12;
const H: usize = 6;

fn scripted(reply: &str) -> (Inference, Arc<ScriptedModel>) {
    let model = Arc::new(ScriptedModel::new(reply));
    let pipeline = EmbeddingPipeline::new(
        Box::new(StubTokenizer),
        Box::new(StubEncoder::new(H)),
        EmbeddingConfig {
            max_sequence_length: L,
            hidden_size: H,
            ..Default::default()
        },
    )
    .unwrap();
    let ctx = Inference::new(
        ModelHandle::new(SharedScripted(Arc::clone(&model))),
        "scripted",
        PromptBuilder::new("You are terse."),
        pipeline,
    );
    (ctx, model)
}

/// Lets the test keep a view of the model the handle owns.
struct SharedScripted(Arc<ScriptedModel>);

impl LanguageModel for SharedScripted {
    fn encode(&self, text: &str) -> Result<Vec<u32>, GenerationError> {
        self.0.encode(text)
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, GenerationError> {
        self.0.decode(tokens)
    }

    fn generator(
        &self,
        params: GeneratorParams,
    ) -> Result<Box<dyn TokenGenerator>, GenerationError> {
        self.0.generator(params)
    }
}

#[tokio::test]
async fn absent_parameters_reach_engine_as_temperature_only() {
    let (ctx, model) = scripted("ok");
    ctx.generate_text("Hello", &GenerationParameters::default())
        .await
        .unwrap();
    let options = model.last_options().unwrap();
    assert_eq!(options.len(), 1);
    assert_eq!(options.get("temperature"), Some(&OptionValue::Float(0.7)));
}

#[tokio::test]
async fn max_new_tokens_bounds_total_length() {
    let (ctx, model) = scripted("a long scripted answer");
    let prompt_len = ctx.prompts().single_turn("Hi").len() as i64;
    let params = GenerationParameters {
        max_new_tokens: Some(prompt_len + 4),
        ..Default::default()
    };
    let out = ctx.generate_text("Hi", &params).await.unwrap();
    assert_eq!(out.text, "a lo");
    assert_eq!(
        model.last_options().unwrap().get("max_length"),
        Some(&OptionValue::Int(prompt_len + 4))
    );
}

#[tokio::test]
async fn return_full_text_prefixes_the_templated_prompt() {
    let (ctx, _) = scripted("ok");
    let params = GenerationParameters {
        return_full_text: Some(true),
        ..Default::default()
    };
    let out = ctx.generate_text("Hi", &params).await.unwrap();
    assert_eq!(out.text, format!("{}ok", ctx.prompts().single_turn("Hi")));
    assert_eq!(out.completion_tokens, 2);

    let out = ctx
        .generate_text("Hi", &GenerationParameters::default())
        .await
        .unwrap();
    assert_eq!(out.text, "ok");
}

#[tokio::test]
async fn chat_batch_and_stream_agree() {
    let (ctx, _) = scripted("Paris is the capital.");
    let transcript = vec![
        ChatMessage::new("system", "Answer in one sentence."),
        ChatMessage::user("Capital of France?"),
    ];

    let batch = ctx
        .chat(&transcript, &ChatParameters::default())
        .await
        .unwrap();
    let stream = ctx
        .stream_chat(&transcript, &ChatParameters::default())
        .await
        .unwrap();
    assert_eq!(stream.prompt_tokens, batch.prompt_tokens);
    let streamed: Vec<_> = stream.chunks.map(|c| c.unwrap()).collect().await;

    assert_eq!(streamed.len(), batch.completion_tokens);
    let joined: String = streamed.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(joined, batch.text);
}

#[tokio::test]
async fn embeddings_are_fixed_length_and_ordered() {
    let (ctx, _) = scripted("");
    let inputs = vec!["a".to_string(), "b c".to_string(), "d e f".to_string()];
    let vectors = ctx
        .embed(inputs.clone(), EmbeddingOptions::default())
        .await
        .unwrap();
    assert_eq!(vectors.len(), 3);
    for v in &vectors {
        assert_eq!(v.len(), L * H);
    }
    for (i, input) in inputs.iter().enumerate() {
        let single = ctx
            .embed(vec![input.clone()], EmbeddingOptions::default())
            .await
            .unwrap();
        assert_eq!(single[0], vectors[i]);
    }
}

#[tokio::test]
async fn concurrent_requests_share_one_handle() {
    let (ctx, _) = scripted("xyz");
    let ctx = Arc::new(ctx);
    let mut tasks = Vec::new();
    for i in 0..8 {
        let ctx = Arc::clone(&ctx);
        tasks.push(tokio::spawn(async move {
            ctx.generate_text(&format!("q{i}"), &GenerationParameters::default())
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().text, "xyz");
    }
}
