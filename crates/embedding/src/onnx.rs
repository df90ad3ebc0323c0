use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread;

use once_cell::sync::OnceCell;
use onnxruntime::environment::Environment;
use onnxruntime::ndarray::Array2;
use onnxruntime::session::Session;
use tracing::{debug, info};

use crate::EmbeddingError;

static ORT_ENV: OnceCell<Environment> = OnceCell::new();

/// Raw encoder output: the primary tensor's shape and its values in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Runs a `[1, L]` id tensor through an encoder model.
pub trait TextEncoder: Send + Sync {
    fn encode(&self, ids: &[i32]) -> Result<EncoderOutput, EmbeddingError>;
}

type Reply = SyncSender<Result<EncoderOutput, EmbeddingError>>;

struct EncodeJob {
    ids: Vec<i32>,
    reply: Reply,
}

/// ONNX Runtime text encoder.
///
/// The session never leaves the worker thread that built it; callers queue
/// id sequences and wait for the reply, so runs are serialized. The worker
/// exits once the encoder is dropped.
pub struct OnnxEncoder {
    jobs: Sender<EncodeJob>,
}

impl OnnxEncoder {
    pub fn load(path: &Path, input_name: &str) -> Result<Self, EmbeddingError> {
        if !path.exists() {
            return Err(EmbeddingError::ModelNotFound(path.display().to_string()));
        }

        let (jobs, queue) = mpsc::channel::<EncodeJob>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), EmbeddingError>>(1);
        let model_path = path.to_path_buf();
        let input_name = input_name.to_string();

        thread::Builder::new()
            .name("onnx-encoder".to_string())
            .spawn(move || {
                let session = match open_session(model_path, &input_name) {
                    Ok(session) => session,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                serve(session, queue);
            })?;

        ready_rx
            .recv()
            .map_err(|_| EmbeddingError::Inference("encoder worker exited during load".into()))??;
        info!(path = %path.display(), "text encoder loaded");
        Ok(Self { jobs })
    }
}

impl TextEncoder for OnnxEncoder {
    fn encode(&self, ids: &[i32]) -> Result<EncoderOutput, EmbeddingError> {
        let (reply, answer) = mpsc::sync_channel(1);
        self.jobs
            .send(EncodeJob {
                ids: ids.to_vec(),
                reply,
            })
            .map_err(|_| EmbeddingError::Inference("encoder worker is gone".into()))?;
        answer
            .recv()
            .map_err(|_| EmbeddingError::Inference("encoder worker dropped the request".into()))?
    }
}

fn open_session(path: PathBuf, input_name: &str) -> Result<Session<'static>, EmbeddingError> {
    let env = ort_environment()?;
    let session = env
        .new_session_builder()
        .map_err(|e| EmbeddingError::Inference(e.to_string()))?
        .with_model_from_file(path)
        .map_err(|e| EmbeddingError::Inference(e.to_string()))?;

    let declared: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
    if !declared.contains(&input_name) {
        return Err(EmbeddingError::InvalidConfig(format!(
            "model has no input named `{input_name}` (declares {declared:?})"
        )));
    }
    if declared.len() != 1 {
        return Err(EmbeddingError::InvalidConfig(format!(
            "encoder must take a single id input, model declares {declared:?}"
        )));
    }
    Ok(session)
}

fn serve(mut session: Session<'static>, queue: Receiver<EncodeJob>) {
    while let Ok(job) = queue.recv() {
        let result = run(&mut session, job.ids);
        if job.reply.send(result).is_err() {
            debug!("encode caller went away before the reply");
        }
    }
    debug!("encoder worker stopped");
}

fn run(session: &mut Session<'static>, ids: Vec<i32>) -> Result<EncoderOutput, EmbeddingError> {
    let input = Array2::from_shape_vec((1, ids.len()), ids)
        .map_err(|e| EmbeddingError::Shape(e.to_string()))?;
    let outputs = session
        .run::<i32, f32, _>(vec![input])
        .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
    let primary = outputs
        .into_iter()
        .next()
        .ok_or_else(|| EmbeddingError::Inference("model returned no outputs".into()))?;

    Ok(EncoderOutput {
        shape: primary.shape().to_vec(),
        data: primary.iter().copied().collect(),
    })
}

fn ort_environment() -> Result<&'static Environment, EmbeddingError> {
    ORT_ENV.get_or_try_init(|| {
        Environment::builder()
            .with_name("hf-local-embedding")
            .build()
            .map_err(|e| EmbeddingError::Inference(e.to_string()))
    })
}
