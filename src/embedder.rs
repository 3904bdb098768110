//! Embedding generation
//!
//! The retrieval core treats embedding as an opaque oracle behind
//! [`EmbeddingProvider`]: one blocking method mapping text to a unit-length
//! vector of [`EMBEDDING_DIM`] floats. The default backend runs
//! all-MiniLM-L6-v2 through ort + tokenizers, fetched from HuggingFace Hub on
//! first use, with mean pooling and L2 normalization.

use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use thiserror::Error;

/// Embedding dimension produced by the backend (all-MiniLM-L6-v2).
pub const EMBEDDING_DIM: usize = 384;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    #[error("Tokenizer error: {0}")]
    TokenizerError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("Input cannot be empty")]
    EmptyInput,
    #[error("HuggingFace Hub error: {0}")]
    HfHubError(String),
    #[error("Embedding backend unavailable: {0}")]
    Unavailable(String),
}

/// An L2-normalized embedding vector of [`EMBEDDING_DIM`] floats.
#[derive(Debug, Clone)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(data: Vec<f32>) -> Self {
        Self(data)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Capability interface over any embedding backend (local model, remote
/// service, or deterministic stub in tests).
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Must return a unit-length [`EMBEDDING_DIM`] vector.
    fn embed(&self, text: &str) -> Result<Embedding, EmbedderError>;

    /// Embed a batch; backends override this when true batching is cheaper.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn name(&self) -> &'static str {
        "embedding-provider"
    }
}

// Process-wide provider handle. Lazily initialized on first demand; reset to
// None when a backend returns empty output, so the next call re-initializes.
static SHARED: Lazy<Mutex<Option<Arc<dyn EmbeddingProvider>>>> = Lazy::new(|| Mutex::new(None));

/// Get (initializing if needed) the process-wide embedding provider.
pub fn shared_provider() -> Result<Arc<dyn EmbeddingProvider>, EmbedderError> {
    let mut guard = SHARED.lock().unwrap_or_else(|p| p.into_inner());
    if let Some(provider) = guard.as_ref() {
        return Ok(Arc::clone(provider));
    }
    let provider = new_default_provider()?;
    *guard = Some(Arc::clone(&provider));
    Ok(provider)
}

/// Drop the process-wide handle so the next [`shared_provider`] call
/// re-initializes the backend.
pub fn reset_shared_provider() {
    let mut guard = SHARED.lock().unwrap_or_else(|p| p.into_inner());
    *guard = None;
}

#[cfg(feature = "embeddings")]
fn new_default_provider() -> Result<Arc<dyn EmbeddingProvider>, EmbedderError> {
    Ok(Arc::new(OrtEmbedder::new()?))
}

#[cfg(not(feature = "embeddings"))]
fn new_default_provider() -> Result<Arc<dyn EmbeddingProvider>, EmbedderError> {
    Err(EmbedderError::Unavailable(
        "built without the 'embeddings' feature".into(),
    ))
}

#[cfg(feature = "embeddings")]
pub use ort_backend::OrtEmbedder;

#[cfg(feature = "embeddings")]
mod ort_backend {
    use super::*;

    use std::path::{Path, PathBuf};

    use lru::LruCache;
    use ndarray::Array2;
    use once_cell::sync::OnceCell;
    use ort::session::Session;
    use std::num::NonZeroUsize;

    const MODEL_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";
    const MODEL_FILE: &str = "onnx/model.onnx";
    const TOKENIZER_FILE: &str = "tokenizer.json";

    // blake3 checksums for model verification (empty = skip validation)
    const MODEL_BLAKE3: &str = "";
    const TOKENIZER_BLAKE3: &str = "";

    /// Local ONNX embedding backend (CPU).
    ///
    /// The session is lazy-loaded on the first embedding request; repeated
    /// query texts are served from an LRU cache.
    pub struct OrtEmbedder {
        session: OnceCell<Mutex<Session>>,
        tokenizer: OnceCell<tokenizers::Tokenizer>,
        model_path: PathBuf,
        tokenizer_path: PathBuf,
        max_length: usize,
        query_cache: Mutex<LruCache<String, Embedding>>,
    }

    impl OrtEmbedder {
        /// Create a new embedder, downloading the model if necessary.
        pub fn new() -> Result<Self, EmbedderError> {
            let (model_path, tokenizer_path) = ensure_model()?;
            Ok(Self {
                session: OnceCell::new(),
                tokenizer: OnceCell::new(),
                model_path,
                tokenizer_path,
                max_length: 512,
                query_cache: Mutex::new(LruCache::new(
                    NonZeroUsize::new(128).expect("128 is non-zero"),
                )),
            })
        }

        fn session(&self) -> Result<std::sync::MutexGuard<'_, Session>, EmbedderError> {
            let session = self.session.get_or_try_init(|| {
                Session::builder()
                    .and_then(|b| b.commit_from_file(&self.model_path))
                    .map(Mutex::new)
                    .map_err(|e| EmbedderError::InferenceFailed(e.to_string()))
            })?;
            Ok(session.lock().unwrap_or_else(|p| p.into_inner()))
        }

        fn tokenizer(&self) -> Result<&tokenizers::Tokenizer, EmbedderError> {
            self.tokenizer.get_or_try_init(|| {
                tokenizers::Tokenizer::from_file(&self.tokenizer_path)
                    .map_err(|e| EmbedderError::TokenizerError(e.to_string()))
            })
        }

        fn run_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbedderError> {
            use ort::value::Tensor;

            let _span = tracing::info_span!("embed_batch", count = texts.len()).entered();

            if texts.is_empty() {
                return Ok(vec![]);
            }

            let encodings = self
                .tokenizer()?
                .encode_batch(texts.to_vec(), true)
                .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;

            let input_ids: Vec<Vec<i64>> = encodings
                .iter()
                .map(|e| e.get_ids().iter().map(|&id| id as i64).collect())
                .collect();
            let attention_mask: Vec<Vec<i64>> = encodings
                .iter()
                .map(|e| e.get_attention_mask().iter().map(|&m| m as i64).collect())
                .collect();

            let max_len = input_ids
                .iter()
                .map(|v| v.len())
                .max()
                .unwrap_or(0)
                .min(self.max_length);

            let input_ids_arr = pad_2d_i64(&input_ids, max_len, 0);
            let attention_mask_arr = pad_2d_i64(&attention_mask, max_len, 0);
            let token_type_ids_arr = Array2::<i64>::zeros((texts.len(), max_len));

            let input_ids_tensor =
                Tensor::from_array(input_ids_arr).map_err(ort_err)?;
            let attention_mask_tensor =
                Tensor::from_array(attention_mask_arr).map_err(ort_err)?;
            let token_type_ids_tensor =
                Tensor::from_array(token_type_ids_arr).map_err(ort_err)?;

            let mut session = self.session()?;
            let outputs = session
                .run(ort::inputs![
                    "input_ids" => input_ids_tensor,
                    "attention_mask" => attention_mask_tensor,
                    "token_type_ids" => token_type_ids_tensor,
                ])
                .map_err(ort_err)?;

            // last_hidden_state: [batch, seq_len, EMBEDDING_DIM]
            let (_shape, data) = outputs["last_hidden_state"]
                .try_extract_tensor::<f32>()
                .map_err(ort_err)?;

            if data.is_empty() {
                // Broken backend state: reset the process-wide handle so the
                // next call starts from a fresh session.
                super::reset_shared_provider();
                return Err(EmbedderError::InferenceFailed(
                    "model returned empty output".into(),
                ));
            }

            // Attention-weighted mean pooling over the sequence dimension
            let mut results = Vec::with_capacity(texts.len());
            for (i, mask_vec) in attention_mask.iter().enumerate().take(texts.len()) {
                let mut sum = vec![0.0f32; EMBEDDING_DIM];
                let mut count = 0.0f32;
                for j in 0..max_len {
                    let mask = mask_vec.get(j).copied().unwrap_or(0) as f32;
                    if mask > 0.0 {
                        count += mask;
                        let offset = i * max_len * EMBEDDING_DIM + j * EMBEDDING_DIM;
                        for (k, sum_val) in sum.iter_mut().enumerate() {
                            *sum_val += data[offset + k] * mask;
                        }
                    }
                }
                if count > 0.0 {
                    for sum_val in &mut sum {
                        *sum_val /= count;
                    }
                }
                results.push(Embedding::new(normalize_l2(sum)));
            }

            Ok(results)
        }
    }

    impl EmbeddingProvider for OrtEmbedder {
        fn embed(&self, text: &str) -> Result<Embedding, EmbedderError> {
            let text = text.trim();
            if text.is_empty() {
                return Err(EmbedderError::EmptyInput);
            }
            {
                let mut cache = self.query_cache.lock().unwrap_or_else(|p| p.into_inner());
                if let Some(cached) = cache.get(text) {
                    return Ok(cached.clone());
                }
            }
            let embedding = self
                .run_batch(&[text.to_string()])?
                .into_iter()
                .next()
                .ok_or_else(|| EmbedderError::InferenceFailed("empty batch result".into()))?;
            {
                let mut cache = self.query_cache.lock().unwrap_or_else(|p| p.into_inner());
                cache.put(text.to_string(), embedding.clone());
            }
            Ok(embedding)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbedderError> {
            self.run_batch(texts)
        }

        fn name(&self) -> &'static str {
            "all-MiniLM-L6-v2"
        }
    }

    fn ort_err(e: ort::Error) -> EmbedderError {
        EmbedderError::InferenceFailed(e.to_string())
    }

    /// Download model and tokenizer from HuggingFace Hub.
    fn ensure_model() -> Result<(PathBuf, PathBuf), EmbedderError> {
        use hf_hub::api::sync::Api;

        let api = Api::new().map_err(|e| EmbedderError::HfHubError(e.to_string()))?;
        let repo = api.model(MODEL_REPO.to_string());

        let model_path = repo
            .get(MODEL_FILE)
            .map_err(|e| EmbedderError::HfHubError(e.to_string()))?;
        let tokenizer_path = repo
            .get(TOKENIZER_FILE)
            .map_err(|e| EmbedderError::HfHubError(e.to_string()))?;

        if !MODEL_BLAKE3.is_empty() {
            verify_checksum(&model_path, MODEL_BLAKE3)?;
        }
        if !TOKENIZER_BLAKE3.is_empty() {
            verify_checksum(&tokenizer_path, TOKENIZER_BLAKE3)?;
        }

        Ok((model_path, tokenizer_path))
    }

    fn verify_checksum(path: &Path, expected: &str) -> Result<(), EmbedderError> {
        let mut file =
            std::fs::File::open(path).map_err(|e| EmbedderError::ModelNotFound(e.to_string()))?;
        let mut hasher = blake3::Hasher::new();
        std::io::copy(&mut file, &mut hasher)
            .map_err(|e| EmbedderError::ModelNotFound(e.to_string()))?;
        let actual = hasher.finalize().to_hex().to_string();
        if actual != expected {
            return Err(EmbedderError::ChecksumMismatch {
                path: path.display().to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    fn pad_2d_i64(inputs: &[Vec<i64>], max_len: usize, pad_value: i64) -> Array2<i64> {
        let mut arr = Array2::from_elem((inputs.len(), max_len), pad_value);
        for (i, seq) in inputs.iter().enumerate() {
            for (j, &val) in seq.iter().take(max_len).enumerate() {
                arr[[i, j]] = val;
            }
        }
        arr
    }

    fn normalize_l2(mut v: Vec<f32>) -> Vec<f32> {
        let norm_sq: f32 = v.iter().fold(0.0, |acc, &x| acc + x * x);
        if norm_sq > 0.0 {
            let inv_norm = 1.0 / norm_sq.sqrt();
            v.iter_mut().for_each(|x| *x *= inv_norm);
        }
        v
    }

}
