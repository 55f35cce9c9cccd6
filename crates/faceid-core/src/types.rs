use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. For L2-normalized
    /// embeddings this equals the plain dot product.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// Inference backend an ONNX session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    Cpu,
    /// CUDA device ordinal.
    Gpu(i32),
}

impl Backend {
    /// Resolve a context id (`-1` = CPU, `>= 0` = GPU ordinal) to a backend.
    ///
    /// GPU execution needs the `cuda` feature; without it a GPU request
    /// falls back to CPU.
    pub fn from_ctx_id(ctx_id: i32) -> Self {
        if ctx_id < 0 {
            return Backend::Cpu;
        }
        if cfg!(feature = "cuda") {
            Backend::Gpu(ctx_id)
        } else {
            tracing::warn!(
                ctx_id,
                "GPU context requested but built without the `cuda` feature; using CPU"
            );
            Backend::Cpu
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Cpu => f.write_str("CPU"),
            Backend::Gpu(_) => f.write_str("GPU"),
        }
    }
}
