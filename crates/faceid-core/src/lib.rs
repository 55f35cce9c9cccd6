//! faceid-core: face detection, recognition and match scoring.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition, both
//! running via ONNX Runtime, plus the quality and decision logic used to
//! compare an identity-document photo against a selfie.

pub mod alignment;
pub mod analysis;
pub mod detector;
pub mod quality;
pub mod recognizer;
pub mod rotation;
mod session;
pub mod types;
pub mod verify;

pub use analysis::{best_face, default_model_dir, AnalysisError, AnalyzedFace, FaceAnalysis, FaceAnalyzer, ModelPack, ScannedFace};
pub use detector::FaceDetector;
pub use recognizer::FaceRecognizer;
pub use types::{Backend, BoundingBox, Embedding};
pub use verify::{ConfidenceLevel, ConfidenceScorer, Decision, DecisionPolicy, Rejection};
