//! Face analysis: detection plus embedding for every face in an image, and the
//! rotation sweep that picks the best face of a document photo.

use crate::detector::{DetectorError, FaceDetector};
use crate::quality;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::rotation;
use crate::types::{Backend, BoundingBox, Embedding};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Detection model file inside a model pack directory.
pub const DETECTION_MODEL_FILE: &str = "det_10g.onnx";
/// Recognition model file inside a model pack directory.
pub const RECOGNITION_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// A detected face with its embedding.
#[derive(Debug, Clone)]
pub struct AnalyzedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Anything that can find faces in an RGB image and embed them.
pub trait FaceAnalyzer {
    fn analyze(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<AnalyzedFace>, AnalysisError>;
}

/// Per-user model directory: `$XDG_DATA_HOME/faceid/models`, falling back to
/// `~/.local/share/faceid/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("faceid")
        .join("models")
}

/// Paths of the two models that make up a model pack.
#[derive(Debug, Clone)]
pub struct ModelPack {
    pub detection: PathBuf,
    pub recognition: PathBuf,
}

impl ModelPack {
    /// Locate the pack `<model_dir>/<model_name>/`.
    pub fn locate(model_dir: &Path, model_name: &str) -> Self {
        let root = model_dir.join(model_name);
        Self {
            detection: root.join(DETECTION_MODEL_FILE),
            recognition: root.join(RECOGNITION_MODEL_FILE),
        }
    }
}

/// SCRFD detector and ArcFace recognizer loaded from one model pack.
pub struct FaceAnalysis {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    backend: Backend,
}

impl FaceAnalysis {
    /// Load both models of `pack` onto `backend`.
    pub fn load(pack: &ModelPack, det_size: (usize, usize), backend: Backend) -> Result<Self, AnalysisError> {
        let detector = FaceDetector::load(&pack.detection.to_string_lossy(), det_size, backend)?;
        let recognizer = FaceRecognizer::load(&pack.recognition.to_string_lossy(), backend)?;
        Ok(Self {
            detector,
            recognizer,
            backend,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

impl FaceAnalyzer for FaceAnalysis {
    fn analyze(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<AnalyzedFace>, AnalysisError> {
        let boxes = self.detector.detect(rgb, width, height)?;
        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let embedding = self.recognizer.extract(rgb, width, height, &bbox)?;
            faces.push(AnalyzedFace { bbox, embedding });
        }
        Ok(faces)
    }
}

/// The highest-quality face found in a document image.
#[derive(Debug, Clone)]
pub struct ScannedFace {
    pub embedding: Embedding,
    pub quality: u32,
    /// Rotation (degrees) at which the face was found.
    pub angle: f32,
    pub bbox: BoundingBox,
}

/// Try each rotation in order and keep the face with the highest quality.
///
/// The first face reaching a given quality wins ties; a face scoring 0 is never
/// selected.
pub fn best_face<A>(
    analyzer: &mut A,
    rgb: &[u8],
    width: u32,
    height: u32,
    angles: &[f32],
) -> Result<Option<ScannedFace>, AnalysisError>
where
    A: FaceAnalyzer + ?Sized,
{
    let mut best: Option<ScannedFace> = None;

    for &angle in angles {
        let image: Cow<'_, [u8]> = if angle == 0.0 {
            Cow::Borrowed(rgb)
        } else {
            Cow::Owned(rotation::rotate(rgb, width, height, angle))
        };

        let faces = analyzer.analyze(&image, width, height)?;
        tracing::debug!(angle, faces = faces.len(), "rotation sweep step");

        for face in faces {
            let q = quality::estimate(&image, width, height, &face.bbox);
            let best_q = best.as_ref().map_or(0, |b| b.quality);
            if q > best_q {
                best = Some(ScannedFace {
                    embedding: face.embedding,
                    quality: q,
                    angle,
                    bbox: face.bbox,
                });
            }
        }
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned analysis results, one per call.
    struct ScriptedAnalyzer {
        steps: VecDeque<Vec<AnalyzedFace>>,
        calls: Vec<Vec<u8>>,
    }

    impl ScriptedAnalyzer {
        fn new(steps: Vec<Vec<AnalyzedFace>>) -> Self {
            Self { steps: steps.into(), calls: Vec::new() }
        }
    }

    impl FaceAnalyzer for ScriptedAnalyzer {
        fn analyze(&mut self, rgb: &[u8], _w: u32, _h: u32) -> Result<Vec<AnalyzedFace>, AnalysisError> {
            self.calls.push(rgb.to_vec());
            Ok(self.steps.pop_front().unwrap_or_default())
        }
    }

    struct FailingAnalyzer;

    impl FaceAnalyzer for FailingAnalyzer {
        fn analyze(&mut self, _: &[u8], _: u32, _: u32) -> Result<Vec<AnalyzedFace>, AnalysisError> {
            Err(AnalysisError::Recognizer(RecognizerError::NoLandmarks))
        }
    }

    fn face(side: f32, tag: f32) -> AnalyzedFace {
        AnalyzedFace {
            bbox: BoundingBox {
                x: 0.0, y: 0.0, width: side, height: side, confidence: 0.9, landmarks: None,
            },
            embedding: Embedding { values: vec![tag], model_version: None },
        }
    }

    fn flat_image(w: u32, h: u32) -> Vec<u8> {
        vec![128u8; (w * h * 3) as usize]
    }

    #[test]
    fn test_picks_highest_quality_across_angles() {
        let rgb = flat_image(200, 200);
        // Flat image: quality is driven by size only.
        let mut analyzer = ScriptedAnalyzer::new(vec![
            vec![face(50.0, 1.0)],
            vec![],
            vec![face(150.0, 2.0), face(100.0, 3.0)],
        ]);

        let best = best_face(&mut analyzer, &rgb, 200, 200, &[0.0, -10.0, 10.0])
            .unwrap()
            .expect("face found");

        assert_eq!(best.embedding.values, vec![2.0]);
        assert_eq!(best.quality, 60);
        assert_eq!(best.angle, 10.0);
        assert_eq!(analyzer.calls.len(), 3);
    }

    #[test]
    fn test_first_face_wins_ties() {
        let rgb = flat_image(200, 200);
        let mut analyzer = ScriptedAnalyzer::new(vec![vec![face(150.0, 1.0)], vec![face(150.0, 2.0)]]);
        let best = best_face(&mut analyzer, &rgb, 200, 200, &[0.0, 10.0]).unwrap().unwrap();
        assert_eq!(best.embedding.values, vec![1.0]);
    }

    #[test]
    fn test_zero_quality_faces_are_ignored() {
        let rgb = flat_image(100, 100);
        let mut analyzer = ScriptedAnalyzer::new(vec![vec![face(0.0, 1.0)]]);
        assert!(best_face(&mut analyzer, &rgb, 100, 100, &[0.0]).unwrap().is_none());
    }

    #[test]
    fn test_no_faces_returns_none() {
        let rgb = flat_image(50, 50);
        let mut analyzer = ScriptedAnalyzer::new(vec![]);
        assert!(best_face(&mut analyzer, &rgb, 50, 50, &[0.0, 10.0, -10.0]).unwrap().is_none());
        assert_eq!(analyzer.calls.len(), 3);
    }

    #[test]
    fn test_zero_angle_passes_original_image() {
        let mut rgb = flat_image(8, 8);
        rgb[0] = 0;
        let mut analyzer = ScriptedAnalyzer::new(vec![]);
        best_face(&mut analyzer, &rgb, 8, 8, &[0.0]).unwrap();
        assert_eq!(analyzer.calls[0], rgb);
    }

    #[test]
    fn test_analyzer_error_propagates() {
        let rgb = flat_image(8, 8);
        let result = best_face(&mut FailingAnalyzer, &rgb, 8, 8, &[0.0]);
        assert!(matches!(result, Err(AnalysisError::Recognizer(RecognizerError::NoLandmarks))));
    }

    #[test]
    fn test_model_pack_layout() {
        let pack = ModelPack::locate(Path::new("/models"), "buffalo_l");
        assert_eq!(pack.detection, PathBuf::from("/models/buffalo_l/det_10g.onnx"));
        assert_eq!(pack.recognition, PathBuf::from("/models/buffalo_l/w600k_r50.onnx"));
    }
}
