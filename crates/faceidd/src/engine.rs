use faceid_core::verify::round_to;
use faceid_core::{
    best_face, AnalysisError, Backend, ConfidenceLevel, ConfidenceScorer, DecisionPolicy, FaceAnalysis,
    FaceAnalyzer, ModelPack, Rejection, ScannedFace,
};
use faceid_doc::{extract_pages, DocumentError, DocumentPage};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Number of face images compared per document.
const FACES_PER_DOCUMENT: usize = 2;
const QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("PDF must contain at least 2 pages. Found {0} page(s)")]
    TooFewPages(usize),
    #[error("Could not detect faces in both images. Ensure PDF contains clear face photos.")]
    FacesNotFound,
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("Processing error: {0}")]
    Document(#[from] DocumentError),
    #[error("Processing error: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("Model not initialized")]
    ModelNotInitialized,
    #[error("verification timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to start engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Parameters of the verification pipeline.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub rotation_angles: Vec<f32>,
    pub policy: DecisionPolicy,
    pub scorer: ConfidenceScorer,
}

/// Result of comparing the two faces of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub quality_1: u32,
    pub quality_2: u32,
    /// Cosine similarity, 3 decimal places.
    pub similarity: f64,
    pub threshold: f64,
    pub matched: bool,
    /// Percentage, 2 decimal places.
    pub confidence: f64,
    pub level: ConfidenceLevel,
    pub requires_manual_review: bool,
}

struct VerifyRequest {
    document: Vec<u8>,
    reply: oneshot::Sender<Result<Verification, EngineError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<VerifyRequest>,
    backend: Backend,
}

impl EngineHandle {
    /// Queue a PDF for verification and wait for the verdict.
    pub async fn verify(&self, document: Vec<u8>, timeout: Duration) -> Result<Verification, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = VerifyRequest {
            document,
            reply: reply_tx,
        };

        let exchange = async {
            self.tx
                .send(request)
                .await
                .map_err(|_| EngineError::ModelNotInitialized)?;
            reply_rx.await.map_err(|_| EngineError::ModelNotInitialized)?
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| EngineError::Timeout(timeout))?
    }

    /// Whether the engine thread is still serving requests.
    pub fn is_loaded(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

/// Load the model pack and spawn the engine on a dedicated OS thread.
///
/// Fails fast if either model is unavailable.
pub fn spawn_engine(
    pack: &ModelPack,
    det_size: (usize, usize),
    backend: Backend,
    settings: EngineSettings,
) -> Result<EngineHandle, EngineError> {
    let analysis = FaceAnalysis::load(pack, det_size, backend)?;
    tracing::info!(
        detection = %pack.detection.display(),
        recognition = %pack.recognition.display(),
        backend = %analysis.backend(),
        "face analysis models loaded"
    );
    let backend = analysis.backend();
    spawn_with(analysis, backend, settings)
}

/// Spawn the engine thread around an already-built analyzer.
pub fn spawn_with<A>(mut analyzer: A, backend: Backend, settings: EngineSettings) -> Result<EngineHandle, EngineError>
where
    A: FaceAnalyzer + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<VerifyRequest>(QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("faceid-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(request) = rx.blocking_recv() {
                if request.reply.is_closed() {
                    tracing::debug!("caller gave up, skipping queued request");
                    continue;
                }
                let result = verify_document(&mut analyzer, &request.document, &settings);
                if let Err(err) = &result {
                    tracing::warn!(error = %err, "verification failed");
                }
                let _ = request.reply.send(result);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx, backend })
}

/// Extract the pages of a PDF and compare the first two faces found.
pub fn verify_document<A>(
    analyzer: &mut A,
    document: &[u8],
    settings: &EngineSettings,
) -> Result<Verification, EngineError>
where
    A: FaceAnalyzer + ?Sized,
{
    let pages = extract_pages(document)?;
    verify_pages(analyzer, &pages, settings)
}

/// Compare the best faces of the first two pages that yield one.
///
/// Every image of a page is searched; the page's face is the one with the
/// highest quality, the larger image winning ties.
pub fn verify_pages<A>(
    analyzer: &mut A,
    pages: &[DocumentPage],
    settings: &EngineSettings,
) -> Result<Verification, EngineError>
where
    A: FaceAnalyzer + ?Sized,
{
    if pages.len() < FACES_PER_DOCUMENT {
        return Err(EngineError::TooFewPages(pages.len()));
    }

    let mut found: Vec<ScannedFace> = Vec::with_capacity(FACES_PER_DOCUMENT);
    for page in pages {
        match page_face(analyzer, page, &settings.rotation_angles)? {
            Some(face) => {
                tracing::info!(
                    page = page.number,
                    quality = face.quality,
                    angle = face.angle,
                    confidence = face.bbox.confidence,
                    "face selected"
                );
                found.push(face);
            }
            None => tracing::info!(page = page.number, images = page.images.len(), "no usable face on page"),
        }
        if found.len() >= FACES_PER_DOCUMENT {
            break;
        }
    }

    let [first, second] = match <[ScannedFace; FACES_PER_DOCUMENT]>::try_from(found) {
        Ok(pair) => pair,
        Err(_) => return Err(EngineError::FacesNotFound),
    };

    let similarity = first.embedding.similarity(&second.embedding);
    let decision = settings.policy.decide(similarity, first.quality, second.quality)?;
    let confidence = settings.scorer.score(similarity, decision.matched);

    tracing::info!(
        similarity,
        threshold = decision.threshold,
        matched = decision.matched,
        level = ?decision.level,
        "verification complete"
    );

    Ok(Verification {
        quality_1: first.quality,
        quality_2: second.quality,
        similarity: round_to(similarity as f64, 3),
        threshold: round_to(decision.threshold as f64, 6),
        matched: decision.matched,
        confidence,
        level: decision.level,
        requires_manual_review: decision.requires_manual_review,
    })
}

fn page_face<A>(
    analyzer: &mut A,
    page: &DocumentPage,
    rotation_angles: &[f32],
) -> Result<Option<ScannedFace>, AnalysisError>
where
    A: FaceAnalyzer + ?Sized,
{
    let mut best: Option<ScannedFace> = None;
    for image in &page.images {
        let Some(face) = best_face(analyzer, &image.data, image.width, image.height, rotation_angles)? else {
            tracing::debug!(page = page.number, width = image.width, height = image.height, "no face in image");
            continue;
        };
        if best.as_ref().map_or(true, |b| face.quality > b.quality) {
            best = Some(face);
        }
    }
    Ok(best)
}

/// Handle whose requests are answered by `respond` on a tokio task.
#[cfg(test)]
pub(crate) fn scripted_handle(
    respond: impl Fn(&[u8]) -> Result<Verification, EngineError> + Send + 'static,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<VerifyRequest>(QUEUE_DEPTH);
    tokio::spawn(async move {
        while let Some(req) = rx.recv().await {
            let _ = req.reply.send(respond(&req.document));
        }
    });
    EngineHandle { tx, backend: Backend::Cpu }
}

/// Handle to an engine that has already stopped.
#[cfg(test)]
pub(crate) fn closed_handle() -> EngineHandle {
    let (tx, _) = mpsc::channel(1);
    EngineHandle { tx, backend: Backend::Cpu }
}
