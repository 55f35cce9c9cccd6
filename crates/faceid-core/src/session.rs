//! Shared ONNX Runtime session construction.

use crate::types::Backend;
use ort::session::Session;

const INTRA_THREADS: usize = 2;

/// Build an inference session for `model_path` on the given backend.
#[cfg_attr(not(feature = "cuda"), allow(unused_variables))]
pub(crate) fn build_session(model_path: &str, backend: Backend) -> Result<Session, ort::Error> {
    #[cfg_attr(feature = "cuda", allow(unused_mut))]
    let mut builder = Session::builder()?.with_intra_threads(INTRA_THREADS)?;

    #[cfg(feature = "cuda")]
    let mut builder = match backend {
        Backend::Gpu(device_id) => builder.with_execution_providers([
            ort::ep::CUDA::default()
                .with_device_id(device_id)
                .build(),
        ])?,
        Backend::Cpu => builder,
    };

    let session = builder.commit_from_file(model_path)?;
    Ok(session)
}
