use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::engine::{EngineHandle, EngineLoadError, INPUT_SLOT, OUTPUT_SLOT};
use crate::media::{AudioArtifact, SourceFile};

/// Audio codec the extractor re-encodes to.
pub const DEFAULT_CODEC: &str = "libmp3lame";

/// Bitrate chosen to keep uploads small while staying intelligible for
/// transcription.
pub const DEFAULT_BITRATE: &str = "20k";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Engine(#[from] EngineLoadError),

    #[error("engine i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("transcode failed (exit code {code:?}): {detail}")]
    Transcode { code: Option<i32>, detail: String },

    #[error("transcode produced an empty output slot")]
    EmptyOutput,
}

/// Conversion seam the pipeline controller drives; production code uses
/// [`AudioExtractor`], tests substitute a stub.
#[async_trait]
pub trait MediaConverter: Send + Sync {
    async fn convert(&self, source: &SourceFile) -> Result<AudioArtifact, ExtractionError>;
}

type ProgressSink = Arc<dyn Fn(f64) + Send + Sync>;

/// Converts an arbitrary-container video buffer into a compact audio
/// buffer by driving the shared engine through a fixed command sequence.
pub struct AudioExtractor {
    engine: EngineHandle,
    pub codec: String,
    pub bitrate: String,
    on_progress: Option<ProgressSink>,
}

impl AudioExtractor {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            codec: DEFAULT_CODEC.to_string(),
            bitrate: DEFAULT_BITRATE.to_string(),
            on_progress: None,
        }
    }

    /// Forward fractional conversion progress (0.0..=1.0) to `sink`.
    /// Progress is informational only and not part of the conversion
    /// contract.
    pub fn with_progress(mut self, sink: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(sink));
        self
    }

    fn transcode_args(&self) -> Vec<String> {
        [
            "-i",
            INPUT_SLOT,
            "-map",
            "0:a",
            "-b:a",
            &self.bitrate,
            "-acodec",
            &self.codec,
            "-progress",
            "pipe:1",
            "-nostats",
            "-y",
            OUTPUT_SLOT,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[async_trait]
impl MediaConverter for AudioExtractor {
    async fn convert(&self, source: &SourceFile) -> Result<AudioArtifact, ExtractionError> {
        info!(
            "🎵 Extracting audio from {} bytes of {}",
            source.len(),
            source.mime()
        );

        let engine = self.engine.acquire().await?;
        let session = engine.open_session()?;

        session.write_input(source.bytes()).await?;

        let total = session.probe_input_duration().await?;
        debug!("Input duration: {:?}", total);

        let sink = self.on_progress.clone();
        session
            .transcode(&self.transcode_args(), total, move |fraction| {
                if let Some(sink) = &sink {
                    sink(fraction);
                }
            })
            .await?;

        let bytes = session.read_output().await?;
        if bytes.is_empty() {
            return Err(ExtractionError::EmptyOutput);
        }

        let artifact = AudioArtifact::new(bytes);
        info!("✅ Audio extracted: {} bytes ({})", artifact.len(), artifact.mime());
        Ok(artifact)
    }
}
