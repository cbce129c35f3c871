use std::fmt;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::extract::{ExtractionError, MediaConverter};
use crate::gateway::{RemoteGateway, TranscriptionError, UploadError};
use crate::media::{SourceFile, Transcription, VideoId};

/// Which stage a run failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    EngineLoad,
    Extraction,
    Upload,
    Transcription,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::EngineLoad => "engine load",
            FailureKind::Extraction => "conversion",
            FailureKind::Upload => "upload",
            FailureKind::Transcription => "transcription",
        };
        f.write_str(name)
    }
}

/// Single source of truth the presentational layer renders from.
///
/// A successful run moves strictly forward through
/// `Waiting → Converting → Uploading → Generating → Success`; any stage
/// failure exits to `Failed`, which `reset` returns to `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Waiting,
    Converting,
    Uploading,
    Generating,
    Success,
    Failed(FailureKind),
}

impl PipelineStatus {
    /// Inputs (file selection, prompt, submit) are enabled only while
    /// waiting.
    pub fn accepts_input(&self) -> bool {
        matches!(self, PipelineStatus::Waiting)
    }

    /// User-facing label for the submit control.
    pub fn message(&self) -> String {
        match self {
            PipelineStatus::Waiting => "Load video".to_string(),
            PipelineStatus::Converting => "Converting...".to_string(),
            PipelineStatus::Uploading => "Uploading...".to_string(),
            PipelineStatus::Generating => "Generating...".to_string(),
            PipelineStatus::Success => "Success!".to_string(),
            PipelineStatus::Failed(kind) => format!("Failed during {}", kind),
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStatus::Waiting => "waiting",
            PipelineStatus::Converting => "converting",
            PipelineStatus::Uploading => "uploading",
            PipelineStatus::Generating => "generating",
            PipelineStatus::Success => "success",
            PipelineStatus::Failed(_) => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Extraction(ExtractionError::Engine(_)) => FailureKind::EngineLoad,
            PipelineError::Extraction(_) => FailureKind::Extraction,
            PipelineError::Upload(_) => FailureKind::Upload,
            PipelineError::Transcription(_) => FailureKind::Transcription,
        }
    }
}

/// Result of a submit call.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Guard rejected the submission: no pending file, or not waiting.
    Rejected,
    /// The run completed; the completion callback has already fired.
    Completed {
        video: VideoId,
        transcription: Transcription,
    },
}

type CompletionCallback = Box<dyn Fn(&VideoId) + Send + Sync>;

/// Sequences file selection → extraction → upload → transcription request
/// for one run at a time. The `Waiting` guard is the mutual exclusion: a
/// submission outside `Waiting` is rejected, so stages never overlap.
pub struct PipelineController<C, G> {
    converter: C,
    gateway: G,
    video: Option<SourceFile>,
    status_tx: watch::Sender<PipelineStatus>,
    on_video_uploaded: Option<CompletionCallback>,
}

impl<C, G> PipelineController<C, G>
where
    C: MediaConverter,
    G: RemoteGateway,
{
    pub fn new(converter: C, gateway: G) -> Self {
        let (status_tx, _) = watch::channel(PipelineStatus::Waiting);

        Self {
            converter,
            gateway,
            video: None,
            status_tx,
            on_video_uploaded: None,
        }
    }

    /// Register the callback fired with the video id once a run succeeds.
    pub fn on_video_uploaded(&mut self, callback: impl Fn(&VideoId) + Send + Sync + 'static) {
        self.on_video_uploaded = Some(Box::new(callback));
    }

    pub fn status(&self) -> PipelineStatus {
        *self.status_tx.borrow()
    }

    /// Watch the status; a new value is published after every transition.
    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.status_tx.subscribe()
    }

    pub fn pending_file(&self) -> Option<&SourceFile> {
        self.video.as_ref()
    }

    /// Stage a file for the next run. Re-selection replaces the pending
    /// file (dropping the old buffer) without changing status; selection is
    /// rejected while a run is in flight or finished.
    pub fn select_file(&mut self, file: SourceFile) -> bool {
        if !self.status().accepts_input() {
            debug!("File selection ignored while {}", self.status());
            return false;
        }

        debug!("Selected {} byte {} file", file.len(), file.mime());
        self.video = Some(file);
        true
    }

    /// Return a `Failed` controller to `Waiting` so the user can resubmit.
    /// No-op in any other state.
    pub fn reset(&mut self) -> bool {
        if matches!(self.status(), PipelineStatus::Failed(_)) {
            self.set_status(PipelineStatus::Waiting);
            true
        } else {
            false
        }
    }

    /// Run the pipeline with a snapshot of `prompt` taken now; later edits
    /// to the prompt source cannot affect this run. Submission without a
    /// pending file, or outside `Waiting`, is a no-op.
    pub async fn submit(&mut self, prompt: Option<&str>) -> Result<SubmitOutcome, PipelineError> {
        if !self.status().accepts_input() {
            debug!("Submission rejected while {}", self.status());
            return Ok(SubmitOutcome::Rejected);
        }
        if self.video.is_none() {
            debug!("Submission rejected: no file selected");
            return Ok(SubmitOutcome::Rejected);
        }

        // Blank prompts count as "no prompt".
        let prompt = prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned);

        match self.run(prompt).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                warn!("❌ Pipeline failed during {}: {}", error.kind(), error);
                self.set_status(PipelineStatus::Failed(error.kind()));
                Err(error)
            }
        }
    }

    async fn run(&mut self, prompt: Option<String>) -> Result<SubmitOutcome, PipelineError> {
        self.set_status(PipelineStatus::Converting);
        let audio = {
            let Some(source) = self.video.as_ref() else {
                return Ok(SubmitOutcome::Rejected);
            };
            self.converter.convert(source).await?
        };
        // Conversion consumed the source; release it.
        self.video = None;

        self.set_status(PipelineStatus::Uploading);
        let video = self.gateway.upload_audio(&audio).await?;
        drop(audio);

        self.set_status(PipelineStatus::Generating);
        let transcription = self
            .gateway
            .request_transcription(&video, prompt.as_deref())
            .await?;

        self.set_status(PipelineStatus::Success);
        if let Some(callback) = &self.on_video_uploaded {
            callback(&video);
        }

        Ok(SubmitOutcome::Completed {
            video,
            transcription,
        })
    }

    fn set_status(&self, status: PipelineStatus) {
        info!("Pipeline status: {}", status);
        self.status_tx.send_replace(status);
    }
}
