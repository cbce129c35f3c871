/// Upload Pipeline
///
/// Client-side orchestration for turning a local video file into a remote
/// transcription: extract a compact audio artifact with the shared
/// transcoding engine, upload it to the video service, then request a
/// transcription keyed by a user-supplied prompt.

pub mod config;
pub mod engine;
pub mod extract;
pub mod gateway;
pub mod media;
pub mod pipeline;

// Re-export main types for easy access
pub use crate::config::Config;
pub use crate::engine::{EngineHandle, EngineLoadError, LoadedEngine};
pub use crate::extract::{AudioExtractor, ExtractionError, MediaConverter};
pub use crate::gateway::{
    GatewayError, HttpGateway, RemoteGateway, TranscriptionError, UploadError,
};
pub use crate::media::{
    AudioArtifact, PromptTemplate, SourceFile, Transcription, VideoId,
};
pub use crate::pipeline::{
    FailureKind, PipelineController, PipelineError, PipelineStatus, SubmitOutcome,
};
