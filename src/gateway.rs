use async_trait::async_trait;
use reqwest::multipart;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::media::{AudioArtifact, PromptTemplate, Transcription, VideoId};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upload rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("transcription rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("prompt listing failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("prompt listing rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Contract to the remote video service. One attempt per operation; retry
/// policy belongs to the caller.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn upload_audio(&self, audio: &AudioArtifact) -> Result<VideoId, UploadError>;

    async fn request_transcription(
        &self,
        video: &VideoId,
        prompt: Option<&str>,
    ) -> Result<Transcription, TranscriptionError>;

    async fn list_prompt_templates(&self) -> Result<Vec<PromptTemplate>, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    video: UploadedVideo,
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: String,
}

#[derive(Debug, Serialize)]
struct TranscriptionRequest<'a> {
    prompt: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    transcription: String,
}

/// HTTP implementation of the gateway contract.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn upload_audio(&self, audio: &AudioArtifact) -> Result<VideoId, UploadError> {
        let part = multipart::Part::bytes(audio.bytes().to_vec())
            .file_name("audio.mp3")
            .mime_str(audio.mime())?;
        let form = multipart::Form::new().part("file", part);

        debug!("Uploading {} bytes to {}", audio.len(), self.endpoint("/videos"));

        let response = self
            .client
            .post(self.endpoint("/videos"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected { status, body });
        }

        let upload: UploadResponse = response.json().await?;
        let video = VideoId::new(upload.video.id);

        info!("📤 Audio uploaded, video id {}", video);
        Ok(video)
    }

    async fn request_transcription(
        &self,
        video: &VideoId,
        prompt: Option<&str>,
    ) -> Result<Transcription, TranscriptionError> {
        let url = self.endpoint(&format!("/videos/{}/transcription", video));
        debug!(video = %video, prompt = ?prompt, "Requesting transcription");

        let response = self
            .client
            .post(url)
            .json(&TranscriptionRequest { prompt })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Rejected { status, body });
        }

        let transcription: TranscriptionResponse = response.json().await?;

        info!(
            "📝 Transcription received for {} ({} characters)",
            video,
            transcription.transcription.len()
        );
        Ok(Transcription::new(transcription.transcription))
    }

    async fn list_prompt_templates(&self) -> Result<Vec<PromptTemplate>, GatewayError> {
        let response = self.client.get(self.endpoint("/prompts")).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected { status, body });
        }

        let templates: Vec<PromptTemplate> = response.json().await?;
        debug!("Fetched {} prompt templates", templates.len());
        Ok(templates)
    }
}
