use serde::{Deserialize, Serialize};
use std::fmt;

/// Container type accepted from the file picker.
pub const VIDEO_MIME: &str = "video/mp4";

/// Fixed encoding of extracted audio artifacts.
pub const AUDIO_MIME: &str = "audio/mpeg";

/// Placeholder token that generation prompts use to refer to the
/// transcription text produced by the pipeline.
pub const TRANSCRIPTION_PLACEHOLDER: &str = "{transcription}";

/// In-memory handle to user-selected video content.
///
/// Owned by the pipeline controller for the duration of one run; replacing
/// the pending selection drops the previous buffer.
#[derive(Debug, Clone)]
pub struct SourceFile {
    bytes: Vec<u8>,
    mime: String,
}

impl SourceFile {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Whether the container hint matches the accepted video type.
    pub fn is_accepted_video(&self) -> bool {
        self.mime == VIDEO_MIME
    }
}

/// Compact audio produced by extraction, consumed by the upload stage.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    bytes: Vec<u8>,
    mime: &'static str,
}

impl AudioArtifact {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime: AUDIO_MIME,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }
}

/// Opaque identifier returned by the remote service after upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transcription text returned by the remote service, passed through
/// uninterpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription(String);

impl Transcription {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Transcription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Prompt template record served by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub title: String,
    pub template: String,
}

impl PromptTemplate {
    /// Interpolate the transcription text into the template.
    pub fn fill(&self, transcription: &Transcription) -> String {
        self.template
            .replace(TRANSCRIPTION_PLACEHOLDER, transcription.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_file_accepts_mp4_only() {
        let mp4 = SourceFile::new(vec![0u8; 4], VIDEO_MIME);
        assert!(mp4.is_accepted_video());
        assert_eq!(mp4.len(), 4);

        let mkv = SourceFile::new(vec![0u8; 4], "video/x-matroska");
        assert!(!mkv.is_accepted_video());
    }

    #[test]
    fn test_audio_artifact_fixed_mime() {
        let artifact = AudioArtifact::new(vec![1, 2, 3]);
        assert_eq!(artifact.mime(), "audio/mpeg");
        assert!(!artifact.is_empty());
    }

    #[test]
    fn test_prompt_template_fill() {
        let template = PromptTemplate {
            id: "title".to_string(),
            title: "Youtube title".to_string(),
            template: "Generate a title for: {transcription}".to_string(),
        };

        let filled = template.fill(&Transcription::new("hello world"));
        assert_eq!(filled, "Generate a title for: hello world");
    }

    #[test]
    fn test_prompt_template_deserializes_service_payload() {
        let json = r#"[{"id":"abc","title":"Youtube title","template":"Use {transcription} here"}]"#;
        let templates: Vec<PromptTemplate> = serde_json::from_str(json).unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].title, "Youtube title");
    }
}
