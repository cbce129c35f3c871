use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use upload_pipeline::{
    AudioArtifact, ExtractionError, FailureKind, MediaConverter, PipelineController,
    PipelineError, PipelineStatus, PromptTemplate, RemoteGateway, SourceFile, SubmitOutcome,
    Transcription, TranscriptionError, UploadError, VideoId,
};

/// Records the controller status observed at the moment each collaborator
/// is invoked, proving the transition happened before the stage ran.
#[derive(Clone, Default)]
struct StatusProbe {
    rx: Arc<Mutex<Option<watch::Receiver<PipelineStatus>>>>,
    seen: Arc<Mutex<Vec<PipelineStatus>>>,
}

impl StatusProbe {
    fn attach(&self, rx: watch::Receiver<PipelineStatus>) {
        *self.rx.lock().unwrap() = Some(rx);
    }

    fn observe(&self) {
        if let Some(rx) = self.rx.lock().unwrap().as_ref() {
            self.seen.lock().unwrap().push(*rx.borrow());
        }
    }

    fn seen(&self) -> Vec<PipelineStatus> {
        self.seen.lock().unwrap().clone()
    }
}

#[derive(Clone, Default)]
struct StubConverter {
    probe: StatusProbe,
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl MediaConverter for StubConverter {
    async fn convert(&self, source: &SourceFile) -> Result<AudioArtifact, ExtractionError> {
        self.probe.observe();
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(ExtractionError::Transcode {
                code: Some(1),
                detail: "Stream map '0:a' matches no streams.".to_string(),
            });
        }

        assert!(!source.is_empty(), "converter received an empty source");
        Ok(AudioArtifact::new(vec![0u8; 64]))
    }
}

#[derive(Clone, Default)]
struct StubGateway {
    probe: StatusProbe,
    fail_upload: Arc<AtomicBool>,
    uploads: Arc<Mutex<Vec<(usize, String)>>>,
    transcriptions: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

#[async_trait]
impl RemoteGateway for StubGateway {
    async fn upload_audio(&self, audio: &AudioArtifact) -> Result<VideoId, UploadError> {
        self.probe.observe();

        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(UploadError::Rejected {
                status: StatusCode::BAD_GATEWAY,
                body: "connection reset by peer".to_string(),
            });
        }

        self.uploads
            .lock()
            .unwrap()
            .push((audio.len(), audio.mime().to_string()));
        Ok(VideoId::new("vid_123"))
    }

    async fn request_transcription(
        &self,
        video: &VideoId,
        prompt: Option<&str>,
    ) -> Result<Transcription, TranscriptionError> {
        self.probe.observe();
        self.transcriptions
            .lock()
            .unwrap()
            .push((video.as_str().to_string(), prompt.map(str::to_owned)));
        Ok(Transcription::new("two seconds of silence"))
    }

    async fn list_prompt_templates(&self) -> Result<Vec<PromptTemplate>, upload_pipeline::GatewayError> {
        Ok(vec![PromptTemplate {
            id: "title".to_string(),
            title: "Youtube title".to_string(),
            template: "Generate a title for {transcription}".to_string(),
        }])
    }
}

fn sample_video() -> SourceFile {
    SourceFile::new(vec![0u8; 1024], "video/mp4")
}

fn controller_with(
    converter: StubConverter,
    gateway: StubGateway,
) -> PipelineController<StubConverter, StubGateway> {
    PipelineController::new(converter, gateway)
}

#[tokio::test]
async fn test_submit_without_file_is_a_noop() {
    let converter = StubConverter::default();
    let calls = Arc::clone(&converter.calls);
    let mut controller = controller_with(converter, StubGateway::default());

    let outcome = controller.submit(Some("keywords")).await.unwrap();

    assert!(matches!(outcome, SubmitOutcome::Rejected));
    assert_eq!(controller.status(), PipelineStatus::Waiting);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reselecting_a_file_keeps_status_waiting() {
    let mut controller = controller_with(StubConverter::default(), StubGateway::default());

    assert!(controller.select_file(SourceFile::new(vec![1u8; 10], "video/mp4")));
    assert!(controller.select_file(SourceFile::new(vec![2u8; 20], "video/mp4")));

    assert_eq!(controller.status(), PipelineStatus::Waiting);
    assert_eq!(controller.pending_file().map(|f| f.len()), Some(20));
}

#[tokio::test]
async fn test_successful_run_walks_every_stage_in_order() {
    let probe = StatusProbe::default();
    let converter = StubConverter {
        probe: probe.clone(),
        ..StubConverter::default()
    };
    let gateway = StubGateway {
        probe: probe.clone(),
        ..StubGateway::default()
    };
    let uploads = Arc::clone(&gateway.uploads);
    let transcriptions = Arc::clone(&gateway.transcriptions);

    let mut controller = controller_with(converter, gateway);
    probe.attach(controller.subscribe());

    let uploaded_id = Arc::new(Mutex::new(None::<String>));
    let callback_id = Arc::clone(&uploaded_id);
    controller.on_video_uploaded(move |id| {
        *callback_id.lock().unwrap() = Some(id.as_str().to_string());
    });

    controller.select_file(sample_video());
    let outcome = controller.submit(Some("keywords, demo")).await.unwrap();

    let SubmitOutcome::Completed {
        video,
        transcription,
    } = outcome
    else {
        panic!("run should complete");
    };

    assert_eq!(video.as_str(), "vid_123");
    assert_eq!(transcription.as_str(), "two seconds of silence");
    assert_eq!(uploaded_id.lock().unwrap().as_deref(), Some("vid_123"));

    // Each collaborator saw the matching stage already active, and no
    // stage was skipped.
    assert_eq!(
        probe.seen(),
        vec![
            PipelineStatus::Converting,
            PipelineStatus::Uploading,
            PipelineStatus::Generating,
        ]
    );
    assert_eq!(controller.status(), PipelineStatus::Success);

    assert_eq!(
        *uploads.lock().unwrap(),
        vec![(64, "audio/mpeg".to_string())]
    );
    assert_eq!(
        *transcriptions.lock().unwrap(),
        vec![("vid_123".to_string(), Some("keywords, demo".to_string()))]
    );

    // The source was released once conversion consumed it.
    assert!(controller.pending_file().is_none());
}

#[tokio::test]
async fn test_blank_prompt_is_sent_as_no_prompt() {
    let gateway = StubGateway::default();
    let transcriptions = Arc::clone(&gateway.transcriptions);
    let mut controller = controller_with(StubConverter::default(), gateway);

    controller.select_file(sample_video());
    controller.submit(Some("   ")).await.unwrap();

    assert_eq!(
        *transcriptions.lock().unwrap(),
        vec![("vid_123".to_string(), None)]
    );
}

#[tokio::test]
async fn test_extraction_failure_makes_no_network_calls() {
    let converter = StubConverter::default();
    converter.fail.store(true, Ordering::SeqCst);
    let gateway = StubGateway::default();
    let uploads = Arc::clone(&gateway.uploads);
    let transcriptions = Arc::clone(&gateway.transcriptions);

    let mut controller = controller_with(converter, gateway);
    controller.select_file(sample_video());

    let error = controller.submit(None).await.unwrap_err();

    assert!(matches!(error, PipelineError::Extraction(_)));
    assert_eq!(
        controller.status(),
        PipelineStatus::Failed(FailureKind::Extraction)
    );
    assert!(uploads.lock().unwrap().is_empty());
    assert!(transcriptions.lock().unwrap().is_empty());

    // The file is still pending, so the user can reset and resubmit
    // without re-selecting.
    assert!(controller.pending_file().is_some());
}

#[tokio::test]
async fn test_upload_failure_never_reaches_generating() {
    let probe = StatusProbe::default();
    let converter = StubConverter {
        probe: probe.clone(),
        ..StubConverter::default()
    };
    let gateway = StubGateway {
        probe: probe.clone(),
        ..StubGateway::default()
    };
    gateway.fail_upload.store(true, Ordering::SeqCst);
    let transcriptions = Arc::clone(&gateway.transcriptions);

    let mut controller = controller_with(converter, gateway);
    probe.attach(controller.subscribe());
    controller.select_file(sample_video());

    let error = controller.submit(Some("keywords")).await.unwrap_err();

    assert!(matches!(error, PipelineError::Upload(_)));
    assert_eq!(
        controller.status(),
        PipelineStatus::Failed(FailureKind::Upload)
    );
    assert!(transcriptions.lock().unwrap().is_empty());
    assert_eq!(
        probe.seen(),
        vec![PipelineStatus::Converting, PipelineStatus::Uploading]
    );

    // Failure re-enables input through an explicit reset.
    assert!(!controller.status().accepts_input());
    assert!(controller.reset());
    assert!(controller.status().accepts_input());
    assert!(!controller.reset());
}

#[tokio::test]
async fn test_reset_then_resubmit_succeeds() {
    let converter = StubConverter::default();
    let gateway = StubGateway::default();
    let fail_upload = Arc::clone(&gateway.fail_upload);

    let mut controller = controller_with(converter, gateway);
    controller.select_file(sample_video());

    fail_upload.store(true, Ordering::SeqCst);
    assert!(controller.submit(None).await.is_err());

    fail_upload.store(false, Ordering::SeqCst);
    assert!(controller.reset());

    // The source was released by the successful conversion, so the retry
    // re-selects before resubmitting.
    controller.select_file(sample_video());
    let outcome = controller.submit(None).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Completed { .. }));
    assert_eq!(controller.status(), PipelineStatus::Success);
}

#[tokio::test]
async fn test_controls_stay_disabled_after_success() {
    let converter = StubConverter::default();
    let calls = Arc::clone(&converter.calls);
    let mut controller = controller_with(converter, StubGateway::default());

    controller.select_file(sample_video());
    controller.submit(None).await.unwrap();
    assert_eq!(controller.status(), PipelineStatus::Success);

    // Terminal for this run: no re-selection, no re-submission.
    assert!(!controller.select_file(sample_video()));
    let outcome = controller.submit(None).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Rejected));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
