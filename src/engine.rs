use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::extract::ExtractionError;

/// Fixed name of the engine's virtual input slot.
pub const INPUT_SLOT: &str = "input.mp4";

/// Fixed name of the engine's virtual output slot.
pub const OUTPUT_SLOT: &str = "output.mp3";

#[derive(Debug, Error)]
pub enum EngineLoadError {
    #[error("{tool} is not available: {reason}")]
    ToolUnavailable { tool: &'static str, reason: String },

    #[error("failed to probe {tool}: {source}")]
    Probe {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Process-wide handle to the transcoding engine.
///
/// The underlying engine is loaded at most once per handle, on first
/// `acquire`. Concurrent first acquisitions are serialized by the cell, so
/// exactly one physical load runs and every caller observes the same
/// instance. A failed load is not cached: the next `acquire` retries, since
/// a missing binary is usually fixed without restarting the process.
#[derive(Clone, Default)]
pub struct EngineHandle {
    cell: Arc<OnceCell<Arc<LoadedEngine>>>,
}

impl EngineHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared handle injected into every extractor in this process.
    pub fn global() -> &'static EngineHandle {
        static GLOBAL: OnceLock<EngineHandle> = OnceLock::new();
        GLOBAL.get_or_init(EngineHandle::new)
    }

    /// Return the ready engine, loading it on first call.
    pub async fn acquire(&self) -> Result<Arc<LoadedEngine>, EngineLoadError> {
        self.get_or_load(LoadedEngine::load).await
    }

    pub(crate) async fn get_or_load<F, Fut>(
        &self,
        load: F,
    ) -> Result<Arc<LoadedEngine>, EngineLoadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<LoadedEngine, EngineLoadError>>,
    {
        self.cell
            .get_or_try_init(|| async { load().await.map(Arc::new) })
            .await
            .map(Arc::clone)
    }
}

/// A loaded engine: resolved transcoder binaries plus their version line.
#[derive(Debug)]
pub struct LoadedEngine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    version: String,
}

impl LoadedEngine {
    /// Probe the ffmpeg/ffprobe binaries and record the engine version.
    pub async fn load() -> Result<Self, EngineLoadError> {
        let version = probe_tool("ffmpeg").await?;
        probe_tool("ffprobe").await?;

        info!("🎛️ Transcoding engine loaded: {}", version);

        Ok(Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            version,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Open a scratch workspace holding the virtual input/output slots for
    /// one conversion. The workspace is removed when the session drops.
    pub fn open_session(&self) -> Result<ConversionSession, ExtractionError> {
        let dir = TempDir::new()?;
        debug!("Opened conversion session at {}", dir.path().display());

        Ok(ConversionSession {
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
            dir,
        })
    }

    #[cfg(test)]
    pub(crate) fn fake() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            version: "fake".to_string(),
        }
    }
}

async fn probe_tool(tool: &'static str) -> Result<String, EngineLoadError> {
    let output = Command::new(tool)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| EngineLoadError::Probe { tool, source })?;

    if !output.status.success() {
        return Err(EngineLoadError::ToolUnavailable {
            tool,
            reason: format!("exited with {}", output.status),
        });
    }

    let version = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();

    Ok(version)
}

/// Per-conversion workspace. Slot names are resolved relative to the
/// session directory, so the transcode command only ever sees the fixed
/// `input.mp4` / `output.mp3` names.
pub struct ConversionSession {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    dir: TempDir,
}

impl ConversionSession {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write the source bytes into the virtual input slot.
    pub async fn write_input(&self, bytes: &[u8]) -> Result<(), ExtractionError> {
        tokio::fs::write(self.dir.path().join(INPUT_SLOT), bytes).await?;
        Ok(())
    }

    /// Read the virtual output slot back into memory.
    pub async fn read_output(&self) -> Result<Vec<u8>, ExtractionError> {
        let bytes = tokio::fs::read(self.dir.path().join(OUTPUT_SLOT)).await?;
        Ok(bytes)
    }

    /// Probe the duration of the input slot. Returns `None` when the
    /// container carries no duration; the transcode step reports the real
    /// failure for malformed input.
    pub async fn probe_input_duration(&self) -> Result<Option<Duration>, ExtractionError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                INPUT_SLOT,
            ])
            .current_dir(self.dir.path())
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            debug!("ffprobe could not read the input slot");
            return Ok(None);
        }

        let json = String::from_utf8_lossy(&output.stdout);
        Ok(duration_from_probe(&json))
    }

    /// Run the transcode command against the slots, feeding fractional
    /// progress from the engine's `-progress` stream to `on_progress`.
    pub async fn transcode(
        &self,
        args: &[String],
        total: Option<Duration>,
        mut on_progress: impl FnMut(f64),
    ) -> Result<(), ExtractionError> {
        debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new(&self.ffmpeg)
            .args(args)
            .current_dir(self.dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain stderr concurrently so a chatty engine cannot fill the pipe
        // and stall the progress reader.
        let mut stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(fraction) = progress_fraction(&line, total) {
                    debug!("Convert progress {}%", (fraction * 100.0).round());
                    on_progress(fraction);
                }
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(ExtractionError::Transcode {
                code: status.code(),
                detail: stderr_tail(&stderr),
            });
        }

        Ok(())
    }
}

/// Parse one `key=value` line of the engine's progress stream into a
/// completion fraction. `out_time_us` is microseconds of output produced.
fn progress_fraction(line: &str, total: Option<Duration>) -> Option<f64> {
    let total = total?;
    let micros: u64 = line.strip_prefix("out_time_us=")?.trim().parse().ok()?;
    let total_micros = total.as_micros().max(1) as f64;
    Some((micros as f64 / total_micros).min(1.0))
}

fn duration_from_probe(json: &str) -> Option<Duration> {
    let probe: serde_json::Value = serde_json::from_str(json).ok()?;
    let seconds: f64 = probe["format"]["duration"].as_str()?.parse().ok()?;
    (seconds > 0.0).then(|| Duration::from_secs_f64(seconds))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail_start = lines.len().saturating_sub(4);
    lines[tail_start..].join("\n")
}
