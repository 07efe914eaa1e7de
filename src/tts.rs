use crate::speaker::VoiceId;
use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

pub const DEFAULT_SPEED: f64 = 1.0;
pub const MIN_SPEED: f64 = 0.25;
pub const MAX_SPEED: f64 = 4.0;

/// espeak-ng's default rate in words per minute.
const ESPEAK_BASE_WPM: f64 = 175.0;

/// A narration backend: lists its voices and renders text to an audio file.
#[async_trait]
pub trait NarrationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn list_voices(&self) -> anyhow::Result<Vec<VoiceId>>;

    /// `speed` is a multiplier on the engine's normal speaking rate.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f64,
        out_path: &Path,
    ) -> anyhow::Result<()>;

    fn file_extension(&self) -> &'static str {
        "wav"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum NarrationEngine {
    /// Piper; each `.onnx` model in the voices directory is one voice.
    Piper,
    /// espeak-ng with a configured list of voice names.
    Espeak,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub engine: NarrationEngine,
    pub voices_dir: PathBuf,
    pub espeak_voices: Vec<String>,
}

pub fn create_provider(config: &ProviderConfig) -> Arc<dyn NarrationProvider> {
    match config.engine {
        NarrationEngine::Piper => Arc::new(Piper::new(&config.voices_dir)),
        NarrationEngine::Espeak => Arc::new(Espeak::new(config.espeak_voices.clone())),
    }
}

pub struct Piper {
    voices_dir: PathBuf,
}

impl Piper {
    pub fn new(voices_dir: impl Into<PathBuf>) -> Self {
        Self {
            voices_dir: voices_dir.into(),
        }
    }

    fn model_path(&self, voice: &str) -> PathBuf {
        self.voices_dir.join(format!("{}.onnx", voice))
    }

    fn command(&self, voice: &str, speed: f64, out_path: &Path) -> Command {
        let mut cmd = Command::new("piper");
        cmd.arg("--model")
            .arg(self.model_path(voice))
            .arg("--length_scale")
            .arg(format!("{:.3}", 1.0 / speed))
            .arg("--output_file")
            .arg(out_path);
        cmd
    }
}

#[async_trait]
impl NarrationProvider for Piper {
    fn name(&self) -> &'static str {
        "piper"
    }

    fn list_voices(&self) -> anyhow::Result<Vec<VoiceId>> {
        let entries = std::fs::read_dir(&self.voices_dir).with_context(|| {
            format!("Failed to read voices directory {}", self.voices_dir.display())
        })?;
        let mut voices = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("onnx") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                voices.push(stem.to_string());
            }
        }
        voices.sort();
        Ok(voices)
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f64,
        out_path: &Path,
    ) -> anyhow::Result<()> {
        run_with_stdin(self.command(voice, speed, out_path), text, out_path).await
    }
}

pub struct Espeak {
    voices: Vec<String>,
}

impl Espeak {
    pub fn new(voices: Vec<String>) -> Self {
        Self { voices }
    }

    fn command(&self, voice: &str, speed: f64, out_path: &Path) -> Command {
        let words_per_minute = (ESPEAK_BASE_WPM * speed).round() as u32;
        let mut cmd = Command::new("espeak-ng");
        cmd.args(["-v", voice, "-s"])
            .arg(words_per_minute.to_string())
            .args(["--stdin", "-w"])
            .arg(out_path);
        cmd
    }
}

#[async_trait]
impl NarrationProvider for Espeak {
    fn name(&self) -> &'static str {
        "espeak-ng"
    }

    fn list_voices(&self) -> anyhow::Result<Vec<VoiceId>> {
        Ok(self.voices.clone())
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f64,
        out_path: &Path,
    ) -> anyhow::Result<()> {
        run_with_stdin(self.command(voice, speed, out_path), text, out_path).await
    }
}

/// Feeds `text` on stdin and waits. The child is killed if the future is
/// dropped, so callers can bound it with a timeout.
async fn run_with_stdin(mut cmd: Command, text: &str, out_path: &Path) -> anyhow::Result<()> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    debug!("Running {:?}", cmd.as_std());
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program))?;

    {
        let mut stdin = child.stdin.take().context("Failed to open stdin")?;
        stdin.write_all(text.as_bytes()).await?;
    }

    let status = child.wait().await?;
    if !status.success() {
        error!("TTS command failed for {}", out_path.display());
        anyhow::bail!("TTS engine returned {} for {}", status, out_path.display());
    }
    Ok(())
}
