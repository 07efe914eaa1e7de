use anyhow::Context;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

const PLACEHOLDER_SAMPLE_RATE: u32 = 22_050;
const CHARS_PER_MINUTE: f64 = 375.0;

pub fn wav_duration_seconds(path: &Path) -> anyhow::Result<f64> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    let duration = frames / spec.sample_rate as f64;
    Ok(duration)
}

/// Exact duration of a finished audio file. WAV is read directly; anything
/// else goes through `ffprobe`.
pub async fn media_duration_seconds(path: &Path) -> anyhow::Result<f64> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
    if is_wav {
        return wav_duration_seconds(path);
    }

    debug!("Reading duration of {} with ffprobe", path.display());
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("Failed to spawn ffprobe")?;
    if !output.status.success() {
        anyhow::bail!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    parse_duration_output(&String::from_utf8_lossy(&output.stdout))
        .with_context(|| format!("Unexpected ffprobe output for {}", path.display()))
}

fn parse_duration_output(stdout: &str) -> anyhow::Result<f64> {
    let value: f64 = stdout.trim().parse()?;
    if !value.is_finite() || value < 0.0 {
        anyhow::bail!("invalid duration {}", value);
    }
    Ok(value)
}

/// Rough narration length for text that could not be synthesized, read at
/// `speed` times the normal rate.
pub fn estimate_narration_seconds(text: &str, speed: f64) -> f64 {
    text.chars().count() as f64 / CHARS_PER_MINUTE * 60.0 / speed
}

/// Writes a mono 16-bit WAV of silence lasting `seconds`.
pub fn write_silence(path: &Path, seconds: f64) -> anyhow::Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: PLACEHOLDER_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let frames = (seconds.max(0.0) * PLACEHOLDER_SAMPLE_RATE as f64).round() as u64;
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for _ in 0..frames {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;
    Ok(())
}
