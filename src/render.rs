use crate::images::ImageFilter;
use crate::timeline::TimelineDescription;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Turns a composed timeline into a finished video file.
#[async_trait]
pub trait MediaRenderer: Send + Sync {
    async fn render(
        &self,
        timeline: &TimelineDescription,
        subtitles: Option<&Path>,
        output: &Path,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub subtitle_style: String,
    pub image_filter: Option<ImageFilter>,
}

impl Default for FfmpegRenderer {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            subtitle_style: "Fontsize=28,OutlineColour=&H000000&,Outline=3,Shadow=0".to_string(),
            image_filter: None,
        }
    }
}

impl FfmpegRenderer {
    /// One ffmpeg invocation: slides are looped stills concatenated in
    /// order, narration clips are delayed to their start, the background is
    /// stream-looped, trimmed and scaled, and everything is mixed.
    pub fn build_args(
        &self,
        timeline: &TimelineDescription,
        subtitles: Option<&Path>,
        output: &Path,
    ) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into()];
        let mut filters: Vec<String> = Vec::new();

        for clip in &timeline.visual {
            args.extend([
                "-loop".into(),
                "1".into(),
                "-t".into(),
                format!("{:.3}", clip.span.duration),
                "-i".into(),
                clip.asset.display().to_string(),
            ]);
        }
        for clip in &timeline.narration {
            args.extend(["-i".into(), clip.asset.display().to_string()]);
        }
        if let Some(bgm) = &timeline.background {
            args.extend([
                "-stream_loop".into(),
                (bgm.loops.saturating_sub(1)).to_string(),
                "-i".into(),
                bgm.asset.display().to_string(),
            ]);
        }

        let (w, h) = (self.width, self.height);
        let look = match self.image_filter {
            Some(filter) => format!("{},", filter.ffmpeg_filter()),
            None => String::new(),
        };
        let mut slide_labels = String::new();
        for i in 0..timeline.visual.len() {
            filters.push(format!(
                "[{i}:v]{look}scale={w}:{h}:force_original_aspect_ratio=decrease,\
                 pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},format=yuv420p[v{i}]",
                fps = self.fps
            ));
            slide_labels.push_str(&format!("[v{}]", i));
        }
        filters.push(format!(
            "{}concat=n={}:v=1:a=0[slides]",
            slide_labels,
            timeline.visual.len()
        ));
        match subtitles {
            Some(srt) => filters.push(format!(
                "[slides]subtitles='{}':force_style='{}'[vout]",
                escape_filter_path(srt),
                self.subtitle_style
            )),
            None => filters.push("[slides]null[vout]".into()),
        }

        let first_audio = timeline.visual.len();
        let mut mix_labels = String::new();
        for (j, clip) in timeline.narration.iter().enumerate() {
            let delay_ms = (clip.span.start * 1000.0).round() as u64;
            filters.push(format!(
                "[{}:a]adelay=delays={}:all=1[a{}]",
                first_audio + j,
                delay_ms,
                j
            ));
            mix_labels.push_str(&format!("[a{}]", j));
        }
        let mut mix_inputs = timeline.narration.len();
        if let Some(bgm) = &timeline.background {
            filters.push(format!(
                "[{}:a]atrim=0:{:.3},asetpts=PTS-STARTPTS,volume={:.3}[bgm]",
                first_audio + timeline.narration.len(),
                bgm.span.duration,
                bgm.volume
            ));
            mix_labels.push_str("[bgm]");
            mix_inputs += 1;
        }
        filters.push(format!(
            "{}amix=inputs={}:duration=longest:normalize=0[aout]",
            mix_labels, mix_inputs
        ));

        args.extend([
            "-filter_complex".into(),
            filters.join(";"),
            "-map".into(),
            "[vout]".into(),
            "-map".into(),
            "[aout]".into(),
            "-c:v".into(),
            "libx264".into(),
            "-c:a".into(),
            "aac".into(),
            "-r".into(),
            self.fps.to_string(),
            "-t".into(),
            format!("{:.3}", timeline.duration),
            output.display().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl MediaRenderer for FfmpegRenderer {
    async fn render(
        &self,
        timeline: &TimelineDescription,
        subtitles: Option<&Path>,
        output: &Path,
    ) -> anyhow::Result<()> {
        let args = self.build_args(timeline, subtitles, output);
        info!(
            "Rendering {:.2}s video ({} slides) to {}",
            timeline.duration,
            timeline.visual.len(),
            output.display()
        );
        debug!("ffmpeg {}", args.join(" "));
        let status = Command::new("ffmpeg")
            .args(&args)
            .kill_on_drop(true)
            .status()
            .await?;
        if !status.success() {
            error!("ffmpeg failed to produce final video");
            anyhow::bail!("ffmpeg failed to produce final video");
        }
        info!("Final video written to {}", output.display());
        Ok(())
    }
}

fn escape_filter_path(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}
