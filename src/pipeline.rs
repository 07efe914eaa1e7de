use crate::audio::{estimate_narration_seconds, media_duration_seconds, write_silence};
use crate::images::load_image_pool;
use crate::render::MediaRenderer;
use crate::session::{SessionId, SessionStore, Stage};
use crate::speaker::{Narration, VoicePool, assign_voices};
use crate::subtitle::{SubtitleMode, build_srt_entries, write_srt};
use crate::thread::{CommentLimit, fetch_thread};
use crate::timeline::{BackgroundTrack, compose_timeline};
use crate::tts::NarrationProvider;
use crate::utils::shorten_intro;
use anyhow::Context;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const MIN_PLACEHOLDER_SECONDS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntroBudget {
    pub max_seconds: f64,
    pub units_per_second: f64,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub images_dir: PathBuf,
    pub output: PathBuf,
    pub work_dir: PathBuf,
    pub intro_voice: Option<String>,
    pub comment_limit: CommentLimit,
    pub intro_budget: Option<IntroBudget>,
    pub slide_duration: f64,
    pub bgm: Option<PathBuf>,
    pub bgm_volume: f64,
    pub subtitle_mode: SubtitleMode,
    pub concurrency: usize,
    pub tts_timeout: Duration,
    pub tts_retries: u32,
    pub speed: f64,
    pub max_images: Option<usize>,
    pub seed: Option<u64>,
}

/// The calling layer around the core: it owns all I/O and per-job state.
pub struct Pipeline {
    provider: Arc<dyn NarrationProvider>,
    renderer: Arc<dyn MediaRenderer>,
    sessions: Arc<dyn SessionStore>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn NarrationProvider>,
        renderer: Arc<dyn MediaRenderer>,
        sessions: Arc<dyn SessionStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            provider,
            renderer,
            sessions,
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Fetches a thread and produces its video. A failure marks the session
    /// failed; no partial output is kept as the result.
    pub async fn run(&self, thread_url: &str) -> anyhow::Result<PathBuf> {
        let session = self.sessions.create(thread_url);
        info!("Session {} for {}", session, thread_url);
        let result: anyhow::Result<PathBuf> = async {
            let thread = fetch_thread(thread_url, self.settings.comment_limit).await?;
            self.produce(&session, thread.into_narration()).await
        }
        .await;
        self.settle(&session, result)
    }

    /// Marks the session failed when `result` is an error. The job's own
    /// error is returned even if the session can no longer be updated.
    fn settle(
        &self,
        session: &SessionId,
        result: anyhow::Result<PathBuf>,
    ) -> anyhow::Result<PathBuf> {
        if let Err(e) = &result {
            let reason = format!("{:#}", e);
            if let Err(update_err) = self
                .sessions
                .update(session, &mut |r| r.stage = Stage::Failed(reason.clone()))
            {
                warn!("Could not mark session {} failed: {:#}", session, update_err);
            }
        }
        result
    }

    /// Everything after extraction: voices, synthesis, composition, render.
    pub async fn produce(
        &self,
        session: &SessionId,
        mut narration: Narration,
    ) -> anyhow::Result<PathBuf> {
        if let (Some(budget), Some(intro)) = (self.settings.intro_budget, narration.intro.as_mut()) {
            intro.text = shorten_intro(&intro.text, budget.max_seconds, budget.units_per_second);
        }
        let extracted = narration.clone();
        self.sessions.update(session, &mut |r| {
            r.stage = Stage::Extracted;
            r.narration = Some(extracted.clone());
        })?;

        let work_dir = self.settings.work_dir.join(session.as_str());
        tokio::fs::create_dir_all(&work_dir)
            .await
            .with_context(|| format!("Failed to create {}", work_dir.display()))?;
        info!("Working in {}", work_dir.display());

        let pool = VoicePool::new(self.provider.list_voices()?)?;
        info!("{} offers {} voices", self.provider.name(), pool.len());
        let mut rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let narration = assign_voices(
            narration,
            &pool,
            self.settings.intro_voice.as_deref(),
            &mut rng,
        )?;

        let narration = self.synthesize_all(narration, &work_dir).await?;
        let narrated = narration.clone();
        self.sessions.update(session, &mut |r| {
            r.stage = Stage::Narrated;
            r.narration = Some(narrated.clone());
        })?;

        let images = load_image_pool(&self.settings.images_dir, self.settings.max_images)?;
        let background = match &self.settings.bgm {
            Some(path) => {
                let native = media_duration_seconds(path).await?;
                info!("Background {} is {:.2}s", path.display(), native);
                Some(BackgroundTrack::new(path, native, self.settings.bgm_volume))
            }
            None => None,
        };
        let timeline = compose_timeline(
            &narration,
            &images,
            self.settings.slide_duration,
            background.as_ref(),
        )?;

        let timeline_path = work_dir.join("timeline.json");
        tokio::fs::write(&timeline_path, serde_json::to_string_pretty(&timeline)?).await?;
        let srt_path = work_dir.join("subs.srt");
        write_srt(
            &srt_path,
            &build_srt_entries(&timeline.subtitles, self.settings.subtitle_mode),
        )?;
        debug!("Wrote {} and {}", timeline_path.display(), srt_path.display());
        let composed = timeline.clone();
        self.sessions.update(session, &mut |r| {
            r.stage = Stage::Composed;
            r.timeline = Some(composed.clone());
        })?;

        self.renderer
            .render(&timeline, Some(&srt_path), &self.settings.output)
            .await?;
        let video = self.settings.output.clone();
        self.sessions.update(session, &mut |r| {
            r.stage = Stage::Rendered;
            r.video = Some(video.clone());
        })?;
        Ok(self.settings.output.clone())
    }

    /// Synthesizes every segment concurrently, then fills in measured
    /// durations. Voices must already be assigned.
    async fn synthesize_all(
        &self,
        mut narration: Narration,
        work_dir: &Path,
    ) -> anyhow::Result<Narration> {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));
        let mut tasks = JoinSet::new();
        let total = narration.len();

        for (index, segment) in narration.segments().enumerate() {
            let voice = segment
                .voice
                .clone()
                .with_context(|| format!("Segment {} has no voice", index))?;
            let text = segment.text.clone();
            let out = work_dir.join(format!(
                "part_{:03}.{}",
                index,
                self.provider.file_extension()
            ));
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let (limit, retries) = (self.settings.tts_timeout, self.settings.tts_retries);
            let speed = self.settings.speed;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                info!("Generating TTS clip {}/{} with {}", index + 1, total, voice);
                let (audio, duration) =
                    synthesize_segment(provider.as_ref(), &text, &voice, speed, out, limit, retries)
                        .await?;
                Ok::<_, anyhow::Error>((index, audio, duration))
            });
        }

        let mut results: Vec<Option<(PathBuf, f64)>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            let (index, audio, duration) = joined??;
            info!("Clip {} duration: {:.2} seconds", index, duration);
            results[index] = Some((audio, duration));
        }

        for (index, (segment, result)) in narration.segments_mut().zip(results).enumerate() {
            let (audio, duration) =
                result.with_context(|| format!("No audio produced for segment {}", index))?;
            segment.audio = Some(audio);
            segment.duration = duration;
        }
        Ok(narration)
    }
}

/// Tries the provider `retries + 1` times, each bounded by `limit`. When every
/// attempt fails, writes silence sized to the text so the job can go on.
async fn synthesize_segment(
    provider: &dyn NarrationProvider,
    text: &str,
    voice: &str,
    speed: f64,
    out: PathBuf,
    limit: Duration,
    retries: u32,
) -> anyhow::Result<(PathBuf, f64)> {
    for attempt in 1..=retries + 1 {
        match timeout(limit, provider.synthesize(text, voice, speed, &out)).await {
            Ok(Ok(())) => match media_duration_seconds(&out).await {
                Ok(duration) => return Ok((out, duration)),
                Err(e) => warn!("Attempt {} produced unreadable audio: {:#}", attempt, e),
            },
            Ok(Err(e)) => warn!("Attempt {} for {} failed: {:#}", attempt, out.display(), e),
            Err(_) => warn!(
                "Attempt {} for {} timed out after {:?}",
                attempt,
                out.display(),
                limit
            ),
        }
    }

    let seconds = estimate_narration_seconds(text, speed).max(MIN_PLACEHOLDER_SECONDS);
    let placeholder = out.with_extension("placeholder.wav");
    warn!(
        "Substituting {:.2}s of silence for {}",
        seconds,
        out.display()
    );
    write_silence(&placeholder, seconds)?;
    Ok((placeholder, seconds))
}
