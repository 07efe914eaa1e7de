use crate::error::CoreError;
use crate::images::ImageFilter;
use crate::pipeline::{IntroBudget, PipelineSettings};
use crate::render::FfmpegRenderer;
use crate::subtitle::SubtitleMode;
use crate::thread::CommentLimit;
use crate::timeline::{DEFAULT_BGM_VOLUME, DEFAULT_SLIDE_DURATION};
use crate::tts::{DEFAULT_SPEED, MAX_SPEED, MIN_SPEED, NarrationEngine, ProviderConfig};
use crate::utils::{DEFAULT_MAX_INTRO_SECONDS, DEFAULT_WORDS_PER_SECOND};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(name = "threadcast", about = "Turn a discussion thread into a narrated slideshow video")]
pub struct Args {
    /// Thread URL (reddit.com/.../comments/<id>/... or redd.it/<id>)
    #[clap(long)]
    pub thread: String,

    /// Directory of slide images, shown in file-name order
    #[clap(long)]
    pub images: PathBuf,

    /// Use at most this many images; omit to use all of them
    #[clap(long)]
    pub max_images: Option<usize>,

    #[clap(long, value_enum)]
    pub image_filter: Option<ImageFilter>,

    #[clap(long, default_value = "out.mp4")]
    pub out: PathBuf,

    #[clap(long, value_enum, default_value_t = NarrationEngine::Piper)]
    pub engine: NarrationEngine,

    /// Directory of piper `.onnx` voice models
    #[clap(long, default_value = "./tts")]
    pub voices: PathBuf,

    #[clap(long, value_delimiter = ',', default_value = "en,en-us,en-gb-scotland")]
    pub espeak_voices: Vec<String>,

    /// Voice for the intro; picked at random when omitted
    #[clap(long)]
    pub intro_voice: Option<String>,

    /// Keep at most this many comments; omit to keep all of them
    #[clap(long)]
    pub max_comments: Option<usize>,

    /// Speaking rate multiplier, between 0.25 and 4
    #[clap(long, default_value_t = DEFAULT_SPEED)]
    pub speed: f64,

    #[clap(long, default_value_t = false)]
    pub keep_full_intro: bool,

    #[clap(long, default_value_t = DEFAULT_MAX_INTRO_SECONDS)]
    pub max_intro_seconds: f64,

    #[clap(long, default_value_t = DEFAULT_WORDS_PER_SECOND)]
    pub words_per_second: f64,

    #[clap(long, default_value_t = DEFAULT_SLIDE_DURATION)]
    pub slide_duration: f64,

    /// Background music, looped or cut to the narration length
    #[clap(long)]
    pub bgm: Option<PathBuf>,

    #[clap(long, default_value_t = DEFAULT_BGM_VOLUME)]
    pub bgm_volume: f64,

    #[clap(long, value_enum, default_value_t = SubtitleMode::Segment)]
    pub subtitles: SubtitleMode,

    /// Narration clips synthesized at the same time
    #[clap(long, default_value_t = 3)]
    pub concurrency: usize,

    #[clap(long, default_value_t = 60)]
    pub tts_timeout_secs: u64,

    #[clap(long, default_value_t = 1)]
    pub tts_retries: u32,

    /// Seed for voice assignment
    #[clap(long)]
    pub seed: Option<u64>,

    #[clap(long, default_value = "rs_tmp")]
    pub work_dir: PathBuf,

    #[clap(long, default_value_t = 1080)]
    pub width: u32,

    #[clap(long, default_value_t = 1920)]
    pub height: u32,

    #[clap(long, default_value_t = 30)]
    pub fps: u32,
}

impl Args {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            engine: self.engine,
            voices_dir: self.voices.clone(),
            espeak_voices: self.espeak_voices.clone(),
        }
    }

    pub fn renderer(&self) -> FfmpegRenderer {
        FfmpegRenderer {
            width: self.width,
            height: self.height,
            fps: self.fps,
            image_filter: self.image_filter,
            ..FfmpegRenderer::default()
        }
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings, CoreError> {
        if !self.slide_duration.is_finite() || self.slide_duration <= 0.0 {
            return Err(CoreError::configuration(format!(
                "--slide-duration must be positive, got {}",
                self.slide_duration
            )));
        }
        if !(0.0..=1.0).contains(&self.bgm_volume) {
            return Err(CoreError::configuration(format!(
                "--bgm-volume must be within [0, 1], got {}",
                self.bgm_volume
            )));
        }
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(CoreError::configuration(format!(
                "--speed must be within [{}, {}], got {}",
                MIN_SPEED, MAX_SPEED, self.speed
            )));
        }
        if self.max_images == Some(0) {
            return Err(CoreError::configuration("--max-images must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(CoreError::configuration("--concurrency must be at least 1"));
        }
        if self.width == 0 || self.height == 0 || self.fps == 0 {
            return Err(CoreError::configuration("frame size and fps must be non-zero"));
        }
        let intro_budget = if self.keep_full_intro {
            None
        } else {
            if self.max_intro_seconds <= 0.0 || self.words_per_second <= 0.0 {
                return Err(CoreError::configuration(
                    "--max-intro-seconds and --words-per-second must be positive",
                ));
            }
            Some(IntroBudget {
                max_seconds: self.max_intro_seconds,
                units_per_second: self.words_per_second,
            })
        };

        Ok(PipelineSettings {
            images_dir: self.images.clone(),
            output: self.out.clone(),
            work_dir: self.work_dir.clone(),
            intro_voice: self.intro_voice.clone(),
            comment_limit: CommentLimit::from_option(self.max_comments),
            intro_budget,
            slide_duration: self.slide_duration,
            bgm: self.bgm.clone(),
            bgm_volume: self.bgm_volume,
            subtitle_mode: self.subtitles,
            concurrency: self.concurrency,
            tts_timeout: Duration::from_secs(self.tts_timeout_secs),
            tts_retries: self.tts_retries,
            speed: self.speed,
            max_images: self.max_images,
            seed: self.seed,
        })
    }
}
