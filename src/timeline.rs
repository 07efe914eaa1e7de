//! Lays narration, slides, subtitles and background music onto one time axis.
//!
//! All times are seconds from zero. The visual track is always reconciled to
//! the narration length: short slideshows hold their last slide, long ones are
//! cut. Narration is never shortened.

use crate::error::CoreError;
use crate::speaker::{Narration, VoiceId};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_SLIDE_DURATION: f64 = 5.0;
pub const DEFAULT_BGM_VOLUME: f64 = 0.3;
/// Shortest slide kept on the visual track.
pub const MIN_SLIDE_SECONDS: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimedInterval {
    pub start: f64,
    pub duration: f64,
}

impl TimedInterval {
    pub fn new(start: f64, duration: f64) -> Self {
        Self { start, duration }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// A media asset placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clip {
    pub asset: PathBuf,
    #[serde(flatten)]
    pub span: TimedInterval,
}

/// A subtitle shown while its segment is spoken.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cue {
    pub text: String,
    pub voice: Option<VoiceId>,
    #[serde(flatten)]
    pub span: TimedInterval,
}

/// Background music as loaded, before fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundTrack {
    pub asset: PathBuf,
    pub native_duration: f64,
    /// Linear gain in `[0.0, 1.0]`.
    pub volume: f64,
}

impl BackgroundTrack {
    pub fn new(asset: impl Into<PathBuf>, native_duration: f64, volume: f64) -> Self {
        Self {
            asset: asset.into(),
            native_duration,
            volume,
        }
    }
}

/// Background music fitted to the narration: `loops` whole copies played
/// back to back, cut at `span.duration`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackgroundClip {
    pub asset: PathBuf,
    #[serde(flatten)]
    pub span: TimedInterval,
    pub loops: usize,
    pub volume: f64,
}

/// Everything a renderer needs. Tracks share one zero-based axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineDescription {
    pub visual: Vec<Clip>,
    pub narration: Vec<Clip>,
    pub background: Option<BackgroundClip>,
    pub subtitles: Vec<Cue>,
    pub duration: f64,
}

impl TimelineDescription {
    pub fn visual_duration(&self) -> f64 {
        track_end(&self.visual)
    }

    pub fn narration_duration(&self) -> f64 {
        track_end(&self.narration)
    }
}

fn track_end(clips: &[Clip]) -> f64 {
    clips.last().map(|c| c.span.end()).unwrap_or(0.0)
}

pub fn compose_timeline(
    narration: &Narration,
    images: &[PathBuf],
    slide_duration: f64,
    background: Option<&BackgroundTrack>,
) -> Result<TimelineDescription, CoreError> {
    if !slide_duration.is_finite() || slide_duration <= 0.0 {
        return Err(CoreError::configuration(format!(
            "slide duration must be positive, got {}",
            slide_duration
        )));
    }
    if images.is_empty() {
        return Err(CoreError::insufficient("no images for the visual track"));
    }
    if narration.is_empty() {
        return Err(CoreError::insufficient("no narration segments"));
    }

    let (audio, subtitles, total) = lay_out_narration(narration)?;
    if total <= 0.0 {
        return Err(CoreError::insufficient("narration has zero total duration"));
    }

    let visual = lay_out_slides(images, slide_duration, total);
    let background = background.map(|bgm| fit_background(bgm, total)).transpose()?;

    debug!(
        "Composed timeline: {} slides, {} narration clips, {:.2}s",
        visual.len(),
        audio.len(),
        total
    );

    Ok(TimelineDescription {
        visual,
        narration: audio,
        background,
        subtitles,
        duration: total,
    })
}

/// Places every segment back to back from zero, intro first.
fn lay_out_narration(narration: &Narration) -> Result<(Vec<Clip>, Vec<Cue>, f64), CoreError> {
    let mut audio = Vec::with_capacity(narration.len());
    let mut subtitles = Vec::with_capacity(narration.len());
    let mut cursor = 0.0_f64;

    for (i, segment) in narration.segments().enumerate() {
        if !segment.duration.is_finite() || segment.duration < 0.0 {
            return Err(CoreError::configuration(format!(
                "segment {} has invalid duration {}",
                i, segment.duration
            )));
        }
        let asset = segment
            .audio
            .clone()
            .ok_or_else(|| CoreError::insufficient(format!("segment {} has no audio", i)))?;

        let span = TimedInterval::new(cursor, segment.duration);
        audio.push(Clip { asset, span });
        subtitles.push(Cue {
            text: segment.text.clone(),
            voice: segment.voice.clone(),
            span,
        });
        cursor = span.end();
    }

    Ok((audio, subtitles, cursor))
}

/// Slides of `slide_duration` each, reconciled to exactly `target` seconds.
///
/// A slide that would show for less than [`MIN_SLIDE_SECONDS`] is dropped and
/// its remainder goes to the slide before it.
fn lay_out_slides(images: &[PathBuf], slide_duration: f64, target: f64) -> Vec<Clip> {
    let natural = slide_duration * images.len() as f64;
    let mut slides: Vec<Clip> = Vec::with_capacity(images.len());

    for (i, image) in images.iter().enumerate() {
        let start = slide_duration * i as f64;
        if !slides.is_empty() && target - start < MIN_SLIDE_SECONDS {
            break;
        }
        slides.push(Clip {
            asset: image.clone(),
            span: TimedInterval::new(start, slide_duration.min(target - start)),
        });
    }
    if let Some(last) = slides.last_mut() {
        last.span.duration = target - last.span.start;
    }

    if natural < target {
        debug!(
            "Holding final slide for {:.2}s to cover narration",
            target - natural
        );
    } else if slides.len() < images.len() {
        debug!(
            "Truncating slideshow from {:.2}s to {:.2}s ({} of {} slides kept)",
            natural,
            target,
            slides.len(),
            images.len()
        );
    }

    slides
}

/// Loops or trims a background track to exactly `target` seconds.
pub fn fit_background(track: &BackgroundTrack, target: f64) -> Result<BackgroundClip, CoreError> {
    if !target.is_finite() || target < 0.0 {
        return Err(CoreError::configuration(format!(
            "background target length must be a non-negative number of seconds, got {}",
            target
        )));
    }
    if !track.native_duration.is_finite() || track.native_duration <= 0.0 {
        return Err(CoreError::insufficient(format!(
            "background track {} has no duration",
            track.asset.display()
        )));
    }
    if !(0.0..=1.0).contains(&track.volume) {
        return Err(CoreError::configuration(format!(
            "background volume must be within [0, 1], got {}",
            track.volume
        )));
    }

    let mut loops = ((target / track.native_duration).ceil() as usize).max(1);
    if (loops as f64) * track.native_duration < target {
        loops += 1;
    }
    debug!(
        "Background {}: {} cop{} of {:.2}s trimmed to {:.2}s",
        track.asset.display(),
        loops,
        if loops == 1 { "y" } else { "ies" },
        track.native_duration,
        target
    );

    Ok(BackgroundClip {
        asset: track.asset.clone(),
        span: TimedInterval::new(0.0, target),
        loops,
        volume: track.volume,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speaker::Segment;

    const EPS: f64 = 1e-9;

    fn images(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("img_{}.png", i))).collect()
    }

    fn narration(intro: Option<f64>, durations: &[f64]) -> Narration {
        let intro = intro.map(|d| Segment::new("intro").with_audio("intro.wav", d));
        let comments = durations
            .iter()
            .enumerate()
            .map(|(i, d)| {
                Segment::new(format!("comment {}", i)).with_audio(format!("c{}.wav", i), *d)
            })
            .collect();
        Narration::new(intro, comments)
    }

    #[test]
    fn narration_clips_are_contiguous() {
        let n = narration(Some(3.3), &[1.25, 0.0, 7.1, 2.05]);
        let timeline = compose_timeline(&n, &images(3), 5.0, None).unwrap();
        assert_eq!(timeline.narration[0].span.start, 0.0);
        for pair in timeline.narration.windows(2) {
            assert_eq!(pair[1].span.start, pair[0].span.end());
        }
        for (clip, cue) in timeline.narration.iter().zip(&timeline.subtitles) {
            assert_eq!(clip.span, cue.span);
        }
    }

    #[test]
    fn visual_track_always_matches_narration() {
        for image_count in 1..8 {
            for durations in [vec![0.5], vec![4.0, 4.0, 4.0], vec![9.7, 13.2, 0.4, 6.6]] {
                let n = narration(Some(2.5), &durations);
                let timeline = compose_timeline(&n, &images(image_count), 5.0, None).unwrap();
                assert!((timeline.visual_duration() - timeline.narration_duration()).abs() < EPS);
                assert!((timeline.duration - timeline.narration_duration()).abs() < EPS);
            }
        }
    }

    #[test]
    fn short_slideshow_holds_its_last_slide() {
        let n = narration(None, &[4.0, 4.0, 4.0]);
        let timeline = compose_timeline(&n, &images(2), 5.0, None).unwrap();
        assert_eq!(timeline.visual.len(), 2);
        assert_eq!(timeline.visual[0].span, TimedInterval::new(0.0, 5.0));
        assert_eq!(timeline.visual[1].span, TimedInterval::new(5.0, 7.0));
        assert_eq!(timeline.narration_duration(), 12.0);
        let narration_spans: Vec<_> = timeline.narration.iter().map(|c| c.span).collect();
        assert_eq!(
            narration_spans,
            vec![
                TimedInterval::new(0.0, 4.0),
                TimedInterval::new(4.0, 4.0),
                TimedInterval::new(8.0, 4.0),
            ]
        );
    }

    #[test]
    fn long_slideshow_is_cut_to_narration() {
        let n = narration(None, &[6.0, 1.0]);
        let timeline = compose_timeline(&n, &images(5), 5.0, None).unwrap();
        assert_eq!(timeline.visual.len(), 2);
        assert_eq!(timeline.visual[1].span, TimedInterval::new(5.0, 2.0));
        assert_eq!(timeline.visual_duration(), 7.0);
    }

    #[test]
    fn exact_fit_leaves_slides_untouched() {
        let n = narration(None, &[5.0, 5.0]);
        let timeline = compose_timeline(&n, &images(2), 5.0, None).unwrap();
        assert!(timeline.visual.iter().all(|c| c.span.duration == 5.0));
    }

    #[test]
    fn intro_is_placed_first_with_its_own_subtitle() {
        let n = narration(Some(3.0), &[2.0]);
        let timeline = compose_timeline(&n, &images(1), 5.0, None).unwrap();
        assert_eq!(timeline.subtitles[0].text, "intro");
        assert_eq!(timeline.subtitles[0].span, TimedInterval::new(0.0, 3.0));
        assert_eq!(timeline.subtitles[1].span, TimedInterval::new(3.0, 2.0));
    }

    #[test]
    fn short_background_is_looped_then_trimmed() {
        let bgm = BackgroundTrack::new("bgm.mp3", 7.0, 0.3);
        let clip = fit_background(&bgm, 20.0).unwrap();
        assert_eq!(clip.loops, 3);
        assert_eq!(clip.span, TimedInterval::new(0.0, 20.0));
        assert_eq!(clip.volume, 0.3);
    }

    #[test]
    fn background_always_fits_exactly() {
        for native in [0.3, 1.0, 7.0, 14.0, 20.0, 21.5, 300.0] {
            for target in [0.7, 14.0, 20.0, 59.9] {
                let clip = fit_background(&BackgroundTrack::new("bgm.mp3", native, 1.0), target)
                    .unwrap();
                assert_eq!(clip.span.duration, target);
                assert!(clip.loops as f64 * native >= target);
                assert!(clip.loops == 1 || (clip.loops - 1) as f64 * native < target);
            }
        }
    }

    #[test]
    fn background_follows_narration_length() {
        let n = narration(Some(2.0), &[4.0, 4.0]);
        let bgm = BackgroundTrack::new("bgm.mp3", 100.0, 0.5);
        let timeline = compose_timeline(&n, &images(1), 5.0, Some(&bgm)).unwrap();
        let background = timeline.background.unwrap();
        assert_eq!(background.loops, 1);
        assert_eq!(background.span.duration, 10.0);
    }

    #[test]
    fn no_images_is_insufficient_input() {
        let n = narration(None, &[4.0]);
        let err = compose_timeline(&n, &[], 5.0, None).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientInput(_)));
    }

    #[test]
    fn silent_or_missing_narration_is_insufficient_input() {
        let err = compose_timeline(&Narration::default(), &images(2), 5.0, None).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientInput(_)));

        let err = compose_timeline(&narration(None, &[0.0, 0.0]), &images(2), 5.0, None)
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientInput(_)));

        let unsynthesized = Narration::new(None, vec![Segment::new("no audio yet")]);
        let err = compose_timeline(&unsynthesized, &images(2), 5.0, None).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientInput(_)));
    }

    #[test]
    fn invalid_settings_are_configuration_errors() {
        let n = narration(None, &[4.0]);
        for slide in [0.0, -1.0, f64::NAN] {
            let err = compose_timeline(&n, &images(1), slide, None).unwrap_err();
            assert!(matches!(err, CoreError::Configuration(_)));
        }

        let err = compose_timeline(&narration(None, &[-2.0]), &images(1), 5.0, None).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));

        let loud = BackgroundTrack::new("bgm.mp3", 10.0, 1.5);
        let err = compose_timeline(&n, &images(1), 5.0, Some(&loud)).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn empty_background_is_insufficient_input() {
        let err = fit_background(&BackgroundTrack::new("bgm.mp3", 0.0, 0.3), 10.0).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientInput(_)));
    }

    #[test]
    fn slivers_fold_into_the_previous_slide() {
        let n = narration(None, &[5.0, 5.000000000000002]);
        let timeline = compose_timeline(&n, &images(3), 5.0, None).unwrap();
        assert!(timeline.duration > 10.0);
        assert_eq!(timeline.visual.len(), 2);
        assert!(timeline.visual.iter().all(|c| c.span.duration >= MIN_SLIDE_SECONDS));
        assert_eq!(timeline.visual_duration(), timeline.narration_duration());

        let n = narration(None, &[10.0005]);
        let timeline = compose_timeline(&n, &images(3), 5.0, None).unwrap();
        assert_eq!(timeline.visual.len(), 2);
        assert!((timeline.visual[1].span.duration - 5.0005).abs() < EPS);
    }

    #[test]
    fn background_target_must_be_a_length() {
        let bgm = BackgroundTrack::new("bgm.mp3", 10.0, 0.3);
        for target in [-1.0, f64::NAN, f64::INFINITY] {
            let err = fit_background(&bgm, target).unwrap_err();
            assert!(matches!(err, CoreError::Configuration(_)));
        }
        assert_eq!(fit_background(&bgm, 0.0).unwrap().loops, 1);
    }
}
