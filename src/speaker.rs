use crate::error::CoreError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

pub type VoiceId = String;

/// Ordered set of unique voice identifiers offered by a narration provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePool {
    voices: Vec<VoiceId>,
}

impl VoicePool {
    /// Builds a pool, dropping duplicates while keeping first-seen order.
    pub fn new<I, S>(voices: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<VoiceId> = Vec::new();
        for voice in voices {
            let voice = voice.into();
            if !unique.contains(&voice) {
                unique.push(voice);
            }
        }
        if unique.is_empty() {
            return Err(CoreError::configuration("voice pool is empty"));
        }
        Ok(Self { voices: unique })
    }

    pub fn voices(&self) -> &[VoiceId] {
        &self.voices
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn contains(&self, voice: &str) -> bool {
        self.voices.iter().any(|v| v == voice)
    }

    fn require(&self, voice: &str) -> Result<(), CoreError> {
        if self.contains(voice) {
            Ok(())
        } else {
            Err(CoreError::configuration(format!(
                "voice '{}' is not in the pool {:?}",
                voice, self.voices
            )))
        }
    }
}

/// One spoken unit: the intro or a single comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub voice: Option<VoiceId>,
    /// Seconds of narration, measured from the finished audio file.
    pub duration: f64,
    pub audio: Option<PathBuf>,
}

impl Segment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: None,
            duration: 0.0,
            audio: None,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_audio(mut self, audio: impl Into<PathBuf>, duration: f64) -> Self {
        self.audio = Some(audio.into());
        self.duration = duration;
        self
    }
}

/// An intro followed by comments, in narrative order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Narration {
    pub intro: Option<Segment>,
    pub comments: Vec<Segment>,
}

impl Narration {
    pub fn new(intro: Option<Segment>, comments: Vec<Segment>) -> Self {
        Self { intro, comments }
    }

    /// All segments in playback order, intro first.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.intro.iter().chain(self.comments.iter())
    }

    pub fn segments_mut(&mut self) -> impl Iterator<Item = &mut Segment> {
        self.intro.iter_mut().chain(self.comments.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.comments.len() + usize::from(self.intro.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rotation state for a single assignment pass. Never shared between jobs.
#[derive(Debug, Default)]
pub struct AssignmentState {
    last_used_voice: Option<VoiceId>,
}

impl AssignmentState {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, voice: &str) {
        self.last_used_voice = Some(voice.to_string());
    }

    /// Records a voice that was fixed before assignment started. For pools of
    /// two or more it must differ from the previous segment's voice.
    fn record_fixed(&mut self, pool: &VoicePool, voice: &str) -> Result<(), CoreError> {
        pool.require(voice)?;
        if pool.len() > 1 && self.last_used_voice.as_deref() == Some(voice) {
            return Err(CoreError::configuration(format!(
                "adjacent segments are both fixed to voice '{}'",
                voice
            )));
        }
        self.record(voice);
        Ok(())
    }

    /// Picks uniformly from `pool - {last_used_voice}`.
    ///
    /// `upcoming` is the already-fixed voice of the next segment, if any; it is
    /// avoided too whenever the pool leaves a candidate after both exclusions.
    /// A single-voice pool always yields that voice.
    pub fn pick_next<R: Rng + ?Sized>(
        &mut self,
        pool: &VoicePool,
        upcoming: Option<&str>,
        rng: &mut R,
    ) -> VoiceId {
        if pool.len() == 1 {
            let voice = pool.voices[0].clone();
            self.record(&voice);
            return voice;
        }

        let last = self.last_used_voice.as_deref();
        let strict: Vec<&VoiceId> = pool
            .voices
            .iter()
            .filter(|v| Some(v.as_str()) != last && Some(v.as_str()) != upcoming)
            .collect();
        let candidates = if strict.is_empty() {
            pool.voices
                .iter()
                .filter(|v| Some(v.as_str()) != last)
                .collect()
        } else {
            strict
        };

        let voice = candidates[rng.gen_range(0..candidates.len())].clone();
        self.record(&voice);
        voice
    }
}

/// Gives every segment a voice so that, for pools of two or more, no two
/// adjacent segments (intro to first comment included) share one.
///
/// Segments that already carry a voice keep it. `intro_voice` fixes the
/// intro's voice; without it the intro draws from the pool minus the first
/// comment's preset voice. Two fixed voices that would sit next to each other
/// with the same value are a configuration error.
pub fn assign_voices<R: Rng + ?Sized>(
    mut narration: Narration,
    pool: &VoicePool,
    intro_voice: Option<&str>,
    rng: &mut R,
) -> Result<Narration, CoreError> {
    let mut state = AssignmentState::new();

    match narration.intro.as_mut() {
        Some(intro) => {
            let voice = match (intro.voice.clone(), intro_voice) {
                (Some(preset), _) => {
                    state.record_fixed(pool, &preset)?;
                    preset
                }
                (None, Some(fixed)) => {
                    state.record_fixed(pool, fixed)?;
                    fixed.to_string()
                }
                (None, None) => {
                    let upcoming = narration.comments.first().and_then(|c| c.voice.as_deref());
                    state.pick_next(pool, upcoming, rng)
                }
            };
            debug!("Intro voice: {}", voice);
            intro.voice = Some(voice);
        }
        None => {
            if let Some(fixed) = intro_voice {
                debug!("No intro segment; ignoring intro voice '{}'", fixed);
            }
        }
    }

    for i in 0..narration.comments.len() {
        if let Some(preset) = narration.comments[i].voice.clone() {
            state.record_fixed(pool, &preset)?;
            continue;
        }
        let upcoming = narration
            .comments
            .get(i + 1)
            .and_then(|next| next.voice.clone());
        let voice = state.pick_next(pool, upcoming.as_deref(), rng);
        debug!("Comment {} voice: {}", i, voice);
        narration.comments[i].voice = Some(voice);
    }

    Ok(narration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn comments(n: usize) -> Vec<Segment> {
        (0..n).map(|i| Segment::new(format!("comment {}", i))).collect()
    }

    fn voices_of(narration: &Narration) -> Vec<String> {
        narration
            .segments()
            .map(|s| s.voice.clone().expect("voice assigned"))
            .collect()
    }

    #[test]
    fn adjacent_segments_never_share_a_voice() {
        for pool_size in 2..6 {
            let pool = VoicePool::new((0..pool_size).map(|i| format!("v{}", i))).unwrap();
            for seed in 0..50 {
                let mut rng = StdRng::seed_from_u64(seed);
                let narration = Narration::new(Some(Segment::new("intro")), comments(12));
                let assigned = assign_voices(narration, &pool, None, &mut rng).unwrap();
                let voices = voices_of(&assigned);
                assert_eq!(voices.len(), 13);
                for pair in voices.windows(2) {
                    assert_ne!(pair[0], pair[1], "pool {} seed {}", pool_size, seed);
                }
            }
        }
    }

    #[test]
    fn single_voice_pool_reuses_the_voice() {
        let pool = VoicePool::new(["solo"]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let narration = Narration::new(Some(Segment::new("intro")), comments(4));
        let assigned = assign_voices(narration, &pool, None, &mut rng).unwrap();
        assert!(voices_of(&assigned).iter().all(|v| v == "solo"));
    }

    #[test]
    fn two_voices_alternate_deterministically_under_a_seed() {
        let pool = VoicePool::new(["a", "b"]).unwrap();
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let assigned = assign_voices(Narration::new(None, comments(5)), &pool, None, &mut rng)
                .unwrap();
            voices_of(&assigned)
        };
        let first = run(42);
        assert_eq!(first, run(42));
        assert_eq!(first.len(), 5);
        for pair in first.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn fixed_intro_voice_is_used_and_first_comment_differs() {
        let pool = VoicePool::new(["alloy", "echo", "nova"]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let narration = Narration::new(Some(Segment::new("intro")), comments(3));
        let assigned = assign_voices(narration, &pool, Some("echo"), &mut rng).unwrap();
        let voices = voices_of(&assigned);
        assert_eq!(voices[0], "echo");
        assert_ne!(voices[1], "echo");
    }

    #[test]
    fn unknown_intro_voice_is_a_configuration_error() {
        let pool = VoicePool::new(["a", "b"]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let narration = Narration::new(Some(Segment::new("intro")), comments(1));
        let err = assign_voices(narration, &pool, Some("zzz"), &mut rng).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn empty_pool_is_rejected() {
        let err = VoicePool::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn duplicate_voices_collapse() {
        let pool = VoicePool::new(["a", "b", "a"]).unwrap();
        assert_eq!(pool.voices(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn empty_narration_is_a_no_op() {
        let pool = VoicePool::new(["a", "b"]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let assigned = assign_voices(Narration::default(), &pool, None, &mut rng).unwrap();
        assert!(assigned.is_empty());
    }

    #[test]
    fn preset_voices_are_never_reassigned() {
        let pool = VoicePool::new(["a", "b", "c"]).unwrap();
        let mut segments = comments(4);
        segments[2] = Segment::new("fixed").with_voice("c");
        for seed in 0..30 {
            let mut rng = StdRng::seed_from_u64(seed);
            let assigned =
                assign_voices(Narration::new(None, segments.clone()), &pool, None, &mut rng)
                    .unwrap();
            let voices = voices_of(&assigned);
            assert_eq!(voices[2], "c");
            for pair in voices.windows(2) {
                assert_ne!(pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn random_intro_avoids_the_first_comments_preset_voice() {
        let pool = VoicePool::new(["a", "b"]).unwrap();
        let mut segments = comments(3);
        segments[0] = Segment::new("fixed").with_voice("a");
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let narration = Narration::new(Some(Segment::new("intro")), segments.clone());
            let voices = voices_of(&assign_voices(narration, &pool, None, &mut rng).unwrap());
            assert_eq!(voices[0], "b", "seed {}", seed);
            for pair in voices.windows(2) {
                assert_ne!(pair[0], pair[1], "seed {}", seed);
            }
        }
    }

    #[test]
    fn fixed_intro_equal_to_first_comment_is_rejected() {
        let pool = VoicePool::new(["a", "b", "c"]).unwrap();
        let mut segments = comments(2);
        segments[0] = Segment::new("fixed").with_voice("b");
        let mut rng = StdRng::seed_from_u64(5);

        let narration = Narration::new(Some(Segment::new("intro")), segments.clone());
        let err = assign_voices(narration, &pool, Some("b"), &mut rng).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));

        let narration = Narration::new(Some(Segment::new("intro").with_voice("b")), segments);
        let err = assign_voices(narration, &pool, None, &mut rng).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn preset_intro_next_to_preset_comment_is_kept() {
        let pool = VoicePool::new(["a", "b", "c"]).unwrap();
        let mut segments = comments(3);
        segments[0] = Segment::new("fixed").with_voice("c");
        let narration = Narration::new(Some(Segment::new("intro").with_voice("a")), segments);
        let mut rng = StdRng::seed_from_u64(9);
        let voices = voices_of(&assign_voices(narration, &pool, Some("b"), &mut rng).unwrap());
        assert_eq!(&voices[..2], ["a", "c"]);
        for pair in voices.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn equal_adjacent_preset_comments_are_rejected() {
        let pool = VoicePool::new(["a", "b"]).unwrap();
        let segments = vec![
            Segment::new("one").with_voice("a"),
            Segment::new("two").with_voice("a"),
        ];
        let mut rng = StdRng::seed_from_u64(2);
        let err = assign_voices(Narration::new(None, segments.clone()), &pool, None, &mut rng)
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));

        // with one voice there is nothing else to pick
        let solo = VoicePool::new(["a"]).unwrap();
        let assigned = assign_voices(Narration::new(None, segments), &solo, None, &mut rng).unwrap();
        assert_eq!(voices_of(&assigned), ["a", "a"]);
    }
}
