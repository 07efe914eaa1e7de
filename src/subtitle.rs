use crate::timeline::Cue;
use regex::Regex;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

const COMMA_PAUSE: f64 = 0.2;
const SENTENCE_END_PAUSE: f64 = 0.4;
const WORD_WEIGHT_ALPHA: f64 = 0.75;
const LINE_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SubtitleMode {
    /// One subtitle per segment, visible for the whole segment.
    #[default]
    Segment,
    /// One subtitle per word, paced across the segment.
    Words,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SrtEntry {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

pub fn build_srt_entries(cues: &[Cue], mode: SubtitleMode) -> Vec<SrtEntry> {
    match mode {
        SubtitleMode::Segment => cues
            .iter()
            .filter(|cue| !cue.text.trim().is_empty())
            .map(|cue| SrtEntry {
                start: cue.span.start,
                end: cue.span.end(),
                text: cue.text.trim().to_string(),
            })
            .collect(),
        SubtitleMode::Words => cues.iter().flat_map(pace_words).collect(),
    }
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w[\w'-]*)|([,.!?。、！？])").expect("valid word regex"))
}

fn pause_for(element: &str) -> Option<f64> {
    match element {
        "," | "、" => Some(COMMA_PAUSE),
        "." | "!" | "?" | "。" | "！" | "？" => Some(SENTENCE_END_PAUSE),
        _ => None,
    }
}

/// Spreads a cue's span over its words, longer words getting more time and
/// punctuation inserting short pauses. Entries never leave the cue's span.
fn pace_words(cue: &Cue) -> Vec<SrtEntry> {
    let start = cue.span.start;
    let end = cue.span.end();
    let elements: Vec<&str> = word_regex()
        .find_iter(&cue.text)
        .map(|m| m.as_str())
        .collect();
    let words: Vec<&str> = elements
        .iter()
        .copied()
        .filter(|e| pause_for(e).is_none())
        .collect();

    if words.is_empty() {
        if cue.text.trim().is_empty() {
            return Vec::new();
        }
        return vec![SrtEntry {
            start,
            end,
            text: cue.text.trim().to_string(),
        }];
    }

    let total_pause: f64 = elements.iter().filter_map(|e| pause_for(e)).sum();
    // Pauses may not eat more than half of a short segment.
    let pause_scale = if total_pause > cue.span.duration / 2.0 && total_pause > 0.0 {
        cue.span.duration / 2.0 / total_pause
    } else {
        1.0
    };
    let word_time = (cue.span.duration - total_pause * pause_scale).max(0.0);
    let total_weight: f64 = words
        .iter()
        .map(|w| (w.chars().count() as f64).powf(WORD_WEIGHT_ALPHA))
        .sum();

    let mut entries = Vec::with_capacity(words.len());
    let mut cursor = start;
    for element in elements {
        if let Some(pause) = pause_for(element) {
            cursor += pause * pause_scale;
            continue;
        }
        let weight = (element.chars().count() as f64).powf(WORD_WEIGHT_ALPHA);
        let duration = if total_weight > 0.0 {
            word_time * weight / total_weight
        } else {
            0.0
        };
        let word_end = (cursor + duration).min(end);
        entries.push(SrtEntry {
            start: cursor.min(end),
            end: word_end,
            text: element.to_string(),
        });
        cursor = word_end;
    }
    entries
}

pub fn write_srt(path: &Path, entries: &[SrtEntry]) -> anyhow::Result<()> {
    let mut f = File::create(path)?;
    for (i, entry) in entries.iter().enumerate() {
        writeln!(f, "{}", i + 1)?;
        writeln!(
            f,
            "{} --> {}",
            format_srt_time(entry.start),
            format_srt_time(entry.end)
        )?;
        for line in wrap_text(&entry.text, LINE_WIDTH) {
            writeln!(f, "{}", line)?;
        }
        writeln!(f)?;
    }
    Ok(())
}

fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// Wraps on whitespace; text without spaces (Japanese, for one) is wrapped
/// by character count instead.
fn wrap_text(s: &str, width: usize) -> Vec<String> {
    if !s.contains(char::is_whitespace) {
        let chars: Vec<char> = s.chars().collect();
        let width = (width / 2).max(1);
        return chars
            .chunks(width)
            .map(|chunk| chunk.iter().collect())
            .collect();
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in s.split_whitespace() {
        if current.len() + word.len() + 1 > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
