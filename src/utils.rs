use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const DEFAULT_MAX_INTRO_SECONDS: f64 = 25.0;
pub const DEFAULT_WORDS_PER_SECOND: f64 = 3.0;

const SENTENCE_END: &str = ".!?。．！？";

fn sentence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?s)([^{0}]+[{0}]+)|([^{0}]+$)",
            regex::escape(SENTENCE_END)
        ))
        .expect("valid sentence regex")
    })
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("valid url regex"))
}

/// Text units for the intro budget: words when the text is space separated,
/// characters otherwise.
fn units(text: &str) -> usize {
    if text.contains(char::is_whitespace) {
        text.split_whitespace().count()
    } else {
        text.chars().count()
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    sentence_regex()
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|s| !s.trim().is_empty())
        .collect()
}

/// Shortens an intro to roughly `max_seconds` of speech.
///
/// Whole sentences are kept while they fit; the result then ends in `...`.
/// If even the first sentence is too long it is cut at the budget.
pub fn shorten_intro(text: &str, max_seconds: f64, units_per_second: f64) -> String {
    let budget = (max_seconds * units_per_second).floor().max(0.0) as usize;
    let text = text.trim();
    if units(text) <= budget {
        return text.to_string();
    }

    let spaced = text.contains(char::is_whitespace);
    let mut kept = String::new();
    for sentence in split_sentences(text) {
        let candidate = if kept.is_empty() || !spaced {
            format!("{}{}", kept, sentence.trim())
        } else {
            format!("{} {}", kept, sentence.trim())
        };
        if units(&candidate) > budget {
            break;
        }
        kept = candidate;
    }

    if kept.is_empty() {
        warn!("First intro sentence exceeds {} units; cutting mid-sentence", budget);
        kept = if spaced {
            text.split_whitespace()
                .take(budget)
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            text.chars().take(budget).collect()
        };
    }
    debug!("Intro shortened to {} units", units(&kept));
    format!("{}...", kept.trim_end())
}

/// Normalises a comment for narration. Returns `None` for removed, deleted,
/// or effectively empty comments.
pub fn clean_comment(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() || body == "[deleted]" || body == "[removed]" {
        return None;
    }
    let without_quotes: Vec<&str> = body
        .lines()
        .filter(|line| !line.trim_start().starts_with('>'))
        .collect();
    let joined = without_quotes.join("\n");
    let without_urls = url_regex().replace_all(&joined, "");
    let cleaned = without_urls.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_intro_is_untouched() {
        assert_eq!(shorten_intro("  Hello world.  ", 25.0, 3.0), "Hello world.");
    }

    #[test]
    fn intro_keeps_whole_sentences() {
        let text = "One two three. Four five six. Seven eight nine.";
        assert_eq!(shorten_intro(text, 2.0, 3.0), "One two three. Four five six....");
    }

    #[test]
    fn overlong_first_sentence_is_cut() {
        let text = "This sentence just keeps going on and on without stopping";
        assert_eq!(shorten_intro(text, 1.0, 3.0), "This sentence just...");
    }

    #[test]
    fn unspaced_text_counts_characters() {
        let text = "今日は晴れ。明日は雨。明後日は雪。";
        assert_eq!(shorten_intro(text, 4.0, 3.0), "今日は晴れ。明日は雨。...");
    }

    #[test]
    fn comments_are_cleaned() {
        assert_eq!(clean_comment("[deleted]"), None);
        assert_eq!(clean_comment("   "), None);
        assert_eq!(clean_comment("> quoted\nhttps://example.com"), None);
        assert_eq!(
            clean_comment("> earlier text\nI agree,  see https://x.y/z \n totally."),
            Some("I agree, see totally.".to_string())
        );
    }
}
