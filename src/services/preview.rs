//! Blurred transcript previews shown before sign-up.

/// Share of the excerpt window after which a sentence end is a good cut.
const SENTENCE_CUT_RATIO: (usize, usize) = (7, 10);

const READING_WORDS_PER_MINUTE: u32 = 200;

/// Excerpt of `text` of at most `min(max_chars, chars / 2)` characters.
///
/// Prefers to end on a sentence, then on a word boundary followed by `...`.
/// Returns an empty string when the window is too small to say anything, so a
/// non-empty transcript is never revealed in full.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.trim().chars().collect();
    let cap = max_chars.min(chars.len() / 2);
    if cap < 4 {
        return String::new();
    }

    let window = &chars[..cap];
    if let Some(dot) = window.iter().rposition(|&c| c == '.') {
        let (num, den) = SENTENCE_CUT_RATIO;
        if dot * den > cap * num {
            return window[..=dot].iter().collect();
        }
    }

    let head = &chars[..cap - 3];
    let cut = match head.iter().rposition(|c| c.is_whitespace()) {
        Some(space) if space > 0 => &head[..space],
        _ => head,
    };
    let mut out: String = cut.iter().collect();
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out.push_str("...");
    out
}

/// Minutes needed to read `words` words, rounded up.
pub fn reading_time_minutes(words: u32) -> u32 {
    if words == 0 {
        0
    } else {
        words.div_ceil(READING_WORDS_PER_MINUTE)
    }
}

/// Sign-up prompt shown under the preview.
pub fn conversion_message(duration_minutes: f64, words: u32) -> String {
    let minutes = duration_minutes.round().max(1.0) as u64;
    format!(
        "Your {}-minute audio has been transcribed into {} words. Sign up free to view the complete transcription and unlock powerful repurposing features!",
        minutes, words
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSCRIPT: &str = "Welcome back to the show. Today we are talking about compounding \
        habits and why small changes matter. Our guest has spent a decade studying this. \
        We start with mornings and how routines shape the rest of the day for most people.";

    #[test]
    fn test_excerpt_is_bounded() {
        for n in [0, 3, 10, 50, 150, 1_000] {
            let preview = excerpt(TRANSCRIPT, n);
            let cap = n.min(TRANSCRIPT.chars().count() / 2);
            assert!(preview.chars().count() <= cap, "n={n}: {preview}");
            assert_ne!(preview, TRANSCRIPT);
        }
    }

    #[test]
    fn test_excerpt_prefers_sentence_end() {
        let preview = excerpt(TRANSCRIPT, 150);
        assert!(preview.ends_with('.'), "{preview}");
        assert!(TRANSCRIPT.starts_with(&preview));
    }

    #[test]
    fn test_excerpt_falls_back_to_word_boundary() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let preview = excerpt(text, 20);
        assert_eq!(preview, "alpha beta gamma...");
        assert!(preview.chars().count() <= 20);
    }

    #[test]
    fn test_excerpt_without_spaces() {
        let text = "a".repeat(100);
        let preview = excerpt(&text, 20);
        assert_eq!(preview, format!("{}...", "a".repeat(17)));
    }

    #[test]
    fn test_short_texts_reveal_nothing() {
        assert_eq!(excerpt("", 150), "");
        assert_eq!(excerpt("Hi.", 150), "");
        assert_eq!(excerpt("Yes, ok", 150), "");
    }

    #[test]
    fn test_multibyte_text() {
        let text = "Größere Änderungen brauchen Zeit und Geduld für alle Beteiligten hier.";
        let preview = excerpt(text, 30);
        assert!(preview.chars().count() <= 30);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_messages() {
        assert_eq!(reading_time_minutes(0), 0);
        assert_eq!(reading_time_minutes(201), 2);
        assert!(conversion_message(2.4, 350)
            .starts_with("Your 2-minute audio has been transcribed into 350 words."));
        assert!(conversion_message(0.2, 5).starts_with("Your 1-minute audio"));
    }
}
