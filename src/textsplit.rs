//! Abbreviation-aware sentence boundary detection, shared by the chunker
//! (spec §4.1 "must not split mid-sentence when possible") and the sentence
//! extractor (spec §4.5 "sentence boundary-aware" body-text splitting).
//!
//! The original implementation leans on spaCy; this crate has no NLP model
//! dependency, so boundaries are detected with a small abbreviation list and
//! punctuation/case heuristics instead. Good enough for the corpus of
//! contract/report prose this engine targets, not a general-purpose parser.

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "inc",
    "co", "corp", "ltd", "llc", "fig", "no", "e.g", "i.e", "u.s", "u.k",
    "a.m", "p.m", "vol", "pp", "approx",
];

/// Split text into sentence spans, preserving order. Never splits on a `.`
/// immediately preceded by a known abbreviation or a single capital letter
/// (an initial, e.g. "J. Smith").
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        if c == '.' || c == '!' || c == '?' {
            let boundary = is_sentence_boundary(&chars, i);
            if boundary {
                let sentence: String = chars[start..=i].iter().collect();
                let trimmed = sentence.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                // Skip whitespace to the next sentence's start.
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }

    if start < chars.len() {
        let tail: String = chars[start..].iter().collect();
        let trimmed = tail.trim();
        if !trimmed.is_empty() {
            sentences.push(trimmed.to_string());
        }
    }

    sentences
}

fn is_sentence_boundary(chars: &[char], dot_idx: usize) -> bool {
    // End of text always terminates.
    if dot_idx + 1 >= chars.len() {
        return true;
    }

    // Require whitespace (or closing quote/paren then whitespace) after the
    // punctuation; "3.14" or "a.b.c" mid-token never splits.
    let mut next = dot_idx + 1;
    while next < chars.len() && matches!(chars[next], '"' | '\'' | ')' | ']') {
        next += 1;
    }
    if next >= chars.len() {
        return true;
    }
    if !chars[next].is_whitespace() {
        return false;
    }

    // Skip the whitespace run to find what follows.
    let mut after = next;
    while after < chars.len() && chars[after].is_whitespace() {
        after += 1;
    }
    if after >= chars.len() {
        return true;
    }
    // Lowercase continuation (common after "e.g." style abbreviations) means
    // the sentence almost certainly continues.
    if chars[after].is_lowercase() {
        return false;
    }

    if chars[dot_idx] == '.' {
        let word = preceding_word(chars, dot_idx);
        if is_abbreviation(&word) {
            return false;
        }
        if word.chars().count() == 1 && word.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
            return false; // initial, e.g. "J."
        }
    }

    true
}

fn preceding_word(chars: &[char], dot_idx: usize) -> String {
    let mut start = dot_idx;
    while start > 0 && (chars[start - 1].is_alphanumeric() || chars[start - 1] == '.') {
        start -= 1;
    }
    chars[start..dot_idx].iter().collect()
}

fn is_abbreviation(word: &str) -> bool {
    let lower = word.to_lowercase();
    ABBREVIATIONS.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_simple_sentence_boundaries() {
        let sentences = split_sentences("The sky is blue. The grass is green.");
        assert_eq!(sentences, vec!["The sky is blue.", "The grass is green."]);
    }

    #[test]
    fn does_not_split_on_abbreviation() {
        let sentences = split_sentences("Fabrikam Construction Inc. shall provide a one-year warranty.");
        assert_eq!(sentences.len(), 1);
    }

    #[test]
    fn does_not_split_on_initial() {
        let sentences = split_sentences("Contact J. Smith for details. He will respond promptly.");
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn handles_trailing_text_without_terminator() {
        let sentences = split_sentences("First sentence. Second sentence without end");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[1], "Second sentence without end");
    }
}
