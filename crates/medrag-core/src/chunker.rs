//! Recursive separator-aware text splitter.
//!
//! Lengths are measured in characters. The coarsest separator present in the
//! text is tried first; pieces that are still too long are split again with
//! the finer separators. Small neighbouring pieces are merged back up to
//! `chunk_size`, and each emitted chunk hands its last `chunk_overlap`
//! characters' worth of pieces on to the next one.

use std::collections::VecDeque;

use crate::error::{Error, Result};

/// Paragraph, line, sentence, word, character.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than a non-zero chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    /// Replace the separator priority list (coarsest first). Without a trailing
    /// `""` entry a single unbreakable unit may exceed `chunk_size`.
    #[must_use]
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        if text.trim().is_empty() {
            return out;
        }
        self.split_recursive(text, &self.separators, &mut out);
        out
    }

    fn split_recursive(&self, text: &str, separators: &[String], out: &mut Vec<String>) {
        let mut separator = separators.last().map_or("", String::as_str);
        let mut finer: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut fitting: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                self.merge(&fitting, out);
                fitting.clear();
            }
            if finer.is_empty() {
                push_trimmed(piece, out);
            } else {
                self.split_recursive(piece, finer, out);
            }
        }
        if !fitting.is_empty() {
            self.merge(&fitting, out);
        }
    }

    fn merge(&self, pieces: &[&str], out: &mut Vec<String>) {
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;
        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&window.iter().copied().collect::<String>(), out);
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        if !window.is_empty() {
            push_trimmed(&window.iter().copied().collect::<String>(), out);
        }
    }
}

/// Convenience wrapper over [`Chunker`] with the default separators.
pub fn split(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    Ok(Chunker::new(chunk_size, chunk_overlap)?.split(text))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_trimmed(s: &str, out: &mut Vec<String>) {
    let trimmed = s.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Split on `separator`, keeping it at the end of the preceding piece so
/// sentences keep their full stop. An empty separator yields characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, matched) in text.match_indices(separator) {
        let end = idx + matched.len();
        pieces.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn non_ws(s: &str) -> Vec<char> {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn is_subsequence(needle: &[char], haystack: &[char]) -> bool {
        let mut it = haystack.iter();
        needle.iter().all(|c| it.any(|h| h == c))
    }

    #[test]
    fn empty_input_yields_nothing() {
        let chunker = Chunker::new(100, 10).expect("chunker");
        assert!(chunker.split("").is_empty());
        assert!(chunker.split("   \n\n ").is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split("Keep the wound dry.", 100, 10).expect("split");
        assert_eq!(chunks, vec!["Keep the wound dry.".to_string()]);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = "First paragraph about wound care.\n\nSecond paragraph about diet.";
        let chunks = split(text, 40, 0).expect("split");
        assert_eq!(chunks, vec![
            "First paragraph about wound care.".to_string(),
            "Second paragraph about diet.".to_string(),
        ]);
    }

    #[test]
    fn adjacent_chunks_overlap() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = split(text, 20, 8).expect("split");
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split_whitespace().last().expect("word");
            assert!(pair[1].contains(last_word), "{:?} should overlap {:?}", pair[1], pair[0]);
        }
    }

    #[test]
    fn separator_stays_with_preceding_piece() {
        let chunks = split("Rest today. Walk tomorrow.", 15, 0).expect("split");
        assert_eq!(chunks, vec!["Rest today.".to_string(), "Walk tomorrow.".to_string()]);
        assert_eq!(split_keeping_separator("a. b. c", ". "), vec!["a. ", "b. ", "c"]);
    }

    #[test]
    fn trailing_short_content_is_kept() {
        let text = format!("{}\n\ntail", "a".repeat(30));
        let chunks = split(&text, 20, 0).expect("split");
        assert_eq!(chunks.last().map(String::as_str), Some("tail"));
    }

    #[test]
    fn long_word_falls_back_to_characters() {
        let chunks = split(&"x".repeat(45), 10, 0).expect("split");
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn without_char_separator_long_word_survives_whole() {
        let chunker = Chunker::new(10, 0).expect("chunker").with_separators(["\n\n", "\n", ". ", " "]);
        let word = "pneumonoultramicroscopic";
        let chunks = chunker.split(&format!("a {word} b"));
        assert!(chunks.iter().any(|c| c == word));
    }

    #[test]
    fn rejects_overlap_at_least_size() {
        assert!(matches!(Chunker::new(10, 10), Err(Error::InvalidConfig(_))));
        assert!(matches!(Chunker::new(0, 0), Err(Error::InvalidConfig(_))));
    }

    proptest! {
        #[test]
        fn no_content_lost_and_sizes_bounded(
            text in "[a-z .\n]{0,400}",
            size in 5usize..80,
            overlap_pct in 0usize..50,
        ) {
            let overlap = size * overlap_pct / 100;
            let chunks = split(&text, size, overlap).expect("split");
            for c in &chunks {
                prop_assert!(c.chars().count() <= size, "chunk {:?} exceeds {}", c, size);
            }
            let joined: Vec<char> = chunks.iter().flat_map(|c| non_ws(c)).collect();
            prop_assert!(is_subsequence(&non_ws(&text), &joined));
        }
    }
}
