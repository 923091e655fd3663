//! Sliding-window text chunker.
//!
//! Splits extracted text into overlapping windows of at most `max_size`
//! characters. Each window starts `max_size - overlap` characters after the
//! previous one, so consecutive chunks share exactly `overlap` characters.
//! Sizes are measured in Unicode scalar values, never bytes, so a window
//! never splits a multi-byte character.
//!
//! # Algorithm
//!
//! 1. Empty text yields no chunks.
//! 2. Emit the window `[start, start + max_size)`, clamped to the text end.
//! 3. If the window reached the end of the text, stop.
//! 4. Otherwise advance `start` by `step = max_size - overlap` and repeat.
//!
//! For non-empty text of `n` characters this produces
//! `1 + ceil(max(0, n - max_size) / step)` chunks. Dropping the first
//! `overlap` characters of every chunk after the first and concatenating
//! the rest reconstructs the input exactly.
//!
//! # Example
//!
//! ```rust
//! use workspace_rag_core::chunk::{ChunkParams, TextWindows};
//!
//! let params = ChunkParams::new(4, 1).unwrap();
//! let windows: Vec<_> = TextWindows::new("abcdefghij", params).map(|w| w.text).collect();
//! assert_eq!(windows, vec!["abcd", "defg", "ghij"]);
//! ```

use sha2::{Digest, Sha256};

use crate::error::IngestError;

/// Approximate characters-per-token ratio, used when sizes are configured
/// in tokens.
pub const CHARS_PER_TOKEN: usize = 4;

/// Window size and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    max_size: usize,
    overlap: usize,
}

impl ChunkParams {
    /// Requires `max_size > 0` and `overlap < max_size`.
    pub fn new(max_size: usize, overlap: usize) -> Result<Self, IngestError> {
        if max_size == 0 {
            return Err(IngestError::InvalidChunkParams(
                "max_size must be > 0".to_string(),
            ));
        }
        if overlap >= max_size {
            return Err(IngestError::InvalidChunkParams(format!(
                "overlap ({}) must be smaller than max_size ({})",
                overlap, max_size
            )));
        }
        Ok(Self { max_size, overlap })
    }

    /// Build parameters from token counts using [`CHARS_PER_TOKEN`].
    pub fn from_tokens(max_tokens: usize, overlap_tokens: usize) -> Result<Self, IngestError> {
        Self::new(
            max_tokens.saturating_mul(CHARS_PER_TOKEN),
            overlap_tokens.saturating_mul(CHARS_PER_TOKEN),
        )
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between the starts of consecutive windows.
    pub fn step(&self) -> usize {
        self.max_size - self.overlap
    }
}

/// One window of the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextWindow<'a> {
    pub index: usize,
    /// Character offset of the first character.
    pub char_start: usize,
    /// Character offset one past the last character.
    pub char_end: usize,
    pub text: &'a str,
}

impl TextWindow<'_> {
    /// Length in characters.
    pub fn len(&self) -> usize {
        self.char_end - self.char_start
    }

    pub fn is_empty(&self) -> bool {
        self.char_start == self.char_end
    }

    /// SHA-256 of the window text, hex encoded.
    pub fn hash(&self) -> String {
        hash_text(self.text)
    }
}

/// Iterator over the windows of a text.
///
/// Borrowing and cheap to clone: cloning the iterator (or calling
/// [`TextWindows::new`] again) restarts the sequence from any point.
#[derive(Debug, Clone)]
pub struct TextWindows<'a> {
    text: &'a str,
    params: ChunkParams,
    /// Byte offset of the next window's start.
    byte_pos: usize,
    /// Character offset of the next window's start.
    char_pos: usize,
    index: usize,
    done: bool,
}

impl<'a> TextWindows<'a> {
    pub fn new(text: &'a str, params: ChunkParams) -> Self {
        Self {
            text,
            params,
            byte_pos: 0,
            char_pos: 0,
            index: 0,
            done: text.is_empty(),
        }
    }
}

impl<'a> Iterator for TextWindows<'a> {
    type Item = TextWindow<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let rest = &self.text[self.byte_pos..];
        let (end_byte, window_chars) = advance(rest, self.params.max_size);
        let window = TextWindow {
            index: self.index,
            char_start: self.char_pos,
            char_end: self.char_pos + window_chars,
            text: &rest[..end_byte],
        };

        if end_byte == rest.len() {
            self.done = true;
        } else {
            let (step_bytes, step_chars) = advance(rest, self.params.step());
            self.byte_pos += step_bytes;
            self.char_pos += step_chars;
            self.index += 1;
        }

        Some(window)
    }
}

/// Byte offset and character count after moving up to `chars` characters
/// into `s`.
fn advance(s: &str, chars: usize) -> (usize, usize) {
    match s.char_indices().nth(chars) {
        Some((byte, _)) => (byte, chars),
        None => (s.len(), s.chars().count()),
    }
}

/// Collect all windows of `text`.
pub fn chunk_text(text: &str, params: ChunkParams) -> Vec<TextWindow<'_>> {
    TextWindows::new(text, params).collect()
}

/// Expected number of windows for a text of `len` characters.
pub fn expected_chunk_count(len: usize, params: ChunkParams) -> usize {
    if len == 0 {
        return 0;
    }
    let beyond = len.saturating_sub(params.max_size);
    1 + beyond.div_ceil(params.step())
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(windows: &[TextWindow<'_>], overlap: usize) -> String {
        let mut out = String::new();
        for (i, w) in windows.iter().enumerate() {
            if i == 0 {
                out.push_str(w.text);
            } else {
                out.extend(w.text.chars().skip(overlap));
            }
        }
        out
    }

    fn sample_text(len: usize) -> String {
        "The quick brown fox jumps over the lazy dog. "
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        let params = ChunkParams::new(300, 50).unwrap();
        assert!(chunk_text("", params).is_empty());
        assert_eq!(expected_chunk_count(0, params), 0);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let params = ChunkParams::new(300, 50).unwrap();
        let chunks = chunk_text("Hello, world!", params);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].char_end, 13);
    }

    #[test]
    fn test_thousand_chars_300_50() {
        let text = sample_text(1000);
        let params = ChunkParams::new(300, 50).unwrap();
        let chunks = chunk_text(&text, params);

        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![300, 300, 300, 250]);
        let starts: Vec<usize> = chunks.iter().map(|c| c.char_start).collect();
        assert_eq!(starts, vec![0, 250, 500, 750]);
        assert_eq!(reassemble(&chunks, 50), text);
    }

    #[test]
    fn test_exact_fit_has_no_trailing_overlap_chunk() {
        let params = ChunkParams::new(10, 2).unwrap();
        let chunks = chunk_text("0123456789", params);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_count_and_bounds_across_parameters() {
        for len in [1usize, 7, 49, 50, 51, 299, 300, 301, 1000, 1234] {
            for (max, overlap) in [(50usize, 0usize), (50, 10), (50, 49), (300, 50), (7, 3)] {
                let text = sample_text(len);
                let params = ChunkParams::new(max, overlap).unwrap();
                let chunks = chunk_text(&text, params);

                assert_eq!(chunks.len(), expected_chunk_count(len, params));
                // ceil(len / step) is only a ±1 estimate while overlap <= step.
                let approx = len.div_ceil(params.step()) as i64;
                assert!(
                    overlap > params.step() || (chunks.len() as i64 - approx).abs() <= 1,
                    "len={} max={} overlap={} chunks={} approx={}",
                    len,
                    max,
                    overlap,
                    chunks.len(),
                    approx
                );
                for c in &chunks {
                    assert!(c.len() <= max);
                    assert!(!c.is_empty());
                }
                assert_eq!(reassemble(&chunks, overlap), text);
            }
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Héllo wörld 日本語 │\n└──────────────────┘";
        let params = ChunkParams::new(7, 2).unwrap();
        let chunks = chunk_text(text, params);
        for c in &chunks {
            assert!(c.text.chars().count() <= 7);
            assert_eq!(c.text.chars().count(), c.len());
        }
        assert_eq!(reassemble(&chunks, 2), text);
    }

    #[test]
    fn test_indices_contiguous() {
        let text = sample_text(5000);
        let chunks = chunk_text(&text, ChunkParams::new(128, 16).unwrap());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_restartable() {
        let text = sample_text(777);
        let windows = TextWindows::new(&text, ChunkParams::new(100, 20).unwrap());
        let mut first_pass = windows.clone();
        first_pass.next();
        first_pass.next();
        let resumed: Vec<_> = first_pass.clone().collect();
        let full: Vec<_> = windows.collect();
        assert_eq!(&full[2..], resumed.as_slice());
    }

    #[test]
    fn test_deterministic_hashes() {
        let text = sample_text(900);
        let params = ChunkParams::new(200, 40).unwrap();
        let a = chunk_text(&text, params);
        let b = chunk_text(&text, params);
        assert_eq!(a, b);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.hash(), y.hash());
        }
    }

    #[test]
    fn test_invalid_params() {
        assert!(ChunkParams::new(0, 0).is_err());
        assert!(ChunkParams::new(10, 10).is_err());
        assert!(ChunkParams::new(10, 11).is_err());
        assert!(ChunkParams::new(10, 9).is_ok());
    }

    #[test]
    fn test_from_tokens_uses_chars_per_token() {
        let params = ChunkParams::from_tokens(700, 80).unwrap();
        assert_eq!(params.max_size(), 2800);
        assert_eq!(params.overlap(), 320);
        assert_eq!(params.step(), 2480);
    }
}
