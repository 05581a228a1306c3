//! Text chunking with boundary-aware, exactly overlapping windows
//!
//! Each window ends at the strongest semantic boundary (paragraph, then
//! sentence, then word) in its last `overlap` characters, or is force-split
//! at `chunk_size` characters. The next window starts `overlap` characters
//! before the previous one ended, so consecutive chunks of a unit share
//! exactly `overlap` characters and every window advances by at least
//! `chunk_size - 2 * overlap`.

use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

use crate::types::{Chunk, TextUnit};

/// Boundary strength, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Boundary {
    Word,
    Sentence,
    Paragraph,
}

/// Text chunker with configurable size and overlap (both in characters)
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker. `overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    /// Chunk every unit, in order
    pub fn split(&self, units: &[Arc<TextUnit>]) -> Vec<Chunk> {
        units.iter().flat_map(|unit| self.split_unit(unit)).collect()
    }

    /// Chunk a single unit; sequence indices restart at zero per unit
    pub fn split_unit(&self, unit: &Arc<TextUnit>) -> Vec<Chunk> {
        if unit.is_empty() {
            return Vec::new();
        }

        self.windows(&unit.content)
            .into_iter()
            .enumerate()
            .map(|(i, (char_start, text))| Chunk {
                char_count: text.chars().count(),
                text,
                char_start,
                parent: Arc::clone(unit),
                sequence_index: i as u32,
            })
            .collect()
    }

    /// Split text into `(char_start, text)` windows
    fn windows(&self, text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if len == 0 {
            return Vec::new();
        }
        if len <= self.chunk_size {
            return vec![(0, text.to_string())];
        }

        let boundaries = Self::boundaries(text, &chars);
        let mut windows = Vec::new();
        let mut start = 0usize;

        loop {
            if len - start <= self.chunk_size {
                windows.push((start, chars[start..].iter().collect()));
                break;
            }

            // Only boundaries near the full size count, so a short heading
            // cannot leave the next window almost where this one started
            let hi = start + self.chunk_size;
            let lo = (hi - self.overlap).max(start + self.overlap + 1);
            let end = Self::best_boundary(&boundaries, lo, hi).unwrap_or(hi);

            windows.push((start, chars[start..end].iter().collect()));
            start = end - self.overlap;
        }

        windows
    }

    /// Last position of the strongest boundary kind within `lo..=hi`
    fn best_boundary(boundaries: &[(usize, Boundary)], lo: usize, hi: usize) -> Option<usize> {
        let first = boundaries.partition_point(|(pos, _)| *pos < lo);
        let last = boundaries.partition_point(|(pos, _)| *pos <= hi);
        let candidates = &boundaries[first..last];

        let strongest = candidates.iter().map(|(_, kind)| *kind).max()?;
        candidates
            .iter()
            .rev()
            .find(|(_, kind)| *kind == strongest)
            .map(|(pos, _)| *pos)
    }

    /// Character positions where a piece may end, sorted, strongest kind per position
    fn boundaries(text: &str, chars: &[char]) -> Vec<(usize, Boundary)> {
        let mut kinds: Vec<Option<Boundary>> = vec![None; chars.len() + 1];
        let mut mark = |pos: usize, kind: Boundary| {
            if pos == 0 || pos >= chars.len() {
                return;
            }
            if kinds[pos].map_or(true, |existing| existing < kind) {
                kinds[pos] = Some(kind);
            }
        };

        for i in 1..chars.len() {
            if chars[i - 1].is_whitespace() && !chars[i].is_whitespace() {
                mark(i, Boundary::Word);
            }
        }

        let mut pos = 0usize;
        for sentence in text.split_sentence_bounds() {
            mark(pos, Boundary::Sentence);
            pos += sentence.chars().count();
        }

        // Split after a blank line, not inside the run of newlines
        for i in 2..chars.len() {
            if chars[i - 2] == '\n' && chars[i - 1] == '\n' && chars[i] != '\n' {
                mark(i, Boundary::Paragraph);
            }
        }

        kinds
            .into_iter()
            .enumerate()
            .filter_map(|(pos, kind)| kind.map(|k| (pos, k)))
            .collect()
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(500, 100)
    }
}
