#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::config::ConfigError;

/// Window sizes for splitting documents, counted in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn chunks<'a>(&self, text: &'a str) -> Result<Chunks<'a>> {
        chunk(text, self.chunk_size, self.chunk_overlap)
    }
}

/// Split `text` into windows of `size` characters sharing `overlap` characters.
///
/// The last window may be shorter. Empty text yields nothing. Dropping the
/// first `overlap` characters of every window after the first and concatenating
/// gives back the original text.
///
/// # Errors
/// Fails when `overlap >= size`.
#[inline]
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<Chunks<'_>> {
    if overlap >= size {
        return Err(ConfigError::OverlapTooLarge(overlap, size).into());
    }
    Ok(Chunks {
        text,
        start: 0,
        size,
        step: size - overlap,
        done: text.is_empty(),
    })
}

/// Lazy iterator over character windows; see [`chunk`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    start: usize,
    size: usize,
    step: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }
        let rest = &self.text[self.start..];
        let end = byte_offset(rest, self.size);
        let window = &rest[..end];

        if end == rest.len() {
            self.done = true;
        } else {
            self.start += byte_offset(rest, self.step);
        }
        Some(window)
    }
}

/// Byte offset of the `chars`-th character, or the full length if there are fewer.
fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map_or(text.len(), |(offset, _)| offset)
}
