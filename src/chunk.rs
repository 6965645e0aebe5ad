//! Fixed-size overlapping text chunker.
//!
//! Splits cleaned note text into character-offset chunks of `size` characters
//! with `overlap` characters shared between neighbours. Boundaries may split
//! mid-word; callers needing word-safe boundaries post-process. Offsets are
//! counted in characters, not bytes, so multi-byte input never splits a
//! UTF-8 sequence.

/// Split text into overlapping chunks. Requires `size > overlap`.
///
/// Stride is `size - overlap`. A trailing remainder shorter than `overlap`
/// would be almost entirely repeated content and is dropped instead of being
/// emitted as a near-duplicate final chunk. Any non-empty input yields at
/// least one chunk; chunk order is emission order.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(size > overlap, "chunk size must exceed overlap");

    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let stride = size - overlap;

    let mut chunks = Vec::new();
    let mut offset = 0usize;

    while offset < len {
        let end = (offset + size).min(len);
        chunks.push(chars[offset..end].iter().collect());

        let next = offset + stride;
        if next >= len || len - next < overlap {
            break;
        }
        offset = next;
    }

    chunks
}
