use std::num::NonZeroUsize;

/// Splits `text` into consecutive segments of `max_len` chars; the last one
/// holds the remainder. Splits are positional and may fall mid-word, but never
/// inside a code point. Concatenating the result gives back `text`.
pub fn chunk(text: &str, max_len: NonZeroUsize) -> Vec<&str> {
    let max_len = max_len.get();
    let mut segments = Vec::with_capacity(text.len() / max_len + 1);
    let mut start = 0;
    let mut count = 0;
    for (offset, _) in text.char_indices() {
        if count == max_len {
            segments.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        segments.push(&text[start..]);
    }
    segments
}
