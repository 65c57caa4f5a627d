//! Splitting outbound text into Telegram's 4096-character message limit.
//!
//! Replies are plain strings (no markdown, no HTML — router contract forbids
//! markup injection), so this only needs to pick good split points; there is
//! no tag balancing to do.

/// Telegram maximum message length, in bytes.
pub const TELEGRAM_MSG_LIMIT: usize = 4096;

/// Split `text` into `<= TELEGRAM_MSG_LIMIT`-byte chunks, preferring to break
/// at a paragraph boundary, then a newline, then a space, falling back to a
/// hard split only when none of those exist within range.
pub fn chunk_message(text: &str) -> Vec<String> {
    if text.len() <= TELEGRAM_MSG_LIMIT {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= TELEGRAM_MSG_LIMIT {
            chunks.push(remaining.to_string());
            break;
        }

        let slice_len = floor_char_boundary(remaining, TELEGRAM_MSG_LIMIT);
        let split_at = find_split_point(&remaining[..slice_len]);
        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start_matches('\n');
    }

    chunks
}

/// Round `idx` down to the nearest valid UTF-8 character boundary in `s`.
pub(crate) fn floor_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut i = idx;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Find the best byte offset at which to split `slice` (<= slice.len()).
/// Priority: `\n\n` > `\n` > ` ` > hard split.
fn find_split_point(slice: &str) -> usize {
    if let Some(pos) = slice.rfind("\n\n") {
        return pos + 2;
    }
    if let Some(pos) = slice.rfind('\n') {
        return pos + 1;
    }
    if let Some(pos) = slice.rfind(' ') {
        return pos + 1;
    }
    slice.len()
}
