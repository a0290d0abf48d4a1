//! Newest-tail truncation shared by the scratchpad, review-diff, and
//! queued-follow-up caps (testable property §8.8).

/// Return `prefix + text` truncated to at most `cap` bytes, keeping the
/// *most recent* content: if the combined length already fits, it is
/// returned unchanged; otherwise the result is exactly the last `cap` bytes
/// of the concatenation, still preceded by as much of `prefix` as fits.
///
/// Truncation is byte-based but snaps to the nearest preceding UTF-8
/// character boundary so the result is always valid `str`.
pub fn truncate(prefix: &str, text: &str, cap: usize) -> String {
    let combined_len = prefix.len() + text.len();
    if combined_len <= cap {
        let mut out = String::with_capacity(combined_len);
        out.push_str(prefix);
        out.push_str(text);
        return out;
    }

    let mut combined = String::with_capacity(combined_len);
    combined.push_str(prefix);
    combined.push_str(text);

    let start = combined.len() - cap;
    let mut boundary = start;
    while boundary < combined.len() && !combined.is_char_boundary(boundary) {
        boundary += 1;
    }
    combined[boundary..].to_string()
}
