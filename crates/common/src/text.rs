//! Text helpers shared by run-outcome recording and LLM I/O tracing.

/// Truncate `input` to at most `max_chars` characters, appending a marker
/// with the original length when anything was cut.
///
/// Always cuts on a `char` boundary, so multi-byte text never panics.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    let total = input.chars().count();
    if total <= max_chars {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max_chars).collect();
    out.push_str(&format!("… [truncated, {total} chars total]"));
    out
}

/// Cut `input` to at most `max_chars` characters, with no marker.
///
/// For values stored in bounded columns, like a run's error text.
pub fn clip_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => input[..idx].to_string(),
        None => input.to_string(),
    }
}
