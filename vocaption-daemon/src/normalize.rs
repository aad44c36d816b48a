//! Transcript text normalization
//!
//! Applied to every transcript event before it reaches any sink: recognition
//! engines tend to emit stray spaces around punctuation ("hello , world") and
//! uneven whitespace between revisions of a partial.

/// Normalize whitespace and punctuation spacing.
///
/// - trims leading/trailing whitespace
/// - collapses whitespace runs to a single space
/// - removes whitespace before `, . ; : ? !` and closing brackets
/// - removes whitespace after opening brackets
///
/// No casing or spelling changes. Idempotent.
pub fn normalize(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            // Collapse runs; drop the space entirely at the start of the
            // string and right after an opening bracket.
            pending_space = !result.is_empty()
                && !matches!(result.chars().last(), Some('(' | '[' | '{'));
            continue;
        }

        if pending_space {
            // Punctuation and closing brackets attach to the previous word.
            if !matches!(ch, ',' | '.' | ';' | ':' | '?' | '!' | ')' | ']' | '}') {
                result.push(' ');
            }
            pending_space = false;
        }

        result.push(ch);
    }

    result
}
