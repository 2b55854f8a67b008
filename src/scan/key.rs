/// Derive the order key from a scanned code: the last `/`-separated segment.
///
/// `https://trackit.app/order/abc123` => `abc123`. Surrounding whitespace is
/// ignored and a code without slashes is its own key. A trailing slash leaves
/// an empty final segment, so the result is empty.
pub fn submission_key(code: &str) -> &str {
    let trimmed = code.trim();

    match trimmed.rsplit_once('/') {
        Some((_, last)) => last.trim(),
        None => trimmed,
    }
}
