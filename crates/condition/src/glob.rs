//! Single trailing `*` glob matching, no regex (§4.5).

/// Match `value` against `pattern`. A pattern ending in `*` matches any
/// value sharing its prefix; otherwise the match is exact.
#[must_use]
pub fn glob_match(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}
