//! Fragment path normalization

/// Path used when a fragment is submitted without one.
pub const DEFAULT_FRAGMENT_PATH: &str = "spec.cue";

/// Normalize a fragment path into its storage key.
///
/// Backslashes are treated as separators, empty, `.` and `..` segments are
/// dropped, and the result never starts with `/`. An empty result becomes
/// [`DEFAULT_FRAGMENT_PATH`].
pub fn normalize_fragment_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect();

    if segments.is_empty() {
        DEFAULT_FRAGMENT_PATH.to_string()
    } else {
        segments.join("/")
    }
}
