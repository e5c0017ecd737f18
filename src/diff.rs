//! Unified diff between the baseline and the latest capture.

use similar::TextDiff;

const CONTEXT_LINES: usize = 3;
const OLD_HEADER: &str = "previous";
const NEW_HEADER: &str = "current";

/// Why a diff could not be produced.
#[derive(Debug)]
pub enum DiffError {
    /// One side is not valid UTF-8 and cannot be split into text lines.
    NotText {
        side: &'static str,
        source: std::str::Utf8Error,
    },
}

impl std::fmt::Display for DiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffError::NotText { side, source } => {
                write!(f, "{} output is not valid UTF-8: {}", side, source)
            }
        }
    }
}

impl std::error::Error for DiffError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiffError::NotText { source, .. } => Some(source),
        }
    }
}

/// Line-based unified diff from `previous` to `current`.
///
/// Missing trailing newlines are marked with `\ No newline at end of file`
/// so the diff applies back onto `previous` exactly.
pub fn unified_diff(previous: &[u8], current: &[u8]) -> Result<String, DiffError> {
    let old = std::str::from_utf8(previous).map_err(|e| DiffError::NotText {
        side: OLD_HEADER,
        source: e,
    })?;
    let new = std::str::from_utf8(current).map_err(|e| DiffError::NotText {
        side: NEW_HEADER,
        source: e,
    })?;

    Ok(TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .missing_newline_hint(true)
        .header(OLD_HEADER, NEW_HEADER)
        .to_string())
}
