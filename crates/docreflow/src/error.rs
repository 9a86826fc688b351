use std::fmt;

/// Errors that abort reconstruction of a single document or a single unit within it.
///
/// This enum covers the "structural violation" tier of the error taxonomy: corrupt
/// input that cannot be degraded around. Ordinary input anomalies (missing bboxes,
/// unknown producer strings, unmatched table continuations) are not represented here —
/// they are logged via `tracing::warn!` at the point of degradation and never surface
/// as an `Err`.
#[derive(Debug, Clone)]
pub enum DocError {
    /// A page reported zero width or height.
    EmptyPage { page: usize },
    /// A caption had no graphic of the matching kind within the normalizer's search window.
    DanglingCaption { page: usize, kind: &'static str, number: u32 },
    /// Grid inference produced fewer than one row or column.
    EmptyTableGrid { page: usize },
    /// `append_bottom`/`append_side` could not reconcile two tables' header skeletons.
    TableMergeFailed { reason: &'static str },
    /// The primitive provider returned metadata missing a required key.
    MissingMetadata { key: &'static str },
    /// A run configuration file failed validation or could not be parsed.
    Config { message: String },
    /// A filesystem operation (reading a PDF, writing rendered HTML) failed.
    Io { message: String },
}

impl fmt::Display for DocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocError::EmptyPage { page } => write!(f, "page {page} has zero width or height"),
            DocError::DanglingCaption { page, kind, number } => {
                write!(f, "page {page}: {kind} {number} caption has no matching graphic nearby")
            }
            DocError::EmptyTableGrid { page } => write!(f, "page {page}: table grid inference produced an empty grid"),
            DocError::TableMergeFailed { reason } => write!(f, "table merge failed: {reason}"),
            DocError::MissingMetadata { key } => write!(f, "primitive provider metadata missing required key '{key}'"),
            DocError::Config { message } => write!(f, "configuration error: {message}"),
            DocError::Io { message } => write!(f, "I/O error: {message}"),
        }
    }
}

impl std::error::Error for DocError {}

pub type Result<T> = std::result::Result<T, DocError>;
