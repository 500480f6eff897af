/// Terminal outcome definitions for processed tasks
///
/// Every task that reaches the processed set records why its fetch attempt
/// concluded. The outcome is informational; deduplication only looks at
/// membership in the processed set.
use std::fmt;

/// How a task's fetch attempt concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessedOutcome {
    // ===== Success =====
    /// Body was fetched and materialized on disk
    Stored,

    /// A finalized document already existed on disk, nothing was fetched
    AlreadyPresent,

    // ===== Terminal Rejections =====
    /// Server answered with a status outside [200, 300)
    BadStatus,

    /// Content-Type is not one of the allowed text types
    UnsupportedContentType,

    /// Connection failure or timeout
    NetworkError,
}

impl ProcessedOutcome {
    /// Returns true if a document for this task exists on disk
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Stored | Self::AlreadyPresent)
    }

    /// Returns true if the task ended without a document and will not be retried
    pub fn is_rejection(&self) -> bool {
        !self.is_success()
    }

    /// Converts the outcome to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::AlreadyPresent => "already_present",
            Self::BadStatus => "bad_status",
            Self::UnsupportedContentType => "unsupported_content_type",
            Self::NetworkError => "network_error",
        }
    }

    /// Parses an outcome from its database string representation
    ///
    /// Returns None if the string doesn't match any known outcome.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "stored" => Some(Self::Stored),
            "already_present" => Some(Self::AlreadyPresent),
            "bad_status" => Some(Self::BadStatus),
            "unsupported_content_type" => Some(Self::UnsupportedContentType),
            "network_error" => Some(Self::NetworkError),
            _ => None,
        }
    }

    /// Returns all possible outcomes
    pub fn all() -> [Self; 5] {
        [
            Self::Stored,
            Self::AlreadyPresent,
            Self::BadStatus,
            Self::UnsupportedContentType,
            Self::NetworkError,
        ]
    }
}

impl fmt::Display for ProcessedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
