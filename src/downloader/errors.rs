// Error types for the download engine
//
// Display produces the fixed caller-facing message for each class; the
// underlying detail stays in the variant payload and goes to the log only.

use std::fmt;

#[derive(Debug, Clone)]
pub enum DownloadError {
    /// Format discovery failed or returned unparseable data
    Discovery(String),

    /// yt-dlp cannot be executed at all; retrying will not help
    ToolMissing,

    /// The download child process could not be started
    Spawn(String),

    /// The download child exited non-zero
    ChildExit(i32),

    /// Completion reached but no destination filename could be determined
    OutputAmbiguity,

    /// Unknown error with details
    Unknown(String),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery(_) => write!(f, "Could not fetch available formats"),
            Self::ToolMissing => write!(f, "yt-dlp is not installed. Please install it first."),
            Self::Spawn(_) => write!(f, "Download failed, please retry"),
            Self::ChildExit(status) => write!(f, "Download failed with status {}", status),
            Self::OutputAmbiguity => write!(f, "Could not determine downloaded file"),
            Self::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for DownloadError {}

// Classify raw tool output into an error class
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        if s.contains("not found") || s.contains("No such file") || s.contains("command not found")
        {
            return Self::ToolMissing;
        }

        if s.contains("JSON") || s.contains("parse") {
            return Self::Discovery(s);
        }

        Self::Unknown(s)
    }
}

impl DownloadError {
    /// Diagnostic detail for the log stream; never shown to callers
    pub fn detail(&self) -> &str {
        match self {
            Self::Discovery(d) | Self::Spawn(d) | Self::Unknown(d) => d.as_str(),
            Self::ToolMissing => "yt-dlp binary not executable",
            Self::ChildExit(_) => "child process exited non-zero",
            Self::OutputAmbiguity => "no destination announced and no file found",
        }
    }
}
