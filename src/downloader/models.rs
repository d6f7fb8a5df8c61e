// Common data models for the download engine

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Stream classification of a rendition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatKind {
    /// Carries a video stream (possibly video-only, merged with best audio
    /// at download time)
    Video,
    /// Audio-only rendition
    Audio,
}

/// One downloadable rendition offered to the requester
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatCandidate {
    /// Opaque format id assigned by yt-dlp
    pub id: String,
    pub kind: FormatKind,
    /// Ordering key only: vertical resolution for video, bitrate for audio
    pub quality_rank: u64,
    /// Human string, e.g. "1080p" or "128kbps"
    pub display_quality: String,
    /// Byte count, 0 when the source does not report one
    pub size_estimate: u64,
    /// Target file extension
    pub container_ext: String,
}

impl FormatCandidate {
    /// Human-readable size, e.g. "150 MB" or "1.2 GB"
    pub fn display_size(&self) -> Option<String> {
        if self.size_estimate == 0 {
            return None;
        }
        let mb = self.size_estimate as f64 / 1_048_576.0;
        if mb >= 1024.0 {
            Some(format!("{:.1} GB", mb / 1024.0))
        } else {
            Some(format!("{:.0} MB", mb))
        }
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Downloading,
    Completed,
    Failed,
}

/// Events delivered asynchronously to the owner of a download
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DownloadEvent {
    Progress { percent: f32 },
    Complete { filename: String },
    Error { message: String },
}

/// One in-flight download's tracked state. Owned exclusively by the
/// registry; monitoring loops hold only the session id.
#[derive(Debug, Clone)]
pub struct DownloadSession {
    pub id: String,
    /// Channel back to the requester that started the download
    pub owner: mpsc::UnboundedSender<DownloadEvent>,
    pub status: SessionStatus,
    /// 0-100
    pub progress: u8,
    pub url: String,
    pub format_id: String,
    pub target_dir: PathBuf,
}

/// Inputs for one download start
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub format_id: String,
    pub target_dir: PathBuf,
}

impl DownloadRequest {
    /// Request targeting the default scratch directory
    pub fn new(url: impl Into<String>, format_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format_id: format_id.into(),
            target_dir: default_target_dir(),
        }
    }

    pub fn with_target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = dir.into();
        self
    }
}

/// Default scratch directory for completed files
pub fn default_target_dir() -> PathBuf {
    dirs::download_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ytgrab")
}
