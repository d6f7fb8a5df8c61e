// Downloader module - yt-dlp orchestration engine

pub mod errors;
pub mod formats;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod tool;
pub mod utils;

pub use errors::DownloadError;
pub use models::{
    DownloadEvent, DownloadRequest, DownloadSession, FormatCandidate, FormatKind, SessionStatus,
};
pub use orchestrator::Orchestrator;
pub use progress::ProgressSignal;
pub use registry::SessionRegistry;
pub use tool::ToolHandle;
