pub mod downloader;

pub use downloader::{
    DownloadError, DownloadEvent, DownloadRequest, DownloadSession, FormatCandidate, FormatKind,
    Orchestrator, ProgressSignal, SessionRegistry, SessionStatus, ToolHandle,
};
