// Download orchestrator - spawns one supervised yt-dlp child per download
// and drives a monitoring loop that turns its raw output into registry
// updates and owner events.
//
// Limitations carried over deliberately: there is no cancel-in-flight
// operation (external termination of the child shows up as an abnormal
// exit) and no stall timeout on the monitoring loop.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::errors::DownloadError;
use super::formats::resolve_formats;
use super::models::{
    DownloadEvent, DownloadRequest, DownloadSession, FormatCandidate, SessionStatus,
};
use super::progress::{parse_chunk, ProgressSignal};
use super::registry::SessionRegistry;
use super::tool::ToolHandle;
use super::utils::{most_recent_file, run_output_with_timeout, sanitize_title};

const TITLE_TIMEOUT_SECS: u64 = 30;

pub struct Orchestrator {
    tool: ToolHandle,
    registry: Arc<SessionRegistry>,
}

impl Orchestrator {
    pub fn new(tool: ToolHandle, registry: Arc<SessionRegistry>) -> Self {
        Self { tool, registry }
    }

    /// Orchestrator with a located yt-dlp binary and a fresh registry.
    pub fn with_defaults() -> Self {
        Self::new(ToolHandle::locate(), Arc::new(SessionRegistry::new()))
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Enumerate the curated format candidates for a URL. Blocks the caller
    /// for one discovery round trip.
    pub async fn get_formats(&self, url: &str) -> Result<Vec<FormatCandidate>, DownloadError> {
        if !self.tool.is_available().await {
            return Err(DownloadError::ToolMissing);
        }
        resolve_formats(&self.tool, url).await
    }

    /// Start a tracked background download. Fire-and-forget: the outcome is
    /// delivered to `owner` as Progress events followed by exactly one
    /// Complete or Error event. The session id stays internal.
    pub async fn start_download(
        &self,
        request: DownloadRequest,
        owner: mpsc::UnboundedSender<DownloadEvent>,
    ) {
        let id = Uuid::new_v4().simple().to_string();

        let session = DownloadSession {
            id: id.clone(),
            owner: owner.clone(),
            status: SessionStatus::Downloading,
            progress: 0,
            url: request.url.clone(),
            format_id: request.format_id.clone(),
            target_dir: request.target_dir.clone(),
        };
        self.registry.insert(session).await;

        let tool = self.tool.clone();
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            run_session(tool, registry, id, request, owner).await;
        });
    }
}

/// One worker task per download: monitor the child, then clean up and send
/// the single terminal event. The session is gone from the registry before
/// the owner observes the outcome.
async fn run_session(
    tool: ToolHandle,
    registry: Arc<SessionRegistry>,
    id: String,
    request: DownloadRequest,
    owner: mpsc::UnboundedSender<DownloadEvent>,
) {
    log::debug!(
        "[orchestrator] session {}: starting {} (format {})",
        id,
        request.url,
        request.format_id
    );

    let outcome = monitor_download(&tool, &registry, &id, &request, &owner).await;

    let terminal = if outcome.is_ok() {
        SessionStatus::Completed
    } else {
        SessionStatus::Failed
    };
    registry.update(&id, |s| s.status = terminal).await;
    registry.remove(&id).await;

    let event = match outcome {
        Ok(filename) => {
            log::debug!("[orchestrator] session {}: completed as {}", id, filename);
            DownloadEvent::Complete { filename }
        }
        Err(err) => {
            log::warn!("[orchestrator] session {}: failed: {}", id, err.detail());
            DownloadEvent::Error {
                message: err.to_string(),
            }
        }
    };
    let _ = owner.send(event);
}

async fn monitor_download(
    tool: &ToolHandle,
    registry: &SessionRegistry,
    id: &str,
    request: &DownloadRequest,
    owner: &mpsc::UnboundedSender<DownloadEvent>,
) -> Result<String, DownloadError> {
    // Directory creation is idempotent; an existing directory is not an error.
    tokio::fs::create_dir_all(&request.target_dir)
        .await
        .map_err(|e| {
            DownloadError::Spawn(format!(
                "could not create {}: {}",
                request.target_dir.display(),
                e
            ))
        })?;

    // Title failure is non-fatal: yt-dlp's own template names the file then.
    let title = resolve_title(tool, &request.url).await;
    let args = build_download_args(request, title.as_deref());
    log::debug!("[orchestrator] session {}: {} {}", id, tool.path(), args.join(" "));

    let mut child = Command::new(tool.path())
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| DownloadError::Spawn(format!("failed to start {}: {}", tool.path(), e)))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::Spawn("failed to capture stdout".to_string()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::Spawn("failed to capture stderr".to_string()))?;

    // Drain stderr concurrently so the child never blocks on a full pipe.
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        buf
    });

    let mut destination: Option<String> = None;
    let mut saw_complete = false;
    let mut pending = String::new();
    let mut buf = [0u8; 4096];

    'read: loop {
        let n = stdout
            .read(&mut buf)
            .await
            .map_err(|e| DownloadError::Spawn(format!("stdout read failed: {}", e)))?;
        if n == 0 {
            break;
        }
        pending.push_str(&String::from_utf8_lossy(&buf[..n]));

        // --newline keeps output newline-delimited, but a read can still
        // carry several lines or a partial one.
        while let Some(pos) = pending.find('\n') {
            let line: String = pending.drain(..=pos).collect();
            if apply_signal(parse_chunk(line.trim_end()), registry, id, owner, &mut destination)
                .await
            {
                saw_complete = true;
                break 'read;
            }
        }
    }

    if !saw_complete && !pending.trim().is_empty() {
        saw_complete =
            apply_signal(parse_chunk(pending.trim_end()), registry, id, owner, &mut destination)
                .await;
    }

    // Merged downloads keep writing after the first completion marker (the
    // audio stream's output follows the video's). Keep the pipe flowing
    // until EOF or the child can block on a full pipe and never exit.
    if saw_complete {
        loop {
            let n = stdout
                .read(&mut buf)
                .await
                .map_err(|e| DownloadError::Spawn(format!("stdout read failed: {}", e)))?;
            if n == 0 {
                break;
            }
        }
    }

    // Reap the child even after an early completion marker: post-processing
    // (the mp4 merge) must finish before the result filename is usable.
    let status = child
        .wait()
        .await
        .map_err(|e| DownloadError::Spawn(format!("failed to wait for child: {}", e)))?;

    if saw_complete || status.success() {
        if let Some(name) = destination {
            return Ok(name);
        }
        if let Some(path) = most_recent_file(&request.target_dir) {
            if let Some(name) = path.file_name() {
                log::debug!(
                    "[orchestrator] session {}: recovered filename by recency: {:?}",
                    id,
                    name
                );
                return Ok(name.to_string_lossy().into_owned());
            }
        }
        return Err(DownloadError::OutputAmbiguity);
    }

    let stderr_buf = stderr_task.await.unwrap_or_default();
    let stderr_text = String::from_utf8_lossy(&stderr_buf);
    if let Some(last) = stderr_text.lines().rev().find(|l| !l.trim().is_empty()) {
        log::warn!("[orchestrator] session {}: child stderr: {}", id, last);
    }

    Err(DownloadError::ChildExit(status.code().unwrap_or(-1)))
}

/// Apply one parsed signal: registry update plus owner notification.
/// Returns true when the completion marker was seen.
async fn apply_signal(
    signal: ProgressSignal,
    registry: &SessionRegistry,
    id: &str,
    owner: &mpsc::UnboundedSender<DownloadEvent>,
    destination: &mut Option<String>,
) -> bool {
    match signal {
        ProgressSignal::Destination(name) => {
            *destination = Some(name);
            false
        }
        ProgressSignal::Progress(percent) => {
            registry
                .update(id, |s| s.progress = percent.clamp(0.0, 100.0) as u8)
                .await;
            let _ = owner.send(DownloadEvent::Progress { percent });
            false
        }
        ProgressSignal::Complete => true,
        ProgressSignal::Unrecognized => false,
    }
}

/// Secondary metadata call: display title only, for filename construction.
async fn resolve_title(tool: &ToolHandle, url: &str) -> Option<String> {
    let args = vec![
        "--print".to_string(),
        "title".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        url.to_string(),
    ];

    match run_output_with_timeout(tool.path(), &args, TITLE_TIMEOUT_SECS).await {
        Ok(output) if output.status.success() => {
            let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if title.is_empty() {
                None
            } else {
                Some(title)
            }
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::debug!("[orchestrator] title lookup failed for {}: {}", url, stderr.trim());
            None
        }
        Err(e) => {
            log::debug!("[orchestrator] title lookup error for {}: {}", url, e.detail());
            None
        }
    }
}

fn build_download_args(request: &DownloadRequest, title: Option<&str>) -> Vec<String> {
    // A bare numeric id names a single stream; merge it with best audio.
    // Anything else is a fully qualified format expression.
    let format_expr = if !request.format_id.is_empty()
        && request.format_id.chars().all(|c| c.is_ascii_digit())
    {
        format!("{}+bestaudio", request.format_id)
    } else {
        request.format_id.clone()
    };

    let mut args = vec![
        "-f".to_string(),
        format_expr,
        "--newline".to_string(),
        "--progress".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--merge-output-format".to_string(),
        "mp4".to_string(),
    ];

    match title.map(sanitize_title).filter(|t| !t.is_empty()) {
        Some(base) => {
            args.push("-o".to_string());
            args.push(format!(
                "{}/{}.%(ext)s",
                request.target_dir.display(),
                base
            ));
        }
        None => {
            args.push("-P".to_string());
            args.push(request.target_dir.display().to_string());
        }
    }

    args.push(request.url.clone());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn make_request(format_id: &str) -> DownloadRequest {
        DownloadRequest {
            url: "https://youtu.be/abc".to_string(),
            format_id: format_id.to_string(),
            target_dir: PathBuf::from("/tmp/out"),
        }
    }

    #[test]
    fn numeric_format_id_requests_audio_merge() {
        let args = build_download_args(&make_request("137"), Some("My Video"));
        assert_eq!(args[0], "-f");
        assert_eq!(args[1], "137+bestaudio");
    }

    #[test]
    fn qualified_format_expression_passes_through() {
        let args = build_download_args(&make_request("bv*[height<=720]+ba"), None);
        assert_eq!(args[1], "bv*[height<=720]+ba");
    }

    #[test]
    fn title_becomes_output_template() {
        let args = build_download_args(&make_request("140"), Some("Cool Song (Live)"));
        let o = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[o + 1], "/tmp/out/Cool-Song-Live.%(ext)s");
        assert!(!args.contains(&"-P".to_string()));
    }

    #[test]
    fn missing_title_falls_back_to_default_template() {
        let args = build_download_args(&make_request("140"), None);
        let p = args.iter().position(|a| a == "-P").unwrap();
        assert_eq!(args[p + 1], "/tmp/out");
        assert!(!args.contains(&"-o".to_string()));
    }

    #[test]
    fn machine_parseable_progress_flags_present() {
        let args = build_download_args(&make_request("140"), None);
        assert!(args.contains(&"--newline".to_string()));
        assert!(args.contains(&"--progress".to_string()));
        assert!(args.contains(&"--merge-output-format".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");
    }

    #[test]
    fn unsanitizable_title_falls_back_to_default_template() {
        let args = build_download_args(&make_request("140"), Some("Привет!"));
        assert!(args.contains(&"-P".to_string()));
    }

    #[tokio::test]
    async fn spawn_fault_reports_generic_retry_message() {
        let registry = Arc::new(SessionRegistry::new());
        let orchestrator = Orchestrator::new(
            ToolHandle::at("/nonexistent/yt-dlp"),
            Arc::clone(&registry),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = DownloadRequest::new("https://youtu.be/abc", "140")
            .with_target_dir(std::env::temp_dir().join("ytgrab-spawn-fault-test"));
        orchestrator.start_download(request, tx).await;

        let event = rx.recv().await.expect("terminal event");
        match event {
            DownloadEvent::Error { message } => {
                assert_eq!(message, "Download failed, please retry");
            }
            other => panic!("expected Error event, got {:?}", other),
        }
        assert!(rx.recv().await.is_none(), "exactly one terminal event");
        assert!(registry.is_empty().await);
    }
}
