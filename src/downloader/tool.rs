// yt-dlp binary discovery and availability probing

use std::process::Stdio;

use tokio::process::Command;

/// Handle to the external yt-dlp binary
#[derive(Debug, Clone)]
pub struct ToolHandle {
    path: String,
}

impl ToolHandle {
    /// Locate yt-dlp: env override, common install paths, `which`, then PATH.
    /// Example: export YTGRAB_YTDLP="/opt/tools/yt-dlp"
    pub fn locate() -> Self {
        if let Ok(path) = std::env::var("YTGRAB_YTDLP") {
            return Self::at(path);
        }

        let common_paths = [
            "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
            "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac
            "/usr/bin/yt-dlp",          // System installation
        ];

        for path in common_paths {
            if std::path::Path::new(path).exists() {
                return Self::at(path);
            }
        }

        if let Ok(output) = std::process::Command::new("which").arg("yt-dlp").output() {
            if output.status.success() {
                if let Ok(path) = String::from_utf8(output.stdout) {
                    let trimmed = path.trim();
                    if !trimmed.is_empty() {
                        return Self::at(trimmed);
                    }
                }
            }
        }

        // Last resort: hope it's in PATH
        Self::at("yt-dlp")
    }

    /// Handle for an explicit binary path
    pub fn at(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check the binary actually runs
    pub async fn is_available(&self) -> bool {
        match Command::new(&self.path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(_) => false,
        }
    }
}
