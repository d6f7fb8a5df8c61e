// Progress parsing for yt-dlp output
//
// yt-dlp reports progress as human-readable text; extracting state from it
// is inherently version-sensitive, so this stays a pure function testable
// against literal captured lines, with no process handling mixed in.

use regex::Regex;

/// Classification of one chunk of child-process output.
/// A chunk is not necessarily line-aligned.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressSignal {
    /// Percentage reported, e.g. "[download]  42.5% of 10.00MiB"
    Progress(f32),
    /// Destination filename announced (final path segment only)
    Destination(String),
    /// Literal completion marker seen
    Complete,
    /// Nothing recognized; caller must ignore silently
    Unrecognized,
}

lazy_static::lazy_static! {
    static ref DEST_RE: Regex = Regex::new(r"Destination:\s+(.+)").unwrap();
    static ref PERCENT_RE: Regex = Regex::new(r"(\d+(?:\.\d+)?)%").unwrap();
}

/// Classify one chunk of yt-dlp output. Pure and deterministic.
pub fn parse_chunk(chunk: &str) -> ProgressSignal {
    if let Some(caps) = DEST_RE.captures(chunk) {
        let path = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let name = path.rsplit('/').next().unwrap_or(path);
        return ProgressSignal::Destination(name.to_string());
    }

    if chunk.contains("100%") {
        return ProgressSignal::Complete;
    }

    if let Some(caps) = PERCENT_RE.captures(chunk) {
        if let Ok(percent) = caps[1].parse::<f32>() {
            return ProgressSignal::Progress(percent);
        }
    }

    ProgressSignal::Unrecognized
}
