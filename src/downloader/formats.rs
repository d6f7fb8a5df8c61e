// Format discovery - runs yt-dlp in metadata-only mode and reduces the raw
// rendition list to a small curated candidate set:
// - best video (video-only renditions are mergeable with best audio)
// - the 1080p rendition as fallback when best exceeds it
// - best audio

use serde_json::Value;

use super::errors::DownloadError;
use super::models::{FormatCandidate, FormatKind};
use super::tool::ToolHandle;
use super::utils::run_output_with_timeout;

const DISCOVERY_TIMEOUT_SECS: u64 = 30;

/// Clients that ask for "best available" often cannot play exotic very-high
/// resolutions, so this tier is offered alongside anything above it.
const REFERENCE_HEIGHT: u64 = 1080;

/// Enumerate downloadable renditions for a URL. Synchronous from the
/// caller's point of view: blocks for one discovery round trip.
pub async fn resolve_formats(
    tool: &ToolHandle,
    url: &str,
) -> Result<Vec<FormatCandidate>, DownloadError> {
    let args = vec![
        "--dump-json".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        url.to_string(),
    ];

    let output = run_output_with_timeout(tool.path(), &args, DISCOVERY_TIMEOUT_SECS)
        .await
        .map_err(|e| match e {
            // A spawn failure here is a discovery failure; classify it so a
            // missing binary still surfaces as ToolMissing.
            DownloadError::Spawn(detail) => match DownloadError::from(detail) {
                DownloadError::Unknown(d) => DownloadError::Discovery(d),
                classified => classified,
            },
            other => other,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        log::warn!("[formats] discovery failed for {}: {}", url, stderr.trim());
        return Err(DownloadError::Discovery(stderr.to_string()));
    }

    let json: Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| DownloadError::Discovery(format!("invalid JSON from yt-dlp: {}", e)))?;

    let all = collect_candidates(&json);
    log::debug!("[formats] {} raw renditions for {}", all.len(), url);

    Ok(select_candidates(all))
}

/// Walk the raw formats array, keeping only renditions with a usable video
/// or audio stream.
fn collect_candidates(json: &Value) -> Vec<FormatCandidate> {
    let formats = match json["formats"].as_array() {
        Some(f) => f,
        None => return Vec::new(),
    };

    let mut candidates = Vec::new();

    for f in formats {
        let vcodec = f["vcodec"].as_str().unwrap_or("none");
        let acodec = f["acodec"].as_str().unwrap_or("none");
        let has_video = vcodec != "none" && !vcodec.is_empty();
        let has_audio = acodec != "none" && !acodec.is_empty();

        if !has_video && !has_audio {
            continue;
        }

        let size = f["filesize"]
            .as_u64()
            .or_else(|| f["filesize_approx"].as_u64())
            .unwrap_or(0);

        // Video-only renditions still classify as video: the orchestrator
        // merges them with best audio at download time.
        let candidate = if has_video {
            let height = f["height"].as_u64().unwrap_or(0);
            FormatCandidate {
                id: f["format_id"].as_str().unwrap_or("").to_string(),
                kind: FormatKind::Video,
                quality_rank: height,
                display_quality: format!("{}p", height),
                size_estimate: size,
                container_ext: f["ext"].as_str().unwrap_or("mp4").to_string(),
            }
        } else {
            let abr = f["abr"].as_f64().unwrap_or(0.0).round() as u64;
            FormatCandidate {
                id: f["format_id"].as_str().unwrap_or("").to_string(),
                kind: FormatKind::Audio,
                quality_rank: abr,
                display_quality: format!("{}kbps", abr),
                size_estimate: size,
                container_ext: f["ext"].as_str().unwrap_or("m4a").to_string(),
            }
        };

        candidates.push(candidate);
    }

    candidates
}

/// Reduce raw candidates to at most two videos and one audio,
/// rank-descending.
fn select_candidates(all: Vec<FormatCandidate>) -> Vec<FormatCandidate> {
    let mut videos: Vec<FormatCandidate> = all
        .iter()
        .filter(|c| c.kind == FormatKind::Video)
        .cloned()
        .collect();
    videos.sort_by(|a, b| b.quality_rank.cmp(&a.quality_rank));

    let best_audio = all
        .into_iter()
        .filter(|c| c.kind == FormatKind::Audio)
        .max_by_key(|c| c.quality_rank);

    let mut selected = Vec::with_capacity(3);

    if let Some(best) = videos.first().cloned() {
        let wants_fallback = best.quality_rank > REFERENCE_HEIGHT;
        selected.push(best);

        if wants_fallback {
            if let Some(reference) = videos
                .iter()
                .find(|c| c.quality_rank == REFERENCE_HEIGHT)
                .cloned()
            {
                selected.push(reference);
            }
        }
    }

    if let Some(audio) = best_audio {
        selected.push(audio);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_video(id: &str, height: u64) -> FormatCandidate {
        FormatCandidate {
            id: id.to_string(),
            kind: FormatKind::Video,
            quality_rank: height,
            display_quality: format!("{}p", height),
            size_estimate: height * 100_000,
            container_ext: "mp4".to_string(),
        }
    }

    fn make_audio(id: &str, bitrate: u64) -> FormatCandidate {
        FormatCandidate {
            id: id.to_string(),
            kind: FormatKind::Audio,
            quality_rank: bitrate,
            display_quality: format!("{}kbps", bitrate),
            size_estimate: bitrate * 10_000,
            container_ext: "m4a".to_string(),
        }
    }

    #[test]
    fn at_most_two_videos_one_audio() {
        let raw = vec![
            make_video("v1", 2160),
            make_video("v2", 1440),
            make_video("v3", 1080),
            make_video("v4", 720),
            make_audio("a1", 128),
            make_audio("a2", 64),
            make_audio("a3", 48),
        ];

        let selected = select_candidates(raw);

        let videos = selected
            .iter()
            .filter(|c| c.kind == FormatKind::Video)
            .count();
        let audios = selected
            .iter()
            .filter(|c| c.kind == FormatKind::Audio)
            .count();
        assert!(videos <= 2);
        assert!(audios <= 1);
    }

    #[test]
    fn reference_tier_included_when_best_exceeds_it() {
        let raw = vec![
            make_video("uhd", 2160),
            make_video("fhd", 1080),
            make_video("hd", 720),
            make_audio("a", 128),
        ];

        let selected = select_candidates(raw);
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[0].id, "uhd");
        assert_eq!(selected[1].id, "fhd");
        assert_eq!(selected[2].id, "a");
    }

    #[test]
    fn no_fallback_when_best_is_reference_tier() {
        let raw = vec![
            make_video("fhd", 1080),
            make_video("hd", 720),
            make_audio("a", 128),
        ];

        let selected = select_candidates(raw);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].id, "fhd");
        assert_eq!(selected[1].id, "a");
    }

    #[test]
    fn no_fallback_when_reference_tier_absent() {
        let raw = vec![make_video("uhd", 2160), make_video("hd", 720)];

        let selected = select_candidates(raw);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "uhd");
    }

    #[test]
    fn audio_only_source() {
        let raw = vec![make_audio("a1", 128), make_audio("a2", 160)];

        let selected = select_candidates(raw);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "a2");
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert!(select_candidates(Vec::new()).is_empty());
    }

    #[test]
    fn streamless_renditions_are_excluded() {
        let json = json!({
            "formats": [
                { "format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none" },
                { "format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none", "height": 1080, "filesize": 100 },
                { "format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5 },
            ]
        });

        let candidates = collect_candidates(&json);
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.id != "sb0"));
    }

    #[test]
    fn merged_rendition_classifies_as_video() {
        let json = json!({
            "formats": [
                { "format_id": "22", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a", "height": 720 },
            ]
        });

        let candidates = collect_candidates(&json);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, FormatKind::Video);
        assert_eq!(candidates[0].quality_rank, 720);
    }

    #[test]
    fn missing_rank_fields_default_to_zero() {
        let json = json!({
            "formats": [
                { "format_id": "v", "ext": "mp4", "vcodec": "vp9", "acodec": "none" },
                { "format_id": "a", "ext": "webm", "vcodec": "none", "acodec": "opus" },
            ]
        });

        let candidates = collect_candidates(&json);
        assert!(candidates.iter().all(|c| c.quality_rank == 0));
    }

    #[test]
    fn missing_formats_array_yields_empty() {
        let json = json!({ "title": "whatever" });
        assert!(collect_candidates(&json).is_empty());
    }

    #[test]
    fn audio_display_quality_uses_bitrate() {
        let json = json!({
            "formats": [
                { "format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 128.0, "filesize": 5_000_000 },
            ]
        });

        let candidates = collect_candidates(&json);
        assert_eq!(candidates[0].display_quality, "128kbps");
    }
}
