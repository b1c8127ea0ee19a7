use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Video information extracted from file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub filename: String,
    pub duration: Duration,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub format: String,
    pub file_size: u64,
    /// Frame count when the container reports it
    pub frame_count: Option<u64>,
}

impl VideoInfo {
    /// Build from `ffprobe -print_format json -show_format -show_streams` output
    pub fn from_ffprobe(path: &Path, ffprobe_data: &serde_json::Value, file_size: u64) -> Result<Self> {
        let format = &ffprobe_data["format"];
        let streams = ffprobe_data["streams"]
            .as_array()
            .ok_or_else(|| anyhow!("ffprobe output has no streams"))?;

        let video_stream = streams
            .iter()
            .find(|s| s["codec_type"] == "video")
            .ok_or_else(|| anyhow!("No video stream found"))?;

        let duration_seconds: f64 = parse_f64(&format["duration"])
            .or_else(|| parse_f64(&video_stream["duration"]))
            .unwrap_or(0.0);

        let fps = parse_rate(&video_stream["r_frame_rate"])
            .or_else(|| parse_rate(&video_stream["avg_frame_rate"]))
            .unwrap_or(0.0);

        Ok(VideoInfo {
            path: path.to_path_buf(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            duration: Duration::from_secs_f64(duration_seconds.max(0.0)),
            width: video_stream["width"].as_u64().unwrap_or(0) as u32,
            height: video_stream["height"].as_u64().unwrap_or(0) as u32,
            fps,
            format: format["format_name"].as_str().unwrap_or("unknown").to_string(),
            file_size,
            frame_count: video_stream["nb_frames"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &u64| n > 0),
        })
    }

    pub fn has_known_duration(&self) -> bool {
        !self.duration.is_zero()
    }
}

/// Numbers come back from ffprobe as JSON strings
fn parse_f64(value: &serde_json::Value) -> Option<f64> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| value.as_f64())
        .filter(|v: &f64| v.is_finite())
}

/// "30000/1001" style rates, "0/0" means unknown
fn parse_rate(value: &serde_json::Value) -> Option<f64> {
    let s = value.as_str()?;
    let rate = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.parse().ok()?,
    };
    Some(rate).filter(|r| r.is_finite() && *r > 0.0)
}

/// Video probing through the ffprobe command line tool
#[derive(Clone)]
pub struct VideoProcessor {
    supported_extensions: Vec<String>,
    ffprobe_path: PathBuf,
}

impl VideoProcessor {
    pub fn new() -> Self {
        Self {
            supported_extensions: vec![
                "mp4".to_string(),
                "mov".to_string(),
                "mkv".to_string(),
                "webm".to_string(),
                "avi".to_string(),
            ],
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }

    pub fn with_supported_extensions(mut self, extensions: Vec<String>) -> Self {
        self.supported_extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    pub fn with_ffprobe(mut self, ffprobe_path: PathBuf) -> Self {
        self.ffprobe_path = ffprobe_path;
        self
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.supported_extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }

    /// Discover all video files in a directory recursively, sorted by path
    pub async fn discover_videos(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut videos = Vec::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if self.is_supported(&path) {
                    videos.push(path);
                }
            }
        }

        videos.sort();
        Ok(videos)
    }

    /// Extract video information using ffprobe
    pub async fn probe(&self, video_path: &Path) -> Result<VideoInfo> {
        let output = tokio::process::Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(video_path)
            .output()
            .await
            .map_err(|e| anyhow!("Cannot run {}: {}", self.ffprobe_path.display(), e))?;

        if !output.status.success() {
            return Err(anyhow!("ffprobe failed for {}", video_path.display()));
        }

        let ffprobe_data: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        let file_size = tokio::fs::metadata(video_path).await?.len();
        let video_info = VideoInfo::from_ffprobe(video_path, &ffprobe_data, file_size)?;

        debug!(
            "📹 Probed video: {} ({}x{}, {:.2}fps, {:.1}s)",
            video_info.filename,
            video_info.width,
            video_info.height,
            video_info.fps,
            video_info.duration.as_secs_f64()
        );

        Ok(video_info)
    }

    /// Whether ffprobe finds a decodable video stream; errors only when ffprobe cannot be launched
    pub async fn validate_video(&self, video_path: &Path) -> Result<bool> {
        let output = tokio::process::Command::new(&self.ffprobe_path)
            .args(["-v", "error", "-select_streams", "v:0", "-show_entries", "stream=codec_name", "-of", "csv=p=0"])
            .arg(video_path)
            .output()
            .await
            .map_err(|e| anyhow!("Cannot run {}: {}", self.ffprobe_path.display(), e))?;

        let valid = output.status.success() && !output.stdout.iter().all(u8::is_ascii_whitespace);
        if !valid {
            warn!("⚠️ No decodable video stream in {}", video_path.display());
        }
        Ok(valid)
    }
}

impl Default for VideoProcessor {
    fn default() -> Self {
        Self::new()
    }
}
