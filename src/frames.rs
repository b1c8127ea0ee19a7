//! Still-frame capture at a step's timestamp.
//!
//! Every failure (bad timestamp, missing file, seek past the end, decode
//! error) ends up as `None` from [`FrameSampler::sample`]. [`FrameSampler::try_sample`]
//! keeps the reason for callers that want it.

use anyhow::Result;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::FrameConfig;
use crate::steps::{Timestamp, TimestampError};
use crate::video::{VideoInfo, VideoProcessor};

/// Encoding of captured frames
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    Png,
    Jpeg,
}

impl FrameFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FrameFormat::Png => "png",
            FrameFormat::Jpeg => "jpg",
        }
    }
}

/// One encoded still image, owned by whoever requested it
#[derive(Debug, Clone, PartialEq)]
pub struct StillFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub frame_index: u64,
    pub offset_seconds: u64,
}

impl StillFrame {
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, &self.data).await?;
        Ok(())
    }

    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }
}

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("malformed timestamp: {0}")]
    Timestamp(#[from] TimestampError),

    #[error("video not found: {0}")]
    VideoNotFound(PathBuf),

    #[error("cannot probe video: {0}")]
    Probe(String),

    #[error("video reports no usable frame rate")]
    NoFrameRate,

    #[error("offset {offset}s is past the end of the video ({duration:.2}s)")]
    PastEnd { offset: u64, duration: f64 },

    #[error("frame {index} is beyond the last frame ({count} frames)")]
    FrameOutOfRange { index: u64, count: u64 },

    #[error("ffmpeg returned no frame: {0}")]
    NoFrame(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Where to seek for a given offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekPlan {
    pub offset: Timestamp,
    pub frame_index: u64,
    pub seek_seconds: f64,
}

/// Target frame for an offset, rounded to the nearest frame
pub fn frame_index_for(offset_seconds: u64, fps: f64) -> u64 {
    (offset_seconds as f64 * fps).round() as u64
}

/// Resolve an offset against a probed video, rejecting anything past the end
pub fn plan_seek(info: &VideoInfo, offset: Timestamp) -> Result<SeekPlan, SampleError> {
    if !(info.fps.is_finite() && info.fps > 0.0) {
        return Err(SampleError::NoFrameRate);
    }

    if info.has_known_duration() && offset.as_secs() as f64 >= info.duration.as_secs_f64() {
        return Err(SampleError::PastEnd {
            offset: offset.as_secs(),
            duration: info.duration.as_secs_f64(),
        });
    }

    let frame_index = frame_index_for(offset.as_secs(), info.fps);
    if let Some(count) = info.frame_count {
        if frame_index >= count {
            return Err(SampleError::FrameOutOfRange { index: frame_index, count });
        }
    }

    Ok(SeekPlan {
        offset,
        frame_index,
        seek_seconds: frame_index as f64 / info.fps,
    })
}

/// Grabs single frames with ffmpeg; each call probes and decodes independently
#[derive(Clone)]
pub struct FrameSampler {
    processor: VideoProcessor,
    config: FrameConfig,
}

impl FrameSampler {
    pub fn new(config: FrameConfig) -> Self {
        let processor = VideoProcessor::new().with_ffprobe(config.ffprobe_path.clone());
        Self { processor, config }
    }

    /// Capture the frame at `timestamp`, or `None` if no frame is available
    pub async fn sample(&self, video_path: &Path, timestamp: &str) -> Option<StillFrame> {
        match self.try_sample(video_path, timestamp).await {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("🖼️ No frame for '{}' in {}: {}", timestamp, video_path.display(), e);
                None
            }
        }
    }

    pub async fn try_sample(&self, video_path: &Path, timestamp: &str) -> Result<StillFrame, SampleError> {
        let offset = Timestamp::parse(timestamp)?;

        match tokio::fs::metadata(video_path).await {
            Ok(metadata) if metadata.is_file() => {}
            _ => return Err(SampleError::VideoNotFound(video_path.to_path_buf())),
        }

        let info = self
            .processor
            .probe(video_path)
            .await
            .map_err(|e| SampleError::Probe(e.to_string()))?;

        let plan = plan_seek(&info, offset)?;
        debug!(
            "Seeking {} to frame {} ({:.3}s) for offset {}",
            info.filename, plan.frame_index, plan.seek_seconds, offset
        );

        let png = self.grab_frame(video_path, plan.seek_seconds).await?;
        let decoded = image::load_from_memory_with_format(&png, image::ImageFormat::Png)?;
        let (data, width, height) = self.encode(decoded)?;

        Ok(StillFrame {
            data,
            width,
            height,
            format: self.config.format,
            frame_index: plan.frame_index,
            offset_seconds: offset.as_secs(),
        })
    }

    /// Decode one frame at `seek_seconds` as PNG on stdout
    async fn grab_frame(&self, video_path: &Path, seek_seconds: f64) -> Result<Vec<u8>, SampleError> {
        let seek = format!("{:.6}", seek_seconds);

        let output = tokio::process::Command::new(&self.config.ffmpeg_path)
            .args(["-nostdin", "-v", "error", "-ss", &seek, "-i"])
            .arg(video_path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SampleError::NoFrame(stderr));
        }

        if output.stdout.is_empty() {
            return Err(SampleError::NoFrame(format!("nothing decoded at {}s", seek)));
        }

        Ok(output.stdout)
    }

    fn encode(&self, picture: DynamicImage) -> Result<(Vec<u8>, u32, u32), SampleError> {
        let picture = match self.config.max_width {
            Some(max_width) if picture.width() > max_width => {
                let height = ((picture.height() as u64 * max_width as u64) / picture.width() as u64).max(1) as u32;
                picture.resize_exact(max_width, height, FilterType::Triangle)
            }
            _ => picture,
        };

        let mut buffer = Vec::new();
        match self.config.format {
            FrameFormat::Png => {
                picture.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)?;
            }
            FrameFormat::Jpeg => {
                let quality = self.config.jpeg_quality.clamp(1, 100);
                let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
                encoder.encode_image(&picture.to_rgb8())?;
            }
        }

        Ok((buffer, picture.width(), picture.height()))
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(FrameConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn info(fps: f64, duration_secs: f64, frame_count: Option<u64>) -> VideoInfo {
        VideoInfo {
            path: PathBuf::from("demo.mp4"),
            filename: "demo.mp4".to_string(),
            duration: Duration::from_secs_f64(duration_secs),
            width: 640,
            height: 360,
            fps,
            format: "mp4".to_string(),
            file_size: 0,
            frame_count,
        }
    }

    #[test]
    fn test_frame_index_rounds() {
        assert_eq!(frame_index_for(65, 30.0), 1950);
        // 29.97 * 3 = 89.91 truncates to 89, rounds to 90
        assert_eq!(frame_index_for(3, 29.97), 90);
        assert_eq!(frame_index_for(0, 24.0), 0);
    }

    #[test]
    fn test_bracketed_and_plain_timestamps_seek_identically() {
        let video = info(30.0, 120.0, None);
        let bracketed = plan_seek(&video, Timestamp::parse("[01:05]").unwrap()).unwrap();
        let plain = plan_seek(&video, Timestamp::parse("01:05").unwrap()).unwrap();
        assert_eq!(bracketed, plain);
        assert_eq!(plain.offset.as_secs(), 65);
        assert_eq!(plain.frame_index, 1950);
    }

    #[test]
    fn test_offset_past_end_rejected() {
        let video = info(25.0, 10.0, None);
        assert!(matches!(
            plan_seek(&video, Timestamp::from_seconds(10)),
            Err(SampleError::PastEnd { offset: 10, .. })
        ));
        assert!(plan_seek(&video, Timestamp::from_seconds(9)).is_ok());
    }

    #[test]
    fn test_frame_count_bound() {
        // duration unknown, only the frame count is available
        let video = info(10.0, 0.0, Some(50));
        assert!(plan_seek(&video, Timestamp::from_seconds(4)).is_ok());
        assert!(matches!(
            plan_seek(&video, Timestamp::from_seconds(5)),
            Err(SampleError::FrameOutOfRange { index: 50, count: 50 })
        ));
    }

    #[test]
    fn test_zero_fps_rejected() {
        let video = info(0.0, 10.0, None);
        assert!(matches!(
            plan_seek(&video, Timestamp::from_seconds(1)),
            Err(SampleError::NoFrameRate)
        ));
    }

    #[tokio::test]
    async fn test_missing_video_gives_none() {
        let sampler = FrameSampler::default();
        assert!(sampler.sample(Path::new("/definitely/not/here.mp4"), "00:01").await.is_none());
        assert!(matches!(
            sampler.try_sample(Path::new("/definitely/not/here.mp4"), "00:01").await,
            Err(SampleError::VideoNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_is_not_a_video() {
        let dir = tempfile::TempDir::new().unwrap();
        let sampler = FrameSampler::default();
        assert!(matches!(
            sampler.try_sample(dir.path(), "00:01").await,
            Err(SampleError::VideoNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_timestamp_checked_before_io() {
        let sampler = FrameSampler::default();
        assert!(matches!(
            sampler.try_sample(Path::new("/definitely/not/here.mp4"), "01:75").await,
            Err(SampleError::Timestamp(TimestampError::SecondsOutOfRange(75)))
        ));
    }

    #[test]
    fn test_encode_downscales_and_formats() {
        let config = FrameConfig {
            format: FrameFormat::Jpeg,
            max_width: Some(100),
            ..FrameConfig::default()
        };
        let sampler = FrameSampler::new(config);
        let picture = DynamicImage::new_rgb8(400, 200);
        let (data, width, height) = sampler.encode(picture).unwrap();
        assert_eq!((width, height), (100, 50));
        // JPEG SOI marker
        assert_eq!(&data[..2], &[0xFF, 0xD8]);
    }
}
