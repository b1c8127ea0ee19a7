use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::Config;
use crate::frames::FrameSampler;
use crate::llm::{load_prompt, LLMProvider, VideoDescriber};
use crate::steps::{self, StepRecord};
use crate::video::VideoProcessor;

/// Everything produced for one video, handed as-is to the exporters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModopDocument {
    pub video_path: PathBuf,
    pub summary: String,
    pub steps: Vec<StepRecord>,
    pub raw_response: String,
    pub provider: Option<LLMProvider>,
    pub model: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl ModopDocument {
    /// File stem the exports are named after
    pub fn stem(&self) -> String {
        self.video_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "modop".to_string())
    }

    pub fn frames_captured(&self) -> usize {
        self.steps.iter().filter(|s| s.has_frame()).count()
    }
}

/// Counters for a pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub steps_found: usize,
    pub frames_captured: usize,
    pub frames_missing: usize,
    pub describe_time: Duration,
    pub sampling_time: Duration,
}

/// describe -> parse -> sample, strictly in that order
pub struct ModopPipeline {
    config: Config,
    video_processor: VideoProcessor,
    sampler: FrameSampler,
    describer: Option<Box<dyn VideoDescriber>>,
}

impl ModopPipeline {
    pub fn new(config: Config, describer: Option<Box<dyn VideoDescriber>>) -> Self {
        let video_processor = VideoProcessor::new()
            .with_supported_extensions(config.processing.supported_extensions.clone())
            .with_ffprobe(config.frames.ffprobe_path.clone());
        let sampler = FrameSampler::new(config.frames.clone());

        Self {
            config,
            video_processor,
            sampler,
            describer,
        }
    }

    pub fn video_processor(&self) -> &VideoProcessor {
        &self.video_processor
    }

    /// Full run: ask the AI service about the video, then build the document
    pub async fn run(&self, video: &Path) -> Result<(ModopDocument, PipelineStats)> {
        self.check_input(video).await?;

        let describer = self
            .describer
            .as_ref()
            .ok_or_else(|| anyhow!("No AI provider configured"))?;

        let prompt = load_prompt(self.config.llm.prompt_file.as_deref()).await;

        info!("🤖 Asking {:?} to describe {}", describer.provider_type(), video.display());
        let start = Instant::now();
        let response = describer.describe(video, &prompt).await?;
        let describe_time = start.elapsed();

        info!(
            "📝 Received {} chars in {:.1}s (tokens: {:?})",
            response.content.len(),
            describe_time.as_secs_f64(),
            response.tokens_used
        );

        let (mut document, mut stats) = self.render(video, &response.content).await?;
        document.provider = Some(describer.provider_type());
        document.model = Some(response.model);
        stats.describe_time = describe_time;

        Ok((document, stats))
    }

    /// Build the document from an already obtained response
    pub async fn render(&self, video: &Path, raw_response: &str) -> Result<(ModopDocument, PipelineStats)> {
        let parsed = steps::parse(raw_response);
        let mut stats = PipelineStats {
            steps_found: parsed.len(),
            ..PipelineStats::default()
        };

        if parsed.is_empty() {
            warn!("⚠️ No step could be extracted from the response");
        } else {
            info!("📋 Extracted {} steps", parsed.len());
        }

        let mut steps = parsed.steps;
        if !self.config.processing.skip_frames {
            let start = Instant::now();
            self.attach_frames(video, &mut steps).await;
            stats.sampling_time = start.elapsed();
        }

        stats.frames_captured = steps.iter().filter(|s| s.has_frame()).count();
        stats.frames_missing = steps.len() - stats.frames_captured;

        let document = ModopDocument {
            video_path: video.to_path_buf(),
            summary: parsed.summary,
            steps,
            raw_response: raw_response.to_string(),
            provider: None,
            model: None,
            generated_at: Utc::now(),
        };

        Ok((document, stats))
    }

    /// One sample per step, sequentially; a missing frame leaves the step text intact
    pub async fn attach_frames(&self, video: &Path, steps: &mut [StepRecord]) {
        for (i, step) in steps.iter_mut().enumerate() {
            step.frame = self.sampler.sample(video, &step.timestamp).await;
            if step.frame.is_some() {
                info!("🖼️ Step {}: frame captured at {}", i + 1, step.timestamp);
            }
        }
    }

    /// Cheap checks run before the upload
    async fn check_input(&self, video: &Path) -> Result<()> {
        let metadata = match tokio::fs::metadata(video).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Err(anyhow!("Video not found: {}", video.display())),
        };

        if !self.video_processor.is_supported(video) {
            return Err(anyhow!(
                "Unsupported video format: {} (expected one of {})",
                video.display(),
                self.config.processing.supported_extensions.join(", ")
            ));
        }

        let max = self.config.processing.max_file_size;
        let size = metadata.len();
        if max > 0 && size > max {
            return Err(anyhow!("{} is {} bytes, limit is {}", video.display(), size, max));
        }

        match self.video_processor.validate_video(video).await {
            Ok(true) => {}
            Ok(false) => return Err(anyhow!("No decodable video stream in {}", video.display())),
            Err(e) => warn!("Skipping integrity check of {}: {}", video.display(), e),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::llm::LLMResponse;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct CannedDescriber(&'static str);

    #[async_trait]
    impl VideoDescriber for CannedDescriber {
        async fn describe(&self, _video: &Path, _prompt: &str) -> Result<LLMResponse> {
            Ok(LLMResponse {
                content: self.0.to_string(),
                tokens_used: Some(10),
                model: "canned".to_string(),
            })
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn provider_type(&self) -> LLMProvider {
            LLMProvider::Gemini
        }
    }

    /// Config whose ffprobe cannot be launched, so the integrity check is skipped
    fn config_without_ffprobe() -> Config {
        let mut config = ConfigBuilder::new().skip_frames(true).build();
        config.frames.ffprobe_path = PathBuf::from("/nonexistent/ffprobe");
        config
    }

    const RESPONSE: &str = "RESUME: Demo\n---\nTITRE: Open\nTIME: 00:01\n---\nTITRE: Close\nDESC: Done\nTIME: [00:02]";

    #[tokio::test]
    async fn test_render_without_frames() {
        let config = ConfigBuilder::new().skip_frames(true).build();
        let pipeline = ModopPipeline::new(config, None);

        let (document, stats) = pipeline.render(Path::new("demo.mp4"), RESPONSE).await.unwrap();
        assert_eq!(document.summary, "Demo");
        assert_eq!(document.steps.len(), 2);
        assert_eq!(document.stem(), "demo");
        assert_eq!(stats.steps_found, 2);
        assert_eq!(stats.frames_missing, 2);
    }

    #[tokio::test]
    async fn test_unreadable_video_keeps_steps() {
        let pipeline = ModopPipeline::new(Config::default(), None);
        let (document, stats) = pipeline
            .render(Path::new("/no/such/video.mp4"), RESPONSE)
            .await
            .unwrap();

        assert_eq!(document.steps.len(), 2);
        assert_eq!(document.frames_captured(), 0);
        assert_eq!(stats.frames_captured, 0);
    }

    #[tokio::test]
    async fn test_run_with_canned_describer() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("capture.mp4");
        tokio::fs::write(&video, b"not really a video").await.unwrap();

        let pipeline = ModopPipeline::new(config_without_ffprobe(), Some(Box::new(CannedDescriber(RESPONSE))));

        let (document, _) = pipeline.run(&video).await.unwrap();
        assert_eq!(document.model.as_deref(), Some("canned"));
        assert_eq!(document.provider, Some(LLMProvider::Gemini));
        assert_eq!(document.steps[1].timestamp, "00:02");
    }

    #[tokio::test]
    async fn test_run_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let notes = dir.path().join("notes.txt");
        tokio::fs::write(&notes, b"text").await.unwrap();

        let pipeline = ModopPipeline::new(Config::default(), Some(Box::new(CannedDescriber(RESPONSE))));
        assert!(pipeline.run(&notes).await.is_err());
        assert!(pipeline.run(&dir.path().join("missing.mp4")).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_undecodable_video_rejected_before_describe() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("capture.mp4");
        tokio::fs::write(&video, b"not really a video").await.unwrap();

        // `false` exits non-zero with no output, like ffprobe on a broken file
        let mut config = config_without_ffprobe();
        config.frames.ffprobe_path = PathBuf::from("false");
        let pipeline = ModopPipeline::new(config, Some(Box::new(CannedDescriber(RESPONSE))));

        let err = pipeline.run(&video).await.unwrap_err();
        assert!(err.to_string().contains("No decodable video stream"));
    }

    #[tokio::test]
    async fn test_fake_video_rejected_by_ffprobe() {
        let available = tokio::process::Command::new("ffprobe")
            .arg("-version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !available {
            eprintln!("ffprobe not available, skipping");
            return;
        }

        let dir = TempDir::new().unwrap();
        let video = dir.path().join("capture.mp4");
        tokio::fs::write(&video, b"not really a video").await.unwrap();

        let config = ConfigBuilder::new().skip_frames(true).build();
        let pipeline = ModopPipeline::new(config, Some(Box::new(CannedDescriber(RESPONSE))));
        assert!(pipeline.run(&video).await.is_err());
        assert!(!pipeline.video_processor().validate_video(&video).await.unwrap());
    }

    #[tokio::test]
    async fn test_run_without_describer_fails() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("capture.mp4");
        tokio::fs::write(&video, b"x").await.unwrap();

        let pipeline = ModopPipeline::new(Config::default(), None);
        assert!(pipeline.run(&video).await.is_err());
    }
}
