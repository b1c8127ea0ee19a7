use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::frames::FrameFormat;
use crate::llm::LLMProvider;

/// Configuration for Modop Studio
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input handling
    pub processing: ProcessingConfig,

    /// AI collaborator settings
    pub llm: LLMConfig,

    /// Frame sampling settings
    pub frames: FrameConfig,

    /// Output and logging settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Supported video file extensions
    pub supported_extensions: Vec<String>,

    /// Maximum video size in bytes accepted for upload (0 = no limit)
    pub max_file_size: u64,

    /// Skip frame sampling entirely (text-only guides)
    pub skip_frames: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            supported_extensions: vec![
                "mp4".to_string(),
                "mov".to_string(),
                "mkv".to_string(),
                "webm".to_string(),
                "avi".to_string(),
            ],
            max_file_size: 2 * 1024 * 1024 * 1024, // File API limit
            skip_frames: false,
        }
    }
}

/// AI collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    /// Provider to use
    pub provider: LLMProvider,

    /// API base URL override (defaults to the public Gemini endpoint)
    pub endpoint: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature for generation (0.0 = deterministic)
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Delay between readiness checks of an uploaded video
    pub poll_interval_seconds: u64,

    /// Readiness checks before giving up on an upload
    pub max_poll_attempts: u32,

    /// Remove the uploaded video from the provider once described
    pub delete_uploaded_files: bool,

    /// Path to a custom description prompt
    pub prompt_file: Option<PathBuf>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Gemini,
            endpoint: None,
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            max_tokens: 8192,
            temperature: 0.2,
            timeout_seconds: 300, // video generation is slow
            poll_interval_seconds: 2,
            max_poll_attempts: 150,
            delete_uploaded_files: true,
            prompt_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// ffmpeg executable
    pub ffmpeg_path: PathBuf,

    /// ffprobe executable
    pub ffprobe_path: PathBuf,

    /// Encoding of captured frames
    pub format: FrameFormat,

    /// JPEG quality (1-100), ignored for PNG
    pub jpeg_quality: u8,

    /// Downscale frames wider than this
    pub max_width: Option<u32>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            format: FrameFormat::Png,
            jpeg_quality: 85,
            max_width: Some(1280),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Base output directory
    pub base_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Keep the raw AI response next to the exports
    pub save_raw_response: bool,

    /// Export formats
    pub export_formats: Vec<ExportFormat>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./output"),
            log_level: "info".to_string(),
            save_raw_response: true,
            export_formats: vec![ExportFormat::Json, ExportFormat::Markdown],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Markdown,
    Wiki,
}

impl ExportFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "wiki" | "confluence" => Ok(ExportFormat::Wiki),
            other => Err(anyhow!("Unknown export format: {}", other)),
        }
    }
}

impl Config {
    /// Load the first config file found in the default locations, then the environment
    pub fn load() -> Result<Self> {
        let config_paths = ["modop-studio.toml", "config/modop-studio.toml"];

        for path in &config_paths {
            if Path::new(path).exists() {
                return Self::load_from(Path::new(path));
            }
        }

        Self::from_env()
    }

    /// Load a specific TOML file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        Ok(Self::from_file(path)?.with_env_overrides())
    }

    /// Parse a TOML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read {}: {}", path.display(), e))?;
        let config: Config =
            toml::from_str(&config_str).map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().with_env_overrides())
    }

    fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(api_key) = var("MODOP_API_KEY").or_else(|| var("GEMINI_API_KEY")) {
            self.llm.api_key = Some(api_key);
        }

        if let Some(model) = var("MODOP_MODEL") {
            self.llm.model = model;
        }

        if let Some(output_dir) = var("MODOP_OUTPUT_DIR") {
            self.output.base_dir = PathBuf::from(output_dir);
        }

        if let Some(log_level) = var("MODOP_LOG_LEVEL") {
            self.output.log_level = log_level;
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.processing.supported_extensions.is_empty() {
            return Err(anyhow!("supported_extensions must not be empty"));
        }

        if self.frames.jpeg_quality == 0 || self.frames.jpeg_quality > 100 {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }

        if self.frames.max_width == Some(0) {
            return Err(anyhow!("max_width must be greater than 0"));
        }

        if self.llm.max_poll_attempts == 0 {
            return Err(anyhow!("max_poll_attempts must be greater than 0"));
        }

        if self.output.export_formats.is_empty() {
            return Err(anyhow!("at least one export format is required"));
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// API key presence is only required when the AI service is actually called
    pub fn require_api_key(&self) -> Result<&str> {
        self.llm
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("{:?} API key required (set MODOP_API_KEY or GEMINI_API_KEY)", self.llm.provider))
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Modop Studio Configuration:\n\
            - Provider: {:?} ({})\n\
            - API key: {}\n\
            - Frame format: {:?}\n\
            - Output Directory: {}\n\
            - Export formats: {:?}\n\
            - Supported Extensions: {}",
            self.llm.provider,
            self.llm.model,
            if self.llm.api_key.is_some() { "set" } else { "missing" },
            self.frames.format,
            self.output.base_dir.display(),
            self.output.export_formats,
            self.processing.supported_extensions.join(", "),
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.config.llm.api_key = Some(api_key);
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.config.llm.model = model;
        self
    }

    pub fn with_export_formats(mut self, formats: Vec<ExportFormat>) -> Self {
        self.config.output.export_formats = formats;
        self
    }

    pub fn with_frame_format(mut self, format: FrameFormat) -> Self {
        self.config.frames.format = format;
        self
    }

    pub fn skip_frames(mut self, skip: bool) -> Self {
        self.config.processing.skip_frames = skip;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
