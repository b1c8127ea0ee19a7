//! Modop Studio
//!
//! Turns a screen-recorded demonstration video into a step-by-step guide:
//! a multimodal AI service describes the steps, the response is parsed into
//! step records, and one still frame is captured per step.

pub mod config;
pub mod export;
pub mod frames;
pub mod llm;
pub mod processing;
pub mod steps;
pub mod video;

use tracing_subscriber::EnvFilter;

// Re-export main types for easy access
pub use crate::config::{Config, ConfigBuilder, ExportFormat};
pub use crate::export::DocumentExporter;
pub use crate::frames::{FrameFormat, FrameSampler, StillFrame};
pub use crate::llm::{create_describer, LLMProvider, VideoDescriber};
pub use crate::processing::{ModopDocument, ModopPipeline, PipelineStats};
pub use crate::steps::{parse, ParseResult, StepRecord, Timestamp};
pub use crate::video::{VideoInfo, VideoProcessor};

/// Install the tracing subscriber; `RUST_LOG` wins over the configured level
pub fn init_logging(log_level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { log_level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("modop_studio={},warn", level)));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
