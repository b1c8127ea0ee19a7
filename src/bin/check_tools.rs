use anyhow::Result;
use modop_studio::{create_describer, init_logging, Config};
use std::path::Path;
use tracing::{info, warn};

async fn tool_version(tool: &Path) -> Option<String> {
    let output = tokio::process::Command::new(tool).arg("-version").output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout).lines().next().map(str::to_string)
}

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = Config::load();
    init_logging("info", false);

    let config = loaded.unwrap_or_else(|e| {
        warn!("⚠️ {} (checking with defaults)", e);
        Config::default()
    });

    info!("🔍 Checking Modop Studio dependencies...");

    let mut ready = true;
    for tool in [&config.frames.ffmpeg_path, &config.frames.ffprobe_path] {
        match tool_version(tool).await {
            Some(version) => info!("✅ {}", version),
            None => {
                info!("❌ {} not found (frame capture disabled)", tool.display());
                ready = false;
            }
        }
    }

    match create_describer(&config.llm) {
        Ok(describer) => {
            if describer.is_available().await {
                info!("✅ {:?} API reachable with model {}", describer.provider_type(), config.llm.model);
            } else {
                info!("❌ {:?} API not reachable, check the API key", describer.provider_type());
                ready = false;
            }
        }
        Err(e) => {
            info!("❌ {}", e);
            info!("💡 Set MODOP_API_KEY or GEMINI_API_KEY, or llm.api_key in modop-studio.toml");
            ready = false;
        }
    }

    if ready {
        info!("🎉 All components ready!");
        info!("💡 Try: modop-studio analyze demo.mp4 -f markdown,wiki");
    }

    Ok(())
}
