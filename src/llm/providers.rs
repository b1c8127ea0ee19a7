use super::{LLMConfig, LLMProvider, LLMResponse, VideoDescriber};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini provider: File API upload, readiness polling, then generateContent
pub struct GeminiProvider {
    config: LLMConfig,
    client: reqwest::Client,
    base_url: String,
}

/// Processing state of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    Processing,
    Active,
    Failed,
    #[serde(other)]
    Unspecified,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiFile {
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default = "unspecified_state")]
    pub state: FileState,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

fn unspecified_state() -> FileState {
    FileState::Unspecified
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: GeminiFile,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "fileData", default, skip_serializing_if = "Option::is_none")]
    file_data: Option<GeminiFileData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFileData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(rename = "fileUri")]
    file_uri: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "totalTokenCount")]
    total_token_count: u32,
}

/// MIME type the File API expects for a video extension
pub fn video_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("mpeg") | Some("mpg") => "video/mpeg",
        _ => "video/mp4",
    }
}

impl GeminiProvider {
    pub fn new(config: LLMConfig) -> Result<Self> {
        if config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(anyhow!("Gemini API key required"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        let base_url = config
            .endpoint
            .clone()
            .unwrap_or_else(|| GEMINI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self { config, client, base_url })
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("Gemini API key not configured"))
    }

    /// Resumable upload: start a session, then send the bytes and finalize
    async fn upload(&self, video: &Path) -> Result<GeminiFile> {
        let api_key = self.api_key()?;
        let bytes = tokio::fs::read(video).await?;
        let mime_type = video_mime_type(video);
        let display_name = video
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());

        info!("⬆️ Uploading {} ({} bytes) to Gemini", display_name, bytes.len());

        let start = self
            .client
            .post(format!("{}/upload/v1beta/files?key={}", self.base_url, api_key))
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;

        if !start.status().is_success() {
            let status = start.status();
            let text = start.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini upload start error {}: {}", status, text));
        }

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Gemini did not return an upload URL"))?;

        let response = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini upload error {}: {}", status, text));
        }

        let uploaded: UploadResponse = response.json().await?;
        debug!("Uploaded as {} ({:?})", uploaded.file.name, uploaded.file.state);
        Ok(uploaded.file)
    }

    async fn get_file(&self, name: &str) -> Result<GeminiFile> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .get(format!("{}/v1beta/{}?key={}", self.base_url, name, api_key))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini file status error {}: {}", status, text));
        }

        Ok(response.json().await?)
    }

    /// Poll until the uploaded video can be referenced in a prompt
    async fn wait_until_active(&self, mut file: GeminiFile) -> Result<GeminiFile> {
        let interval = Duration::from_secs(self.config.poll_interval_seconds);

        for attempt in 1..=self.config.max_poll_attempts {
            match file.state {
                FileState::Active => return Ok(file),
                FileState::Failed => {
                    return Err(anyhow!(
                        "Gemini failed to process {}: {}",
                        file.name,
                        file.error.map(|e| e.to_string()).unwrap_or_default()
                    ));
                }
                FileState::Processing | FileState::Unspecified => {
                    debug!("⏳ {} still processing (check {})", file.name, attempt);
                    tokio::time::sleep(interval).await;
                    file = self.get_file(&file.name).await?;
                }
            }
        }

        if file.state == FileState::Active {
            return Ok(file);
        }

        Err(anyhow!(
            "{} not ready after {} checks",
            file.name,
            self.config.max_poll_attempts
        ))
    }

    async fn generate(&self, file: &GeminiFile, prompt: &str) -> Result<LLMResponse> {
        let api_key = self.api_key()?;
        let request = build_request(&self.config, file, prompt);

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.config.model, api_key
        );

        debug!("Sending generateContent request to Gemini ({})", self.config.model);

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error {}: {}", status, text));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        let content = response_text(&gemini_response)?;

        Ok(LLMResponse {
            content,
            tokens_used: gemini_response.usage_metadata.map(|u| u.total_token_count),
            model: self.config.model.clone(),
        })
    }

    async fn delete_file(&self, name: &str) {
        let Ok(api_key) = self.api_key() else { return };
        let url = format!("{}/v1beta/{}?key={}", self.base_url, name, api_key);

        match self.client.delete(&url).send().await {
            Ok(response) if response.status().is_success() => debug!("🗑️ Deleted {}", name),
            Ok(response) => warn!("Could not delete {}: HTTP {}", name, response.status()),
            Err(e) => warn!("Could not delete {}: {}", name, e),
        }
    }
}

fn build_request(config: &LLMConfig, file: &GeminiFile, prompt: &str) -> GeminiRequest {
    let mime_type = file.mime_type.clone().unwrap_or_else(|| "video/mp4".to_string());

    GeminiRequest {
        contents: vec![GeminiContent {
            role: Some("user".to_string()),
            parts: vec![
                GeminiPart {
                    file_data: Some(GeminiFileData {
                        mime_type,
                        file_uri: file.uri.clone(),
                    }),
                    ..Default::default()
                },
                GeminiPart {
                    text: Some(prompt.to_string()),
                    ..Default::default()
                },
            ],
        }],
        generation_config: GeminiGenerationConfig {
            max_output_tokens: config.max_tokens,
            temperature: config.temperature,
        },
    }
}

/// All text parts of the first candidate, in order
fn response_text(response: &GeminiResponse) -> Result<String> {
    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| anyhow!("No response from Gemini"))?;

    let text = candidate
        .content
        .as_ref()
        .map(|c| {
            c.parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(anyhow!(
            "Gemini returned no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ));
    }

    Ok(text)
}

#[async_trait]
impl VideoDescriber for GeminiProvider {
    async fn describe(&self, video: &Path, prompt: &str) -> Result<LLMResponse> {
        let uploaded = self.upload(video).await?;
        let name = uploaded.name.clone();

        let result = match self.wait_until_active(uploaded).await {
            Ok(file) => {
                info!("✅ {} is ready, asking {} for the steps", file.name, self.config.model);
                self.generate(&file, prompt).await
            }
            Err(e) => Err(e),
        };

        if self.config.delete_uploaded_files {
            self.delete_file(&name).await;
        }

        result
    }

    async fn is_available(&self) -> bool {
        let Ok(api_key) = self.api_key() else { return false };
        let url = format!("{}/v1beta/models?key={}", self.base_url, api_key);

        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn provider_type(&self) -> LLMProvider {
        LLMProvider::Gemini
    }
}
