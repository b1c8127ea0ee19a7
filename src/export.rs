use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;

use crate::config::ExportFormat;
use crate::llm::LLMProvider;
use crate::processing::ModopDocument;
use crate::steps::StepRecord;

/// Name of the frame file for step `index` (0-based)
pub fn frame_file_name(index: usize, step: &StepRecord) -> Option<String> {
    step.frame
        .as_ref()
        .map(|frame| format!("step_{:02}.{}", index + 1, frame.extension()))
}

#[derive(Debug, Serialize)]
struct ExportedDocument<'a> {
    video: String,
    summary: &'a str,
    generated_at: DateTime<Utc>,
    provider: Option<LLMProvider>,
    model: Option<&'a str>,
    steps: Vec<ExportedStep<'a>>,
}

#[derive(Debug, Serialize)]
struct ExportedStep<'a> {
    index: usize,
    title: &'a str,
    description: &'a str,
    timestamp: &'a str,
    frame: Option<String>,
}

/// Writes a document in the requested formats under one output directory
pub struct DocumentExporter {
    out_dir: PathBuf,
}

impl DocumentExporter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    fn frames_dir_name(document: &ModopDocument) -> String {
        format!("{}_frames", document.stem())
    }

    /// Export in every format, returning the written paths
    pub async fn export(&self, document: &ModopDocument, formats: &[ExportFormat]) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.out_dir).await?;

        let mut written = Vec::new();
        let needs_frame_dir = formats
            .iter()
            .any(|f| matches!(f, ExportFormat::Json | ExportFormat::Markdown));

        let frame_paths = if needs_frame_dir {
            self.write_frames(document).await?
        } else {
            vec![None; document.steps.len()]
        };
        written.extend(frame_paths.iter().flatten().map(|rel| self.out_dir.join(rel)));

        for format in formats {
            let path = match format {
                ExportFormat::Json => self.write_json(document, &frame_paths).await?,
                ExportFormat::Markdown => self.write_markdown(document, &frame_paths).await?,
                ExportFormat::Wiki => self.write_wiki_bundle(document).await?,
            };
            info!("💾 Exported {:?}: {}", format, path.display());
            written.push(path);
        }

        Ok(written)
    }

    /// Keep the untouched AI answer for later `render` runs
    pub async fn save_raw_response(&self, document: &ModopDocument) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.out_dir).await?;
        let path = self.out_dir.join(format!("{}_response.txt", document.stem()));
        tokio::fs::write(&path, &document.raw_response).await?;
        Ok(path)
    }

    /// Frame files relative to the output directory, one slot per step
    async fn write_frames(&self, document: &ModopDocument) -> Result<Vec<Option<String>>> {
        let dir_name = Self::frames_dir_name(document);
        let mut paths = Vec::with_capacity(document.steps.len());

        for (i, step) in document.steps.iter().enumerate() {
            match (&step.frame, frame_file_name(i, step)) {
                (Some(frame), Some(name)) => {
                    let dir = self.out_dir.join(&dir_name);
                    tokio::fs::create_dir_all(&dir).await?;
                    frame.save_to(&dir.join(&name)).await?;
                    paths.push(Some(format!("{}/{}", dir_name, name)));
                }
                _ => paths.push(None),
            }
        }

        debug!("Wrote {} frame files", paths.iter().flatten().count());
        Ok(paths)
    }

    async fn write_json(&self, document: &ModopDocument, frame_paths: &[Option<String>]) -> Result<PathBuf> {
        let exported = ExportedDocument {
            video: document.video_path.display().to_string(),
            summary: &document.summary,
            generated_at: document.generated_at,
            provider: document.provider,
            model: document.model.as_deref(),
            steps: document
                .steps
                .iter()
                .enumerate()
                .map(|(i, step)| ExportedStep {
                    index: i + 1,
                    title: &step.title,
                    description: &step.description,
                    timestamp: &step.timestamp,
                    frame: frame_paths.get(i).cloned().flatten(),
                })
                .collect(),
        };

        let path = self.out_dir.join(format!("{}.json", document.stem()));
        tokio::fs::write(&path, serde_json::to_string_pretty(&exported)?).await?;
        Ok(path)
    }

    async fn write_markdown(&self, document: &ModopDocument, frame_paths: &[Option<String>]) -> Result<PathBuf> {
        let path = self.out_dir.join(format!("{}.md", document.stem()));
        tokio::fs::write(&path, render_markdown(document, frame_paths)).await?;
        Ok(path)
    }

    async fn write_wiki_bundle(&self, document: &ModopDocument) -> Result<PathBuf> {
        let bundle = build_wiki_bundle(document)?;
        let path = self.out_dir.join(format!("{}_wiki.zip", document.stem()));
        tokio::fs::write(&path, bundle).await?;
        Ok(path)
    }
}

pub fn render_markdown(document: &ModopDocument, frame_paths: &[Option<String>]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Mode opératoire : {}\n", document.stem());

    for line in document.summary.lines() {
        let _ = writeln!(out, "> {}", line);
    }
    out.push('\n');

    for (i, step) in document.steps.iter().enumerate() {
        let _ = writeln!(out, "## {}. {}\n", i + 1, step.title);
        let _ = writeln!(out, "*{}*\n", step.timestamp);
        if !step.description.is_empty() {
            let _ = writeln!(out, "{}\n", step.description);
        }
        if let Some(Some(frame)) = frame_paths.get(i) {
            // angle brackets let the destination contain spaces
            let _ = writeln!(out, "![{}](<{}>)\n", step.title, frame);
        }
    }

    out
}

/// Confluence wiki markup, escaping the characters that would start macros or links
pub fn escape_wiki(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '{' | '}' | '[' | ']' | '!' | '|' | '*' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn render_wiki(document: &ModopDocument) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "h1. Mode opératoire : {}\n", escape_wiki(&document.stem()));
    let _ = writeln!(out, "{{panel:title=Résumé}}\n{}\n{{panel}}\n", escape_wiki(&document.summary));

    for (i, step) in document.steps.iter().enumerate() {
        let _ = writeln!(out, "h2. {}. {}\n", i + 1, escape_wiki(&step.title));
        let _ = writeln!(out, "_{}_\n", escape_wiki(&step.timestamp));
        if !step.description.is_empty() {
            let _ = writeln!(out, "{}\n", escape_wiki(&step.description));
        }
        if let Some(name) = frame_file_name(i, step) {
            let _ = writeln!(out, "!{}!\n", name);
        }
    }

    out
}

/// Zip holding `page.wiki` plus the referenced images as attachments
pub fn build_wiki_bundle(document: &ModopDocument) -> Result<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));

    writer.start_file("page.wiki", options)?;
    writer.write_all(render_wiki(document).as_bytes())?;

    for (i, step) in document.steps.iter().enumerate() {
        if let (Some(frame), Some(name)) = (&step.frame, frame_file_name(i, step)) {
            // images are already compressed
            writer.start_file(name, options.compression_method(zip::CompressionMethod::Stored))?;
            writer.write_all(&frame.data)?;
        }
    }

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{FrameFormat, StillFrame};
    use std::io::Read;
    use tempfile::TempDir;

    fn document() -> ModopDocument {
        let mut with_frame = StepRecord::new("Open [menu]", "Click File", "00:05");
        with_frame.frame = Some(StillFrame {
            data: vec![1, 2, 3],
            width: 1,
            height: 1,
            format: FrameFormat::Png,
            frame_index: 150,
            offset_seconds: 5,
        });

        ModopDocument {
            video_path: PathBuf::from("/videos/demo.mp4"),
            summary: "Overview".to_string(),
            steps: vec![with_frame, StepRecord::new("Save", "", "01:10")],
            raw_response: "raw".to_string(),
            provider: Some(LLMProvider::Gemini),
            model: Some("gemini-1.5-flash".to_string()),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_markdown_layout() {
        let doc = document();
        let md = render_markdown(&doc, &[Some("demo_frames/step_01.png".to_string()), None]);
        assert!(md.starts_with("# Mode opératoire : demo"));
        assert!(md.contains("> Overview"));
        assert!(md.contains("## 1. Open [menu]"));
        assert!(md.contains("![Open [menu]](<demo_frames/step_01.png>)"));
        assert!(md.contains("## 2. Save"));
    }

    #[test]
    fn test_markdown_image_path_with_spaces() {
        let mut doc = document();
        doc.video_path = PathBuf::from("/Users/me/Screen Recording 2024-05-01.mov");
        let frame = format!("{}_frames/step_01.png", doc.stem());

        let md = render_markdown(&doc, &[Some(frame), None]);
        assert!(md.starts_with("# Mode opératoire : Screen Recording 2024-05-01"));
        assert!(md.contains("![Open [menu]](<Screen Recording 2024-05-01_frames/step_01.png>)"));
    }

    #[test]
    fn test_wiki_markup_escapes() {
        let wiki = render_wiki(&document());
        assert!(wiki.contains("h2. 1. Open \\[menu\\]"));
        assert!(wiki.contains("!step_01.png!"));
        assert!(!wiki.contains("step_02"));
    }

    #[test]
    fn test_wiki_bundle_contents() {
        let bundle = build_wiki_bundle(&document()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bundle)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut page = String::new();
        archive.by_name("page.wiki").unwrap().read_to_string(&mut page).unwrap();
        assert!(page.contains("h1. Mode opératoire"));

        let mut image = Vec::new();
        archive.by_name("step_01.png").unwrap().read_to_end(&mut image).unwrap();
        assert_eq!(image, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_export_all_formats() {
        let dir = TempDir::new().unwrap();
        let exporter = DocumentExporter::new(dir.path());
        let doc = document();

        let written = exporter
            .export(&doc, &[ExportFormat::Json, ExportFormat::Markdown, ExportFormat::Wiki])
            .await
            .unwrap();

        assert!(written.iter().all(|p| p.exists()));
        assert!(dir.path().join("demo_frames/step_01.png").exists());
        assert!(dir.path().join("demo_wiki.zip").exists());

        let json: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(dir.path().join("demo.json")).await.unwrap()).unwrap();
        assert_eq!(json["steps"][0]["frame"], "demo_frames/step_01.png");
        assert!(json["steps"][1]["frame"].is_null());
        assert_eq!(json["summary"], "Overview");
    }

    #[tokio::test]
    async fn test_save_raw_response() {
        let dir = TempDir::new().unwrap();
        let path = DocumentExporter::new(dir.path()).save_raw_response(&document()).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(path).await.unwrap(), "raw");
    }
}
