use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use modop_studio::{
    create_describer, init_logging, steps, Config, DocumentExporter, ExportFormat, FrameSampler, ModopDocument,
    ModopPipeline, PipelineStats,
};

fn cli() -> Command {
    let output_dir = Arg::new("output-dir")
        .short('o')
        .long("output-dir")
        .value_name("DIR")
        .value_parser(value_parser!(PathBuf))
        .help("Output directory for the guide (defaults to output.base_dir)");

    let formats = Arg::new("format")
        .short('f')
        .long("format")
        .value_name("FORMATS")
        .value_delimiter(',')
        .action(ArgAction::Append)
        .help("Export formats: json, markdown, wiki");

    Command::new("Modop Studio")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Turns screen-recorded demo videos into illustrated step-by-step guides")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Configuration file (TOML)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("analyze")
                .about("Describe a video (or every video in a directory) with the AI service and export the guide")
                .arg(
                    Arg::new("video")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Video file or directory"),
                )
                .arg(output_dir.clone())
                .arg(formats.clone()),
        )
        .subcommand(
            Command::new("render")
                .about("Build the guide from a saved AI response, without calling the service")
                .arg(Arg::new("video").required(true).value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("response").required(true).value_parser(value_parser!(PathBuf)))
                .arg(output_dir.clone())
                .arg(formats),
        )
        .subcommand(
            Command::new("parse")
                .about("Print the steps found in a saved AI response as JSON")
                .arg(Arg::new("response").required(true).value_parser(value_parser!(PathBuf))),
        )
        .subcommand(
            Command::new("frame")
                .about("Capture the frame at a timestamp (SS or MM:SS)")
                .arg(Arg::new("video").required(true).value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("timestamp").required(true))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let verbose = matches.get_flag("verbose");

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };

    init_logging(&config.output.log_level, verbose);
    config.validate()?;
    debug!("{}", config.summary());

    match matches.subcommand() {
        Some(("analyze", sub)) => analyze(config, sub).await,
        Some(("render", sub)) => render(config, sub).await,
        Some(("parse", sub)) => parse_response(sub).await,
        Some(("frame", sub)) => frame(config, sub).await,
        _ => Err(anyhow!("Unknown command")),
    }
}

fn export_formats(config: &Config, matches: &ArgMatches) -> Result<Vec<ExportFormat>> {
    match matches.get_many::<String>("format") {
        Some(values) => values.map(|v| ExportFormat::parse(v)).collect(),
        None => Ok(config.output.export_formats.clone()),
    }
}

fn output_dir(config: &Config, matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<PathBuf>("output-dir")
        .cloned()
        .unwrap_or_else(|| config.output.base_dir.clone())
}

fn required_path<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a PathBuf> {
    matches
        .get_one::<PathBuf>(name)
        .ok_or_else(|| anyhow!("missing <{}>", name))
}

async fn analyze(config: Config, matches: &ArgMatches) -> Result<()> {
    let input = required_path(matches, "video")?;
    let formats = export_formats(&config, matches)?;
    let out_dir = output_dir(&config, matches);

    config.require_api_key()?;
    let describer = create_describer(&config.llm)?;
    let pipeline = ModopPipeline::new(config.clone(), Some(describer));

    let videos = if input.is_dir() {
        pipeline.video_processor().discover_videos(input).await?
    } else {
        vec![input.clone()]
    };

    if videos.is_empty() {
        return Err(anyhow!("No supported video found in {}", input.display()));
    }

    info!("🚀 Modop Studio starting on {} video(s)", videos.len());
    info!("📂 Output directory: {}", out_dir.display());

    let start_time = std::time::Instant::now();
    let mut successful = 0;
    let mut failed = 0;

    for video in &videos {
        let target = if videos.len() > 1 {
            out_dir.join(file_stem(video))
        } else {
            out_dir.clone()
        };

        let outcome = match pipeline.run(video).await {
            Ok((document, stats)) => finish(&config, &document, &stats, &target, &formats).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => successful += 1,
            Err(e) => {
                error!("❌ {}: {}", video.display(), e);
                failed += 1;
            }
        }
    }

    info!("🎉 Processing completed in {:.2}s", start_time.elapsed().as_secs_f64());
    info!("✅ Successful: {}", successful);
    info!("❌ Failed: {}", failed);

    if successful == 0 {
        return Err(anyhow!("No guide could be produced"));
    }
    Ok(())
}

async fn render(config: Config, matches: &ArgMatches) -> Result<()> {
    let video = required_path(matches, "video")?;
    let response_path = required_path(matches, "response")?;
    let formats = export_formats(&config, matches)?;
    let out_dir = output_dir(&config, matches);

    let raw = tokio::fs::read_to_string(response_path)
        .await
        .map_err(|e| anyhow!("Cannot read {}: {}", response_path.display(), e))?;

    let pipeline = ModopPipeline::new(config.clone(), None);
    let (document, stats) = pipeline.render(video, &raw).await?;

    // the response is already on disk
    let mut config = config;
    config.output.save_raw_response = false;
    finish(&config, &document, &stats, &out_dir, &formats).await
}

/// Export a finished document; an empty guide is reported as a failure
async fn finish(
    config: &Config,
    document: &ModopDocument,
    stats: &PipelineStats,
    out_dir: &Path,
    formats: &[ExportFormat],
) -> Result<()> {
    let exporter = DocumentExporter::new(out_dir);

    if config.output.save_raw_response {
        let path = exporter.save_raw_response(document).await?;
        debug!("Raw response saved to {}", path.display());
    }

    if document.steps.is_empty() {
        return Err(anyhow!("The AI response contained no usable step"));
    }

    if stats.frames_missing > 0 && !config.processing.skip_frames {
        warn!("⚠️ {} of {} steps have no illustration", stats.frames_missing, stats.steps_found);
    }

    let written = exporter.export(document, formats).await?;
    info!(
        "📘 {}: {} steps, {} frames, {} files written",
        document.stem(),
        document.steps.len(),
        document.frames_captured(),
        written.len()
    );
    Ok(())
}

async fn parse_response(matches: &ArgMatches) -> Result<()> {
    let response_path = required_path(matches, "response")?;
    let raw = tokio::fs::read_to_string(response_path).await?;
    let result = steps::parse(&raw);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn frame(config: Config, matches: &ArgMatches) -> Result<()> {
    let video = required_path(matches, "video")?;
    let timestamp = matches
        .get_one::<String>("timestamp")
        .ok_or_else(|| anyhow!("missing <timestamp>"))?;

    let sampler = FrameSampler::new(config.frames.clone());
    let still = sampler
        .try_sample(video, timestamp)
        .await
        .map_err(|e| anyhow!("No frame available: {}", e))?;

    let output = matches.get_one::<PathBuf>("output").cloned().unwrap_or_else(|| {
        PathBuf::from(format!(
            "{}_{}s.{}",
            file_stem(video),
            still.offset_seconds,
            still.extension()
        ))
    });

    still.save_to(&output).await?;
    info!(
        "🖼️ Frame {} ({}x{}) saved to {}",
        still.frame_index,
        still.width,
        still.height,
        output.display()
    );
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn test_format_list() {
        let matches = cli().get_matches_from(["modop-studio", "render", "a.mp4", "r.txt", "-f", "json,wiki"]);
        let (_, sub) = matches.subcommand().unwrap();
        let formats = export_formats(&Config::default(), sub).unwrap();
        assert_eq!(formats, vec![ExportFormat::Json, ExportFormat::Wiki]);
    }
}
