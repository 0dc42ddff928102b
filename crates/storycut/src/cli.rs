use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use engine::draft::draft_name;
use engine::story::{parse_story_document, RawStory};
use engine::timecode::microseconds_to_seconds;
use engine::OuterSpeed;

use crate::config::StorycutConfig;
use crate::media::FFmpegWrapper;
use crate::pipeline::Pipeline;
use crate::project::video_id_for;
use crate::render::ExportClient;

/// Turn analysed stories into rendered short videos
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synthesize one story and write its draft folder
    Synthesize(SynthesizeArgs),
    /// Cut a rendered story into length-bounded chunks
    Split(SplitArgs),
    /// Synthesize, render and split every story in a project cache
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct SynthesizeArgs {
    /// Story JSON (a single story or a list, first one used)
    #[arg(long)]
    pub story: PathBuf,
    /// Source video the story's spans refer to
    #[arg(long)]
    pub video: PathBuf,
    /// Prefix for the draft name (defaults to the video file stem)
    #[arg(long)]
    pub video_id: Option<String>,
    #[arg(long, default_value_t = 1)]
    pub story_number: usize,
}

#[derive(Args, Debug)]
pub struct SplitArgs {
    #[arg(long)]
    pub story: PathBuf,
    /// Rendered story video
    #[arg(long)]
    pub rendered: PathBuf,
    /// Outer speed the story was rendered at
    #[arg(long)]
    pub outer_speed: Option<f64>,
    /// Source video, required for placed boundaries
    #[arg(long)]
    pub video: Option<PathBuf>,
    /// Print the split plan as JSON without cutting
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Project cache JSON
    #[arg(long)]
    pub project: PathBuf,
}

fn read_story(path: &Path) -> Result<RawStory> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read story {}", path.display()))?;
    parse_story_document(&text).with_context(|| format!("Failed to parse story {}", path.display()))
}

fn build_pipeline(config: StorycutConfig) -> Result<Pipeline> {
    let media = Arc::new(FFmpegWrapper::new(&config.media));
    let renderer = Arc::new(ExportClient::new(&config.render)?);
    Ok(Pipeline::new(config, media, renderer))
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = StorycutConfig::load(cli.config.as_deref())?;
    let pipeline = build_pipeline(config)?;

    match cli.command {
        Commands::Synthesize(args) => synthesize(&pipeline, args).await,
        Commands::Split(args) => split(&pipeline, args).await,
        Commands::Run(args) => run_project(&pipeline, args).await,
    }
}

async fn synthesize(pipeline: &Pipeline, args: SynthesizeArgs) -> Result<()> {
    let raw = read_story(&args.story)?;
    let video_id = args
        .video_id
        .unwrap_or_else(|| video_id_for(&args.video));
    let name = draft_name(&video_id, args.story_number, &raw.story_title);

    let drafted = pipeline.synthesize_story(raw, &args.video, &name).await?;
    let speed = &drafted.synthesis.speed;
    let summary = json!({
        "draft_name": drafted.draft_name,
        "draft_path": drafted.draft_dir,
        "outer_speed": speed.outer_speed.value(),
        "required_speed": speed.required_speed,
        "nested_seconds": microseconds_to_seconds(speed.nested_duration),
        "final_seconds": microseconds_to_seconds(speed.final_duration),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn split(pipeline: &Pipeline, args: SplitArgs) -> Result<()> {
    let raw = read_story(&args.story)?;

    let (story, synthesis) = match &args.video {
        Some(video) => {
            let (story, synthesis) = pipeline.synthesize(raw, video).await?;
            (story, Some(synthesis))
        }
        None => (engine::story::Story::from_raw(raw)?.0, None),
    };

    let outer_speed = match (args.outer_speed, &synthesis) {
        (Some(value), _) => OuterSpeed::new(value)?,
        (None, Some(synthesis)) => synthesis.speed.outer_speed,
        (None, None) => anyhow::bail!("--outer-speed is required unless --video is given"),
    };

    let boundaries = pipeline.boundaries(&story, synthesis.as_ref().map(|s| &s.timeline))?;

    if args.dry_run {
        let plan = pipeline.plan_split(&boundaries, outer_speed)?;
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let outcome = pipeline
        .split_rendered(&args.rendered, &boundaries, outer_speed)
        .await?;
    println!("{}", serde_json::to_string_pretty(&outcome.chunks())?);
    Ok(())
}

async fn run_project(pipeline: &Pipeline, args: RunArgs) -> Result<()> {
    let report = pipeline.run_project(&args.project).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.failures.is_empty() {
        anyhow::bail!(
            "{} of {} stories failed",
            report.failures.len(),
            report.failures.len() + report.completed
        );
    }
    Ok(())
}
