use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "hilite", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render highlight overlays and subtitles onto a video (requires
    /// `ffmpeg`/`ffprobe` on PATH).
    Render(RenderArgs),
    /// Print probed metadata for a media file.
    Probe(ProbeArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Path to the main video file.
    #[arg(long = "main-video")]
    main_video: Option<PathBuf>,

    /// Destination for the rendered video.
    #[arg(long, default_value = "output.mp4")]
    output: PathBuf,

    /// JSON file describing highlights, captions, and design overrides.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Media file to probe.
    #[arg(long = "in")]
    in_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Probe(args) => cmd_probe(args),
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => hilite::ProjectConfig::from_json_file(path)
            .with_context(|| format!("load project config '{}'", path.display()))?,
        None => hilite::ProjectConfig::default(),
    };

    if let Some(main_video) = args.main_video {
        config.main_video_path = main_video;
    }
    if config.main_video_path.as_os_str().is_empty() {
        anyhow::bail!("please provide --main-video (or set main_video_path in the config)");
    }
    config.output_path = args.output;

    let report = hilite::render_project(&config)?;
    eprintln!("wrote {}", report.output_path.display());
    Ok(())
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let meta = hilite::probe_video(&args.in_path)?;
    println!("path:      {}", meta.source_path.display());
    println!("size:      {}x{}", meta.width, meta.height);
    println!("fps:       {}/{}", meta.fps.num, meta.fps.den);
    println!("frames:    {}", meta.frame_count);
    println!("duration:  {:.3}s", meta.duration);
    println!("has_audio: {}", meta.has_audio);
    Ok(())
}
