use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use mediaforge::{
    Config, Delivery, EditContext, MediaContext, MediaKind, ProbeInput, Publisher, Rendered,
    Runner, SvgTextRenderer, Target, TextLayer,
};

#[derive(Parser, Debug)]
#[command(name = "mediaforge", version)]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the number of concurrent ffmpeg/ffprobe processes.
    #[arg(long, global = true)]
    max_processes: Option<usize>,

    /// Override the GIF pipeline worker count.
    #[arg(long, global = true)]
    gif_workers: Option<usize>,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply comma-separated edit directives (requires `ffmpeg`).
    Edit(EditCmd),
    /// Draw top/bottom meme text.
    Meme(MemeCmd),
    /// Add a caption bar above the media.
    Caption(CaptionCmd),
    /// Convert a video to an animated GIF (requires `ffmpeg`).
    Gif(Io),
    /// Remove a caption bar.
    Uncaption(Io),
    /// Print stream information as JSON (requires `ffprobe`).
    Probe(ProbeCmd),
}

#[derive(Args, Debug)]
struct Io {
    /// Input media file.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output path; the extension is not changed to match the produced format.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct EditCmd {
    #[command(flatten)]
    io: Io,

    /// Directives, e.g. "speed 2, reverse, cap hello".
    #[arg(long)]
    args: String,
}

#[derive(Args, Debug)]
struct MemeCmd {
    #[command(flatten)]
    io: Io,

    #[arg(long, default_value = "")]
    top: String,

    #[arg(long, default_value = "")]
    bottom: String,
}

#[derive(Args, Debug)]
struct CaptionCmd {
    #[command(flatten)]
    io: Io,

    /// Caption text.
    #[arg(long)]
    text: String,
}

#[derive(Args, Debug)]
struct ProbeCmd {
    /// Input media file.
    #[arg(long = "in")]
    in_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let cfg = load_config(&cli)?;
    let runner = Runner::from_config(&cfg)?;
    let renderer = SvgTextRenderer::new();
    let ctx = MediaContext::from_config(&cfg, &runner, &renderer);

    match cli.cmd {
        Command::Edit(cmd) => {
            let directives = mediaforge::parse_edit_arguments(&cmd.args)?;
            let input = File::open(&cmd.io.in_path)
                .with_context(|| format!("open input '{}'", cmd.io.in_path.display()))?;
            let kind = MediaKind::from_path(&cmd.io.in_path);
            let edit_ctx = EditContext::new(&renderer).with_default_length(cfg.default_length_secs);
            mediaforge::bridge::output::ensure_parent_dir(&cmd.io.out)?;
            mediaforge::apply_edits(
                &runner,
                &directives,
                kind.edit_input(),
                &input,
                Target::Path(cmd.io.out.clone()),
                &edit_ctx,
            )?;
            deliver(&cfg, &cmd.io.out)
        }
        Command::Meme(cmd) => {
            let layer = TextLayer::Meme {
                top: cmd.top,
                bottom: cmd.bottom,
            };
            let kind = MediaKind::from_path(&cmd.io.in_path);
            let out = mediaforge::media::composite_media(&ctx, kind, &cmd.io.in_path, &layer)?;
            save_and_deliver(&cfg, out, &cmd.io.out)
        }
        Command::Caption(cmd) => {
            let layer = TextLayer::Caption(cmd.text);
            let kind = MediaKind::from_path(&cmd.io.in_path);
            let out = mediaforge::media::composite_media(&ctx, kind, &cmd.io.in_path, &layer)?;
            save_and_deliver(&cfg, out, &cmd.io.out)
        }
        Command::Gif(io) => {
            let out = mediaforge::media::video_to_gif(&ctx, &io.in_path)?;
            save_and_deliver(&cfg, out, &io.out)
        }
        Command::Uncaption(io) => {
            let kind = MediaKind::from_path(&io.in_path);
            let out = mediaforge::media::uncaption(&ctx, kind, &io.in_path)?;
            save_and_deliver(&cfg, out, &io.out)
        }
        Command::Probe(cmd) => {
            let info = runner.probe(ProbeInput::Path(&cmd.in_path))?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    if let Some(n) = cli.max_processes {
        cfg.max_processes = n;
    }
    if let Some(n) = cli.gif_workers {
        cfg.gif_workers = n;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn save_and_deliver(cfg: &Config, out: Rendered, dest: &Path) -> anyhow::Result<()> {
    let format = out.format;
    let bytes = out
        .save(dest)
        .with_context(|| format!("write output '{}'", dest.display()))?;
    tracing::info!(bytes, format, "output written");
    deliver(cfg, dest)
}

fn deliver(cfg: &Config, path: &Path) -> anyhow::Result<()> {
    match Publisher::from_config(cfg)?.deliver(path)? {
        Delivery::Attach(path) => eprintln!("wrote {}", path.display()),
        Delivery::Link(url) => println!("{url}"),
    }
    Ok(())
}
