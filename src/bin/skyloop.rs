use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use chrono::SecondsFormat;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use skyloop::config::TimelineMode;
use skyloop::export::job::{ExportEvent, Stage};
use skyloop::export::layout::grid_layout;
use skyloop::{
    Catalog, Clock, ExportFormat, ExportOutcome, Fetcher, Frame, FrameLister, FramePreloader,
    FrameServiceClient, Grammar, HttpFetcher, ImageProxy, ListingBackend, PlaybackEvent,
    PlaybackSession, PreloadOptions, Resolution, SequenceResolver, Settings, SkyloopError,
    SystemClock, VerifiedImageSet, build_timeline, export_sequence, extract_timestamp,
    start_playback,
};

#[derive(Parser, Debug)]
#[command(name = "skyloop", version)]
struct Cli {
    /// Settings JSON; absent fields keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recover timestamps from filenames.
    Extract(ExtractArgs),
    /// List the frames of one source.
    Frames(FramesArgs),
    /// Align several sources and print the merged timeline.
    Timeline(TimelineArgs),
    /// Export an animation artifact (webm/mp4 need `ffmpeg` on PATH).
    Export(ExportArgs),
    /// Drive playback of one source and log what would be displayed.
    Play(PlayArgs),
    /// Print the grid layout used for `n` sources.
    Grid(GridArgs),
}

#[derive(Parser, Debug)]
struct ExtractArgs {
    /// Grammar id, e.g. `compact_minute`.
    #[arg(long)]
    grammar: String,

    /// Filenames to parse.
    #[arg(required = true)]
    filenames: Vec<String>,
}

#[derive(Parser, Debug)]
struct FramesArgs {
    /// Catalog JSON.
    #[arg(long)]
    catalog: PathBuf,

    /// Source key.
    #[arg(long)]
    source: String,

    /// Look-back window in hours (defaults to the configured value).
    #[arg(long)]
    hours: Option<u32>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyChoice {
    Strict,
    Progressive,
}

#[derive(Parser, Debug)]
struct TimelineArgs {
    /// Catalog JSON.
    #[arg(long)]
    catalog: PathBuf,

    /// Source keys to align.
    #[arg(long = "source", required = true)]
    sources: Vec<String>,

    /// Look-back window in hours.
    #[arg(long)]
    hours: Option<u32>,

    /// Alignment preset (defaults to the configured mode).
    #[arg(long, value_enum)]
    policy: Option<PolicyChoice>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Webm,
    Mp4,
    Gif,
}

impl From<FormatChoice> for ExportFormat {
    fn from(f: FormatChoice) -> Self {
        match f {
            FormatChoice::Webm => ExportFormat::Webm,
            FormatChoice::Mp4 => ExportFormat::Mp4,
            FormatChoice::Gif => ExportFormat::Gif,
        }
    }
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Catalog JSON.
    #[arg(long)]
    catalog: PathBuf,

    /// One source for a single view, several for a grid.
    #[arg(long = "source", required = true)]
    sources: Vec<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = FormatChoice::Gif)]
    format: FormatChoice,

    /// Output directory.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Look-back window in hours.
    #[arg(long)]
    hours: Option<u32>,

    /// Alignment preset for grid exports.
    #[arg(long, value_enum)]
    policy: Option<PolicyChoice>,
}

#[derive(Parser, Debug)]
struct PlayArgs {
    /// Catalog JSON.
    #[arg(long)]
    catalog: PathBuf,

    /// Source key.
    #[arg(long)]
    source: String,

    /// Stop after this many seconds.
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Look-back window in hours.
    #[arg(long)]
    hours: Option<u32>,
}

#[derive(Parser, Debug)]
struct GridArgs {
    /// Number of sources.
    n: usize,
}

struct App {
    settings: Settings,
    catalog: Arc<Catalog>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
}

impl App {
    fn load(settings: Settings, catalog_path: &Path) -> anyhow::Result<Self> {
        let catalog = Catalog::from_path(catalog_path)
            .with_context(|| format!("load catalog '{}'", catalog_path.display()))?;
        let fetcher = HttpFetcher::new(&settings.http)?;
        Ok(Self {
            settings,
            catalog: Arc::new(catalog),
            fetcher: Arc::new(fetcher),
            clock: Arc::new(SystemClock),
        })
    }

    fn lister(&self) -> FrameLister {
        let backend = match self.settings.http.frame_service_url.as_deref() {
            Some(url) => {
                ListingBackend::Service(FrameServiceClient::new(url, self.fetcher.clone()))
            }
            None => ListingBackend::Directory,
        };
        FrameLister::new(
            self.catalog.clone(),
            self.fetcher.clone(),
            backend,
            self.clock.clone(),
            &self.settings.listing,
        )
    }

    fn preloader(&self) -> FramePreloader {
        FramePreloader::new(
            self.fetcher.clone(),
            Arc::new(VerifiedImageSet::new(self.settings.preload.verified_capacity)),
            PreloadOptions::from(&self.settings.preload),
        )
    }

    fn hours(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.settings.listing.hours_back)
    }

    fn timeline_policy(&self, choice: Option<PolicyChoice>) -> skyloop::TimelinePolicy {
        let mut timeline = self.settings.timeline.clone();
        match choice {
            Some(PolicyChoice::Strict) => timeline.mode = TimelineMode::Strict,
            Some(PolicyChoice::Progressive) => timeline.mode = TimelineMode::Progressive,
            None => {}
        }
        timeline.policy()
    }

    async fn timeline(
        &self,
        sources: &[String],
        hours: Option<u32>,
        policy: Option<PolicyChoice>,
    ) -> anyhow::Result<skyloop::Timeline> {
        for key in sources {
            self.catalog.require(key)?;
        }
        let lister = self.lister();
        let hours = self.hours(hours);
        let mut by_source = std::collections::HashMap::new();
        for key in sources {
            by_source.insert(key.clone(), lister.list(key, hours).await);
        }
        Ok(build_timeline(&by_source, sources, &self.timeline_policy(policy)))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = match cli.config.as_deref() {
        Some(path) => Settings::from_path(path)?,
        None => Settings::default(),
    };

    match cli.cmd {
        Command::Extract(args) => cmd_extract(args),
        Command::Grid(args) => cmd_grid(&settings, args),
        cmd => {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("build tokio runtime")?;
            rt.block_on(run_async(settings, cmd))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "skyloop=debug" } else { "skyloop=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_async(settings: Settings, cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Frames(args) => cmd_frames(settings, args).await,
        Command::Timeline(args) => cmd_timeline(settings, args).await,
        Command::Export(args) => cmd_export(settings, args).await,
        Command::Play(args) => cmd_play(settings, args).await,
        Command::Extract(_) | Command::Grid(_) => Ok(()),
    }
}

fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling");
            child.cancel();
        }
    });
    token
}

fn rfc3339(frame: &Frame) -> String {
    frame.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn cmd_extract(args: ExtractArgs) -> anyhow::Result<()> {
    let grammar: Grammar = args.grammar.parse()?;
    for name in &args.filenames {
        match extract_timestamp(name, grammar) {
            Some(at) => println!("{name}\t{}", at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => println!("{name}\tno match"),
        }
    }
    Ok(())
}

fn cmd_grid(settings: &Settings, args: GridArgs) -> anyhow::Result<()> {
    let canvas: Resolution = settings.export.resolution()?;
    let layout = grid_layout(args.n, canvas, 4.0);
    println!(
        "{} sources -> {} columns x {} rows",
        args.n, layout.dims.cols, layout.dims.rows
    );
    for (i, tile) in layout.tiles.iter().enumerate() {
        println!(
            "tile {i}: x={:.0} y={:.0} w={:.0} h={:.0}",
            tile.x0,
            tile.y0,
            tile.width(),
            tile.height()
        );
    }
    Ok(())
}

async fn cmd_frames(settings: Settings, args: FramesArgs) -> anyhow::Result<()> {
    let app = App::load(settings, &args.catalog)?;
    app.catalog.require(&args.source)?;
    let frames = app.lister().list(&args.source, app.hours(args.hours)).await;
    if frames.is_empty() {
        eprintln!("no frames available for '{}'", args.source);
    }
    for f in &frames {
        println!("{}\t{}", rfc3339(f), f.url);
    }
    Ok(())
}

async fn cmd_timeline(settings: Settings, args: TimelineArgs) -> anyhow::Result<()> {
    let app = App::load(settings, &args.catalog)?;
    let timeline = app.timeline(&args.sources, args.hours, args.policy).await?;
    if let Err(shortfall) = timeline.ensure_min_entries(1) {
        println!("{shortfall}");
        return Ok(());
    }
    for entry in &timeline.entries {
        let cells = timeline
            .sources
            .iter()
            .map(|k| match entry.frames.get(k) {
                Some(f) => format!("{k}={}", f.filename),
                None => format!("{k}=-"),
            })
            .collect::<Vec<_>>()
            .join("\t");
        println!(
            "{}\t{cells}",
            entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }
    Ok(())
}

async fn cmd_export(settings: Settings, args: ExportArgs) -> anyhow::Result<()> {
    let app = App::load(settings, &args.catalog)?;
    let cancel = ctrl_c_token();
    let resolver = SequenceResolver::new(
        app.fetcher.clone(),
        ImageProxy::from_config(app.settings.http.image_proxy_url.as_deref()),
        Duration::from_millis(app.settings.preload.item_timeout_ms),
    );

    let resolved = if let [key] = args.sources.as_slice() {
        let source = app.catalog.require(key)?;
        let frames = app.lister().list(key, app.hours(args.hours)).await;
        resolver.single(source, &frames, true, &cancel).await
    } else {
        let timeline = app.timeline(&args.sources, args.hours, args.policy).await?;
        timeline.ensure_min_entries(1)?;
        resolver.grid(&app.catalog, &timeline, &cancel).await
    };
    let sequence = match resolved {
        Ok(seq) => seq,
        Err(SkyloopError::Cancelled) => {
            println!("export cancelled");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ExportEvent::State(state) => info!(state = %state, "export state"),
                ExportEvent::Progress(p) if p.stage == Stage::Rendering => {
                    info!(current = p.current, total = p.total, "{}", p.stage.label())
                }
                ExportEvent::Progress(_) => {}
            }
        }
    });

    let outcome = export_sequence(
        &sequence,
        args.format.into(),
        &app.settings.export,
        &args.out_dir,
        app.clock.now(),
        &cancel,
        Some(tx),
    )
    .await?;
    let _ = progress.await;

    match outcome {
        ExportOutcome::Complete { artifact, frames } => {
            println!("{} ({frames} frames)", artifact.display());
            Ok(())
        }
        ExportOutcome::Cancelled => {
            println!("export cancelled");
            Ok(())
        }
        ExportOutcome::Failed(cause) => Err(anyhow::anyhow!("export failed: {cause}")),
    }
}

async fn cmd_play(settings: Settings, args: PlayArgs) -> anyhow::Result<()> {
    let app = App::load(settings, &args.catalog)?;
    let source = app.catalog.require(&args.source)?.clone();
    let cancel = ctrl_c_token();

    let frames = app.lister().list(&source.key, app.hours(args.hours)).await;
    let session = match start_playback(
        &source,
        frames,
        &app.preloader(),
        &app.settings.playback,
        &cancel,
    )
    .await
    {
        Ok(session) => session,
        Err(SkyloopError::Cancelled) => {
            println!("playback cancelled");
            return Ok(());
        }
        Err(err) => {
            return Err(anyhow::Error::new(err).context(format!(
                "source '{}' failed its health check; not animating",
                source.key
            )));
        }
    };
    let PlaybackSession {
        frames: playable,
        mut controller,
        mut events,
        ..
    } = session;

    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(PlaybackEvent::Shown { index }) => {
                    if let Some(f) = playable.get(index) {
                        println!("{index}\t{}\t{}", rfc3339(f), f.filename);
                    }
                }
                Some(PlaybackEvent::RefreshLatest) => match source.latest_url.as_deref() {
                    Some(url) => match app.fetcher.fetch_bytes(url).await {
                        Ok(bytes) => println!("latest\t{url}\t{} bytes", bytes.len()),
                        Err(err) => warn!(error = %err, "latest image refresh failed"),
                    },
                    None => warn!(source = %source.key, "source has no latest image"),
                },
                None => break,
            }
        }
    }
    controller.pause();
    controller.exit_latest_only();
    Ok(())
}
