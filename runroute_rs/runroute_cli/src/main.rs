use std::fs;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, ArgGroup, Args, Parser, Subcommand, ValueEnum, ValueHint};
use image::{ImageFormat, RgbaImage};
use rayon::prelude::*;
use runroute::{
    parse_activity_feed, parse_track, ActivityFeed, Coordinate, FinishIcon, RenderConfig,
    RenderMode, Route, RouteView, TileStyle, ViewStatus,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod raster;
mod tiles;

use raster::RasterBackend;
use tiles::TileFetcher;

#[derive(Parser, Debug)]
#[command(author, version, about = "Running route codec and static map renderer", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode an encoded polyline into coordinates
    Decode(DecodeArgs),
    /// Encode FIT/GPX tracks as polylines
    Encode(EncodeArgs),
    /// Render one route to PNG and/or SVG
    Render(RenderArgs),
    /// Write the checkered finish marker as PNG
    Icon(IconArgs),
    /// Render every routed activity in a feed
    Feed(FeedArgs),
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["polyline", "input"])))]
struct DecodeArgs {
    /// Encoded polyline
    polyline: Option<String>,

    /// Read the polyline from a file instead
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = CoordFormat::Csv)]
    format: CoordFormat,

    /// Output path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct EncodeArgs {
    /// FIT/GPX files to encode
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Output path (`-` for stdout); one polyline per line, in input order
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["polyline", "feed"])))]
struct RenderArgs {
    /// Encoded polyline to draw
    #[arg(long)]
    polyline: Option<String>,

    /// Activity feed JSON to pick the route from
    #[arg(long, requires = "id", value_hint = ValueHint::FilePath)]
    feed: Option<PathBuf>,

    /// Activity id within --feed
    #[arg(long)]
    id: Option<u64>,

    /// Output PNG path (defaults to route.png when no output is given)
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Output SVG path (overlays only)
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    #[command(flatten)]
    opts: RenderOpts,
}

#[derive(Parser, Debug)]
struct IconArgs {
    /// Icon edge in pixels
    #[arg(long, default_value_t = 18)]
    size: u32,

    /// Output PNG path
    #[arg(short, long, default_value = "finish.png", value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct FeedArgs {
    /// Activity feed JSON (`/api/activities` payload or a bare array)
    #[arg(value_hint = ValueHint::FilePath)]
    feed: PathBuf,

    /// Directory receiving one PNG per activity
    #[arg(long, default_value = "routes", value_hint = ValueHint::DirPath)]
    out_dir: PathBuf,

    #[command(flatten)]
    opts: RenderOpts,
}

#[derive(Args, Debug, Clone)]
struct RenderOpts {
    /// Thumbnail or modal styling
    #[arg(long, value_enum, default_value_t = ModeOpt::Thumbnail)]
    mode: ModeOpt,

    /// Base tiles (satellite needs --mode modal)
    #[arg(long, value_enum, default_value_t = TilesOpt::Standard)]
    tiles: TilesOpt,

    /// Image width in pixels
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Image height in pixels
    #[arg(long, default_value_t = 200)]
    height: u32,

    /// Download base tiles (otherwise a plain background)
    #[arg(long, action = ArgAction::SetTrue)]
    fetch_tiles: bool,

    /// Tile cache directory
    #[arg(long, default_value = ".cache/tiles", value_hint = ValueHint::DirPath)]
    tile_cache: PathBuf,

    /// Render config JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Route colour override (#rrggbb)
    #[arg(long)]
    route_color: Option<String>,

    /// Maximum zoom override
    #[arg(long)]
    max_zoom: Option<u8>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum CoordFormat {
    Csv,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ModeOpt {
    Thumbnail,
    Modal,
}

impl From<ModeOpt> for RenderMode {
    fn from(value: ModeOpt) -> Self {
        match value {
            ModeOpt::Thumbnail => RenderMode::Thumbnail,
            ModeOpt::Modal => RenderMode::Modal,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum TilesOpt {
    Standard,
    Satellite,
}

impl From<TilesOpt> for TileStyle {
    fn from(value: TilesOpt) -> Self {
        match value {
            TilesOpt::Standard => TileStyle::Standard,
            TilesOpt::Satellite => TileStyle::Satellite,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Decode(args) => handle_decode(args),
        Command::Encode(args) => handle_encode(args),
        Command::Render(args) => handle_render(args),
        Command::Icon(args) => handle_icon(args),
        Command::Feed(args) => handle_feed(args),
    }
}

fn handle_decode(args: DecodeArgs) -> Result<()> {
    let encoded = match (&args.polyline, &args.input) {
        (Some(polyline), _) => polyline.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => return Err(anyhow!("no polyline supplied")),
    };
    let route = Route::decode(encoded.trim()).context("invalid polyline")?;
    info!(
        "Decoded {} point(s), {:.2} km{}",
        route.len(),
        route.distance_m() / 1000.0,
        if route.is_closed_loop() { ", closed loop" } else { "" }
    );

    let sink = open_output(&args.output)?;
    match args.format {
        CoordFormat::Csv => write_coordinates_csv(route.points(), sink),
        CoordFormat::Json => {
            let mut sink = sink;
            serde_json::to_writer_pretty(&mut sink, route.points())?;
            writeln!(sink)?;
            Ok(())
        }
    }
}

fn open_output(path: &Path) -> Result<Box<dyn Write>> {
    if path == Path::new("-") {
        Ok(Box::new(io::stdout().lock()))
    } else {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Box::new(file))
    }
}

fn write_coordinates_csv<W: Write>(points: &[Coordinate], sink: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(sink);
    writer.write_record(["lat", "lng"])?;
    for point in points {
        writer.write_record([format!("{:.5}", point.lat), format!("{:.5}", point.lng)])?;
    }
    writer.flush()?;
    Ok(())
}

fn handle_encode(args: EncodeArgs) -> Result<()> {
    let t_parse = Instant::now();
    let encoded: Vec<String> = args
        .inputs
        .par_iter()
        .map(|path| -> Result<String> {
            let data =
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            let hint = path
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("fit");
            let points = parse_track(&data, hint)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            let route = Route::from_points(points);
            info!(
                "{}: {} point(s), {:.2} km",
                path.display(),
                route.len(),
                route.distance_m() / 1000.0
            );
            Ok(route.encode())
        })
        .collect::<Result<Vec<_>>>()?;
    debug!(
        "Parse stage: {:.1} ms",
        t_parse.elapsed().as_secs_f64() * 1000.0
    );

    let mut sink = open_output(&args.output)?;
    for polyline in encoded {
        writeln!(sink, "{polyline}")?;
    }
    Ok(())
}

fn load_config(opts: &RenderOpts) -> Result<RenderConfig> {
    let mut config = match opts.config.as_ref() {
        Some(path) => RenderConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let mut config = RenderConfig::default();
            config.apply_env_overrides()?;
            config
        }
    };
    if let Some(color) = opts.route_color.as_ref() {
        config.route_color = color.clone();
    }
    if let Some(zoom) = opts.max_zoom {
        config.tiles.max_zoom = zoom;
    }
    config.validate()?;
    Ok(config)
}

fn tile_fetcher(opts: &RenderOpts) -> Result<Option<Arc<TileFetcher>>> {
    if !opts.fetch_tiles {
        return Ok(None);
    }
    let fetcher = TileFetcher::new(opts.tile_cache.clone())?;
    debug!("tile cache at {}", fetcher.cache_dir().display());
    Ok(Some(Arc::new(fetcher)))
}

/// Draw `encoded` on a raster surface and hand back the live view.
fn render_view(
    encoded: &str,
    opts: &RenderOpts,
    config: &RenderConfig,
    fetcher: Option<Arc<TileFetcher>>,
) -> Result<RouteView<RasterBackend>> {
    let mut backend = RasterBackend::new((opts.width, opts.height));
    if let Some(fetcher) = fetcher {
        backend = backend.with_tiles(fetcher);
    }
    let mut view = RouteView::new(backend, opts.mode.into(), config.clone());
    let style = TileStyle::from(opts.tiles);
    if !view.set_tile_style(style)? && style != TileStyle::Standard {
        warn!("{style:?} tiles are only offered in modal mode; using standard tiles");
    }
    match view.set_route(Some(encoded)).context("invalid polyline")? {
        ViewStatus::Rendered => Ok(view),
        ViewStatus::Placeholder => Err(anyhow!("route has fewer than two points; nothing to draw")),
        status => Err(anyhow!("map surface unavailable ({status:?})")),
    }
}

fn read_feed(path: &Path) -> Result<ActivityFeed> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_activity_feed(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn handle_render(args: RenderArgs) -> Result<()> {
    let config = load_config(&args.opts)?;
    let encoded = match (&args.polyline, &args.feed, args.id) {
        (Some(polyline), _, _) => polyline.trim().to_string(),
        (None, Some(path), Some(id)) => {
            let feed = read_feed(path)?;
            let activity = feed
                .find(id)
                .ok_or_else(|| anyhow!("activity {id} not found in {}", path.display()))?;
            activity
                .encoded_route()
                .ok_or_else(|| anyhow!("activity {id} has no route"))?
                .to_string()
        }
        _ => return Err(anyhow!("pass --polyline, or --feed with --id")),
    };

    let view = render_view(&encoded, &args.opts, &config, tile_fetcher(&args.opts)?)?;
    let handle = view
        .handle()
        .ok_or_else(|| anyhow!("map surface was not constructed"))?;

    let png = match (&args.png, &args.svg) {
        (None, None) => Some(PathBuf::from("route.png")),
        (png, _) => png.clone(),
    };
    if let Some(path) = png.as_ref() {
        handle.save_png(path)?;
        info!("PNG saved to {}", path.display());
    }
    if let Some(path) = args.svg.as_ref() {
        handle.save_svg(path)?;
        info!("SVG saved to {}", path.display());
    }
    Ok(())
}

fn handle_icon(args: IconArgs) -> Result<()> {
    let icon = FinishIcon::generate(args.size)?;
    let size = icon.size();
    let image = RgbaImage::from_raw(size, size, icon.into_rgba())
        .ok_or_else(|| anyhow!("icon buffer does not match {size}x{size}"))?;
    image
        .save_with_format(&args.output, ImageFormat::Png)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!("Finish marker ({size}px) saved to {}", args.output.display());
    Ok(())
}

fn handle_feed(args: FeedArgs) -> Result<()> {
    let config = load_config(&args.opts)?;
    let feed = read_feed(&args.feed)?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    let fetcher = tile_fetcher(&args.opts)?;

    let (routed, skipped): (Vec<_>, Vec<_>) =
        feed.activities.iter().partition(|activity| activity.has_route());
    for activity in &skipped {
        info!("Activity {} ({}) has no route; skipped", activity.id, activity.title);
    }

    let t_render = Instant::now();
    let results: Vec<(u64, Result<PathBuf>)> = routed
        .par_iter()
        .map(|activity| {
            let path = args
                .out_dir
                .join(format!("{}-{}.png", activity.slug(), activity.id));
            let result = activity
                .encoded_route()
                .ok_or_else(|| anyhow!("no route"))
                .and_then(|encoded| render_view(encoded, &args.opts, &config, fetcher.clone()))
                .and_then(|view| {
                    view.handle()
                        .ok_or_else(|| anyhow!("map surface was not constructed"))?
                        .save_png(&path)
                })
                .map(|_| path);
            (activity.id, result)
        })
        .collect();

    let mut written = 0usize;
    for (id, result) in results {
        match result {
            Ok(path) => {
                written += 1;
                info!("Activity {id} -> {}", path.display());
            }
            Err(err) => warn!("Activity {id} failed: {err:#}"),
        }
    }
    info!(
        "Rendered {written}/{} routed activities in {:.1} ms ({} without route)",
        routed.len(),
        t_render.elapsed().as_secs_f64() * 1000.0,
        skipped.len()
    );
    if written == 0 && !routed.is_empty() {
        return Err(anyhow!("no activity could be rendered"));
    }
    Ok(())
}
