use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use screeps_world_printer::cache::DiskCache;
use screeps_world_printer::service::ScreepsClient;
use screeps_world_printer::{Credentials, RenderConfig, Renderer, SourceConfig};

#[derive(Parser, Debug)]
#[command(name = "screeps_world_printer")]
#[command(about = "Render a daily ownership map of a world shard")]
struct Args {
    /// Shard number
    #[arg(short, long, default_value = "3")]
    shard: u32,

    /// Magnification applied to the assembled tile map
    #[arg(short, long, default_value = "3")]
    zoom: u32,

    /// Side of one cell in the source tiles, in pixels
    #[arg(long, default_value = "20")]
    cell_pixel: u32,

    /// Directory for downloaded tiles, avatars and base maps
    #[arg(long, default_value = ".screeps_cache")]
    cache_dir: PathBuf,

    /// Directory the rendered maps are written to
    #[arg(short, long, default_value = "dist")]
    out_dir: PathBuf,

    /// JSON file with `username`/`password` or `token`
    #[arg(long, default_value = "config.json")]
    auth: PathBuf,

    /// Game API base URL (point at a private server here)
    #[arg(long)]
    api: Option<String>,

    /// Sector tile CDN base URL
    #[arg(long)]
    tile_cdn: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let credentials = Credentials::load(&args.auth)
        .with_context(|| format!("reading credentials from {}", args.auth.display()))?;
    if credentials.is_none() {
        info!("no credentials found, requesting world state anonymously");
    }

    let defaults = SourceConfig::default();
    let source = SourceConfig {
        shard: args.shard,
        api_base: args.api.unwrap_or(defaults.api_base),
        tile_cdn: args.tile_cdn.unwrap_or(defaults.tile_cdn),
        credentials,
        ..defaults
    };
    let client = ScreepsClient::new(source).context("building HTTP client")?;

    let config = RenderConfig {
        zoom: args.zoom,
        cell_pixel: args.cell_pixel,
        ..RenderConfig::default()
    };
    let renderer = Renderer::new(config, args.shard, client, DiskCache::new(&args.cache_dir))
        .context("invalid render settings")?;

    info!(shard = args.shard, zoom = args.zoom, "rendering world map");
    let today = chrono::Local::now().date_naive();
    let path = renderer
        .render_to(&args.out_dir, today)
        .with_context(|| format!("rendering shard {}", args.shard))?;

    info!(path = %path.display(), "done");
    Ok(())
}
