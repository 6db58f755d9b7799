//! One render run: base map, world state, avatars, overlays, output.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::assemble::{assemble, native_side};
use crate::badge;
use crate::cache::{cached_or_fetch, magnified_map_key, native_map_key, tile_key, AvatarStore, Cache, RefreshStats};
use crate::canvas::Canvas;
use crate::config::RenderConfig;
use crate::coords::{all_cell_names, Mapper, WorldSize};
use crate::error::MapError;
use crate::magnify::magnify;
use crate::overlay::{AvatarLookup, Compositor};
use crate::service::WorldSource;
use crate::world::WorldState;

/// `{out_dir}/{shard}/{YYYY-MM-DD}.png`; a second run on the same day
/// overwrites the first.
pub fn output_path(out_dir: &Path, shard: u32, date: NaiveDate) -> PathBuf {
    out_dir.join(shard.to_string()).join(format!("{}.png", date.format("%Y-%m-%d")))
}

/// Counters reported at the end of a scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub visited: usize,
    pub with_state: usize,
}

pub struct Renderer<S, C> {
    config: RenderConfig,
    shard: u32,
    source: S,
    cache: C,
}

impl<S: WorldSource, C: Cache> Renderer<S, C> {
    pub fn new(config: RenderConfig, shard: u32, source: S, cache: C) -> Result<Self, MapError> {
        config.validate()?;
        Ok(Self { config, shard, source, cache })
    }

    /// Decode a cached base map, ignoring it when it is corrupt or has the
    /// wrong size.
    fn cached_canvas(&self, key: &str, side: u32) -> Result<Option<Canvas>, MapError> {
        let Some(bytes) = self.cache.get(key)? else {
            return Ok(None);
        };
        match Canvas::decode(&bytes, side) {
            Ok(canvas) if canvas.width() == side && canvas.height() == side => Ok(Some(canvas)),
            Ok(canvas) => {
                warn!(key, width = canvas.width(), expected = side, "cached map has the wrong size, rebuilding");
                Ok(None)
            }
            Err(e) => {
                warn!(key, error = %e, "cached map unreadable, rebuilding");
                Ok(None)
            }
        }
    }

    /// Magnified base map, built from the cheapest available stage: the
    /// cached magnified map, the cached native map, or the sector tiles.
    pub fn base_map(&self, world: WorldSize) -> Result<Canvas, MapError> {
        let native = native_side(world, &self.config);
        let magnified_key = magnified_map_key(self.shard, self.config.zoom);

        if let Some(canvas) = self.cached_canvas(&magnified_key, native * self.config.zoom)? {
            info!("using cached magnified map");
            return Ok(canvas);
        }

        let native_key = native_map_key(self.shard);
        let assembled = match self.cached_canvas(&native_key, native)? {
            Some(canvas) => {
                info!("using cached base map");
                canvas
            }
            None => {
                let canvas = assemble(world, &self.config, |sector| {
                    cached_or_fetch(&self.cache, &tile_key(self.shard, sector), || self.source.sector_tile(sector))
                })?;
                self.cache.put(&native_key, &canvas.encode_png()?)?;
                canvas
            }
        };

        let canvas = magnify(&assembled, self.config.zoom)?;
        self.cache.put(&magnified_key, &canvas.encode_png()?)?;
        Ok(canvas)
    }

    /// Re-render the avatars whose badge changed since the last run.
    pub fn refresh_avatars(&self, state: &WorldState) -> Result<RefreshStats, MapError> {
        AvatarStore::new(&self.cache, self.shard).refresh(state.badges(), |username| {
            let svg = self.source.badge_svg(username)?;
            badge::rasterize(username, &svg)
        })
    }

    /// Scan the canvas cell by cell and draw every cell that has a state.
    pub fn draw_world(&self, canvas: &mut Canvas, world: WorldSize, state: &WorldState, avatars: &dyn AvatarLookup) -> ScanStats {
        let mapper = Mapper::new(world, self.config.cell_pixel, self.config.zoom);
        let compositor = Compositor::new(&self.config);
        let step = mapper.cell_span() as usize;
        let mut stats = ScanStats::default();

        for x in (0..canvas.width()).step_by(step) {
            for y in (0..canvas.height()).step_by(step) {
                stats.visited += 1;
                let cell = mapper.pixel_to_cell(x, y);
                let Some(cell_state) = state.get(&cell) else {
                    debug!(%cell, "no state");
                    continue;
                };
                stats.with_state += 1;
                compositor.draw_cell(canvas, x, y, cell_state, avatars);
            }
        }

        info!(visited = stats.visited, drawn = stats.with_state, "world drawn");
        stats
    }

    /// Full pipeline, returning the finished canvas.
    pub fn render(&self) -> Result<Canvas, MapError> {
        let world = self.source.world_size()?;
        world.validate()?;

        let mut canvas = self.base_map(world)?;
        let state = self.source.cell_states(&all_cell_names(world))?;
        info!(cells = state.len(), owners = state.badges().len(), "world state loaded");

        self.refresh_avatars(&state)?;
        let avatars = AvatarStore::new(&self.cache, self.shard);
        self.draw_world(&mut canvas, world, &state, &avatars);
        Ok(canvas)
    }

    /// Render and save under `out_dir`. Nothing is written if any stage fails.
    pub fn render_to(&self, out_dir: &Path, date: NaiveDate) -> Result<PathBuf, MapError> {
        let canvas = self.render()?;
        let path = output_path(out_dir, self.shard, date);
        canvas.save_png(&path)?;
        info!(path = %path.display(), "map saved");
        Ok(path)
    }
}
