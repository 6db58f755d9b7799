//! Stitches sector tiles into the native-resolution base map.

use image::Rgba;
use tracing::{debug, info};

use crate::canvas::Canvas;
use crate::config::RenderConfig;
use crate::coords::{sector_boundary_names, CellName, WorldSize};
use crate::error::MapError;

/// Fill for map areas no sector tile covers.
pub const BACKGROUND: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);

/// Side of the assembled (unmagnified) map in pixels.
pub fn native_side(world: WorldSize, config: &RenderConfig) -> u32 {
    world.sector_count(config.cells_per_sector) * config.sector_pixels()
}

/// Fetch every sector tile and paste it at its grid slot.
///
/// `fetch` returns the raw encoded tile. Any tile that fails to decode
/// aborts the whole assembly.
pub fn assemble<F>(world: WorldSize, config: &RenderConfig, mut fetch: F) -> Result<Canvas, MapError>
where
    F: FnMut(&CellName) -> Result<Vec<u8>, MapError>,
{
    let tile = config.sector_pixels();
    let mut canvas = Canvas::new(native_side(world, config), BACKGROUND);

    let (xs, ys) = sector_boundary_names(world, config.cells_per_sector);
    let total = xs.len() * ys.len();
    info!(sectors = total, side = canvas.width(), "assembling base map");

    for (ix, x) in xs.iter().enumerate() {
        for (iy, y) in ys.iter().enumerate() {
            let sector = CellName::new(*x, *y);
            let bytes = fetch(&sector)?;
            let image = image::load_from_memory(&bytes)
                .map_err(|source| MapError::TileDecode { sector: sector.to_string(), source })?
                .to_rgba8();
            debug!(%sector, done = ix * ys.len() + iy + 1, total, "sector pasted");
            canvas.paste(&image, ix as u32 * tile, iy as u32 * tile);
        }
    }

    Ok(canvas)
}
