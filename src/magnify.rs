//! Nearest-neighbor magnification of the base map.
//!
//! The tiles are flat-colored art, so any interpolation would smear cell
//! borders. Each source pixel becomes a `zoom` x `zoom` block instead.

use image::RgbaImage;
use tracing::info;

use crate::canvas::Canvas;
use crate::error::MapError;

/// Upscale by an integer factor by pixel replication.
///
/// Each source row is widened once and then copied `zoom` times, which
/// yields the same pixels as a per-pixel loop at a fraction of the writes.
pub fn magnify(canvas: &Canvas, zoom: u32) -> Result<Canvas, MapError> {
    if zoom == 0 {
        return Err(MapError::InvalidZoom(zoom));
    }
    if zoom == 1 {
        return Ok(canvas.clone());
    }

    let (width, height) = (canvas.width(), canvas.height());
    let (new_width, new_height) = (width * zoom, height * zoom);
    info!(from = width, to = new_width, zoom, "magnifying base map");

    let src = canvas.image().as_raw();
    let src_stride = width as usize * 4;
    let mut out = Vec::with_capacity(new_width as usize * new_height as usize * 4);
    let mut row = Vec::with_capacity(new_width as usize * 4);

    for y in 0..height as usize {
        row.clear();
        for pixel in src[y * src_stride..(y + 1) * src_stride].chunks_exact(4) {
            for _ in 0..zoom {
                row.extend_from_slice(pixel);
            }
        }
        for _ in 0..zoom {
            out.extend_from_slice(&row);
        }
    }

    RgbaImage::from_raw(new_width, new_height, out)
        .map(Canvas::from_image)
        .ok_or_else(|| MapError::InvalidGeometry(format!("{}x{} buffer size mismatch", new_width, new_height)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::collections::HashSet;

    fn checkerboard(side: u32) -> Canvas {
        Canvas::from_image(RgbaImage::from_fn(side, side, |x, y| {
            Rgba([(x * 40) as u8, (y * 40) as u8, ((x + y) % 2 * 255) as u8, 255])
        }))
    }

    #[test]
    fn test_size_scales() {
        let canvas = checkerboard(5);
        for zoom in 1..=4 {
            let big = magnify(&canvas, zoom).unwrap();
            assert_eq!(big.width(), 5 * zoom);
            assert_eq!(big.height(), 5 * zoom);
        }
    }

    #[test]
    fn test_blocks_replicate_source_pixel() {
        let canvas = checkerboard(4);
        let zoom = 3;
        let big = magnify(&canvas, zoom).unwrap();
        for y in 0..big.height() {
            for x in 0..big.width() {
                assert_eq!(big.pixel(x, y), canvas.pixel(x / zoom, y / zoom));
            }
        }
    }

    #[test]
    fn test_no_new_colors() {
        let canvas = checkerboard(6);
        let before: HashSet<[u8; 4]> = canvas.image().pixels().map(|p| p.0).collect();
        let after: HashSet<[u8; 4]> = magnify(&canvas, 2).unwrap().image().pixels().map(|p| p.0).collect();
        assert!(after.is_subset(&before));
    }

    #[test]
    fn test_zoom_one_is_identity() {
        let canvas = checkerboard(3);
        assert_eq!(magnify(&canvas, 1).unwrap(), canvas);
    }

    #[test]
    fn test_zero_zoom_rejected() {
        assert!(matches!(magnify(&checkerboard(2), 0), Err(MapError::InvalidZoom(0))));
    }
}
