//! Owned RGBA map buffer with explicit region reads and writes.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, ImageReader, Limits, Rgba, RgbaImage};

use crate::error::MapError;

/// The map being rendered. Always square once built by the assembler.
#[derive(Clone, Debug, PartialEq)]
pub struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    /// A square canvas filled with one color.
    pub fn new(side: u32, fill: Rgba<u8>) -> Self {
        Self {
            image: RgbaImage::from_pixel(side, side, fill),
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Decode an encoded map of at most `max_side` pixels per side. Large
    /// shards exceed the decoder's default allocation cap, so the limits
    /// are sized to the map instead.
    pub fn decode(bytes: &[u8], max_side: u32) -> Result<Self, image::ImageError> {
        let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        reader.limits(decode_limits(max_side));
        Ok(Self::from_image(reader.decode()?.to_rgba8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.image.get_pixel(x, y)
    }

    /// Copy `src` over the canvas at `(x, y)` with no blending.
    /// Whatever falls outside the canvas is dropped.
    pub fn paste(&mut self, src: &RgbaImage, x: u32, y: u32) {
        if x >= self.width() || y >= self.height() {
            return;
        }
        let cols = src.width().min(self.width() - x) as usize;
        let rows = src.height().min(self.height() - y);
        let dst_stride = self.width() as usize * 4;
        let src_stride = src.width() as usize * 4;
        let src_raw: &[u8] = src.as_raw();
        let dst: &mut [u8] = &mut self.image;

        for row in 0..rows as usize {
            let d = (y as usize + row) * dst_stride + x as usize * 4;
            let s = row * src_stride;
            dst[d..d + cols * 4].copy_from_slice(&src_raw[s..s + cols * 4]);
        }
    }

    /// Read a `width` x `height` block. Pixels outside the canvas come back
    /// fully transparent.
    pub fn region(&self, x: u32, y: u32, width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |dx, dy| {
            let (px, py) = (x + dx, y + dy);
            if px < self.width() && py < self.height() {
                *self.image.get_pixel(px, py)
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    /// Write a block back; the counterpart of [`Canvas::region`].
    pub fn put_region(&mut self, block: &RgbaImage, x: u32, y: u32) {
        self.paste(block, x, y);
    }

    /// Blend a square block toward a flat color:
    /// `result = (1 - opacity) * original + opacity * color`.
    pub fn blend_region(&mut self, x: u32, y: u32, side: u32, color: Rgba<u8>, opacity: f32) {
        let mut block = self.region(x, y, side, side);
        blend_toward(&mut block, color, opacity);
        self.put_region(&block, x, y);
    }

    /// Paste `src` using its own alpha channel as the mask.
    pub fn paste_masked(&mut self, src: &RgbaImage, x: i64, y: i64) {
        paste_masked(&mut self.image, src, x, y);
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, MapError> {
        let mut bytes = Cursor::new(Vec::new());
        self.image
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(MapError::Encode)?;
        Ok(bytes.into_inner())
    }

    /// Write the canvas as PNG through a temporary file renamed into place,
    /// so an interrupted save never leaves a truncated image at `path`.
    pub fn save_png(&self, path: &Path) -> Result<(), MapError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("png.tmp");
        let saved = self
            .image
            .save_with_format(&tmp, ImageFormat::Png)
            .map_err(MapError::Encode)
            .and_then(|()| fs::rename(&tmp, path).map_err(MapError::from));
        if saved.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        saved
    }
}

/// Decoder limits admitting a square RGBA map of `max_side` pixels.
pub fn decode_limits(max_side: u32) -> Limits {
    let needed = max_side as u64 * max_side as u64 * 4;
    let mut limits = Limits::default();
    limits.max_image_width = Some(max_side);
    limits.max_image_height = Some(max_side);
    limits.max_alloc = Some(limits.max_alloc.map_or(needed, |cap| cap.max(needed)));
    limits
}

/// Linear mix of two channel values, `a` at `t = 0` and `b` at `t = 1`.
pub fn mix(a: u8, b: u8, t: f32) -> u8 {
    let v = a as f32 + (b as f32 - a as f32) * t;
    v.round().clamp(0.0, 255.0) as u8
}

/// Blend every pixel (alpha included) toward `color` by `t`.
pub fn blend_toward(image: &mut RgbaImage, color: Rgba<u8>, t: f32) {
    for pixel in image.pixels_mut() {
        for c in 0..4 {
            pixel.0[c] = mix(pixel.0[c], color.0[c], t);
        }
    }
}

/// Alpha-masked paste onto any RGBA buffer. All four channels are mixed by
/// the source alpha, so a half-transparent source also thins the
/// destination alpha. Out-of-range parts are clipped.
pub fn paste_masked(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64) {
    let (dw, dh) = (dst.width() as i64, dst.height() as i64);
    for (sx, sy, s) in src.enumerate_pixels() {
        let (px, py) = (x + sx as i64, y + sy as i64);
        if px < 0 || py < 0 || px >= dw || py >= dh {
            continue;
        }
        let mask = s.0[3] as u32;
        if mask == 0 {
            continue;
        }
        let d = dst.get_pixel_mut(px as u32, py as u32);
        for c in 0..4 {
            let v = s.0[c] as u32 * mask + d.0[c] as u32 * (255 - mask);
            d.0[c] = ((v + 127) / 255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GRAY: Rgba<u8> = Rgba([100, 100, 100, 255]);

    #[test]
    fn test_paste_clips_at_edges() {
        let mut canvas = Canvas::new(4, GRAY);
        let tile = RgbaImage::from_pixel(3, 3, RED);
        canvas.paste(&tile, 2, 2);
        assert_eq!(canvas.pixel(1, 1), GRAY);
        assert_eq!(canvas.pixel(2, 2), RED);
        assert_eq!(canvas.pixel(3, 3), RED);
        canvas.paste(&tile, 10, 0);
        assert_eq!(canvas.width(), 4);
    }

    #[test]
    fn test_region_round_trip() {
        let mut canvas = Canvas::new(6, GRAY);
        canvas.paste(&RgbaImage::from_pixel(2, 2, RED), 1, 1);
        let block = canvas.region(0, 0, 3, 3);
        assert_eq!(*block.get_pixel(0, 0), GRAY);
        assert_eq!(*block.get_pixel(1, 1), RED);

        let mut other = Canvas::new(6, GRAY);
        other.put_region(&block, 0, 0);
        assert_eq!(other.region(0, 0, 3, 3), block);
    }

    #[test]
    fn test_region_outside_is_transparent() {
        let canvas = Canvas::new(2, GRAY);
        let block = canvas.region(1, 1, 2, 2);
        assert_eq!(*block.get_pixel(0, 0), GRAY);
        assert_eq!(*block.get_pixel(1, 1), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_blend_region_single_application() {
        let mut canvas = Canvas::new(4, GRAY);
        canvas.blend_region(0, 0, 2, Rgba([0, 0, 0, 255]), 0.3);
        // 0.7 * 100 + 0.3 * 0
        assert_eq!(canvas.pixel(0, 0), Rgba([70, 70, 70, 255]));
        assert_eq!(canvas.pixel(1, 1), Rgba([70, 70, 70, 255]));
        assert_eq!(canvas.pixel(2, 2), GRAY);
    }

    #[test]
    fn test_blend_compounds() {
        let mut canvas = Canvas::new(1, GRAY);
        canvas.blend_region(0, 0, 1, Rgba([0, 0, 0, 255]), 0.3);
        canvas.blend_region(0, 0, 1, Rgba([0, 0, 0, 255]), 0.3);
        assert_eq!(canvas.pixel(0, 0), Rgba([49, 49, 49, 255]));
    }

    #[test]
    fn test_paste_masked_respects_alpha() {
        let mut canvas = Canvas::new(3, GRAY);
        let mut src = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        src.put_pixel(1, 0, RED);
        canvas.paste_masked(&src, 0, 0);
        assert_eq!(canvas.pixel(0, 0), GRAY);
        assert_eq!(canvas.pixel(1, 0), RED);

        canvas.paste_masked(&src, -1, 2);
        assert_eq!(canvas.pixel(0, 2), RED);
    }

    #[test]
    fn test_paste_masked_half_alpha() {
        let mut dst = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let src = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 128]));
        paste_masked(&mut dst, &src, 0, 0);
        let p = dst.get_pixel(0, 0).0;
        assert_eq!(p[0], 128);
        // 128 * 128 / 255 + 255 * 127 / 255
        assert_eq!(p[3], 191);
    }

    #[test]
    fn test_png_round_trip() {
        let mut canvas = Canvas::new(5, GRAY);
        canvas.paste(&RgbaImage::from_pixel(1, 1, RED), 4, 4);
        let decoded = Canvas::decode(&canvas.encode_png().unwrap(), 5).unwrap();
        assert_eq!(decoded, canvas);
    }

    #[test]
    fn test_decode_limits_cover_largest_map() {
        // shard0 at zoom 3: 12000 x 12000 RGBA, above the 512 MiB default
        let side = 12000;
        let default_cap = Limits::default().max_alloc.unwrap();
        assert!(side as u64 * side as u64 * 4 > default_cap);

        let limits = decode_limits(side);
        assert_eq!(limits.max_image_width, Some(side));
        assert!(limits.max_alloc.unwrap() >= side as u64 * side as u64 * 4);
        assert_eq!(decode_limits(10).max_alloc, Some(default_cap));
    }

    #[test]
    fn test_decode_rejects_oversized_map() {
        let bytes = Canvas::new(8, GRAY).encode_png().unwrap();
        assert!(Canvas::decode(&bytes, 4).is_err());
        assert_eq!(Canvas::decode(&bytes, 8).unwrap().width(), 8);
    }

    #[test]
    fn test_failed_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // a non-empty directory where the image should go makes the rename fail
        let path = dir.path().join("map.png");
        fs::create_dir_all(path.join("occupied")).unwrap();

        assert!(Canvas::new(2, RED).save_png(&path).is_err());
        assert!(!path.with_extension("png.tmp").exists());
        assert!(path.is_dir());
    }

    #[test]
    fn test_save_png_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("map.png");
        Canvas::new(2, RED).save_png(&path).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("png.tmp").exists());
    }
}
