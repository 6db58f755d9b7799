//! Per-cell overlays: status masks and owner badges.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tracing::{error, warn};

use crate::canvas::{blend_toward, paste_masked, Canvas};
use crate::config::RenderConfig;
use crate::error::MapError;
use crate::world::{CellState, CellStatus, Owner};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const RING_WIDTH: f32 = 2.0;

/// Source of decoded avatar images, keyed by username.
pub trait AvatarLookup {
    fn avatar(&self, username: &str) -> Result<RgbaImage, MapError>;
}

/// Draws overlays on the magnified canvas.
pub struct Compositor<'a> {
    config: &'a RenderConfig,
}

impl<'a> Compositor<'a> {
    pub fn new(config: &'a RenderConfig) -> Self {
        Self { config }
    }

    pub fn mask_color(&self, status: CellStatus) -> Option<Rgba<u8>> {
        match status {
            CellStatus::Open => None,
            CellStatus::OutOfBounds => Some(self.config.out_of_bounds_color),
            CellStatus::RespawnProtected => Some(self.config.respawn_color),
            CellStatus::NoviceProtected => Some(self.config.novice_color),
        }
    }

    /// Blend the cell toward its status color. Must run at most once per
    /// cell, the blend compounds. Returns whether a mask was applied.
    pub fn apply_mask(&self, canvas: &mut Canvas, x: u32, y: u32, status: CellStatus) -> bool {
        match self.mask_color(status) {
            Some(color) => {
                canvas.blend_region(x, y, self.config.cell_span(), color, self.config.mask_opacity);
                true
            }
            None => false,
        }
    }

    /// Side of the avatar square: smaller for outposts.
    pub fn badge_side(&self, level: u8) -> u32 {
        let cells = if level == 0 { self.config.outpost_badge } else { self.config.owned_badge };
        cells * self.config.zoom
    }

    /// Resize the avatar, frame it with a margin, fade outposts and draw the
    /// circular outline. The result is `side + 3` wide and `side + 2` high.
    pub fn build_badge(&self, avatar: &RgbaImage, level: u8) -> RgbaImage {
        let side = self.badge_side(level);
        let resized = imageops::resize(avatar, side, side, FilterType::CatmullRom);

        let mut badge = RgbaImage::from_pixel(side + 3, side + 2, TRANSPARENT);
        paste_masked(&mut badge, &resized, 1, 1);

        if level == 0 {
            blend_toward(&mut badge, TRANSPARENT, self.config.outpost_fade);
        }

        draw_ring(&mut badge, self.config.outline_color);
        badge
    }

    /// Paste the owner's badge centered in the cell. A missing or broken
    /// avatar is logged and skipped. Returns whether a badge was drawn.
    pub fn draw_avatar(&self, canvas: &mut Canvas, x: u32, y: u32, owner: &Owner, avatars: &dyn AvatarLookup) -> bool {
        let avatar = match avatars.avatar(&owner.username) {
            Ok(avatar) => avatar,
            Err(e) if e.is_avatar_local() => {
                warn!(username = %owner.username, error = %e, "skipping avatar");
                return false;
            }
            Err(e) => {
                error!(username = %owner.username, error = %e, "avatar lookup failed, skipping");
                return false;
            }
        };

        let badge = self.build_badge(&avatar, owner.level);
        let span = self.config.cell_span() as i64;
        let left = x as i64 + (span - badge.width() as i64) / 2;
        let top = y as i64 + (span - badge.height() as i64) / 2;
        canvas.paste_masked(&badge, left, top);
        true
    }

    /// Mask first, then badge, so the mask never tints the badge.
    pub fn draw_cell(&self, canvas: &mut Canvas, x: u32, y: u32, state: &CellState, avatars: &dyn AvatarLookup) {
        self.apply_mask(canvas, x, y, state.status);
        if let Some(owner) = &state.owner {
            self.draw_avatar(canvas, x, y, owner, avatars);
        }
    }
}

/// Paint a solid 2px circular stroke inscribed in the badge height.
/// Pixels are tested by their centers, so the ring has no gaps.
fn draw_ring(badge: &mut RgbaImage, color: Rgba<u8>) {
    let radius = badge.height() as f32 / 2.0;
    let inner = radius - RING_WIDTH;
    for (x, y, pixel) in badge.enumerate_pixels_mut() {
        let dx = x as f32 + 0.5 - radius;
        let dy = y as f32 + 0.5 - radius;
        let distance = dx.hypot(dy);
        if (inner..=radius).contains(&distance) {
            *pixel = color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const GRAY: Rgba<u8> = Rgba([100, 100, 100, 255]);
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    struct Avatars(HashMap<String, RgbaImage>);

    impl AvatarLookup for Avatars {
        fn avatar(&self, username: &str) -> Result<RgbaImage, MapError> {
            self.0
                .get(username)
                .cloned()
                .ok_or_else(|| MapError::AvatarMissing(username.to_string()))
        }
    }

    fn avatars() -> Avatars {
        Avatars(HashMap::from([("Alice".to_string(), RgbaImage::from_pixel(100, 100, RED))]))
    }

    #[test]
    fn test_badge_sizes() {
        let config = RenderConfig::default();
        let compositor = Compositor::new(&config);
        assert_eq!(compositor.badge_side(0), 18);
        for level in 1..=8 {
            assert_eq!(compositor.badge_side(level), 30);
        }

        let avatar = RgbaImage::from_pixel(100, 100, RED);
        let outpost = compositor.build_badge(&avatar, 0);
        assert_eq!(outpost.dimensions(), (21, 20));
        let owned = compositor.build_badge(&avatar, 5);
        assert_eq!(owned.dimensions(), (33, 32));
    }

    #[test]
    fn test_badge_outline_and_corners() {
        let config = RenderConfig::default();
        let compositor = Compositor::new(&config);
        let badge = compositor.build_badge(&RgbaImage::from_pixel(100, 100, RED), 3);
        assert_eq!(*badge.get_pixel(0, 0), TRANSPARENT);
        assert_eq!(*badge.get_pixel(0, 16), config.outline_color);
        assert_eq!(*badge.get_pixel(16, 0), config.outline_color);
        assert_eq!(*badge.get_pixel(16, 16), RED);
    }

    #[test]
    fn test_ring_has_no_gaps() {
        let config = RenderConfig::default();
        let compositor = Compositor::new(&config);
        for level in [0, 8] {
            let badge = compositor.build_badge(&RgbaImage::from_pixel(100, 100, RED), level);
            let radius = badge.height() as f32 / 2.0;
            // the midline of the stroke, sampled every half degree
            for step in 0..720 {
                let angle = (step as f32 / 2.0).to_radians();
                let x = (radius + (radius - 1.0) * angle.cos()).floor() as u32;
                let y = (radius + (radius - 1.0) * angle.sin()).floor() as u32;
                assert_eq!(*badge.get_pixel(x, y), config.outline_color, "gap at ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_outpost_badge_is_faded() {
        let config = RenderConfig::default();
        let compositor = Compositor::new(&config);
        let badge = compositor.build_badge(&RgbaImage::from_pixel(100, 100, RED), 0);
        let center = badge.get_pixel(10, 10).0;
        assert!((178..=179).contains(&center[3]), "alpha {}", center[3]);
        assert!((178..=179).contains(&center[0]));
    }

    #[test]
    fn test_mask_colors() {
        let config = RenderConfig::default();
        let compositor = Compositor::new(&config);
        assert_eq!(compositor.mask_color(CellStatus::Open), None);
        assert_eq!(compositor.mask_color(CellStatus::OutOfBounds), Some(Rgba([0, 0, 0, 255])));
        assert_eq!(compositor.mask_color(CellStatus::RespawnProtected), Some(Rgba([0x00, 0x6b, 0xff, 255])));
        assert_eq!(compositor.mask_color(CellStatus::NoviceProtected), Some(Rgba([0x7c, 0xff, 0x7c, 255])));
    }

    #[test]
    fn test_mask_blends_cell_only() {
        let config = RenderConfig::default();
        let compositor = Compositor::new(&config);
        let mut canvas = Canvas::new(180, GRAY);
        assert!(compositor.apply_mask(&mut canvas, 60, 60, CellStatus::OutOfBounds));
        assert_eq!(canvas.pixel(60, 60), Rgba([70, 70, 70, 255]));
        assert_eq!(canvas.pixel(119, 119), Rgba([70, 70, 70, 255]));
        assert_eq!(canvas.pixel(59, 60), GRAY);
        assert_eq!(canvas.pixel(120, 119), GRAY);

        assert!(!compositor.apply_mask(&mut canvas, 0, 0, CellStatus::Open));
        assert_eq!(canvas.pixel(0, 0), GRAY);
    }

    #[test]
    fn test_owned_badge_centered() {
        let config = RenderConfig::default();
        let compositor = Compositor::new(&config);
        let mut canvas = Canvas::new(60, GRAY);
        let owner = Owner { username: "Alice".to_string(), level: 8 };
        assert!(compositor.draw_avatar(&mut canvas, 0, 0, &owner, &avatars()));

        // 33x32 badge lands at (13, 14)
        assert_eq!(canvas.pixel(30, 30), RED);
        assert_eq!(canvas.pixel(13, 30), config.outline_color);
        assert_eq!(canvas.pixel(5, 5), GRAY);
        assert_eq!(canvas.pixel(55, 55), GRAY);
    }

    #[test]
    fn test_outpost_badge_blends_with_map() {
        let config = RenderConfig::default();
        let compositor = Compositor::new(&config);
        let mut canvas = Canvas::new(60, GRAY);
        let owner = Owner { username: "Alice".to_string(), level: 0 };
        assert!(compositor.draw_avatar(&mut canvas, 0, 0, &owner, &avatars()));

        let p = canvas.pixel(30, 30).0;
        assert!(p[0] > 100 && p[0] < 255, "red {}", p[0]);
        assert!(p[1] < 100, "green {}", p[1]);
    }

    #[test]
    fn test_missing_avatar_is_skipped() {
        let config = RenderConfig::default();
        let compositor = Compositor::new(&config);
        let mut canvas = Canvas::new(60, GRAY);
        let state = CellState::owned(CellStatus::Open, "Nobody", 4);
        compositor.draw_cell(&mut canvas, 0, 0, &state, &avatars());
        assert_eq!(canvas, Canvas::new(60, GRAY));
    }

    #[test]
    fn test_mask_then_badge() {
        let config = RenderConfig::default();
        let compositor = Compositor::new(&config);
        let mut canvas = Canvas::new(60, GRAY);
        let state = CellState::owned(CellStatus::NoviceProtected, "Alice", 8);
        compositor.draw_cell(&mut canvas, 0, 0, &state, &avatars());
        assert_eq!(canvas.pixel(30, 30), RED);
        assert_ne!(canvas.pixel(1, 1), GRAY);
    }
}
