//! Render and data-source configuration.
//!
//! Every component receives its settings through these structs rather than
//! reading globals, so tests can shrink the pixel geometry freely.

use std::path::Path;
use std::time::Duration;

use image::Rgba;
use serde::Deserialize;

use crate::error::MapError;

/// Pixel geometry, colors and blend factors used while rendering.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// Side length of one cell in the source tiles, in pixels
    pub cell_pixel: u32,
    /// Cells along one side of a sector tile
    pub cells_per_sector: u32,
    /// Integer magnification applied to the assembled map (>= 1)
    pub zoom: u32,
    /// Badge outline color
    pub outline_color: Rgba<u8>,
    /// Mask color for cells outside the world borders
    pub out_of_bounds_color: Rgba<u8>,
    /// Mask color for respawn areas
    pub respawn_color: Rgba<u8>,
    /// Mask color for novice areas
    pub novice_color: Rgba<u8>,
    /// Weight of the mask color when blending a status mask
    pub mask_opacity: f32,
    /// Weight of full transparency when fading an outpost badge
    pub outpost_fade: f32,
    /// Badge side for outposts (ownership level 0), before zoom
    pub outpost_badge: u32,
    /// Badge side for owned cells, before zoom
    pub owned_badge: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cell_pixel: 20,
            cells_per_sector: 10,
            zoom: 3,
            outline_color: Rgba([0x15, 0x15, 0x15, 0xff]),
            out_of_bounds_color: Rgba([0x00, 0x00, 0x00, 0xff]),
            respawn_color: Rgba([0x00, 0x6b, 0xff, 0xff]),
            novice_color: Rgba([0x7c, 0xff, 0x7c, 0xff]),
            mask_opacity: 0.3,
            outpost_fade: 0.3,
            outpost_badge: 6,
            owned_badge: 10,
        }
    }
}

impl RenderConfig {
    /// Reject geometry that would produce an empty or degenerate canvas.
    pub fn validate(&self) -> Result<(), MapError> {
        if self.zoom == 0 {
            return Err(MapError::InvalidZoom(self.zoom));
        }
        if self.cell_pixel == 0 || self.cells_per_sector == 0 {
            return Err(MapError::InvalidGeometry(format!(
                "cell pixel {} and cells per sector {} must be non-zero",
                self.cell_pixel, self.cells_per_sector
            )));
        }
        Ok(())
    }

    /// Side of one cell on the magnified canvas.
    pub fn cell_span(&self) -> u32 {
        self.cell_pixel * self.zoom
    }

    /// Side of one sector tile at native resolution.
    pub fn sector_pixels(&self) -> u32 {
        self.cells_per_sector * self.cell_pixel
    }
}

/// How to authenticate against the game API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Token(String),
    Password { email: String, password: String },
}

/// Shape of the JSON auth file.
#[derive(Deserialize, Debug)]
struct AuthFile {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl Credentials {
    /// Read credentials from the environment, falling back to the auth file.
    ///
    /// `SCREEPS_TOKEN` wins over `SCREEPS_EMAIL`/`SCREEPS_PASSWORD`, which win
    /// over the file. A missing file is not an error; it just yields `None`.
    pub fn load(auth_file: &Path) -> Result<Option<Self>, MapError> {
        if let Some(creds) = Self::from_env() {
            return Ok(Some(creds));
        }
        if !auth_file.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(auth_file)?;
        Self::from_json(&text)
    }

    fn from_env() -> Option<Self> {
        let non_empty = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        if let Some(token) = non_empty("SCREEPS_TOKEN") {
            return Some(Credentials::Token(token));
        }
        match (non_empty("SCREEPS_EMAIL"), non_empty("SCREEPS_PASSWORD")) {
            (Some(email), Some(password)) => Some(Credentials::Password { email, password }),
            _ => None,
        }
    }

    fn from_json(text: &str) -> Result<Option<Self>, MapError> {
        let file: AuthFile = serde_json::from_str(text)?;
        if let Some(token) = file.token {
            return Ok(Some(Credentials::Token(token)));
        }
        Ok(match (file.username, file.password) {
            (Some(email), Some(password)) => Some(Credentials::Password { email, password }),
            _ => None,
        })
    }
}

/// Where the world data comes from.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Shard number; requests use `shard{N}`
    pub shard: u32,
    /// Base URL of the game HTTP API
    pub api_base: String,
    /// Base URL of the sector tile CDN
    pub tile_cdn: String,
    /// Timeout for ordinary requests
    pub timeout: Duration,
    /// Timeout for the bulk map-stats request, which is slow on large shards
    pub map_stats_timeout: Duration,
    pub credentials: Option<Credentials>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            shard: 3,
            api_base: "https://screeps.com/api".to_string(),
            tile_cdn: "https://d3os7yery2usni.cloudfront.net/map".to_string(),
            timeout: Duration::from_secs(30),
            map_stats_timeout: Duration::from_secs(120),
            credentials: None,
        }
    }
}

impl SourceConfig {
    pub fn shard_name(&self) -> String {
        format!("shard{}", self.shard)
    }
}
