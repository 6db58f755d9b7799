//! Error taxonomy for the renderer.

use thiserror::Error;

/// Everything that can go wrong while producing a world map.
///
/// Avatar errors are recoverable: the compositor logs them and moves on.
/// The rest abort the run before any output is written.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("invalid cell name `{0}`")]
    InvalidCellName(String),

    #[error("sector tile {sector} could not be decoded: {source}")]
    TileDecode {
        sector: String,
        #[source]
        source: image::ImageError,
    },

    #[error("no cached avatar for {0}")]
    AvatarMissing(String),

    #[error("avatar for {username} could not be decoded: {source}")]
    AvatarDecode {
        username: String,
        #[source]
        source: image::ImageError,
    },

    #[error("badge for {username} could not be rasterized: {reason}")]
    BadgeRender { username: String, reason: String },

    #[error("request failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("cell {cell} rejected: {reason}")]
    MalformedCell { cell: String, reason: String },

    #[error("world size {width}x{height} is not a pair of positive even numbers")]
    InvalidWorldSize { width: u32, height: u32 },

    #[error("zoom must be at least 1, got {0}")]
    InvalidZoom(u32),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("image encoding failed: {0}")]
    Encode(#[source] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MapError {
    /// True for errors that only affect a single cell's avatar.
    pub fn is_avatar_local(&self) -> bool {
        matches!(
            self,
            MapError::AvatarMissing(_) | MapError::AvatarDecode { .. } | MapError::BadgeRender { .. }
        )
    }
}
