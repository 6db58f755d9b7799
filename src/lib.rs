//! World map renderer library
//!
//! Stitches sector tiles into a base map, magnifies it and draws per-cell
//! status masks and owner badges on top.

pub mod assemble;
pub mod badge;
pub mod cache;
pub mod canvas;
pub mod config;
pub mod coords;
pub mod error;
pub mod magnify;
pub mod overlay;
pub mod render;
pub mod service;
pub mod world;

pub use config::{Credentials, RenderConfig, SourceConfig};
pub use error::MapError;
pub use render::Renderer;
