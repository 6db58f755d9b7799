//! Rasterizes SVG user badges into PNG avatars.

use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};

use crate::error::MapError;

/// Render an SVG document at its intrinsic size and encode it as PNG.
pub fn rasterize(username: &str, svg: &[u8]) -> Result<Vec<u8>, MapError> {
    let fail = |reason: String| MapError::BadgeRender { username: username.to_string(), reason };

    let tree = Tree::from_data(svg, &Options::default()).map_err(|e| fail(e.to_string()))?;
    let size = tree.size().to_int_size();
    let mut pixmap = Pixmap::new(size.width(), size.height())
        .ok_or_else(|| fail(format!("empty canvas {}x{}", size.width(), size.height())))?;

    resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());
    pixmap.encode_png().map_err(|e| fail(e.to_string()))
}
