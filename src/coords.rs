//! Coordinate system for the world grid.
//!
//! Cells are named by two directional codes measured from the world center,
//! e.g. `W12N4`: West and North grow away from the center towards the
//! top-left of the map, East and South towards the bottom-right. `W0`/`E0`
//! (and `N0`/`S0`) are the two cells touching the center line.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::MapError;

/// Number of extra cells the game adds around the playable area.
const BORDER_CELLS: u32 = 18;

/// Full span of the world, in cells, as reported by the game API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct WorldSize {
    pub width: u32,
    pub height: u32,
}

impl WorldSize {
    /// Build a world size, rejecting zero or odd spans.
    pub fn new(width: u32, height: u32) -> Result<Self, MapError> {
        let size = Self { width, height };
        size.validate()?;
        Ok(size)
    }

    pub fn validate(&self) -> Result<(), MapError> {
        let ok = |v: u32| v > 0 && v % 2 == 0;
        if ok(self.width) && ok(self.height) {
            Ok(())
        } else {
            Err(MapError::InvalidWorldSize { width: self.width, height: self.height })
        }
    }

    /// Cells from the center to the edge along one axis.
    ///
    /// The world is treated as square and measured by its width.
    pub fn quadrant_size(&self) -> u32 {
        (self.width + BORDER_CELLS) / 2
    }

    /// Sector tiles along one side of the assembled map.
    pub fn sector_count(&self, cells_per_sector: u32) -> u32 {
        (self.width + BORDER_CELLS) / cells_per_sector
    }
}

/// Horizontal half of a cell name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Horizontal {
    West(u32),
    East(u32),
}

/// Vertical half of a cell name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vertical {
    North(u32),
    South(u32),
}

impl fmt::Display for Horizontal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Horizontal::West(n) => write!(f, "W{}", n),
            Horizontal::East(n) => write!(f, "E{}", n),
        }
    }
}

impl fmt::Display for Vertical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vertical::North(n) => write!(f, "N{}", n),
            Vertical::South(n) => write!(f, "S{}", n),
        }
    }
}

/// Canonical key of one world cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellName {
    pub x: Horizontal,
    pub y: Vertical,
}

impl CellName {
    pub fn new(x: Horizontal, y: Vertical) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for CellName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.x, self.y)
    }
}

impl FromStr for CellName {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MapError::InvalidCellName(s.to_string());

        let split = s
            .char_indices()
            .skip(1)
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i);
        let (x_part, y_part) = match split {
            Some(i) => s.split_at(i),
            None => return Err(invalid()),
        };

        let parse_code = |part: &str| -> Option<(char, u32)> {
            let mut chars = part.chars();
            let letter = chars.next()?;
            let digits = chars.as_str();
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            Some((letter, digits.parse().ok()?))
        };

        let x = match parse_code(x_part).ok_or_else(invalid)? {
            ('W', n) => Horizontal::West(n),
            ('E', n) => Horizontal::East(n),
            _ => return Err(invalid()),
        };
        let y = match parse_code(y_part).ok_or_else(invalid)? {
            ('N', n) => Vertical::North(n),
            ('S', n) => Vertical::South(n),
            _ => return Err(invalid()),
        };

        Ok(CellName { x, y })
    }
}

/// Converts between cell names and pixel positions on the magnified canvas.
#[derive(Clone, Copy, Debug)]
pub struct Mapper {
    quadrant: i64,
    span: i64,
}

impl Mapper {
    /// `cell_pixel * zoom` is the side of one cell on the canvas.
    pub fn new(world: WorldSize, cell_pixel: u32, zoom: u32) -> Self {
        Self {
            quadrant: world.quadrant_size() as i64,
            span: (cell_pixel * zoom) as i64,
        }
    }

    pub fn cell_span(&self) -> u32 {
        self.span as u32
    }

    /// Top-left pixel of a cell. May be negative for cells beyond the map.
    pub fn cell_origin(&self, cell: &CellName) -> (i64, i64) {
        let x = match cell.x {
            Horizontal::West(n) => self.quadrant - n as i64 - 1,
            Horizontal::East(n) => self.quadrant + n as i64,
        };
        let y = match cell.y {
            Vertical::North(n) => self.quadrant - n as i64 - 1,
            Vertical::South(n) => self.quadrant + n as i64,
        };
        (x * self.span, y * self.span)
    }

    /// Parse a cell name and return its top-left pixel.
    pub fn cell_to_pixel(&self, name: &str) -> Result<(i64, i64), MapError> {
        let cell: CellName = name.parse()?;
        Ok(self.cell_origin(&cell))
    }

    /// Name of the cell containing the pixel.
    pub fn pixel_to_cell(&self, x: u32, y: u32) -> CellName {
        let x = match self.axis_code(x) {
            AxisSide::Positive(n) => Horizontal::East(n),
            AxisSide::Negative(n) => Horizontal::West(n),
        };
        let y = match self.axis_code(y) {
            AxisSide::Positive(n) => Vertical::South(n),
            AxisSide::Negative(n) => Vertical::North(n),
        };
        CellName { x, y }
    }

    /// `code = quadrant - cell_index`; `code <= 0` lies on the positive side
    /// at offset `-code`, anything else on the negative side at `code - 1`.
    fn axis_code(&self, axis: u32) -> AxisSide {
        let code = self.quadrant - axis as i64 / self.span;
        if code <= 0 {
            AxisSide::Positive((-code) as u32)
        } else {
            AxisSide::Negative((code - 1) as u32)
        }
    }
}

enum AxisSide {
    Positive(u32),
    Negative(u32),
}

/// Sector tile codes in left-to-right and top-to-bottom order.
///
/// West and North sectors are named by their outermost cell (`W9`, `W19`,
/// ...) and listed from the edge inwards; East and South ones by their
/// innermost cell (`E0`, `E10`, ...) from the center outwards.
pub fn sector_boundary_names(world: WorldSize, cells_per_sector: u32) -> (Vec<Horizontal>, Vec<Vertical>) {
    let step = cells_per_sector as usize;
    let last = cells_per_sector - 1;

    let mut xs: Vec<Horizontal> = (0..world.width / 2)
        .step_by(step)
        .map(|x| Horizontal::West(x + last))
        .collect();
    xs.reverse();
    xs.extend((0..world.width / 2).step_by(step).map(Horizontal::East));

    let mut ys: Vec<Vertical> = (0..world.height / 2)
        .step_by(step)
        .map(|y| Vertical::North(y + last))
        .collect();
    ys.reverse();
    ys.extend((0..world.height / 2).step_by(step).map(Vertical::South));

    (xs, ys)
}

/// Every cell name inside the quadrant bounds, used for the bulk state query.
pub fn all_cell_names(world: WorldSize) -> Vec<CellName> {
    let q = world.quadrant_size();
    let xs = (0..q).map(Horizontal::West).chain((0..q).map(Horizontal::East));
    let mut names = Vec::with_capacity((4 * q * q) as usize);
    for x in xs {
        let ys = (0..q).map(Vertical::South).chain((0..q).map(Vertical::North));
        names.extend(ys.map(|y| CellName { x, y }));
    }
    names
}
