//! World ↔ plot coordinate mapping.
//!
//! The world is tiled by square cells of `plot_size + road_width` blocks. Each
//! cell starts with a road strip of `road_width` blocks on its low X and low Z
//! edges; the remainder is the plot interior, whose outermost ring is the
//! border. [`GridLayout::classify`] is the single routine every caller
//! (world generation, protection, command resolution) goes through.

use crate::error::ParsePlotIdError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Width of a world chunk in blocks, along X and Z.
pub const CHUNK_WIDTH: i32 = 32;

/// Grid coordinate of one plot cell. Orders by `x`, then `z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlotId {
    pub x: i32,
    pub z: i32,
}

impl PlotId {
    pub const ORIGIN: PlotId = PlotId { x: 0, z: 0 };

    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// West, east, north, south.
    pub fn adjacent(self) -> [PlotId; 4] {
        [
            PlotId::new(self.x - 1, self.z),
            PlotId::new(self.x + 1, self.z),
            PlotId::new(self.x, self.z - 1),
            PlotId::new(self.x, self.z + 1),
        ]
    }

    /// The eight plots around this one, diagonals included.
    pub fn surrounding(self) -> Vec<PlotId> {
        let mut out = Vec::with_capacity(8);
        for dx in -1..=1 {
            for dz in -1..=1 {
                if dx != 0 || dz != 0 {
                    out.push(PlotId::new(self.x + dx, self.z + dz));
                }
            }
        }
        out
    }

    /// Chebyshev distance from the origin plot.
    pub fn distance_from_origin(self) -> u32 {
        self.x.unsigned_abs().max(self.z.unsigned_abs())
    }
}

impl fmt::Display for PlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.x, self.z)
    }
}

impl FromStr for PlotId {
    type Err = ParsePlotIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePlotIdError {
            input: s.to_string(),
        };
        let (x, z) = s.split_once(';').ok_or_else(err)?;
        let x = x.parse::<i32>().map_err(|_| err())?;
        let z = z.parse::<i32>().map_err(|_| err())?;
        Ok(PlotId { x, z })
    }
}

/// What a world column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Road,
    /// Outermost ring of a plot's interior.
    Border(PlotId),
    Interior(PlotId),
}

impl Cell {
    pub fn plot(self) -> Option<PlotId> {
        match self {
            Cell::Road => None,
            Cell::Border(id) | Cell::Interior(id) => Some(id),
        }
    }

    pub fn is_road(self) -> bool {
        matches!(self, Cell::Road)
    }

    pub fn is_border(self) -> bool {
        matches!(self, Cell::Border(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLayout {
    plot_size: i32,
    road_width: i32,
}

impl GridLayout {
    /// `plot_size` must be positive and `road_width` non-negative; the config
    /// layer validates both before a layout is built.
    pub fn new(plot_size: i32, road_width: i32) -> Self {
        debug_assert!(plot_size > 0 && road_width >= 0);
        Self {
            plot_size,
            road_width,
        }
    }

    pub fn plot_size(&self) -> i32 {
        self.plot_size
    }

    pub fn road_width(&self) -> i32 {
        self.road_width
    }

    pub fn grid_size(&self) -> i32 {
        self.plot_size + self.road_width
    }

    pub fn classify(&self, x: i32, z: i32) -> Cell {
        let grid = self.grid_size();
        let local_x = x.rem_euclid(grid);
        let local_z = z.rem_euclid(grid);
        if local_x < self.road_width || local_z < self.road_width {
            return Cell::Road;
        }

        let id = PlotId::new(x.div_euclid(grid), z.div_euclid(grid));
        let px = local_x - self.road_width;
        let pz = local_z - self.road_width;
        let edge = self.plot_size - 1;
        if px == 0 || px == edge || pz == 0 || pz == edge {
            Cell::Border(id)
        } else {
            Cell::Interior(id)
        }
    }

    pub fn plot_at(&self, x: i32, z: i32) -> Option<PlotId> {
        self.classify(x, z).plot()
    }

    pub fn is_road(&self, x: i32, z: i32) -> bool {
        self.classify(x, z).is_road()
    }

    pub fn is_border(&self, x: i32, z: i32) -> bool {
        self.classify(x, z).is_border()
    }

    /// Minimum interior corner of a plot, in world coordinates.
    pub fn world_min(&self, id: PlotId) -> (i32, i32) {
        let grid = self.grid_size();
        (
            id.x * grid + self.road_width,
            id.z * grid + self.road_width,
        )
    }

    /// Maximum interior corner, inclusive.
    pub fn world_max(&self, id: PlotId) -> (i32, i32) {
        let (x, z) = self.world_min(id);
        (x + self.plot_size - 1, z + self.plot_size - 1)
    }

    pub fn center(&self, id: PlotId) -> (i32, i32) {
        let (x, z) = self.world_min(id);
        (x + self.plot_size / 2, z + self.plot_size / 2)
    }

    pub fn contains(&self, id: PlotId, x: i32, z: i32) -> bool {
        let (min_x, min_z) = self.world_min(id);
        let (max_x, max_z) = self.world_max(id);
        (min_x..=max_x).contains(&x) && (min_z..=max_z).contains(&z)
    }

    /// Chunk coordinates overlapped by a plot's interior.
    pub fn chunks_for_plot(&self, id: PlotId) -> BTreeSet<(i32, i32)> {
        let (min_x, min_z) = self.world_min(id);
        let (max_x, max_z) = self.world_max(id);
        let mut chunks = BTreeSet::new();
        for cx in min_x.div_euclid(CHUNK_WIDTH)..=max_x.div_euclid(CHUNK_WIDTH) {
            for cz in min_z.div_euclid(CHUNK_WIDTH)..=max_z.div_euclid(CHUNK_WIDTH) {
                chunks.insert((cx, cz));
            }
        }
        chunks
    }
}

/// Plot ids in growing square rings around the origin.
///
/// Ring 0 is the origin alone; ring `k` is walked right, down, left, up. The
/// walk stops after `(2n + 1)²` ids for a bound of `n` rings.
#[derive(Debug, Clone)]
pub struct Spiral {
    max_ring: i64,
    remaining: u64,
    x: i64,
    z: i64,
    direction: u8,
    run_length: u64,
    run_taken: u64,
    turns: u8,
    started: bool,
}

impl Spiral {
    pub fn new(max_ring: u32) -> Self {
        let side = 2 * u64::from(max_ring) + 1;
        Self {
            max_ring: i64::from(max_ring),
            remaining: side.saturating_mul(side),
            x: 0,
            z: 0,
            direction: 0,
            run_length: 1,
            run_taken: 0,
            turns: 0,
            started: false,
        }
    }

    fn step(&mut self) {
        match self.direction {
            0 => self.x += 1,
            1 => self.z += 1,
            2 => self.x -= 1,
            _ => self.z -= 1,
        }
        self.run_taken += 1;
        if self.run_taken >= self.run_length {
            self.run_taken = 0;
            self.direction = (self.direction + 1) % 4;
            self.turns += 1;
            if self.turns == 2 {
                self.turns = 0;
                self.run_length += 1;
            }
        }
    }

    fn in_bounds(&self) -> bool {
        self.x.abs() <= self.max_ring && self.z.abs() <= self.max_ring
    }
}

impl Iterator for Spiral {
    type Item = PlotId;

    fn next(&mut self) -> Option<PlotId> {
        if self.remaining == 0 {
            return None;
        }
        if !self.started {
            self.started = true;
        } else {
            self.step();
            while !self.in_bounds() {
                self.step();
            }
        }
        self.remaining -= 1;
        Some(PlotId::new(self.x as i32, self.z as i32))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}
