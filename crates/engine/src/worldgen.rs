use crate::config::{BlockNames, PlotConfig};
use crate::error::UnknownBlockError;
use crate::grid::{Cell, GridLayout, CHUNK_WIDTH};
use crate::model::Position;

/// Host registry index of a block type.
pub type BlockId = u32;

const ENVIRONMENT_FALLBACKS: [&str; 3] = ["Surface", "Default", "Underground"];

/// The six materials of the flat world, resolved to host ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPalette {
    pub plot: BlockId,
    pub road: BlockId,
    pub bedrock: BlockId,
    pub border: BlockId,
    pub fill: BlockId,
    pub dirt: BlockId,
}

impl BlockPalette {
    /// Resolves every configured name; the first unknown one is reported with
    /// its config key.
    pub fn resolve(
        names: &BlockNames,
        lookup: impl Fn(&str) -> Option<BlockId>,
    ) -> Result<Self, UnknownBlockError> {
        let get = |key: &'static str, name: &str| {
            lookup(name).ok_or_else(|| UnknownBlockError {
                key,
                name: name.to_string(),
            })
        };
        Ok(Self {
            plot: get("plot", &names.plot)?,
            road: get("road", &names.road)?,
            bedrock: get("bedrock", &names.bedrock)?,
            border: get("border", &names.border)?,
            fill: get("fill", &names.fill)?,
            dirt: get("dirt", &names.dirt)?,
        })
    }
}

/// Configured environment, else the first known fallback, else 0.
pub fn resolve_environment(configured: &str, lookup: impl Fn(&str) -> Option<u32>) -> u32 {
    if let Some(id) = lookup(configured) {
        return id;
    }
    for name in ENVIRONMENT_FALLBACKS {
        if let Some(id) = lookup(name) {
            tracing::warn!(configured, fallback = name, "unknown environment; using fallback");
            return id;
        }
    }
    tracing::warn!(configured, "no known environment; using id 0");
    0
}

/// One generated column. `blocks[y]` is the block at height `y`; everything
/// above the last entry is air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub cell: Cell,
    pub tint: u32,
    pub environment: u32,
    pub blocks: Vec<BlockId>,
}

impl Column {
    pub fn block(&self, y: i32) -> Option<BlockId> {
        usize::try_from(y).ok().and_then(|y| self.blocks.get(y).copied())
    }

    pub fn top(&self) -> i32 {
        self.blocks.len() as i32 - 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedChunk {
    pub cx: i32,
    pub cz: i32,
    columns: Vec<Column>,
}

impl GeneratedChunk {
    /// Column at chunk-local `(lx, lz)`, both in `0..32`.
    pub fn column(&self, lx: i32, lz: i32) -> Option<&Column> {
        if !(0..CHUNK_WIDTH).contains(&lx) || !(0..CHUNK_WIDTH).contains(&lz) {
            return None;
        }
        self.columns.get((lx * CHUNK_WIDTH + lz) as usize)
    }

    pub fn columns(&self) -> impl Iterator<Item = (i32, i32, &Column)> {
        self.columns.iter().enumerate().map(|(i, c)| {
            let i = i as i32;
            (i / CHUNK_WIDTH, i % CHUNK_WIDTH, c)
        })
    }
}

/// Flat plot world: bedrock, fill, a dirt or fill subsurface, one surface
/// block, and a one-block lip on plot borders when borders are enabled.
#[derive(Debug, Clone)]
pub struct PlotWorldGen {
    layout: GridLayout,
    ground_height: i32,
    bedrock_depth: i32,
    dirt_depth: i32,
    border_enabled: bool,
    environment: u32,
    tint: u32,
    palette: BlockPalette,
}

impl PlotWorldGen {
    pub fn from_config(config: &PlotConfig, palette: BlockPalette, environment: u32) -> Self {
        Self {
            layout: config.layout(),
            ground_height: config.ground_height,
            bedrock_depth: config.bedrock_depth,
            dirt_depth: config.dirt_depth,
            border_enabled: config.border_enabled,
            environment,
            tint: config.tint,
            palette,
        }
    }

    /// Interior center of plot (0,0), one and a half blocks above ground.
    pub fn spawn_point(&self) -> Position {
        let c = f64::from(self.layout.road_width()) + f64::from(self.layout.plot_size()) / 2.0;
        Position::new(c, f64::from(self.ground_height) + 1.5, c)
    }

    pub fn column(&self, x: i32, z: i32) -> Column {
        let cell = self.layout.classify(x, z);
        let p = &self.palette;
        let surface = match cell {
            Cell::Road => p.road,
            Cell::Border(_) if self.border_enabled => p.border,
            Cell::Border(_) | Cell::Interior(_) => p.plot,
        };
        let subsurface = if cell.is_road() { p.fill } else { p.dirt };

        let mut blocks: Vec<BlockId> = (0..=self.ground_height)
            .map(|y| {
                if y < self.bedrock_depth {
                    p.bedrock
                } else if y < self.ground_height - self.dirt_depth {
                    p.fill
                } else if y < self.ground_height {
                    subsurface
                } else {
                    surface
                }
            })
            .collect();
        if self.border_enabled && cell.is_border() {
            blocks.push(p.border);
        }

        Column {
            cell,
            tint: self.tint,
            environment: self.environment,
            blocks,
        }
    }

    /// The seed is accepted for the host interface; the layout ignores it.
    /// Chunks past the i32 world edge wrap around.
    pub fn generate(&self, _seed: i64, cx: i32, cz: i32) -> GeneratedChunk {
        let (ox, oz) = (cx.wrapping_mul(CHUNK_WIDTH), cz.wrapping_mul(CHUNK_WIDTH));
        let mut columns = Vec::with_capacity((CHUNK_WIDTH * CHUNK_WIDTH) as usize);
        for lx in 0..CHUNK_WIDTH {
            for lz in 0..CHUNK_WIDTH {
                columns.push(self.column(ox.wrapping_add(lx), oz.wrapping_add(lz)));
            }
        }
        GeneratedChunk { cx, cz, columns }
    }
}
