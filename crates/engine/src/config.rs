use crate::grid::GridLayout;
use crate::model::ActorId;
use crate::permissions::LimitTiers;
use crate::protection::ProtectionRules;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Keeps every ring of the auto-claim spiral inside i32 plot ids.
pub const MAX_SEARCH_RADIUS: u32 = (i32::MAX / 2) as u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockNames {
    pub plot: String,
    pub road: String,
    pub bedrock: String,
    pub border: String,
    pub fill: String,
    pub dirt: String,
}

impl Default for BlockNames {
    fn default() -> Self {
        Self {
            plot: "Soil_Grass".to_string(),
            road: "Rock_Stone_Cobble".to_string(),
            bedrock: "Rock_Volcanic".to_string(),
            border: "Rock_Stone_Cobble_Half".to_string(),
            fill: "Rock_Stone".to_string(),
            dirt: "Soil_Dirt".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Relative paths resolve against the config file's directory.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("plots.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub world_name: String,
    pub plot_size: i32,
    pub road_width: i32,
    pub ground_height: i32,

    pub default_plot_limit: u32,
    pub max_plot_limit: u32,
    pub plot_limit_permission_prefix: String,

    pub blocks: BlockNames,
    pub dirt_depth: i32,
    pub bedrock_depth: i32,
    pub border_enabled: bool,
    pub environment: String,
    /// ARGB.
    pub tint: u32,

    pub protect_bottom_layer: bool,
    pub protected_layer_height: i32,

    /// Ring bound for the auto-claim spiral search.
    pub auto_search_radius: u32,

    pub database: DatabaseConfig,
    /// Static permission grants served by the built-in oracle.
    pub grants: HashMap<ActorId, Vec<String>>,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            world_name: "plotworld".to_string(),
            plot_size: 32,
            road_width: 5,
            ground_height: 64,
            default_plot_limit: 1,
            max_plot_limit: 10,
            plot_limit_permission_prefix: "plotgrid.limit.".to_string(),
            blocks: BlockNames::default(),
            dirt_depth: 4,
            bedrock_depth: 3,
            border_enabled: true,
            environment: "Surface".to_string(),
            tint: 0xFF5B_9E28,
            protect_bottom_layer: true,
            protected_layer_height: 1,
            auto_search_radius: 100,
            database: DatabaseConfig::default(),
            grants: HashMap::new(),
        }
    }
}

impl PlotConfig {
    /// Reads a YAML config. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read config: {}", path.display()))?;
            serde_yaml::from_str::<PlotConfig>(&raw)
                .with_context(|| format!("parse config: {}", path.display()))?
        } else {
            tracing::info!(path = %path.display(), "config not found; using defaults");
            PlotConfig::default()
        };

        if config.database.path.is_relative() {
            if let Some(dir) = path.parent() {
                config.database.path = dir.join(&config.database.path);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.plot_size >= 3, "plot_size must be at least 3 (got {})", self.plot_size);
        anyhow::ensure!(self.road_width >= 0, "road_width must not be negative (got {})", self.road_width);
        anyhow::ensure!(self.max_plot_limit >= 1, "max_plot_limit must be at least 1");
        anyhow::ensure!(self.dirt_depth >= 0, "dirt_depth must not be negative");
        anyhow::ensure!(self.bedrock_depth >= 0, "bedrock_depth must not be negative");
        anyhow::ensure!(self.ground_height >= 0, "ground_height must not be negative");
        anyhow::ensure!(
            self.auto_search_radius <= MAX_SEARCH_RADIUS,
            "auto_search_radius must be at most {MAX_SEARCH_RADIUS} (got {})",
            self.auto_search_radius
        );
        Ok(())
    }

    pub fn layout(&self) -> GridLayout {
        GridLayout::new(self.plot_size, self.road_width)
    }

    pub fn limit_tiers(&self) -> LimitTiers {
        LimitTiers {
            prefix: self.plot_limit_permission_prefix.clone(),
            max_limit: self.max_plot_limit,
            default_limit: self.default_plot_limit,
        }
    }

    pub fn protection_rules(&self) -> ProtectionRules {
        ProtectionRules {
            protect_bottom_layer: self.protect_bottom_layer,
            protected_layer_height: self.protected_layer_height,
            border_enabled: self.border_enabled,
        }
    }
}
