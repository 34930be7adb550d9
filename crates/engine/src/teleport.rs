use crate::directory::PlotDirectory;
use crate::error::PlotError;
use crate::grid::PlotId;
use crate::locations::LastLocations;
use crate::model::{ActorId, PlayerLastLocation, Plot, Position};
use crate::protection::Protection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where an actor stands right now, as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Whereabouts {
    pub world: String,
    pub position: Position,
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
}

/// Resolved destination. The host performs the actual move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeleportTarget {
    pub plot: Option<PlotId>,
    pub world: String,
    pub position: Position,
    pub yaw: f32,
    pub pitch: f32,
}

/// Home, visit and back resolution. Every plot teleport first records the
/// actor's current spot so `back` can return them.
pub struct Teleports {
    directory: Arc<PlotDirectory>,
    protection: Protection,
    locations: Arc<LastLocations>,
    world: String,
    ground_height: i32,
}

impl Teleports {
    pub fn new(
        directory: Arc<PlotDirectory>,
        protection: Protection,
        locations: Arc<LastLocations>,
        world: impl Into<String>,
        ground_height: i32,
    ) -> Self {
        Self {
            directory,
            protection,
            locations,
            world: world.into(),
            ground_height,
        }
    }

    /// Plot center, one block above ground.
    pub fn plot_center(&self, id: PlotId) -> Position {
        let layout = self.directory.layout();
        let (min_x, min_z) = layout.world_min(id);
        let half = f64::from(layout.plot_size()) / 2.0;
        Position::new(
            f64::from(min_x) + half,
            f64::from(self.ground_height + 1),
            f64::from(min_z) + half,
        )
    }

    fn target(&self, plot: &Plot, use_home: bool) -> TeleportTarget {
        let position = match plot.home {
            Some(home) if use_home => home,
            _ => self.plot_center(plot.id),
        };
        TeleportTarget {
            plot: Some(plot.id),
            world: self.world.clone(),
            position,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    fn remember(&self, actor: ActorId, from: Whereabouts) {
        self.locations.save(PlayerLastLocation::new(
            actor,
            from.world,
            from.position,
            from.yaw,
            from.pitch,
        ));
    }

    /// 1-based index over the actor's plots in coordinate order; out-of-range
    /// indices are clamped.
    pub fn home(&self, actor: ActorId, index: Option<u32>, from: Whereabouts) -> Result<TeleportTarget, PlotError> {
        let plots = self.directory.plots_for(actor);
        if plots.is_empty() {
            return Err(PlotError::NoHome);
        }
        let index = usize::try_from(index.unwrap_or(1))
            .unwrap_or(usize::MAX)
            .clamp(1, plots.len());
        let target = self.target(&plots[index - 1], true);
        self.remember(actor, from);
        Ok(target)
    }

    pub fn visit(&self, actor: ActorId, id: PlotId, from: Whereabouts) -> Result<TeleportTarget, PlotError> {
        let plot = self.directory.get(id).ok_or(PlotError::NotFound(id))?;
        if !self.protection.can_enter(actor, id) {
            return Err(PlotError::Denied(id));
        }
        let target = self.target(&plot, false);
        self.remember(actor, from);
        Ok(target)
    }

    /// Visits the first plot of `owner`.
    pub fn visit_owner(&self, actor: ActorId, owner: ActorId, from: Whereabouts) -> Result<TeleportTarget, PlotError> {
        let id = self
            .directory
            .owned_ids(owner)
            .into_iter()
            .next()
            .ok_or(PlotError::NoHome)?;
        self.visit(actor, id, from)
    }

    /// Returns to the spot saved by the last plot teleport and forgets it.
    pub fn back(&self, actor: ActorId) -> Result<TeleportTarget, PlotError> {
        let last = self.locations.take(actor).ok_or(PlotError::NoLastLocation)?;
        Ok(TeleportTarget {
            plot: None,
            world: last.world,
            position: last.position,
            yaw: last.yaw,
            pitch: last.pitch,
        })
    }
}
