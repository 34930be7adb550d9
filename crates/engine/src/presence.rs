use crate::grid::{GridLayout, PlotId};
use crate::model::ActorId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A change of the plot under an actor. At least one side is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotTransition {
    pub left: Option<PlotId>,
    pub entered: Option<PlotId>,
}

/// Which plot each online actor is standing in.
#[derive(Debug)]
pub struct PresenceTracker {
    layout: GridLayout,
    current: DashMap<ActorId, PlotId>,
}

impl PresenceTracker {
    pub fn new(layout: GridLayout) -> Self {
        Self {
            layout,
            current: DashMap::new(),
        }
    }

    /// Records a move to column `(x, z)`; returns the transition when the
    /// plot under the actor changed. Stepping onto a road clears it.
    pub fn on_move(&self, actor: ActorId, x: i32, z: i32) -> Option<PlotTransition> {
        let now = self.layout.plot_at(x, z);
        let before = match now {
            Some(id) => self.current.insert(actor, id),
            None => self.current.remove(&actor).map(|(_, id)| id),
        };
        (before != now).then_some(PlotTransition {
            left: before,
            entered: now,
        })
    }

    pub fn current(&self, actor: ActorId) -> Option<PlotId> {
        self.current.get(&actor).map(|id| *id)
    }

    pub fn forget(&self, actor: ActorId) -> Option<PlotId> {
        self.current.remove(&actor).map(|(_, id)| id)
    }

    pub fn online(&self) -> usize {
        self.current.len()
    }
}
