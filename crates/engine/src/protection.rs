use crate::directory::PlotDirectory;
use crate::grid::{Cell, PlotId};
use crate::model::ActorId;
use crate::permissions::{PermissionGate, BUILD_ROADS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionRules {
    pub protect_bottom_layer: bool,
    /// Highest protected y, inclusive.
    pub protected_layer_height: i32,
    pub border_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    BottomLayer,
    Road,
    Border,
    Unclaimed,
    NotPermitted,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::BottomLayer => "bottom_layer",
            DenyReason::Road => "road",
            DenyReason::Border => "border",
            DenyReason::Unclaimed => "unclaimed",
            DenyReason::NotPermitted => "not_permitted",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            DenyReason::BottomLayer => "You cannot modify the bottom layer.",
            DenyReason::Road => "You cannot modify roads.",
            DenyReason::Border => "Plot borders are protected.",
            DenyReason::Unclaimed => "This plot is not claimed.",
            DenyReason::NotPermitted => "You do not have permission to build here.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum ModifyVerdict {
    Allow,
    Deny(DenyReason),
}

impl ModifyVerdict {
    pub fn is_allowed(self) -> bool {
        self == ModifyVerdict::Allow
    }
}

/// Allow/deny decisions for modify, interact and enter attempts.
///
/// Holds no state of its own. Permission lookups go through the gate, so an
/// oracle failure reads as "not held".
#[derive(Debug, Clone)]
pub struct Protection {
    rules: ProtectionRules,
    directory: Arc<PlotDirectory>,
    gate: PermissionGate,
}

impl Protection {
    pub fn new(rules: ProtectionRules, directory: Arc<PlotDirectory>, gate: PermissionGate) -> Self {
        Self {
            rules,
            directory,
            gate,
        }
    }

    pub fn rules(&self) -> ProtectionRules {
        self.rules
    }

    pub fn is_protected_bottom_layer(&self, y: i32) -> bool {
        self.rules.protect_bottom_layer && y <= self.rules.protected_layer_height
    }

    /// Bypass first, then floor, road, border, and finally plot trust.
    pub fn check_modify(&self, actor: ActorId, x: i32, y: i32, z: i32) -> ModifyVerdict {
        if self.gate.has_admin_bypass(actor) {
            return ModifyVerdict::Allow;
        }
        if self.is_protected_bottom_layer(y) {
            return ModifyVerdict::Deny(DenyReason::BottomLayer);
        }

        let id = match self.directory.layout().classify(x, z) {
            Cell::Road => return self.road_builder(actor, DenyReason::Road),
            Cell::Border(_) if self.rules.border_enabled => {
                return self.road_builder(actor, DenyReason::Border)
            }
            Cell::Border(id) | Cell::Interior(id) => id,
        };

        match self.directory.with_plot(id, |plot| plot.can_build(actor)) {
            None => ModifyVerdict::Deny(DenyReason::Unclaimed),
            Some(true) => ModifyVerdict::Allow,
            Some(false) => ModifyVerdict::Deny(DenyReason::NotPermitted),
        }
    }

    fn road_builder(&self, actor: ActorId, reason: DenyReason) -> ModifyVerdict {
        if self.gate.has(actor, BUILD_ROADS) {
            ModifyVerdict::Allow
        } else {
            ModifyVerdict::Deny(reason)
        }
    }

    pub fn can_modify(&self, actor: ActorId, x: i32, y: i32, z: i32) -> bool {
        self.check_modify(actor, x, y, z).is_allowed()
    }

    pub fn can_interact(&self, actor: ActorId, x: i32, _y: i32, z: i32) -> bool {
        if self.gate.has_admin_bypass(actor) {
            return true;
        }
        let Some(id) = self.directory.layout().plot_at(x, z) else {
            return true;
        };
        self.directory
            .with_plot(id, |plot| plot.can_use_containers(actor))
            .unwrap_or(true)
    }

    pub fn can_enter(&self, actor: ActorId, id: PlotId) -> bool {
        if self.gate.has_admin_bypass(actor) {
            return true;
        }
        self.directory
            .with_plot(id, |plot| !plot.is_denied(actor))
            .unwrap_or(true)
    }
}
