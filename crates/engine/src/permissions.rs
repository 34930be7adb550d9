use crate::model::ActorId;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub const ADMIN_BYPASS: &str = "plotgrid.admin.bypass";
pub const BUILD_ROADS: &str = "plotgrid.admin.roads";

/// External permission lookup, keyed by actor and permission name.
///
/// An `Err` means the lookup itself failed; callers go through
/// [`PermissionGate`], which reads that as "not held".
pub trait PermissionOracle: Send + Sync {
    fn has_permission(&self, actor: ActorId, permission: &str) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PermissionGate {
    oracle: Arc<dyn PermissionOracle>,
}

impl PermissionGate {
    pub fn new(oracle: Arc<dyn PermissionOracle>) -> Self {
        Self { oracle }
    }

    pub fn has(&self, actor: ActorId, permission: &str) -> bool {
        match self.oracle.has_permission(actor, permission) {
            Ok(held) => held,
            Err(err) => {
                tracing::warn!(%actor, permission, error = %err, "permission lookup failed; treating as not held");
                false
            }
        }
    }

    pub fn has_admin_bypass(&self, actor: ActorId) -> bool {
        self.has(actor, ADMIN_BYPASS)
    }
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate").finish_non_exhaustive()
    }
}

/// Permission-derived plot limits: `<prefix><n>` grants a limit of `n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitTiers {
    pub prefix: String,
    pub max_limit: u32,
    pub default_limit: u32,
}

impl LimitTiers {
    /// Highest held tier, scanning down from `max_limit`; `default_limit` when
    /// none is held.
    pub fn resolve(&self, gate: &PermissionGate, actor: ActorId) -> u32 {
        (1..=self.max_limit)
            .rev()
            .find(|tier| gate.has(actor, &format!("{}{tier}", self.prefix)))
            .unwrap_or(self.default_limit)
    }
}

/// In-memory grant table. Backs the server's static grants and tests.
#[derive(Debug, Default)]
pub struct GrantTable {
    grants: DashMap<ActorId, BTreeSet<String>>,
}

impl GrantTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: &HashMap<ActorId, Vec<String>>) -> Self {
        let table = Self::new();
        for (actor, perms) in map {
            for perm in perms {
                table.grant(*actor, perm);
            }
        }
        table
    }

    pub fn grant(&self, actor: ActorId, permission: &str) {
        self.grants
            .entry(actor)
            .or_default()
            .insert(permission.to_string());
    }

    pub fn revoke(&self, actor: ActorId, permission: &str) -> bool {
        self.grants
            .get_mut(&actor)
            .map(|mut set| set.remove(permission))
            .unwrap_or(false)
    }
}

impl PermissionOracle for GrantTable {
    fn has_permission(&self, actor: ActorId, permission: &str) -> anyhow::Result<bool> {
        Ok(self
            .grants
            .get(&actor)
            .is_some_and(|set| set.contains(permission) || set.contains("*")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct Broken;

    impl PermissionOracle for Broken {
        fn has_permission(&self, _actor: ActorId, _permission: &str) -> anyhow::Result<bool> {
            anyhow::bail!("permission backend offline")
        }
    }

    fn tiers() -> LimitTiers {
        LimitTiers {
            prefix: "plotgrid.limit.".to_string(),
            max_limit: 10,
            default_limit: 1,
        }
    }

    #[test]
    fn highest_tier_wins() {
        let table = Arc::new(GrantTable::new());
        let actor = Uuid::new_v4();
        table.grant(actor, "plotgrid.limit.1");
        table.grant(actor, "plotgrid.limit.3");
        let gate = PermissionGate::new(table);
        assert_eq!(tiers().resolve(&gate, actor), 3);
    }

    #[test]
    fn default_limit_without_tiers() {
        let gate = PermissionGate::new(Arc::new(GrantTable::new()));
        assert_eq!(tiers().resolve(&gate, Uuid::new_v4()), 1);
    }

    #[test]
    fn tiers_above_max_are_ignored() {
        let table = Arc::new(GrantTable::new());
        let actor = Uuid::new_v4();
        table.grant(actor, "plotgrid.limit.50");
        let gate = PermissionGate::new(table);
        assert_eq!(tiers().resolve(&gate, actor), 1);
    }

    #[test]
    fn oracle_failure_fails_closed() {
        let gate = PermissionGate::new(Arc::new(Broken));
        let actor = Uuid::new_v4();
        assert!(!gate.has_admin_bypass(actor));
        assert_eq!(tiers().resolve(&gate, actor), 1);
    }

    #[test]
    fn revoke_removes_grant() {
        let table = GrantTable::new();
        let actor = Uuid::new_v4();
        table.grant(actor, BUILD_ROADS);
        assert!(table.has_permission(actor, BUILD_ROADS).unwrap());
        assert!(table.revoke(actor, BUILD_ROADS));
        assert!(!table.has_permission(actor, BUILD_ROADS).unwrap());
    }
}
