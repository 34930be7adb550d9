use crate::error::PlotError;
use crate::grid::{GridLayout, PlotId, Spiral};
use crate::model::{ActorId, Plot, PlotSettings, Position, TrustLevel};
use crate::permissions::{LimitTiers, PermissionGate};
use crate::store::PlotRepository;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::BTreeSet;
use std::sync::Arc;

/// `None` is left behind by an unclaim so that callers who fetched the slot
/// before the removal see the plot as gone.
type Slot = Arc<RwLock<Option<Plot>>>;

/// In-memory authority over plot ownership, mirrored to a [`PlotRepository`].
///
/// Lock order is: `plots` shard, then the plot slot, then `owners` shard.
/// Claims for one coordinate serialize on its `plots` entry; unclaims and
/// mutations of one plot serialize on its slot. Storage is only called with
/// no `plots` shard held.
pub struct PlotDirectory {
    repo: Arc<dyn PlotRepository>,
    gate: PermissionGate,
    tiers: LimitTiers,
    layout: GridLayout,
    search_radius: u32,
    plots: DashMap<PlotId, Slot>,
    owners: DashMap<ActorId, BTreeSet<PlotId>>,
}

impl PlotDirectory {
    pub fn new(
        repo: Arc<dyn PlotRepository>,
        gate: PermissionGate,
        tiers: LimitTiers,
        layout: GridLayout,
        search_radius: u32,
    ) -> Self {
        Self {
            repo,
            gate,
            tiers,
            layout,
            search_radius,
            plots: DashMap::new(),
            owners: DashMap::new(),
        }
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    /// Replaces the whole in-memory state with the repository's contents.
    pub fn load(&self) -> anyhow::Result<usize> {
        let stored = self.repo.all_plots()?;
        self.plots.clear();
        self.owners.clear();
        let count = stored.len();
        for plot in stored {
            if let Some(owner) = plot.owner {
                self.owners.entry(owner).or_default().insert(plot.id);
            }
            self.plots.insert(plot.id, Arc::new(RwLock::new(Some(plot))));
        }
        tracing::info!(count, "loaded plots");
        Ok(count)
    }

    fn slot(&self, id: PlotId) -> Option<Slot> {
        self.plots.get(&id).map(|s| Arc::clone(s.value()))
    }

    pub fn get(&self, id: PlotId) -> Option<Plot> {
        self.with_plot(id, Plot::clone)
    }

    /// Runs `f` against the cached plot without cloning it.
    pub fn with_plot<R>(&self, id: PlotId, f: impl FnOnce(&Plot) -> R) -> Option<R> {
        let slot = self.slot(id)?;
        let guard = slot.read();
        guard.as_ref().map(f)
    }

    pub fn is_claimed(&self, id: PlotId) -> bool {
        self.with_plot(id, |_| ()).is_some()
    }

    /// The claimed plot under a world column, if any.
    pub fn plot_at(&self, x: i32, z: i32) -> Option<Plot> {
        self.layout.plot_at(x, z).and_then(|id| self.get(id))
    }

    /// Every plot, in coordinate order.
    pub fn all_plots(&self) -> Vec<Plot> {
        let slots: Vec<Slot> = self.plots.iter().map(|e| Arc::clone(e.value())).collect();
        let mut plots: Vec<Plot> = slots.iter().filter_map(|s| s.read().clone()).collect();
        plots.sort_by_key(|p| p.id);
        plots
    }

    /// Plots owned by `actor`, in coordinate order.
    pub fn plots_for(&self, actor: ActorId) -> Vec<Plot> {
        self.owned_ids(actor)
            .into_iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn owned_ids(&self, actor: ActorId) -> BTreeSet<PlotId> {
        self.owners
            .get(&actor)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    pub fn plot_count_for(&self, actor: ActorId) -> usize {
        self.owners.get(&actor).map_or(0, |ids| ids.len())
    }

    pub fn admin_plots(&self) -> Vec<Plot> {
        let mut plots = self.all_plots();
        plots.retain(Plot::is_admin_plot);
        plots
    }

    pub fn total(&self) -> usize {
        self.plots.len()
    }

    pub fn plot_limit(&self, actor: ActorId) -> u32 {
        self.tiers.resolve(&self.gate, actor)
    }

    pub fn can_claim(&self, actor: ActorId) -> bool {
        self.plot_count_for(actor) < self.plot_limit(actor) as usize
    }

    pub fn claim(&self, id: PlotId, actor: ActorId) -> Result<Plot, PlotError> {
        let limit = self.plot_limit(actor);
        self.insert_claim(id, Some(actor), Some(limit))
    }

    /// Claims the plot under a world column; road columns are rejected.
    pub fn claim_at(&self, x: i32, z: i32, actor: ActorId) -> Result<Plot, PlotError> {
        let id = self
            .layout
            .plot_at(x, z)
            .ok_or(PlotError::InvalidPosition { x, z })?;
        self.claim(id, actor)
    }

    /// Server-owned claim: no owner, no limit.
    pub fn claim_admin(&self, id: PlotId) -> Result<Plot, PlotError> {
        self.insert_claim(id, None, None)
    }

    /// Claims the first free plot along the spiral from the origin.
    pub fn auto_claim(&self, actor: ActorId) -> Result<Plot, PlotError> {
        let limit = self.plot_limit(actor);
        let owned = self.plot_count_for(actor);
        if owned >= limit as usize {
            return Err(PlotError::AtLimit { owned, limit });
        }
        for id in Spiral::new(self.search_radius) {
            if self.is_claimed(id) {
                continue;
            }
            match self.insert_claim(id, Some(actor), Some(limit)) {
                Err(PlotError::AlreadyClaimed(_)) => continue,
                other => return other,
            }
        }
        Err(PlotError::NoUnclaimedPlot)
    }

    pub fn find_unclaimed(&self, max_ring: u32) -> Option<PlotId> {
        Spiral::new(max_ring).find(|id| !self.is_claimed(*id))
    }

    /// Nearest free plot to `center`, searched ring by ring out to `radius`.
    pub fn find_unclaimed_near(&self, center: PlotId, radius: u32) -> Option<PlotId> {
        let radius = i32::try_from(radius).unwrap_or(i32::MAX);
        for ring in 0..=radius {
            for dx in -ring..=ring {
                for dz in -ring..=ring {
                    if dx.abs() != ring && dz.abs() != ring {
                        continue;
                    }
                    let id = PlotId::new(center.x.saturating_add(dx), center.z.saturating_add(dz));
                    if !self.is_claimed(id) {
                        return Some(id);
                    }
                }
            }
        }
        None
    }

    fn insert_claim(
        &self,
        id: PlotId,
        owner: Option<ActorId>,
        limit: Option<u32>,
    ) -> Result<Plot, PlotError> {
        let plot = Plot::new(id, owner);
        let slot: Slot = Arc::new(RwLock::new(Some(plot.clone())));
        // Held until persisted so later mutations of this plot save after us.
        let pinned = slot.read();

        match self.plots.entry(id) {
            Entry::Occupied(_) => return Err(PlotError::AlreadyClaimed(id)),
            Entry::Vacant(vacant) => {
                if let Some(owner) = owner {
                    let mut owned = self.owners.entry(owner).or_default();
                    if let Some(limit) = limit {
                        if owned.len() >= limit as usize {
                            let count = owned.len();
                            drop(owned);
                            self.owners.remove_if(&owner, |_, ids| ids.is_empty());
                            return Err(PlotError::AtLimit { owned: count, limit });
                        }
                    }
                    owned.insert(id);
                }
                vacant.insert(Arc::clone(&slot));
            }
        }

        match owner {
            Some(owner) => tracing::info!(plot = %id, %owner, "plot claimed"),
            None => tracing::info!(plot = %id, "admin plot claimed"),
        }
        self.persist(&plot);
        drop(pinned);
        Ok(plot)
    }

    /// Releases a claim and returns the removed plot.
    ///
    /// The emptied slot stays mapped while storage deletes the row, so a
    /// reclaim of the same coordinate waits for that delete instead of racing
    /// it. No map shard is held across the storage call.
    pub fn unclaim(&self, id: PlotId) -> Result<Plot, PlotError> {
        let slot = self.slot(id).ok_or(PlotError::NotFound(id))?;
        let plot = {
            let mut guard = slot.write();
            let plot = guard.take().ok_or(PlotError::NotFound(id))?;
            if let Some(owner) = plot.owner {
                if let Some(mut owned) = self.owners.get_mut(&owner) {
                    owned.remove(&id);
                }
                self.owners.remove_if(&owner, |_, ids| ids.is_empty());
            }
            plot
        };

        if let Err(err) = self.repo.delete_plot(id) {
            tracing::error!(plot = %id, error = %err, "failed to delete plot from storage");
        }
        self.plots.remove_if(&id, |_, mapped| Arc::ptr_eq(mapped, &slot));

        tracing::info!(plot = %id, owner = ?plot.owner, "plot unclaimed");
        Ok(plot)
    }

    /// Hands a plot to a new owner. No limit applies to the receiver.
    pub fn transfer(&self, id: PlotId, new_owner: ActorId) -> Result<bool, PlotError> {
        self.mutate(id, |plot| {
            if plot.is_owner(new_owner) {
                return false;
            }
            let previous = plot.owner;
            plot.set_owner(Some(new_owner));
            if let Some(previous) = previous {
                if let Some(mut owned) = self.owners.get_mut(&previous) {
                    owned.remove(&id);
                }
                self.owners.remove_if(&previous, |_, ids| ids.is_empty());
            }
            self.owners.entry(new_owner).or_default().insert(id);
            tracing::info!(plot = %id, from = ?previous, to = %new_owner, "plot transferred");
            true
        })
    }

    pub fn add_member(&self, id: PlotId, actor: ActorId, trust: TrustLevel) -> Result<bool, PlotError> {
        self.mutate(id, |plot| plot.add_member(actor, trust))
    }

    pub fn remove_member(&self, id: PlotId, actor: ActorId) -> Result<bool, PlotError> {
        self.mutate(id, |plot| plot.remove_member(actor))
    }

    pub fn deny(&self, id: PlotId, actor: ActorId) -> Result<bool, PlotError> {
        self.mutate(id, |plot| plot.deny(actor))
    }

    pub fn undeny(&self, id: PlotId, actor: ActorId) -> Result<bool, PlotError> {
        self.mutate(id, |plot| plot.undeny(actor))
    }

    pub fn set_home(&self, id: PlotId, home: Option<Position>) -> Result<bool, PlotError> {
        self.mutate(id, |plot| {
            plot.home = home;
            plot.touch();
            true
        })
    }

    pub fn set_alias(&self, id: PlotId, alias: Option<String>) -> Result<bool, PlotError> {
        self.mutate(id, |plot| {
            plot.alias = alias;
            plot.touch();
            true
        })
    }

    pub fn update_settings(&self, id: PlotId, settings: PlotSettings) -> Result<bool, PlotError> {
        self.mutate(id, |plot| {
            if plot.settings == settings {
                return false;
            }
            plot.settings = settings;
            plot.touch();
            true
        })
    }

    /// Applies `apply` under the plot's write lock and persists when it
    /// reports a change. The save runs under a read lock so saves of one plot
    /// land in mutation order.
    fn mutate(&self, id: PlotId, apply: impl FnOnce(&mut Plot) -> bool) -> Result<bool, PlotError> {
        let slot = self.slot(id).ok_or(PlotError::NotFound(id))?;
        let mut guard = slot.write();
        let plot = guard.as_mut().ok_or(PlotError::NotFound(id))?;
        if !apply(plot) {
            return Ok(false);
        }
        let guard = RwLockWriteGuard::downgrade(guard);
        if let Some(plot) = guard.as_ref() {
            self.persist(plot);
        }
        Ok(true)
    }

    fn persist(&self, plot: &Plot) {
        if let Err(err) = self.repo.save_plot(plot) {
            tracing::error!(plot = %plot.id, error = %err, "failed to persist plot; keeping in-memory state");
        }
    }
}

impl std::fmt::Debug for PlotDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlotDirectory")
            .field("layout", &self.layout)
            .field("plots", &self.plots.len())
            .field("owners", &self.owners.len())
            .finish_non_exhaustive()
    }
}
