use crate::model::{ActorId, PlayerLastLocation};
use crate::store::LastLocationRepository;
use dashmap::DashMap;
use std::sync::Arc;

/// Where each actor stood before their last plot teleport.
///
/// Memory first, falling through to the repository on a miss. Storage errors
/// are logged; the cache stays authoritative for the running session.
pub struct LastLocations {
    repo: Arc<dyn LastLocationRepository>,
    cache: DashMap<ActorId, PlayerLastLocation>,
}

impl LastLocations {
    pub fn new(repo: Arc<dyn LastLocationRepository>) -> Self {
        Self {
            repo,
            cache: DashMap::new(),
        }
    }

    pub fn save(&self, location: PlayerLastLocation) {
        if let Err(err) = self.repo.save_last_location(&location) {
            tracing::error!(actor = %location.actor, error = %err, "failed to persist last location");
        }
        self.cache.insert(location.actor, location);
    }

    pub fn get(&self, actor: ActorId) -> Option<PlayerLastLocation> {
        if let Some(hit) = self.cache.get(&actor) {
            return Some(hit.clone());
        }
        match self.repo.get_last_location(actor) {
            Ok(Some(location)) => {
                self.cache.insert(actor, location.clone());
                Some(location)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(%actor, error = %err, "failed to read last location");
                None
            }
        }
    }

    pub fn has(&self, actor: ActorId) -> bool {
        self.cache.contains_key(&actor)
            || self.repo.has_last_location(actor).unwrap_or_else(|err| {
                tracing::warn!(%actor, error = %err, "failed to probe last location");
                false
            })
    }

    pub fn clear(&self, actor: ActorId) {
        self.cache.remove(&actor);
        if let Err(err) = self.repo.delete_last_location(actor) {
            tracing::error!(%actor, error = %err, "failed to delete last location");
        }
    }

    /// Reads and forgets the saved location.
    pub fn take(&self, actor: ActorId) -> Option<PlayerLastLocation> {
        let location = self.get(actor)?;
        self.clear(actor);
        Some(location)
    }
}
