//! Plot-world core: grid partitioning, the in-memory plot directory and its
//! SQLite mirror, protection decisions, and flat world generation.
//!
//! Everything here works on plain identifiers and coordinates. Host-engine
//! dispatch lives in the server crate.

pub mod config;
pub mod directory;
pub mod error;
pub mod grid;
pub mod locations;
pub mod model;
pub mod permissions;
pub mod presence;
pub mod protection;
pub mod store;
pub mod teleport;
pub mod worldgen;

pub use config::PlotConfig;
pub use directory::PlotDirectory;
pub use error::PlotError;
pub use grid::{Cell, GridLayout, PlotId, Spiral};
pub use locations::LastLocations;
pub use model::{ActorId, PlayerLastLocation, Plot, PlotSettings, Position, TrustLevel};
pub use permissions::{GrantTable, PermissionGate, PermissionOracle};
pub use presence::{PlotTransition, PresenceTracker};
pub use protection::{DenyReason, ModifyVerdict, Protection};
pub use store::SqliteStore;
pub use teleport::{TeleportTarget, Teleports, Whereabouts};
pub use worldgen::{BlockPalette, PlotWorldGen};
