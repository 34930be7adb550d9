use crate::grid::PlotId;
use thiserror::Error;

/// Expected, user-facing outcomes of plot operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlotError {
    #[error("position ({x}, {z}) is on a road")]
    InvalidPosition { x: i32, z: i32 },
    #[error("plot {0} is already claimed")]
    AlreadyClaimed(PlotId),
    #[error("plot limit reached ({owned}/{limit})")]
    AtLimit { owned: usize, limit: u32 },
    #[error("plot {0} is not claimed")]
    NotFound(PlotId),
    #[error("denied from plot {0}")]
    Denied(PlotId),
    #[error("no unclaimed plot within search range")]
    NoUnclaimedPlot,
    #[error("actor owns no plots")]
    NoHome,
    #[error("no saved location to return to")]
    NoLastLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid plot id {input:?}: expected \"x;z\"")]
pub struct ParsePlotIdError {
    pub input: String,
}

/// A configured block name the host registry does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown block {name:?} configured for blocks.{key}")]
pub struct UnknownBlockError {
    pub key: &'static str,
    pub name: String,
}
