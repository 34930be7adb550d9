use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type ActorId = Uuid;

/// Plot grid coordinate on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridRef {
    pub x: i32,
    pub z: i32,
}

impl fmt::Display for GridRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.x, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// "Actor attempted to modify/interact with voxel (x, y, z) in `world`".
/// A missing world means the plot world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEvent {
    pub actor: ActorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<String>,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Verdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            message: None,
        }
    }

    pub fn deny(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            message: Some(message.into()),
        }
    }
}

/// "Actor moved to (x, z) in `world`".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveEvent {
    pub actor: ActorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<String>,
    pub x: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<GridRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entered: Option<GridRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorRequest {
    pub actor: ActorId,
}

/// Claim a plot by grid coordinate, or the plot under a world position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub actor: ActorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<GridRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    /// World of `position`; a missing world means the plot world.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotRequest {
    pub plot: GridRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub plot: GridRef,
    pub new_owner: ActorId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRequest {
    pub plot: GridRef,
    pub actor: ActorId,
    /// `trusted`, `helper` or `visitor`; only read when adding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReply {
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub id: ActorId,
    pub trust: String,
    pub added_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotInfo {
    pub id: GridRef,
    pub owner: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub members: Vec<MemberInfo>,
    pub denied: Vec<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<Vec3>,
    pub merged_with: Vec<GridRef>,
    pub created_at: String,
    pub last_activity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub position: Vec3,
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeRequest {
    pub actor: ActorId,
    /// 1-based; clamped into range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub from: Location,
}

/// Visit a plot by coordinate, or the first plot of `owner`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitRequest {
    pub actor: ActorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<GridRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ActorId>,
    pub from: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeleportReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<GridRef>,
    pub world: String,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub error: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            error: error.into(),
        }
    }
}

pub mod codes {
    pub const INVALID_POSITION: &str = "invalid_position";
    pub const ALREADY_CLAIMED: &str = "already_claimed";
    pub const AT_LIMIT: &str = "at_limit";
    pub const NOT_FOUND: &str = "not_found";
    pub const DENIED: &str = "denied";
    pub const NO_UNCLAIMED_PLOT: &str = "no_unclaimed_plot";
    pub const NO_HOME: &str = "no_home";
    pub const NO_LAST_LOCATION: &str = "no_last_location";
    pub const BAD_REQUEST: &str = "bad_request";
    pub const FORBIDDEN: &str = "forbidden";
}
