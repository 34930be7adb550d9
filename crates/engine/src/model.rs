use crate::grid::PlotId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Stable identity of a player.
pub type ActorId = Uuid;

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

/// RFC 3339 rendering of a millisecond timestamp.
pub fn format_timestamp_ms(ms: i64) -> String {
    time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ms.to_string())
}

/// Capability tier of a non-owner member. Trusted > Helper > Visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Trusted,
    Helper,
    Visitor,
}

impl TrustLevel {
    pub fn can_build(self) -> bool {
        matches!(self, TrustLevel::Trusted | TrustLevel::Helper)
    }

    pub fn can_use_containers(self) -> bool {
        self == TrustLevel::Trusted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrustLevel::Trusted => "TRUSTED",
            TrustLevel::Helper => "HELPER",
            TrustLevel::Visitor => "VISITOR",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRUSTED" => Ok(TrustLevel::Trusted),
            "HELPER" => Ok(TrustLevel::Helper),
            "VISITOR" => Ok(TrustLevel::Visitor),
            other => anyhow::bail!("unknown trust level: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotMember {
    pub id: ActorId,
    pub trust: TrustLevel,
    pub added_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotSettings {
    pub pvp: bool,
    pub mob_spawning: bool,
    pub weather: bool,
    /// Fixed time of day; `None` follows server time.
    pub fixed_time: Option<i32>,
    pub entry_message: Option<String>,
    pub exit_message: Option<String>,
    pub game_mode: Option<String>,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            pvp: false,
            mob_spawning: false,
            weather: true,
            fixed_time: None,
            entry_message: None,
            exit_message: None,
            game_mode: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Block column containing this position.
    pub fn column(&self) -> (i32, i32) {
        (self.x.floor() as i32, self.z.floor() as i32)
    }
}

/// A claimed plot. An absent `owner` marks a server-owned (admin) plot.
///
/// The owner never appears in `members`, and no identity is both a member and
/// denied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    pub id: PlotId,
    pub owner: Option<ActorId>,
    members: BTreeMap<ActorId, PlotMember>,
    denied: BTreeSet<ActorId>,
    pub settings: PlotSettings,
    pub home: Option<Position>,
    pub alias: Option<String>,
    pub merged_with: BTreeSet<PlotId>,
    created_at_ms: i64,
    last_activity_ms: i64,
}

impl Plot {
    pub fn new(id: PlotId, owner: Option<ActorId>) -> Self {
        let ts = now_ms();
        Self {
            id,
            owner,
            members: BTreeMap::new(),
            denied: BTreeSet::new(),
            settings: PlotSettings::default(),
            home: None,
            alias: None,
            merged_with: BTreeSet::new(),
            created_at_ms: ts,
            last_activity_ms: ts,
        }
    }

    /// Rebuilds a plot from stored rows. Members that collide with the owner
    /// or the deny-list are dropped so the invariants hold after a load.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: PlotId,
        owner: Option<ActorId>,
        members: impl IntoIterator<Item = PlotMember>,
        denied: impl IntoIterator<Item = ActorId>,
        settings: PlotSettings,
        home: Option<Position>,
        alias: Option<String>,
        merged_with: impl IntoIterator<Item = PlotId>,
        created_at_ms: i64,
        last_activity_ms: i64,
    ) -> Self {
        let denied: BTreeSet<ActorId> = denied.into_iter().collect();
        let members = members
            .into_iter()
            .filter(|m| Some(m.id) != owner && !denied.contains(&m.id))
            .map(|m| (m.id, m))
            .collect();
        Self {
            id,
            owner,
            members,
            denied,
            settings,
            home,
            alias,
            merged_with: merged_with.into_iter().collect(),
            created_at_ms,
            last_activity_ms,
        }
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms
    }

    pub fn touch(&mut self) {
        self.last_activity_ms = now_ms().max(self.last_activity_ms);
    }

    pub fn is_admin_plot(&self) -> bool {
        self.owner.is_none()
    }

    pub fn is_owner(&self, actor: ActorId) -> bool {
        self.owner == Some(actor)
    }

    pub fn is_member(&self, actor: ActorId) -> bool {
        self.members.contains_key(&actor)
    }

    pub fn member(&self, actor: ActorId) -> Option<&PlotMember> {
        self.members.get(&actor)
    }

    pub fn members(&self) -> impl Iterator<Item = &PlotMember> {
        self.members.values()
    }

    pub fn is_denied(&self, actor: ActorId) -> bool {
        self.denied.contains(&actor)
    }

    pub fn denied(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.denied.iter().copied()
    }

    pub fn can_build(&self, actor: ActorId) -> bool {
        self.is_owner(actor) || self.member(actor).is_some_and(|m| m.trust.can_build())
    }

    pub fn can_use_containers(&self, actor: ActorId) -> bool {
        self.is_owner(actor) || self.member(actor).is_some_and(|m| m.trust.can_use_containers())
    }

    /// This plot plus every plot merged with it.
    pub fn effective_plots(&self) -> BTreeSet<PlotId> {
        let mut ids = self.merged_with.clone();
        ids.insert(self.id);
        ids
    }

    /// No-op (returns false) for the owner, an existing member, or a denied
    /// identity; the deny has to be lifted first.
    pub fn add_member(&mut self, actor: ActorId, trust: TrustLevel) -> bool {
        if self.is_owner(actor) || self.is_member(actor) || self.is_denied(actor) {
            return false;
        }
        self.members.insert(
            actor,
            PlotMember {
                id: actor,
                trust,
                added_at_ms: now_ms(),
            },
        );
        self.touch();
        true
    }

    pub fn remove_member(&mut self, actor: ActorId) -> bool {
        let removed = self.members.remove(&actor).is_some();
        if removed {
            self.touch();
        }
        removed
    }

    /// Denying a current member evicts the membership. The owner is not
    /// exempt and, once denied, is kept out like anyone else.
    pub fn deny(&mut self, actor: ActorId) -> bool {
        if self.is_denied(actor) {
            return false;
        }
        self.denied.insert(actor);
        self.members.remove(&actor);
        self.touch();
        true
    }

    pub fn undeny(&mut self, actor: ActorId) -> bool {
        let removed = self.denied.remove(&actor);
        if removed {
            self.touch();
        }
        removed
    }

    /// Hands the plot to `new_owner`, dropping any membership or deny entry
    /// the new owner had.
    pub(crate) fn set_owner(&mut self, new_owner: Option<ActorId>) {
        if let Some(actor) = new_owner {
            self.members.remove(&actor);
            self.denied.remove(&actor);
        }
        self.owner = new_owner;
        self.touch();
    }
}

/// Where an actor stood before a plot teleport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLastLocation {
    pub actor: ActorId,
    pub world: String,
    pub position: Position,
    pub yaw: f32,
    pub pitch: f32,
    pub saved_at_ms: i64,
}

impl PlayerLastLocation {
    pub fn new(actor: ActorId, world: impl Into<String>, position: Position, yaw: f32, pitch: f32) -> Self {
        Self {
            actor,
            world: world.into(),
            position,
            yaw,
            pitch,
            saved_at_ms: now_ms(),
        }
    }
}
