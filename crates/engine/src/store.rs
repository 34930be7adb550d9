use crate::grid::PlotId;
use crate::model::{ActorId, PlayerLastLocation, Plot, PlotMember, PlotSettings, Position};
use anyhow::Context;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};

/// Durable plot storage. Saves are full upserts: child collections are
/// replaced, not diffed.
pub trait PlotRepository: Send + Sync {
    fn get_plot(&self, id: PlotId) -> anyhow::Result<Option<Plot>>;
    fn save_plot(&self, plot: &Plot) -> anyhow::Result<()>;
    fn delete_plot(&self, id: PlotId) -> anyhow::Result<()>;
    fn all_plots(&self) -> anyhow::Result<Vec<Plot>>;
    fn plots_by_owner(&self, owner: ActorId) -> anyhow::Result<Vec<Plot>>;
}

/// Upsert-on-save, idempotent delete.
pub trait LastLocationRepository: Send + Sync {
    fn get_last_location(&self, actor: ActorId) -> anyhow::Result<Option<PlayerLastLocation>>;
    fn save_last_location(&self, location: &PlayerLastLocation) -> anyhow::Result<()>;
    fn delete_last_location(&self, actor: ActorId) -> anyhow::Result<()>;
    fn has_last_location(&self, actor: ActorId) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

const PLOT_COLUMNS: &str = "plot_x, plot_z, owner, alias, home_x, home_y, home_z, pvp, mob_spawning, weather, \
     fixed_time, entry_message, exit_message, game_mode, created_at_ms, last_activity_ms";

impl SqliteStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn open(&self) -> anyhow::Result<Connection> {
        let path = self.db_path.clone();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create db dir: {}", dir.display()))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open sqlite db: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        migrate(&conn)?;
        Ok(conn)
    }

    fn load_children(&self, conn: &Connection, base: PlotRow) -> anyhow::Result<Plot> {
        let id = base.id;
        let mut stmt = conn.prepare_cached(
            "SELECT member_id, trust_level, added_at_ms FROM plot_members WHERE plot_x = ?1 AND plot_z = ?2",
        )?;
        let members = stmt
            .query_map((id.x, id.z), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(member, trust, added_at_ms)| -> anyhow::Result<PlotMember> {
                Ok(PlotMember {
                    id: parse_actor(&member)?,
                    trust: trust.parse()?,
                    added_at_ms,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()
            .with_context(|| format!("members of plot {id}"))?;

        let mut stmt = conn.prepare_cached(
            "SELECT denied_id FROM plot_denied WHERE plot_x = ?1 AND plot_z = ?2",
        )?;
        let denied = stmt
            .query_map((id.x, id.z), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .iter()
            .map(|s| parse_actor(s))
            .collect::<anyhow::Result<Vec<_>>>()
            .with_context(|| format!("deny-list of plot {id}"))?;

        let mut stmt = conn.prepare_cached(
            "SELECT merged_x, merged_z FROM plot_merged WHERE plot_x = ?1 AND plot_z = ?2",
        )?;
        let merged = stmt
            .query_map((id.x, id.z), |row| Ok(PlotId::new(row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Plot::restore(
            id,
            base.owner,
            members,
            denied,
            base.settings,
            base.home,
            base.alias,
            merged,
            base.created_at_ms,
            base.last_activity_ms,
        ))
    }

    fn query_plots(&self, sql: &str, params: impl rusqlite::Params) -> anyhow::Result<Vec<Plot>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| Ok(read_plot_row(row)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|row| self.load_children(&conn, row?))
            .collect()
    }
}

struct PlotRow {
    id: PlotId,
    owner: Option<ActorId>,
    alias: Option<String>,
    home: Option<Position>,
    settings: PlotSettings,
    created_at_ms: i64,
    last_activity_ms: i64,
}

fn read_plot_row(row: &Row<'_>) -> anyhow::Result<PlotRow> {
    let id = PlotId::new(row.get(0)?, row.get(1)?);
    let owner = row
        .get::<_, Option<String>>(2)?
        .map(|s| parse_actor(&s))
        .transpose()?;
    let home = match (
        row.get::<_, Option<f64>>(4)?,
        row.get::<_, Option<f64>>(5)?,
        row.get::<_, Option<f64>>(6)?,
    ) {
        (Some(x), Some(y), Some(z)) => Some(Position::new(x, y, z)),
        _ => None,
    };
    Ok(PlotRow {
        id,
        owner,
        alias: row.get(3)?,
        home,
        settings: PlotSettings {
            pvp: row.get(7)?,
            mob_spawning: row.get(8)?,
            weather: row.get(9)?,
            fixed_time: row.get(10)?,
            entry_message: row.get(11)?,
            exit_message: row.get(12)?,
            game_mode: row.get(13)?,
        },
        created_at_ms: row.get(14)?,
        last_activity_ms: row.get(15)?,
    })
}

fn parse_actor(s: &str) -> anyhow::Result<ActorId> {
    ActorId::parse_str(s).with_context(|| format!("invalid actor id {s:?}"))
}

impl PlotRepository for SqliteStore {
    fn get_plot(&self, id: PlotId) -> anyhow::Result<Option<Plot>> {
        let sql = format!("SELECT {PLOT_COLUMNS} FROM plots WHERE plot_x = ?1 AND plot_z = ?2");
        Ok(self.query_plots(&sql, (id.x, id.z))?.into_iter().next())
    }

    fn save_plot(&self, plot: &Plot) -> anyhow::Result<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let id = plot.id;
        let s = &plot.settings;
        tx.execute(
            &format!(
                "INSERT INTO plots ({PLOT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                 ON CONFLICT(plot_x, plot_z) DO UPDATE SET
                   owner = excluded.owner,
                   alias = excluded.alias,
                   home_x = excluded.home_x,
                   home_y = excluded.home_y,
                   home_z = excluded.home_z,
                   pvp = excluded.pvp,
                   mob_spawning = excluded.mob_spawning,
                   weather = excluded.weather,
                   fixed_time = excluded.fixed_time,
                   entry_message = excluded.entry_message,
                   exit_message = excluded.exit_message,
                   game_mode = excluded.game_mode,
                   last_activity_ms = excluded.last_activity_ms"
            ),
            rusqlite::params![
                id.x,
                id.z,
                plot.owner.map(|o| o.to_string()),
                plot.alias,
                plot.home.map(|h| h.x),
                plot.home.map(|h| h.y),
                plot.home.map(|h| h.z),
                s.pvp,
                s.mob_spawning,
                s.weather,
                s.fixed_time,
                s.entry_message,
                s.exit_message,
                s.game_mode,
                plot.created_at_ms(),
                plot.last_activity_ms(),
            ],
        )?;

        tx.execute(
            "DELETE FROM plot_members WHERE plot_x = ?1 AND plot_z = ?2",
            (id.x, id.z),
        )?;
        for m in plot.members() {
            tx.execute(
                "INSERT INTO plot_members (plot_x, plot_z, member_id, trust_level, added_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id.x, id.z, m.id.to_string(), m.trust.as_str(), m.added_at_ms),
            )?;
        }

        tx.execute(
            "DELETE FROM plot_denied WHERE plot_x = ?1 AND plot_z = ?2",
            (id.x, id.z),
        )?;
        for actor in plot.denied() {
            tx.execute(
                "INSERT INTO plot_denied (plot_x, plot_z, denied_id) VALUES (?1, ?2, ?3)",
                (id.x, id.z, actor.to_string()),
            )?;
        }

        tx.execute(
            "DELETE FROM plot_merged WHERE plot_x = ?1 AND plot_z = ?2",
            (id.x, id.z),
        )?;
        for other in &plot.merged_with {
            tx.execute(
                "INSERT INTO plot_merged (plot_x, plot_z, merged_x, merged_z) VALUES (?1, ?2, ?3, ?4)",
                (id.x, id.z, other.x, other.z),
            )?;
        }

        tx.commit().with_context(|| format!("save plot {id}"))?;
        Ok(())
    }

    fn delete_plot(&self, id: PlotId) -> anyhow::Result<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        for table in ["plot_members", "plot_denied", "plot_merged", "plots"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE plot_x = ?1 AND plot_z = ?2"),
                (id.x, id.z),
            )?;
        }
        tx.commit().with_context(|| format!("delete plot {id}"))?;
        Ok(())
    }

    fn all_plots(&self) -> anyhow::Result<Vec<Plot>> {
        let sql = format!("SELECT {PLOT_COLUMNS} FROM plots ORDER BY plot_x, plot_z");
        self.query_plots(&sql, [])
    }

    fn plots_by_owner(&self, owner: ActorId) -> anyhow::Result<Vec<Plot>> {
        let sql = format!("SELECT {PLOT_COLUMNS} FROM plots WHERE owner = ?1 ORDER BY plot_x, plot_z");
        self.query_plots(&sql, [owner.to_string()])
    }
}

impl LastLocationRepository for SqliteStore {
    fn get_last_location(&self, actor: ActorId) -> anyhow::Result<Option<PlayerLastLocation>> {
        let conn = self.open()?;
        let loc = conn
            .query_row(
                "SELECT world_name, x, y, z, yaw, pitch, saved_at_ms
                 FROM player_last_locations WHERE actor_id = ?1",
                [actor.to_string()],
                |row| {
                    Ok(PlayerLastLocation {
                        actor,
                        world: row.get(0)?,
                        position: Position::new(row.get(1)?, row.get(2)?, row.get(3)?),
                        yaw: row.get::<_, f64>(4)? as f32,
                        pitch: row.get::<_, f64>(5)? as f32,
                        saved_at_ms: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(loc)
    }

    fn save_last_location(&self, location: &PlayerLastLocation) -> anyhow::Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO player_last_locations (actor_id, world_name, x, y, z, yaw, pitch, saved_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(actor_id) DO UPDATE SET
               world_name = excluded.world_name,
               x = excluded.x, y = excluded.y, z = excluded.z,
               yaw = excluded.yaw, pitch = excluded.pitch,
               saved_at_ms = excluded.saved_at_ms",
            rusqlite::params![
                location.actor.to_string(),
                location.world,
                location.position.x,
                location.position.y,
                location.position.z,
                f64::from(location.yaw),
                f64::from(location.pitch),
                location.saved_at_ms,
            ],
        )?;
        Ok(())
    }

    fn delete_last_location(&self, actor: ActorId) -> anyhow::Result<()> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM player_last_locations WHERE actor_id = ?1",
            [actor.to_string()],
        )?;
        Ok(())
    }

    fn has_last_location(&self, actor: ActorId) -> anyhow::Result<bool> {
        let conn = self.open()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM player_last_locations WHERE actor_id = ?1",
            [actor.to_string()],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    let v: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if v < 1 {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS plots (
  plot_x INTEGER NOT NULL,
  plot_z INTEGER NOT NULL,
  owner TEXT,
  alias TEXT,
  home_x REAL,
  home_y REAL,
  home_z REAL,
  pvp INTEGER NOT NULL DEFAULT 0,
  mob_spawning INTEGER NOT NULL DEFAULT 0,
  weather INTEGER NOT NULL DEFAULT 1,
  fixed_time INTEGER,
  entry_message TEXT,
  exit_message TEXT,
  game_mode TEXT,
  created_at_ms INTEGER NOT NULL,
  last_activity_ms INTEGER NOT NULL,
  PRIMARY KEY (plot_x, plot_z)
);

CREATE INDEX IF NOT EXISTS idx_plots_owner ON plots(owner);

CREATE TABLE IF NOT EXISTS plot_members (
  plot_x INTEGER NOT NULL,
  plot_z INTEGER NOT NULL,
  member_id TEXT NOT NULL,
  trust_level TEXT NOT NULL,
  added_at_ms INTEGER NOT NULL,
  PRIMARY KEY (plot_x, plot_z, member_id)
);

CREATE TABLE IF NOT EXISTS plot_denied (
  plot_x INTEGER NOT NULL,
  plot_z INTEGER NOT NULL,
  denied_id TEXT NOT NULL,
  PRIMARY KEY (plot_x, plot_z, denied_id)
);

CREATE TABLE IF NOT EXISTS plot_merged (
  plot_x INTEGER NOT NULL,
  plot_z INTEGER NOT NULL,
  merged_x INTEGER NOT NULL,
  merged_z INTEGER NOT NULL,
  PRIMARY KEY (plot_x, plot_z, merged_x, merged_z)
);

-- One row per actor; overwritten before each plot teleport.
CREATE TABLE IF NOT EXISTS player_last_locations (
  actor_id TEXT PRIMARY KEY,
  world_name TEXT NOT NULL,
  x REAL NOT NULL,
  y REAL NOT NULL,
  z REAL NOT NULL,
  yaw REAL NOT NULL DEFAULT 0,
  pitch REAL NOT NULL DEFAULT 0,
  saved_at_ms INTEGER NOT NULL
);
"#,
        )?;

        conn.pragma_update(None, "user_version", 1_i64)?;
    }

    Ok(())
}
