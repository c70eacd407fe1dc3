//! SQLite-backed store for skills, targets, settings, and discovered skills.
//!
//! The store is the single source of truth for skill and target identity.
//! Every method takes the connection lock for one statement or transaction
//! only, so callers never hold it across filesystem work.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS skills (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    source_type TEXT NOT NULL,
    source_ref TEXT,
    source_subpath TEXT,
    source_branch TEXT,
    source_revision TEXT,
    central_path TEXT NOT NULL UNIQUE,
    content_hash TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS skill_targets (
    skill_id TEXT NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
    tool TEXT NOT NULL,
    mode TEXT NOT NULL,
    target_path TEXT NOT NULL,
    synced_at INTEGER NOT NULL,
    content_hash TEXT,
    UNIQUE(skill_id, tool)
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS discovered_skills (
    name TEXT NOT NULL,
    tool TEXT NOT NULL,
    path TEXT NOT NULL,
    content_hash TEXT,
    is_link INTEGER NOT NULL DEFAULT 0,
    link_target TEXT,
    found_at INTEGER NOT NULL,
    UNIQUE(tool, path)
);

CREATE INDEX IF NOT EXISTS idx_skill_targets_tool ON skill_targets(tool);
";

/// Where a managed skill came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Local,
    Git,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Local => "local",
            SourceType::Git => "git",
        }
    }
}

impl FromStr for SourceType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(SourceType::Local),
            "git" => Ok(SourceType::Git),
            other => Err(anyhow!("unknown source type '{other}'")),
        }
    }
}

/// How a target is realized on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    Symlink,
    Junction,
    Copy,
}

impl TargetMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetMode::Symlink => "symlink",
            TargetMode::Junction => "junction",
            TargetMode::Copy => "copy",
        }
    }

    /// Symlinks and junctions both read through to the central copy.
    pub fn is_link(self) -> bool {
        !matches!(self, TargetMode::Copy)
    }
}

impl fmt::Display for TargetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetMode {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "symlink" => Ok(TargetMode::Symlink),
            "junction" => Ok(TargetMode::Junction),
            "copy" => Ok(TargetMode::Copy),
            other => Err(anyhow!("unknown target mode '{other}'")),
        }
    }
}

/// A skill owned by the central repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillRecord {
    pub id: String,
    pub name: String,
    pub source_type: SourceType,
    /// Original local path, or the normalized repository URL.
    pub source_ref: Option<String>,
    pub source_subpath: Option<String>,
    pub source_branch: Option<String>,
    /// Git HEAD the central copy was taken from.
    pub source_revision: Option<String>,
    pub central_path: PathBuf,
    pub content_hash: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One skill realized in one tool directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetRecord {
    pub skill_id: String,
    pub tool: String,
    pub mode: TargetMode,
    pub target_path: PathBuf,
    pub synced_at: i64,
    /// Digest of a copied target as written, so later passes can tell our
    /// copy apart from content someone else put there. Links carry none.
    pub content_hash: Option<String>,
}

/// Row written by an onboarding scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredRecord {
    pub name: String,
    pub tool: String,
    pub path: PathBuf,
    pub content_hash: Option<String>,
    pub is_link: bool,
    pub link_target: Option<PathBuf>,
    pub found_at: i64,
}

fn path_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<PathBuf> {
    row.get::<_, String>(idx).map(PathBuf::from)
}

fn parse_col<T: FromStr<Err = anyhow::Error>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

const TARGET_COLUMNS: &str = "skill_id, tool, mode, target_path, synced_at, content_hash";

const SKILL_COLUMNS: &str = "id, name, source_type, source_ref, source_subpath, source_branch, \
     source_revision, central_path, content_hash, created_at, updated_at";

fn skill_from_row(row: &Row<'_>) -> rusqlite::Result<SkillRecord> {
    Ok(SkillRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        source_type: parse_col(row, 2)?,
        source_ref: row.get(3)?,
        source_subpath: row.get(4)?,
        source_branch: row.get(5)?,
        source_revision: row.get(6)?,
        central_path: path_col(row, 7)?,
        content_hash: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn target_from_row(row: &Row<'_>) -> rusqlite::Result<TargetRecord> {
    Ok(TargetRecord {
        skill_id: row.get(0)?,
        tool: row.get(1)?,
        mode: parse_col(row, 2)?,
        target_path: path_col(row, 3)?,
        synced_at: row.get(4)?,
        content_hash: row.get(5)?,
    })
}

/// Bring databases created by older releases up to the current schema.
fn migrate(conn: &Connection) -> Result<()> {
    if !has_column(conn, "skill_targets", "content_hash")? {
        tracing::info!("adding skill_targets.content_hash");
        conn.execute("ALTER TABLE skill_targets ADD COLUMN content_hash TEXT", [])
            .context("migrate skill_targets")?;
    }
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Handle to the hub database.
pub struct SkillStore {
    conn: Mutex<Connection>,
}

impl fmt::Debug for SkillStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkillStore").finish_non_exhaustive()
    }
}

impl SkillStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create data dir {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", "5000")?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA).context("apply schema")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Flush and close the connection.
    pub fn close(self) -> Result<()> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, e)| anyhow!(e).context("close database"))
    }

    // ---- skills ----

    pub fn upsert_skill(&self, skill: &SkillRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO skills (id, name, source_type, source_ref, source_subpath, source_branch,
                 source_revision, central_path, content_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 source_type = excluded.source_type,
                 source_ref = excluded.source_ref,
                 source_subpath = excluded.source_subpath,
                 source_branch = excluded.source_branch,
                 source_revision = excluded.source_revision,
                 central_path = excluded.central_path,
                 content_hash = excluded.content_hash,
                 updated_at = excluded.updated_at",
            params![
                skill.id,
                skill.name,
                skill.source_type.as_str(),
                skill.source_ref,
                skill.source_subpath,
                skill.source_branch,
                skill.source_revision,
                skill.central_path.to_string_lossy(),
                skill.content_hash,
                skill.created_at,
                skill.updated_at,
            ],
        )
        .with_context(|| format!("upsert skill {}", skill.name))?;
        Ok(())
    }

    pub fn get_skill(&self, id: &str) -> Result<Option<SkillRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {SKILL_COLUMNS} FROM skills WHERE id = ?1");
        Ok(conn.query_row(&sql, [id], skill_from_row).optional()?)
    }

    pub fn get_skill_by_name(&self, name: &str) -> Result<Option<SkillRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {SKILL_COLUMNS} FROM skills WHERE name = ?1");
        Ok(conn.query_row(&sql, [name], skill_from_row).optional()?)
    }

    pub fn list_skills(&self) -> Result<Vec<SkillRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {SKILL_COLUMNS} FROM skills ORDER BY name");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], skill_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Delete a skill record; its targets go with it.
    pub fn delete_skill(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM skills WHERE id = ?1", [id])? > 0)
    }

    // ---- targets ----

    pub fn upsert_target(&self, target: &TargetRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO skill_targets (skill_id, tool, mode, target_path, synced_at, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(skill_id, tool) DO UPDATE SET
                 mode = excluded.mode,
                 target_path = excluded.target_path,
                 synced_at = excluded.synced_at,
                 content_hash = excluded.content_hash",
            params![
                target.skill_id,
                target.tool,
                target.mode.as_str(),
                target.target_path.to_string_lossy(),
                target.synced_at,
                target.content_hash,
            ],
        )
        .with_context(|| format!("upsert target {}/{}", target.skill_id, target.tool))?;
        Ok(())
    }

    pub fn get_target(&self, skill_id: &str, tool: &str) -> Result<Option<TargetRecord>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {TARGET_COLUMNS} FROM skill_targets WHERE skill_id = ?1 AND tool = ?2"
                ),
                [skill_id, tool],
                target_from_row,
            )
            .optional()?)
    }

    pub fn list_targets(&self, skill_id: &str) -> Result<Vec<TargetRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            &format!("SELECT {TARGET_COLUMNS} FROM skill_targets WHERE skill_id = ?1 ORDER BY tool"),
        )?;
        let rows = stmt.query_map([skill_id], target_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every recorded target path; onboarding uses this to skip managed entries.
    pub fn all_target_paths(&self) -> Result<Vec<PathBuf>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT target_path FROM skill_targets")?;
        let rows = stmt.query_map([], |row| path_col(row, 0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete_target(&self, skill_id: &str, tool: &str) -> Result<bool> {
        let conn = self.conn.lock();
        Ok(conn.execute(
            "DELETE FROM skill_targets WHERE skill_id = ?1 AND tool = ?2",
            [skill_id, tool],
        )? > 0)
    }

    // ---- settings ----

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )
        .with_context(|| format!("set setting {key}"))?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }

    // ---- discovered skills ----

    /// Replace every discovered row with the result of the latest scan.
    pub fn replace_discovered(&self, rows: &[DiscoveredRecord]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM discovered_skills", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO discovered_skills
                     (name, tool, path, content_hash, is_link, link_target, found_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.name,
                    row.tool,
                    row.path.to_string_lossy(),
                    row.content_hash,
                    row.is_link,
                    row.link_target.as_ref().map(|p| p.to_string_lossy().into_owned()),
                    row.found_at,
                ])?;
            }
        }
        tx.commit().context("commit discovered skills")?;
        Ok(())
    }

    pub fn list_discovered(&self) -> Result<Vec<DiscoveredRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name, tool, path, content_hash, is_link, link_target, found_at
             FROM discovered_skills ORDER BY name, tool",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DiscoveredRecord {
                name: row.get(0)?,
                tool: row.get(1)?,
                path: path_col(row, 2)?,
                content_hash: row.get(3)?,
                is_link: row.get(4)?,
                link_target: row.get::<_, Option<String>>(5)?.map(PathBuf::from),
                found_at: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
