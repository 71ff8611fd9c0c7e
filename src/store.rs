//! Persistent index storage.
//!
//! SQLite with WAL journaling: one writer (the indexer), any number of
//! concurrent readers. Class names live twice, in a plain table for
//! exact/glob/regex lookups and in an FTS5 mirror (trigram tokenizer,
//! shared rowid) for fragment search. Every public method opens its own
//! connection so callers never manage connection lifetime.

use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One `(groupId, artifactId, version)` coordinate and its on-disk files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub id: i64,
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub abspath: PathBuf,
    pub has_source: bool,
    pub is_indexed: bool,
}

impl Artifact {
    pub fn coordinate(&self) -> String {
        format!("{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Extends,
    Implements,
}

impl EdgeKind {
    fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Extends => "extends",
            EdgeKind::Implements => "implements",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassRow {
    pub fq_name: String,
    pub simple_name: String,
}

#[derive(Debug, Clone)]
pub struct EdgeRow {
    pub class_name: String,
    pub parent_name: String,
    pub kind: EdgeKind,
}

/// A resource definition extracted from an archive, plus the logical
/// class names its code generator produces.
#[derive(Debug, Clone)]
pub struct ResourceRow {
    pub path: String,
    pub content: String,
    pub kind: String,
    pub classes: Vec<String>,
}

/// Everything one artifact contributes to the index; committed atomically
/// together with the `is_indexed` flip.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSymbols {
    pub classes: Vec<ClassRow>,
    pub edges: Vec<EdgeRow>,
    pub resources: Vec<ResourceRow>,
}

/// A class hit joined with the artifact carrying it.
#[derive(Debug, Clone, Serialize)]
pub struct ClassHit {
    pub fq_name: String,
    pub simple_name: String,
    pub artifact: Artifact,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceHit {
    pub path: String,
    pub kind: String,
    pub artifact: Artifact,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceContent {
    pub path: String,
    pub content: String,
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub store_path: String,
    pub artifacts: u64,
    pub indexed_artifacts: u64,
    pub classes: u64,
    pub inheritance_edges: u64,
    pub resources: u64,
}

pub const CLASS_QUERY_LIMIT: usize = 100;
pub const ARTIFACT_QUERY_LIMIT: usize = 50;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS artifacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id TEXT NOT NULL,
    artifact_id TEXT NOT NULL,
    version TEXT NOT NULL,
    abspath TEXT NOT NULL,
    has_source INTEGER NOT NULL DEFAULT 0,
    is_indexed INTEGER NOT NULL DEFAULT 0,
    UNIQUE(group_id, artifact_id, version)
);
CREATE TABLE IF NOT EXISTS classes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    artifact_id INTEGER NOT NULL REFERENCES artifacts(id),
    fq_name TEXT NOT NULL,
    simple_name TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_classes_fq ON classes(fq_name);
CREATE INDEX IF NOT EXISTS idx_classes_artifact ON classes(artifact_id);
CREATE VIRTUAL TABLE IF NOT EXISTS class_fts USING fts5(
    fq_name, simple_name, tokenize='trigram'
);
CREATE TABLE IF NOT EXISTS inheritance (
    artifact_id INTEGER NOT NULL REFERENCES artifacts(id),
    class_name TEXT NOT NULL,
    parent_name TEXT NOT NULL,
    kind TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_inheritance_parent ON inheritance(parent_name);
CREATE INDEX IF NOT EXISTS idx_inheritance_artifact ON inheritance(artifact_id);
CREATE TABLE IF NOT EXISTS resources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    artifact_id INTEGER NOT NULL REFERENCES artifacts(id),
    path TEXT NOT NULL,
    content TEXT NOT NULL,
    kind TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_resources_artifact ON resources(artifact_id);
CREATE TABLE IF NOT EXISTS resource_classes (
    resource_id INTEGER NOT NULL REFERENCES resources(id),
    class_name TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_resource_classes_name ON resource_classes(class_name);
";

pub struct Store {
    db_path: PathBuf,
}

impl Store {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store directory: {}", parent.display()))?;
        }
        let store = Self { db_path };
        let conn = store.connect()?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize store schema")?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open store: {}", self.db_path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )?;
        register_regexp(&conn)?;
        Ok(conn)
    }

    /// Insert-if-absent on the coordinate triple, in one transaction.
    /// Existing rows keep their `is_indexed` state; only the on-disk
    /// attributes are refreshed.
    pub fn upsert_artifacts(&self, artifacts: &[Artifact]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO artifacts(group_id, artifact_id, version, abspath, has_source, is_indexed)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)
                 ON CONFLICT(group_id, artifact_id, version)
                 DO UPDATE SET abspath = excluded.abspath, has_source = excluded.has_source",
            )?;
            for a in artifacts {
                let changed = stmt.execute(params![
                    a.group_id,
                    a.artifact_id,
                    a.version,
                    a.abspath.to_string_lossy(),
                    a.has_source,
                ])?;
                inserted += changed;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn find_unindexed(&self) -> Result<Vec<Artifact>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ARTIFACT_COLS} FROM artifacts WHERE is_indexed = 0 ORDER BY id"
        ))?;
        let rows = stmt.query_map([], artifact_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn artifact_by_id(&self, id: i64) -> Result<Option<Artifact>> {
        let conn = self.connect()?;
        let artifact = conn
            .query_row(
                &format!("SELECT {ARTIFACT_COLS} FROM artifacts WHERE id = ?1"),
                params![id],
                artifact_from_row,
            )
            .optional()?;
        Ok(artifact)
    }

    pub fn artifact_by_coordinate(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
    ) -> Result<Option<Artifact>> {
        let conn = self.connect()?;
        let artifact = conn
            .query_row(
                &format!(
                    "SELECT {ARTIFACT_COLS} FROM artifacts
                     WHERE group_id = ?1 AND artifact_id = ?2 AND version = ?3"
                ),
                params![group_id, artifact_id, version],
                artifact_from_row,
            )
            .optional()?;
        Ok(artifact)
    }

    /// Commit everything one artifact contributes and flip `is_indexed`,
    /// atomically. Replaces any rows a previous partial pass left behind.
    pub fn ingest_artifact(&self, artifact_id: i64, symbols: &ArtifactSymbols) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM class_fts WHERE rowid IN (SELECT id FROM classes WHERE artifact_id = ?1)",
            params![artifact_id],
        )?;
        tx.execute("DELETE FROM classes WHERE artifact_id = ?1", params![artifact_id])?;
        tx.execute(
            "DELETE FROM inheritance WHERE artifact_id = ?1",
            params![artifact_id],
        )?;
        tx.execute(
            "DELETE FROM resource_classes WHERE resource_id IN
                 (SELECT id FROM resources WHERE artifact_id = ?1)",
            params![artifact_id],
        )?;
        tx.execute("DELETE FROM resources WHERE artifact_id = ?1", params![artifact_id])?;

        {
            let mut class_stmt = tx.prepare(
                "INSERT INTO classes(artifact_id, fq_name, simple_name) VALUES (?1, ?2, ?3)",
            )?;
            let mut fts_stmt = tx.prepare(
                "INSERT INTO class_fts(rowid, fq_name, simple_name) VALUES (?1, ?2, ?3)",
            )?;
            for class in &symbols.classes {
                class_stmt.execute(params![artifact_id, class.fq_name, class.simple_name])?;
                let rowid = tx.last_insert_rowid();
                fts_stmt.execute(params![rowid, class.fq_name, class.simple_name])?;
            }

            let mut edge_stmt = tx.prepare(
                "INSERT INTO inheritance(artifact_id, class_name, parent_name, kind)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for edge in &symbols.edges {
                edge_stmt.execute(params![
                    artifact_id,
                    edge.class_name,
                    edge.parent_name,
                    edge.kind.as_str(),
                ])?;
            }

            let mut resource_stmt = tx.prepare(
                "INSERT INTO resources(artifact_id, path, content, kind) VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut link_stmt = tx
                .prepare("INSERT INTO resource_classes(resource_id, class_name) VALUES (?1, ?2)")?;
            for resource in &symbols.resources {
                resource_stmt.execute(params![
                    artifact_id,
                    resource.path,
                    resource.content,
                    resource.kind,
                ])?;
                let resource_id = tx.last_insert_rowid();
                for class in &resource.classes {
                    link_stmt.execute(params![resource_id, class])?;
                }
            }
        }

        tx.execute(
            "UPDATE artifacts SET is_indexed = 1 WHERE id = ?1",
            params![artifact_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Reset every artifact to unindexed and empty the dependent tables,
    /// in one transaction.
    pub fn refresh_all(&self) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM class_fts;
             DELETE FROM classes;
             DELETE FROM inheritance;
             DELETE FROM resource_classes;
             DELETE FROM resources;
             UPDATE artifacts SET is_indexed = 0;",
        )?;
        tx.commit()?;
        Ok(())
    }

    /// One-time repair: inheritance capture was added after class capture,
    /// so a store can hold indexed artifacts with no edges at all. Those
    /// artifacts are reset for re-ingestion; otherwise hierarchy queries
    /// silently return nothing.
    pub fn reset_if_missing_inheritance(&self) -> Result<bool> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let edges: i64 = tx.query_row("SELECT COUNT(*) FROM inheritance", [], |r| r.get(0))?;
        let classes: i64 = tx.query_row("SELECT COUNT(*) FROM classes", [], |r| r.get(0))?;
        let indexed: i64 =
            tx.query_row("SELECT COUNT(*) FROM artifacts WHERE is_indexed = 1", [], |r| {
                r.get(0)
            })?;
        // Only the legacy shape (classes captured, edges never were) is
        // repaired; a store of pom-only artifacts has no edges either.
        if edges > 0 || classes == 0 || indexed == 0 {
            return Ok(false);
        }
        tx.execute_batch(
            "DELETE FROM class_fts;
             DELETE FROM classes;
             UPDATE artifacts SET is_indexed = 0;",
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// FTS fragment query; `match_expr` is a full FTS5 MATCH expression.
    pub fn search_classes_fts(&self, match_expr: &str) -> Result<Vec<ClassHit>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT c.fq_name, c.simple_name, {ARTIFACT_COLS_A}
             FROM class_fts
             JOIN classes c ON c.id = class_fts.rowid
             JOIN artifacts a ON a.id = c.artifact_id
             WHERE class_fts MATCH ?1
             ORDER BY class_fts.rank
             LIMIT {CLASS_QUERY_LIMIT}"
        ))?;
        let rows = stmt.query_map(params![match_expr], class_hit_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// LIKE query over both name columns; `pattern` uses `%`/`_` with `\`
    /// as the escape character.
    pub fn search_classes_like(&self, pattern: &str) -> Result<Vec<ClassHit>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT c.fq_name, c.simple_name, {ARTIFACT_COLS_A}
             FROM classes c
             JOIN artifacts a ON a.id = c.artifact_id
             WHERE c.fq_name LIKE ?1 ESCAPE '\\' OR c.simple_name LIKE ?1 ESCAPE '\\'
             ORDER BY c.fq_name
             LIMIT {CLASS_QUERY_LIMIT}"
        ))?;
        let rows = stmt.query_map(params![pattern], class_hit_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn search_classes_regex(&self, pattern: &str) -> Result<Vec<ClassHit>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT c.fq_name, c.simple_name, {ARTIFACT_COLS_A}
             FROM classes c
             JOIN artifacts a ON a.id = c.artifact_id
             WHERE c.fq_name REGEXP ?1 OR c.simple_name REGEXP ?1
             ORDER BY c.fq_name
             LIMIT {CLASS_QUERY_LIMIT}"
        ))?;
        let rows = stmt.query_map(params![pattern], class_hit_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn lookup_class_exact(&self, fq_name: &str) -> Result<Vec<ClassHit>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT c.fq_name, c.simple_name, {ARTIFACT_COLS_A}
             FROM classes c
             JOIN artifacts a ON a.id = c.artifact_id
             WHERE c.fq_name = ?1
             ORDER BY a.id
             LIMIT {CLASS_QUERY_LIMIT}"
        ))?;
        let rows = stmt.query_map(params![fq_name], class_hit_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Transitive descendants of `parent_name` in the inheritance graph.
    /// `UNION` (not `UNION ALL`) deduplicates, which also bounds the walk
    /// on cyclic edges across artifacts.
    pub fn descendants_of(&self, parent_name: &str) -> Result<Vec<ClassHit>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "WITH RECURSIVE descendants(name) AS (
                 SELECT ?1
                 UNION
                 SELECT i.class_name FROM inheritance i
                 JOIN descendants d ON i.parent_name = d.name
             )
             SELECT DISTINCT c.fq_name, c.simple_name, {ARTIFACT_COLS_A}
             FROM descendants d
             JOIN classes c ON c.fq_name = d.name
             JOIN artifacts a ON a.id = c.artifact_id
             WHERE d.name != ?1
             ORDER BY c.fq_name, a.id
             LIMIT {CLASS_QUERY_LIMIT}"
        ))?;
        let rows = stmt.query_map(params![parent_name], class_hit_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn search_artifacts(&self, query: &str) -> Result<Vec<Artifact>> {
        let conn = self.connect()?;
        let pattern = format!("%{}%", escape_like(query));
        let mut stmt = conn.prepare(&format!(
            "SELECT {ARTIFACT_COLS} FROM artifacts
             WHERE group_id LIKE ?1 ESCAPE '\\' OR artifact_id LIKE ?1 ESCAPE '\\'
             ORDER BY group_id, artifact_id, version
             LIMIT {ARTIFACT_QUERY_LIMIT}"
        ))?;
        let rows = stmt.query_map(params![pattern], artifact_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn search_resources(&self, path_fragment: &str) -> Result<Vec<ResourceHit>> {
        let conn = self.connect()?;
        let pattern = format!("%{}%", escape_like(path_fragment));
        let mut stmt = conn.prepare(&format!(
            "SELECT r.path, r.kind, {ARTIFACT_COLS_A}
             FROM resources r
             JOIN artifacts a ON a.id = r.artifact_id
             WHERE r.path LIKE ?1 ESCAPE '\\'
             ORDER BY r.path
             LIMIT {CLASS_QUERY_LIMIT}"
        ))?;
        let rows = stmt.query_map(params![pattern], |row| {
            Ok(ResourceHit {
                path: row.get(0)?,
                kind: row.get(1)?,
                artifact: artifact_from_offset(row, 2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn resources_for_class(&self, fq_name: &str) -> Result<Vec<ResourceContent>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT r.path, r.content, r.kind
             FROM resource_classes rc
             JOIN resources r ON r.id = rc.resource_id
             WHERE rc.class_name = ?1
             ORDER BY r.path",
        )?;
        let rows = stmt.query_map(params![fq_name], |row| {
            Ok(ResourceContent {
                path: row.get(0)?,
                content: row.get(1)?,
                kind: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn artifacts_for_class(&self, fq_name: &str) -> Result<Vec<Artifact>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {ARTIFACT_COLS_A}
             FROM classes c
             JOIN artifacts a ON a.id = c.artifact_id
             WHERE c.fq_name = ?1
             ORDER BY a.id"
        ))?;
        let rows = stmt.query_map(params![fq_name], |row| artifact_from_offset(row, 0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.connect()?;
        let count = |sql: &str| -> Result<u64> {
            Ok(conn.query_row(sql, [], |r| r.get::<_, i64>(0))? as u64)
        };
        Ok(StoreStats {
            store_path: self.db_path.to_string_lossy().to_string(),
            artifacts: count("SELECT COUNT(*) FROM artifacts")?,
            indexed_artifacts: count("SELECT COUNT(*) FROM artifacts WHERE is_indexed = 1")?,
            classes: count("SELECT COUNT(*) FROM classes")?,
            inheritance_edges: count("SELECT COUNT(*) FROM inheritance")?,
            resources: count("SELECT COUNT(*) FROM resources")?,
        })
    }
}

const ARTIFACT_COLS: &str =
    "id, group_id, artifact_id, version, abspath, has_source, is_indexed";
const ARTIFACT_COLS_A: &str =
    "a.id, a.group_id, a.artifact_id, a.version, a.abspath, a.has_source, a.is_indexed";

fn artifact_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Artifact> {
    artifact_from_offset(row, 0)
}

fn artifact_from_offset(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Artifact> {
    Ok(Artifact {
        id: row.get(offset)?,
        group_id: row.get(offset + 1)?,
        artifact_id: row.get(offset + 2)?,
        version: row.get(offset + 3)?,
        abspath: PathBuf::from(row.get::<_, String>(offset + 4)?),
        has_source: row.get(offset + 5)?,
        is_indexed: row.get(offset + 6)?,
    })
}

fn class_hit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClassHit> {
    Ok(ClassHit {
        fq_name: row.get(0)?,
        simple_name: row.get(1)?,
        artifact: artifact_from_offset(row, 2)?,
    })
}

pub fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// `X REGEXP Y` support for the regex search path. The last compiled
/// pattern is cached per connection; queries bind one pattern for all rows.
fn register_regexp(conn: &Connection) -> Result<()> {
    let cache: Mutex<Option<(String, Regex)>> = Mutex::new(None);
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        move |ctx| {
            let pattern = ctx.get::<String>(0)?;
            let text = ctx.get::<String>(1)?;
            let mut cached = cache.lock().unwrap_or_else(|e| e.into_inner());
            let entry = match cached.take() {
                Some((p, r)) if p == pattern => cached.insert((p, r)),
                _ => {
                    let compiled = Regex::new(&pattern)
                        .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
                    cached.insert((pattern, compiled))
                }
            };
            Ok(entry.1.is_match(&text))
        },
    )?;
    Ok(())
}
