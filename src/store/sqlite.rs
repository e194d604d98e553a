//! SQLite-backed store.
//!
//! The tree is kept flattened: one row per scalar leaf, keyed by its full
//! path.  A subtree read is a range scan over `[path/, path0)`, since `0`
//! is the byte after `/`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::Value;

use super::{path, tree, PushIdGenerator, RealtimeStore, StoreError, SubscriptionHub, Write};

pub struct SqliteStore {
    conn: Mutex<Connection>,
    hub: SubscriptionHub,
    keys: PushIdGenerator,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS nodes (
                path    TEXT PRIMARY KEY,
                value   TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            hub: SubscriptionHub::new(),
            keys: PushIdGenerator::new(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

fn descendant_bounds(p: &str) -> (String, String) {
    (format!("{p}/"), format!("{p}0"))
}

fn read_subtree(conn: &Connection, p: &str) -> Result<Option<Value>, StoreError> {
    let mut leaves: Vec<(String, Value)> = Vec::new();
    if p.is_empty() {
        let mut stmt = conn.prepare("SELECT path, value FROM nodes")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (full, raw) = row?;
            leaves.push((full, serde_json::from_str(&raw)?));
        }
        return Ok(tree::unflatten(leaves));
    }

    let exact: Option<String> = conn
        .query_row(
            "SELECT value FROM nodes WHERE path = ?1",
            params![p],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(raw) = exact {
        return Ok(Some(serde_json::from_str(&raw)?));
    }

    let (lo, hi) = descendant_bounds(p);
    let mut stmt = conn.prepare("SELECT path, value FROM nodes WHERE path >= ?1 AND path < ?2")?;
    let rows = stmt.query_map(params![lo, hi], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (full, raw) = row?;
        let rel = full[lo.len()..].to_string();
        leaves.push((rel, serde_json::from_str(&raw)?));
    }
    Ok(tree::unflatten(leaves))
}

fn delete_subtree(tx: &Transaction<'_>, p: &str) -> Result<(), StoreError> {
    if p.is_empty() {
        tx.execute("DELETE FROM nodes", [])?;
        return Ok(());
    }
    let (lo, hi) = descendant_bounds(p);
    tx.execute("DELETE FROM nodes WHERE path = ?1", params![p])?;
    tx.execute(
        "DELETE FROM nodes WHERE path >= ?1 AND path < ?2",
        params![lo, hi],
    )?;
    Ok(())
}

/// A scalar stored at an ancestor would shadow the new subtree.
fn delete_ancestor_leaves(tx: &Transaction<'_>, p: &str) -> Result<(), StoreError> {
    let segs = path::segments(p);
    for i in 1..segs.len() {
        let ancestor = segs[..i].join("/");
        tx.execute("DELETE FROM nodes WHERE path = ?1", params![ancestor])?;
    }
    Ok(())
}

fn write_value(tx: &Transaction<'_>, p: &str, value: &Value) -> Result<(), StoreError> {
    let mut leaves = Vec::new();
    tree::flatten(p, value, &mut leaves);
    let mut stmt = tx.prepare_cached("INSERT OR REPLACE INTO nodes (path, value) VALUES (?1, ?2)")?;
    for (leaf_path, leaf) in leaves {
        stmt.execute(params![leaf_path, serde_json::to_string(&leaf)?])?;
    }
    Ok(())
}

impl RealtimeStore for SqliteStore {
    fn read_once(&self, p: &str) -> Result<Option<Value>, StoreError> {
        let p = path::normalize(p)?;
        let conn = self.conn()?;
        read_subtree(&conn, &p)
    }

    fn commit(&self, writes: &[Write]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for w in writes {
            delete_subtree(&tx, &w.path)?;
            if let Some(value) = &w.value {
                delete_ancestor_leaves(&tx, &w.path)?;
                write_value(&tx, &w.path, value)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn commit_increment(&self, p: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let current = match read_subtree(&tx, p)? {
            None => 0,
            Some(v) => v.as_i64().ok_or_else(|| {
                StoreError::Conflict(format!("value at '{p}' is not an integer"))
            })?,
        };
        let next = current.saturating_add(delta);
        delete_ancestor_leaves(&tx, p)?;
        write_value(&tx, p, &Value::from(next))?;
        tx.commit()?;
        Ok(next)
    }

    fn hub(&self) -> &SubscriptionHub {
        &self.hub
    }

    fn keys(&self) -> &PushIdGenerator {
        &self.keys
    }
}
