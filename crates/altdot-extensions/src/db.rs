//! Relational store for extensions, commands, configs, and credentials
//!
//! One SQLite handle behind a mutex; all multi-row writes run through
//! [`Database::with_tx`] so a reader never observes an extension row whose
//! command set reflects only part of a manifest. Command and config rows are
//! children of the extension row and cascade on delete.
//!
//! Two pieces of command state are user-owned and must survive every
//! reconciliation pass: `is_disabled` and `is_fallback`/`dismiss_alert`. The
//! upsert below rewrites only manifest-derived columns.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use altdot_core::{Error, ManifestCommand, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use tracing::debug;

/// Fixed extension id hosting user-created script commands; its command rows
/// are never produced by a manifest and never pruned by reconciliation
pub const BUILT_IN_EXTENSION_ID: &str = "user-scripts";

/// `app_state` key holding the updater's last check date (ISO calendar date)
pub const LAST_UPDATE_CHECK_KEY: &str = "last_update_check";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS extensions (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    title         TEXT NOT NULL,
    description   TEXT NOT NULL DEFAULT '',
    version       TEXT NOT NULL,
    icon          TEXT NOT NULL DEFAULT '',
    author        TEXT NOT NULL DEFAULT '',
    path          TEXT NOT NULL DEFAULT '',
    is_local      INTEGER NOT NULL DEFAULT 0,
    is_disabled   INTEGER NOT NULL DEFAULT 0,
    is_error      INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS extension_commands (
    id            TEXT PRIMARY KEY,
    extension_id  TEXT NOT NULL REFERENCES extensions(id) ON DELETE CASCADE,
    name          TEXT NOT NULL,
    title         TEXT NOT NULL,
    type          TEXT NOT NULL,
    icon          TEXT,
    subtitle      TEXT,
    shortcut      TEXT,
    arguments     TEXT NOT NULL DEFAULT '[]',
    is_disabled   INTEGER NOT NULL DEFAULT 0,
    is_fallback   INTEGER NOT NULL DEFAULT 0,
    dismiss_alert INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS extension_configs (
    config_id    TEXT PRIMARY KEY,
    extension_id TEXT NOT NULL REFERENCES extensions(id) ON DELETE CASCADE,
    schema       TEXT NOT NULL DEFAULT '[]',
    value        TEXT
);

CREATE TABLE IF NOT EXISTS extension_credentials (
    id           TEXT PRIMARY KEY,
    extension_id TEXT NOT NULL REFERENCES extensions(id) ON DELETE CASCADE,
    provider     TEXT NOT NULL,
    value        TEXT
);

CREATE TABLE IF NOT EXISTS app_state (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Converts rusqlite errors into the shared error type at the store boundary
trait DbResultExt<T> {
    fn db_err(self) -> Result<T>;
}

impl<T> DbResultExt<T> for rusqlite::Result<T> {
    fn db_err(self) -> Result<T> {
        self.map_err(Error::database)
    }
}

/// Persisted extension row
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionRow {
    pub id: String,
    pub name: String,
    pub title: String,
    pub description: String,
    pub version: String,
    pub icon: String,
    pub author: String,
    /// Absolute directory for local extensions, empty for managed ones
    pub path: String,
    pub is_local: bool,
    pub is_disabled: bool,
    pub is_error: bool,
    pub error_message: Option<String>,
    /// Timestamp of the last successful manifest application
    pub updated_at: DateTime<Utc>,
}

impl ExtensionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            title: row.get("title")?,
            description: row.get("description")?,
            version: row.get("version")?,
            icon: row.get("icon")?,
            author: row.get("author")?,
            path: row.get("path")?,
            is_local: row.get("is_local")?,
            is_disabled: row.get("is_disabled")?,
            is_error: row.get("is_error")?,
            error_message: row.get("error_message")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Persisted command row, PK `"<extensionId>:<commandName>"`
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionCommandRow {
    pub id: String,
    pub extension_id: String,
    pub name: String,
    pub title: String,
    pub command_type: String,
    pub icon: Option<String>,
    pub subtitle: Option<String>,
    pub shortcut: Option<String>,
    /// JSON-encoded argument list from the manifest
    pub arguments: String,
    pub is_disabled: bool,
    pub is_fallback: bool,
    pub dismiss_alert: bool,
}

impl ExtensionCommandRow {
    /// Deterministic composite command id
    pub fn command_id(extension_id: &str, command_name: &str) -> String {
        format!("{extension_id}:{command_name}")
    }

    /// Build a row from a manifest command; user-owned fields default off
    pub fn from_manifest(extension_id: &str, command: &ManifestCommand) -> Result<Self> {
        let command_type = serde_json::to_value(command.command_type)?
            .as_str()
            .unwrap_or("action")
            .to_string();
        Ok(Self {
            id: Self::command_id(extension_id, &command.name),
            extension_id: extension_id.to_string(),
            name: command.name.clone(),
            title: command.title.clone(),
            command_type,
            icon: command.icon.clone(),
            subtitle: command.subtitle.clone(),
            shortcut: command.shortcut.clone(),
            arguments: serde_json::to_string(&command.arguments)?,
            is_disabled: false,
            is_fallback: false,
            dismiss_alert: false,
        })
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            extension_id: row.get("extension_id")?,
            name: row.get("name")?,
            title: row.get("title")?,
            command_type: row.get("type")?,
            icon: row.get("icon")?,
            subtitle: row.get("subtitle")?,
            shortcut: row.get("shortcut")?,
            arguments: row.get("arguments")?,
            is_disabled: row.get("is_disabled")?,
            is_fallback: row.get("is_fallback")?,
            dismiss_alert: row.get("dismiss_alert")?,
        })
    }
}

/// Persisted config row, keyed `extensionId` or `extensionId:commandName`
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionConfigRow {
    pub config_id: String,
    pub extension_id: String,
    /// JSON-encoded manifest-declared schema
    pub schema: String,
    /// User-entered value; never rewritten by reconciliation
    pub value: Option<String>,
}

/// Persisted credential row; reconciliation preserves these unconditionally
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionCredentialRow {
    pub id: String,
    pub extension_id: String,
    pub provider: String,
    pub value: Option<String>,
}

/// An extension row together with its command rows
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionWithCommands {
    pub extension: ExtensionRow,
    pub commands: Vec<ExtensionCommandRow>,
}

/// Shared SQLite handle
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (creating if needed) the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).db_err()?;
        Self::configure(&conn)?;
        debug!(path = %path.display(), "opened extension database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().db_err()?;
        Self::configure(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL").db_err()?;
        conn.pragma_update(None, "foreign_keys", "ON").db_err()?;
        conn.pragma_update(None, "busy_timeout", "5000").db_err()?;
        conn.execute_batch(SCHEMA).db_err()?;
        Ok(())
    }

    /// Run read-only work against the connection
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        f(&conn)
    }

    /// Run `f` inside a transaction; commits on `Ok`, rolls back on `Err`
    pub fn with_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().expect("database mutex poisoned");
        let tx = conn.transaction().db_err()?;
        let value = f(&tx)?;
        tx.commit().db_err()?;
        Ok(value)
    }
}

// --- extensions ---

pub fn insert_extension(conn: &Connection, row: &ExtensionRow) -> Result<()> {
    conn.execute(
        "INSERT INTO extensions
            (id, name, title, description, version, icon, author, path,
             is_local, is_disabled, is_error, error_message, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            row.id,
            row.name,
            row.title,
            row.description,
            row.version,
            row.icon,
            row.author,
            row.path,
            row.is_local,
            row.is_disabled,
            row.is_error,
            row.error_message,
            row.updated_at,
        ],
    )
    .db_err()?;
    Ok(())
}

pub fn get_extension(conn: &Connection, id: &str) -> Result<Option<ExtensionRow>> {
    conn.query_row(
        "SELECT * FROM extensions WHERE id = ?1",
        params![id],
        |row| ExtensionRow::from_row(row),
    )
    .optional()
    .db_err()
}

pub fn find_extension_by_path(conn: &Connection, path: &str) -> Result<Option<ExtensionRow>> {
    conn.query_row(
        "SELECT * FROM extensions WHERE path = ?1",
        params![path],
        |row| ExtensionRow::from_row(row),
    )
    .optional()
    .db_err()
}

pub fn list_extensions(conn: &Connection) -> Result<Vec<ExtensionRow>> {
    let mut stmt = conn
        .prepare("SELECT * FROM extensions ORDER BY title")
        .db_err()?;
    let rows = stmt
        .query_map([], |row| ExtensionRow::from_row(row))
        .db_err()?
        .collect::<rusqlite::Result<Vec<_>>>()
        .db_err()?;
    Ok(rows)
}

pub fn get_extension_with_commands(
    conn: &Connection,
    id: &str,
) -> Result<Option<ExtensionWithCommands>> {
    let Some(extension) = get_extension(conn, id)? else {
        return Ok(None);
    };
    let commands = list_commands(conn, id)?;
    Ok(Some(ExtensionWithCommands {
        extension,
        commands,
    }))
}

/// Location fields used by the path resolver: `(path, is_local)`
pub fn get_extension_location(conn: &Connection, id: &str) -> Result<Option<(String, bool)>> {
    conn.query_row(
        "SELECT path, is_local FROM extensions WHERE id = ?1",
        params![id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .db_err()
}

/// Delete an extension row; commands/configs/credentials cascade
pub fn delete_extension(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM extensions WHERE id = ?1", params![id])
        .db_err()?;
    Ok(deleted > 0)
}

pub fn set_extension_disabled(conn: &Connection, id: &str, is_disabled: bool) -> Result<()> {
    conn.execute(
        "UPDATE extensions SET is_disabled = ?2 WHERE id = ?1",
        params![id, is_disabled],
    )
    .db_err()?;
    Ok(())
}

/// Rewrite the manifest-derived columns of an extension row and clear any
/// prior error state; never touches `path`, `is_local`, or `is_disabled`
pub fn patch_extension_manifest_fields(
    conn: &Connection,
    id: &str,
    manifest: &altdot_core::ExtensionManifest,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE extensions SET
                name = ?2, title = ?3, description = ?4, version = ?5,
                icon = ?6, author = ?7, updated_at = ?8,
                is_error = 0, error_message = NULL
             WHERE id = ?1",
            params![
                id,
                manifest.name,
                manifest.title,
                manifest.description,
                manifest.version,
                manifest.icon,
                manifest.author,
                updated_at,
            ],
        )
        .db_err()?;
    if changed == 0 {
        return Err(Error::not_found("extension"));
    }
    Ok(())
}

/// Mark an extension errored without losing its row
pub fn patch_extension_error(
    conn: &Connection,
    id: &str,
    error_message: Option<&str>,
) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE extensions SET is_error = 1, error_message = ?2 WHERE id = ?1",
            params![id, error_message],
        )
        .db_err()?;
    if changed == 0 {
        return Err(Error::not_found("extension"));
    }
    Ok(())
}

// --- commands ---

/// Upsert a command row. On conflict only manifest-derived columns are
/// rewritten; `is_disabled`, `is_fallback`, and `dismiss_alert` survive.
pub fn upsert_command(conn: &Connection, row: &ExtensionCommandRow) -> Result<()> {
    conn.execute(
        "INSERT INTO extension_commands
            (id, extension_id, name, title, type, icon, subtitle, shortcut,
             arguments, is_disabled, is_fallback, dismiss_alert)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            title = excluded.title,
            type = excluded.type,
            icon = excluded.icon,
            subtitle = excluded.subtitle,
            shortcut = excluded.shortcut,
            arguments = excluded.arguments",
        params![
            row.id,
            row.extension_id,
            row.name,
            row.title,
            row.command_type,
            row.icon,
            row.subtitle,
            row.shortcut,
            row.arguments,
            row.is_disabled,
            row.is_fallback,
            row.dismiss_alert,
        ],
    )
    .db_err()?;
    Ok(())
}

pub fn get_command(conn: &Connection, id: &str) -> Result<Option<ExtensionCommandRow>> {
    conn.query_row(
        "SELECT * FROM extension_commands WHERE id = ?1",
        params![id],
        |row| ExtensionCommandRow::from_row(row),
    )
    .optional()
    .db_err()
}

pub fn list_commands(conn: &Connection, extension_id: &str) -> Result<Vec<ExtensionCommandRow>> {
    let mut stmt = conn
        .prepare("SELECT * FROM extension_commands WHERE extension_id = ?1 ORDER BY name")
        .db_err()?;
    let rows = stmt
        .query_map(params![extension_id], |row| {
            ExtensionCommandRow::from_row(row)
        })
        .db_err()?
        .collect::<rusqlite::Result<Vec<_>>>()
        .db_err()?;
    Ok(rows)
}

pub fn set_command_disabled(conn: &Connection, id: &str, is_disabled: bool) -> Result<()> {
    conn.execute(
        "UPDATE extension_commands SET is_disabled = ?2 WHERE id = ?1",
        params![id, is_disabled],
    )
    .db_err()?;
    Ok(())
}

pub fn set_command_fallback(
    conn: &Connection,
    id: &str,
    is_fallback: bool,
    dismiss_alert: bool,
) -> Result<()> {
    conn.execute(
        "UPDATE extension_commands SET is_fallback = ?2, dismiss_alert = ?3 WHERE id = ?1",
        params![id, is_fallback, dismiss_alert],
    )
    .db_err()?;
    Ok(())
}

/// Delete every command of `extension_id` whose id is not in `keep`
///
/// An empty `keep` set deletes all commands for the extension.
pub fn prune_commands(conn: &Connection, extension_id: &str, keep: &HashSet<String>) -> Result<()> {
    if keep.is_empty() {
        conn.execute(
            "DELETE FROM extension_commands WHERE extension_id = ?1",
            params![extension_id],
        )
        .db_err()?;
        return Ok(());
    }

    let placeholders = vec!["?"; keep.len()].join(", ");
    let sql = format!(
        "DELETE FROM extension_commands WHERE extension_id = ? AND id NOT IN ({placeholders})"
    );
    let mut args: Vec<&str> = vec![extension_id];
    args.extend(keep.iter().map(String::as_str));
    conn.execute(&sql, params_from_iter(args)).db_err()?;
    Ok(())
}

// --- configs ---

pub fn upsert_config(conn: &Connection, row: &ExtensionConfigRow) -> Result<()> {
    conn.execute(
        "INSERT INTO extension_configs (config_id, extension_id, schema, value)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(config_id) DO UPDATE SET schema = excluded.schema",
        params![row.config_id, row.extension_id, row.schema, row.value],
    )
    .db_err()?;
    Ok(())
}

pub fn get_config(conn: &Connection, config_id: &str) -> Result<Option<ExtensionConfigRow>> {
    conn.query_row(
        "SELECT config_id, extension_id, schema, value
         FROM extension_configs WHERE config_id = ?1",
        params![config_id],
        |row| {
            Ok(ExtensionConfigRow {
                config_id: row.get(0)?,
                extension_id: row.get(1)?,
                schema: row.get(2)?,
                value: row.get(3)?,
            })
        },
    )
    .optional()
    .db_err()
}

pub fn set_config_value(conn: &Connection, config_id: &str, value: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE extension_configs SET value = ?2 WHERE config_id = ?1",
        params![config_id, value],
    )
    .db_err()?;
    Ok(())
}

/// Delete config rows whose id the manifest can no longer describe
pub fn prune_configs(conn: &Connection, extension_id: &str, keep: &HashSet<String>) -> Result<()> {
    if keep.is_empty() {
        conn.execute(
            "DELETE FROM extension_configs WHERE extension_id = ?1",
            params![extension_id],
        )
        .db_err()?;
        return Ok(());
    }

    let placeholders = vec!["?"; keep.len()].join(", ");
    let sql = format!(
        "DELETE FROM extension_configs WHERE extension_id = ? AND config_id NOT IN ({placeholders})"
    );
    let mut args: Vec<&str> = vec![extension_id];
    args.extend(keep.iter().map(String::as_str));
    conn.execute(&sql, params_from_iter(args)).db_err()?;
    Ok(())
}

// --- credentials ---

pub fn insert_credential(conn: &Connection, row: &ExtensionCredentialRow) -> Result<()> {
    conn.execute(
        "INSERT INTO extension_credentials (id, extension_id, provider, value)
         VALUES (?1, ?2, ?3, ?4)",
        params![row.id, row.extension_id, row.provider, row.value],
    )
    .db_err()?;
    Ok(())
}

pub fn list_credentials(
    conn: &Connection,
    extension_id: &str,
) -> Result<Vec<ExtensionCredentialRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, extension_id, provider, value
             FROM extension_credentials WHERE extension_id = ?1 ORDER BY provider",
        )
        .db_err()?;
    let rows = stmt
        .query_map(params![extension_id], |row| {
            Ok(ExtensionCredentialRow {
                id: row.get(0)?,
                extension_id: row.get(1)?,
                provider: row.get(2)?,
                value: row.get(3)?,
            })
        })
        .db_err()?
        .collect::<rusqlite::Result<Vec<_>>>()
        .db_err()?;
    Ok(rows)
}

// --- app state ---

pub fn get_app_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM app_state WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .db_err()
}

pub fn set_app_state(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO app_state (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )
    .db_err()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_extension(id: &str, is_local: bool) -> ExtensionRow {
        ExtensionRow {
            id: id.to_string(),
            name: format!("{id}-name"),
            title: format!("{id} title"),
            description: String::new(),
            version: "1.0.0".to_string(),
            icon: "icon.png".to_string(),
            author: "acme".to_string(),
            path: if is_local {
                format!("/exts/{id}")
            } else {
                String::new()
            },
            is_local,
            is_disabled: false,
            is_error: false,
            error_message: None,
            updated_at: Utc::now(),
        }
    }

    fn sample_command(extension_id: &str, name: &str) -> ExtensionCommandRow {
        ExtensionCommandRow {
            id: ExtensionCommandRow::command_id(extension_id, name),
            extension_id: extension_id.to_string(),
            name: name.to_string(),
            title: format!("{name} title"),
            command_type: "action".to_string(),
            icon: None,
            subtitle: None,
            shortcut: None,
            arguments: "[]".to_string(),
            is_disabled: false,
            is_fallback: false,
            dismiss_alert: false,
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let db = Database::open_in_memory().expect("open db");
        let row = sample_extension("ext1", true);
        db.with_tx(|tx| insert_extension(tx, &row)).expect("insert");

        let loaded = db
            .with_conn(|conn| get_extension(conn, "ext1"))
            .expect("query")
            .expect("row should exist");
        assert_eq!(loaded.id, row.id);
        assert_eq!(loaded.path, row.path);
        assert!(loaded.is_local);

        let by_path = db
            .with_conn(|conn| find_extension_by_path(conn, "/exts/ext1"))
            .expect("query")
            .expect("row should exist");
        assert_eq!(by_path.id, "ext1");
    }

    #[test]
    fn upsert_preserves_user_state_columns() {
        let db = Database::open_in_memory().expect("open db");
        db.with_tx(|tx| {
            insert_extension(tx, &sample_extension("ext1", false))?;
            upsert_command(tx, &sample_command("ext1", "run"))?;
            set_command_disabled(tx, "ext1:run", true)?;
            set_command_fallback(tx, "ext1:run", true, true)
        })
        .expect("seed");

        let mut updated = sample_command("ext1", "run");
        updated.title = "Run (renamed)".to_string();
        db.with_tx(|tx| upsert_command(tx, &updated)).expect("upsert");

        let loaded = db
            .with_conn(|conn| get_command(conn, "ext1:run"))
            .expect("query")
            .expect("row should exist");
        assert_eq!(loaded.title, "Run (renamed)");
        assert!(loaded.is_disabled);
        assert!(loaded.is_fallback);
        assert!(loaded.dismiss_alert);
    }

    #[test]
    fn prune_commands_keeps_only_named_ids() {
        let db = Database::open_in_memory().expect("open db");
        db.with_tx(|tx| {
            insert_extension(tx, &sample_extension("ext1", false))?;
            upsert_command(tx, &sample_command("ext1", "a"))?;
            upsert_command(tx, &sample_command("ext1", "b"))?;
            upsert_command(tx, &sample_command("ext1", "c"))
        })
        .expect("seed");

        let keep: HashSet<String> = ["ext1:a".to_string(), "ext1:b".to_string()].into();
        db.with_tx(|tx| prune_commands(tx, "ext1", &keep))
            .expect("prune");

        let names: Vec<String> = db
            .with_conn(|conn| list_commands(conn, "ext1"))
            .expect("list")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn prune_commands_with_empty_keep_deletes_all() {
        let db = Database::open_in_memory().expect("open db");
        db.with_tx(|tx| {
            insert_extension(tx, &sample_extension("ext1", false))?;
            upsert_command(tx, &sample_command("ext1", "a"))
        })
        .expect("seed");

        db.with_tx(|tx| prune_commands(tx, "ext1", &HashSet::new()))
            .expect("prune");
        assert!(db
            .with_conn(|conn| list_commands(conn, "ext1"))
            .expect("list")
            .is_empty());
    }

    #[test]
    fn delete_extension_cascades_to_children() {
        let db = Database::open_in_memory().expect("open db");
        db.with_tx(|tx| {
            insert_extension(tx, &sample_extension("ext1", false))?;
            upsert_command(tx, &sample_command("ext1", "a"))?;
            upsert_config(
                tx,
                &ExtensionConfigRow {
                    config_id: "ext1:a".to_string(),
                    extension_id: "ext1".to_string(),
                    schema: "[]".to_string(),
                    value: Some("secret".to_string()),
                },
            )?;
            insert_credential(
                tx,
                &ExtensionCredentialRow {
                    id: "cred1".to_string(),
                    extension_id: "ext1".to_string(),
                    provider: "oauth".to_string(),
                    value: Some("token".to_string()),
                },
            )
        })
        .expect("seed");

        let deleted = db
            .with_tx(|tx| delete_extension(tx, "ext1"))
            .expect("delete");
        assert!(deleted);

        db.with_conn(|conn| {
            assert!(list_commands(conn, "ext1")?.is_empty());
            assert!(get_config(conn, "ext1:a")?.is_none());
            assert!(list_credentials(conn, "ext1")?.is_empty());
            Ok(())
        })
        .expect("verify");
    }

    #[test]
    fn config_upsert_never_rewrites_value() {
        let db = Database::open_in_memory().expect("open db");
        db.with_tx(|tx| {
            insert_extension(tx, &sample_extension("ext1", false))?;
            upsert_config(
                tx,
                &ExtensionConfigRow {
                    config_id: "ext1".to_string(),
                    extension_id: "ext1".to_string(),
                    schema: "[]".to_string(),
                    value: None,
                },
            )?;
            set_config_value(tx, "ext1", Some("user-entered"))
        })
        .expect("seed");

        db.with_tx(|tx| {
            upsert_config(
                tx,
                &ExtensionConfigRow {
                    config_id: "ext1".to_string(),
                    extension_id: "ext1".to_string(),
                    schema: "[{\"name\":\"x\"}]".to_string(),
                    value: None,
                },
            )
        })
        .expect("upsert");

        let loaded = db
            .with_conn(|conn| get_config(conn, "ext1"))
            .expect("query")
            .expect("row should exist");
        assert_eq!(loaded.value.as_deref(), Some("user-entered"));
        assert_eq!(loaded.schema, "[{\"name\":\"x\"}]");
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = Database::open_in_memory().expect("open db");
        let result: Result<()> = db.with_tx(|tx| {
            insert_extension(tx, &sample_extension("ext1", false))?;
            Err(Error::validation("boom"))
        });
        assert!(result.is_err());
        assert!(db
            .with_conn(|conn| get_extension(conn, "ext1"))
            .expect("query")
            .is_none());
    }

    #[test]
    fn app_state_round_trip() {
        let db = Database::open_in_memory().expect("open db");
        db.with_tx(|tx| set_app_state(tx, LAST_UPDATE_CHECK_KEY, "2026-08-30"))
            .expect("set");
        let value = db
            .with_conn(|conn| get_app_state(conn, LAST_UPDATE_CHECK_KEY))
            .expect("get");
        assert_eq!(value.as_deref(), Some("2026-08-30"));
    }
}
