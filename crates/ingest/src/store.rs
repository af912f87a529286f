// SQLite persistence for ingested Amcache categories
//
// One table per category, keyed by entry id, plus bookkeeping tables:
//   subkeys       - categories seen and when they were first registered
//   acquisitions  - provenance of every snapshot ingested into this store
//
// Entries are first-write-wins: a later walk never updates an existing row.

use crate::error::StoreError;
use crate::tree::KeyNode;
use amc_core::schema::{ColumnSource, ENTRY_ID_COLUMN};
use amc_core::{locale_label, IngestionSummary, SchemaKind};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Bookkeeping tables a category table must never shadow
const RESERVED_TABLES: &[&str] = &["subkeys", "acquisitions"];

/// Table name for a category: `-` and space become `_`
pub fn table_name(category: &str) -> String {
    category.replace(['-', ' '], "_")
}

/// Quote as an SQL identifier; category names come from evidence
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Entry inserted during this store's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEntry {
    pub category: String,
    pub entry_id: String,
    pub values: BTreeMap<String, String>,
}

/// Provenance row for one ingested snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionRecord {
    pub source: String,
    pub sha256: String,
    pub size: u64,
    pub acquired_at: DateTime<Utc>,
    pub dirty: bool,
}

pub struct IngestionStore {
    conn: Connection,
    processed: Vec<ProcessedEntry>,
}

impl IngestionStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            processed: Vec::new(),
        };
        store.init_schema()?;
        info!(path = %path.display(), "store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            processed: Vec::new(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS subkeys (
                subkey_name TEXT PRIMARY KEY,
                parsed_timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS acquisitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                size INTEGER NOT NULL,
                acquired_at TEXT NOT NULL,
                dirty INTEGER NOT NULL
            );
        "#,
        )?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Create the category's table if needed and record it in `subkeys`.
    /// Registering an already-known category changes nothing.
    pub fn register_category(&self, category: &str) -> Result<SchemaKind, StoreError> {
        let table = table_name(category);
        if let Some(reserved) = RESERVED_TABLES
            .iter()
            .find(|r| r.eq_ignore_ascii_case(&table))
        {
            return Err(StoreError::ReservedTable {
                category: category.to_string(),
                table: reserved.to_string(),
            });
        }

        let kind = SchemaKind::for_category(category);
        let body = if kind.is_fixed() {
            let columns: Vec<String> = kind
                .columns()
                .iter()
                .map(|c| format!("{} TEXT", quote_ident(c.name)))
                .collect();
            format!("{},\n", columns.join(",\n"))
        } else {
            "data TEXT NOT NULL,\n".to_string()
        };
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n\
             entry_id TEXT PRIMARY KEY,\n\
             {}parsed_timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n)",
            quote_ident(&table),
            body
        );

        self.conn.execute(&ddl, [])?;
        self.conn.execute(
            "INSERT OR IGNORE INTO subkeys (subkey_name) VALUES (?1)",
            params![category],
        )?;
        debug!(category, table = %table, ?kind, "category registered");
        Ok(kind)
    }

    /// Insert one entry unless its id already exists.
    ///
    /// Returns whether a row was written. Existence check and insert are one
    /// statement, so concurrent writers cannot both insert the same id.
    pub fn insert_entry(
        &self,
        category: &str,
        kind: SchemaKind,
        entry_id: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<bool, StoreError> {
        let table = quote_ident(&table_name(category));

        let changed = if kind.is_fixed() {
            let columns = kind.columns();
            let mut names = vec![ENTRY_ID_COLUMN.to_string()];
            let mut row: Vec<Option<String>> = vec![Some(entry_id.to_string())];
            for column in columns {
                names.push(quote_ident(column.name));
                row.push(match column.source {
                    ColumnSource::Value(name) => values.get(name).cloned(),
                    ColumnSource::LocaleLabel => Some(
                        locale_label(values.get("Language").map(String::as_str)).to_string(),
                    ),
                });
            }
            let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(entry_id) DO NOTHING",
                table,
                names.join(", "),
                placeholders.join(", ")
            );
            self.conn.execute(&sql, params_from_iter(row.iter()))?
        } else {
            let data = serde_json::to_string(values)?;
            let sql = format!(
                "INSERT INTO {} (entry_id, data) VALUES (?1, ?2) ON CONFLICT(entry_id) DO NOTHING",
                table
            );
            self.conn.execute(&sql, params![entry_id, data])?
        };

        Ok(changed > 0)
    }

    /// Walk the categories under `root` and store every entry not seen before.
    ///
    /// With an allow-list, other categories are neither registered nor
    /// counted. A category whose table cannot be created and a failed insert
    /// each add one failure; the walk always continues.
    pub fn ingest(
        &mut self,
        root: &KeyNode,
        allow_list: Option<&[String]>,
    ) -> Result<IngestionSummary, StoreError> {
        let mut summary = IngestionSummary::default();
        info!(categories = root.children().len(), "ingesting hive");

        for category in root.children() {
            let name = category.name.as_str();
            if let Some(allowed) = allow_list {
                if !allowed.iter().any(|a| a == name) {
                    debug!(category = name, "not in allow-list, skipped");
                    continue;
                }
            }

            let kind = match self.register_category(name) {
                Ok(kind) => kind,
                Err(err @ StoreError::ReservedTable { .. }) => {
                    warn!(category = name, error = %err, "category skipped");
                    continue;
                }
                Err(err) => {
                    error!(category = name, error = %err, "cannot create category table");
                    summary.failures += 1;
                    continue;
                }
            };
            summary.categories += 1;

            for entry in category.children() {
                let values = entry.value_map();
                match self.insert_entry(name, kind, &entry.name, &values) {
                    Ok(true) => {
                        debug!(category = name, entry = %entry.name, "entry inserted");
                        summary.entries += 1;
                        self.processed.push(ProcessedEntry {
                            category: name.to_string(),
                            entry_id: entry.name.clone(),
                            values,
                        });
                    }
                    Ok(false) => {}
                    Err(err) => {
                        error!(category = name, entry = %entry.name, error = %err, "insert failed");
                        summary.failures += 1;
                    }
                }
            }
        }

        info!(%summary, "ingestion finished");
        Ok(summary)
    }

    /// Entries inserted through this store handle, in insertion order
    pub fn processed(&self) -> &[ProcessedEntry] {
        &self.processed
    }

    /// Registered categories in registration order
    pub fn categories(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT subkey_name FROM subkeys ORDER BY rowid")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn table_exists(&self, category: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table_name(category)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Category tables present in the database (bookkeeping tables excluded)
    pub fn category_tables(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names
            .into_iter()
            .filter(|n| !RESERVED_TABLES.contains(&n.as_str()))
            .collect())
    }

    pub fn count_entries(&self, category: &str) -> Result<usize, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            quote_ident(&table_name(category))
        );
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn record_acquisition(&self, record: &AcquisitionRecord) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO acquisitions (source, sha256, size, acquired_at, dirty) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.source,
                record.sha256,
                record.size as i64,
                record.acquired_at.to_rfc3339(),
                record.dirty,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn acquisitions(&self) -> Result<Vec<AcquisitionRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT source, sha256, size, acquired_at, dirty FROM acquisitions ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let acquired_at: String = row.get(3)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                acquired_at,
                row.get::<_, bool>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (source, sha256, size, acquired_at, dirty) = row?;
            let acquired_at = DateTime::parse_from_rfc3339(&acquired_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_default();
            records.push(AcquisitionRecord {
                source,
                sha256,
                size: size as u64,
                acquired_at,
                dirty,
            });
        }
        Ok(records)
    }
}
