//! Derived exports, recomputed from the store on every call.
//!
//! The tree document maps each category to its records; the flat table puts
//! every entry of every category on one row under the union of known columns.

use crate::error::StoreError;
use crate::store::{quote_ident, table_name, IngestionStore};
use amc_core::schema::{DATA_COLUMN, ENTRY_ID_COLUMN, SUBKEY_NAME_COLUMN};
use amc_core::{SchemaKind, FLAT_COLUMNS};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeRecord {
    pub id: String,
    pub fields: Map<String, Value>,
}

/// Category name to its records in insertion order
pub type TreeDocument = BTreeMap<String, Vec<TreeRecord>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatTable {
    pub columns: Vec<&'static str>,
    /// Cells in `columns` order; missing values are empty
    pub rows: Vec<Vec<String>>,
}

impl FlatTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == name)
    }

    /// Cell by column name
    pub fn cell<'a>(&'a self, row: &'a [String], column: &str) -> Option<&'a str> {
        self.column_index(column)
            .and_then(|i| row.get(i))
            .map(String::as_str)
    }
}

/// Raw rows of one category table: entry id plus one cell per column
fn category_rows(
    store: &IngestionStore,
    category: &str,
    kind: SchemaKind,
) -> Result<Vec<(String, Vec<Option<String>>)>, StoreError> {
    let columns: Vec<String> = if kind.is_fixed() {
        kind.columns().iter().map(|c| quote_ident(c.name)).collect()
    } else {
        vec![DATA_COLUMN.to_string()]
    };
    let sql = format!(
        "SELECT {}, {} FROM {} ORDER BY rowid",
        ENTRY_ID_COLUMN,
        columns.join(", "),
        quote_ident(&table_name(category))
    );

    let mut stmt = store.conn().prepare(&sql)?;
    let width = columns.len();
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(row.get::<_, Option<String>>(i + 1)?);
            }
            Ok((id, cells))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Category -> `[{id, fields}]`
pub fn to_tree(store: &IngestionStore) -> Result<TreeDocument, StoreError> {
    let mut document = TreeDocument::new();

    for category in store.categories()? {
        let kind = SchemaKind::for_category(&category);
        let mut records = Vec::new();

        for (id, cells) in category_rows(store, &category, kind)? {
            let fields = if kind.is_fixed() {
                kind.columns()
                    .iter()
                    .zip(cells)
                    .map(|(column, cell)| {
                        let value = cell.map(Value::String).unwrap_or(Value::Null);
                        (column.field_name().to_string(), value)
                    })
                    .collect()
            } else {
                let raw = cells.into_iter().next().flatten().unwrap_or_default();
                match serde_json::from_str::<Value>(&raw)? {
                    Value::Object(map) => map,
                    other => {
                        let mut map = Map::new();
                        map.insert(DATA_COLUMN.to_string(), other);
                        map
                    }
                }
            };
            records.push(TreeRecord { id, fields });
        }

        document.insert(category, records);
    }

    Ok(document)
}

/// One row per entry across all categories, columns = [`FLAT_COLUMNS`]
pub fn to_flat_table(store: &IngestionStore) -> Result<FlatTable, StoreError> {
    let mut table = FlatTable {
        columns: FLAT_COLUMNS.to_vec(),
        rows: Vec::new(),
    };
    let subkey_idx = table.column_index(SUBKEY_NAME_COLUMN).unwrap_or(0);
    let id_idx = table.column_index(ENTRY_ID_COLUMN).unwrap_or(1);
    let data_idx = table.column_index(DATA_COLUMN);

    for category in store.categories()? {
        let kind = SchemaKind::for_category(&category);
        // Where each stored column lands in the flat row
        let targets: Vec<Option<usize>> = if kind.is_fixed() {
            kind.columns()
                .iter()
                .map(|c| table.column_index(c.name))
                .collect()
        } else {
            vec![data_idx]
        };

        for (id, cells) in category_rows(store, &category, kind)? {
            let mut row = vec![String::new(); table.columns.len()];
            row[subkey_idx] = category.clone();
            row[id_idx] = id;
            for (target, cell) in targets.iter().zip(cells) {
                if let (Some(i), Some(value)) = (target, cell) {
                    row[*i] = value;
                }
            }
            table.rows.push(row);
        }
    }

    Ok(table)
}

pub fn write_json(store: &IngestionStore, path: &Path) -> Result<usize, StoreError> {
    let document = to_tree(store)?;
    let file = File::create(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), &document)?;
    info!(path = %path.display(), categories = document.len(), "JSON export written");
    Ok(document.len())
}

pub fn write_csv(store: &IngestionStore, path: &Path) -> Result<usize, StoreError> {
    let table = to_flat_table(store)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush().map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), rows = table.rows.len(), "CSV export written");
    Ok(table.rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::KeyNode;

    fn populated() -> IngestionStore {
        let root = KeyNode::new("Root")
            .with_child(
                KeyNode::new("InventoryApplication").with_child(
                    KeyNode::new("A")
                        .with_value("Name", "Notepad++")
                        .with_value("Language", "1031")
                        .with_value("(default)", "x"),
                ),
            )
            .with_child(
                KeyNode::new("InventoryDevicePnp")
                    .with_child(KeyNode::new("usb#1").with_value("Class", "USB")),
            );
        let mut store = IngestionStore::open_in_memory().unwrap();
        store.ingest(&root, None).unwrap();
        store
    }

    #[test]
    fn test_tree_shapes() {
        let tree = to_tree(&populated()).unwrap();
        assert_eq!(tree.len(), 2);

        let app = &tree["InventoryApplication"][0];
        assert_eq!(app.id, "A");
        assert_eq!(app.fields["Name"], "Notepad++");
        assert_eq!(app.fields["LanguageName"], "German (Germany)");
        assert_eq!(app.fields["(default)"], "x");
        assert_eq!(app.fields["Publisher"], Value::Null);

        let device = &tree["InventoryDevicePnp"][0];
        assert_eq!(device.fields["Class"], "USB");
        assert_eq!(device.fields.len(), 1);
    }

    #[test]
    fn test_flat_table_union_columns() {
        let store = populated();
        let table = to_flat_table(&store).unwrap();
        assert_eq!(table.columns.first(), Some(&"subkey_name"));
        assert_eq!(table.columns.last(), Some(&"data"));
        assert_eq!(table.rows.len(), 2);

        let app = &table.rows[0];
        assert_eq!(table.cell(app, "entry_id"), Some("A"));
        assert_eq!(table.cell(app, "DefaultValue"), Some("x"));
        assert_eq!(table.cell(app, "data"), Some(""));

        let device = &table.rows[1];
        assert_eq!(table.cell(device, "subkey_name"), Some("InventoryDevicePnp"));
        assert_eq!(table.cell(device, "Name"), Some(""));
        assert_eq!(table.cell(device, "data"), Some(r#"{"Class":"USB"}"#));
    }

    #[test]
    fn test_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated();

        let json_path = dir.path().join("amcache.json");
        assert_eq!(write_json(&store, &json_path).unwrap(), 2);
        let parsed: Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed["InventoryApplication"][0]["id"], "A");

        let csv_path = dir.path().join("amcache.csv");
        assert_eq!(write_csv(&store, &csv_path).unwrap(), 2);
        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(reader.headers().unwrap().len(), FLAT_COLUMNS.len());
        assert_eq!(reader.records().count(), 2);
    }

    #[test]
    fn test_empty_store_exports() {
        let store = IngestionStore::open_in_memory().unwrap();
        assert!(to_tree(&store).unwrap().is_empty());
        assert!(to_flat_table(&store).unwrap().rows.is_empty());
    }
}
