//! Per-Category schema selection.
//!
//! Two Amcache categories get a fixed, typed column set. Every other category
//! is stored generically as `entry_id` + a serialized value map, so new
//! inventory classes never need a schema change.

use serde::{Deserialize, Serialize};

/// Category holding one row per executable file seen on the host
pub const APPLICATION_FILE_CATEGORY: &str = "InventoryApplicationFile";

/// Category holding one row per installed application
pub const APPLICATION_CATEGORY: &str = "InventoryApplication";

/// Primary key column present in every category table
pub const ENTRY_ID_COLUMN: &str = "entry_id";

/// Serialized value-map column of generic tables
pub const DATA_COLUMN: &str = "data";

/// Category name column of the flat export
pub const SUBKEY_NAME_COLUMN: &str = "subkey_name";

/// Registry value name of the unnamed default value
pub const DEFAULT_VALUE_NAME: &str = "(default)";

/// Where a fixed column takes its text from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    /// The registry value with this name
    Value(&'static str),
    /// Label derived from the entry's `Language` value
    LocaleLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub source: ColumnSource,
}

impl Column {
    const fn value(name: &'static str) -> Self {
        Self {
            name,
            source: ColumnSource::Value(name),
        }
    }

    /// Key used for this column in the tree export
    pub fn field_name(&self) -> &'static str {
        match self.source {
            ColumnSource::Value(value_name) => value_name,
            ColumnSource::LocaleLabel => self.name,
        }
    }
}

const LANGUAGE_NAME: Column = Column {
    name: "LanguageName",
    source: ColumnSource::LocaleLabel,
};

const APPLICATION_FILE_COLUMNS: &[Column] = &[
    Column::value("ProgramId"),
    Column::value("FileId"),
    Column::value("LowerCaseLongPath"),
    Column::value("Name"),
    Column::value("OriginalFileName"),
    Column::value("Publisher"),
    Column::value("Version"),
    Column::value("BinFileVersion"),
    Column::value("BinaryType"),
    Column::value("ProductName"),
    Column::value("ProductVersion"),
    Column::value("LinkDate"),
    Column::value("BinProductVersion"),
    Column::value("Size"),
    Column::value("Language"),
    LANGUAGE_NAME,
    Column::value("Usn"),
];

const APPLICATION_COLUMNS: &[Column] = &[
    Column::value("ProgramId"),
    Column::value("ProgramInstanceId"),
    Column::value("Name"),
    Column::value("Version"),
    Column::value("Publisher"),
    Column::value("Language"),
    LANGUAGE_NAME,
    Column::value("InstallDate"),
    Column::value("Source"),
    Column::value("RootDirPath"),
    Column::value("HiddenArp"),
    Column::value("UninstallString"),
    Column::value("RegistryKeyPath"),
    Column::value("MsiPackageCode"),
    Column::value("MsiProductCode"),
    Column::value("MsiInstallDate"),
    Column {
        name: "DefaultValue",
        source: ColumnSource::Value(DEFAULT_VALUE_NAME),
    },
];

/// Columns of the flat export: category, id, union of fixed columns, generic data
pub const FLAT_COLUMNS: &[&str] = &[
    SUBKEY_NAME_COLUMN,
    ENTRY_ID_COLUMN,
    "ProgramId",
    "ProgramInstanceId",
    "FileId",
    "LowerCaseLongPath",
    "Name",
    "OriginalFileName",
    "Publisher",
    "Version",
    "BinFileVersion",
    "BinaryType",
    "ProductName",
    "ProductVersion",
    "LinkDate",
    "BinProductVersion",
    "Size",
    "Language",
    "LanguageName",
    "Usn",
    "InstallDate",
    "Source",
    "RootDirPath",
    "HiddenArp",
    "UninstallString",
    "RegistryKeyPath",
    "MsiPackageCode",
    "MsiProductCode",
    "MsiInstallDate",
    "DefaultValue",
    DATA_COLUMN,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    ApplicationFile,
    Application,
    Generic,
}

impl SchemaKind {
    pub fn for_category(name: &str) -> Self {
        match name {
            APPLICATION_FILE_CATEGORY => SchemaKind::ApplicationFile,
            APPLICATION_CATEGORY => SchemaKind::Application,
            _ => SchemaKind::Generic,
        }
    }

    /// Typed columns after `entry_id`; empty for the generic schema
    pub fn columns(&self) -> &'static [Column] {
        match self {
            SchemaKind::ApplicationFile => APPLICATION_FILE_COLUMNS,
            SchemaKind::Application => APPLICATION_COLUMNS,
            SchemaKind::Generic => &[],
        }
    }

    pub fn is_fixed(&self) -> bool {
        !matches!(self, SchemaKind::Generic)
    }
}
