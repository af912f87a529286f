//! Registry value data as handed over by the hive decoder.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RegValue {
    /// REG_NONE or a value without data
    None,
    /// REG_SZ, REG_EXPAND_SZ, REG_LINK
    String(String),
    /// REG_DWORD, REG_DWORD_BIG_ENDIAN
    Dword(u32),
    /// REG_QWORD
    Qword(u64),
    /// REG_MULTI_SZ
    MultiString(Vec<String>),
    /// REG_BINARY and every other type
    Binary(Vec<u8>),
}

impl RegValue {
    /// Stringified form stored in the relational tables
    pub fn to_text(&self) -> String {
        match self {
            RegValue::None => String::new(),
            RegValue::String(s) => s.clone(),
            RegValue::Dword(v) => v.to_string(),
            RegValue::Qword(v) => v.to_string(),
            RegValue::MultiString(items) => format!("[{}]", items.join(", ")),
            RegValue::Binary(bytes) => hex::encode(bytes),
        }
    }
}

impl From<&str> for RegValue {
    fn from(s: &str) -> Self {
        RegValue::String(s.to_string())
    }
}

impl From<String> for RegValue {
    fn from(s: String) -> Self {
        RegValue::String(s)
    }
}

impl From<u32> for RegValue {
    fn from(v: u32) -> Self {
        RegValue::Dword(v)
    }
}

impl From<u64> for RegValue {
    fn from(v: u64) -> Self {
        RegValue::Qword(v)
    }
}
