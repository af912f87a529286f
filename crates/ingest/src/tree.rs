//! Owned key tree handed over by a hive decoder.
//!
//! Ingestion only needs three things from a decoder: open a tree from bytes,
//! list a key's children, list a key's named values. [`HiveDecoder`] is that
//! seam; the nt-hive adapter lives in `decoder`.

use crate::error::DecodeError;
use amc_core::RegValue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedValue {
    pub name: String,
    pub value: RegValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyNode {
    pub name: String,
    pub values: Vec<NamedValue>,
    pub children: Vec<KeyNode>,
}

impl KeyNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<RegValue>) -> Self {
        self.values.push(NamedValue {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_child(mut self, child: KeyNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(&self) -> &[KeyNode] {
        &self.children
    }

    pub fn values(&self) -> &[NamedValue] {
        &self.values
    }

    /// Direct child by name. Registry key names compare case-insensitively.
    pub fn child(&self, name: &str) -> Option<&KeyNode> {
        self.children
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Walk a backslash-separated path. An empty path is this key.
    pub fn subpath(&self, path: &str) -> Option<&KeyNode> {
        path.split(['\\', '/'])
            .filter(|part| !part.is_empty())
            .try_fold(self, |node, part| node.child(part))
    }

    /// Value names mapped to their stringified data
    pub fn value_map(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|v| (v.name.clone(), v.value.to_text()))
            .collect()
    }
}

pub trait HiveDecoder {
    /// Parse a complete hive image and return its root key
    fn decode(&self, bytes: &[u8]) -> Result<KeyNode, DecodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KeyNode {
        KeyNode::new("ROOT").with_child(
            KeyNode::new("Root").with_child(
                KeyNode::new("InventoryApplication").with_child(
                    KeyNode::new("0000a1b2")
                        .with_value("Name", "7-Zip")
                        .with_value("Language", 1033u32),
                ),
            ),
        )
    }

    #[test]
    fn test_subpath_is_case_insensitive() {
        let root = sample();
        let category = root.subpath(r"root\InventoryApplication").unwrap();
        assert_eq!(category.name, "InventoryApplication");
        assert!(root.subpath("Root/inventoryapplication/0000A1B2").is_some());
        assert!(root.subpath(r"Root\Missing").is_none());
        assert_eq!(root.subpath("").unwrap().name, "ROOT");
    }

    #[test]
    fn test_value_map() {
        let root = sample();
        let entry = root.subpath(r"Root\InventoryApplication\0000a1b2").unwrap();
        let map = entry.value_map();
        assert_eq!(map["Name"], "7-Zip");
        assert_eq!(map["Language"], "1033");
    }
}
