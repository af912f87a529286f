//! nt-hive adapter: parses a hive image and copies it into an owned tree

use crate::error::DecodeError;
use crate::tree::{HiveDecoder, KeyNode, NamedValue};
use amc_core::schema::DEFAULT_VALUE_NAME;
use amc_core::RegValue;
use nt_hive::{Hive, KeyValue, KeyValueDataType};
use tracing::{debug, warn};

type NtKeyNode<'h, 'b> = nt_hive::KeyNode<&'h Hive<&'b [u8]>, &'b [u8]>;
type NtKeyValue<'h, 'b> = KeyValue<&'h Hive<&'b [u8]>, &'b [u8]>;

/// Deepest key nesting copied before giving up
pub const MAX_DEPTH: usize = 512;

fn hive_err(err: nt_hive::NtHiveError) -> DecodeError {
    DecodeError::Hive(err.to_string())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NtHiveDecoder;

impl NtHiveDecoder {
    pub fn new() -> Self {
        Self
    }

    fn convert_value(value: &NtKeyValue<'_, '_>) -> Result<NamedValue, DecodeError> {
        let name = value.name().map_err(hive_err)?.to_string();
        let name = if name.is_empty() {
            DEFAULT_VALUE_NAME.to_string()
        } else {
            name
        };

        let raw = || -> Result<RegValue, DecodeError> {
            let bytes = value
                .data()
                .and_then(|data| data.into_vec())
                .map_err(hive_err)?;
            Ok(if bytes.is_empty() {
                RegValue::None
            } else {
                RegValue::Binary(bytes)
            })
        };

        let data = match value.data_type() {
            Ok(KeyValueDataType::RegSZ)
            | Ok(KeyValueDataType::RegExpandSZ)
            | Ok(KeyValueDataType::RegLink) => match value.string_data() {
                Ok(s) => RegValue::String(s),
                // Odd-length or unterminated strings still carry evidence
                Err(_) => raw()?,
            },
            Ok(KeyValueDataType::RegDWord) | Ok(KeyValueDataType::RegDWordBigEndian) => {
                match value.dword_data() {
                    Ok(v) => RegValue::Dword(v),
                    Err(_) => raw()?,
                }
            }
            Ok(KeyValueDataType::RegQWord) => match value.qword_data() {
                Ok(v) => RegValue::Qword(v),
                Err(_) => raw()?,
            },
            Ok(KeyValueDataType::RegMultiSZ) => match value.multi_string_data() {
                Ok(items) => RegValue::MultiString(items),
                Err(_) => raw()?,
            },
            Ok(KeyValueDataType::RegNone) => RegValue::None,
            _ => raw()?,
        };

        Ok(NamedValue { name, value: data })
    }

    fn convert_key(node: &NtKeyNode<'_, '_>, depth: usize) -> Result<KeyNode, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep(MAX_DEPTH));
        }
        let mut key = KeyNode::new(node.name().map_err(hive_err)?.to_string());

        if let Some(values) = node.values() {
            for value in values.map_err(hive_err)? {
                let value = value.map_err(hive_err)?;
                match Self::convert_value(&value) {
                    Ok(named) => key.values.push(named),
                    Err(err) => warn!(key = %key.name, error = %err, "skipping unreadable value"),
                }
            }
        }

        if let Some(subkeys) = node.subkeys() {
            for child in subkeys.map_err(hive_err)? {
                let child = child.map_err(hive_err)?;
                key.children.push(Self::convert_key(&child, depth + 1)?);
            }
        }

        Ok(key)
    }
}

impl HiveDecoder for NtHiveDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<KeyNode, DecodeError> {
        let hive = Hive::new(bytes).map_err(hive_err)?;
        let root = hive.root_key_node().map_err(hive_err)?;
        let tree = Self::convert_key(&root, 0)?;
        debug!(root = %tree.name, children = tree.children.len(), "hive decoded");
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_BLOCK: usize = 4096;
    const NO_CELL: u32 = u32::MAX;
    const REG_SZ: u32 = 1;
    const REG_DWORD: u32 = 4;
    const REG_MULTI_SZ: u32 = 7;

    fn utf16z(parts: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        for part in parts {
            for unit in part.encode_utf16().chain(std::iter::once(0)) {
                out.extend_from_slice(&unit.to_le_bytes());
            }
        }
        out
    }

    /// Append an allocated cell and return its data offset
    fn push_cell(data: &mut Vec<u8>, body: &[u8]) -> u32 {
        let offset = data.len() as u32;
        let total = (body.len() + 4 + 7) / 8 * 8;
        data.extend_from_slice(&(-(total as i32)).to_le_bytes());
        data.extend_from_slice(body);
        data.resize(offset as usize + total, 0);
        offset
    }

    fn vk(name: &str, data_type: u32, data_size: u32, data_offset: u32) -> Vec<u8> {
        let mut cell = b"vk".to_vec();
        cell.extend_from_slice(&(name.len() as u16).to_le_bytes());
        cell.extend_from_slice(&data_size.to_le_bytes());
        cell.extend_from_slice(&data_offset.to_le_bytes());
        cell.extend_from_slice(&data_type.to_le_bytes());
        // ASCII name
        cell.extend_from_slice(&1u16.to_le_bytes());
        cell.extend_from_slice(&0u16.to_le_bytes());
        cell.extend_from_slice(name.as_bytes());
        cell
    }

    /// Single-key hive named `Root` holding `values` as (name, type, data)
    fn single_key_hive(values: &[(&str, u32, Vec<u8>)]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut vk_offsets = Vec::new();
        for (name, data_type, bytes) in values {
            let cell = if bytes.len() <= 4 {
                let mut inline = [0u8; 4];
                inline[..bytes.len()].copy_from_slice(bytes);
                vk(name, *data_type, bytes.len() as u32 | 0x8000_0000, u32::from_le_bytes(inline))
            } else {
                let data_cell = push_cell(&mut data, bytes);
                vk(name, *data_type, bytes.len() as u32, data_cell)
            };
            vk_offsets.push(push_cell(&mut data, &cell));
        }
        let list: Vec<u8> = vk_offsets.iter().flat_map(|o| o.to_le_bytes()).collect();
        let list_offset = push_cell(&mut data, &list);

        let mut nk = b"nk".to_vec();
        // KEY_HIVE_ENTRY | KEY_COMP_NAME
        nk.extend_from_slice(&0x0024u16.to_le_bytes());
        nk.extend_from_slice(&[0u8; 8]);
        let fields = [
            0,                    // spare
            NO_CELL,              // parent
            0,                    // subkeys
            0,                    // volatile subkeys
            NO_CELL,              // subkey list
            NO_CELL,              // volatile subkey list
            values.len() as u32,  // values
            list_offset,          // value list
            NO_CELL,              // security
            NO_CELL,              // class name
            0,
            0,
            0,
            0,
            0,
        ];
        for field in fields {
            nk.extend_from_slice(&field.to_le_bytes());
        }
        nk.extend_from_slice(&4u16.to_le_bytes());
        nk.extend_from_slice(&0u16.to_le_bytes());
        nk.extend_from_slice(b"Root");
        let root_offset = push_cell(&mut data, &nk);
        data.resize(BASE_BLOCK, 0);

        let mut base = vec![0u8; BASE_BLOCK];
        let header: [(usize, u32); 10] = [
            (4, 1),  // primary sequence
            (8, 1),  // secondary sequence
            (20, 1), // major
            (24, 5), // minor
            (28, 0), // primary file
            (32, 1), // memory format
            (36, root_offset),
            (40, data.len() as u32),
            (44, 1), // clustering factor
            (0, u32::from_le_bytes(*b"regf")),
        ];
        for (at, field) in header {
            base[at..at + 4].copy_from_slice(&field.to_le_bytes());
        }
        let mut checksum = base[..508].chunks(4).fold(0u32, |acc, dword| {
            acc ^ u32::from_le_bytes([dword[0], dword[1], dword[2], dword[3]])
        });
        if checksum == 0 {
            checksum = 1;
        } else if checksum == u32::MAX {
            checksum -= 1;
        }
        base[508..512].copy_from_slice(&checksum.to_le_bytes());

        base.extend_from_slice(&data);
        base
    }

    #[test]
    fn test_decodes_typed_values() {
        let hive = single_key_hive(&[
            ("Paths", REG_MULTI_SZ, utf16z(&["a", "b", ""])),
            ("Count", REG_DWORD, 7u32.to_le_bytes().to_vec()),
            ("", REG_SZ, utf16z(&["7-Zip"])),
        ]);
        let root = NtHiveDecoder::new().decode(&hive).unwrap();

        assert_eq!(root.name, "Root");
        assert!(root.children.is_empty());
        let values: Vec<(&str, &RegValue)> = root
            .values
            .iter()
            .map(|named| (named.name.as_str(), &named.value))
            .collect();
        assert_eq!(
            values,
            vec![
                (
                    "Paths",
                    &RegValue::MultiString(vec!["a".to_string(), "b".to_string()])
                ),
                ("Count", &RegValue::Dword(7)),
                (DEFAULT_VALUE_NAME, &RegValue::String("7-Zip".to_string())),
            ]
        );
    }

    #[test]
    fn test_bad_checksum_is_rejected() {
        let mut hive = single_key_hive(&[("Count", REG_DWORD, 1u32.to_le_bytes().to_vec())]);
        hive[508] ^= 0xFF;
        assert!(matches!(
            NtHiveDecoder::new().decode(&hive),
            Err(DecodeError::Hive(_))
        ));
    }

    #[test]
    fn test_rejects_non_hive_bytes() {
        let err = NtHiveDecoder::new().decode(b"definitely not a hive").unwrap_err();
        assert!(matches!(err, DecodeError::Hive(_)));
    }

    #[test]
    fn test_rejects_truncated_header() {
        // Valid signature, nothing else
        let mut bytes = b"regf".to_vec();
        bytes.resize(64, 0);
        assert!(NtHiveDecoder::new().decode(&bytes).is_err());
    }
}
