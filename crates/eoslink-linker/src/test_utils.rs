//! Shared helpers for linker tests.

use eoslink_object::{ObjectDescriptor, ObjectFile, SymbolTable};
use serde_json::{json, Value};

use crate::config::Config;
use crate::diagnostics::Diagnostics;

/// Load a batch of descriptor JSON values into objects + symbol table.
pub fn load_objects(descriptors: &[Value]) -> (Vec<ObjectFile>, SymbolTable) {
    let mut table = SymbolTable::new();
    let objects = descriptors
        .iter()
        .enumerate()
        .map(|(i, value)| {
            ObjectDescriptor::from_json(&value.to_string())
                .expect("valid descriptor json")
                .into_object(i as u32, &mut table)
                .expect("descriptor converts")
        })
        .collect();
    (objects, table)
}

/// The helper imports every dispatching contract needs.
pub fn runtime_imports() -> Value {
    json!([
        {"symbol": "eosio_set_contract_name", "kind": "function", "params": ["i64"]},
        {"symbol": "eosio_assert_code", "kind": "function", "params": ["i32", "i64"]},
        {"symbol": "current_time", "kind": "function", "results": ["i64"]}
    ])
}

/// A minimal contract object with the given action annotations and one
/// handler function per referenced handler name.
pub fn contract_object(name: &str, actions: &[&str], handlers: &[&str]) -> Value {
    json!({
        "name": name,
        "functions": handlers
            .iter()
            .map(|h| json!({"symbol": h, "params": ["i64", "i64"], "body": "000b"}))
            .collect::<Vec<_>>(),
        "eosio": {"actions": actions},
        "undefined": runtime_imports(),
    })
}

/// Run a full link over the given descriptors.
pub fn link_descriptors(
    config: &Config,
    descriptors: &[Value],
) -> (
    Result<crate::writer::LinkedModule, crate::LinkError>,
    SymbolTable,
    Diagnostics,
) {
    let (mut objects, mut table) = load_objects(descriptors);
    let mut diagnostics = Diagnostics::new();
    let result = crate::writer::link(config, &mut objects, &mut table, &mut diagnostics);
    (result, table, diagnostics)
}

/// Decode an unsigned LEB128 value.
pub fn read_uleb(bytes: &[u8], pos: &mut usize) -> u64 {
    let mut value = 0u64;
    let mut shift = 0;
    loop {
        let byte = bytes[*pos];
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return value;
        }
        shift += 7;
    }
}

/// Walk a wasm module and return its `(section_id, custom_name)` pairs.
pub fn section_names(module: &[u8]) -> Vec<(u8, Option<String>)> {
    assert_eq!(&module[..4], b"\0asm", "bad magic");
    assert_eq!(&module[4..8], &1u32.to_le_bytes(), "bad version");

    let mut sections = Vec::new();
    let mut pos = 8;
    while pos < module.len() {
        let id = module[pos];
        pos += 1;
        let size = read_uleb(module, &mut pos) as usize;
        let end = pos + size;
        let name = if id == 0 {
            let len = read_uleb(module, &mut pos) as usize;
            let name = String::from_utf8(module[pos..pos + len].to_vec()).unwrap();
            Some(name)
        } else {
            None
        };
        sections.push((id, name));
        pos = end;
    }
    assert_eq!(pos, module.len(), "trailing bytes after last section");
    sections
}

/// Signed LEB128 encoding of `value`, for matching emitted immediates.
pub fn sleb(value: i64) -> Vec<u8> {
    let mut buf = Vec::new();
    eoslink_wasm::encode::write_sleb128(&mut buf, value);
    buf
}

/// Count non-overlapping occurrences of `needle` in `haystack`.
pub fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() || haystack.len() < needle.len() {
        return 0;
    }
    let mut count = 0;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            count += 1;
            i += needle.len();
        } else {
            i += 1;
        }
    }
    count
}
