//! Whole-pipeline tests over descriptor inputs.

use serde_json::{json, Value};

use crate::config::Config;
use crate::test_utils::{
    contract_object, link_descriptors, read_uleb, runtime_imports, section_names,
};

fn token_contract() -> Value {
    json!({
        "name": "token.o",
        "functions": [
            {"symbol": "do_transfer", "params": ["i64", "i64"], "body": "000b"},
            {"symbol": "do_issue", "params": ["i64", "i64"], "body": "000b"}
        ],
        "segments": [
            {"name": ".rodata.sym", "align": 3, "data": "454f530000000000"}
        ],
        "eosio": {
            "actions": ["transfer:do_transfer", "issue:do_issue"],
            "abi": "{\"version\": \"eosio::abi/1.2\", \"actions\": [{\"name\": \"transfer\", \"type\": \"transfer\"}]}"
        },
        "producers": {"languages": [["C++", "17"]], "tools": [["clang", "9"]]},
        "undefined": runtime_imports(),
    })
}

#[test]
fn module_sections_come_out_in_order() {
    let (result, _, diagnostics) = link_descriptors(&Config::default(), &[token_contract()]);
    let module = result.expect("link succeeds");
    assert!(!diagnostics.has_errors());

    let sections = section_names(&module.bytes);
    let expected: Vec<(u8, Option<String>)> = vec![
        (1, None),                                // type
        (2, None),                                // import
        (3, None),                                // function
        (4, None),                                // table
        (5, None),                                // memory
        (6, None),                                // global
        (7, None),                                // export
        (10, None),                               // code
        (11, None),                               // data
        (0, Some("name".to_string())),            // names
        (0, Some("producers".to_string())),       // producers
    ];
    assert_eq!(sections, expected);
}

#[test]
fn memory_is_exported_by_default() {
    let (result, _, _) = link_descriptors(&Config::default(), &[token_contract()]);
    let module = result.expect("link succeeds");

    // export section: find id 7 and decode the first entry
    let mut pos = 8;
    let bytes = &module.bytes;
    while pos < bytes.len() {
        let id = bytes[pos];
        pos += 1;
        let size = read_uleb(bytes, &mut pos) as usize;
        if id != 7 {
            pos += size;
            continue;
        }
        let count = read_uleb(bytes, &mut pos);
        assert!(count >= 1);
        let name_len = read_uleb(bytes, &mut pos) as usize;
        let name = std::str::from_utf8(&bytes[pos..pos + name_len]).unwrap();
        pos += name_len;
        assert_eq!(name, "memory");
        assert_eq!(bytes[pos], 2); // memory kind
        return;
    }
    panic!("no export section found");
}

#[test]
fn export_indices_stay_in_bounds() {
    let (result, table, _) = link_descriptors(&Config::default(), &[token_contract()]);
    result.expect("link succeeds");

    // count functions: three imports plus apply + two handlers
    let num_functions = 6;
    for name in ["apply", "do_transfer", "do_issue"] {
        let id = table.find(name).unwrap();
        let index = table.get(id).out_index.unwrap();
        assert!(index < num_functions, "{name} index {index} out of bounds");
    }
}

#[test]
fn type_section_deduplicates_signatures() {
    let (result, _, _) = link_descriptors(&Config::default(), &[token_contract()]);
    let module = result.expect("link succeeds");

    // both handlers share (i64, i64) -> (); the imports contribute
    // (i64) -> (), (i32, i64) -> (), () -> i64; apply adds
    // (i64, i64, i64) -> (). Five distinct signatures in total.
    let mut pos = 8;
    let bytes = &module.bytes;
    while pos < bytes.len() {
        let id = bytes[pos];
        pos += 1;
        let size = read_uleb(bytes, &mut pos) as usize;
        if id != 1 {
            pos += size;
            continue;
        }
        let count = read_uleb(bytes, &mut pos);
        assert_eq!(count, 5);
        return;
    }
    panic!("no type section found");
}

#[test]
fn abi_companion_folds_in_input_order() {
    let abi = |actions: &[&str]| {
        json!({
            "version": "eosio::abi/1.2",
            "actions": actions
                .iter()
                .map(|n| json!({"name": n, "type": n}))
                .collect::<Vec<_>>(),
        })
        .to_string()
    };

    let (result, _, _) = link_descriptors(
        &Config::default(),
        &[
            json!({
                "name": "a.o",
                "eosio": {"abi": abi(&["alpha"])},
                "undefined": runtime_imports(),
            }),
            json!({"name": "b.o", "eosio": {"abi": abi(&["beta"])}}),
            json!({"name": "c.o", "eosio": {"abi": abi(&["gamma"])}}),
        ],
    );
    let module = result.expect("link succeeds");

    let expected =
        crate::abi::merge_abis(&[abi(&["alpha"]), abi(&["beta"]), abi(&["gamma"])]).unwrap();
    assert_eq!(module.abi.as_deref(), Some(expected.as_str()));

    let value: Value = serde_json::from_str(module.abi.as_deref().unwrap()).unwrap();
    let names: Vec<&str> = value["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap())
        .collect();
    // fold is seeded with the last blob
    assert_eq!(names, ["gamma", "alpha", "beta"]);
}

#[test]
fn no_abi_no_companion() {
    let (result, _, _) = link_descriptors(
        &Config::default(),
        &[contract_object("a.o", &["transfer:do_transfer"], &["do_transfer"])],
    );
    let module = result.expect("link succeeds");
    assert!(module.abi.is_none());
}

#[test]
fn invalid_abi_is_nonfatal() {
    let (result, _, diagnostics) = link_descriptors(
        &Config::default(),
        &[json!({
            "name": "bad.o",
            "eosio": {"abi": "not json at all"},
            "undefined": runtime_imports(),
        })],
    );
    let module = result.expect("module still links");
    assert!(module.abi.is_none());
    assert!(diagnostics.iter().any(|d| d.message.contains("failed to write ABI")));
}

#[test]
fn feature_error_gates_the_link() {
    let (result, _, diagnostics) = link_descriptors(
        &Config::default(),
        &[json!({
            "name": "atomic.o",
            "features": [{"policy": "used", "name": "atomics"}],
            "undefined": runtime_imports(),
        })],
    );
    assert!(result.is_err());
    assert!(diagnostics.has_errors());
}

#[test]
fn emit_relocs_adds_linking_and_reloc_sections() {
    let config = Config {
        emit_relocs: true,
        ..Config::default()
    };
    let (result, _, _) = link_descriptors(
        &config,
        &[json!({
            "name": "a.o",
            "functions": [
                {"symbol": "do_transfer", "params": ["i64", "i64"], "body": "0010000b",
                 "relocs": [{"kind": "function_index_leb", "offset": 2, "index": 0}]}
            ],
            "eosio": {"actions": ["transfer:do_transfer"]},
            "undefined": runtime_imports(),
        })],
    );
    let module = result.expect("link succeeds");

    let sections = section_names(&module.bytes);
    let customs: Vec<&str> = sections
        .iter()
        .filter_map(|(_, name)| name.as_deref())
        .collect();
    assert!(customs.contains(&"linking"));
    assert!(customs.contains(&"reloc.CODE"));
    // reloc sections come after linking, before name
    let linking_at = customs.iter().position(|n| *n == "linking").unwrap();
    let reloc_at = customs.iter().position(|n| *n == "reloc.CODE").unwrap();
    let name_at = customs.iter().position(|n| *n == "name").unwrap();
    assert!(linking_at < reloc_at && reloc_at < name_at);
}

#[test]
fn custom_sections_pass_through_unless_stripped() {
    let debug_object = |name: &str| {
        json!({
            "name": name,
            "custom_sections": [
                {"name": ".debug_info", "payload": "aabb"},
                {"name": "conventions", "payload": "cc"}
            ],
            "undefined": runtime_imports(),
        })
    };

    let (result, _, _) = link_descriptors(&Config::default(), &[debug_object("a.o")]);
    let module = result.expect("link succeeds");
    let customs: Vec<String> = section_names(&module.bytes)
        .into_iter()
        .filter_map(|(_, name)| name)
        .collect();
    assert!(customs.contains(&".debug_info".to_string()));
    assert!(customs.contains(&"conventions".to_string()));

    let config = Config {
        strip_debug: true,
        ..Config::default()
    };
    let (result, _, _) = link_descriptors(&config, &[debug_object("a.o")]);
    let module = result.expect("link succeeds");
    let customs: Vec<String> = section_names(&module.bytes)
        .into_iter()
        .filter_map(|(_, name)| name)
        .collect();
    assert!(!customs.contains(&".debug_info".to_string()));
    assert!(customs.contains(&"conventions".to_string()));
}

#[test]
fn target_features_section_lists_used_features() {
    let (result, _, _) = link_descriptors(
        &Config::default(),
        &[json!({
            "name": "a.o",
            "features": [
                {"policy": "used", "name": "sign-ext"},
                {"policy": "used", "name": "bulk-memory"}
            ],
            "undefined": runtime_imports(),
        })],
    );
    let module = result.expect("link succeeds");
    let customs: Vec<String> = section_names(&module.bytes)
        .into_iter()
        .filter_map(|(_, name)| name)
        .collect();
    assert!(customs.contains(&"target_features".to_string()));
}

#[test]
fn globals_events_and_indirect_functions_emit_their_sections() {
    let (result, table, _) = link_descriptors(
        &Config::default(),
        &[json!({
            "name": "a.o",
            "functions": [
                {"symbol": "callback", "params": ["i32"], "body": "000b"},
                {"symbol": "take_address", "body": "0041000b",
                 "relocs": [{"kind": "table_index_sleb", "offset": 2, "index": 0}]}
            ],
            "globals": [
                {"symbol": "counter", "val_type": "i64", "init": 7}
            ],
            "events": [
                {"symbol": "cpp_exception", "params": ["i32"]}
            ],
            "undefined": runtime_imports(),
        })],
    );
    let module = result.expect("link succeeds");

    let ids: Vec<u8> = section_names(&module.bytes).iter().map(|(id, _)| *id).collect();
    assert!(ids.contains(&6), "global section");
    assert!(ids.contains(&13), "event section");
    assert!(ids.contains(&9), "elem section");

    // callback took a table slot starting at table base 1
    let id = table.find("callback").unwrap();
    assert_eq!(table.get(id).table_index, Some(1));
}

#[test]
fn segment_data_lands_at_chunk_offsets() {
    let (result, _, _) = link_descriptors(
        &Config::default(),
        &[json!({
            "name": "a.o",
            "segments": [
                {"name": ".rodata.a", "align": 0, "data": "aa"},
                {"name": ".rodata.b", "align": 2, "data": "bbbbbbbb"}
            ],
            "undefined": runtime_imports(),
        })],
    );
    let module = result.expect("link succeeds");

    // data section: one merged .rodata segment, chunk b at offset 4
    let mut pos = 8;
    let bytes = &module.bytes;
    while pos < bytes.len() {
        let id = bytes[pos];
        pos += 1;
        let size = read_uleb(bytes, &mut pos) as usize;
        if id != 11 {
            pos += size;
            continue;
        }
        let count = read_uleb(bytes, &mut pos);
        assert_eq!(count, 1);
        let flags = read_uleb(bytes, &mut pos);
        assert_eq!(flags, 0); // active
        // init expr: i32.const <va> end
        assert_eq!(bytes[pos], 0x41);
        pos += 1;
        let mut sleb_end = pos;
        while bytes[sleb_end] & 0x80 != 0 {
            sleb_end += 1;
        }
        pos = sleb_end + 1;
        assert_eq!(bytes[pos], 0x0b);
        pos += 1;
        let seg_size = read_uleb(bytes, &mut pos);
        assert_eq!(seg_size, 8);
        assert_eq!(&bytes[pos..pos + 8], &[0xaa, 0, 0, 0, 0xbb, 0xbb, 0xbb, 0xbb]);
        return;
    }
    panic!("no data section found");
}
