//! Tests for memory layout.

use serde_json::json;

use eoslink_wasm::types::InitExpr;

use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::test_utils::load_objects;
use crate::writer::Writer;

fn layout(config: &Config, descriptors: &[serde_json::Value]) -> LayoutView {
    let (mut objects, mut table) = load_objects(descriptors);
    let mut diagnostics = Diagnostics::new();
    let mut writer = Writer::new(config, &mut objects, &mut table, &mut diagnostics);
    writer.create_output_segments();
    writer.layout_memory();

    let segment_vas = writer
        .segments
        .iter()
        .map(|seg| (seg.name.clone(), seg.start_va, seg.alignment))
        .collect();
    let symbol_va = |name: &str| {
        writer
            .symtab
            .find(name)
            .and_then(|id| writer.symtab.get(id).virtual_address)
    };
    let stack_pointer = writer.symtab.find("__stack_pointer").and_then(|id| {
        match writer.symtab.get(id).init {
            Some(InitExpr::I32Const(v)) => Some(v),
            _ => None,
        }
    });
    LayoutView {
        segment_vas,
        heap_base: symbol_va("__heap_base"),
        data_end: symbol_va("__data_end"),
        stack_pointer,
        mem_pages: writer.mem_pages,
        max_mem_pages: writer.max_mem_pages,
        errors: diagnostics.error_count(),
    }
}

struct LayoutView {
    segment_vas: Vec<(String, u64, u32)>,
    heap_base: Option<u64>,
    data_end: Option<u64>,
    stack_pointer: Option<i32>,
    mem_pages: u64,
    max_mem_pages: Option<u64>,
    errors: usize,
}

fn rodata_object() -> serde_json::Value {
    json!({
        "name": "data.o",
        "segments": [{"name": ".rodata.foo", "align": 4, "data": "11223344"}],
        "undefined": [
            {"symbol": "__heap_base", "kind": "data"},
            {"symbol": "__data_end", "kind": "data"}
        ]
    })
}

#[test]
fn segments_start_at_aligned_global_base() {
    // .rodata.foo merges into .rodata; startVA is globalBase rounded up
    // to its 16-byte alignment
    let config = Config {
        global_base: 1028,
        ..Config::default()
    };
    let view = layout(&config, &[rodata_object()]);

    let (name, va, align) = &view.segment_vas[0];
    assert_eq!(name, ".rodata");
    assert_eq!(*align, 4);
    assert_eq!(*va, 1040);
    assert_eq!(va % (1 << align), 0);
    assert_eq!(view.errors, 0);
}

#[test]
fn default_layout_places_stack_after_data() {
    let config = Config {
        global_base: 1024,
        z_stack_size: 64,
        ..Config::default()
    };
    let view = layout(&config, &[rodata_object()]);

    // data: [1024, 1028); stack: aligned to 16 -> [1040, 1104)
    assert_eq!(view.data_end, Some(1028));
    assert_eq!(view.stack_pointer, Some(1104));
    assert_eq!(view.heap_base, Some(1104));
    assert_eq!(view.mem_pages, 1);
}

#[test]
fn stack_first_layout() {
    // stackFirst with a 64-byte stack: __stack_pointer lands at 64, data
    // begins at or after globalBase, heap base equals the final pointer
    let config = Config {
        stack_first: true,
        z_stack_size: 64,
        global_base: 1024,
        ..Config::default()
    };
    let view = layout(&config, &[rodata_object()]);

    assert_eq!(view.stack_pointer, Some(64));
    let va = view.segment_vas[0].1;
    assert!(va >= 1024);
    assert_eq!(view.data_end, Some(va + 4));
    assert_eq!(view.heap_base, view.data_end);
}

#[test]
fn misaligned_stack_size_is_an_error() {
    let config = Config {
        z_stack_size: 100,
        ..Config::default()
    };
    let view = layout(&config, &[rodata_object()]);
    assert_eq!(view.errors, 1);
}

#[test]
fn initial_memory_rounds_up_and_validates() {
    let config = Config {
        initial_memory: 2 * 65536,
        ..Config::default()
    };
    let view = layout(&config, &[rodata_object()]);
    assert_eq!(view.errors, 0);
    assert_eq!(view.mem_pages, 2);

    let config = Config {
        initial_memory: 1000, // not page aligned and too small
        ..Config::default()
    };
    let view = layout(&config, &[rodata_object()]);
    assert_eq!(view.errors, 2);
}

#[test]
fn max_memory_sets_page_limit() {
    let config = Config {
        max_memory: 4 * 65536,
        ..Config::default()
    };
    let view = layout(&config, &[rodata_object()]);
    assert_eq!(view.max_mem_pages, Some(4));
    assert_eq!(view.errors, 0);
}

#[test]
fn data_symbols_get_virtual_addresses() {
    let config = Config {
        global_base: 1024,
        ..Config::default()
    };
    let (mut objects, mut table) = load_objects(&[json!({
        "name": "data.o",
        "segments": [{"name": ".rodata", "align": 2, "data": "aabbccdd eeff0011"}],
        "data_symbols": [
            {"symbol": "greeting", "segment": 0, "offset": 4, "size": 4}
        ]
    })]);
    let mut diagnostics = Diagnostics::new();
    let mut writer = Writer::new(&config, &mut objects, &mut table, &mut diagnostics);
    writer.create_output_segments();
    writer.layout_memory();

    let id = writer.symtab.find("greeting").unwrap();
    assert_eq!(writer.symtab.get(id).virtual_address, Some(1028));
}
