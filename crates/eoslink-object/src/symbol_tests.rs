//! Tests for the symbol table.

use eoslink_wasm::types::{GlobalType, InitExpr, Signature, ValType};

use super::symbol::{Symbol, SymbolFlags, SymbolKind, SymbolTable};

fn undefined_ref(name: &str) -> Symbol {
    Symbol::new(
        name,
        SymbolKind::Data,
        SymbolFlags {
            live: true,
            used_in_regular_obj: true,
            ..SymbolFlags::default()
        },
    )
}

#[test]
fn insert_and_find() {
    let mut table = SymbolTable::new();
    let id = table.insert(undefined_ref("foo"));
    assert_eq!(table.find("foo"), Some(id));
    assert_eq!(table.find("bar"), None);
    assert_eq!(table.len(), 1);
}

#[test]
fn insert_same_name_replaces() {
    let mut table = SymbolTable::new();
    let first = table.insert(undefined_ref("foo"));
    let mut replacement = undefined_ref("foo");
    replacement.flags.defined = true;
    let second = table.insert(replacement);
    assert_eq!(first, second);
    assert_eq!(table.len(), 1);
    assert!(table.get(first).flags.defined);
}

#[test]
fn synthetic_symbols_keep_creation_order() {
    let mut table = SymbolTable::new();
    let f = table.add_synthetic_function("__wasm_call_ctors", Signature::default());
    let g = table.add_synthetic_global(
        "__stack_pointer",
        GlobalType {
            val_type: ValType::I32,
            mutable: true,
        },
        InitExpr::I32Const(0),
    );
    assert_eq!(table.synthetic(), &[f, g]);
    assert!(table.get(f).flags.synthetic);
    assert!(table.get(g).flags.live);
}

#[test]
fn optional_data_symbol_requires_reference() {
    let mut table = SymbolTable::new();
    // No reference in the link: nothing gets defined.
    assert_eq!(table.add_optional_data_symbol("__start_mysec", 1024), None);

    table.insert(undefined_ref("__start_mysec"));
    let id = table.add_optional_data_symbol("__start_mysec", 1024).unwrap();
    let sym = table.get(id);
    assert!(sym.flags.defined);
    assert_eq!(sym.virtual_address, Some(1024));

    // Already defined: left alone.
    assert_eq!(table.add_optional_data_symbol("__start_mysec", 2048), None);
    assert_eq!(table.get(id).virtual_address, Some(1024));
}
