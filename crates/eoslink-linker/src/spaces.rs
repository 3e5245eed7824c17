//! Index spaces: imports, functions, globals, events, types, exports.
//!
//! Imports are sealed before definitions are numbered, since each space
//! is contiguous with imports occupying `[0, N_imported)`. Synthetic
//! entries come before per-file entries, per-file entries keep file
//! iteration order.

use indexmap::IndexMap;
use tracing::debug;

use eoslink_object::{SymbolId, SymbolKind, SymbolTable};
use eoslink_wasm::types::{ExternalKind, Signature};

use crate::writer::Writer;

/// A function slot in the output code/function sections.
#[derive(Clone, Copy, Debug)]
pub(crate) enum FuncId {
    Object { file: usize, index: usize },
    Synthetic(SymbolId),
}

/// A global slot in the output global section.
#[derive(Clone, Copy, Debug)]
pub(crate) enum GlobalId {
    Object { file: usize, index: usize },
    Synthetic(SymbolId),
}

/// An event slot in the output event section.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EventId {
    pub file: usize,
    pub index: usize,
}

#[derive(Clone, Debug)]
pub(crate) struct Export {
    pub name: String,
    pub kind: ExternalKind,
    pub index: u32,
}

/// One imported symbol, in import-section order.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ImportEntry {
    pub kind: ExternalKind,
    pub symbol: SymbolId,
}

/// The import registry. Sealed once index assignment begins.
#[derive(Debug, Default)]
pub(crate) struct Imports {
    pub entries: Vec<ImportEntry>,
    pub num_functions: u32,
    pub num_globals: u32,
    pub num_events: u32,
    sealed: bool,
}

impl Imports {
    fn add(&mut self, symtab: &mut SymbolTable, id: SymbolId) {
        assert!(!self.sealed, "import added after sealing");
        let sym = symtab.get_mut(id);
        let kind = match sym.kind {
            SymbolKind::Function => {
                sym.out_index = Some(self.num_functions);
                self.num_functions += 1;
                ExternalKind::Function
            }
            SymbolKind::Global => {
                sym.out_index = Some(self.num_globals);
                self.num_globals += 1;
                ExternalKind::Global
            }
            SymbolKind::Event => {
                sym.out_index = Some(self.num_events);
                self.num_events += 1;
                ExternalKind::Event
            }
            SymbolKind::Data | SymbolKind::Section => unreachable!("data symbols are not imported"),
        };
        self.entries.push(ImportEntry { kind, symbol: id });
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }
}

/// Section names may rarely be valid C identifiers; those get
/// `__start_<name>`/`__stop_<name>` bracketing symbols.
fn is_valid_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Writer<'_> {
    /// One import per undefined, live symbol used in a regular object.
    /// Weak undefined symbols are only imported for relocatable output;
    /// data symbols are never imported.
    pub(crate) fn calculate_imports(&mut self) {
        for id in self.symtab.ids().collect::<Vec<_>>() {
            let sym = self.symtab.get(id);
            if sym.flags.defined {
                continue;
            }
            if sym.flags.weak && !self.config.relocatable {
                continue;
            }
            if !sym.flags.live || !sym.flags.used_in_regular_obj {
                continue;
            }
            if matches!(sym.kind, SymbolKind::Data | SymbolKind::Section) {
                continue;
            }
            debug!(symbol = %sym.name, "import");
            self.imports.add(self.symtab, id);
        }
    }

    /// Number the function/global/event definition spaces: synthetics
    /// first, then per-file entities in file order.
    pub(crate) fn assign_indexes(&mut self) {
        self.imports.seal();

        for &id in self.symtab.synthetic().to_vec().iter() {
            let sym = self.symtab.get(id);
            if sym.kind != SymbolKind::Function || !sym.flags.defined || !sym.flags.live {
                continue;
            }
            let index = self.imports.num_functions + self.functions.len() as u32;
            self.symtab.get_mut(id).out_index = Some(index);
            self.functions.push(FuncId::Synthetic(id));
        }

        for file_idx in 0..self.objects.len() {
            for func_idx in 0..self.objects[file_idx].functions.len() {
                if !self.objects[file_idx].functions[func_idx].live {
                    continue;
                }
                let index = self.imports.num_functions + self.functions.len() as u32;
                self.functions.push(FuncId::Object {
                    file: file_idx,
                    index: func_idx,
                });
                let name = self.objects[file_idx].functions[func_idx].symbol_name.clone();
                self.set_defined_index(&name, index);
            }
        }

        for &id in self.symtab.synthetic().to_vec().iter() {
            let sym = self.symtab.get(id);
            if sym.kind != SymbolKind::Global || !sym.flags.defined || !sym.flags.live {
                continue;
            }
            let index = self.imports.num_globals + self.globals.len() as u32;
            self.symtab.get_mut(id).out_index = Some(index);
            self.globals.push(GlobalId::Synthetic(id));
        }

        for file_idx in 0..self.objects.len() {
            for global_idx in 0..self.objects[file_idx].globals.len() {
                if !self.objects[file_idx].globals[global_idx].live {
                    continue;
                }
                let index = self.imports.num_globals + self.globals.len() as u32;
                self.globals.push(GlobalId::Object {
                    file: file_idx,
                    index: global_idx,
                });
                let name = self.objects[file_idx].globals[global_idx].symbol_name.clone();
                self.set_defined_index(&name, index);
            }
        }

        for file_idx in 0..self.objects.len() {
            for event_idx in 0..self.objects[file_idx].events.len() {
                if !self.objects[file_idx].events[event_idx].live {
                    continue;
                }
                let index = self.imports.num_events + self.events.len() as u32;
                self.events.push(EventId {
                    file: file_idx,
                    index: event_idx,
                });
                let name = self.objects[file_idx].events[event_idx].symbol_name.clone();
                self.set_defined_index(&name, index);
            }
        }
    }

    fn set_defined_index(&mut self, name: &str, index: u32) {
        if let Some(id) = self.symtab.find(name) {
            let sym = self.symtab.get_mut(id);
            if sym.flags.defined {
                sym.out_index = Some(index);
            }
        }
    }

    /// Walk pre-populated relocation lists: table-index relocations
    /// populate the indirect function table, type relocations mark the
    /// file-local types the output must carry.
    pub(crate) fn scan_relocations(&mut self) {
        let Writer {
            objects,
            symtab,
            indirect_functions,
            table_base,
            ..
        } = self;

        for file in objects.iter_mut() {
            let symbols = &file.symbols;
            let type_is_used = &mut file.type_is_used;
            let mut scan = |relocs: &[eoslink_object::Reloc]| {
                for reloc in relocs {
                    use eoslink_wasm::types::RelocKind::*;
                    match reloc.kind {
                        TypeIndexLeb => {
                            if let Some(slot) = type_is_used.get_mut(reloc.index as usize) {
                                *slot = true;
                            }
                        }
                        TableIndexSleb | TableIndexI32 => {
                            let Some(&sym_id) = symbols.get(reloc.index as usize) else {
                                continue;
                            };
                            let sym = symtab.get_mut(sym_id);
                            if sym.table_index.is_none() {
                                sym.table_index =
                                    Some(*table_base + indirect_functions.len() as u32);
                                indirect_functions.push(sym_id);
                            }
                        }
                        _ => {}
                    }
                }
            };
            for func in &file.functions {
                scan(&func.relocs);
            }
            for segment in &file.segments {
                scan(&segment.relocs);
            }
            for section in &file.custom_sections {
                scan(&section.relocs);
            }
        }
    }

    /// The output type section is the union of per-file used types,
    /// import signatures, and defined function/event signatures.
    pub(crate) fn calculate_types(&mut self) {
        for file_idx in 0..self.objects.len() {
            for type_idx in 0..self.objects[file_idx].types.len() {
                if self.objects[file_idx].type_is_used[type_idx] {
                    let sig = self.objects[file_idx].types[type_idx].clone();
                    let out = self.register_type(sig);
                    self.objects[file_idx].type_map[type_idx] = out;
                }
            }
        }

        for entry in self.imports.entries.clone() {
            if matches!(entry.kind, ExternalKind::Function | ExternalKind::Event)
                && let Some(sig) = self.symtab.get(entry.symbol).signature.clone()
            {
                self.register_type(sig);
            }
        }

        for func in self.functions.clone() {
            let sig = self.function_signature(func);
            self.register_type(sig);
        }

        for event in self.events.clone() {
            let sig = self.objects[event.file].events[event.index].ty.signature.clone();
            self.register_type(sig);
        }
    }

    pub(crate) fn register_type(&mut self, signature: Signature) -> u32 {
        self.types.insert_full(signature).0 as u32
    }

    pub(crate) fn function_signature(&self, func: FuncId) -> Signature {
        match func {
            FuncId::Object { file, index } => self.objects[file].functions[index].signature.clone(),
            FuncId::Synthetic(id) => self
                .symtab
                .get(id)
                .signature
                .clone()
                .unwrap_or_default(),
        }
    }

    /// Memory and table exports, then one export per defined, live,
    /// non-local, non-hidden symbol. Data symbols export through fake
    /// globals constant-initialized to their virtual address.
    pub(crate) fn calculate_exports(&mut self) {
        if self.config.relocatable {
            return;
        }

        if !self.config.import_memory {
            self.exports.push(Export {
                name: "memory".to_string(),
                kind: ExternalKind::Memory,
                index: 0,
            });
        }

        if self.config.export_table {
            self.exports.push(Export {
                name: "__indirect_function_table".to_string(),
                kind: ExternalKind::Table,
                index: 0,
            });
        }

        let mut fake_global_index = self.imports.num_globals + self.globals.len() as u32;

        for id in self.symtab.ids().collect::<Vec<_>>() {
            let sym = self.symtab.get(id);
            if !sym.flags.defined || !sym.flags.live || sym.flags.local {
                continue;
            }
            if sym.flags.hidden && !self.config.export_all {
                continue;
            }

            let export = match sym.kind {
                SymbolKind::Function => Export {
                    name: sym.name.clone(),
                    kind: ExternalKind::Function,
                    index: sym.out_index.unwrap_or(0),
                },
                SymbolKind::Global => {
                    // Mutable globals are not exportable; only
                    // __stack_pointer and __tls_base are ever created
                    // mutable.
                    if sym.global_ty.is_some_and(|t| t.mutable) {
                        continue;
                    }
                    Export {
                        name: sym.name.clone(),
                        kind: ExternalKind::Global,
                        index: sym.out_index.unwrap_or(0),
                    }
                }
                SymbolKind::Event => Export {
                    name: sym.name.clone(),
                    kind: ExternalKind::Event,
                    index: sym.out_index.unwrap_or(0),
                },
                SymbolKind::Data => {
                    let export = Export {
                        name: sym.name.clone(),
                        kind: ExternalKind::Global,
                        index: fake_global_index,
                    };
                    fake_global_index += 1;
                    self.fake_globals.push(id);
                    export
                }
                SymbolKind::Section => continue,
            };
            debug!(export = %export.name, "export");
            self.exports.push(export);
        }
    }

    /// Group pass-through custom sections by name; known synthesized
    /// sections and (when stripping) debug sections are dropped.
    pub(crate) fn calculate_custom_sections(&mut self) {
        let strip_debug = self.config.strip_debug || self.config.strip_all;
        for file_idx in 0..self.objects.len() {
            for sec_idx in 0..self.objects[file_idx].custom_sections.len() {
                let name = self.objects[file_idx].custom_sections[sec_idx].name.clone();
                if name == "linking"
                    || name == "name"
                    || name == "producers"
                    || name == "target_features"
                    || name.starts_with("reloc.")
                {
                    continue;
                }
                if strip_debug && name.starts_with(".debug_") {
                    continue;
                }
                self.custom_section_map
                    .entry(name)
                    .or_default()
                    .push((file_idx, sec_idx));
            }
        }
    }

    /// Choose which symbols appear in the `linking` section's symbol
    /// table: global symbols used in regular objects, then per-file
    /// locals.
    pub(crate) fn populate_symtab(&mut self) {
        if !self.config.relocatable && !self.config.emit_relocs {
            return;
        }

        for id in self.symtab.ids().collect::<Vec<_>>() {
            let sym = self.symtab.get(id);
            if sym.flags.used_in_regular_obj && sym.flags.live {
                self.add_symtab_entry(id);
            }
        }

        for file_idx in 0..self.objects.len() {
            for &id in self.objects[file_idx].symbols.clone().iter() {
                let sym = self.symtab.get(id);
                if sym.flags.local && sym.flags.live && sym.kind != SymbolKind::Section {
                    self.add_symtab_entry(id);
                }
            }
        }
    }

    fn add_symtab_entry(&mut self, id: SymbolId) {
        if self.symtab_index.contains_key(&id) {
            return;
        }
        self.symtab_index.insert(id, self.symtab_entries.len() as u32);
        self.symtab_entries.push(id);
    }

    /// Merge producer records across files; first occurrence of a
    /// producer name wins.
    pub(crate) fn populate_producers(&mut self) {
        fn merge(into: &mut IndexMap<String, String>, from: &[(String, String)]) {
            for (name, version) in from {
                into.entry(name.clone()).or_insert_with(|| version.clone());
            }
        }
        for file in self.objects.iter() {
            merge(&mut self.producers_languages, &file.producers.languages);
            merge(&mut self.producers_tools, &file.producers.tools);
            merge(&mut self.producers_sdks, &file.producers.sdks);
        }
    }

    /// Define `__start_<name>`/`__stop_<name>` for C-identifier-named
    /// segments; must run after memory layout.
    pub(crate) fn add_start_stop_symbols(&mut self) {
        let bounds: Vec<(String, u64, u64)> = self
            .segments
            .iter()
            .filter(|seg| is_valid_c_identifier(&seg.name))
            .map(|seg| (seg.name.clone(), seg.start_va, seg.start_va + seg.size))
            .collect();
        for (name, start, stop) in bounds {
            self.symtab
                .add_optional_data_symbol(&format!("__start_{name}"), start);
            self.symtab
                .add_optional_data_symbol(&format!("__stop_{name}"), stop);
        }
    }
}
