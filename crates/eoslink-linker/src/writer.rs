//! The link driver.
//!
//! `link` runs the single-shot pipeline: create segments, negotiate
//! features, compute imports, lay out memory, assign indices, generate
//! synthetic functions and dispatchers, compute types/exports, render
//! sections, and emit the module bytes plus the optional merged ABI.
//! All state is carried in the `Writer` context; nothing is process-wide,
//! so the caller may run several links in one process.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use tracing::debug;

use eoslink_object::{ObjectFile, Symbol, SymbolFlags, SymbolId, SymbolKind, SymbolTable};
use eoslink_wasm::encode::{write_bytes, write_u32_le};
use eoslink_wasm::types::{GlobalType, InitExpr, Signature, ValType, WASM_MAGIC, WASM_VERSION};

use crate::abi;
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::sections::OutputSection;
use crate::segments::OutputSegment;
use crate::spaces::{EventId, Export, FuncId, GlobalId, Imports};
use crate::LinkError;

/// An init function ready to be called from `__wasm_call_ctors`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct InitEntry {
    pub symbol: SymbolId,
    pub priority: u32,
}

/// The finished link product: module bytes and the merged ABI text, if
/// any input contributed one.
#[derive(Debug)]
pub struct LinkedModule {
    pub bytes: Vec<u8>,
    pub abi: Option<String>,
}

pub(crate) struct Writer<'a> {
    pub(crate) config: Config,
    pub(crate) objects: &'a mut [ObjectFile],
    pub(crate) symtab: &'a mut SymbolTable,
    pub(crate) diagnostics: &'a mut Diagnostics,

    entry_undefined: bool,
    sync_call_undefined: bool,
    has_sync_calls: bool,

    pub(crate) table_base: u32,
    pub(crate) file_size: u64,
    pub(crate) abis: Vec<String>,
    pub(crate) init_functions: Vec<InitEntry>,

    pub(crate) segments: Vec<OutputSegment>,
    pub(crate) segment_map: IndexMap<String, usize>,
    pub(crate) custom_section_map: IndexMap<String, Vec<(usize, usize)>>,

    pub(crate) types: IndexSet<Signature>,
    pub(crate) imports: Imports,
    pub(crate) functions: Vec<FuncId>,
    pub(crate) globals: Vec<GlobalId>,
    pub(crate) fake_globals: Vec<SymbolId>,
    pub(crate) events: Vec<EventId>,
    pub(crate) exports: Vec<Export>,
    pub(crate) indirect_functions: Vec<SymbolId>,
    pub(crate) symtab_entries: Vec<SymbolId>,
    pub(crate) symtab_index: HashMap<SymbolId, u32>,

    pub(crate) out_features: IndexSet<String>,
    pub(crate) producers_languages: IndexMap<String, String>,
    pub(crate) producers_tools: IndexMap<String, String>,
    pub(crate) producers_sdks: IndexMap<String, String>,

    pub(crate) mem_pages: u64,
    pub(crate) max_mem_pages: Option<u64>,
    pub(crate) dylink_mem_size: u64,
    pub(crate) dylink_mem_align: u32,

    pub(crate) sections: Vec<OutputSection>,
}

/// Run a link over already-parsed objects and a resolved symbol table.
pub fn link(
    config: &Config,
    objects: &mut [ObjectFile],
    symtab: &mut SymbolTable,
    diagnostics: &mut Diagnostics,
) -> Result<LinkedModule, LinkError> {
    Writer::new(config, objects, symtab, diagnostics).run()
}

impl<'a> Writer<'a> {
    pub(crate) fn new(
        config: &Config,
        objects: &'a mut [ObjectFile],
        symtab: &'a mut SymbolTable,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        let mut config = config.clone();
        if config.relocatable || config.is_pic {
            config.global_base = 0;
        }

        let (entry_undefined, sync_call_undefined, has_sync_calls) =
            create_synthetic_symbols(&config, objects, symtab);

        Writer {
            // For PIC the table base is assigned by the loader; otherwise
            // start at 1 so that accessing table index 0 always traps.
            table_base: if config.is_pic { 0 } else { 1 },
            config,
            objects,
            symtab,
            diagnostics,
            entry_undefined,
            sync_call_undefined,
            has_sync_calls,
            file_size: 0,
            abis: Vec::new(),
            init_functions: Vec::new(),
            segments: Vec::new(),
            segment_map: IndexMap::new(),
            custom_section_map: IndexMap::new(),
            types: IndexSet::new(),
            imports: Imports::default(),
            functions: Vec::new(),
            globals: Vec::new(),
            fake_globals: Vec::new(),
            events: Vec::new(),
            exports: Vec::new(),
            indirect_functions: Vec::new(),
            symtab_entries: Vec::new(),
            symtab_index: HashMap::new(),
            out_features: IndexSet::new(),
            producers_languages: IndexMap::new(),
            producers_tools: IndexMap::new(),
            producers_sdks: IndexMap::new(),
            mem_pages: 0,
            max_mem_pages: None,
            dylink_mem_size: 0,
            dylink_mem_align: 0,
            sections: Vec::new(),
        }
    }
}

/// Symbols the linker itself defines ahead of index assignment. Synthetic
/// function bodies are installed later, once indices exist to embed.
fn create_synthetic_symbols(
    config: &Config,
    objects: &[ObjectFile],
    symtab: &mut SymbolTable,
) -> (bool, bool, bool) {
    let undefined = |symtab: &SymbolTable, name: &str| {
        symtab
            .find(name)
            .is_none_or(|id| !symtab.get(id).flags.defined)
    };
    let entry_undefined = undefined(symtab, "apply");
    let sync_call_undefined = undefined(symtab, "sync_call");
    let has_sync_calls = objects.iter().any(|file| !file.eosio_calls.is_empty());
    let has_init_functions = objects
        .iter()
        .any(|file| !file.linking.init_functions.is_empty());

    let mutable_i32 = GlobalType {
        val_type: ValType::I32,
        mutable: true,
    };

    let hide = |symtab: &mut SymbolTable, id: SymbolId| {
        symtab.get_mut(id).flags.hidden = true;
    };

    if !config.relocatable {
        let id = symtab.add_synthetic_global("__stack_pointer", mutable_i32, InitExpr::I32Const(0));
        hide(symtab, id);

        if symtab.find("__wasm_call_ctors").is_some() || has_init_functions {
            let id = symtab.add_synthetic_function("__wasm_call_ctors", Signature::default());
            hide(symtab, id);
        }
        if config.passive_segments {
            let id = symtab.add_synthetic_function("__wasm_init_memory", Signature::default());
            hide(symtab, id);
        }
        if config.is_pic {
            let id = symtab.add_synthetic_function("__wasm_apply_relocs", Signature::default());
            hide(symtab, id);
        }
        if config.shared_memory && !config.shared {
            let id = symtab.add_synthetic_function(
                "__wasm_init_tls",
                Signature::new(vec![ValType::I32], vec![]),
            );
            hide(symtab, id);
        }
    }

    if config.shared_memory {
        let id = symtab.add_synthetic_global("__tls_base", mutable_i32, InitExpr::I32Const(0));
        hide(symtab, id);
        let id = symtab.add_synthetic_global(
            "__tls_size",
            GlobalType {
                val_type: ValType::I32,
                mutable: false,
            },
            InitExpr::I32Const(0),
        );
        hide(symtab, id);
    }

    if config.stack_canary {
        let id = symtab.add_synthetic_global(
            "__stack_canary",
            GlobalType {
                val_type: ValType::I64,
                mutable: true,
            },
            InitExpr::I64Const(0),
        );
        hide(symtab, id);
        // the canary slot is addressed relative to __data_end
        if symtab.find("__data_end").is_none() {
            symtab.insert(Symbol::new(
                "__data_end",
                SymbolKind::Data,
                SymbolFlags {
                    live: true,
                    used_in_regular_obj: true,
                    ..SymbolFlags::default()
                },
            ));
        }
    }

    if !config.other_model && entry_undefined {
        symtab.add_synthetic_function(
            "apply",
            Signature::new(vec![ValType::I64, ValType::I64, ValType::I64], vec![]),
        );
    }
    if has_sync_calls && sync_call_undefined {
        symtab.add_synthetic_function(
            "sync_call",
            Signature::new(
                vec![ValType::I64, ValType::I64, ValType::I32],
                vec![ValType::I64],
            ),
        );
    }

    for name in ["__dso_handle", "__data_end", "__heap_base", "__global_base"] {
        symtab.add_optional_data_symbol(name, 0);
    }

    (entry_undefined, sync_call_undefined, has_sync_calls)
}

impl Writer<'_> {
    fn run(mut self) -> Result<LinkedModule, LinkError> {
        debug!("-- createOutputSegments");
        self.create_output_segments();
        debug!("-- populateProducers");
        self.populate_producers();
        debug!("-- populateTargetFeatures");
        self.populate_target_features();
        debug!("-- calculateImports");
        self.calculate_imports();
        debug!("-- layoutMemory");
        self.layout_memory();

        if !self.config.relocatable {
            // __start_SECNAME/__stop_SECNAME need final addresses.
            self.add_start_stop_symbols();
        }

        debug!("-- scanRelocations");
        self.scan_relocations();
        debug!("-- assignIndexes");
        self.assign_indexes();
        debug!("-- calculateInitFunctions");
        self.calculate_init_functions();

        if !self.config.relocatable {
            if self.config.passive_segments {
                self.create_init_memory_function()?;
            }
            if self.config.is_pic {
                self.create_apply_relocs_function()?;
            }
            self.create_call_ctors_function()?;
        }

        if !self.config.relocatable && self.config.shared_memory && !self.config.shared {
            self.create_init_tls_function()?;
        }

        if !self.config.other_model && self.entry_undefined {
            self.create_dispatch_function()?;
        }

        if self.has_sync_calls && self.sync_call_undefined {
            self.create_call_dispatch_function()?;
        }

        self.check_gate()?;

        debug!("-- calculateTypes");
        self.calculate_types();
        debug!("-- calculateExports");
        self.calculate_exports();
        debug!("-- calculateCustomSections");
        self.calculate_custom_sections();
        debug!("-- populateSymtab");
        self.populate_symtab();
        debug!("-- addSections");
        self.add_sections();

        debug!(
            functions = self.functions.len(),
            globals = self.globals.len(),
            events = self.events.len(),
            function_imports = self.imports.num_functions,
            global_imports = self.imports.num_globals,
            event_imports = self.imports.num_events,
            "defined entities"
        );

        self.file_size = (WASM_MAGIC.len() + 4) as u64;
        debug!("-- finalizeSections");
        self.finalize_sections();

        self.check_gate()?;

        debug!(size = self.file_size, "-- writeSections");
        let mut bytes = vec![0u8; self.file_size as usize];
        self.write_header(&mut bytes);
        self.write_sections(&mut bytes);

        self.check_gate()?;

        let abi = self.write_abi();
        Ok(LinkedModule { bytes, abi })
    }

    fn check_gate(&self) -> Result<(), LinkError> {
        match self.diagnostics.error_count() {
            0 => Ok(()),
            n => Err(LinkError::HadErrors(n)),
        }
    }

    fn write_header(&self, buf: &mut [u8]) {
        let mut header = Vec::with_capacity(8);
        write_bytes(&mut header, &WASM_MAGIC);
        write_u32_le(&mut header, WASM_VERSION);
        buf[..header.len()].copy_from_slice(&header);
    }

    /// Copy every finalized section to its offset. Sections occupy
    /// disjoint ranges by construction, so the copies run in parallel.
    fn write_sections(&self, buf: &mut [u8]) {
        let mut slices: Vec<&mut [u8]> = Vec::with_capacity(self.sections.len());
        let mut rest = &mut buf[8..];
        let mut cursor = 8u64;
        for sec in &self.sections {
            debug_assert_eq!(sec.offset, cursor, "section offsets must be contiguous");
            let (dst, tail) = std::mem::take(&mut rest).split_at_mut(sec.bytes.len());
            slices.push(dst);
            rest = tail;
            cursor += sec.bytes.len() as u64;
        }
        slices
            .into_par_iter()
            .zip(self.sections.par_iter())
            .for_each(|(dst, sec)| dst.copy_from_slice(&sec.bytes));
    }

    /// Fold the collected ABI blobs into one document. Failures are
    /// logged and the module output proceeds without a companion file.
    fn write_abi(&mut self) -> Option<String> {
        if self.abis.is_empty() {
            return None;
        }
        match abi::merge_abis(&self.abis) {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::warn!(error = %err, "failed to write ABI");
                self.diagnostics.warn(format!("failed to write ABI: {err}"));
                None
            }
        }
    }

    pub(crate) fn function_index(&self, name: &str) -> Result<u32, LinkError> {
        self.symtab
            .find(name)
            .and_then(|id| self.symtab.get(id).out_index)
            .ok_or_else(|| LinkError::SymbolNotFound(name.to_string()))
    }

    pub(crate) fn opt_function_index(&self, name: &str) -> Option<u32> {
        self.symtab
            .find(name)
            .and_then(|id| self.symtab.get(id).out_index)
    }

    pub(crate) fn global_index(&self, name: &str) -> Result<u32, LinkError> {
        self.symtab
            .find(name)
            .and_then(|id| self.symtab.get(id).out_index)
            .ok_or_else(|| LinkError::SymbolNotFound(name.to_string()))
    }
}

/// Write the linked module (and its `.abi` companion, when present) to
/// the configured output path. The module file is marked executable, as
/// toolchains expect of linker output.
pub fn write_output(module: &LinkedModule, config: &Config) -> Result<(), LinkError> {
    debug!(path = %config.output_file.display(), "writing");
    std::fs::write(&config.output_file, &module.bytes).map_err(|source| LinkError::OpenOutput {
        path: config.output_file.display().to_string(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        std::fs::set_permissions(&config.output_file, perms).map_err(LinkError::WriteOutput)?;
    }

    if let Some(abi) = &module.abi {
        let abi_path = config.output_file.with_extension("abi");
        std::fs::write(&abi_path, abi).map_err(LinkError::WriteOutput)?;
    }
    Ok(())
}
