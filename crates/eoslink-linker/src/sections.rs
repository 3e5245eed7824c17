//! Output sections: ordering, framing, and payload rendering.
//!
//! Sections are added in the fixed module order, then finalized front to
//! back: each gets its file offset and renders its payload once. The
//! rendered bytes are copied into the output buffer in parallel at write
//! time, so rendering must leave no work behind.

use eoslink_wasm::encode::{write_name, write_u8, write_uleb128, write_sleb128};
use eoslink_wasm::types::{
    feature, linking, op, ExternalKind, InitExpr, RelocKind, SectionId, ValType,
    LIMITS_HAS_MAX, LIMITS_IS_SHARED,
};
use eoslink_object::{SymbolId, SymbolKind};
use tracing::debug;

use crate::spaces::{FuncId, GlobalId};
use crate::writer::Writer;

/// Which of the output sections this is. Pass-through custom sections
/// carry their name; relocation sections carry the index of the section
/// they describe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SectionKind {
    Dylink,
    Type,
    Import,
    Function,
    Table,
    Memory,
    Global,
    Event,
    Export,
    Elem,
    DataCount,
    Code,
    Data,
    Custom(String),
    Linking,
    Reloc { target: usize },
    Name,
    Producers,
    TargetFeatures,
}

impl SectionKind {
    /// The custom-section name, for kinds framed as custom sections.
    fn custom_name(&self) -> Option<String> {
        match self {
            SectionKind::Dylink => Some("dylink".to_string()),
            SectionKind::Custom(name) => Some(name.clone()),
            SectionKind::Linking => Some("linking".to_string()),
            SectionKind::Name => Some("name".to_string()),
            SectionKind::Producers => Some("producers".to_string()),
            SectionKind::TargetFeatures => Some("target_features".to_string()),
            // reloc section names are resolved against the target
            SectionKind::Reloc { .. } => None,
            _ => None,
        }
    }

    fn id(&self) -> SectionId {
        match self {
            SectionKind::Type => SectionId::Type,
            SectionKind::Import => SectionId::Import,
            SectionKind::Function => SectionId::Function,
            SectionKind::Table => SectionId::Table,
            SectionKind::Memory => SectionId::Memory,
            SectionKind::Global => SectionId::Global,
            SectionKind::Event => SectionId::Event,
            SectionKind::Export => SectionId::Export,
            SectionKind::Elem => SectionId::Elem,
            SectionKind::DataCount => SectionId::DataCount,
            SectionKind::Code => SectionId::Code,
            SectionKind::Data => SectionId::Data,
            _ => SectionId::Custom,
        }
    }
}

/// One finalized output section: kind, file offset, framed bytes.
#[derive(Debug)]
pub(crate) struct OutputSection {
    pub kind: SectionKind,
    pub offset: u64,
    pub bytes: Vec<u8>,
}

impl Writer<'_> {
    fn add_section(&mut self, kind: SectionKind, needed: bool) {
        if !needed {
            return;
        }
        debug!(section = ?kind, "add section");
        self.sections.push(OutputSection {
            kind,
            offset: 0,
            bytes: Vec::new(),
        });
    }

    /// Append every needed section in the fixed output order.
    pub(crate) fn add_sections(&mut self) {
        let num_globals =
            self.globals.len() + self.fake_globals.len() + self.imports.num_globals as usize;

        self.add_section(SectionKind::Dylink, self.config.is_pic);
        self.add_section(SectionKind::Type, !self.types.is_empty());
        self.add_section(
            SectionKind::Import,
            !self.imports.entries.is_empty() || self.config.import_memory,
        );
        self.add_section(SectionKind::Function, !self.functions.is_empty());
        self.add_section(
            SectionKind::Table,
            !self.config.relocatable || !self.indirect_functions.is_empty(),
        );
        self.add_section(
            SectionKind::Memory,
            !self.config.relocatable && !self.config.import_memory,
        );
        self.add_section(SectionKind::Global, num_globals > 0);
        self.add_section(SectionKind::Event, !self.events.is_empty());
        self.add_section(SectionKind::Export, !self.exports.is_empty());
        self.add_section(SectionKind::Elem, !self.indirect_functions.is_empty());
        self.add_section(
            SectionKind::DataCount,
            self.config.passive_segments && !self.segments.is_empty(),
        );
        self.add_section(SectionKind::Code, !self.functions.is_empty());
        self.add_section(SectionKind::Data, !self.segments.is_empty());

        for name in self.custom_section_map.keys().cloned().collect::<Vec<_>>() {
            self.add_section(SectionKind::Custom(name), true);
        }

        self.add_section(
            SectionKind::Linking,
            self.config.relocatable || self.config.emit_relocs,
        );
        if self.config.relocatable || self.config.emit_relocs {
            self.create_reloc_sections();
        }

        let have_names = !self.functions.is_empty() || self.imports.num_functions > 0;
        self.add_section(SectionKind::Name, !self.config.strip_all && have_names);
        let have_producers = !self.producers_languages.is_empty()
            || !self.producers_tools.is_empty()
            || !self.producers_sdks.is_empty();
        self.add_section(
            SectionKind::Producers,
            !self.config.strip_all && have_producers,
        );
        self.add_section(SectionKind::TargetFeatures, !self.out_features.is_empty());
    }

    /// One relocation section per code/data/custom section that carries
    /// relocations.
    fn create_reloc_sections(&mut self) {
        let orig_len = self.sections.len();
        for target in 0..orig_len {
            let count = match &self.sections[target].kind {
                SectionKind::Code => self.code_reloc_count(),
                SectionKind::Data => self.data_reloc_count(),
                SectionKind::Custom(name) => self.custom_reloc_count(&name.clone()),
                _ => 0,
            };
            if count > 0 {
                self.add_section(SectionKind::Reloc { target }, true);
            }
        }
    }

    fn code_reloc_count(&self) -> usize {
        self.functions
            .iter()
            .map(|func| match func {
                FuncId::Object { file, index } => {
                    self.objects[*file].functions[*index].relocs.len()
                }
                FuncId::Synthetic(_) => 0,
            })
            .sum()
    }

    fn data_reloc_count(&self) -> usize {
        self.segments
            .iter()
            .flat_map(|seg| &seg.chunks)
            .map(|&(file, index)| self.objects[file].segments[index].relocs.len())
            .sum()
    }

    fn custom_reloc_count(&self, name: &str) -> usize {
        self.custom_section_map
            .get(name)
            .map(|chunks| {
                chunks
                    .iter()
                    .map(|&(file, index)| self.objects[file].custom_sections[index].relocs.len())
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Walk sections in order, assigning file offsets and rendering the
    /// final bytes of each.
    pub(crate) fn finalize_sections(&mut self) {
        for i in 0..self.sections.len() {
            let kind = self.sections[i].kind.clone();
            let payload = self.render_payload(&kind);
            let bytes = self.frame_section(&kind, payload);
            let offset = self.file_size;
            self.file_size += bytes.len() as u64;
            let sec = &mut self.sections[i];
            sec.offset = offset;
            sec.bytes = bytes;
        }
    }

    /// Wrap a payload with the section id, size, and (for custom
    /// sections) the LEB-prefixed name.
    fn frame_section(&self, kind: &SectionKind, payload: Vec<u8>) -> Vec<u8> {
        let mut named = Vec::new();
        let name = match kind {
            SectionKind::Reloc { target } => Some(self.reloc_section_name(*target)),
            _ => kind.custom_name(),
        };
        if let Some(name) = name {
            write_name(&mut named, &name);
        }
        named.extend_from_slice(&payload);

        let mut out = Vec::with_capacity(named.len() + 6);
        write_u8(&mut out, kind.id() as u8);
        write_uleb128(&mut out, named.len() as u64);
        out.extend_from_slice(&named);
        out
    }

    fn reloc_section_name(&self, target: usize) -> String {
        match &self.sections[target].kind {
            SectionKind::Code => "reloc.CODE".to_string(),
            SectionKind::Data => "reloc.DATA".to_string(),
            SectionKind::Custom(name) => format!("reloc.{name}"),
            other => unreachable!("relocations not supported for {other:?}"),
        }
    }

    fn render_payload(&mut self, kind: &SectionKind) -> Vec<u8> {
        match kind {
            SectionKind::Dylink => self.render_dylink(),
            SectionKind::Type => self.render_type(),
            SectionKind::Import => self.render_import(),
            SectionKind::Function => self.render_function(),
            SectionKind::Table => self.render_table(),
            SectionKind::Memory => self.render_memory(),
            SectionKind::Global => self.render_global(),
            SectionKind::Event => self.render_event(),
            SectionKind::Export => self.render_export(),
            SectionKind::Elem => self.render_elem(),
            SectionKind::DataCount => self.render_data_count(),
            SectionKind::Code => self.render_code(),
            SectionKind::Data => self.render_data(),
            SectionKind::Custom(name) => self.render_custom(&name.clone()),
            SectionKind::Linking => self.render_linking(),
            SectionKind::Reloc { target } => self.render_reloc(*target),
            SectionKind::Name => self.render_name(),
            SectionKind::Producers => self.render_producers(),
            SectionKind::TargetFeatures => self.render_target_features(),
        }
    }

    fn render_dylink(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, self.dylink_mem_size);
        write_uleb128(&mut buf, self.dylink_mem_align as u64);
        write_uleb128(&mut buf, self.indirect_functions.len() as u64);
        write_uleb128(&mut buf, 0); // table alignment
        write_uleb128(&mut buf, 0); // needed dynamic libraries
        buf
    }

    fn render_type(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, self.types.len() as u64);
        for sig in &self.types {
            write_u8(&mut buf, 0x60); // func type
            write_uleb128(&mut buf, sig.params.len() as u64);
            for p in &sig.params {
                write_u8(&mut buf, *p as u8);
            }
            write_uleb128(&mut buf, sig.results.len() as u64);
            for r in &sig.results {
                write_u8(&mut buf, *r as u8);
            }
        }
        buf
    }

    fn type_index_of(&self, sig: &eoslink_wasm::types::Signature) -> u32 {
        self.types
            .get_index_of(sig)
            .expect("signature registered during calculateTypes") as u32
    }

    fn render_import(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let count = self.imports.entries.len() + usize::from(self.config.import_memory);
        write_uleb128(&mut buf, count as u64);

        if self.config.import_memory {
            write_name(&mut buf, "env");
            write_name(&mut buf, "memory");
            write_u8(&mut buf, ExternalKind::Memory as u8);
            self.write_memory_limits(&mut buf);
        }

        for entry in &self.imports.entries {
            let sym = self.symtab.get(entry.symbol);
            write_name(&mut buf, "env");
            write_name(&mut buf, &sym.name);
            write_u8(&mut buf, entry.kind as u8);
            match entry.kind {
                ExternalKind::Function => {
                    let sig = sym.signature.clone().unwrap_or_default();
                    write_uleb128(&mut buf, self.type_index_of(&sig) as u64);
                }
                ExternalKind::Global => {
                    let ty = sym.global_ty.unwrap_or(eoslink_wasm::types::GlobalType {
                        val_type: ValType::I32,
                        mutable: false,
                    });
                    write_u8(&mut buf, ty.val_type as u8);
                    write_u8(&mut buf, ty.mutable as u8);
                }
                ExternalKind::Event => {
                    let sig = sym.signature.clone().unwrap_or_default();
                    write_uleb128(&mut buf, 0); // attribute
                    write_uleb128(&mut buf, self.type_index_of(&sig) as u64);
                }
                ExternalKind::Memory | ExternalKind::Table => unreachable!(),
            }
        }
        buf
    }

    fn render_function(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, self.functions.len() as u64);
        for &func in &self.functions {
            let sig = self.function_signature(func);
            write_uleb128(&mut buf, self.type_index_of(&sig) as u64);
        }
        buf
    }

    fn render_table(&self) -> Vec<u8> {
        let size = self.table_base as u64 + self.indirect_functions.len() as u64;
        let mut buf = Vec::new();
        write_uleb128(&mut buf, 1);
        write_u8(&mut buf, ValType::Funcref as u8);
        write_u8(&mut buf, LIMITS_HAS_MAX);
        write_uleb128(&mut buf, size);
        write_uleb128(&mut buf, size);
        buf
    }

    fn write_memory_limits(&self, buf: &mut Vec<u8>) {
        let mut flags = 0u8;
        if self.max_mem_pages.is_some() {
            flags |= LIMITS_HAS_MAX;
        }
        if self.config.shared_memory {
            flags |= LIMITS_IS_SHARED;
        }
        write_u8(buf, flags);
        write_uleb128(buf, self.mem_pages);
        if let Some(max) = self.max_mem_pages {
            write_uleb128(buf, max);
        }
    }

    fn render_memory(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, 1);
        self.write_memory_limits(&mut buf);
        buf
    }

    fn write_init_expr(buf: &mut Vec<u8>, init: InitExpr) {
        match init {
            InitExpr::I32Const(v) => {
                write_u8(buf, op::I32_CONST);
                write_sleb128(buf, v as i64);
            }
            InitExpr::I64Const(v) => {
                write_u8(buf, op::I64_CONST);
                write_sleb128(buf, v);
            }
            InitExpr::GlobalGet(index) => {
                write_u8(buf, op::GLOBAL_GET);
                write_uleb128(buf, index as u64);
            }
        }
        write_u8(buf, op::END);
    }

    fn render_global(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(
            &mut buf,
            (self.globals.len() + self.fake_globals.len()) as u64,
        );
        for &global in &self.globals {
            let (ty, init) = match global {
                GlobalId::Object { file, index } => {
                    let g = &self.objects[file].globals[index];
                    (g.ty, g.init)
                }
                GlobalId::Synthetic(id) => {
                    let sym = self.symtab.get(id);
                    (
                        sym.global_ty.expect("synthetic global has a type"),
                        sym.init.unwrap_or(InitExpr::I32Const(0)),
                    )
                }
            };
            write_u8(&mut buf, ty.val_type as u8);
            write_u8(&mut buf, ty.mutable as u8);
            Self::write_init_expr(&mut buf, init);
        }
        // fake globals expose data-symbol addresses
        for &id in &self.fake_globals {
            let va = self.symtab.get(id).virtual_address.unwrap_or(0);
            write_u8(&mut buf, ValType::I32 as u8);
            write_u8(&mut buf, 0);
            Self::write_init_expr(&mut buf, InitExpr::I32Const(va as i32));
        }
        buf
    }

    fn render_event(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, self.events.len() as u64);
        for event in &self.events {
            let ev = &self.objects[event.file].events[event.index];
            write_uleb128(&mut buf, ev.ty.attribute as u64);
            write_uleb128(&mut buf, self.type_index_of(&ev.ty.signature) as u64);
        }
        buf
    }

    fn render_export(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, self.exports.len() as u64);
        for export in &self.exports {
            write_name(&mut buf, &export.name);
            write_u8(&mut buf, export.kind as u8);
            write_uleb128(&mut buf, export.index as u64);
        }
        buf
    }

    fn render_elem(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, 1); // one active segment
        write_uleb128(&mut buf, 0); // table index
        Self::write_init_expr(&mut buf, InitExpr::I32Const(self.table_base as i32));
        write_uleb128(&mut buf, self.indirect_functions.len() as u64);
        for &id in &self.indirect_functions {
            write_uleb128(&mut buf, self.symtab.get(id).out_index.unwrap_or(0) as u64);
        }
        buf
    }

    fn render_data_count(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, self.segments.len() as u64);
        buf
    }

    fn render_code(&mut self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, self.functions.len() as u64);
        for func in self.functions.clone() {
            match func {
                FuncId::Object { file, index } => {
                    let len = self.objects[file].functions[index].body.len();
                    write_uleb128(&mut buf, len as u64);
                    self.objects[file].functions[index].output_offset = buf.len() as u64;
                    let body = &self.objects[file].functions[index].body;
                    buf.extend_from_slice(body);
                }
                FuncId::Synthetic(id) => {
                    let body = self
                        .symtab
                        .get(id)
                        .body
                        .clone()
                        .expect("synthetic function body installed");
                    buf.extend_from_slice(&body);
                }
            }
        }
        buf
    }

    fn render_data(&mut self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, self.segments.len() as u64);
        for seg_idx in 0..self.segments.len() {
            let (passive, start_va, size, chunks) = {
                let seg = &self.segments[seg_idx];
                (seg.is_passive(), seg.start_va, seg.size, seg.chunks.clone())
            };
            write_uleb128(&mut buf, u64::from(passive));
            if !passive {
                Self::write_init_expr(&mut buf, InitExpr::I32Const(start_va as i32));
            }
            write_uleb128(&mut buf, size);
            let contents_start = buf.len() as u64;
            self.segments[seg_idx].payload_offset = contents_start;
            buf.resize(buf.len() + size as usize, 0);
            for (file, index) in chunks {
                let chunk = &self.objects[file].segments[index];
                let at = (contents_start + chunk.output_offset) as usize;
                buf[at..at + chunk.data.len()].copy_from_slice(&chunk.data);
            }
        }
        buf
    }

    fn render_custom(&mut self, name: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        let chunks = self.custom_section_map.get(name).cloned().unwrap_or_default();
        for (file, index) in chunks {
            self.objects[file].custom_sections[index].output_offset = buf.len() as u64;
            let payload = &self.objects[file].custom_sections[index].payload;
            buf.extend_from_slice(payload);
        }
        buf
    }

    fn render_linking(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, linking::VERSION as u64);

        // symbol table subsection
        let mut symtab = Vec::new();
        write_uleb128(&mut symtab, self.symtab_entries.len() as u64);
        for &id in &self.symtab_entries {
            self.write_symtab_entry(&mut symtab, id);
        }
        Self::write_subsection(&mut buf, linking::SYMBOL_TABLE, &symtab);

        // segment info subsection
        if !self.segments.is_empty() {
            let mut info = Vec::new();
            write_uleb128(&mut info, self.segments.len() as u64);
            for seg in &self.segments {
                write_name(&mut info, &seg.name);
                write_uleb128(&mut info, seg.alignment as u64);
                write_uleb128(&mut info, seg.init_flags as u64);
            }
            Self::write_subsection(&mut buf, linking::SEGMENT_INFO, &info);
        }

        // init functions subsection
        if !self.init_functions.is_empty() {
            let mut inits = Vec::new();
            write_uleb128(&mut inits, self.init_functions.len() as u64);
            for entry in &self.init_functions {
                write_uleb128(&mut inits, entry.priority as u64);
                let index = self.symtab_index.get(&entry.symbol).copied().unwrap_or(0);
                write_uleb128(&mut inits, index as u64);
            }
            Self::write_subsection(&mut buf, linking::INIT_FUNCS, &inits);
        }

        buf
    }

    fn write_subsection(buf: &mut Vec<u8>, code: u8, payload: &[u8]) {
        write_u8(buf, code);
        write_uleb128(buf, payload.len() as u64);
        buf.extend_from_slice(payload);
    }

    fn write_symtab_entry(&self, buf: &mut Vec<u8>, id: SymbolId) {
        let sym = self.symtab.get(id);
        let kind = match sym.kind {
            SymbolKind::Function => linking::SYMTAB_FUNCTION,
            SymbolKind::Data => linking::SYMTAB_DATA,
            SymbolKind::Global => linking::SYMTAB_GLOBAL,
            SymbolKind::Section => linking::SYMTAB_SECTION,
            SymbolKind::Event => linking::SYMTAB_EVENT,
        };
        let mut flags = 0u32;
        if sym.flags.weak {
            flags |= linking::SYM_BINDING_WEAK;
        }
        if sym.flags.local {
            flags |= linking::SYM_BINDING_LOCAL;
        }
        if sym.flags.hidden {
            flags |= linking::SYM_VISIBILITY_HIDDEN;
        }
        if !sym.flags.defined {
            flags |= linking::SYM_UNDEFINED;
        }
        write_u8(buf, kind);
        write_uleb128(buf, flags as u64);
        match sym.kind {
            SymbolKind::Function | SymbolKind::Global | SymbolKind::Event => {
                write_uleb128(buf, sym.out_index.unwrap_or(0) as u64);
                if sym.flags.defined {
                    write_name(buf, &sym.name);
                }
            }
            SymbolKind::Data => {
                write_name(buf, &sym.name);
                if sym.flags.defined {
                    let (segment, offset, size) = self.data_symbol_location(id);
                    write_uleb128(buf, segment as u64);
                    write_uleb128(buf, offset);
                    write_uleb128(buf, size);
                }
            }
            SymbolKind::Section => {
                write_uleb128(buf, 0);
            }
        }
    }

    /// (output segment, offset within it, size) for a defined data
    /// symbol; zeros for absolute symbols like `__heap_base`.
    fn data_symbol_location(&self, id: SymbolId) -> (u32, u64, u64) {
        let sym = self.symtab.get(id);
        let (Some(chunk), Some(placement)) = (sym.chunk, sym.placement) else {
            return (0, 0, 0);
        };
        let Some(in_seg) = self
            .objects
            .get(chunk.file as usize)
            .and_then(|f| f.segments.get(placement.segment as usize))
        else {
            return (0, 0, 0);
        };
        let Some(out_seg) = in_seg.output_segment else {
            return (0, 0, 0);
        };
        (
            out_seg,
            in_seg.output_offset + placement.offset,
            placement.size,
        )
    }

    fn render_reloc(&self, target: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, target as u64);

        let mut entries: Vec<(RelocKind, u64, u32, i64)> = Vec::new();
        match &self.sections[target].kind {
            SectionKind::Code => {
                for &func in &self.functions {
                    if let FuncId::Object { file, index } = func {
                        let f = &self.objects[file].functions[index];
                        for reloc in &f.relocs {
                            entries.push((
                                reloc.kind,
                                f.output_offset + reloc.offset as u64,
                                self.reloc_target_index(file, reloc),
                                reloc.addend,
                            ));
                        }
                    }
                }
            }
            SectionKind::Data => {
                for seg in &self.segments {
                    for &(file, index) in &seg.chunks {
                        let chunk = &self.objects[file].segments[index];
                        for reloc in &chunk.relocs {
                            entries.push((
                                reloc.kind,
                                seg.payload_offset + chunk.output_offset + reloc.offset as u64,
                                self.reloc_target_index(file, reloc),
                                reloc.addend,
                            ));
                        }
                    }
                }
            }
            SectionKind::Custom(name) => {
                if let Some(chunks) = self.custom_section_map.get(name) {
                    for &(file, index) in chunks {
                        let chunk = &self.objects[file].custom_sections[index];
                        for reloc in &chunk.relocs {
                            entries.push((
                                reloc.kind,
                                chunk.output_offset + reloc.offset as u64,
                                self.reloc_target_index(file, reloc),
                                reloc.addend,
                            ));
                        }
                    }
                }
            }
            other => unreachable!("relocations not supported for {other:?}"),
        }

        write_uleb128(&mut buf, entries.len() as u64);
        for (kind, offset, index, addend) in entries {
            write_u8(&mut buf, kind as u8);
            write_uleb128(&mut buf, offset);
            write_uleb128(&mut buf, index as u64);
            if kind.has_addend() {
                write_sleb128(&mut buf, addend);
            }
        }
        buf
    }

    /// Output index field for one serialized relocation: the output type
    /// index for type relocations, the linking-section symbol index
    /// otherwise.
    fn reloc_target_index(&self, file: usize, reloc: &eoslink_object::Reloc) -> u32 {
        match reloc.kind {
            RelocKind::TypeIndexLeb => self.objects[file]
                .type_map
                .get(reloc.index as usize)
                .copied()
                .unwrap_or(0),
            _ => self.objects[file]
                .symbols
                .get(reloc.index as usize)
                .and_then(|id| self.symtab_index.get(id))
                .copied()
                .unwrap_or(0),
        }
    }

    fn render_name(&self) -> Vec<u8> {
        let mut names: Vec<(u32, String)> = Vec::new();
        for entry in &self.imports.entries {
            if entry.kind == ExternalKind::Function {
                let sym = self.symtab.get(entry.symbol);
                names.push((sym.out_index.unwrap_or(0), sym.name.clone()));
            }
        }
        for (i, &func) in self.functions.iter().enumerate() {
            let index = self.imports.num_functions + i as u32;
            let name = match func {
                FuncId::Object { file, index } => {
                    self.objects[file].functions[index].symbol_name.clone()
                }
                FuncId::Synthetic(id) => self.symtab.get(id).name.clone(),
            };
            names.push((index, name));
        }

        let mut payload = Vec::new();
        write_uleb128(&mut payload, names.len() as u64);
        for (index, name) in &names {
            write_uleb128(&mut payload, *index as u64);
            write_name(&mut payload, name);
        }

        let mut buf = Vec::new();
        write_u8(&mut buf, 1); // function-names subsection
        write_uleb128(&mut buf, payload.len() as u64);
        buf.extend_from_slice(&payload);
        buf
    }

    fn render_producers(&self) -> Vec<u8> {
        let fields = [
            ("language", &self.producers_languages),
            ("processed-by", &self.producers_tools),
            ("sdk", &self.producers_sdks),
        ];
        let mut buf = Vec::new();
        write_uleb128(
            &mut buf,
            fields.iter().filter(|(_, m)| !m.is_empty()).count() as u64,
        );
        for (field, entries) in fields {
            if entries.is_empty() {
                continue;
            }
            write_name(&mut buf, field);
            write_uleb128(&mut buf, entries.len() as u64);
            for (name, version) in entries {
                write_name(&mut buf, name);
                write_name(&mut buf, version);
            }
        }
        buf
    }

    fn render_target_features(&self) -> Vec<u8> {
        let mut features: Vec<&String> = self.out_features.iter().collect();
        features.sort();
        let mut buf = Vec::new();
        write_uleb128(&mut buf, features.len() as u64);
        for name in features {
            write_u8(&mut buf, feature::PREFIX_USED);
            write_name(&mut buf, name);
        }
        buf
    }
}
