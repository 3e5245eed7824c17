//! Linker-synthesized function bodies.
//!
//! `__wasm_call_ctors`, `__wasm_init_memory`, `__wasm_init_tls` and
//! `__wasm_apply_relocs` are generated here once indices are assigned;
//! the EOSIO dispatchers live in `dispatch`.

use eoslink_wasm::encode::write_uleb128;
use eoslink_wasm::types::Signature;
use tracing::debug;

use crate::body::BodyWriter;
use crate::writer::{InitEntry, Writer};
use crate::LinkError;

impl Writer<'_> {
    /// Wrap `content` with its ULEB128 length and install it as the body
    /// of the named synthetic symbol.
    pub(crate) fn install_function(&mut self, name: &str, content: Vec<u8>) -> Result<(), LinkError> {
        let id = self
            .symtab
            .find(name)
            .ok_or_else(|| LinkError::SymbolNotFound(name.to_string()))?;
        let mut body = Vec::with_capacity(content.len() + 4);
        write_uleb128(&mut body, content.len() as u64);
        body.extend_from_slice(&content);
        self.symtab.get_mut(id).body = Some(body);
        Ok(())
    }

    /// Collect init functions from every input's linking metadata and
    /// order them by priority (stable, lowest first).
    pub(crate) fn calculate_init_functions(&mut self) {
        if !self.config.relocatable && !self.call_ctors_live() {
            return;
        }

        for file_idx in 0..self.objects.len() {
            for entry in self.objects[file_idx].linking.init_functions.clone() {
                let Some(id) = self.symtab.find(&entry.symbol_name) else {
                    self.diagnostics.error(format!(
                        "undefined init function: {}",
                        entry.symbol_name
                    ));
                    continue;
                };
                let sym = self.symtab.get(id);
                // comdat exclusions can cause init functions to be discarded
                if sym.flags.discarded {
                    continue;
                }
                if sym.signature.as_ref() != Some(&Signature::default()) {
                    self.diagnostics
                        .error(format!("invalid signature for init func: {}", sym.name));
                }
                debug!(init = %entry.symbol_name, priority = entry.priority, "init function");
                self.init_functions.push(InitEntry {
                    symbol: id,
                    priority: entry.priority,
                });
            }
        }

        self.init_functions.sort_by_key(|entry| entry.priority);
    }

    pub(crate) fn call_ctors_live(&self) -> bool {
        self.symtab
            .find("__wasm_call_ctors")
            .is_some_and(|id| self.symtab.get(id).flags.live)
    }

    /// `__wasm_call_ctors`: run memory init / relocations, then each
    /// constructor in priority order.
    pub(crate) fn create_call_ctors_function(&mut self) -> Result<(), LinkError> {
        if !self.call_ctors_live() {
            return Ok(());
        }

        let mut body = BodyWriter::new();
        body.locals_none();

        if self.config.passive_segments {
            body.call(self.function_index("__wasm_init_memory")?);
        }

        if self.config.is_pic {
            body.call(self.function_index("__wasm_apply_relocs")?);
        }

        for entry in self.init_functions.clone() {
            let index = self
                .symtab
                .get(entry.symbol)
                .out_index
                .ok_or_else(|| LinkError::Internal("init function has no index".to_string()))?;
            body.call(index);
        }

        self.install_function("__wasm_call_ctors", body.finish())
    }

    /// `__wasm_init_memory`: `memory.init` + `data.drop` for every
    /// passive segment except `.tdata` (which `__wasm_init_tls` owns).
    pub(crate) fn create_init_memory_function(&mut self) -> Result<(), LinkError> {
        debug!("create init memory function");
        let mut body = BodyWriter::new();
        body.locals_none();

        for seg in &self.segments {
            if seg.is_passive() && seg.name != ".tdata" {
                body.i32_const(seg.start_va as i32);
                body.i32_const(0);
                body.i32_const(seg.size as i32);
                body.memory_init(seg.index);
                body.data_drop(seg.index);
            }
        }

        self.install_function("__wasm_init_memory", body.finish())
    }

    /// `__wasm_init_tls(tls_block: i32)`: point `__tls_base` at the
    /// caller-provided block and copy `.tdata` into it.
    pub(crate) fn create_init_tls_function(&mut self) -> Result<(), LinkError> {
        let live = self
            .symtab
            .find("__wasm_init_tls")
            .is_some_and(|id| self.symtab.get(id).flags.live);
        if !live {
            return Ok(());
        }

        let tls_seg = self
            .segments
            .iter()
            .find(|seg| seg.name == ".tdata")
            .map(|seg| (seg.index, seg.size));

        let mut body = BodyWriter::new();
        body.locals_none();
        if let Some((index, size)) = tls_seg {
            let tls_base = self.global_index("__tls_base")?;
            body.local_get(0);
            body.global_set(tls_base);
            body.local_get(0);
            body.i32_const(0);
            body.i32_const(size as i32);
            body.memory_init(index);
        }

        self.install_function("__wasm_init_tls", body.finish())
    }

    /// `__wasm_apply_relocs`: segment-relative fixups applied on startup
    /// for position-independent output.
    pub(crate) fn create_apply_relocs_function(&mut self) -> Result<(), LinkError> {
        debug!("create apply relocs function");
        let mut body = BodyWriter::new();
        body.locals_none();

        for seg in &self.segments {
            for &(file_idx, seg_idx) in &seg.chunks {
                let chunk = &self.objects[file_idx].segments[seg_idx];
                for reloc in &chunk.relocs {
                    if !reloc.kind.is_memory_addr() {
                        continue;
                    }
                    let target = self.objects[file_idx]
                        .symbols
                        .get(reloc.index as usize)
                        .map(|&id| self.symtab.get(id))
                        .and_then(|sym| sym.virtual_address)
                        .unwrap_or(0);
                    let site = seg.start_va + chunk.output_offset + reloc.offset as u64;
                    body.i32_const(site as i32);
                    body.i32_const((target as i64 + reloc.addend) as i32);
                    body.i32_store(2, 0);
                }
            }
        }

        self.install_function("__wasm_apply_relocs", body.finish())
    }
}
