//! Memory layout.
//!
//! Assigns virtual addresses to output segments, the explicit stack and
//! the heap base, validates configured memory bounds, and materializes
//! the addresses of the auxiliary data symbols. The default layout from
//! low to high is initialized data (starting at `global_base`), the
//! explicit stack, then the heap; `stack_first` flips the stack below the
//! static data so overflows trap instead of corrupting globals.

use eoslink_wasm::types::{align_up, InitExpr, PAGE_SIZE};
use tracing::debug;

use crate::writer::Writer;

const STACK_ALIGNMENT: u64 = 16;

impl Writer<'_> {
    pub(crate) fn layout_memory(&mut self) {
        let mut memory_ptr: u64 = 0;

        if self.config.stack_first {
            self.place_stack(&mut memory_ptr);
            // static data never starts below the configured global base
            memory_ptr = memory_ptr.max(self.config.global_base);
        } else {
            memory_ptr = self.config.global_base;
            debug!(base = memory_ptr, "mem: global base");
        }

        let global_base = self.config.global_base;
        self.set_symbol_va("__global_base", global_base);

        // __dso_handle points at the start of the data segments.
        let data_start = memory_ptr;
        self.set_symbol_va("__dso_handle", data_start);

        self.dylink_mem_align = 0;
        for seg in &mut self.segments {
            self.dylink_mem_align = self.dylink_mem_align.max(seg.alignment);
            memory_ptr = align_up(memory_ptr, 1 << seg.alignment);
            seg.start_va = memory_ptr;
            debug!(
                segment = %seg.name,
                offset = memory_ptr,
                size = seg.size,
                align = seg.alignment,
                "mem: place segment"
            );
            memory_ptr += seg.size;

            if seg.name == ".tdata"
                && let Some(id) = self.symtab.find("__tls_size")
            {
                self.symtab.get_mut(id).init = Some(InitExpr::I32Const(seg.size as i32));
            }
        }

        self.assign_data_symbol_addresses();
        self.set_symbol_va("__data_end", memory_ptr);
        debug!(size = memory_ptr - data_start, "mem: static data");

        if self.config.shared {
            self.dylink_mem_size = memory_ptr;
            return;
        }

        if !self.config.stack_first {
            self.place_stack(&mut memory_ptr);
        }

        // __heap_base directly follows the stack or static data, so a
        // malloc/brk implementation can grow the heap at runtime.
        debug!(base = memory_ptr, "mem: heap base");
        self.set_symbol_va("__heap_base", memory_ptr);

        if self.config.initial_memory != 0 {
            if self.config.initial_memory % PAGE_SIZE != 0 {
                self.diagnostics
                    .error(format!("initial memory must be {PAGE_SIZE}-byte aligned"));
            }
            if memory_ptr > self.config.initial_memory {
                self.diagnostics.error(format!(
                    "initial memory too small, {memory_ptr} bytes needed"
                ));
            } else {
                memory_ptr = self.config.initial_memory;
            }
        }
        self.dylink_mem_size = memory_ptr;
        self.mem_pages = align_up(memory_ptr, PAGE_SIZE) / PAGE_SIZE;
        debug!(pages = self.mem_pages, "mem: total pages");

        // Check max if explicitly supplied or required by shared memory.
        if self.config.max_memory != 0 || self.config.shared_memory {
            if self.config.max_memory % PAGE_SIZE != 0 {
                self.diagnostics
                    .error(format!("maximum memory must be {PAGE_SIZE}-byte aligned"));
            }
            if memory_ptr > self.config.max_memory {
                self.diagnostics.error(format!(
                    "maximum memory too small, {memory_ptr} bytes needed"
                ));
            }
            self.max_mem_pages = Some(self.config.max_memory / PAGE_SIZE);
            debug!(pages = self.config.max_memory / PAGE_SIZE, "mem: max pages");
        }
    }

    /// Reserve the explicit stack region and point `__stack_pointer` at
    /// its top (the stack grows downward).
    fn place_stack(&mut self, memory_ptr: &mut u64) {
        if self.config.relocatable || self.config.is_pic {
            return;
        }
        *memory_ptr = align_up(*memory_ptr, STACK_ALIGNMENT);
        if self.config.z_stack_size != align_up(self.config.z_stack_size, STACK_ALIGNMENT) {
            self.diagnostics
                .error(format!("stack size must be {STACK_ALIGNMENT}-byte aligned"));
        }
        debug!(size = self.config.z_stack_size, base = *memory_ptr, "mem: stack");
        *memory_ptr += self.config.z_stack_size;
        if let Some(id) = self.symtab.find("__stack_pointer") {
            self.symtab.get_mut(id).init = Some(InitExpr::I32Const(*memory_ptr as i32));
        }
        debug!(top = *memory_ptr, "mem: stack top");
    }

    /// Record `va` on the named auxiliary symbol, when defined.
    fn set_symbol_va(&mut self, name: &str, va: u64) {
        if let Some(id) = self.symtab.find(name) {
            let sym = self.symtab.get_mut(id);
            if sym.flags.defined {
                sym.virtual_address = Some(va);
            }
        }
    }

    /// Compute virtual addresses for data symbols defined inside input
    /// segments, now that their output segments have addresses.
    fn assign_data_symbol_addresses(&mut self) {
        let Writer {
            objects,
            segments,
            symtab,
            ..
        } = self;
        for id in symtab.ids().collect::<Vec<_>>() {
            let sym = symtab.get(id);
            let (Some(chunk), Some(placement)) = (sym.chunk, sym.placement) else {
                continue;
            };
            let Some(in_seg) = objects
                .get(chunk.file as usize)
                .and_then(|f| f.segments.get(placement.segment as usize))
            else {
                continue;
            };
            let Some(out_idx) = in_seg.output_segment else {
                continue; // dead segment
            };
            let va = segments[out_idx as usize].start_va + in_seg.output_offset + placement.offset;
            symtab.get_mut(id).virtual_address = Some(va);
        }
    }
}
