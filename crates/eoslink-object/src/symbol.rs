//! Symbols and the resolved symbol table.
//!
//! Resolution itself happens upstream; the table here is the *result* the
//! output core consumes: named entities with liveness/visibility flags,
//! kind-specific payloads, and slots for the indices the core assigns.

use eoslink_wasm::types::{EventType, GlobalType, InitExpr, Signature};
use indexmap::IndexMap;

/// Stable handle into a [`SymbolTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What kind of entity a symbol names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Data,
    Global,
    Event,
    Section,
}

/// Resolution and visibility flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SymbolFlags {
    pub defined: bool,
    pub live: bool,
    pub local: bool,
    pub hidden: bool,
    pub weak: bool,
    pub used_in_regular_obj: bool,
    pub discarded: bool,
    /// Created by the linker rather than read from an object file.
    pub synthetic: bool,
}

/// Where a defined symbol's payload lives inside an object file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRef {
    pub file: u32,
    pub index: u32,
}

/// Placement of a data symbol within its defining input segment. The
/// symbol's virtual address and output-segment offset derive from this
/// once memory layout has run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataPlacement {
    /// Input segment index within the defining file.
    pub segment: u32,
    /// Offset within that input segment.
    pub offset: u64,
    pub size: u64,
}

/// A named entity in the link.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub flags: SymbolFlags,

    /// Function and event symbols carry a signature.
    pub signature: Option<Signature>,
    /// Global symbols carry a global type.
    pub global_ty: Option<GlobalType>,
    /// Constant initializer for synthetic globals; memory layout rewrites
    /// `__stack_pointer` and `__tls_size` through this.
    pub init: Option<InitExpr>,

    /// Defining chunk for symbols that came from an object file.
    pub chunk: Option<ChunkRef>,
    /// Body bytes installed on synthetic functions once generated,
    /// already prefixed with their ULEB128 length.
    pub body: Option<Vec<u8>>,

    /// Index in the symbol's space (function/global/event), assigned by
    /// the core. Imports and definitions share one contiguous space.
    pub out_index: Option<u32>,
    /// Indirect-function-table slot, assigned by relocation scanning.
    pub table_index: Option<u32>,
    /// Virtual address, for data symbols.
    pub virtual_address: Option<u64>,
    pub placement: Option<DataPlacement>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, flags: SymbolFlags) -> Self {
        Self {
            name: name.into(),
            kind,
            flags,
            signature: None,
            global_ty: None,
            init: None,
            chunk: None,
            body: None,
            out_index: None,
            table_index: None,
            virtual_address: None,
            placement: None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        !self.flags.defined
    }
}

/// The resolved symbol table.
///
/// Insertion order is preserved; synthetic symbols are additionally
/// tracked in creation order because index assignment walks them before
/// the per-file entities.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_name: IndexMap<String, SymbolId>,
    synthetic: Vec<SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a symbol, replacing any previous entry with the same name.
    pub fn insert(&mut self, symbol: Symbol) -> SymbolId {
        if let Some(&id) = self.by_name.get(&symbol.name) {
            self.symbols[id.index()] = symbol;
            return id;
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.by_name.insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        id
    }

    pub fn find(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SymbolId> + use<> {
        (0..self.symbols.len() as u32).map(SymbolId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    /// Synthetic symbols in creation order.
    pub fn synthetic(&self) -> &[SymbolId] {
        &self.synthetic
    }

    /// Create a live synthetic function symbol with an empty body.
    pub fn add_synthetic_function(
        &mut self,
        name: impl Into<String>,
        signature: Signature,
    ) -> SymbolId {
        let mut sym = Symbol::new(
            name,
            SymbolKind::Function,
            SymbolFlags {
                defined: true,
                live: true,
                used_in_regular_obj: true,
                synthetic: true,
                ..SymbolFlags::default()
            },
        );
        sym.signature = Some(signature);
        let id = self.insert(sym);
        self.synthetic.push(id);
        id
    }

    /// Create a live synthetic global symbol with a constant initializer.
    pub fn add_synthetic_global(
        &mut self,
        name: impl Into<String>,
        ty: GlobalType,
        init: InitExpr,
    ) -> SymbolId {
        let mut sym = Symbol::new(
            name,
            SymbolKind::Global,
            SymbolFlags {
                defined: true,
                live: true,
                used_in_regular_obj: true,
                synthetic: true,
                ..SymbolFlags::default()
            },
        );
        sym.global_ty = Some(ty);
        sym.init = Some(init);
        let id = self.insert(sym);
        self.synthetic.push(id);
        id
    }

    /// Define `name` as an absolute data symbol at `va`, but only when the
    /// link already references it. Used for `__start_*`/`__stop_*`.
    pub fn add_optional_data_symbol(&mut self, name: &str, va: u64) -> Option<SymbolId> {
        let id = self.find(name)?;
        let sym = self.get_mut(id);
        if sym.flags.defined {
            return None;
        }
        sym.kind = SymbolKind::Data;
        sym.flags.defined = true;
        sym.flags.synthetic = true;
        sym.virtual_address = Some(va);
        Some(id)
    }
}
