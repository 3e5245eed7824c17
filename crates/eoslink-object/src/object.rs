//! Parsed relocatable object files and their input entities.
//!
//! An [`ObjectFile`] is an already-parsed view of one relocatable wasm
//! object: ordered entity lists, linking metadata, producer info,
//! target-feature requests, and the EOSIO contract annotations the
//! dispatcher generators consume. Relocation lists arrive pre-populated;
//! the linker core only rebases and serializes them.

use eoslink_wasm::types::{EventType, GlobalType, InitExpr, RelocKind, Signature};

/// One relocation entry attached to an input chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reloc {
    pub kind: RelocKind,
    /// Offset within the owning chunk's payload.
    pub offset: u32,
    /// Symbol index (or type index for `TypeIndexLeb`) in the owning file.
    pub index: u32,
    pub addend: i64,
}

/// A function body from an object file. The body bytes cover the locals
/// declaration and code, without the size prefix.
#[derive(Clone, Debug, Default)]
pub struct InputFunction {
    pub symbol_name: String,
    pub signature: Signature,
    pub body: Vec<u8>,
    pub relocs: Vec<Reloc>,
    pub live: bool,
    /// Index of the signature in the owning file's type table.
    pub type_index: u32,
    /// Offset of the body bytes within the output code section payload,
    /// filled in during serialization.
    pub output_offset: u64,
}

/// A data segment from an object file.
#[derive(Clone, Debug, Default)]
pub struct InputSegment {
    pub name: String,
    /// log2 of the required alignment.
    pub alignment: u32,
    pub data: Vec<u8>,
    pub relocs: Vec<Reloc>,
    pub live: bool,
    /// Output segment this chunk was merged into.
    pub output_segment: Option<u32>,
    /// Offset within that output segment.
    pub output_offset: u64,
}

/// A defined global from an object file.
#[derive(Clone, Debug)]
pub struct InputGlobal {
    pub symbol_name: String,
    pub ty: GlobalType,
    pub init: InitExpr,
    pub live: bool,
}

/// A defined event (exception tag) from an object file.
#[derive(Clone, Debug)]
pub struct InputEvent {
    pub symbol_name: String,
    pub ty: EventType,
    pub live: bool,
    pub type_index: u32,
}

/// A custom section carried through from an object file.
#[derive(Clone, Debug, Default)]
pub struct InputCustomSection {
    pub name: String,
    pub payload: Vec<u8>,
    pub relocs: Vec<Reloc>,
    /// Offset of this chunk within the merged output custom section.
    pub output_offset: u64,
}

/// Producer-info record from the `producers` custom section.
pub type ProducerField = Vec<(String, String)>;

#[derive(Clone, Debug, Default)]
pub struct ProducerInfo {
    pub languages: ProducerField,
    pub tools: ProducerField,
    pub sdks: ProducerField,
}

/// Policy tag on a target-feature request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeaturePolicy {
    Used,
    Required,
    Disallowed,
}

/// One target-feature request from an object file.
#[derive(Clone, Debug)]
pub struct FeatureRequest {
    pub policy: FeaturePolicy,
    pub name: String,
}

/// An init-function entry: symbol name plus priority. Lower priorities run
/// first; ties keep insertion order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitFuncEntry {
    pub symbol_name: String,
    pub priority: u32,
}

/// Linking-metadata record from the `linking` custom section.
#[derive(Clone, Debug, Default)]
pub struct LinkingMetadata {
    pub version: u32,
    pub init_functions: Vec<InitFuncEntry>,
}

/// An already-parsed relocatable object file.
#[derive(Clone, Debug, Default)]
pub struct ObjectFile {
    pub name: String,
    /// File-local symbol index to symbol-table handle, in the order the
    /// file's relocations refer to symbols.
    pub symbols: Vec<crate::symbol::SymbolId>,
    pub functions: Vec<InputFunction>,
    pub segments: Vec<InputSegment>,
    pub globals: Vec<InputGlobal>,
    pub events: Vec<InputEvent>,
    pub custom_sections: Vec<InputCustomSection>,
    pub producers: ProducerInfo,
    pub features: Vec<FeatureRequest>,
    pub linking: LinkingMetadata,

    /// The file's type table (signatures referenced by `type_index`).
    pub types: Vec<Signature>,
    /// Which file-local types the output must carry; populated by
    /// relocation scanning.
    pub type_is_used: Vec<bool>,
    /// File-local type index to output type index, filled in while the
    /// output type table is computed.
    pub type_map: Vec<u32>,

    /// EOSIO action annotations, `actname:handler_symbol`.
    pub eosio_actions: Vec<String>,
    /// EOSIO notify annotations, `code::action:handler_symbol`.
    pub eosio_notify: Vec<String>,
    /// EOSIO sync-call annotations, `callname:handler_symbol`.
    pub eosio_calls: Vec<String>,
    /// ABI JSON blob, empty when the file carries none.
    pub eosio_abi: String,
}

impl ObjectFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
