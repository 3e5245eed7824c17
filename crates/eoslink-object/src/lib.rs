//! Input-side data model for eoslink.
//!
//! This crate holds everything the output-synthesis core consumes but does
//! not compute itself: parsed object files with their input entities
//! (functions, data segments, globals, events, custom sections), linking
//! metadata, producer records, target-feature requests, EOSIO contract
//! metadata, and the resolved symbol table.
//!
//! Object parsing and symbol resolution proper live outside this
//! workspace; tests and the CLI construct these types directly or load
//! them from JSON descriptors (see [`descriptor`]).

pub mod descriptor;
pub mod object;
pub mod symbol;

#[cfg(test)]
mod symbol_tests;

pub use descriptor::{DescriptorError, ObjectDescriptor};
pub use object::{
    FeaturePolicy, FeatureRequest, InitFuncEntry, InputCustomSection, InputEvent, InputFunction,
    InputGlobal, InputSegment, LinkingMetadata, ObjectFile, ProducerField, ProducerInfo, Reloc,
};
pub use symbol::{Symbol, SymbolFlags, SymbolId, SymbolKind, SymbolTable};
