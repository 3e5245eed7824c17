//! WebAssembly format primitives for eoslink.
//!
//! This crate contains:
//! - Binary format constants (section ids, opcodes, flags)
//! - Core entity types (value types, signatures, limits, global types)
//! - LEB128 and little-endian byte writers
//! - EOSIO name encodings (base32 account names, sync-call hash ids)

pub mod encode;
pub mod name;
pub mod types;

pub use encode::{
    write_bytes, write_name, write_sleb128, write_u8, write_u32_le, write_uleb128,
};
pub use name::{string_to_name, sync_call_id};
pub use types::{
    EventType, ExternalKind, GlobalType, InitExpr, Limits, RelocKind, SectionId, Signature,
    ValType, PAGE_SIZE, WASM_MAGIC, WASM_VERSION,
};
