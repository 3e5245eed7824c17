//! Output synthesis core of the eoslink wasm linker.
//!
//! Given already-parsed relocatable object files and a resolved symbol
//! table, this crate lays out memory, assigns index spaces, generates the
//! EOSIO dispatcher functions, and emits the final WebAssembly module
//! (plus an optional merged `.abi` companion file).
//!
//! The pipeline is a single-shot [`Writer`](writer::Writer) run:
//! - `segments` merges input data segments into output segments
//! - `layout` assigns virtual addresses, stack and heap bases
//! - `features` negotiates the target-feature sets
//! - `spaces` computes imports, indices, types and exports
//! - `synthesize` and `dispatch` generate function bodies
//! - `sections` renders the output sections, `writer` drives and emits

pub mod abi;
pub mod config;
pub mod diagnostics;
pub mod writer;

mod body;
mod dispatch;
mod features;
mod layout;
mod sections;
mod segments;
mod spaces;
mod synthesize;

#[cfg(test)]
mod features_tests;
#[cfg(test)]
mod layout_tests;
#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod writer_tests;

pub use config::Config;
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use writer::{link, write_output, LinkedModule};

/// Fatal linker errors. Accumulating (non-fatal) problems go through
/// [`Diagnostics`] instead and trip the driver's gates.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// A helper symbol the dispatcher generators depend on is missing.
    #[error("internal error, {0} not found")]
    SymbolNotFound(String),

    /// Accumulated diagnostics reached a driver gate with errors pending.
    #[error("link failed with {0} error(s)")]
    HadErrors(usize),

    /// Inconsistency that indicates a linker bug, not bad input.
    #[error("wasm_ld internal error: {0}")]
    Internal(String),

    #[error("failed to open {path}: {source}")]
    OpenOutput {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write the output file: {0}")]
    WriteOutput(#[source] std::io::Error),
}
