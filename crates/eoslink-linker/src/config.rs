//! Link configuration.

use std::path::PathBuf;

/// All knobs the output core consumes. The CLI maps its flags onto this
/// 1:1; tests build it directly.
#[derive(Clone, Debug)]
pub struct Config {
    pub output_file: PathBuf,

    /// Produce a relocatable object instead of an executable module.
    pub relocatable: bool,
    /// Position-independent output (single `.data` segment, runtime
    /// relocation).
    pub is_pic: bool,
    /// Shared-library output.
    pub shared: bool,

    /// Place the stack below all static data.
    pub stack_first: bool,
    /// Where static data starts when the stack is not first.
    pub global_base: u64,
    /// Explicit stack region size; must be 16-byte aligned.
    pub z_stack_size: u64,
    /// Initial linear memory size in bytes; 0 means "as computed".
    pub initial_memory: u64,
    /// Maximum linear memory size in bytes; 0 means unset.
    pub max_memory: u64,

    pub shared_memory: bool,
    pub import_memory: bool,
    pub export_table: bool,
    pub export_all: bool,
    pub merge_data_segments: bool,
    pub passive_segments: bool,

    pub strip_debug: bool,
    pub strip_all: bool,
    pub emit_relocs: bool,

    /// Validate per-file feature constraints.
    pub check_features: bool,
    /// Pre-specified output feature set; `None` infers from inputs.
    pub features: Option<Vec<String>>,

    /// Guard dispatcher execution with a stack canary.
    pub stack_canary: bool,
    /// Suppress the generated action dispatcher.
    pub other_model: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_file: PathBuf::from("a.wasm"),
            relocatable: false,
            is_pic: false,
            shared: false,
            stack_first: false,
            global_base: 1024,
            z_stack_size: 64 * 1024,
            initial_memory: 0,
            max_memory: 0,
            shared_memory: false,
            import_memory: false,
            export_table: false,
            export_all: false,
            merge_data_segments: true,
            passive_segments: false,
            strip_debug: false,
            strip_all: false,
            emit_relocs: false,
            check_features: true,
            features: None,
            stack_canary: false,
            other_model: false,
        }
    }
}
