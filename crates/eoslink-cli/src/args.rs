//! Command-line arguments, mapped 1:1 onto the linker configuration.

use std::path::PathBuf;

use clap::Parser;
use eoslink_linker::Config;

#[derive(Debug, Parser)]
#[command(
    name = "eoslink",
    version,
    about = "Link EOSIO contract objects into a WebAssembly module"
)]
pub struct Cli {
    /// Input object descriptors (JSON)
    #[arg(required = true, value_name = "OBJECT")]
    pub inputs: Vec<PathBuf>,

    /// Output module path; the merged ABI lands next to it as `.abi`
    #[arg(short, long, default_value = "a.wasm")]
    pub output: PathBuf,

    /// Produce a relocatable object
    #[arg(short = 'r', long)]
    pub relocatable: bool,

    /// Position-independent output
    #[arg(long = "pic")]
    pub pic: bool,

    /// Shared-library output
    #[arg(long)]
    pub shared: bool,

    /// Place the stack below static data
    #[arg(long)]
    pub stack_first: bool,

    /// Start address for static data
    #[arg(long, value_name = "ADDR", default_value_t = 1024)]
    pub global_base: u64,

    /// Explicit stack size in bytes (16-byte aligned)
    #[arg(short = 'z', long = "stack-size", value_name = "SIZE", default_value_t = 64 * 1024)]
    pub stack_size: u64,

    /// Initial linear memory size in bytes (multiple of 64Ki)
    #[arg(long, value_name = "SIZE", default_value_t = 0)]
    pub initial_memory: u64,

    /// Maximum linear memory size in bytes (multiple of 64Ki)
    #[arg(long, value_name = "SIZE", default_value_t = 0)]
    pub max_memory: u64,

    /// Use shared linear memory
    #[arg(long)]
    pub shared_memory: bool,

    /// Import memory from the environment instead of defining it
    #[arg(long)]
    pub import_memory: bool,

    /// Export the indirect function table
    #[arg(long)]
    pub export_table: bool,

    /// Export hidden symbols too
    #[arg(long)]
    pub export_all: bool,

    /// Keep data segments separate instead of merging by prefix
    #[arg(long)]
    pub no_merge_data_segments: bool,

    /// Emit passive data segments initialized via memory.init
    #[arg(long)]
    pub passive_segments: bool,

    /// Drop .debug_* custom sections
    #[arg(long)]
    pub strip_debug: bool,

    /// Drop all name and debug information
    #[arg(long)]
    pub strip_all: bool,

    /// Carry relocation sections into the output
    #[arg(long)]
    pub emit_relocs: bool,

    /// Skip per-file target-feature validation
    #[arg(long)]
    pub no_check_features: bool,

    /// Fix the output target-feature set instead of inferring it
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub features: Option<Vec<String>>,

    /// Guard dispatcher execution with a stack canary
    #[arg(long)]
    pub stack_canary: bool,

    /// Suppress the generated action dispatcher
    #[arg(long)]
    pub other_model: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn to_config(&self) -> Config {
        Config {
            output_file: self.output.clone(),
            relocatable: self.relocatable,
            is_pic: self.pic || self.shared,
            shared: self.shared,
            stack_first: self.stack_first,
            global_base: self.global_base,
            z_stack_size: self.stack_size,
            initial_memory: self.initial_memory,
            max_memory: self.max_memory,
            shared_memory: self.shared_memory,
            import_memory: self.import_memory,
            export_table: self.export_table,
            export_all: self.export_all,
            merge_data_segments: !self.no_merge_data_segments,
            passive_segments: self.passive_segments,
            strip_debug: self.strip_debug,
            strip_all: self.strip_all,
            emit_relocs: self.emit_relocs,
            check_features: !self.no_check_features,
            features: self.features.clone(),
            stack_canary: self.stack_canary,
            other_model: self.other_model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_linker_defaults() {
        let cli = Cli::parse_from(["eoslink", "in.json"]);
        let config = cli.to_config();
        assert_eq!(config.global_base, 1024);
        assert_eq!(config.z_stack_size, 64 * 1024);
        assert!(config.merge_data_segments);
        assert!(config.check_features);
        assert!(!config.relocatable);
    }

    #[test]
    fn shared_implies_pic() {
        let cli = Cli::parse_from(["eoslink", "--shared", "in.json"]);
        let config = cli.to_config();
        assert!(config.is_pic);
        assert!(config.shared);
    }

    #[test]
    fn feature_list_splits_on_commas() {
        let cli = Cli::parse_from(["eoslink", "--features", "bulk-memory,sign-ext", "in.json"]);
        let config = cli.to_config();
        assert_eq!(
            config.features.as_deref(),
            Some(&["bulk-memory".to_string(), "sign-ext".to_string()][..])
        );
    }
}
