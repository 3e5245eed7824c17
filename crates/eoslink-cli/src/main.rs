mod args;

use std::process::ExitCode;

use eoslink_linker::{link, write_output, Diagnostics};
use eoslink_object::{ObjectDescriptor, ObjectFile, SymbolTable};

use args::Cli;

fn main() -> ExitCode {
    let cli = <Cli as clap::Parser>::parse();
    install_tracing(cli.verbose);

    let config = cli.to_config();
    let (mut objects, mut symtab) = match load_inputs(&cli) {
        Ok(loaded) => loaded,
        Err(message) => {
            eprintln!("eoslink: error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let mut diagnostics = Diagnostics::new();
    let result = link(&config, &mut objects, &mut symtab, &mut diagnostics);

    for diagnostic in &diagnostics {
        eprintln!("eoslink: {diagnostic}");
    }

    let module = match result {
        Ok(module) => module,
        Err(err) => {
            eprintln!("eoslink: error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = write_output(&module, &config) {
        eprintln!("eoslink: error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn load_inputs(cli: &Cli) -> Result<(Vec<ObjectFile>, SymbolTable), String> {
    let mut symtab = SymbolTable::new();
    let mut objects = Vec::with_capacity(cli.inputs.len());
    for (index, path) in cli.inputs.iter().enumerate() {
        let text = std::fs::read_to_string(path)
            .map_err(|err| format!("cannot read {}: {err}", path.display()))?;
        let object = ObjectDescriptor::from_json(&text)
            .map_err(|err| format!("{}: {err}", path.display()))?
            .into_object(index as u32, &mut symtab)
            .map_err(|err| err.to_string())?;
        objects.push(object);
    }
    Ok((objects, symtab))
}

fn install_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
