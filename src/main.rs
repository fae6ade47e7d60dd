use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bytecomp::bytecode::{CodeGen, CodeObject, disasm};
use bytecomp::config::Config;
use bytecomp::frontend::{lexer::Lexer, parse_source};
use bytecomp::runtime::Vm;

/// Compile trivial programs like "print(2+3)" into stack-machine code objects
#[derive(Parser, Debug)]
#[command(name = "bytecomp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Source file to compile (reads stdin when omitted)
    file: Option<PathBuf>,

    /// Compile the given source text instead of a file
    #[arg(short, long, conflicts_with = "file")]
    eval: Option<String>,

    /// Print tokens only
    #[arg(long)]
    tokens: bool,

    /// Print the parsed tree
    #[arg(long)]
    ast: bool,

    /// Print the disassembly
    #[arg(long)]
    dis: bool,

    /// Print code object metadata and pools
    #[arg(long)]
    info: bool,

    /// Write the serialized code object to this path
    #[arg(long, value_name = "PATH")]
    emit: Option<PathBuf>,

    /// Compile only, do not execute
    #[arg(long)]
    no_run: bool,

    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Source name recorded in the code object
    #[arg(long)]
    filename: Option<String>,

    /// Entry name recorded in the code object
    #[arg(long)]
    name: Option<String>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{}", msg);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = match &cli.config {
        Some(path) => Config::load(path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };
    let opcodes = config.opcode_table().map_err(|e| e.to_string())?;

    let source = read_source(cli)?;

    if cli.tokens {
        return dump_tokens(&source);
    }

    let module = parse_source(&source).map_err(|e| e.to_string())?;
    if cli.ast {
        println!("{:#?}", module);
    }

    let mut options = config.codegen.clone();
    if let Some(path) = &cli.file {
        options.filename = path.display().to_string();
    }
    if let Some(filename) = &cli.filename {
        options.filename = filename.clone();
    }
    if let Some(name) = &cli.name {
        options.name = name.clone();
    }

    let code = CodeGen::with_options(&opcodes, options)
        .compile(&module)
        .map_err(|e| e.to_string())?;

    if cli.info {
        print!("{}", disasm::format_code_info(&code));
    }
    if cli.dis {
        disasm::print_code(&code, &opcodes).map_err(|e| e.to_string())?;
    }
    if let Some(path) = &cli.emit {
        write_code(&code, path)?;
    }

    if !cli.no_run {
        let mut vm = Vm::new(opcodes, io::stdout().lock());
        vm.run(&code).map_err(|e| e.to_string())?;
    }

    Ok(())
}

fn read_source(cli: &Cli) -> Result<String, String> {
    if let Some(text) = &cli.eval {
        return Ok(text.clone());
    }

    match &cli.file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path.display(), e)),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
            Ok(buf)
        }
    }
}

fn dump_tokens(source: &str) -> Result<(), String> {
    let tokens = Lexer::new(source).tokenize().map_err(|e| format!("lexer error: {}", e))?;
    for spanned in tokens {
        println!("{:>4}:{:<3} {:?}", spanned.span.line, spanned.span.col, spanned.token);
    }
    Ok(())
}

fn write_code(code: &CodeObject, path: &Path) -> Result<(), String> {
    let bytes = code.to_bytes().map_err(|e| e.to_string())?;
    std::fs::write(path, bytes).map_err(|e| format!("Failed to write '{}': {}", path.display(), e))
}
