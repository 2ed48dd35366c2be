/// jzc CLI (out-of-core, thin — spec §6/§2.3)
///
/// Reads the S-expression AST an external parser collaborator would hand
/// `jzc::compile` from a JSON file (`serde_json`, standing in for that
/// collaborator, which this crate does not implement), runs the pipeline,
/// and writes the result. Mirrors `axm/src/main.rs`'s `Cli`/`Commands`
/// shape; carries no compiler logic of its own.
use clap::{Parser as ClapParser, Subcommand};
use jzc::options::ALL_OPTIONS;
use jzc::{sexpr, CompileOptions, CompiledModule};
use miette::Result;
use std::path::PathBuf;

#[derive(ClapParser)]
#[command(
    name = "jzc",
    version = "0.1.0",
    about = "Ahead-of-time compiler from a disciplined JS subset to WebAssembly",
    long_about = "jzc — compiles a pre-parsed S-expression program (JSON) to a WebAssembly module."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a JSON S-expression program to WebAssembly.
    Compile {
        /// Path to the JSON-encoded `sexpr::Program`.
        input: PathBuf,
        /// Where to write the result. Required for `--format binary`;
        /// printed to stdout when omitted with `--format wat`.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// `binary` (default) or `wat`.
        #[arg(short, long)]
        format: Option<String>,
        /// Optional `jzc.toml`-style options file (spec §6).
        #[arg(long)]
        options: Option<PathBuf>,
    },
    /// Compile a JSON S-expression program and print its WAT text.
    RunText { input: PathBuf },
    /// List every recognized compile option, its default, and its meaning.
    Options,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Compile { input, output, format, options } => cmd_compile(input, output, format, options),
        Commands::RunText { input } => cmd_run_text(input),
        Commands::Options => {
            cmd_options();
            Ok(())
        }
    }
}

fn load_options(options_path: Option<PathBuf>, format_flag: Option<String>) -> Result<CompileOptions> {
    let mut opts = match options_path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| miette::miette!("Cannot read '{}': {}", path.display(), e))?;
            CompileOptions::from_toml(&text)
                .map_err(|e| miette::miette!("Invalid options file '{}': {}", path.display(), e))?
        }
        None => CompileOptions::default(),
    };

    if let Some(format) = format_flag {
        opts.format = match format.as_str() {
            "binary" => jzc::options::OutputFormat::Binary,
            "wat" => jzc::options::OutputFormat::Wat,
            other => return Err(miette::miette!("Unknown format '{}': expected 'binary' or 'wat'", other)),
        };
    }

    Ok(opts)
}

fn load_program(input: &PathBuf) -> Result<sexpr::Program> {
    let text =
        std::fs::read_to_string(input).map_err(|e| miette::miette!("Cannot read '{}': {}", input.display(), e))?;
    serde_json::from_str(&text).map_err(|e| miette::miette!("Malformed S-expression JSON in '{}': {}", input.display(), e))
}

fn cmd_compile(input: PathBuf, output: Option<PathBuf>, format: Option<String>, options: Option<PathBuf>) -> Result<()> {
    let opts = load_options(options, format)?;
    let program = load_program(&input)?;

    let (module, report) = jzc::compile(program, &opts).map_err(|e| miette::miette!("{}", e))?;

    for warning in &report.warnings {
        eprintln!("warning: {}", warning.message());
    }

    match module {
        CompiledModule::Binary(bytes) => {
            let out_path = output.ok_or_else(|| miette::miette!("--output is required for --format binary"))?;
            std::fs::write(&out_path, &bytes)
                .map_err(|e| miette::miette!("Cannot write '{}': {}", out_path.display(), e))?;
            eprintln!(
                "compiled '{}' -> '{}' ({} exports, {} schemas, {} interned strings)",
                input.display(),
                out_path.display(),
                report.export_count,
                report.schema_count,
                report.interned_string_count
            );
        }
        CompiledModule::Wat(text) => match output {
            Some(out_path) => {
                std::fs::write(&out_path, &text)
                    .map_err(|e| miette::miette!("Cannot write '{}': {}", out_path.display(), e))?;
            }
            None => print!("{text}"),
        },
    }

    Ok(())
}

fn cmd_run_text(input: PathBuf) -> Result<()> {
    let opts = CompileOptions { format: jzc::options::OutputFormat::Wat, ..CompileOptions::default() };
    let program = load_program(&input)?;
    let (module, _) = jzc::compile(program, &opts).map_err(|e| miette::miette!("{}", e))?;
    print!("{}", module.as_wat().expect("format was requested as wat"));
    Ok(())
}

fn cmd_options() {
    println!("{:<24} {:<16} {}", "name", "default", "description");
    for opt in ALL_OPTIONS {
        println!("{:<24} {:<16} {}", opt.name, opt.default, opt.description);
    }
}
