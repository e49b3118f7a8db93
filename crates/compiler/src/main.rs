//! Sindarin compiler CLI
//!
//! Driver binary for the back end of the toolchain: it links C emitted by
//! the pipeline against the Sindarin runtime and generates shell
//! completions. The front end (lexer and parser) lives in its own crate
//! and invokes the pipeline through the library API.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use sinc::{ArithmeticMode, CompilerConfig};

#[derive(ClapParser)]
#[command(name = "sinc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sindarin compiler driver - link generated C against the runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an emitted .c file to an executable
    Build {
        /// Input .c file produced by the code generator
        input: PathBuf,

        /// Output executable path (defaults to input filename without extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory containing libsindarin_runtime.a and sindarin_rt.h
        #[arg(long, default_value = "target/release")]
        runtime_dir: PathBuf,

        /// Keep the intermediate .c file next to the output
        #[arg(long)]
        keep_c: bool,

        /// Emit native C operators instead of checked runtime arithmetic
        /// (recorded in the build configuration for the pipeline)
        #[arg(long)]
        unchecked_arithmetic: bool,

        /// Additional libraries to link
        #[arg(short = 'l', value_name = "LIB")]
        libraries: Vec<String>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            runtime_dir,
            keep_c,
            unchecked_arithmetic,
            libraries,
        } => {
            let output = output.unwrap_or_else(|| {
                let stem = input.file_stem().unwrap_or_default();
                PathBuf::from(stem)
            });
            run_build(
                &input,
                &output,
                &runtime_dir,
                keep_c,
                unchecked_arithmetic,
                libraries,
            );
        }
        Commands::Completions { shell } => {
            run_completions(shell);
        }
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "sinc", &mut io::stdout());
}

fn run_build(
    input: &Path,
    output: &Path,
    runtime_dir: &Path,
    keep_c: bool,
    unchecked_arithmetic: bool,
    libraries: Vec<String>,
) {
    let mut config = CompilerConfig::new();
    config.keep_c = keep_c;
    if unchecked_arithmetic {
        config.arithmetic_mode = ArithmeticMode::Unchecked;
    }
    for lib in libraries {
        config = config.with_library(lib);
    }

    let c_source = match std::fs::read_to_string(input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: failed to read {}: {}", input.display(), e);
            process::exit(1);
        }
    };

    match sinc::build_c_source(&c_source, output, runtime_dir, &config) {
        Ok(()) => {
            println!("Linked {} -> {}", input.display(), output.display());
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}
