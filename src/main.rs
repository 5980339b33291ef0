//! Ada 83 compiler CLI.
//!
//! Command-line front end over the `ada83c` library: `build` lowers a
//! compilation unit to LLVM textual IR, `check` runs lex→parse→resolve only.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use ada83c::{CompileOutput, CompilerConfig};
use tracing::{debug, error, info};

#[derive(ClapParser)]
#[command(name = "ada83c")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ada 83 compiler core - lowers a compilation unit to LLVM IR", long_about = None)]
struct Cli {
    /// Raise the tracing filter to `debug` (stacks with `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an Ada source file to LLVM textual IR
    Build {
        /// Input Ada source file
        input: PathBuf,

        /// Include path for `with`-ed units (repeatable)
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,

        /// Output `.ll` path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Suppress a named check compilation-unit-wide (repeatable):
        /// Range_Check, Overflow_Check, Index_Check, Length_Check,
        /// Division_Check, All_Checks
        #[arg(long = "suppress", value_name = "CHECK")]
        suppress: Vec<String>,
    },

    /// Lex, parse, and resolve an Ada source file without emitting IR
    Check {
        /// Input Ada source file
        input: PathBuf,

        /// Include path for `with`-ed units (repeatable)
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Build { input, include, output, suppress } => {
            let output = output.unwrap_or_else(|| PathBuf::from("output.ll"));
            let config = build_config(include, &suppress);
            run_build(&input, &output, &config);
        }
        Commands::Check { input, include } => {
            let config = build_config(include, &[]);
            run_check(&input, &config);
        }
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "ada83c=debug" } else { "ada83c=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_directive.parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(include: Vec<PathBuf>, suppress: &[String]) -> CompilerConfig {
    let mut config = CompilerConfig::new().with_search_dirs(include);
    for name in suppress {
        let mask = check_name_to_mask(name);
        if mask == 0 {
            eprintln!("warning: unknown check name '{}' in --suppress", name);
        } else {
            config = config.with_suppressed_check(mask);
        }
    }
    config
}

/// Mirrors `semantic::check_name_to_mask`'s pragma-name parsing for the
/// `--suppress` flag, which takes the same check names as `pragma Suppress`.
fn check_name_to_mask(name: &str) -> u32 {
    use ada83c::types::checks;
    if name.eq_ignore_ascii_case("Range_Check") {
        checks::RANGE_CHECK
    } else if name.eq_ignore_ascii_case("Overflow_Check") {
        checks::OVERFLOW_CHECK
    } else if name.eq_ignore_ascii_case("Index_Check") {
        checks::INDEX_CHECK
    } else if name.eq_ignore_ascii_case("Length_Check") {
        checks::LENGTH_CHECK
    } else if name.eq_ignore_ascii_case("Division_Check") {
        checks::DIVISION_CHECK
    } else if name.eq_ignore_ascii_case("All_Checks") {
        checks::ALL_CHECKS
    } else {
        0
    }
}

fn run_build(input: &Path, output: &Path, config: &CompilerConfig) {
    info!(input = %input.display(), "compiling");
    let result = ada83c::compile_file(input, config, false);
    match result {
        Ok(out) => finish(&input.display().to_string(), Some(output), out),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

fn run_check(input: &Path, config: &CompilerConfig) {
    info!(input = %input.display(), "checking");
    let result = ada83c::compile_file(input, config, true);
    match result {
        Ok(out) => finish(&input.display().to_string(), None, out),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

fn finish(input_display: &str, output: Option<&Path>, out: CompileOutput) {
    debug!(diagnostics = out.diagnostics.entries().len(), "pass complete");
    for d in out.diagnostics.entries() {
        eprintln!("{}", d);
    }
    if out.exit_code == 0 {
        match output {
            Some(path) => {
                if let Err(e) = std::fs::write(path, &out.ir) {
                    error!("failed to write '{}': {}", path.display(), e);
                    process::exit(1);
                }
                info!("Compiled '{}' -> '{}'", input_display, path.display());
            }
            None => info!("'{}' checks clean", input_display),
        }
    } else {
        error!("'{}' failed with {} error(s)", input_display, out.diagnostics.error_count());
    }
    process::exit(out.exit_code);
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "ada83c", &mut io::stdout());
}
