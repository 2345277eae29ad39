//! wrenc unified CLI tool
//!
//! Command-line driver for the compiler pipeline: building serialized IR
//! modules down to object-module artifacts, checking them without writing
//! output, dumping pipeline internals for inspection, and linking a compiled
//! artifact's class descriptors into a runtime registry.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wrenc")]
#[command(about = "wrenc compiler toolchain")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile serialized IR modules to object-module artifacts
    #[command(alias = "b")]
    Build {
        /// JSON-encoded IR module files to compile
        inputs: Vec<PathBuf>,
        /// Output directory for compiled artifacts
        #[arg(short, long, default_value = "dist")]
        out_dir: PathBuf,
        /// Emit debug info into the artifact
        #[arg(long)]
        debug_info: bool,
        /// Color output: auto, always, never
        #[arg(long)]
        color: Option<String>,
    },

    /// Run the pass pipeline and backend over IR modules without writing output
    #[command(alias = "c")]
    Check {
        /// JSON-encoded IR module files to check
        inputs: Vec<PathBuf>,
        /// Color output: auto, always, never
        #[arg(long)]
        color: Option<String>,
    },

    /// Dump compiler or artifact internals
    Debug {
        #[command(subcommand)]
        command: DebugCommands,
    },

    /// Link a compiled object-module artifact's classes into a runtime registry
    Run {
        /// Compiled `.wrnc` object-module artifact
        module: PathBuf,
        /// Color output: auto, always, never
        #[arg(long)]
        color: Option<String>,
    },
}

#[derive(Subcommand)]
enum DebugCommands {
    /// Dump a JSON-encoded IR module
    Ir {
        /// JSON-encoded IR module file
        input: PathBuf,
        /// Run the pass pipeline before dumping
        #[arg(long)]
        after_passes: bool,
    },
    /// Dump a compiled `.wrnc` object-module's decoded sections
    Module {
        /// Compiled `.wrnc` object-module artifact
        input: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(cmd) => dispatch(cmd),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

fn dispatch(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Build { inputs, out_dir, debug_info, color } =>
            commands::build::execute(inputs, out_dir, debug_info, color),

        Commands::Check { inputs, color } =>
            commands::check::execute(inputs, color),

        Commands::Debug { command } => match command {
            DebugCommands::Ir { input, after_passes } =>
                commands::debug::execute_ir(input, after_passes),
            DebugCommands::Module { input } =>
                commands::debug::execute_module(input),
        },

        Commands::Run { module, color } =>
            commands::run::execute(module, color),
    }
}
