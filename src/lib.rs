//! # DVE
//!
//! A model compiler and explicit-state successor generator
//! for the DVE modeling language[^1].
//!
//! Models are networks of extended finite-state processes
//! communicating through shared variables and channels.
//! This tool parses a DVE model, compiles it into a packed state layout,
//! and explores its state space one step at a time:
//!
//! - `validate` parses and consolidates the model;
//! - `print` writes the model back as DVE text;
//! - `info` summarizes the model and its state layout;
//! - `successors` shows the enabled transitions and successors of a state;
//! - `trace` performs a random walk and saves it in csv format.
//!
//! [^1]: Barnat, J., Brim, L., Černá, I., Moravec, P., Ročkai, P., & Šimeček, P. (2006).
//!     *DiVinE: A Tool for Distributed Verification*. CAV 2006.

mod report;
mod trace;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dve_core::{Definition, ExplicitSystem, PrintFlags};
use log::info;
use report::{InfoReport, SuccessorsReport};
use trace::TraceArgs;

/// How states are printed.
#[derive(Debug, Clone, Copy, clap::Args)]
#[deny(missing_docs)]
struct StateFormat {
    /// Print variable and channel names.
    #[arg(long)]
    var_names: bool,
    /// Print process names.
    #[arg(long)]
    process_names: bool,
    /// Print control state names instead of their numbers.
    #[arg(long)]
    state_names: bool,
    /// Print each process on its own line.
    #[arg(long)]
    multiline: bool,
}

impl StateFormat {
    fn flags(self) -> PrintFlags {
        let mut flags = PrintFlags::empty();
        flags.set(PrintFlags::VAR_NAMES, self.var_names);
        flags.set(PrintFlags::PROCESS_NAMES, self.process_names);
        flags.set(PrintFlags::STATE_NAMES, self.state_names);
        flags.set(PrintFlags::MULTILINE, self.multiline);
        flags
    }
}

/// Available commands.
#[deny(missing_docs)]
#[derive(Subcommand)]
enum Commands {
    /// Validate the syntactical and semantical correctness of the model, without running it.
    Validate,
    /// Print the model back in DVE syntax.
    Print,
    /// Print statistics about the model and its state layout.
    Info {
        /// Print JSON-serialized report.
        #[arg(long)]
        json: bool,
    },
    /// Print a state of the model, together with its enabled transitions and successors.
    ///
    /// The state is reached from the initial state
    /// by repeatedly following the successor with the given index.
    ///
    /// EXAMPLE: dve PATH/TO/MODEL successors
    /// EXAMPLE: dve PATH/TO/MODEL successors --path 0 2 1 --state-names
    #[clap(verbatim_doc_comment)]
    Successors {
        /// Successor indices to follow from the initial state.
        #[arg(long, num_args = 1..)]
        path: Vec<usize>,
        /// How to print states.
        #[clap(flatten)]
        format: StateFormat,
        /// Print JSON-serialized report.
        ///
        /// By default, a human-readable report is printed.
        #[arg(long)]
        json: bool,
    },
    /// Produce a random execution trace and save it in csv format.
    Trace(TraceArgs),
}

/// Explicit-state model compiler and successor generator for the DVE modeling language.
#[derive(Parser)]
#[deny(missing_docs)]
#[command(version, about, long_about)]
pub struct Cli {
    /// Path of the model's .dve file.
    #[arg(value_hint = clap::ValueHint::FilePath)]
    model: PathBuf,
    /// Verbose output
    #[command(flatten)]
    pub verbosity: clap_verbosity_flag::Verbosity,
    /// Actions to execute on the model.
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let model = self
            .model
            .file_name()
            .and_then(|os_str| os_str.to_str())
            .unwrap_or("model")
            .to_owned();

        eprint!("Processing model, please wait...");
        let system = dve_parser::load(&self.model)?;
        let explicit = ExplicitSystem::new(system)
            .with_context(|| format!("failed to compile model '{model}'"))?;
        eprintln!(" done");

        match self.command {
            Commands::Validate => println!("model '{model}' successfully validated"),
            Commands::Print => print!("{}", explicit.system()),
            Commands::Info { json } => InfoReport::new(model, &explicit).print(json)?,
            Commands::Successors { path, format, json } => {
                let mut generator = explicit.new_instance();
                let mut state = generator.initial_state();
                for (step, &index) in path.iter().enumerate() {
                    match generator.ith_successor(&state, index) {
                        (_, Some(next)) => state = next,
                        (_, None) => bail!(
                            "state at step {step} has no successor with index {index}\n\nHint: list successors with a shorter path"
                        ),
                    }
                }
                info!("followed a path of {} steps", path.len());
                SuccessorsReport::new(model, path, &mut generator, &state, format.flags())
                    .print(json)?;
            }
            Commands::Trace(args) => {
                eprint!("Trace computation in progress...");
                args.trace(&explicit)?;
                eprintln!(" done");
            }
        }
        Ok(())
    }
}

// From Clap tutorial <https://docs.rs/clap/latest/clap/_derive/_tutorial/index.html#testing>
#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}
