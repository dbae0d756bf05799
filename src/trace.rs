use anyhow::Context;
use clap::Parser;
use dve_core::{Definition, ExplicitSystem, State, Status};
use log::{info, warn};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use std::{fs::File, io::Write, path::PathBuf};

/// Produce a random execution trace.
#[derive(Debug, Clone, Parser)]
#[deny(missing_docs)]
pub(crate) struct TraceArgs {
    /// Max number of steps of the trace.
    #[arg(short, long, default_value_t = 1000)]
    pub(crate) steps: usize,
    /// Seed of the random choices.
    ///
    /// By default, the seed is taken from the operating system,
    /// so that every run produces a different trace.
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    /// File where to save the trace.
    ///
    /// By default, the trace is written on the standard output.
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub(crate) output: Option<PathBuf>,
}

impl TraceArgs {
    pub(crate) fn trace(&self, explicit: &ExplicitSystem) -> anyhow::Result<()> {
        let mut rng = match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let writer: Box<dyn Write> = match &self.output {
            Some(path) => Box::new(
                File::create(path)
                    .with_context(|| format!("failed to create file '{}'", path.display()))?,
            ),
            None => Box::new(std::io::stdout()),
        };
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(header(explicit))?;

        let mut generator = explicit.new_instance();
        let mut state = generator.initial_state();
        let mut succs = Vec::new();
        writer.write_record(record(explicit, 0, "", &state)?)?;
        for step in 1..=self.steps {
            let status = generator.successors(&state, &mut succs);
            if succs.is_empty() {
                if status.contains(Status::DEADLOCK) {
                    writer.write_record(record(explicit, step, "deadlock", &state)?)?;
                }
                info!("trace stopped after {} steps", step - 1);
                break;
            }
            let index = rng.random_range(0..succs.len());
            state = succs.swap_remove(index);
            if explicit.is_erroneous(&state) {
                warn!("trace reached the error state after {step} steps");
                writer.write_record(record(explicit, step, "error", &state)?)?;
                break;
            }
            writer.write_record(record(explicit, step, "", &state)?)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Column names: step and status, then variables, then the control state of each process.
fn header(explicit: &ExplicitSystem) -> Vec<String> {
    let symbols = explicit.system().symbols();
    let mut header = vec!["step".to_owned(), "status".to_owned()];
    let mut push_vars = |vars: &[dve_core::VarGid], prefix: &str| {
        for var in vars {
            let info = symbols.variable_info(*var);
            if info.constant {
                continue;
            }
            let name = symbols.variable(*var).name();
            match info.array {
                Some(len) => header.extend((0..len).map(|idx| format!("{prefix}{name}[{idx}]"))),
                None => header.push(format!("{prefix}{name}")),
            }
        }
    };
    push_vars(symbols.global_variables(), "");
    for process in explicit.system().processes() {
        let name = symbols.process(process.gid()).name();
        push_vars(process.vars(), &format!("{name}->"));
    }
    header.extend(
        explicit
            .system()
            .processes()
            .iter()
            .map(|process| symbols.process(process.gid()).name().to_owned()),
    );
    header
}

fn record(explicit: &ExplicitSystem, step: usize, status: &str, state: &State) -> anyhow::Result<Vec<String>> {
    let system = explicit.system();
    let symbols = system.symbols();
    let mut record = vec![step.to_string(), status.to_owned()];
    let vars = symbols
        .global_variables()
        .iter()
        .chain(system.processes().iter().flat_map(|process| process.vars()))
        .filter(|var| !symbols.variable_info(**var).constant);
    for var in vars {
        for idx in 0..symbols.variable_info(*var).len() {
            record.push(explicit.variable_value(state, *var, idx)?.to_string());
        }
    }
    for process in system.processes() {
        let lid = explicit.process_state(state, process.gid());
        let name = process
            .states()
            .get(lid)
            .map(|state| symbols.state(*state).name().to_owned())
            .unwrap_or_else(|| "ERR".to_owned());
        record.push(name);
    }
    Ok(record)
}
