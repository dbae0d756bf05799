use dve_core::{DveSystem, ExplicitSystem, Generator, PrintFlags, Status, Synchronicity, TransitionGid};
use serde::Serialize;
use std::fmt::Display;

fn print_report<R: Serialize + Display>(report: &R, json: bool) -> anyhow::Result<()> {
    if json {
        let report = serde_json::ser::to_string_pretty(report)?;
        println!("{report}");
    } else {
        println!("{report}");
    }
    Ok(())
}

fn status_name(status: Status) -> String {
    if status.is_empty() {
        "normal".to_owned()
    } else {
        status
            .iter_names()
            .map(|(name, _)| name.to_lowercase())
            .collect::<Vec<_>>()
            .join("|")
    }
}

fn transition_name(system: &DveSystem, transition: TransitionGid) -> String {
    let transition = system.transition(transition);
    let symbols = system.symbols();
    format!(
        "{}: {} -> {}",
        symbols.process(transition.process()).name(),
        symbols.state(transition.from()).name(),
        symbols.state(transition.to()).name()
    )
}

#[derive(Serialize)]
pub(crate) struct ProcessReport {
    pub(crate) name: String,
    pub(crate) states: usize,
    pub(crate) transitions: usize,
    pub(crate) offset: usize,
    pub(crate) property: bool,
}

#[derive(Serialize)]
pub(crate) struct InfoReport {
    pub(crate) model: String,
    pub(crate) synchronous: bool,
    pub(crate) variables: usize,
    pub(crate) channels: usize,
    pub(crate) transitions: usize,
    pub(crate) processes: Vec<ProcessReport>,
    pub(crate) state_size: usize,
    pub(crate) global_size: usize,
    pub(crate) max_successors: usize,
    pub(crate) property_synchronization: bool,
}

impl InfoReport {
    pub(crate) fn new(model: String, explicit: &ExplicitSystem) -> Self {
        let system = explicit.system();
        let symbols = system.symbols();
        let processes = system
            .processes()
            .iter()
            .map(|process| ProcessReport {
                name: symbols.process(process.gid()).name().to_owned(),
                states: process.state_count(),
                transitions: process.transitions().len(),
                offset: explicit.layout().process_offset(process.gid()),
                property: system.property() == Some(process.gid()),
            })
            .collect();
        Self {
            model,
            synchronous: system.synchronicity() == Synchronicity::Sync,
            variables: symbols.variable_count(),
            channels: symbols.channel_count(),
            transitions: system.transitions().len(),
            processes,
            state_size: explicit.state_size(),
            global_size: explicit.layout().global_size(),
            max_successors: explicit.max_successor_count(),
            property_synchronization: explicit.property_has_synchronization(),
        }
    }

    pub(crate) fn print(&self, json: bool) -> anyhow::Result<()> {
        print_report(self, json)
    }
}

impl Display for InfoReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let semantics = if self.synchronous {
            "synchronous"
        } else {
            "asynchronous"
        };
        writeln!(f, "Model {} ({semantics})", self.model)?;
        writeln!(
            f,
            "{} variables, {} channels, {} transitions",
            self.variables, self.channels, self.transitions
        )?;
        writeln!(
            f,
            "State size: {} bytes ({} global)",
            self.state_size, self.global_size
        )?;
        writeln!(f, "At most {} successors per state", self.max_successors)?;
        for process in &self.processes {
            write!(
                f,
                "Process {} at offset {}: {} states, {} transitions",
                process.name, process.offset, process.states, process.transitions
            )?;
            if process.property {
                if self.property_synchronization {
                    write!(f, " (property, synchronizing)")?;
                } else {
                    write!(f, " (property)")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub(crate) struct SuccessorReport {
    pub(crate) transitions: Vec<String>,
    pub(crate) status: String,
    pub(crate) state: String,
}

#[derive(Serialize)]
pub(crate) struct SuccessorsReport {
    pub(crate) model: String,
    pub(crate) path: Vec<usize>,
    pub(crate) state: String,
    pub(crate) status: String,
    pub(crate) committed: bool,
    pub(crate) violated_assertions: Vec<String>,
    pub(crate) successors: Vec<SuccessorReport>,
}

impl SuccessorsReport {
    pub(crate) fn new(
        model: String,
        path: Vec<usize>,
        generator: &mut Generator<'_>,
        state: &[u8],
        flags: PrintFlags,
    ) -> Self {
        let explicit = generator.system();
        let system = explicit.system();
        let (status, enabled) = generator.enabled_transitions(state);
        let enabled = enabled.clone();
        let successors = enabled
            .iter()
            .map(|trans| {
                let (status, next) = generator.successor(state, trans);
                SuccessorReport {
                    transitions: trans
                        .transitions()
                        .iter()
                        .map(|gid| transition_name(system, *gid))
                        .collect(),
                    status: status_name(status),
                    state: explicit.format_state(&next, flags),
                }
            })
            .collect();
        let violated_assertions = (0..explicit.violated_assertion_count(state))
            .filter_map(|idx| explicit.violated_assertion_string(state, idx))
            .collect();
        Self {
            model,
            path,
            state: explicit.format_state(state, flags),
            status: status_name(status),
            committed: explicit.is_committed(state),
            violated_assertions,
            successors,
        }
    }

    pub(crate) fn print(&self, json: bool) -> anyhow::Result<()> {
        print_report(self, json)
    }
}

impl Display for SuccessorsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "State of {} after path {:?} ({}{})",
            self.model,
            self.path,
            self.status,
            if self.committed { ", committed" } else { "" }
        )?;
        writeln!(f, "{}", self.state)?;
        for assertion in &self.violated_assertions {
            writeln!(f, "Violated assertion {assertion}")?;
        }
        write!(f, "{} successors", self.successors.len())?;
        for (idx, succ) in self.successors.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "{idx}: {} ({})", succ.transitions.join(" | "), succ.status)?;
            write!(f, "{}", succ.state)?;
        }
        Ok(())
    }
}
