//! The model of a DVE system, and the builder used by front-ends to construct it.

use crate::{
    ChannelGid, ChannelInfo, Diagnostics, EvalContext, EvalError, Expression, Process, ProcessGid,
    SourceSpan, StateGid, SymbolTable, SyncMode, Transition, TransitionGid, Value, VarGid,
    VariableInfo,
};
use log::{debug, info};
use thiserror::Error;

/// Consistency errors of a model, detected while consolidating it or laying out its states.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A model needs at least one process.
    #[error("the system has no processes")]
    NoProcesses,
    /// A process was referenced (e.g., by `P.s`) but never declared.
    #[error("process {0} was referenced, but was not declared")]
    UndeclaredProcess(String),
    /// A state was referenced (e.g., by `P.s`) but never declared.
    #[error("state {process}.{state} was referenced, but was not declared")]
    UndeclaredState {
        /// Name of the process.
        process: String,
        /// Name of the state.
        state: String,
    },
    /// A process without initial state.
    #[error("process {0} has no initial state")]
    MissingInitialState(String),
    /// A transition whose states do not belong to its process.
    #[error("transition of process {0} connects states of another process")]
    ForeignState(String),
    /// The property process is not a process of the model.
    #[error("property process {0:?} does not exist")]
    MissingProperty(ProcessGid),
    /// A synchronized transition on an unknown channel.
    #[error("channel {0:?} does not exist")]
    MissingChannel(ChannelGid),
    /// An initializer whose value does not fit the type of the variable.
    #[error("expression {expr} exceeded bounds of type of variable {var}")]
    InitializerOutOfBounds {
        /// Name of the variable.
        var: String,
        /// The initializer.
        expr: String,
    },
    /// An initializer that could not be evaluated.
    #[error("error when evaluating the expression {expr}")]
    InitializerEval {
        /// The initializer.
        expr: String,
        /// The error.
        #[source]
        source: EvalError,
    },
    /// A global-usage mask whose length differs from the number of global variables.
    #[error("global mask of transition {transition:?} has {found} bits instead of {expected}")]
    GlobalMaskMismatch {
        /// The transition.
        transition: TransitionGid,
        /// Number of global variables.
        expected: usize,
        /// Length of the mask.
        found: usize,
    },
    /// A process with too many states for its control field.
    #[error("process {0} has too many states")]
    TooManyStates(String),
    /// Access to a variable that does not exist.
    #[error("variable {0:?} does not exist")]
    MissingVar(VarGid),
    /// Write access to a constant.
    #[error("variable {0} is a constant")]
    ConstantVariable(String),
    /// Access to an array element out of bounds.
    #[error("index {index} is out of the bounds of {var}")]
    IndexOutOfBounds {
        /// Name of the array.
        var: String,
        /// The index.
        index: usize,
    },
}

/// Whether processes interleave or move in lock-step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Synchronicity {
    /// Interleaving semantics, with handshake and buffered communication.
    #[default]
    Async,
    /// Every process moves at every step.
    Sync,
}

/// Defines and builds a [`DveSystem`].
///
/// Front-ends declare symbols and push processes and transitions in source order,
/// then call [`SystemBuilder::build`] to consolidate the model.
#[derive(Debug, Default, Clone)]
pub struct SystemBuilder {
    symbols: SymbolTable,
    processes: Vec<Process>,
    transitions: Vec<Transition>,
    synchronicity: Synchronicity,
    property: Option<ProcessGid>,
}

impl SystemBuilder {
    /// Creates a builder for an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// The symbol table of the model under construction.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Mutable access to the symbol table.
    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// Declares a variable, global if `process` is `None`.
    pub fn add_variable(
        &mut self,
        name: &str,
        process: Option<ProcessGid>,
        info: VariableInfo,
        span: Option<SourceSpan>,
    ) -> VarGid {
        let var = self.symbols.add_variable(name, process, info, span);
        if let Some(process) = process {
            self.processes[process.index()].vars.push(var);
        }
        debug!("declared variable {name} ({var:?})");
        var
    }

    /// Declares a channel.
    pub fn add_channel(&mut self, name: &str, info: ChannelInfo, span: Option<SourceSpan>) -> ChannelGid {
        let channel = self.symbols.add_channel(name, info, span);
        debug!("declared channel {name} ({channel:?})");
        channel
    }

    /// Declares a process, possibly only provisionally (`valid == false`).
    pub fn add_process(&mut self, name: &str, span: Option<SourceSpan>, valid: bool) -> ProcessGid {
        let process = self.symbols.add_process(name, span, valid);
        self.processes.push(Process::new(process));
        debug!("declared process {name} ({process:?})");
        process
    }

    /// Declares a control state of `process`, possibly only provisionally (`valid == false`).
    pub fn add_state(&mut self, name: &str, process: ProcessGid, span: Option<SourceSpan>, valid: bool) -> StateGid {
        let state = self.symbols.add_state(name, process, span, valid);
        self.processes[process.index()].add_state(state);
        state
    }

    /// A process of the model under construction.
    pub fn process(&self, process: ProcessGid) -> &Process {
        &self.processes[process.index()]
    }

    /// Mutable access to a process.
    pub fn process_mut(&mut self, process: ProcessGid) -> &mut Process {
        &mut self.processes[process.index()]
    }

    /// A transition already added to the model.
    pub fn transition(&self, transition: TransitionGid) -> &Transition {
        &self.transitions[transition.index()]
    }

    /// Adds a transition to its process.
    ///
    /// Fails if the states of the transition are not states of its process.
    pub fn add_transition(&mut self, mut transition: Transition) -> Result<TransitionGid, ModelError> {
        let process = self
            .processes
            .get_mut(transition.process.index())
            .ok_or_else(|| ModelError::ForeignState(format!("{:?}", transition.process)))?;
        let owns = |(state, lid): (StateGid, usize)| process.states.get(lid) == Some(&state);
        if !owns(transition.from) || !owns(transition.to) {
            return Err(ModelError::ForeignState(
                self.symbols.process(transition.process).name().to_owned(),
            ));
        }
        if let Some(channel) = transition.channel {
            if channel.index() >= self.symbols.channel_count() {
                return Err(ModelError::MissingChannel(channel));
            }
        }
        let gid = TransitionGid(self.transitions.len() as u32);
        transition.gid = gid;
        transition.lid = process.transitions.len();
        transition.partial_id = process.by_sync[transition.sync as usize].len();
        process.transitions.push(gid);
        process.by_sync[transition.sync as usize].push(gid);
        debug!("added transition {gid:?} of process {:?}", transition.process);
        self.transitions.push(transition);
        Ok(gid)
    }

    /// Sets the synchronicity of the system.
    pub fn set_synchronicity(&mut self, synchronicity: Synchronicity) {
        self.synchronicity = synchronicity;
    }

    /// Sets the property process.
    pub fn set_property(&mut self, property: Option<ProcessGid>) {
        self.property = property;
    }

    /// Consolidates the model:
    /// checks that every referenced symbol has been declared,
    /// computes the global-usage masks of transitions,
    /// and evaluates the initial values of all variables.
    pub fn build(self, diagnostics: &mut Diagnostics) -> Result<DveSystem, ModelError> {
        let time = std::time::Instant::now();
        let Self {
            symbols,
            processes,
            mut transitions,
            synchronicity,
            property,
        } = self;

        if processes.is_empty() {
            return Err(ModelError::NoProcesses);
        }
        if let Some(property) = property {
            if property.index() >= processes.len() {
                return Err(ModelError::MissingProperty(property));
            }
        }
        for process in &processes {
            let symbol = symbols.process(process.gid);
            if !symbol.is_valid() {
                return Err(ModelError::UndeclaredProcess(symbol.name().to_owned()));
            }
            if let Some(state) = process.states.iter().find(|s| !symbols.state(**s).is_valid()) {
                return Err(ModelError::UndeclaredState {
                    process: symbol.name().to_owned(),
                    state: symbols.state(*state).name().to_owned(),
                });
            }
            if process.initial.is_none() {
                return Err(ModelError::MissingInitialState(symbol.name().to_owned()));
            }
            // The error state stores the state count in the control field.
            if process.states.len() >= u16::MAX as usize {
                return Err(ModelError::TooManyStates(symbol.name().to_owned()));
            }
        }

        let glob_count = symbols.global_variables().len();
        for transition in transitions.iter_mut() {
            let mut mask = vec![false; glob_count];
            for var in transition.written_vars() {
                let symbol = symbols.variable(var);
                if symbol.process().is_none() {
                    mask[symbol.lid()] = true;
                }
            }
            transition.glob_mask = mask;
        }

        let mut channel_freq = vec![(0, 0); symbols.channel_count()];
        for transition in &transitions {
            if let Some(channel) = transition.channel {
                match transition.sync {
                    SyncMode::Send => channel_freq[channel.index()].0 += 1,
                    SyncMode::Receive => channel_freq[channel.index()].1 += 1,
                    _ => {}
                }
            }
        }
        for channel in symbols.channels() {
            if !transitions.iter().any(|t| t.channel == Some(channel)) {
                let symbol = symbols.channel(channel);
                diagnostics.warn(symbol.span(), format!("channel {} is never used", symbol.name()));
            }
        }

        let initial_states = processes
            .iter()
            .map(|p| p.initial.unwrap_or_default())
            .collect::<Vec<_>>();
        let mut initial_values: Vec<Vec<Value>> = Vec::with_capacity(symbols.variable_count());
        for var in symbols.variables() {
            let symbol = symbols.variable(var);
            let info = symbols.variable_info(var);
            if info.init.len() > info.len() {
                diagnostics.warn(
                    symbol.span(),
                    format!(
                        "array {} has {} initializers but only {} elements, the rest is ignored",
                        symbol.name(),
                        info.init.len(),
                        info.len()
                    ),
                );
            }
            let ctx = InitialContext {
                symbols: &symbols,
                values: &initial_values,
                initial_states: &initial_states,
            };
            let mut values = Vec::with_capacity(info.init.len().min(info.len()));
            for expr in info.init.iter().take(info.len()) {
                let res = expr.eval_tree(&ctx);
                if let Some(source) = res.error {
                    return Err(ModelError::InitializerEval {
                        expr: expr.display(&symbols).to_string(),
                        source,
                    });
                }
                if !info.var_type.contains(res.value) {
                    return Err(ModelError::InitializerOutOfBounds {
                        var: symbol.name().to_owned(),
                        expr: expr.display(&symbols).to_string(),
                    });
                }
                values.push(res.value);
            }
            initial_values.push(values);
        }

        let system = DveSystem {
            symbols,
            processes,
            transitions,
            synchronicity,
            property,
            initial_values,
            channel_freq,
        };
        info!(
            "create DVE system with:\n{} processes\n{} variables\n{} channels\n{} transitions",
            system.processes.len(),
            system.symbols.variable_count(),
            system.symbols.channel_count(),
            system.transitions.len(),
        );
        info!("consolidation completed in {:?}", time.elapsed());
        Ok(system)
    }
}

/// Readers for the evaluation of initializers, before any state exists.
struct InitialContext<'a> {
    symbols: &'a SymbolTable,
    // Initial values of the variables preceding the one being initialized.
    values: &'a [Vec<Value>],
    initial_states: &'a [usize],
}

impl EvalContext for InitialContext<'_> {
    fn variable(&self, var: VarGid) -> Result<Value, EvalError> {
        self.values
            .get(var.index())
            .and_then(|values| values.first().copied())
            .ok_or(EvalError::Uninitialized(var))
    }

    fn element(&self, var: VarGid, index: Value) -> Result<Value, EvalError> {
        let len = self
            .symbols
            .variable_info(var)
            .len();
        let idx = usize::try_from(index)
            .ok()
            .filter(|idx| *idx < len)
            .ok_or(EvalError::IndexOutOfBounds { index, len })?;
        self.values
            .get(var.index())
            .and_then(|values| values.get(idx).copied())
            .ok_or(EvalError::Uninitialized(var))
    }

    fn in_state(&self, state: StateGid) -> Result<bool, EvalError> {
        let symbol = self.symbols.state(state);
        let process = symbol.process().map(ProcessGid::index).unwrap_or_default();
        Ok(self.initial_states.get(process) == Some(&symbol.lid()))
    }
}

/// A consolidated DVE model.
#[derive(Debug, Clone, PartialEq)]
pub struct DveSystem {
    pub(crate) symbols: SymbolTable,
    pub(crate) processes: Vec<Process>,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) synchronicity: Synchronicity,
    pub(crate) property: Option<ProcessGid>,
    pub(crate) initial_values: Vec<Vec<Value>>,
    pub(crate) channel_freq: Vec<(usize, usize)>,
}

impl DveSystem {
    /// The symbol table.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// All processes.
    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    /// A process.
    pub fn process(&self, process: ProcessGid) -> &Process {
        &self.processes[process.index()]
    }

    /// All transitions, indexed by [`TransitionGid`].
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// A transition.
    pub fn transition(&self, transition: TransitionGid) -> &Transition {
        &self.transitions[transition.index()]
    }

    /// The synchronicity of the system.
    pub fn synchronicity(&self) -> Synchronicity {
        self.synchronicity
    }

    /// The property process, if any.
    pub fn property(&self) -> Option<ProcessGid> {
        self.property
    }

    /// Whether any transition of the property process synchronizes on a channel.
    pub fn property_has_synchronization(&self) -> bool {
        self.property.is_some_and(|property| {
            self.process(property)
                .transitions
                .iter()
                .any(|t| self.transition(*t).sync != SyncMode::NoSync)
        })
    }

    /// Initial values of a variable: at most one for scalars, up to the length for arrays.
    /// Missing values mean the variable has no initializer.
    pub fn initial_values(&self, var: VarGid) -> &[Value] {
        &self.initial_values[var.index()]
    }

    /// Number of handshake transitions (sends plus receives) using a channel.
    pub fn channel_frequency(&self, channel: ChannelGid) -> usize {
        let (sends, receives) = self.channel_freq[channel.index()];
        sends + receives
    }

    /// Upper bound on the number of successors of any state in interleaving semantics.
    pub fn max_successor_count(&self) -> usize {
        let mut count = self.transitions.len();
        for channel in self.symbols.channels() {
            let freq = self.channel_frequency(channel);
            if freq > 1 {
                count += freq * freq - 1;
            }
        }
        if let Some(property) = self.property {
            count *= self.process(property).transitions.len().max(1);
        }
        count
    }

    /// Builds the compacted encoding of all guards, synchronization values and effects.
    pub fn compact(&mut self) {
        for transition in self.transitions.iter_mut() {
            transition.exprs_mut().for_each(Expression::compact);
        }
        for process in self.processes.iter_mut() {
            process
                .assertions
                .iter_mut()
                .flatten()
                .for_each(Expression::compact);
        }
    }
}
