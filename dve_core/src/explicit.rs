//! The explicit-state view of a [`DveSystem`]: a model together with the layout of its packed states.

use crate::{
    Definition, DveSystem, EvalContext, EvalError, Expression, Generator, ModelError, Node,
    PrintFlags, ProcessGid, State, StateGid, StateLayout, SyncMode, Value, VarGid,
    layout::{read_value, write_value},
    printer,
};
use log::info;

/// A consolidated model with its state layout, ready for state-space generation.
///
/// It is immutable and can be shared:
/// every thread exploring the state space spawns its own [`Generator`] through [`Definition::new_instance`].
#[derive(Debug, Clone)]
pub struct ExplicitSystem {
    system: DveSystem,
    layout: StateLayout,
    property_precomputable: bool,
}

impl ExplicitSystem {
    /// Compacts the expressions of `system` and lays out its states.
    pub fn new(mut system: DveSystem) -> Result<Self, ModelError> {
        let time = std::time::Instant::now();
        system.compact();
        let layout = StateLayout::compute(&system)?;
        let property_precomputable = system.property().is_some_and(|property| {
            !system.property_has_synchronization()
                && system.process(property).transitions().iter().all(|t| {
                    system
                        .transition(*t)
                        .effects()
                        .iter()
                        .all(|effect| reads_only_locals(&system, effect, property))
                })
        });
        info!("explicit system ready in {:?}", time.elapsed());
        Ok(Self {
            system,
            layout,
            property_precomputable,
        })
    }

    /// The underlying model.
    pub fn system(&self) -> &DveSystem {
        &self.system
    }

    /// The layout of packed states.
    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    /// Size of packed states in bytes.
    pub fn state_size(&self) -> usize {
        self.layout.size()
    }

    /// Upper bound on the number of successors of a state.
    pub fn max_successor_count(&self) -> usize {
        self.system.max_successor_count()
    }

    /// Whether the property process synchronizes on channels.
    pub fn property_has_synchronization(&self) -> bool {
        self.system.property_has_synchronization()
    }

    /// Whether the moves of the property process do not depend on the rest of the system,
    /// so that they can be computed once per state and copied into every successor.
    pub(crate) fn property_precomputable(&self) -> bool {
        self.property_precomputable
    }

    /// The initial state: initial values of variables, empty channels, initial control states.
    pub fn initial_state(&self) -> State {
        let mut state = State::zeroed(self.layout.size());
        for var in self.system.symbols().variables() {
            if let Some(offset) = self.layout.var_offset(var) {
                let var_type = self.system.symbols().variable_info(var).var_type;
                for (i, value) in self.system.initial_values(var).iter().enumerate() {
                    // Initial values have been checked against the type at consolidation.
                    write_value(&mut state, offset + i * var_type.width(), var_type, *value);
                }
            }
        }
        for process in self.system.processes() {
            self.set_process_state(&mut state, process.gid(), process.initial_state().unwrap_or_default());
        }
        state
    }

    /// The error state: all zeros, with the control field of the first process out of range.
    pub fn error_state(&self) -> State {
        let mut state = State::zeroed(self.layout.size());
        if let Some(first) = self.system.processes().first() {
            self.set_process_state(&mut state, first.gid(), first.state_count());
        }
        state
    }

    /// Whether `state` is the error state.
    pub fn is_erroneous(&self, state: &[u8]) -> bool {
        self.system
            .processes()
            .first()
            .is_some_and(|first| self.process_state(state, first.gid()) == first.state_count())
    }

    /// Whether some process is in a committed state.
    pub fn is_committed(&self, state: &[u8]) -> bool {
        self.system
            .processes()
            .iter()
            .any(|process| process.is_committed(self.process_state(state, process.gid())))
    }

    /// Process-local id of the control state of `process`.
    #[inline(always)]
    pub fn process_state(&self, state: &[u8], process: ProcessGid) -> usize {
        crate::layout::read_counter(state, self.layout.process_offset(process))
    }

    /// Sets the control state of `process`, by process-local id.
    #[inline(always)]
    pub fn set_process_state(&self, state: &mut [u8], process: ProcessGid, lid: usize) {
        crate::layout::write_counter(state, self.layout.process_offset(process), lid);
    }

    fn element_offset(&self, var: VarGid, index: usize) -> Result<Option<usize>, ModelError> {
        let symbols = self.system.symbols();
        if var.index() >= symbols.variable_count() {
            return Err(ModelError::MissingVar(var));
        }
        let info = symbols.variable_info(var);
        if index >= info.len() {
            return Err(ModelError::IndexOutOfBounds {
                var: symbols.variable(var).name().to_owned(),
                index,
            });
        }
        Ok(self
            .layout
            .var_offset(var)
            .map(|offset| offset + index * info.var_type.width()))
    }

    /// Value of a variable (element `index` for arrays, 0 for scalars).
    ///
    /// Constants are read from their initial values, and are 0 if they have none.
    pub fn variable_value(&self, state: &[u8], var: VarGid, index: usize) -> Result<Value, ModelError> {
        let var_type = self.system.symbols().variable_info(var).var_type;
        Ok(match self.element_offset(var, index)? {
            Some(offset) => read_value(state, offset, var_type),
            None => self
                .system
                .initial_values(var)
                .get(index)
                .copied()
                .unwrap_or_default(),
        })
    }

    /// Sets a variable (element `index` for arrays, 0 for scalars).
    ///
    /// Returns whether the value fitted the type of the variable; it is truncated otherwise.
    pub fn set_variable_value(
        &self,
        state: &mut [u8],
        var: VarGid,
        index: usize,
        value: Value,
    ) -> Result<bool, ModelError> {
        let offset = self.element_offset(var, index)?.ok_or_else(|| {
            ModelError::ConstantVariable(self.system.symbols().variable(var).name().to_owned())
        })?;
        let var_type = self.system.symbols().variable_info(var).var_type;
        Ok(write_value(state, offset, var_type, value))
    }

    /// The assertions of the current control states that do not hold in `state`.
    ///
    /// An assertion whose evaluation fails counts as violated.
    pub fn violated_assertions<'a>(&'a self, state: &'a [u8]) -> impl Iterator<Item = &'a Expression> + 'a {
        let view = StateView::new(self, state);
        self.system.processes().iter().flat_map(move |process| {
            process
                .assertions(self.process_state(state, process.gid()))
                .iter()
                .filter(move |assertion| {
                    let res = assertion.eval(&view);
                    res.error.is_some() || !res.holds()
                })
        })
    }

    /// Number of assertions violated in `state`.
    pub fn violated_assertion_count(&self, state: &[u8]) -> usize {
        self.violated_assertions(state).count()
    }

    /// Textual form of the `index`-th violated assertion: its source range and the expression.
    pub fn violated_assertion_string(&self, state: &[u8], index: usize) -> Option<String> {
        let assertion = self.violated_assertions(state).nth(index)?;
        let span = assertion.span().map(|span| span.to_string()).unwrap_or_default();
        Some(format!("{span}  {}", assertion.display(self.system.symbols())))
    }

    /// Human-readable rendering of `state`.
    pub fn format_state(&self, state: &[u8], flags: PrintFlags) -> String {
        printer::format_state(self, state, flags)
    }
}

impl Definition for ExplicitSystem {
    type I<'def> = Generator<'def>;

    fn new_instance<'def>(&'def self) -> Self::I<'def> {
        Generator::new(self)
    }
}

fn reads_only_locals(system: &DveSystem, expr: &Expression, process: ProcessGid) -> bool {
    let local = |var: VarGid| system.symbols().variable(var).process() == Some(process);
    match expr.node() {
        Node::Nat(_) => true,
        Node::Var { var, .. } => local(*var) || system.symbols().variable_info(*var).constant,
        Node::Index { var, index, .. } => {
            (local(*var) || system.symbols().variable_info(*var).constant)
                && reads_only_locals(system, index, process)
        }
        Node::Dot(_) => false,
        Node::Unary(_, arg) => reads_only_locals(system, arg, process),
        Node::Binary(_, left, right) => {
            reads_only_locals(system, left, process) && reads_only_locals(system, right, process)
        }
    }
}

/// Reads the values of expressions from a packed state.
#[derive(Clone, Copy)]
pub struct StateView<'a> {
    explicit: &'a ExplicitSystem,
    state: &'a [u8],
}

impl<'a> StateView<'a> {
    /// A view over `state`.
    pub fn new(explicit: &'a ExplicitSystem, state: &'a [u8]) -> Self {
        Self { explicit, state }
    }
}

impl EvalContext for StateView<'_> {
    #[inline(always)]
    fn variable(&self, var: VarGid) -> Result<Value, EvalError> {
        match self.explicit.layout.var_offset(var) {
            Some(offset) => Ok(read_value(
                self.state,
                offset,
                self.explicit.system.symbols().variable_info(var).var_type,
            )),
            None => self
                .explicit
                .system
                .initial_values(var)
                .first()
                .copied()
                .ok_or(EvalError::Uninitialized(var)),
        }
    }

    #[inline(always)]
    fn element(&self, var: VarGid, index: Value) -> Result<Value, EvalError> {
        let info = self.explicit.system.symbols().variable_info(var);
        let len = info.len();
        let idx = usize::try_from(index)
            .ok()
            .filter(|idx| *idx < len)
            .ok_or(EvalError::IndexOutOfBounds { index, len })?;
        match self.explicit.layout.var_offset(var) {
            Some(offset) => Ok(read_value(
                self.state,
                offset + idx * info.var_type.width(),
                info.var_type,
            )),
            None => self
                .explicit
                .system
                .initial_values(var)
                .get(idx)
                .copied()
                .ok_or(EvalError::Uninitialized(var)),
        }
    }

    #[inline(always)]
    fn in_state(&self, state: StateGid) -> Result<bool, EvalError> {
        let symbol = self.explicit.system.symbols().state(state);
        Ok(symbol
            .process()
            .is_some_and(|process| self.explicit.process_state(self.state, process) == symbol.lid()))
    }
}

/// Transitions of `process` that leave its current control state in `state` with the given synchronization,
/// whose guard holds or fails with an error.
/// Each is paired with the error flag of its guard.
pub(crate) fn passing<'a>(
    explicit: &'a ExplicitSystem,
    state: &'a [u8],
    process: ProcessGid,
    mode: SyncMode,
) -> impl Iterator<Item = (crate::TransitionGid, bool)> + 'a {
    let system = explicit.system();
    let control = explicit.process_state(state, process);
    let view = StateView::new(explicit, state);
    system
        .process(process)
        .transitions_by_sync(mode)
        .iter()
        .filter_map(move |gid| {
            let transition = system.transition(*gid);
            if transition.from_lid() != control {
                return None;
            }
            match transition.guard() {
                None => Some((*gid, false)),
                Some(guard) => {
                    let res = guard.eval(&view);
                    match res.error {
                        Some(_) => Some((*gid, true)),
                        None if res.holds() => Some((*gid, false)),
                        None => None,
                    }
                }
            }
        })
}
