//! Computation of enabled transitions and successor states.
//!
//! A [`Generator`] borrows an [`ExplicitSystem`] and owns the scratch buffers reused across calls,
//! so a single generator must not be shared between threads:
//! every worker spawns its own through [`Definition::new_instance`](crate::Definition::new_instance).
//!
//! In interleaving semantics an enabled transition is one of:
//!
//! - a single transition of a process (unsynchronized or on a channel buffer);
//! - a handshake, i.e., a send and a receive of different processes on the same channel;
//!
//! possibly composed with a transition of the property process.
//! In synchronous semantics, it is a choice of one transition for every process.

mod synchronous;

use crate::{
    EvalError, ExplicitSystem, Expression, Node, ProcessGid, State, Status, SyncMode,
    Synchronicity, Transition, TransitionGid, VarType,
    explicit::{StateView, passing},
    layout::{COUNTER_WIDTH, read_counter, read_value, write_counter, write_value},
};
use log::trace;
use smallvec::{SmallVec, smallvec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Single,
    Handshake,
    WithProperty,
    HandshakeWithProperty,
    PropertyOnly,
    Synchronous,
}

/// A set of transitions firing together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnabledTrans {
    transitions: SmallVec<[TransitionGid; 4]>,
    shape: Shape,
    erroneous: bool,
}

impl EnabledTrans {
    fn single(transition: TransitionGid, erroneous: bool) -> Self {
        Self {
            transitions: smallvec![transition],
            shape: Shape::Single,
            erroneous,
        }
    }

    fn handshake(sender: TransitionGid, receiver: TransitionGid, erroneous: bool) -> Self {
        Self {
            transitions: smallvec![sender, receiver],
            shape: Shape::Handshake,
            erroneous,
        }
    }

    fn with_property(&self, property: TransitionGid, erroneous: bool) -> Self {
        let mut transitions = self.transitions.clone();
        transitions.push(property);
        Self {
            transitions,
            shape: match self.shape {
                Shape::Handshake => Shape::HandshakeWithProperty,
                _ => Shape::WithProperty,
            },
            erroneous: self.erroneous || erroneous,
        }
    }

    fn property_only(property: TransitionGid, erroneous: bool) -> Self {
        Self {
            transitions: smallvec![property],
            shape: Shape::PropertyOnly,
            erroneous,
        }
    }

    fn synchronous(transitions: SmallVec<[TransitionGid; 4]>, erroneous: bool) -> Self {
        Self {
            transitions,
            shape: Shape::Synchronous,
            erroneous,
        }
    }

    /// All the transitions of the set, in firing order.
    /// In synchronous semantics, one transition per process, in process order.
    pub fn transitions(&self) -> &[TransitionGid] {
        &self.transitions
    }

    /// The single transition, or the sender of a handshake.
    /// `None` when only the property process moves, and in synchronous semantics.
    pub fn sender_or_normal(&self) -> Option<TransitionGid> {
        match self.shape {
            Shape::PropertyOnly | Shape::Synchronous => None,
            _ => Some(self.transitions[0]),
        }
    }

    /// The receiver of a handshake.
    pub fn receiver(&self) -> Option<TransitionGid> {
        match self.shape {
            Shape::Handshake | Shape::HandshakeWithProperty => Some(self.transitions[1]),
            _ => None,
        }
    }

    /// The transition of the property process, fired after the others.
    /// It may be the receiver of a handshake with the sender.
    pub fn property(&self) -> Option<TransitionGid> {
        match self.shape {
            Shape::WithProperty => Some(self.transitions[1]),
            Shape::HandshakeWithProperty => Some(self.transitions[2]),
            Shape::PropertyOnly => Some(self.transitions[0]),
            _ => None,
        }
    }

    /// Whether firing leads to the error state,
    /// because a guard failed with an error or because of conflicting writes.
    pub fn is_erroneous(&self) -> bool {
        self.erroneous
    }

    /// Whether the set moves every process at once.
    pub fn is_synchronous(&self) -> bool {
        self.shape == Shape::Synchronous
    }
}

/// The enabled transitions of a state.
#[derive(Debug, Clone, Default)]
pub struct EnabledTransitions {
    list: Vec<EnabledTrans>,
    property_succ_count: usize,
    next_begin: Vec<usize>,
}

impl EnabledTransitions {
    fn clear(&mut self, processes: usize) {
        self.list.clear();
        self.property_succ_count = 0;
        self.next_begin.clear();
        self.next_begin.resize(processes, 0);
    }

    /// Number of enabled transitions, i.e., of successors.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether nothing is enabled.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// The `index`-th enabled transition.
    pub fn get(&self, index: usize) -> Option<&EnabledTrans> {
        self.list.get(index)
    }

    /// Iterates over the enabled transitions, in successor order.
    pub fn iter(&self) -> impl Iterator<Item = &EnabledTrans> {
        self.list.iter()
    }

    /// Number of enabled transitions of the property process.
    pub fn property_successor_count(&self) -> usize {
        self.property_succ_count
    }

    /// Position of the first enabled transition after those started by `process`
    /// (interleaving semantics only).
    pub fn next_begin(&self, process: ProcessGid) -> usize {
        self.next_begin.get(process.index()).copied().unwrap_or_default()
    }
}

/// Computes enabled transitions and successors of states of an [`ExplicitSystem`].
#[derive(Debug)]
pub struct Generator<'a> {
    explicit: &'a ExplicitSystem,
    pending: Vec<Vec<TransitionGid>>,
    channel_errors: Vec<bool>,
    property_trans: Vec<(TransitionGid, bool)>,
    enabled: EnabledTransitions,
    // Synchronous semantics: local successors of every process, and the choice of each enabled set.
    local: Vec<Vec<(TransitionGid, Option<State>)>>,
    choices: Vec<usize>,
}

impl<'a> Generator<'a> {
    /// Creates a generator for `explicit`.
    pub fn new(explicit: &'a ExplicitSystem) -> Self {
        let channels = explicit.system().symbols().channel_count();
        Self {
            explicit,
            pending: vec![Vec::new(); channels],
            channel_errors: vec![false; channels],
            property_trans: Vec::new(),
            enabled: EnabledTransitions::default(),
            local: Vec::new(),
            choices: Vec::new(),
        }
    }

    /// The system whose states are generated.
    pub fn system(&self) -> &'a ExplicitSystem {
        self.explicit
    }

    /// The initial state.
    pub fn initial_state(&self) -> State {
        self.explicit.initial_state()
    }

    /// Computes the enabled transitions of `state`.
    ///
    /// The status has [`Status::DEADLOCK`] if the system cannot move,
    /// and [`Status::ERROR`] if some enabled transition leads to the error state.
    pub fn enabled_transitions(&mut self, state: &[u8]) -> (Status, &EnabledTransitions) {
        let status = self.compute_enabled(state);
        (status, &self.enabled)
    }

    fn compute_enabled(&mut self, state: &[u8]) -> Status {
        let mut status = match self.explicit.system().synchronicity() {
            Synchronicity::Async => self.compute_async(state),
            Synchronicity::Sync => self.compute_sync(state),
        };
        if self.enabled.iter().any(EnabledTrans::is_erroneous) {
            status |= Status::ERROR;
        }
        status
    }

    /// Computes all successors of `state` into `succs`, in the order of its enabled transitions.
    pub fn successors(&mut self, state: &[u8], succs: &mut Vec<State>) -> Status {
        succs.clear();
        let status = self.compute_enabled(state);
        match self.explicit.system().synchronicity() {
            Synchronicity::Async => self.async_successors(state, succs, status),
            Synchronicity::Sync => self.sync_successors(state, succs, status),
        }
    }

    /// The successor of `state` through `enabled`.
    pub fn successor(&self, state: &[u8], enabled: &EnabledTrans) -> (Status, State) {
        let next = if enabled.is_synchronous() {
            self.fire_synchronous(state, enabled)
        } else {
            self.fire(state, enabled, true)
        };
        match next {
            Some(next) => (Status::NORMAL, next),
            None => (Status::ERROR, self.explicit.error_state()),
        }
    }

    /// The `index`-th successor of `state`, if it exists.
    pub fn ith_successor(&mut self, state: &[u8], index: usize) -> (Status, Option<State>) {
        let status = self.compute_enabled(state) & Status::DEADLOCK;
        match self.enabled.get(index) {
            Some(enabled) => {
                let (succ_status, next) = self.successor(state, enabled);
                (status | succ_status, Some(next))
            }
            None => (status, None),
        }
    }

    fn compute_async(&mut self, state: &[u8]) -> Status {
        let explicit = self.explicit;
        let system = explicit.system();
        self.enabled.clear(system.processes().len());
        self.pending.iter_mut().for_each(Vec::clear);
        self.channel_errors.fill(false);
        self.property_trans.clear();

        let property = system.property();
        let only_committed = explicit.is_committed(state);
        let gate = |process: ProcessGid| {
            !only_committed
                || system
                    .process(process)
                    .is_committed(explicit.process_state(state, process))
        };

        if let Some(property) = property {
            self.property_trans
                .extend(passing(explicit, state, property, SyncMode::NoSync));
        }

        for process in system.processes().iter().map(|p| p.gid()).filter(|p| gate(*p)) {
            for (receiver, error) in passing(explicit, state, process, SyncMode::Receive) {
                if let Some(channel) = system.transition(receiver).channel() {
                    self.pending[channel.index()].push(receiver);
                    self.channel_errors[channel.index()] |= error;
                }
            }
        }

        for process in system.processes().iter().map(|p| p.gid()) {
            if Some(process) != property && gate(process) {
                for (transition, error) in passing(explicit, state, process, SyncMode::NoSync) {
                    self.push_enabled(EnabledTrans::single(transition, error));
                }
                for (transition, error) in passing(explicit, state, process, SyncMode::BufferedReceive) {
                    if self.buffer(state, system.transition(transition)).is_some_and(|(count, _)| count > 0) {
                        self.push_enabled(EnabledTrans::single(transition, error));
                    }
                }
                for (transition, error) in passing(explicit, state, process, SyncMode::BufferedSend) {
                    if self
                        .buffer(state, system.transition(transition))
                        .is_some_and(|(count, capacity)| count < capacity)
                    {
                        self.push_enabled(EnabledTrans::single(transition, error));
                    }
                }
                for (sender, error) in passing(explicit, state, process, SyncMode::Send) {
                    let Some(channel) = system.transition(sender).channel() else {
                        continue;
                    };
                    let error = error || self.channel_errors[channel.index()];
                    for idx in 0..self.pending[channel.index()].len() {
                        let receiver = self.pending[channel.index()][idx];
                        let receiving = system.transition(receiver).process();
                        if receiving == process {
                            continue;
                        }
                        if Some(receiving) == property {
                            // The property moves by receiving, after the sender.
                            self.enabled
                                .list
                                .push(EnabledTrans::single(sender, false).with_property(receiver, error));
                        } else {
                            let conflict = self.conflict(sender, receiver);
                            self.push_enabled(EnabledTrans::handshake(sender, receiver, error || conflict));
                        }
                    }
                }
            }
            self.enabled.next_begin[process.index()] = self.enabled.list.len();
        }

        let mut status = Status::NORMAL;
        if self.enabled.list.is_empty() {
            match property {
                Some(_) if !self.property_trans.is_empty() => {
                    status |= Status::DEADLOCK;
                    self.enabled.list.extend(
                        self.property_trans
                            .iter()
                            .map(|(transition, error)| EnabledTrans::property_only(*transition, *error)),
                    );
                }
                Some(_) => {}
                None => status |= Status::DEADLOCK,
            }
        }
        self.enabled.property_succ_count = self.property_trans.len();
        trace!("{} enabled transitions", self.enabled.len());
        status
    }

    // Composes with every enabled transition of the property process, if there is one.
    fn push_enabled(&mut self, enabled: EnabledTrans) {
        if self.explicit.system().property().is_some() {
            for (transition, error) in &self.property_trans {
                self.enabled.list.push(enabled.with_property(*transition, *error));
            }
        } else {
            self.enabled.list.push(enabled);
        }
    }

    fn conflict(&self, first: TransitionGid, second: TransitionGid) -> bool {
        let layout = self.explicit.layout();
        layout
            .glob_filter(first)
            .iter()
            .zip(layout.glob_filter(second))
            .any(|(a, b)| a & b != 0)
    }

    // Occupancy and capacity of the buffer of the channel of `transition`.
    fn buffer(&self, state: &[u8], transition: &Transition) -> Option<(usize, usize)> {
        let channel = transition.channel()?;
        let offset = self.explicit.layout().channel_offset(channel)?;
        let capacity = self.explicit.system().symbols().channel_info(channel).capacity;
        Some((read_counter(state, offset), capacity))
    }

    fn async_successors(&self, state: &[u8], succs: &mut Vec<State>, mut status: Status) -> Status {
        let explicit = self.explicit;
        let psc = self.enabled.property_succ_count;
        let region = explicit
            .system()
            .property()
            .filter(|_| explicit.property_precomputable() && psc > 0)
            .map(|property| explicit.layout().process_region(property));
        for (idx, enabled) in self.enabled.iter().enumerate() {
            let next = match &region {
                // The move of the property only depends on its own region: reuse it.
                Some(region) if idx >= psc && enabled.property().is_some() => {
                    let donor = &succs[idx % psc];
                    if explicit.is_erroneous(donor) {
                        self.fire(state, enabled, true)
                    } else {
                        self.fire(state, enabled, false).map(|mut next| {
                            next[region.clone()].copy_from_slice(&donor[region.clone()]);
                            next
                        })
                    }
                }
                _ => self.fire(state, enabled, true),
            };
            succs.push(next.unwrap_or_else(|| {
                status |= Status::ERROR;
                explicit.error_state()
            }));
        }
        status
    }

    // Fires an interleaving set, returning `None` for the error state.
    fn fire(&self, state: &[u8], enabled: &EnabledTrans, with_property: bool) -> Option<State> {
        if enabled.erroneous {
            return None;
        }
        let mut next = State::from(state.to_vec());
        match self.apply(state, &mut next, enabled, with_property) {
            Ok(()) => Some(next),
            Err(err) => {
                trace!("successor diverted to the error state: {err}");
                None
            }
        }
    }

    fn apply(
        &self,
        old: &[u8],
        next: &mut [u8],
        enabled: &EnabledTrans,
        with_property: bool,
    ) -> Result<(), EvalError> {
        let system = self.explicit.system();
        if let Some(main) = enabled.sender_or_normal() {
            let transition = system.transition(main);
            if let Some(receiver) = enabled.receiver() {
                let receiver = system.transition(receiver);
                self.pass_values(old, next, transition, receiver)?;
                self.step(next, receiver)?;
            }
            match transition.sync_mode() {
                SyncMode::BufferedReceive => {
                    self.step(next, transition)?;
                    self.buffer_receive(old, next, transition)?;
                }
                SyncMode::BufferedSend => {
                    self.step(next, transition)?;
                    self.buffer_send(next, transition)?;
                }
                _ => self.step(next, transition)?,
            }
        }
        if with_property {
            if let Some(property) = enabled.property() {
                self.step(next, system.transition(property))?;
            }
        }
        Ok(())
    }

    // Moves the process of `transition` to the target state and applies the effects, in order.
    fn step(&self, next: &mut [u8], transition: &Transition) -> Result<(), EvalError> {
        self.explicit
            .set_process_state(next, transition.process(), transition.to_lid());
        for effect in transition.effects() {
            let view = StateView::new(self.explicit, next);
            match effect.as_assignment() {
                Some((target, value)) => {
                    let value = value.eval(&view).into_result()?;
                    let (offset, var_type) = self.lvalue(target, &view)?;
                    store(next, offset, var_type, value)?;
                }
                None => {
                    effect.eval(&view).into_result()?;
                }
            }
        }
        Ok(())
    }

    // Offset and type of the storage of an l-value, with the index evaluated in `view`.
    fn lvalue(&self, target: &Expression, view: &StateView) -> Result<(usize, VarType), EvalError> {
        let symbols = self.explicit.system().symbols();
        let layout = self.explicit.layout();
        match target.node() {
            Node::Var { var, .. } => {
                let offset = layout.var_offset(*var).ok_or(EvalError::ConstantWrite(*var))?;
                Ok((offset, symbols.variable_info(*var).var_type))
            }
            Node::Index { var, index, .. } => {
                let info = symbols.variable_info(*var);
                let index = index.eval(view).into_result()?;
                let len = info.len();
                let idx = usize::try_from(index)
                    .ok()
                    .filter(|idx| *idx < len)
                    .ok_or(EvalError::IndexOutOfBounds { index, len })?;
                let offset = layout.var_offset(*var).ok_or(EvalError::ConstantWrite(*var))?;
                Ok((offset + idx * info.var_type.width(), info.var_type))
            }
            _ => Err(EvalError::InvalidTarget),
        }
    }

    // Handshake: the values of the sender, evaluated on the successor, are written to the l-values of the receiver,
    // whose indices are evaluated on the original state.
    fn pass_values(
        &self,
        old: &[u8],
        next: &mut [u8],
        sender: &Transition,
        receiver: &Transition,
    ) -> Result<(), EvalError> {
        let values = sender.sync_exprs();
        let targets = receiver.sync_exprs();
        if values.len() != targets.len() {
            return Err(EvalError::ArityMismatch);
        }
        let item_types = sender
            .channel()
            .and_then(|channel| self.explicit.system().symbols().channel_info(channel).item_types.as_deref());
        let old_view = StateView::new(self.explicit, old);
        for (idx, (value, target)) in values.iter().zip(targets).enumerate() {
            let mut value = value.eval(&StateView::new(self.explicit, next)).into_result()?;
            if let Some(item_type) = item_types.and_then(|types| types.get(idx)) {
                value = item_type.narrow(value);
            }
            let (offset, var_type) = self.lvalue(target, &old_view)?;
            store(next, offset, var_type, value)?;
        }
        Ok(())
    }

    fn buffer_send(&self, next: &mut [u8], transition: &Transition) -> Result<(), EvalError> {
        let (offset, capacity, item_types) = self.buffer_info(transition)?;
        let count = read_counter(next, offset);
        if count >= capacity {
            return Err(EvalError::BufferBounds);
        }
        let values = transition.sync_exprs();
        if values.len() != item_types.len() {
            return Err(EvalError::ArityMismatch);
        }
        let element_size: usize = item_types.iter().map(|t| t.width()).sum();
        write_counter(next, offset, count + 1);
        let mut slot = offset + COUNTER_WIDTH + count * element_size;
        for (value, item_type) in values.iter().zip(item_types) {
            let value = value.eval(&StateView::new(self.explicit, next)).into_result()?;
            write_value(next, slot, *item_type, item_type.narrow(value));
            slot += item_type.width();
        }
        Ok(())
    }

    // The head of the buffer is written to the l-values, whose indices are evaluated on the original state.
    fn buffer_receive(&self, old: &[u8], next: &mut [u8], transition: &Transition) -> Result<(), EvalError> {
        let (offset, capacity, item_types) = self.buffer_info(transition)?;
        let count = read_counter(next, offset);
        if count == 0 {
            return Err(EvalError::BufferBounds);
        }
        let targets = transition.sync_exprs();
        if targets.len() != item_types.len() {
            return Err(EvalError::ArityMismatch);
        }
        let element_size: usize = item_types.iter().map(|t| t.width()).sum();
        let start = offset + COUNTER_WIDTH;
        let old_view = StateView::new(self.explicit, old);
        let mut slot = start;
        for (target, item_type) in targets.iter().zip(item_types) {
            let value = read_value(next, slot, *item_type);
            slot += item_type.width();
            let (target_offset, var_type) = self.lvalue(target, &old_view)?;
            store(next, target_offset, var_type, value)?;
        }
        let end = start + capacity * element_size;
        next.copy_within(start + element_size..end, start);
        next[end - element_size..end].fill(0);
        write_counter(next, offset, count - 1);
        Ok(())
    }

    fn buffer_info(&self, transition: &Transition) -> Result<(usize, usize, &'a [VarType]), EvalError> {
        let channel = transition.channel().ok_or(EvalError::BufferBounds)?;
        let offset = self
            .explicit
            .layout()
            .channel_offset(channel)
            .ok_or(EvalError::BufferBounds)?;
        let info = self.explicit.system().symbols().channel_info(channel);
        Ok((offset, info.capacity, info.item_types.as_deref().unwrap_or_default()))
    }
}

#[inline(always)]
fn store(next: &mut [u8], offset: usize, var_type: VarType, value: crate::Value) -> Result<(), EvalError> {
    if write_value(next, offset, var_type, value) {
        Ok(())
    } else {
        Err(EvalError::ValueOutOfRange(value))
    }
}
