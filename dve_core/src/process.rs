//! Processes and their transitions.

use crate::{ChannelGid, Expression, ProcessGid, SourceSpan, StateGid, VarGid};

/// Identifier of a transition, unique in the whole model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransitionGid(pub(crate) u32);

impl TransitionGid {
    /// Position of the transition in the model.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a transition synchronizes on its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncMode {
    /// No synchronization.
    NoSync = 0,
    /// Handshake send `c!`.
    Send = 1,
    /// Handshake receive `c?`.
    Receive = 2,
    /// Send into the buffer of a typed channel.
    BufferedSend = 3,
    /// Receive from the buffer of a typed channel.
    BufferedReceive = 4,
}

impl SyncMode {
    /// All modes, in order.
    pub const ALL: [SyncMode; 5] = [
        SyncMode::NoSync,
        SyncMode::Send,
        SyncMode::Receive,
        SyncMode::BufferedSend,
        SyncMode::BufferedReceive,
    ];

    /// Whether the transition sends values.
    pub fn is_send(self) -> bool {
        matches!(self, SyncMode::Send | SyncMode::BufferedSend)
    }

    /// Whether the transition receives values.
    pub fn is_receive(self) -> bool {
        matches!(self, SyncMode::Receive | SyncMode::BufferedReceive)
    }
}

/// A transition of a process.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub(crate) gid: TransitionGid,
    pub(crate) lid: usize,
    pub(crate) partial_id: usize,
    pub(crate) process: ProcessGid,
    pub(crate) from: (StateGid, usize),
    pub(crate) to: (StateGid, usize),
    pub(crate) guard: Option<Expression>,
    pub(crate) sync: SyncMode,
    pub(crate) channel: Option<ChannelGid>,
    pub(crate) sync_exprs: Vec<Expression>,
    pub(crate) effects: Vec<Expression>,
    pub(crate) glob_mask: Vec<bool>,
    pub(crate) span: Option<SourceSpan>,
}

impl Transition {
    /// Creates a transition of `process` between two of its states,
    /// given with their gid and their process-local id.
    ///
    /// The transition gets its identifiers when added to a model.
    pub fn new(
        process: ProcessGid,
        from: (StateGid, usize),
        to: (StateGid, usize),
        span: Option<SourceSpan>,
    ) -> Self {
        Self {
            gid: TransitionGid(0),
            lid: 0,
            partial_id: 0,
            process,
            from,
            to,
            guard: None,
            sync: SyncMode::NoSync,
            channel: None,
            sync_exprs: Vec::new(),
            effects: Vec::new(),
            glob_mask: Vec::new(),
            span,
        }
    }

    /// Sets the guard.
    pub fn set_guard(&mut self, guard: Expression) {
        self.guard = Some(guard);
    }

    /// Sets the synchronization and the values sent, or the l-values receiving.
    pub fn set_sync(&mut self, mode: SyncMode, channel: ChannelGid, exprs: Vec<Expression>) {
        self.sync = mode;
        self.channel = (mode != SyncMode::NoSync).then_some(channel);
        self.sync_exprs = exprs;
    }

    /// Appends an effect, which has to be an assignment.
    pub fn add_effect(&mut self, effect: Expression) {
        self.effects.push(effect);
    }

    /// Model-wide identifier.
    pub fn gid(&self) -> TransitionGid {
        self.gid
    }

    /// Position among the transitions of the process.
    pub fn lid(&self) -> usize {
        self.lid
    }

    /// Position among the transitions of the process with the same synchronization mode.
    pub fn partial_id(&self) -> usize {
        self.partial_id
    }

    /// Owning process.
    pub fn process(&self) -> ProcessGid {
        self.process
    }

    /// Source state.
    pub fn from(&self) -> StateGid {
        self.from.0
    }

    /// Process-local id of the source state.
    pub fn from_lid(&self) -> usize {
        self.from.1
    }

    /// Target state.
    pub fn to(&self) -> StateGid {
        self.to.0
    }

    /// Process-local id of the target state.
    pub fn to_lid(&self) -> usize {
        self.to.1
    }

    /// The guard, if any.
    pub fn guard(&self) -> Option<&Expression> {
        self.guard.as_ref()
    }

    /// The synchronization mode.
    pub fn sync_mode(&self) -> SyncMode {
        self.sync
    }

    /// The channel of a synchronized transition.
    pub fn channel(&self) -> Option<ChannelGid> {
        self.channel
    }

    /// Values sent, or l-values receiving.
    pub fn sync_exprs(&self) -> &[Expression] {
        &self.sync_exprs
    }

    /// The assignments performed when firing.
    pub fn effects(&self) -> &[Expression] {
        &self.effects
    }

    /// One flag per global variable, set if the transition writes that variable.
    pub fn glob_mask(&self) -> &[bool] {
        &self.glob_mask
    }

    /// Position in the source.
    pub fn span(&self) -> Option<SourceSpan> {
        self.span
    }

    /// Variables written when firing: targets of the effects, and receiving l-values.
    pub(crate) fn written_vars(&self) -> impl Iterator<Item = VarGid> + '_ {
        let received: &[Expression] = if self.sync.is_receive() {
            &self.sync_exprs
        } else {
            &[]
        };
        self.effects
            .iter()
            .filter_map(|effect| effect.as_assignment().and_then(|(target, _)| target.lvalue_var()))
            .chain(received.iter().filter_map(Expression::lvalue_var))
    }

    pub(crate) fn exprs_mut(&mut self) -> impl Iterator<Item = &mut Expression> {
        self.guard
            .iter_mut()
            .chain(self.sync_exprs.iter_mut())
            .chain(self.effects.iter_mut())
    }
}

/// Acceptance condition of a process, kept as metadata of the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Acceptance {
    /// No acceptance condition.
    #[default]
    None,
    /// Büchi condition: a set of accepting states (by process-local id).
    Buchi(Vec<usize>),
    /// Generalized Büchi condition: a list of sets.
    GenBuchi(Vec<Vec<usize>>),
    /// Muller condition: a list of sets.
    Muller(Vec<Vec<usize>>),
    /// Rabin condition: a list of pairs of sets.
    Rabin(Vec<(Vec<usize>, Vec<usize>)>),
    /// Streett condition: a list of pairs of sets.
    Streett(Vec<(Vec<usize>, Vec<usize>)>),
}

/// A process of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Process {
    pub(crate) gid: ProcessGid,
    pub(crate) vars: Vec<VarGid>,
    pub(crate) states: Vec<StateGid>,
    pub(crate) initial: Option<usize>,
    pub(crate) committed: Vec<bool>,
    pub(crate) assertions: Vec<Vec<Expression>>,
    pub(crate) acceptance: Acceptance,
    pub(crate) transitions: Vec<TransitionGid>,
    pub(crate) by_sync: [Vec<TransitionGid>; 5],
}

impl Process {
    pub(crate) fn new(gid: ProcessGid) -> Self {
        Self {
            gid,
            vars: Vec::new(),
            states: Vec::new(),
            initial: None,
            committed: Vec::new(),
            assertions: Vec::new(),
            acceptance: Acceptance::None,
            transitions: Vec::new(),
            by_sync: Default::default(),
        }
    }

    pub(crate) fn add_state(&mut self, state: StateGid) {
        self.states.push(state);
        self.committed.push(false);
        self.assertions.push(Vec::new());
    }

    /// Identifier of the process.
    pub fn gid(&self) -> ProcessGid {
        self.gid
    }

    /// Local variables, in declaration order.
    pub fn vars(&self) -> &[VarGid] {
        &self.vars
    }

    /// Control states, indexed by process-local id.
    pub fn states(&self) -> &[StateGid] {
        &self.states
    }

    /// Number of control states.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Process-local id of the initial state, if declared.
    pub fn initial_state(&self) -> Option<usize> {
        self.initial
    }

    /// Sets the initial state, by process-local id.
    pub fn set_initial_state(&mut self, lid: usize) {
        self.initial = Some(lid);
    }

    /// Whether a state (by process-local id) is committed.
    pub fn is_committed(&self, lid: usize) -> bool {
        self.committed.get(lid).copied().unwrap_or(false)
    }

    /// Marks a state (by process-local id) as committed.
    pub fn set_committed(&mut self, lid: usize) {
        if let Some(flag) = self.committed.get_mut(lid) {
            *flag = true;
        }
    }

    /// Whether any state of the process is committed.
    pub fn has_committed_states(&self) -> bool {
        self.committed.iter().any(|c| *c)
    }

    /// Assertions attached to a state (by process-local id).
    pub fn assertions(&self, lid: usize) -> &[Expression] {
        self.assertions.get(lid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Attaches an assertion to a state (by process-local id).
    pub fn add_assertion(&mut self, lid: usize, assertion: Expression) {
        if let Some(list) = self.assertions.get_mut(lid) {
            list.push(assertion);
        }
    }

    /// The acceptance condition.
    pub fn acceptance(&self) -> &Acceptance {
        &self.acceptance
    }

    /// Sets the acceptance condition.
    pub fn set_acceptance(&mut self, acceptance: Acceptance) {
        self.acceptance = acceptance;
    }

    /// All transitions, in declaration order.
    pub fn transitions(&self) -> &[TransitionGid] {
        &self.transitions
    }

    /// Transitions with the given synchronization mode, indexed by their partial id.
    pub fn transitions_by_sync(&self, mode: SyncMode) -> &[TransitionGid] {
        &self.by_sync[mode as usize]
    }
}
