//! Declarations of variables, channels, processes and control states.
//!
//! Every [`Symbol`] carries three identifiers:
//!
//! - a table-wide [`SymbolId`];
//! - a kind-local id ([`VarGid`], [`ChannelGid`], [`ProcessGid`] or [`StateGid`]);
//! - a process-local id (the *lid*), which for global variables is the position among global variables.
//!
//! Lookups never fail: a missing name is reported as `None`
//! and it is up to the caller to decide whether that is an error or calls for a provisional declaration.

use crate::{SourceSpan, Value, expression::Expression};

/// Table-wide identifier of a [`Symbol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub(crate) u32);

/// Identifier of a variable, unique among variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarGid(pub(crate) u32);

/// Identifier of a channel, unique among channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelGid(pub(crate) u32);

/// Identifier of a process, unique among processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessGid(pub(crate) u32);

/// Identifier of a control state, unique among the control states of all processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateGid(pub(crate) u32);

macro_rules! impl_index {
    ($($id:ident),*) => {
        $(
            impl $id {
                /// Position of the identifier in its own id-space.
                #[inline(always)]
                pub const fn index(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

impl_index!(SymbolId, VarGid, ChannelGid, ProcessGid, StateGid);

/// Storage class of a variable or channel item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarType {
    /// One byte, values `0..=255`.
    Byte,
    /// Two bytes, values in the signed 16-bit range.
    Int,
}

impl VarType {
    /// Number of bytes taken in a packed state.
    #[inline(always)]
    pub const fn width(self) -> usize {
        match self {
            VarType::Byte => 1,
            VarType::Int => 2,
        }
    }

    /// Whether `value` is representable by the type.
    #[inline(always)]
    pub const fn contains(self, value: Value) -> bool {
        match self {
            VarType::Byte => value >= u8::MIN as Value && value <= u8::MAX as Value,
            VarType::Int => value >= i16::MIN as Value && value <= i16::MAX as Value,
        }
    }

    /// Truncates `value` to the representation of the type.
    ///
    /// ```
    /// # use dve_core::VarType;
    /// assert_eq!(VarType::Byte.narrow(300), 44);
    /// assert_eq!(VarType::Int.narrow(-1), -1);
    /// assert_eq!(VarType::Byte.narrow(-1), 255);
    /// ```
    #[inline(always)]
    pub const fn narrow(self, value: Value) -> Value {
        match self {
            VarType::Byte => value as u8 as Value,
            VarType::Int => value as i16 as Value,
        }
    }

    /// Keyword of the type in DVE sources.
    pub const fn keyword(self) -> &'static str {
        match self {
            VarType::Byte => "byte",
            VarType::Int => "int",
        }
    }
}

/// Declaration data of a variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    /// Storage class of the variable (or of its elements).
    pub var_type: VarType,
    /// Whether the variable is a constant.
    pub constant: bool,
    /// Length of the array, or `None` for scalars.
    pub array: Option<usize>,
    /// Initializers: at most one for scalars, a list for arrays.
    pub init: Vec<Expression>,
}

impl VariableInfo {
    /// Scalar variable without initializer.
    pub fn scalar(var_type: VarType) -> Self {
        Self {
            var_type,
            constant: false,
            array: None,
            init: Vec::new(),
        }
    }

    /// Array variable without initializers.
    pub fn array(var_type: VarType, len: usize) -> Self {
        Self {
            var_type,
            constant: false,
            array: Some(len),
            init: Vec::new(),
        }
    }

    /// Number of elements (1 for scalars).
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.array.unwrap_or(1)
    }

    /// Whether the variable is an array.
    #[inline(always)]
    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }
}

/// Declaration data of a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelInfo {
    /// Item types of a typed channel, `None` for untyped channels.
    pub item_types: Option<Vec<VarType>>,
    /// Buffer capacity (0 for handshake-only channels).
    pub capacity: usize,
    /// Number of values carried by each message,
    /// `None` while an untyped channel has not been used yet.
    pub item_count: Option<usize>,
}

impl ChannelInfo {
    /// Untyped handshake channel.
    pub fn untyped() -> Self {
        Self::default()
    }

    /// Typed channel with the given item types and capacity.
    pub fn typed(item_types: Vec<VarType>, capacity: usize) -> Self {
        Self {
            item_count: Some(item_types.len()),
            item_types: Some(item_types),
            capacity,
        }
    }

    /// Whether the channel declares its item types.
    #[inline(always)]
    pub fn is_typed(&self) -> bool {
        self.item_types.is_some()
    }

    /// Whether messages are stored in a buffer of the packed state.
    #[inline(always)]
    pub fn is_buffered(&self) -> bool {
        self.is_typed() && self.capacity > 0
    }

    /// Size in bytes of one buffered message.
    pub fn element_size(&self) -> usize {
        self.item_types
            .as_ref()
            .map(|types| types.iter().map(|t| t.width()).sum())
            .unwrap_or_default()
    }
}

/// What a [`Symbol`] stands for, with its kind-local id.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    /// A variable.
    Variable(VarGid, VariableInfo),
    /// A channel.
    Channel(ChannelGid, ChannelInfo),
    /// A process.
    Process(ProcessGid),
    /// A control state of a process.
    State(StateGid),
}

/// A declared (or provisionally referenced) name.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    id: SymbolId,
    name: String,
    process: Option<ProcessGid>,
    lid: usize,
    valid: bool,
    span: Option<SourceSpan>,
    kind: SymbolKind,
}

impl Symbol {
    /// Table-wide id.
    pub fn id(&self) -> SymbolId {
        self.id
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning process, `None` for global symbols.
    pub fn process(&self) -> Option<ProcessGid> {
        self.process
    }

    /// Process-local id.
    pub fn lid(&self) -> usize {
        self.lid
    }

    /// Whether the symbol has been declared, as opposed to only referenced.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Position of the declaration (or of the first reference).
    pub fn span(&self) -> Option<SourceSpan> {
        self.span
    }

    /// Kind of the symbol.
    pub fn kind(&self) -> &SymbolKind {
        &self.kind
    }

    /// Variable data, if the symbol is a variable.
    pub fn as_variable(&self) -> Option<(VarGid, &VariableInfo)> {
        match &self.kind {
            SymbolKind::Variable(gid, info) => Some((*gid, info)),
            _ => None,
        }
    }

    /// Channel data, if the symbol is a channel.
    pub fn as_channel(&self) -> Option<(ChannelGid, &ChannelInfo)> {
        match &self.kind {
            SymbolKind::Channel(gid, info) => Some((*gid, info)),
            _ => None,
        }
    }

    /// Process id, if the symbol is a process.
    pub fn as_process(&self) -> Option<ProcessGid> {
        match self.kind {
            SymbolKind::Process(gid) => Some(gid),
            _ => None,
        }
    }

    /// State id, if the symbol is a control state.
    pub fn as_state(&self) -> Option<StateGid> {
        match self.kind {
            SymbolKind::State(gid) => Some(gid),
            _ => None,
        }
    }
}

/// Owns all symbols of a model.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    variables: Vec<SymbolId>,
    channels: Vec<SymbolId>,
    processes: Vec<SymbolId>,
    states: Vec<SymbolId>,
    // Names visible at top level.
    globals: Vec<SymbolId>,
    // Names local to each process, indexed by process gid.
    locals: Vec<Vec<SymbolId>>,
    global_vars: Vec<VarGid>,
    local_vars: Vec<usize>,
    local_states: Vec<usize>,
}

impl SymbolTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        name: &str,
        process: Option<ProcessGid>,
        lid: usize,
        valid: bool,
        span: Option<SourceSpan>,
        kind: SymbolKind,
    ) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            id,
            name: name.to_owned(),
            process,
            lid,
            valid,
            span,
            kind,
        });
        match process {
            Some(process) => self.locals[process.index()].push(id),
            None => self.globals.push(id),
        }
        id
    }

    /// Declares a variable, global if `process` is `None`.
    ///
    /// ```
    /// # use dve_core::{SymbolTable, VarType, VariableInfo};
    /// let mut table = SymbolTable::new();
    /// let x = table.add_variable("x", None, VariableInfo::scalar(VarType::Byte), None);
    /// assert_eq!(table.find_global_symbol("x"), Some(table.variable(x).id()));
    /// ```
    pub fn add_variable(
        &mut self,
        name: &str,
        process: Option<ProcessGid>,
        info: VariableInfo,
        span: Option<SourceSpan>,
    ) -> VarGid {
        let gid = VarGid(self.variables.len() as u32);
        let lid = match process {
            Some(process) => {
                let count = &mut self.local_vars[process.index()];
                *count += 1;
                *count - 1
            }
            None => {
                self.global_vars.push(gid);
                self.global_vars.len() - 1
            }
        };
        let id = self.push(name, process, lid, true, span, SymbolKind::Variable(gid, info));
        self.variables.push(id);
        gid
    }

    /// Declares a (global) channel.
    pub fn add_channel(&mut self, name: &str, info: ChannelInfo, span: Option<SourceSpan>) -> ChannelGid {
        let gid = ChannelGid(self.channels.len() as u32);
        let id = self.push(name, None, gid.index(), true, span, SymbolKind::Channel(gid, info));
        self.channels.push(id);
        gid
    }

    /// Declares a process.
    /// A process that is only referenced (e.g., by `P.s`) is declared with `valid = false`.
    pub fn add_process(&mut self, name: &str, span: Option<SourceSpan>, valid: bool) -> ProcessGid {
        let gid = ProcessGid(self.processes.len() as u32);
        let id = self.push(name, None, gid.index(), valid, span, SymbolKind::Process(gid));
        self.processes.push(id);
        self.locals.push(Vec::new());
        self.local_vars.push(0);
        self.local_states.push(0);
        gid
    }

    /// Declares a control state of `process`.
    /// The process-local id is the position among the states of the process.
    pub fn add_state(&mut self, name: &str, process: ProcessGid, span: Option<SourceSpan>, valid: bool) -> StateGid {
        let gid = StateGid(self.states.len() as u32);
        let count = &mut self.local_states[process.index()];
        *count += 1;
        let lid = *count - 1;
        let id = self.push(name, Some(process), lid, valid, span, SymbolKind::State(gid));
        self.states.push(id);
        gid
    }

    /// Confirms a provisionally referenced symbol.
    pub fn set_valid(&mut self, id: SymbolId) {
        self.symbols[id.index()].valid = true;
    }

    /// Looks `name` up among the symbols local to `process`.
    pub fn find_symbol(&self, name: &str, process: ProcessGid) -> Option<SymbolId> {
        self.locals
            .get(process.index())?
            .iter()
            .copied()
            .find(|id| self.symbols[id.index()].name == name)
    }

    /// Looks `name` up among the global symbols.
    pub fn find_global_symbol(&self, name: &str) -> Option<SymbolId> {
        self.globals
            .iter()
            .copied()
            .find(|id| self.symbols[id.index()].name == name)
    }

    /// Looks `name` up in the scope of `process` first, then globally.
    pub fn find_visible_symbol(&self, name: &str, process: Option<ProcessGid>) -> Option<SymbolId> {
        process
            .and_then(|process| self.find_symbol(name, process))
            .or_else(|| self.find_global_symbol(name))
    }

    /// The symbol with the given table-wide id.
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    /// The symbol of a variable.
    pub fn variable(&self, var: VarGid) -> &Symbol {
        &self.symbols[self.variables[var.index()].index()]
    }

    /// Declaration data of a variable.
    pub fn variable_info(&self, var: VarGid) -> &VariableInfo {
        match &self.variable(var).kind {
            SymbolKind::Variable(_, info) => info,
            _ => unreachable!("variable list holds only variables"),
        }
    }

    /// Mutable declaration data of a variable.
    pub fn variable_info_mut(&mut self, var: VarGid) -> &mut VariableInfo {
        let id = self.variables[var.index()];
        match &mut self.symbols[id.index()].kind {
            SymbolKind::Variable(_, info) => info,
            _ => unreachable!("variable list holds only variables"),
        }
    }

    /// The symbol of a channel.
    pub fn channel(&self, channel: ChannelGid) -> &Symbol {
        &self.symbols[self.channels[channel.index()].index()]
    }

    /// Declaration data of a channel.
    pub fn channel_info(&self, channel: ChannelGid) -> &ChannelInfo {
        match &self.channel(channel).kind {
            SymbolKind::Channel(_, info) => info,
            _ => unreachable!("channel list holds only channels"),
        }
    }

    /// Mutable declaration data of a channel.
    pub fn channel_info_mut(&mut self, channel: ChannelGid) -> &mut ChannelInfo {
        let id = self.channels[channel.index()];
        match &mut self.symbols[id.index()].kind {
            SymbolKind::Channel(_, info) => info,
            _ => unreachable!("channel list holds only channels"),
        }
    }

    /// The symbol of a process.
    pub fn process(&self, process: ProcessGid) -> &Symbol {
        &self.symbols[self.processes[process.index()].index()]
    }

    /// The symbol of a control state.
    pub fn state(&self, state: StateGid) -> &Symbol {
        &self.symbols[self.states[state.index()].index()]
    }

    /// Global variables, in declaration order.
    pub fn global_variables(&self) -> &[VarGid] {
        &self.global_vars
    }

    /// Number of symbols of any kind.
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Number of variables.
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of processes.
    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    /// Number of control states.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Iterates over all variables.
    pub fn variables(&self) -> impl Iterator<Item = VarGid> + '_ {
        (0..self.variables.len() as u32).map(VarGid)
    }

    /// Iterates over all channels.
    pub fn channels(&self) -> impl Iterator<Item = ChannelGid> + '_ {
        (0..self.channels.len() as u32).map(ChannelGid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoping() {
        let mut table = SymbolTable::new();
        let g = table.add_variable("x", None, VariableInfo::scalar(VarType::Int), None);
        let p = table.add_process("P", None, true);
        let l = table.add_variable("x", Some(p), VariableInfo::scalar(VarType::Byte), None);
        let q = table.add_process("Q", None, true);

        let local = table.find_visible_symbol("x", Some(p)).unwrap();
        assert_eq!(table.symbol(local).as_variable().unwrap().0, l);
        let global = table.find_visible_symbol("x", Some(q)).unwrap();
        assert_eq!(table.symbol(global).as_variable().unwrap().0, g);
        assert_eq!(table.find_symbol("x", q), None);
        assert_eq!(table.find_visible_symbol("y", Some(p)), None);
    }

    #[test]
    fn ids() {
        let mut table = SymbolTable::new();
        let p = table.add_process("P", None, true);
        let a = table.add_state("a", p, None, true);
        let b = table.add_state("b", p, None, true);
        let x = table.add_variable("x", None, VariableInfo::scalar(VarType::Byte), None);
        let y = table.add_variable("y", Some(p), VariableInfo::array(VarType::Byte, 3), None);
        let z = table.add_variable("z", None, VariableInfo::scalar(VarType::Int), None);

        assert_eq!(table.state(a).lid(), 0);
        assert_eq!(table.state(b).lid(), 1);
        assert_eq!(table.variable(x).lid(), 0);
        assert_eq!(table.variable(y).lid(), 0);
        assert_eq!(table.variable(z).lid(), 1);
        assert_eq!(table.global_variables(), &[x, z]);
        assert_eq!(table.symbol_count(), 6);
        assert_eq!(table.state(b).id().index(), 2);
    }

    #[test]
    fn provisional() {
        let mut table = SymbolTable::new();
        let p = table.add_process("P", None, false);
        let s = table.add_state("s", p, None, false);
        assert!(!table.process(p).is_valid());
        table.set_valid(table.process(p).id());
        assert!(table.process(p).is_valid());
        assert!(!table.state(s).is_valid());
    }

    #[test]
    fn narrowing() {
        assert!(VarType::Byte.contains(255));
        assert!(!VarType::Byte.contains(256));
        assert!(!VarType::Byte.contains(-1));
        assert!(VarType::Int.contains(-32768));
        assert!(!VarType::Int.contains(32768));
        assert_eq!(VarType::Int.narrow(32768), -32768);
    }
}
