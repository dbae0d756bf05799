//! Semantic actions of the grammar.
//!
//! The [`Driver`] receives declarations, statements and expression fragments in source order,
//! resolves names against the symbol table and pushes everything into a [`SystemBuilder`].
//! Expressions are built bottom-up on an [`ExpressionStack`], the way a shift-reduce parser would.

use crate::ParseError;
use dve_core::{
    Acceptance, BinaryOp, ChannelGid, ChannelInfo, Diagnostics, DveSystem, Expression,
    ExpressionStack, ProcessGid, SourceSpan, StateGid, Synchronicity, SymbolKind, SyncMode,
    SystemBuilder, Transition, UnaryOp, Value, VarGid, VarType, VariableInfo,
};
use log::{debug, trace};

/// A declared variable, before it is added to the model.
pub(crate) struct VariableDecl<'s> {
    pub(crate) name: &'s str,
    pub(crate) span: SourceSpan,
    pub(crate) var_type: VarType,
    pub(crate) constant: bool,
    pub(crate) array: Option<(Value, SourceSpan)>,
    pub(crate) init: Initializer,
}

/// Initializer of a variable declaration, with the number of expressions on the stack.
pub(crate) enum Initializer {
    None,
    Scalar(SourceSpan),
    List(usize, SourceSpan),
}

pub(crate) struct Driver<'d> {
    builder: SystemBuilder,
    diagnostics: &'d mut Diagnostics,
    stack: ExpressionStack,
    // Process whose body is being parsed.
    process: Option<ProcessGid>,
    // Scope that first accessed a variable of another process.
    foreign_scope: Option<Option<ProcessGid>>,
    // Constructs that a property process cannot contain, by process.
    restricted: Vec<(ProcessGid, SourceSpan, &'static str)>,
    transition: Option<Transition>,
    last_from: Option<(StateGid, usize)>,
}

impl<'d> Driver<'d> {
    pub(crate) fn new(diagnostics: &'d mut Diagnostics) -> Self {
        Self {
            builder: SystemBuilder::new(),
            diagnostics,
            stack: ExpressionStack::new(),
            process: None,
            foreign_scope: None,
            restricted: Vec::new(),
            transition: None,
            last_from: None,
        }
    }

    fn error(&self, span: SourceSpan, message: String) -> ParseError {
        ParseError::Semantic { span, message }
    }

    fn current_process(&self, span: SourceSpan) -> Result<ProcessGid, ParseError> {
        match self.process {
            Some(process) => Ok(process),
            None => Err(self.error(span, "statement outside of a process".to_owned())),
        }
    }

    fn check_redeclaration(&mut self, name: &str, span: SourceSpan) -> Result<(), ParseError> {
        let existing = match self.process {
            Some(process) => self.builder.symbols().find_symbol(name, process),
            None => self.builder.symbols().find_global_symbol(name),
        };
        match existing {
            Some(id) => {
                let previous = self
                    .builder
                    .symbols()
                    .symbol(id)
                    .span()
                    .map(|span| format!(" (previously declared at {span})"))
                    .unwrap_or_default();
                Err(self.error(span, format!("redeclaration of '{name}'{previous}")))
            }
            None => Ok(()),
        }
    }

    fn restrict(&mut self, span: SourceSpan, construct: &'static str) {
        if let Some(process) = self.process {
            self.restricted.push((process, span, construct));
        }
    }

    pub(crate) fn declare_variable(&mut self, decl: VariableDecl<'_>) -> Result<(), ParseError> {
        self.check_redeclaration(decl.name, decl.span)?;
        let mut info = match decl.array {
            Some((len, span)) => {
                if len < 1 {
                    return Err(self.error(span, format!("array '{}' must have at least one element", decl.name)));
                }
                VariableInfo::array(decl.var_type, len as usize)
            }
            None => VariableInfo::scalar(decl.var_type),
        };
        info.constant = decl.constant;
        match decl.init {
            Initializer::None => {}
            Initializer::Scalar(span) => {
                if info.is_array() {
                    return Err(self.error(
                        span,
                        format!("array '{}' initialized with a scalar value", decl.name),
                    ));
                }
                info.init.push(self.stack.pop()?);
            }
            Initializer::List(count, span) => {
                if !info.is_array() {
                    return Err(self.error(
                        span,
                        format!("scalar variable '{}' initialized with a list of values", decl.name),
                    ));
                }
                info.init = self.stack.pop_n(count)?;
            }
        }
        self.builder
            .add_variable(decl.name, self.process, info, Some(decl.span));
        Ok(())
    }

    pub(crate) fn declare_channel(
        &mut self,
        name: &str,
        span: SourceSpan,
        item_types: Option<Vec<VarType>>,
        capacity: Option<(Value, SourceSpan)>,
    ) -> Result<(), ParseError> {
        self.check_redeclaration(name, span)?;
        let info = match (item_types, capacity) {
            (Some(types), Some((capacity, span))) => {
                if capacity < 0 {
                    return Err(self.error(span, format!("channel '{name}' has a negative capacity")));
                }
                ChannelInfo::typed(types, capacity as usize)
            }
            (Some(types), None) => ChannelInfo::typed(types, 0),
            (None, Some((_, span))) => {
                return Err(self.error(
                    span,
                    format!("buffered channel '{name}' needs a list of item types"),
                ));
            }
            (None, None) => ChannelInfo::untyped(),
        };
        self.builder.add_channel(name, info, Some(span));
        Ok(())
    }

    pub(crate) fn begin_process(&mut self, name: &str, span: SourceSpan) -> Result<(), ParseError> {
        let process = match self.builder.symbols().find_global_symbol(name) {
            Some(id) => {
                let symbol = self.builder.symbols().symbol(id);
                match symbol.as_process() {
                    Some(process) if !symbol.is_valid() => {
                        self.builder.symbols_mut().set_valid(id);
                        process
                    }
                    _ => return Err(self.error(span, format!("redeclaration of '{name}'"))),
                }
            }
            None => self.builder.add_process(name, Some(span), true),
        };
        trace!("begin process {name}");
        self.process = Some(process);
        self.last_from = None;
        Ok(())
    }

    pub(crate) fn end_process(&mut self) {
        self.process = None;
    }

    pub(crate) fn declare_state(&mut self, name: &str, span: SourceSpan) -> Result<(), ParseError> {
        let process = self.current_process(span)?;
        match self.builder.symbols().find_symbol(name, process) {
            Some(id) => {
                let symbol = self.builder.symbols().symbol(id);
                if symbol.as_state().is_some() && !symbol.is_valid() {
                    self.builder.symbols_mut().set_valid(id);
                    Ok(())
                } else {
                    Err(self.error(span, format!("redeclaration of '{name}'")))
                }
            }
            None => {
                self.builder.add_state(name, process, Some(span), true);
                Ok(())
            }
        }
    }

    /// Resolves a declared state of the current process to its gid and process-local id.
    fn state(&mut self, name: &str, span: SourceSpan) -> Result<(StateGid, usize), ParseError> {
        let process = self.current_process(span)?;
        let symbols = self.builder.symbols();
        let found = symbols
            .find_symbol(name, process)
            .map(|id| symbols.symbol(id))
            .filter(|symbol| symbol.is_valid())
            .and_then(|symbol| symbol.as_state().map(|state| (state, symbol.lid())));
        found.ok_or_else(|| self.error(span, format!("undeclared state '{name}'")))
    }

    pub(crate) fn state_lid(&mut self, name: &str, span: SourceSpan) -> Result<usize, ParseError> {
        self.state(name, span).map(|(_, lid)| lid)
    }

    pub(crate) fn set_initial_state(&mut self, name: &str, span: SourceSpan) -> Result<(), ParseError> {
        let process = self.current_process(span)?;
        let lid = self.state_lid(name, span)?;
        if self.builder.process(process).initial_state().is_some() {
            return Err(self.error(span, "initial state declared twice".to_owned()));
        }
        self.builder.process_mut(process).set_initial_state(lid);
        Ok(())
    }

    pub(crate) fn set_committed(&mut self, name: &str, span: SourceSpan) -> Result<(), ParseError> {
        let process = self.current_process(span)?;
        let lid = self.state_lid(name, span)?;
        self.builder.process_mut(process).set_committed(lid);
        Ok(())
    }

    pub(crate) fn set_acceptance(&mut self, acceptance: Acceptance, span: SourceSpan) -> Result<(), ParseError> {
        let process = self.current_process(span)?;
        if *self.builder.process(process).acceptance() != Acceptance::None {
            return Err(self.error(span, "acceptance condition declared twice".to_owned()));
        }
        self.builder.process_mut(process).set_acceptance(acceptance);
        Ok(())
    }

    /// Attaches the expression on top of the stack as an assertion of a state.
    pub(crate) fn add_assertion(&mut self, state: &str, span: SourceSpan) -> Result<(), ParseError> {
        let process = self.current_process(span)?;
        let lid = self.state_lid(state, span)?;
        let assertion = self.stack.pop()?;
        self.builder.process_mut(process).add_assertion(lid, assertion);
        Ok(())
    }

    /// Starts a transition; without a start state, the one of the previous transition is used.
    pub(crate) fn begin_transition(
        &mut self,
        from: Option<(&str, SourceSpan)>,
        to: (&str, SourceSpan),
        span: SourceSpan,
    ) -> Result<(), ParseError> {
        let process = self.current_process(span)?;
        let from = match from {
            Some((name, span)) => self.state(name, span)?,
            None => match self.last_from {
                Some(from) => from,
                None => {
                    return Err(self.error(span, "transition without start state".to_owned()));
                }
            },
        };
        let to = self.state(to.0, to.1)?;
        self.last_from = Some(from);
        self.transition = Some(Transition::new(process, from, to, Some(span)));
        Ok(())
    }

    fn transition_mut(&mut self, span: SourceSpan) -> Result<&mut Transition, ParseError> {
        self.transition
            .as_mut()
            .ok_or_else(|| ParseError::Semantic {
                span,
                message: "statement outside of a transition".to_owned(),
            })
    }

    /// Sets the conjunction of the topmost `count` expressions as guard of the current transition.
    pub(crate) fn set_guard(&mut self, count: usize, span: SourceSpan) -> Result<(), ParseError> {
        let guard = self
            .stack
            .pop_n(count)?
            .into_iter()
            .reduce(|left, right| {
                let span = left.span().zip(right.span()).map(|(l, r)| l.to(r));
                Expression::binary(BinaryOp::And, left, right, span)
            });
        if let Some(guard) = guard {
            self.transition_mut(span)?.set_guard(guard);
        }
        Ok(())
    }

    fn channel(&mut self, name: &str, span: SourceSpan) -> Result<ChannelGid, ParseError> {
        let symbols = self.builder.symbols();
        let channel = symbols
            .find_global_symbol(name)
            .and_then(|id| symbols.symbol(id).as_channel())
            .map(|(channel, _)| channel);
        channel.ok_or_else(|| self.error(span, format!("undeclared channel '{name}'")))
    }

    /// Sets the synchronization of the current transition,
    /// with the topmost `count` expressions as values (sending) or targets (receiving).
    pub(crate) fn set_sync(
        &mut self,
        name: &str,
        span: SourceSpan,
        send: bool,
        count: usize,
    ) -> Result<(), ParseError> {
        let channel = self.channel(name, span)?;
        let info = self.builder.symbols().channel_info(channel).clone();
        match info.item_count {
            Some(items) if items != count => {
                return Err(self.error(
                    span,
                    format!("channel '{name}' carries messages of {items} values, found {count}"),
                ));
            }
            Some(_) => {}
            None => self.builder.symbols_mut().channel_info_mut(channel).item_count = Some(count),
        }
        if send {
            self.restrict(span, "send on a channel");
        } else if count > 0 {
            self.restrict(span, "receive of values from a channel");
        }
        if info.is_typed() {
            self.restrict(span, "synchronization on a typed channel");
        }
        let mode = match (info.is_buffered(), send) {
            (false, true) => SyncMode::Send,
            (false, false) => SyncMode::Receive,
            (true, true) => SyncMode::BufferedSend,
            (true, false) => SyncMode::BufferedReceive,
        };
        let exprs = self.stack.pop_n(count)?;
        self.transition_mut(span)?.set_sync(mode, channel, exprs);
        Ok(())
    }

    /// Adds the assignment on top of the stack as an effect of the current transition.
    pub(crate) fn add_effect(&mut self, span: SourceSpan) -> Result<(), ParseError> {
        let effect = self.stack.pop()?;
        self.transition_mut(span)?.add_effect(effect);
        Ok(())
    }

    pub(crate) fn end_transition(&mut self, span: SourceSpan) -> Result<(), ParseError> {
        let Some(transition) = self.transition.take() else {
            return Err(self.error(span, "statement outside of a transition".to_owned()));
        };
        self.builder.add_transition(transition)?;
        Ok(())
    }

    /// Resolves a variable visible from the current scope.
    fn variable(&mut self, name: &str, span: SourceSpan, indexed: bool) -> Result<VarGid, ParseError> {
        let symbols = self.builder.symbols();
        let Some(id) = symbols.find_visible_symbol(name, self.process) else {
            return Err(self.error(span, format!("undeclared variable '{name}'")));
        };
        self.check_variable(id, name, span, indexed)
    }

    fn check_variable(
        &mut self,
        id: dve_core::SymbolId,
        name: &str,
        span: SourceSpan,
        indexed: bool,
    ) -> Result<VarGid, ParseError> {
        let var = match self.builder.symbols().symbol(id).kind() {
            SymbolKind::Variable(var, info) => Some((*var, info.is_array())),
            _ => None,
        };
        match var {
            Some((var, array)) if array == indexed => Ok(var),
            Some((_, true)) => Err(self.error(span, format!("array '{name}' used without index"))),
            Some(_) => Err(self.error(span, format!("scalar variable '{name}' used with index"))),
            None => Err(self.error(span, format!("'{name}' is not a variable"))),
        }
    }

    pub(crate) fn push_value(&mut self, value: Value, span: SourceSpan) {
        self.stack.push(Expression::nat(value, Some(span)));
    }

    pub(crate) fn push_variable(&mut self, name: &str, span: SourceSpan) -> Result<(), ParseError> {
        let var = self.variable(name, span, false)?;
        self.stack.push(Expression::var(var, Some(span)));
        Ok(())
    }

    /// Wraps the index on top of the stack into an access to the named array.
    pub(crate) fn reduce_index(&mut self, name: &str, span: SourceSpan) -> Result<(), ParseError> {
        let var = self.variable(name, span, true)?;
        self.stack.reduce_index(var, false, Some(span))?;
        Ok(())
    }

    /// Pushes the target of an assignment, or of a value received from a channel.
    /// An indexed target takes its index from the top of the stack.
    pub(crate) fn push_lvalue(&mut self, name: &str, span: SourceSpan, indexed: bool) -> Result<(), ParseError> {
        let var = self.variable(name, span, indexed)?;
        let global = self.builder.symbols().variable(var).process().is_none();
        if self.builder.symbols().variable_info(var).constant {
            return Err(self.error(span, format!("assignment to constant '{name}'")));
        }
        if global {
            self.restrict(span, "assignment to a global variable");
        }
        if indexed {
            self.stack.reduce_index(var, false, Some(span))?;
        } else {
            self.stack.push(Expression::var(var, Some(span)));
        }
        Ok(())
    }

    /// Pushes an access `process->name` to a variable of another process.
    /// An indexed access takes its index from the top of the stack.
    pub(crate) fn push_foreign(
        &mut self,
        (process, process_span): (&str, SourceSpan),
        (name, span): (&str, SourceSpan),
        indexed: bool,
    ) -> Result<(), ParseError> {
        match self.foreign_scope {
            Some(scope) if scope != self.process => {
                return Err(self.error(
                    process_span.to(span),
                    "access to variables of other processes is allowed in only one process".to_owned(),
                ));
            }
            Some(_) => {}
            None => self.foreign_scope = Some(self.process),
        }
        let symbols = self.builder.symbols();
        let owner = symbols
            .find_global_symbol(process)
            .map(|id| symbols.symbol(id))
            .filter(|symbol| symbol.is_valid())
            .and_then(|symbol| symbol.as_process());
        let Some(owner) = owner else {
            return Err(self.error(process_span, format!("undeclared process '{process}'")));
        };
        let Some(id) = self.builder.symbols().find_symbol(name, owner) else {
            return Err(self.error(span, format!("undeclared variable '{process}->{name}'")));
        };
        let var = self.check_variable(id, name, span, indexed)?;
        let span = process_span.to(span);
        if indexed {
            self.stack.reduce_index(var, true, Some(span))?;
        } else {
            self.stack.push(Expression::foreign_var(var, Some(span)));
        }
        Ok(())
    }

    /// Pushes the test `process.state`,
    /// provisionally declaring the process and the state if they have not been declared yet.
    pub(crate) fn push_in_state(
        &mut self,
        (process, process_span): (&str, SourceSpan),
        (state, span): (&str, SourceSpan),
    ) -> Result<(), ParseError> {
        let owner = match self.builder.symbols().find_global_symbol(process) {
            Some(id) => match self.builder.symbols().symbol(id).as_process() {
                Some(owner) => owner,
                None => return Err(self.error(process_span, format!("'{process}' is not a process"))),
            },
            None => {
                debug!("forward reference to process {process}");
                self.builder.add_process(process, Some(process_span), false)
            }
        };
        let gid = match self.builder.symbols().find_symbol(state, owner) {
            Some(id) => match self.builder.symbols().symbol(id).as_state() {
                Some(gid) => gid,
                None => return Err(self.error(span, format!("'{process}.{state}' is not a state"))),
            },
            None => {
                debug!("forward reference to state {process}.{state}");
                self.builder.add_state(state, owner, Some(span), false)
            }
        };
        self.stack
            .push(Expression::in_state(gid, Some(process_span.to(span))));
        Ok(())
    }

    pub(crate) fn reduce_unary(&mut self, op: UnaryOp, span: SourceSpan) -> Result<(), ParseError> {
        self.stack.reduce_unary(op, Some(span))?;
        Ok(())
    }

    pub(crate) fn reduce_binary(&mut self, op: BinaryOp, span: SourceSpan) -> Result<(), ParseError> {
        self.stack.reduce_binary(op, Some(span))?;
        Ok(())
    }

    /// Completes the model with the `system` declaration and consolidates it.
    pub(crate) fn finish(
        mut self,
        synchronicity: Synchronicity,
        property: Option<(&str, SourceSpan)>,
    ) -> Result<DveSystem, ParseError> {
        self.builder.set_synchronicity(synchronicity);
        if let Some((name, span)) = property {
            let symbols = self.builder.symbols();
            let process = symbols
                .find_global_symbol(name)
                .map(|id| symbols.symbol(id))
                .filter(|symbol| symbol.is_valid())
                .and_then(|symbol| symbol.as_process());
            let Some(process) = process else {
                return Err(self.error(span, format!("undeclared process '{name}'")));
            };
            if synchronicity == Synchronicity::Sync {
                return Err(self.error(
                    span,
                    "a property process requires an asynchronous system".to_owned(),
                ));
            }
            if let Some((_, span, construct)) = self
                .restricted
                .iter()
                .find(|(owner, ..)| *owner == process)
                .copied()
            {
                return Err(self.error(
                    span,
                    format!("property process '{name}' cannot contain a {construct}"),
                ));
            }
            self.builder.set_property(Some(process));
        }
        let Self {
            builder,
            diagnostics,
            ..
        } = self;
        Ok(builder.build(diagnostics)?)
    }
}
