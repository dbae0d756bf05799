//! Models of the DVE modeling language[^1] and explicit-state successor generation for them.
//!
//! A model is declared through a [`SystemBuilder`], usually driven by a parser,
//! and consolidated into a [`DveSystem`].
//! An [`ExplicitSystem`] lays out the packed states of the model,
//! and spawns [`Generator`]s to compute initial states, enabled transitions and successors,
//! in either interleaving or synchronous semantics,
//! optionally composed with a property process.
//!
//! [^1]: Barnat, J., Brim, L., Černá, I., Moravec, P., Ročkai, P., & Šimeček, P. (2006).
//!     *DiVinE: A Tool for Distributed Verification*. CAV 2006.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod diagnostics;
mod eval;
mod explicit;
mod expression;
mod generator;
mod layout;
mod printer;
mod process;
mod state;
mod symbol_table;
mod system;
mod writer;

pub use diagnostics::{Diagnostic, Diagnostics, Severity, SourceSpan};
pub use eval::{EvalContext, EvalError, Evaluated};
pub use explicit::{ExplicitSystem, StateView};
pub use expression::{
    BinaryOp, CompactExpression, Expression, ExpressionDisplay, ExpressionError, ExpressionStack,
    Node, UnaryOp,
};
pub use generator::{EnabledTrans, EnabledTransitions, Generator};
pub use layout::{StateCreator, StateLayout};
pub use printer::PrintFlags;
pub use process::{Acceptance, Process, SyncMode, Transition, TransitionGid};
pub use state::{State, Status};
pub use symbol_table::{
    ChannelGid, ChannelInfo, ProcessGid, StateGid, Symbol, SymbolId, SymbolKind, SymbolTable,
    VarGid, VarType, VariableInfo,
};
pub use system::{DveSystem, ModelError, Synchronicity, SystemBuilder};

/// The type of the values of DVE expressions.
pub type Value = i32;

/// Shared, read-only data from which any number of working instances can be spawned,
/// such as an [`ExplicitSystem`] and its [`Generator`]s (one per exploring thread).
pub trait Definition {
    /// The instance type, borrowing from its [`Definition`].
    type I<'def>
    where
        Self: 'def;

    /// Spawns a new instance borrowing `self`.
    fn new_instance<'def>(&'def self) -> Self::I<'def>;
}
