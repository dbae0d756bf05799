//! Expressions over variables, control states and integer literals.
//!
//! Expressions are built bottom-up by a parser, following a shift-reduce protocol on an [`ExpressionStack`],
//! and can then be evaluated either by walking the tree ([`Expression::eval_tree`])
//! or, after [`Expression::compact`], by walking its flat [`CompactExpression`] encoding.

mod compact;

pub use compact::CompactExpression;

use crate::{
    SourceSpan, StateGid, SymbolTable, Value, VarGid,
    eval::{ErrorSink, EvalContext, EvalError, Evaluated},
};
use std::fmt;
use thiserror::Error;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Explicit parentheses, kept to reproduce the source.
    Parenthesis,
    /// Arithmetic negation `-`.
    Minus,
    /// Bitwise complement `~`.
    Tilde,
    /// Logical negation `not`.
    Not,
}

impl UnaryOp {
    pub(crate) const ALL: [UnaryOp; 4] = [
        UnaryOp::Parenthesis,
        UnaryOp::Minus,
        UnaryOp::Tilde,
        UnaryOp::Not,
    ];

    #[inline(always)]
    pub(crate) fn apply(self, value: Value) -> Value {
        match self {
            UnaryOp::Parenthesis => value,
            UnaryOp::Minus => value.wrapping_neg(),
            UnaryOp::Tilde => !value,
            UnaryOp::Not => Value::from(value == 0),
        }
    }
}

/// Binary operators, by increasing precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Assignment `=`, only valid as an effect.
    Assign,
    /// Logical implication `imply`.
    Imply,
    /// Logical disjunction `or`.
    Or,
    /// Logical conjunction `and`.
    And,
    /// Bitwise or `|`.
    BitOr,
    /// Bitwise xor `^`.
    BitXor,
    /// Bitwise and `&`.
    BitAnd,
    /// Equality `==`.
    Eq,
    /// Disequality `!=`.
    Neq,
    /// `<`
    Lt,
    /// `<=`
    Leq,
    /// `>`
    Gt,
    /// `>=`
    Geq,
    /// Left shift `<<`.
    Shl,
    /// Right shift `>>`.
    Shr,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
}

impl BinaryOp {
    pub(crate) const ALL: [BinaryOp; 20] = [
        BinaryOp::Assign,
        BinaryOp::Imply,
        BinaryOp::Or,
        BinaryOp::And,
        BinaryOp::BitOr,
        BinaryOp::BitXor,
        BinaryOp::BitAnd,
        BinaryOp::Eq,
        BinaryOp::Neq,
        BinaryOp::Lt,
        BinaryOp::Leq,
        BinaryOp::Gt,
        BinaryOp::Geq,
        BinaryOp::Shl,
        BinaryOp::Shr,
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Mod,
    ];

    /// Binding strength of the operator: higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Assign => 1,
            BinaryOp::Imply => 2,
            BinaryOp::Or => 3,
            BinaryOp::And => 4,
            BinaryOp::BitOr => 5,
            BinaryOp::BitXor => 6,
            BinaryOp::BitAnd => 7,
            BinaryOp::Eq | BinaryOp::Neq => 8,
            BinaryOp::Lt | BinaryOp::Leq | BinaryOp::Gt | BinaryOp::Geq => 9,
            BinaryOp::Shl | BinaryOp::Shr => 10,
            BinaryOp::Add | BinaryOp::Sub => 11,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 12,
        }
    }

    /// Whether `a op b op c` reads as `a op (b op c)`.
    pub fn is_right_associative(self) -> bool {
        matches!(self, BinaryOp::Assign | BinaryOp::Imply)
    }

    /// Whether the right operand is only evaluated when the left one does not decide the result.
    #[inline(always)]
    pub fn is_lazy(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Imply)
    }

    /// Result of the lazy operator if the left operand already decides it.
    #[inline(always)]
    pub(crate) fn short_circuit(self, left: Value) -> Option<Value> {
        match self {
            BinaryOp::And if left == 0 => Some(0),
            BinaryOp::Or if left != 0 => Some(1),
            BinaryOp::Imply if left == 0 => Some(1),
            _ => None,
        }
    }

    /// Applies the operator to the values of its operands.
    #[inline(always)]
    pub(crate) fn apply(self, left: Value, right: Value) -> Result<Value, EvalError> {
        Ok(match self {
            BinaryOp::Assign => right,
            BinaryOp::Imply => Value::from(left == 0 || right != 0),
            BinaryOp::Or => Value::from(left != 0 || right != 0),
            BinaryOp::And => Value::from(left != 0 && right != 0),
            BinaryOp::BitOr => left | right,
            BinaryOp::BitXor => left ^ right,
            BinaryOp::BitAnd => left & right,
            BinaryOp::Eq => Value::from(left == right),
            BinaryOp::Neq => Value::from(left != right),
            BinaryOp::Lt => Value::from(left < right),
            BinaryOp::Leq => Value::from(left <= right),
            BinaryOp::Gt => Value::from(left > right),
            BinaryOp::Geq => Value::from(left >= right),
            BinaryOp::Shl => left.wrapping_shl(right as u32),
            BinaryOp::Shr => left.wrapping_shr(right as u32),
            BinaryOp::Add => left.wrapping_add(right),
            BinaryOp::Sub => left.wrapping_sub(right),
            BinaryOp::Mul => left.wrapping_mul(right),
            BinaryOp::Div if right == 0 => return Err(EvalError::DivisionByZero),
            BinaryOp::Div => left.wrapping_div(right),
            BinaryOp::Mod if right == 0 => return Err(EvalError::DivisionByZero),
            BinaryOp::Mod => left.wrapping_rem(right),
        })
    }

    fn token(self) -> &'static str {
        match self {
            BinaryOp::Assign => "=",
            BinaryOp::Imply => "imply",
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Leq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Geq => ">=",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

/// A node of an expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Integer literal.
    Nat(Value),
    /// Scalar variable.
    /// `foreign` marks the `Process->var` syntax, which is evaluated the same way.
    Var {
        /// The variable.
        var: VarGid,
        /// Whether the variable is accessed with the `Process->var` syntax.
        foreign: bool,
    },
    /// Element of an array variable.
    Index {
        /// The array.
        var: VarGid,
        /// Whether the array is accessed with the `Process->var[i]` syntax.
        foreign: bool,
        /// The index.
        index: Box<Expression>,
    },
    /// Test `Process.state`, true when the owning process is in the given state.
    Dot(StateGid),
    /// Unary operation.
    Unary(UnaryOp, Box<Expression>),
    /// Binary operation.
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
}

/// An expression tree, with an optional compacted encoding.
#[derive(Debug, Clone)]
pub struct Expression {
    node: Node,
    span: Option<SourceSpan>,
    compacted: Option<CompactExpression>,
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl Eq for Expression {}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Self::nat(value, None)
    }
}

impl Expression {
    fn new(node: Node, span: Option<SourceSpan>) -> Self {
        Self {
            node,
            span,
            compacted: None,
        }
    }

    /// Integer literal.
    pub fn nat(value: Value, span: Option<SourceSpan>) -> Self {
        Self::new(Node::Nat(value), span)
    }

    /// Reference to a scalar variable.
    pub fn var(var: VarGid, span: Option<SourceSpan>) -> Self {
        Self::new(Node::Var { var, foreign: false }, span)
    }

    /// Reference to a variable with the `Process->var` syntax.
    pub fn foreign_var(var: VarGid, span: Option<SourceSpan>) -> Self {
        Self::new(Node::Var { var, foreign: true }, span)
    }

    /// Reference to an array element.
    pub fn index(var: VarGid, index: Expression, span: Option<SourceSpan>) -> Self {
        Self::new(
            Node::Index {
                var,
                foreign: false,
                index: Box::new(index),
            },
            span,
        )
    }

    /// Test of the control state of a process.
    pub fn in_state(state: StateGid, span: Option<SourceSpan>) -> Self {
        Self::new(Node::Dot(state), span)
    }

    /// Unary operation.
    pub fn unary(op: UnaryOp, arg: Expression, span: Option<SourceSpan>) -> Self {
        Self::new(Node::Unary(op, Box::new(arg)), span)
    }

    /// Binary operation.
    pub fn binary(op: BinaryOp, left: Expression, right: Expression, span: Option<SourceSpan>) -> Self {
        Self::new(Node::Binary(op, Box::new(left), Box::new(right)), span)
    }

    /// Assignment `target = value`.
    pub fn assign(target: Expression, value: Expression, span: Option<SourceSpan>) -> Self {
        Self::binary(BinaryOp::Assign, target, value, span)
    }

    /// The root node.
    #[inline(always)]
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Mutable access to the root node.
    ///
    /// Drops the compacted encoding, which has to be rebuilt with [`Self::compact`].
    pub fn node_mut(&mut self) -> &mut Node {
        self.compacted = None;
        &mut self.node
    }

    /// Source position of the expression.
    pub fn span(&self) -> Option<SourceSpan> {
        self.span
    }

    /// Replaces the contents of `self` with a deep copy of `other`, compacted encoding included.
    pub fn assign_from(&mut self, other: &Expression) {
        self.clone_from(other);
    }

    /// Exchanges the contents of two expressions without copying.
    pub fn swap(&mut self, other: &mut Expression) {
        std::mem::swap(self, other);
    }

    /// The variable referenced by an l-value, i.e., a variable or an array element.
    pub fn lvalue_var(&self) -> Option<VarGid> {
        match self.node {
            Node::Var { var, .. } | Node::Index { var, .. } => Some(var),
            _ => None,
        }
    }

    /// For assignments, the assigned l-value and the assigned expression.
    pub fn as_assignment(&self) -> Option<(&Expression, &Expression)> {
        match &self.node {
            Node::Binary(BinaryOp::Assign, target, value) => Some((target, value)),
            _ => None,
        }
    }

    /// The compacted encoding, if built.
    pub fn compacted(&self) -> Option<&CompactExpression> {
        self.compacted.as_ref()
    }

    /// Builds the compacted encoding of the expression and of all its sub-expressions.
    pub fn compact(&mut self) {
        match &mut self.node {
            Node::Nat(_) | Node::Var { .. } | Node::Dot(_) => {}
            Node::Index { index, .. } => index.compact(),
            Node::Unary(_, arg) => arg.compact(),
            Node::Binary(_, left, right) => {
                left.compact();
                right.compact();
            }
        }
        self.compacted = Some(CompactExpression::build(self));
    }

    /// Evaluates the expression, using the compacted encoding if available.
    #[inline(always)]
    pub fn eval<C: EvalContext>(&self, ctx: &C) -> Evaluated {
        match &self.compacted {
            Some(compacted) => compacted.eval(ctx),
            None => self.eval_tree(ctx),
        }
    }

    /// Evaluates the expression by walking the tree.
    ///
    /// The walk uses an explicit stack, so that deep expressions cannot overflow the call stack.
    /// Logical operators (`and`, `or`, `imply`) only evaluate their right operand when needed.
    ///
    /// ```
    /// # use dve_core::*;
    /// # struct NoVars;
    /// # impl EvalContext for NoVars {
    /// #     fn variable(&self, var: VarGid) -> Result<Value, EvalError> { Err(EvalError::Uninitialized(var)) }
    /// #     fn element(&self, var: VarGid, _: Value) -> Result<Value, EvalError> { Err(EvalError::Uninitialized(var)) }
    /// #     fn in_state(&self, _: StateGid) -> Result<bool, EvalError> { Ok(false) }
    /// # }
    /// let div = Expression::binary(BinaryOp::Div, Expression::from(1), Expression::from(0), None);
    /// let res = div.eval_tree(&NoVars);
    /// assert_eq!(res.value, 0);
    /// assert_eq!(res.error, Some(EvalError::DivisionByZero));
    ///
    /// // The right operand is never evaluated.
    /// let or = Expression::binary(BinaryOp::Or, Expression::from(1), div, None);
    /// assert_eq!(or.eval_tree(&NoVars).into_result(), Ok(1));
    /// ```
    pub fn eval_tree<C: EvalContext>(&self, ctx: &C) -> Evaluated {
        enum Task<'e> {
            Visit(&'e Expression),
            // Left operand of a lazy operator is on top of the value stack.
            Decide(BinaryOp, &'e Expression),
            Apply(&'e Expression),
            Truth,
        }

        let mut errors = ErrorSink::default();
        let mut tasks = vec![Task::Visit(self)];
        let mut values: Vec<Value> = Vec::new();
        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(expr) => match &expr.node {
                    Node::Nat(value) => values.push(*value),
                    Node::Var { var, .. } => values.push(errors.take(ctx.variable(*var))),
                    Node::Dot(state) => {
                        values.push(errors.take(ctx.in_state(*state).map(Value::from)))
                    }
                    Node::Index { index, .. } => {
                        tasks.push(Task::Apply(expr));
                        tasks.push(Task::Visit(index));
                    }
                    Node::Unary(_, arg) => {
                        tasks.push(Task::Apply(expr));
                        tasks.push(Task::Visit(arg));
                    }
                    Node::Binary(op, left, right) if op.is_lazy() => {
                        tasks.push(Task::Decide(*op, right));
                        tasks.push(Task::Visit(left));
                    }
                    Node::Binary(_, left, right) => {
                        tasks.push(Task::Apply(expr));
                        tasks.push(Task::Visit(right));
                        tasks.push(Task::Visit(left));
                    }
                },
                Task::Decide(op, right) => {
                    let left = values.pop().unwrap_or_default();
                    if let Some(value) = op.short_circuit(left) {
                        values.push(value);
                    } else {
                        // Result is the truth value of the right operand.
                        tasks.push(Task::Truth);
                        tasks.push(Task::Visit(right));
                    }
                }
                Task::Truth => {
                    let value = values.pop().unwrap_or_default();
                    values.push(Value::from(value != 0));
                }
                Task::Apply(expr) => {
                    match &expr.node {
                        Node::Index { var, .. } => {
                            let index = values.pop().unwrap_or_default();
                            values.push(errors.take(ctx.element(*var, index)));
                        }
                        Node::Unary(op, _) => {
                            let value = values.pop().unwrap_or_default();
                            values.push(op.apply(value));
                        }
                        Node::Binary(op, ..) => {
                            let right = values.pop().unwrap_or_default();
                            let left = values.pop().unwrap_or_default();
                            values.push(errors.take(op.apply(left, right)));
                        }
                        Node::Nat(_) | Node::Var { .. } | Node::Dot(_) => {
                            unreachable!("leaves are never scheduled for application")
                        }
                    }
                }
            }
        }
        Evaluated {
            value: values.pop().unwrap_or_default(),
            error: errors.0,
        }
    }

    /// Displays the expression in DVE syntax, resolving names in `table`.
    pub fn display<'a>(&'a self, table: &'a SymbolTable) -> ExpressionDisplay<'a> {
        ExpressionDisplay { expr: self, table }
    }
}

/// Helper to display an [`Expression`] in DVE syntax.
pub struct ExpressionDisplay<'a> {
    expr: &'a Expression,
    table: &'a SymbolTable,
}

impl ExpressionDisplay<'_> {
    fn write_var(&self, f: &mut fmt::Formatter<'_>, var: VarGid, foreign: bool) -> fmt::Result {
        let symbol = self.table.variable(var);
        if foreign {
            if let Some(process) = symbol.process() {
                write!(f, "{}->", self.table.process(process).name())?;
            }
        }
        write!(f, "{}", symbol.name())
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, expr: &Expression) -> fmt::Result {
        match &expr.node {
            Node::Nat(value) => write!(f, "{value}"),
            Node::Var { var, foreign } => self.write_var(f, *var, *foreign),
            Node::Index { var, foreign, index } => {
                self.write_var(f, *var, *foreign)?;
                write!(f, "[")?;
                self.write(f, index)?;
                write!(f, "]")
            }
            Node::Dot(state) => {
                let symbol = self.table.state(*state);
                if let Some(process) = symbol.process() {
                    write!(f, "{}.", self.table.process(process).name())?;
                }
                write!(f, "{}", symbol.name())
            }
            Node::Unary(UnaryOp::Parenthesis, arg) => {
                write!(f, "(")?;
                self.write(f, arg)?;
                write!(f, ")")
            }
            Node::Unary(op, arg) => {
                match op {
                    UnaryOp::Minus => write!(f, "-")?,
                    UnaryOp::Tilde => write!(f, "~")?,
                    UnaryOp::Not => write!(f, "not ")?,
                    UnaryOp::Parenthesis => unreachable!("handled above"),
                }
                self.write_operand(f, arg, matches!(arg.node, Node::Binary(..)))
            }
            Node::Binary(op, left, right) => {
                let wrap = |child: &Expression, right_side: bool| match child.node {
                    Node::Binary(child_op, ..) => {
                        child_op.precedence() < op.precedence()
                            || (child_op.precedence() == op.precedence()
                                && right_side != op.is_right_associative())
                    }
                    _ => false,
                };
                self.write_operand(f, left, wrap(left, false))?;
                write!(f, " {} ", op.token())?;
                self.write_operand(f, right, wrap(right, true))
            }
        }
    }

    fn write_operand(&self, f: &mut fmt::Formatter<'_>, expr: &Expression, wrap: bool) -> fmt::Result {
        if wrap {
            write!(f, "(")?;
            self.write(f, expr)?;
            write!(f, ")")
        } else {
            self.write(f, expr)
        }
    }
}

impl fmt::Display for ExpressionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, self.expr)
    }
}

/// Errors in the use of an [`ExpressionStack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// Not enough sub-expressions on the stack to build a node.
    #[error("expected {expected} sub-expressions on the stack, found {found}")]
    StackUnderflow {
        /// Required sub-expressions.
        expected: usize,
        /// Available sub-expressions.
        found: usize,
    },
}

/// Stack of already-built sub-expressions, reduced into larger expressions as a parser recognizes them.
///
/// ```
/// # use dve_core::*;
/// let mut stack = ExpressionStack::new();
/// stack.push(Expression::from(2));
/// stack.push(Expression::from(3));
/// stack.reduce_binary(BinaryOp::Mul, None)?;
/// stack.reduce_unary(UnaryOp::Minus, None)?;
/// let expr = stack.pop()?;
/// assert!(stack.is_empty());
/// # Ok::<(), ExpressionError>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct ExpressionStack {
    stack: Vec<Expression>,
}

impl ExpressionStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shifts a leaf expression.
    pub fn push(&mut self, expr: Expression) {
        self.stack.push(expr);
    }

    /// Pops the topmost expression.
    pub fn pop(&mut self) -> Result<Expression, ExpressionError> {
        self.stack.pop().ok_or(ExpressionError::StackUnderflow {
            expected: 1,
            found: 0,
        })
    }

    /// Pops the topmost `n` expressions, in the order they were pushed.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Expression>, ExpressionError> {
        let found = self.stack.len();
        if found < n {
            return Err(ExpressionError::StackUnderflow { expected: n, found });
        }
        Ok(self.stack.split_off(found - n))
    }

    /// Wraps the topmost expression into a unary operation.
    pub fn reduce_unary(&mut self, op: UnaryOp, span: Option<SourceSpan>) -> Result<(), ExpressionError> {
        let arg = self.pop()?;
        let span = span.or(arg.span);
        self.stack.push(Expression::unary(op, arg, span));
        Ok(())
    }

    /// Wraps the two topmost expressions into a binary operation.
    pub fn reduce_binary(&mut self, op: BinaryOp, span: Option<SourceSpan>) -> Result<(), ExpressionError> {
        let found = self.stack.len();
        if found < 2 {
            return Err(ExpressionError::StackUnderflow { expected: 2, found });
        }
        let right = self.pop()?;
        let left = self.pop()?;
        let span = span.or_else(|| left.span.zip(right.span).map(|(l, r)| l.to(r)));
        self.stack.push(Expression::binary(op, left, right, span));
        Ok(())
    }

    /// Wraps the topmost expression as the index of an array access.
    pub fn reduce_index(&mut self, var: VarGid, foreign: bool, span: Option<SourceSpan>) -> Result<(), ExpressionError> {
        let index = self.pop()?;
        self.stack.push(Expression::new(
            Node::Index {
                var,
                foreign,
                index: Box::new(index),
            },
            span,
        ));
        Ok(())
    }

    /// Number of sub-expressions on the stack.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Whether the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Drops all sub-expressions.
    pub fn clear(&mut self) {
        self.stack.clear();
    }
}
