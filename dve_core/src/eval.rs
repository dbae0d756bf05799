use crate::{StateGid, Value, VarGid};
use thiserror::Error;

/// Errors raised while evaluating expressions or firing transitions.
///
/// They never abort an evaluation:
/// the offending sub-expression yields 0 and the error is reported alongside the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Array index outside of the declared bounds.
    #[error("index {index} is out of the bounds of an array of length {len}")]
    IndexOutOfBounds {
        /// The evaluated index.
        index: Value,
        /// The length of the array.
        len: usize,
    },
    /// Read of a variable that has no value yet (e.g., a constant without initializer).
    #[error("variable {0:?} has no value")]
    Uninitialized(VarGid),
    /// A value written to a variable or channel does not fit its type,
    /// and has been truncated.
    #[error("value {0} does not fit the type of its destination")]
    ValueOutOfRange(Value),
    /// Write to a constant, which has no storage in the state.
    #[error("variable {0:?} is a constant")]
    ConstantWrite(VarGid),
    /// Assignment to an expression that is neither a variable nor an array element.
    #[error("assignment target is not an l-value")]
    InvalidTarget,
    /// Send into a full buffer, or receive from an empty one.
    #[error("channel buffer is full or empty")]
    BufferBounds,
    /// Sender and receiver of a handshake carry a different number of values.
    #[error("sender and receiver carry a different number of values")]
    ArityMismatch,
}

/// Result of an evaluation: a value, and the first error met while computing it (if any).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluated {
    /// Computed value.
    pub value: Value,
    /// First error met during the evaluation.
    pub error: Option<EvalError>,
}

impl Evaluated {
    /// Whether the value is non-zero, i.e., true.
    #[inline(always)]
    pub fn holds(&self) -> bool {
        self.value != 0
    }

    /// Turns the evaluation into a [`Result`], discarding the value if there was an error.
    pub fn into_result(self) -> Result<Value, EvalError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.value),
        }
    }
}

/// Readers used by the evaluators to access the values of variables and process states.
///
/// Different readers are used before a state layout exists (reading declared initial values)
/// and after (reading packed states).
pub trait EvalContext {
    /// Value of a scalar variable.
    fn variable(&self, var: VarGid) -> Result<Value, EvalError>;

    /// Value of the element `index` of an array variable.
    ///
    /// Implementations have to check the bounds of the array.
    fn element(&self, var: VarGid, index: Value) -> Result<Value, EvalError>;

    /// Whether the process owning `state` is currently in `state`.
    fn in_state(&self, state: StateGid) -> Result<bool, EvalError>;
}

/// Records the first error of an evaluation, and substitutes 0 for the failed value.
#[derive(Debug, Default)]
pub(crate) struct ErrorSink(pub(crate) Option<EvalError>);

impl ErrorSink {
    #[inline(always)]
    pub(crate) fn take(&mut self, res: Result<Value, EvalError>) -> Value {
        res.unwrap_or_else(|err| {
            self.0.get_or_insert(err);
            0
        })
    }
}
