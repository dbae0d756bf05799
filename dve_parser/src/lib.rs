//! Parser for the DVE modeling language.
//!
//! Sources are split into tokens by a [`logos`] lexer,
//! recognized by a recursive-descent grammar,
//! and turned into a [`DveSystem`] by a driver that resolves names and checks declarations.
//!
//! ```
//! let system = dve_parser::parse_str(
//!     "byte x;
//!     process P { state s; init s; trans s -> s { guard x < 3; effect x = x + 1; }; }
//!     system async;",
//! )?;
//! assert_eq!(system.transitions().len(), 1);
//! # Ok::<(), dve_parser::ParseError>(())
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod driver;
mod grammar;
mod lexer;

use anyhow::Context;
use dve_core::{Diagnostics, DveSystem, ExpressionError, ModelError, SourceSpan};
use log::info;
use std::path::Path;
use thiserror::Error;

/// Errors found while parsing a DVE source.
///
/// Parsing stops at the first error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Text that does not follow the grammar.
    #[error("{span} {message}")]
    Syntax {
        /// Position of the offending text.
        span: SourceSpan,
        /// What was expected.
        message: String,
    },
    /// Well-formed text with an invalid meaning:
    /// redeclarations, undeclared names, invalid initializers,
    /// or constructs that a property process cannot contain.
    #[error("{span} {message}")]
    Semantic {
        /// Position of the offending construct.
        span: SourceSpan,
        /// What is wrong with it.
        message: String,
    },
    /// The model is inconsistent as a whole.
    #[error(transparent)]
    Model(#[from] ModelError),
    /// Malformed expression.
    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

impl ParseError {
    /// Position of the error in the source, if it refers to one.
    pub fn span(&self) -> Option<SourceSpan> {
        match self {
            ParseError::Syntax { span, .. } | ParseError::Semantic { span, .. } => Some(*span),
            ParseError::Model(_) | ParseError::Expression(_) => None,
        }
    }

    fn message(&self) -> String {
        match self {
            ParseError::Syntax { message, .. } | ParseError::Semantic { message, .. } => message.clone(),
            ParseError::Model(err) => err.to_string(),
            ParseError::Expression(err) => err.to_string(),
        }
    }
}

/// Parses a DVE source, recording warnings and the error (if any) in `diagnostics`.
pub fn parse(source: &str, diagnostics: &mut Diagnostics) -> Result<DveSystem, ParseError> {
    grammar::parse(source, diagnostics)
        .inspect_err(|err| diagnostics.error(err.span(), err.message()))
}

/// Parses a DVE source.
pub fn parse_str(source: &str) -> Result<DveSystem, ParseError> {
    parse(source, &mut Diagnostics::new())
}

/// Loads and parses a DVE file.
pub fn load(path: &Path) -> anyhow::Result<DveSystem> {
    let time = std::time::Instant::now();
    info!(target: "parser", "parsing DVE model file '{}'", path.display());
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to open file '{}'", path.display()))?;
    let system = parse_str(&source)
        .with_context(|| format!("failed to parse model specification in '{}'", path.display()))?;
    info!("parsing complete in {:?}", time.elapsed());
    Ok(system)
}
