//! Error types shared by the rewrite driver and bufferization.
//!
//! Failures come in two very different flavors:
//! * [`Precondition`]: an op can't be rewritten (by some pattern, or at all),
//!   which only leaves it untouched, and is never fatal on its own
//! * [`BufferizeError`]: the IR (or the registry) is in a state that no
//!   rewrite should ever observe, and the whole pass has to stop
//!
//! [`RewriteFailure`] combines the two, for use with `?` in patterns.

use crate::DataInst;
use thiserror::Error;

/// Why a pattern (or an op's bufferization) did not apply.
///
/// The op is left exactly as it was, and it's up to the driver to try other
/// patterns, or to leave the op for some later pass.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("pattern does not match")]
    NoMatch,

    #[error("unranked tensor types are not supported")]
    UnrankedType,

    #[error("type cannot be converted to a buffer type")]
    UnsupportedType,

    #[error("op must be nested in a module")]
    NotInModule,

    #[error("op `{0}` has no bufferization model")]
    NotBufferizable(String),

    #[error("operand #{input_idx} is produced by an op or value that cannot be bufferized")]
    NonBufferizableOperand { input_idx: u32 },
}

/// Fatal errors, which abort the whole pass.
#[derive(Debug, Error)]
pub enum BufferizeError {
    #[error("no op interfaces were installed in the context before running `{pass}`")]
    RegistryNotInitialized { pass: &'static str },

    #[error("no unused symbol name starting with `{base}` found in {attempts} attempts")]
    SymbolCollision { base: String, attempts: u32 },

    #[error("global constant pool used with a different module than it was created for")]
    ForeignGlobalPool,

    #[error("buffer resolution cycled back to {0:?}, while it was still being bufferized")]
    ResolutionCycle(DataInst),

    #[error("cannot replace {old:?}: {reason}")]
    ReplacementMismatch { old: DataInst, reason: &'static str },

    #[error("cannot erase {0:?}, its output still has uses")]
    EraseWithUses(DataInst),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    Options(#[from] OptionsError),
}

/// Result of a pattern application (or of an op's bufferization).
#[derive(Debug, Error)]
pub enum RewriteFailure {
    #[error("not applicable: {0}")]
    NotApplicable(#[from] Precondition),

    #[error(transparent)]
    Fatal(#[from] BufferizeError),
}

impl From<SymbolError> for RewriteFailure {
    fn from(e: SymbolError) -> Self {
        Self::Fatal(e.into())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("symbol `{0}` is already defined")]
    Redefinition(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("op `{0}` already has a bufferization model registered")]
    DuplicateModel(String),

    #[error("op interfaces cannot be added after bufferization has started")]
    Frozen,
}

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("alignment must be a power of two, got {0}")]
    InvalidAlignment(u32),

    #[error("invalid bufferization options: {0}")]
    Parse(#[from] serde_json::Error),
}
