//! Error types for the payload reader and writer.
//!
//! Every violation is terminal for the instance that raised it: the state
//! machine moves to its error state and subsequent calls fail with an
//! invalid-state error rather than retrying.

use thiserror::Error;

use crate::options::CallMode;
use crate::value::PrimitiveKind;

/// A structural defect in the payload bytes themselves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// A character that cannot start or continue the expected token.
    #[error("invalid character '{0}'")]
    InvalidCharacter(char),
    /// A `\x` escape with an unknown `x`.
    #[error("invalid escape character '{0}'")]
    InvalidEscapeChar(char),
    /// A `\u` escape that does not denote a Unicode scalar value.
    #[error("invalid unicode escape sequence \\u{0:04X}")]
    InvalidUnicodeEscapeSequence(u32),
    /// The payload ended inside a token or open scope.
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
    /// A number literal outside the JSON grammar.
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    /// Any other grammar violation.
    #[error("{0}")]
    Grammar(&'static str),
}

/// An error raised by [`PayloadReader`](crate::PayloadReader).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReaderError {
    /// The payload bytes do not parse as the expected grammar.
    #[error("malformed payload: {source} at {line}:{column}")]
    MalformedWire {
        /// The underlying syntax defect.
        #[source]
        source: SyntaxError,
        /// 1-based line of the defect.
        line: usize,
        /// 1-based column of the defect.
        column: usize,
    },
    /// The cursor was advanced while a streamed value remained undrained.
    #[error("stream for '{name}' is still open; drain it before advancing")]
    OpenStream {
        /// The property or collection the stream belongs to.
        name: String,
    },
    /// The same property name resolved twice in one resource scope.
    #[error("duplicate property '{name}' in resource scope")]
    DuplicateProperty {
        /// The offending property name.
        name: String,
    },
    /// An operation was invoked in a state that does not permit it.
    #[error("invalid reader state: {reason}")]
    InvalidState {
        /// What was attempted and why it is not permitted.
        reason: String,
    },
    /// An entry point of the other calling convention was invoked.
    #[error("call does not match the configured {configured:?} mode")]
    SyncAsyncMismatch {
        /// The convention the instance was constructed with.
        configured: CallMode,
    },
    /// A materialized value does not satisfy its declaration.
    #[error("property '{name}': declared {declared:?} is incompatible with {actual:?}")]
    SchemaMismatch {
        /// The property name.
        name: String,
        /// The schema-declared kind.
        declared: PrimitiveKind,
        /// The kind actually found.
        actual: PrimitiveKind,
    },
}

impl ReaderError {
    pub(crate) fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }
}

/// An error raised by [`PayloadWriter`](crate::PayloadWriter).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriterError {
    /// A writer call was made while a scoped output channel was open.
    #[error("output stream for '{name}' is still open; close it before writing")]
    OpenStream {
        /// The property or collection the channel belongs to.
        name: String,
    },
    /// The same property name was announced twice in one resource scope.
    #[error("duplicate property '{name}' in resource scope")]
    DuplicateProperty {
        /// The offending property name.
        name: String,
    },
    /// A second value or stream was offered for a property that already has
    /// one.
    #[error("a value was already written for property '{name}'")]
    ValueAlreadyWritten {
        /// The property name.
        name: String,
    },
    /// An operation was invoked in a state that does not permit it.
    #[error("invalid writer state: {reason}")]
    InvalidState {
        /// What was attempted and why it is not permitted.
        reason: String,
    },
    /// An entry point of the other calling convention was invoked.
    #[error("call does not match the configured {configured:?} mode")]
    SyncAsyncMismatch {
        /// The convention the instance was constructed with.
        configured: CallMode,
    },
    /// A value offered for writing does not satisfy its declaration.
    #[error("property '{name}': declared {declared:?} is incompatible with {actual:?}")]
    SchemaMismatch {
        /// The property name.
        name: String,
        /// The schema-declared kind.
        declared: PrimitiveKind,
        /// The kind actually offered.
        actual: PrimitiveKind,
    },
}

impl WriterError {
    pub(crate) fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }
}
