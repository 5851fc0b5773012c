//! Error types for symbolic manipulation and parsing.

use thiserror::Error;

/// Failure of an algebraic operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolicError {
    /// A negative power was requested of an expression with more than one term.
    #[error("cannot invert multi-term expression '{expr}'")]
    NonInvertible {
        /// Rendering of the offending expression.
        expr: String,
    },
    /// A negative power of zero was requested.
    #[error("division by zero while substituting '{generator}'")]
    DivisionByZero {
        /// Rendering of the generator that became zero.
        generator: String,
    },
    /// A polynomial-only operation met a negative power.
    #[error("'{generator}' occurs with negative power {exponent}")]
    NegativePower {
        /// Rendering of the generator.
        generator: String,
        /// The offending exponent.
        exponent: i32,
    },
    /// A product or power pushed an exponent outside the `i32` range.
    #[error("exponent of '{generator}' overflows")]
    ExponentOverflow {
        /// Rendering of the generator.
        generator: String,
    },
}

/// Failure to parse an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Character outside the expression alphabet.
    #[error("unexpected character '{character}' at position {position}")]
    UnexpectedCharacter {
        /// The offending character.
        character: char,
        /// Byte offset in the input.
        position: usize,
    },
    /// Token stream ended or continued where it should not have.
    #[error("unexpected {found} at position {position}, expected {expected}")]
    UnexpectedToken {
        /// What was found.
        found: String,
        /// What the grammar expected.
        expected: &'static str,
        /// Byte offset in the input.
        position: usize,
    },
    /// Integer literal that does not fit the exponent type.
    #[error("exponent '{literal}' out of range")]
    ExponentOutOfRange {
        /// The literal text.
        literal: String,
    },
    /// Wrong number of arguments to a built-in function.
    #[error("{function} expects {expected} arguments, got {found}")]
    Arity {
        /// Function name.
        function: String,
        /// Expected argument count.
        expected: usize,
        /// Actual argument count.
        found: usize,
    },
    /// Division or negative power of an expression that is not a single term.
    #[error(transparent)]
    Algebra(#[from] SymbolicError),
}
