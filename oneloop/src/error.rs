//! Error types for the reduction engine.

use lss_symbolic::SymbolicError;
use thiserror::Error;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal failure of a reduction or assembly operation.
///
/// Every variant aborts the enclosing operation. Operations that can fail
/// part-way through leave their receiver unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A raw kernel was inserted where a reduced form already exists.
    #[error("cannot insert raw kernel into reduced entry {signature}")]
    InsertAfterReduction {
        /// Signature of the rejected kernel.
        signature: String,
    },
    /// Kernels were merged into a database that is already reduced.
    #[error("cannot merge {incoming} kernel record(s) into a reduced database")]
    MergeAfterReduction {
        /// Number of records offered by the other database.
        incoming: usize,
    },
    /// The map reported a signature absent but the insertion collided.
    #[error("signature {signature} reported absent but insertion collided")]
    DuplicateInsert {
        /// Signature of the colliding entity.
        signature: String,
    },
    /// Two expansions over different momenta cannot be merged.
    #[error("cannot merge expansions over momenta '{left}' and '{right}'")]
    IncompatibleMomenta {
        /// Momentum of the receiving expansion.
        left: String,
        /// Momentum of the other expansion.
        right: String,
    },
    /// An integrand term has an angular structure the reducer cannot integrate.
    #[error("malformed angular sum in term '{term}': {reason}")]
    MalformedAngularSum {
        /// Rendering of the offending term.
        term: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Only tree-level and one-loop kernels are supported.
    #[error("kernel has {found} loop momenta, at most one is supported")]
    UnsupportedLoopOrder {
        /// Number of loop momenta found.
        found: usize,
    },
    /// The Rayleigh momentum is inconsistent with the kernel's momenta.
    #[error("invalid Rayleigh momentum: {reason}")]
    InvalidRayleigh {
        /// What is wrong with it.
        reason: String,
    },
    /// Loop and Rayleigh momenta cannot be exchanged for these coefficients.
    #[error("cannot exchange loop and Rayleigh momenta with coefficients {loop_coeff} and {external_coeff}")]
    AsymmetricExchange {
        /// Coefficient of the loop momentum.
        loop_coeff: String,
        /// Coefficient of the external momentum.
        external_coeff: String,
    },
    /// An operation needs a fully reduced expansion.
    #[error("expansion '{name}' has not been reduced")]
    NotReduced {
        /// Name of the expansion.
        name: String,
    },
    /// An algebraic operation failed.
    #[error(transparent)]
    Symbolic(#[from] SymbolicError),
}
