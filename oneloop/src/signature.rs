//! Structural signatures: the shape of a kernel or reduced element.

use std::collections::BTreeSet;
use std::fmt;

use lss_symbolic::{Expr, Symbol};

use crate::kernel::RayleighStructure;

/// Immutable fingerprint of an entity's shape.
///
/// Two entities with equal signatures differ at most in their integrands and
/// may be merged by adding those. The signature is computed once when the
/// entity is built and stored beside it; it never includes the integrand, so
/// rewriting an integrand in place cannot invalidate a database key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StructuralSignature {
    variables: BTreeSet<Symbol>,
    external: BTreeSet<Symbol>,
    angular: Option<Symbol>,
    rayleigh: RayleighStructure,
    measure: Expr,
    wick: Expr,
    time: Expr,
}

/// Field-by-field description of a signature.
#[derive(Clone, Debug)]
pub struct SignatureParts<'a> {
    /// Integration variables.
    pub variables: &'a BTreeSet<Symbol>,
    /// External momenta.
    pub external: &'a BTreeSet<Symbol>,
    /// Retained angular variable, if any.
    pub angular: Option<&'a Symbol>,
    /// Rayleigh structure.
    pub rayleigh: &'a RayleighStructure,
    /// Integration measure.
    pub measure: &'a Expr,
    /// Wick contraction factor.
    pub wick: &'a Expr,
    /// Time-dependence factor.
    pub time: &'a Expr,
}

impl StructuralSignature {
    /// Snapshots the given parts.
    #[must_use]
    pub fn new(parts: SignatureParts<'_>) -> Self {
        Self {
            variables: parts.variables.clone(),
            external: parts.external.clone(),
            angular: parts.angular.cloned(),
            rayleigh: parts.rayleigh.clone(),
            measure: parts.measure.clone(),
            wick: parts.wick.clone(),
            time: parts.time.clone(),
        }
    }

    /// Integration variables.
    #[must_use]
    pub fn variables(&self) -> &BTreeSet<Symbol> {
        &self.variables
    }

    /// External momenta.
    #[must_use]
    pub fn external(&self) -> &BTreeSet<Symbol> {
        &self.external
    }

    /// Rayleigh structure.
    #[must_use]
    pub fn rayleigh(&self) -> &RayleighStructure {
        &self.rayleigh
    }
}

fn write_set(f: &mut fmt::Formatter<'_>, set: &BTreeSet<Symbol>) -> fmt::Result {
    f.write_str("{")?;
    for (i, s) in set.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{s}")?;
    }
    f.write_str("}")
}

impl fmt::Display for StructuralSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[vars ")?;
        write_set(f, &self.variables)?;
        f.write_str(" ext ")?;
        write_set(f, &self.external)?;
        if let Some(angular) = &self.angular {
            write!(f, " angle {angular}")?;
        }
        if let RayleighStructure::One(r) = &self.rayleigh {
            write!(f, " rayleigh {r}")?;
        }
        write!(
            f,
            " measure {} wick {} time {}]",
            self.measure, self.wick, self.time
        )
    }
}
