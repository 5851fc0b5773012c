//! Reduced elements: single radial integrals left after angular reduction.

use std::collections::BTreeSet;
use std::fmt;

use lss_symbolic::{legendre, series, Expr, Generator, SubsMap, Symbol, SymbolFactory};

use crate::database::Structural;
use crate::error::Result;
use crate::kernel::RayleighStructure;
use crate::signature::{SignatureParts, StructuralSignature};

/// One term surviving angular reduction.
///
/// The integrand depends only on the radial integration variables and the
/// external momenta. The angular variable names the cosine that was
/// integrated out by a Rayleigh change of variables, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReducedElement {
    integrand: Expr,
    measure: Expr,
    wick: Expr,
    time: Expr,
    variables: BTreeSet<Symbol>,
    external: BTreeSet<Symbol>,
    angular: Option<Symbol>,
    signature: StructuralSignature,
}

/// Everything except the integrand needed to build a [`ReducedElement`].
#[derive(Clone, Debug)]
pub struct ElementShape {
    /// Integration measure.
    pub measure: Expr,
    /// Wick contraction factor.
    pub wick: Expr,
    /// Time-dependence factor.
    pub time: Expr,
    /// Radial integration variables.
    pub variables: BTreeSet<Symbol>,
    /// External momenta.
    pub external: BTreeSet<Symbol>,
    /// Retained angular variable.
    pub angular: Option<Symbol>,
}

impl ReducedElement {
    /// Builds an element and snapshots its signature.
    #[must_use]
    pub fn new(integrand: Expr, shape: ElementShape) -> Self {
        let signature = StructuralSignature::new(SignatureParts {
            variables: &shape.variables,
            external: &shape.external,
            angular: shape.angular.as_ref(),
            rayleigh: &RayleighStructure::None,
            measure: &shape.measure,
            wick: &shape.wick,
            time: &shape.time,
        });
        Self {
            integrand,
            measure: shape.measure,
            wick: shape.wick,
            time: shape.time,
            variables: shape.variables,
            external: shape.external,
            angular: shape.angular,
            signature,
        }
    }

    /// A copy of this element with a different integrand.
    #[must_use]
    pub fn with_integrand(&self, integrand: Expr) -> Self {
        Self {
            integrand,
            ..self.clone()
        }
    }

    /// The integrand.
    #[must_use]
    pub fn integrand(&self) -> &Expr {
        &self.integrand
    }

    /// The integration measure.
    #[must_use]
    pub fn measure(&self) -> &Expr {
        &self.measure
    }

    /// The Wick contraction factor.
    #[must_use]
    pub fn wick(&self) -> &Expr {
        &self.wick
    }

    /// The time-dependence factor.
    #[must_use]
    pub fn time(&self) -> &Expr {
        &self.time
    }

    /// Radial integration variables; empty at tree level.
    #[must_use]
    pub fn variables(&self) -> &BTreeSet<Symbol> {
        &self.variables
    }

    /// External momenta.
    #[must_use]
    pub fn external(&self) -> &BTreeSet<Symbol> {
        &self.external
    }

    /// The retained angular variable.
    #[must_use]
    pub fn angular(&self) -> Option<&Symbol> {
        self.angular.as_ref()
    }

    /// Applies `map` to the integrand in place.
    ///
    /// # Errors
    ///
    /// Propagates substitution failures; the element is unchanged on error.
    pub fn simplify(&mut self, map: &SubsMap) -> Result<()> {
        self.integrand = self.integrand.subs(map)?;
        Ok(())
    }

    /// Rewrites angles between non-integration momenta as polynomials in
    /// the factory's canonical cosine symbols.
    ///
    /// `Cos(a,b)` becomes `factory.make_cosine(a, b)`, `LegendreP(l,a,b)` the
    /// corresponding polynomial, and any angle of a momentum with itself
    /// becomes one. Applying this twice is the same as applying it once.
    ///
    /// # Errors
    ///
    /// Returns an error if a rewritten angle carries a negative power of a
    /// multi-term Legendre polynomial.
    pub fn canonicalize_external_momenta(&mut self, factory: &mut SymbolFactory) -> Result<()> {
        let mut map = SubsMap::new();
        for g in self.integrand.generators() {
            let Some((a, b)) = g.angle() else { continue };
            if self.variables.contains(a) || self.variables.contains(b) {
                continue;
            }
            let replacement = if a == b {
                Expr::one()
            } else {
                let cosine = Expr::symbol(&factory.make_cosine(a, b));
                match &g {
                    Generator::Legendre { order, .. } => legendre::evaluate(*order, &cosine),
                    _ => cosine,
                }
            };
            map.insert(g, replacement);
        }
        self.simplify(&map)
    }

    /// Leading UV behaviour: Wick factor times time factor times the
    /// integrand truncated at `order` in the radial variables.
    #[must_use]
    pub fn uv_limit(&self, order: i32) -> Expr {
        let truncated = series::truncate_uv(&self.integrand, &self.variables, order);
        &(&self.wick * &self.time) * &truncated
    }

    /// Export rendering `(wick)*(time)*(measure)*(integrand)`.
    #[must_use]
    pub fn export_term(&self) -> String {
        format!(
            "({})*({})*({})*({})",
            self.wick, self.time, self.measure, self.integrand
        )
    }
}

impl Structural for ReducedElement {
    fn signature(&self) -> &StructuralSignature {
        &self.signature
    }

    fn absorb(&mut self, other: Self) -> Result<()> {
        self.integrand += other.integrand;
        Ok(())
    }

    fn is_null(&self) -> bool {
        self.integrand.is_zero()
    }
}

impl fmt::Display for ReducedElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} integrand = {}", self.signature, self.integrand)
    }
}
