//! Loop-integral kernels prior to angular reduction.

use std::collections::BTreeSet;
use std::fmt;

use lss_symbolic::{Expr, Rational, SubsMap, Symbol};
use num_traits::{One, Zero};

use crate::database::Structural;
use crate::error::{Error, Result};
use crate::signature::{SignatureParts, StructuralSignature};

/// A composite integration variable `R = a*L + b*k`.
///
/// `L` is the kernel's loop momentum and `k` one of its external momenta.
/// Built only through [`KernelBuilder::rayleigh`], which validates it
/// against the kernel.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RayleighMomentum {
    momentum: Symbol,
    loop_momentum: Symbol,
    loop_coeff: Rational,
    external: Symbol,
    external_coeff: Rational,
}

impl RayleighMomentum {
    /// The composite momentum `R`.
    #[must_use]
    pub fn momentum(&self) -> &Symbol {
        &self.momentum
    }

    /// The loop momentum `L`.
    #[must_use]
    pub fn loop_momentum(&self) -> &Symbol {
        &self.loop_momentum
    }

    /// The coefficient `a` of `L`.
    #[must_use]
    pub fn loop_coeff(&self) -> &Rational {
        &self.loop_coeff
    }

    /// The external momentum `k`.
    #[must_use]
    pub fn external(&self) -> &Symbol {
        &self.external
    }

    /// The coefficient `b` of `k`.
    #[must_use]
    pub fn external_coeff(&self) -> &Rational {
        &self.external_coeff
    }
}

impl fmt::Display for RayleighMomentum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = ({})*{} + ({})*{}",
            self.momentum, self.loop_coeff, self.loop_momentum, self.external_coeff, self.external
        )
    }
}

/// Whether a kernel carries a Rayleigh momentum.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RayleighStructure {
    /// No composite momentum.
    #[default]
    None,
    /// Exactly one composite momentum.
    One(RayleighMomentum),
}

/// One multi-dimensional loop integral before angular reduction.
///
/// The angle between two momenta is written `Cos(a,b)` or `LegendreP(l,a,b)`
/// in the integrand; a momentum's magnitude is the symbol itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopIntegralKernel {
    integrand: Expr,
    measure: Expr,
    wick: Expr,
    time: Expr,
    loop_momenta: BTreeSet<Symbol>,
    external: BTreeSet<Symbol>,
    rayleigh: RayleighStructure,
    signature: StructuralSignature,
}

impl LoopIntegralKernel {
    /// Starts building a kernel.
    #[must_use]
    pub fn builder() -> KernelBuilder {
        KernelBuilder::default()
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

    /// Loop momenta; empty for a tree-level kernel.
    #[must_use]
    pub fn loop_momenta(&self) -> &BTreeSet<Symbol> {
        &self.loop_momenta
    }

    /// External momenta.
    #[must_use]
    pub fn external(&self) -> &BTreeSet<Symbol> {
        &self.external
    }

    /// The Rayleigh structure.
    #[must_use]
    pub fn rayleigh(&self) -> &RayleighStructure {
        &self.rayleigh
    }

    /// Applies `map` to the integrand in place.
    ///
    /// # Errors
    ///
    /// Propagates substitution failures; the kernel is unchanged on error.
    pub fn simplify(&mut self, map: &SubsMap) -> Result<()> {
        self.integrand = self.integrand.subs(map)?;
        Ok(())
    }
}

impl Structural for LoopIntegralKernel {
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

impl fmt::Display for LoopIntegralKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} integrand = {}", self.signature, self.integrand)
    }
}

/// Builder for [`LoopIntegralKernel`].
///
/// Measure, Wick factor and time factor default to one.
///
/// # Example
///
/// ```
/// use lss_oneloop::LoopIntegralKernel;
/// use lss_symbolic::{parse, SymbolFactory};
///
/// let mut sf = SymbolFactory::new();
/// let q = sf.make_symbol("q");
/// let k = sf.make_symbol("k");
/// let kernel = LoopIntegralKernel::builder()
///     .integrand(parse("q^2*Cos(q,k)^2", &mut sf).unwrap())
///     .measure(parse("q^2", &mut sf).unwrap())
///     .loop_momentum(&q)
///     .external_momentum(&k)
///     .build()
///     .unwrap();
/// assert_eq!(kernel.loop_momenta().len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct KernelBuilder {
    integrand: Expr,
    measure: Option<Expr>,
    wick: Option<Expr>,
    time: Option<Expr>,
    loop_momenta: BTreeSet<Symbol>,
    external: BTreeSet<Symbol>,
    rayleigh: Option<(Symbol, Symbol, Rational, Symbol, Rational)>,
}

impl KernelBuilder {
    /// Sets the integrand.
    #[must_use]
    pub fn integrand(mut self, integrand: Expr) -> Self {
        self.integrand = integrand;
        self
    }

    /// Sets the integration measure.
    #[must_use]
    pub fn measure(mut self, measure: Expr) -> Self {
        self.measure = Some(measure);
        self
    }

    /// Sets the Wick contraction factor.
    #[must_use]
    pub fn wick(mut self, wick: Expr) -> Self {
        self.wick = Some(wick);
        self
    }

    /// Sets the time-dependence factor.
    #[must_use]
    pub fn time(mut self, time: Expr) -> Self {
        self.time = Some(time);
        self
    }

    /// Adds a loop momentum.
    #[must_use]
    pub fn loop_momentum(mut self, momentum: &Symbol) -> Self {
        self.loop_momenta.insert(momentum.clone());
        self
    }

    /// Adds an external momentum.
    #[must_use]
    pub fn external_momentum(mut self, momentum: &Symbol) -> Self {
        self.external.insert(momentum.clone());
        self
    }

    /// Declares the Rayleigh momentum `momentum = loop_coeff*loop_momentum +
    /// external_coeff*external`.
    #[must_use]
    pub fn rayleigh(
        mut self,
        momentum: &Symbol,
        loop_momentum: &Symbol,
        loop_coeff: Rational,
        external: &Symbol,
        external_coeff: Rational,
    ) -> Self {
        self.rayleigh = Some((
            momentum.clone(),
            loop_momentum.clone(),
            loop_coeff,
            external.clone(),
            external_coeff,
        ));
        self
    }

    /// Validates and builds the kernel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRayleigh`] if the Rayleigh momentum names a
    /// loop momentum or external momentum the kernel does not carry, has a
    /// zero coefficient, or reuses one of the kernel's momenta as `R`.
    pub fn build(self) -> Result<LoopIntegralKernel> {
        let rayleigh = match self.rayleigh {
            None => RayleighStructure::None,
            Some((momentum, loop_momentum, loop_coeff, external, external_coeff)) => {
                if !self.loop_momenta.contains(&loop_momentum) {
                    return Err(Error::InvalidRayleigh {
                        reason: format!("'{loop_momentum}' is not a loop momentum"),
                    });
                }
                if !self.external.contains(&external) {
                    return Err(Error::InvalidRayleigh {
                        reason: format!("'{external}' is not an external momentum"),
                    });
                }
                if loop_coeff.is_zero() || external_coeff.is_zero() {
                    return Err(Error::InvalidRayleigh {
                        reason: "coefficients must be non-zero".to_string(),
                    });
                }
                if self.loop_momenta.contains(&momentum) || self.external.contains(&momentum) {
                    return Err(Error::InvalidRayleigh {
                        reason: format!("'{momentum}' is already a kernel momentum"),
                    });
                }
                RayleighStructure::One(RayleighMomentum {
                    momentum,
                    loop_momentum,
                    loop_coeff,
                    external,
                    external_coeff,
                })
            }
        };
        let measure = self.measure.unwrap_or_else(Expr::one);
        let wick = self.wick.unwrap_or_else(Expr::one);
        let time = self.time.unwrap_or_else(Expr::one);
        let signature = StructuralSignature::new(SignatureParts {
            variables: &self.loop_momenta,
            external: &self.external,
            angular: None,
            rayleigh: &rayleigh,
            measure: &measure,
            wick: &wick,
            time: &time,
        });
        Ok(LoopIntegralKernel {
            integrand: self.integrand,
            measure,
            wick,
            time,
            loop_momenta: self.loop_momenta,
            external: self.external,
            rayleigh,
            signature,
        })
    }
}

/// True if `|c| == 1`.
pub(crate) fn is_unit(c: &Rational) -> bool {
    c.is_one() || (-c).is_one()
}
