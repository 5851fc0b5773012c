//! Angular reduction of a single kernel.
//!
//! Angular averages use the normalized solid-angle measure; the `4*Pi` it
//! divides out is folded into each loop element's measure. Under that
//! measure
//!
//! ```text
//! <P_l(L.d1) P_m(L.d2)>_L = delta_lm P_l(d1.d2) / (2l + 1)
//! ```
//!
//! which collapses any monomial coupling the loop direction to at most two
//! other directions into a single radial term.
//!
//! With a Rayleigh momentum `R = a*L + b*k` the angles involving `R` are first
//! rewritten in terms of `L`. Terms still depending on `|R|` are integrated
//! over `x = Cos(L,k)` by the change of variable to `s = |R|`,
//!
//! ```text
//! x = (s^2 - a^2 q^2 - b^2 k^2) / (2ab q k),   dx/2 = s ds / (2|ab| q k)
//! ```
//!
//! after any dependence on a third direction `d` has been projected onto
//! the `k` axis with `P_m(L.d) -> P_m(x) P_m(k.d)`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use lss_symbolic::expr::{integer, rational};
use lss_symbolic::{
    legendre, series, Expr, Factored, Generator, Monomial, Rational, SubsMap, Symbol,
    SymbolFactory,
};
use num_traits::Signed;

use crate::database::{Structural, StructuralDatabase};
use crate::element::{ElementShape, ReducedElement};
use crate::error::{Error, Result};
use crate::kernel::{is_unit, LoopIntegralKernel, RayleighMomentum, RayleighStructure};

/// Whether loop and Rayleigh momenta are exchanged and averaged after
/// reduction.
///
/// Only diagrams whose two internal lines are interchangeable may be
/// symmetrized, so the choice is always made explicitly by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Symmetrization {
    /// Keep the loop and Rayleigh momenta distinct.
    Preserve,
    /// Replace each two-variable integrand by its average under `L <-> R`.
    ExchangeLoopAndRayleigh,
}

/// Reduces kernels to databases of [`ReducedElement`]s.
#[derive(Clone, Copy, Debug)]
pub struct AngularReducer {
    symmetrization: Symmetrization,
}

impl AngularReducer {
    /// A reducer applying `symmetrization` to Rayleigh elements.
    #[must_use]
    pub fn new(symmetrization: Symmetrization) -> Self {
        Self { symmetrization }
    }

    /// The symmetrization policy.
    #[must_use]
    pub fn symmetrization(&self) -> Symmetrization {
        self.symmetrization
    }

    /// Reduces one kernel.
    ///
    /// Tree-level kernels pass through as a single element. Every element is
    /// canonicalized with [`ReducedElement::canonicalize_external_momenta`]
    /// before it is stored.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedLoopOrder`] for more than one loop momentum.
    /// - [`Error::MalformedAngularSum`] for a term coupling the loop
    ///   direction to too many directions, or to an angle with a negative
    ///   power.
    /// - [`Error::AsymmetricExchange`] when symmetrizing a Rayleigh kernel
    ///   whose coefficients are not both of unit magnitude.
    /// - [`Error::Symbolic`] when an algebraic step fails.
    pub fn reduce(
        &self,
        kernel: &LoopIntegralKernel,
        factory: &mut SymbolFactory,
    ) -> Result<ReducedIntegral> {
        let loops: Vec<&Symbol> = kernel.loop_momenta().iter().collect();
        let mut pieces = Vec::new();
        match loops.as_slice() {
            [] => pieces.push(ReducedElement::new(
                kernel.integrand().clone(),
                shape(kernel, kernel.measure().clone(), BTreeSet::new(), None),
            )),
            [l] => {
                let measure = kernel.measure() * &Expr::pi().scale(&integer(4));
                match kernel.rayleigh() {
                    RayleighStructure::None => pieces.push(ReducedElement::new(
                        average(kernel.integrand(), l)?,
                        shape(kernel, measure, BTreeSet::from([(*l).clone()]), None),
                    )),
                    RayleighStructure::One(r) => {
                        let rewritten = rewrite_rayleigh_angles(kernel.integrand(), r)?;
                        let (plain, composite) = split_on(&rewritten, r.momentum());
                        pieces.push(ReducedElement::new(
                            average(&plain, l)?,
                            shape(
                                kernel,
                                measure.clone(),
                                BTreeSet::from([(*l).clone()]),
                                None,
                            ),
                        ));
                        let mut integrand = integrate_rayleigh(&composite, r)?;
                        // Only the two-variable element is exchanged; the R-free
                        // element above has no R to swap and integrates alike.
                        if self.symmetrization == Symmetrization::ExchangeLoopAndRayleigh {
                            integrand = exchange_average(&integrand, &measure, r)?;
                        }
                        let angular = factory.make_cosine(r.loop_momentum(), r.external());
                        pieces.push(ReducedElement::new(
                            integrand,
                            shape(
                                kernel,
                                measure,
                                BTreeSet::from([(*l).clone(), r.momentum().clone()]),
                                Some(angular),
                            ),
                        ));
                    }
                }
            }
            _ => {
                return Err(Error::UnsupportedLoopOrder {
                    found: loops.len(),
                })
            }
        }

        let mut elements = StructuralDatabase::new();
        for mut element in pieces {
            element.canonicalize_external_momenta(factory)?;
            elements.insert(element)?;
        }
        tracing::debug!(
            "Reduced kernel {} into {} element(s)",
            kernel.signature(),
            elements.len()
        );
        Ok(ReducedIntegral { elements })
    }
}

fn shape(
    kernel: &LoopIntegralKernel,
    measure: Expr,
    variables: BTreeSet<Symbol>,
    angular: Option<Symbol>,
) -> ElementShape {
    ElementShape {
        measure,
        wick: kernel.wick().clone(),
        time: kernel.time().clone(),
        variables,
        external: kernel.external().clone(),
        angular,
    }
}

/// Splits `expr` into the terms free of `symbol` and the terms involving it.
fn split_on(expr: &Expr, symbol: &Symbol) -> (Expr, Expr) {
    let mut free = Expr::zero();
    let mut bound = Expr::zero();
    for (m, c) in expr.terms() {
        if m.depends_on(symbol) {
            bound.add_term(m.clone(), c.clone());
        } else {
            free.add_term(m.clone(), c.clone());
        }
    }
    (free, bound)
}

/// A monomial with its angular dependence on the loop direction factored out.
struct Directions {
    /// Everything not coupling the loop direction to another direction.
    rest: Expr,
    /// Per direction `d`, a polynomial in `Cos(L,d)`.
    polys: BTreeMap<Symbol, Expr>,
}

fn split_directions(m: &Monomial, c: &Rational, l: &Symbol) -> Result<Directions> {
    let mut rest = Monomial::one();
    let mut polys: BTreeMap<Symbol, Expr> = BTreeMap::new();
    for (g, e) in m.factors() {
        let Some((a, b)) = g.angle().filter(|(a, b)| *a == l || *b == l) else {
            rest = rest.with_factor(g.clone(), e);
            continue;
        };
        let direction = if a == l { b } else { a };
        if direction == l {
            continue;
        }
        if e < 0 {
            return Err(Error::MalformedAngularSum {
                term: Expr::term(m.clone(), c.clone()).to_string(),
                reason: format!("negative power of {g}"),
            });
        }
        let cosine = Expr::cos(l, direction);
        let factor = match g {
            Generator::Legendre { order, .. } => legendre::evaluate(*order, &cosine),
            _ => cosine,
        };
        let slot = polys.entry(direction.clone()).or_insert_with(Expr::one);
        *slot = &*slot * &factor.pow(e.unsigned_abs());
    }
    Ok(Directions {
        rest: Expr::term(rest, c.clone()),
        polys,
    })
}

/// `P_l(Cos(a,b))` as an expression.
fn legendre_atom(l: u32, a: &Symbol, b: &Symbol) -> Expr {
    match l {
        0 => Expr::one(),
        1 => Expr::cos(a, b),
        _ => Expr::legendre(l, a, b),
    }
}

/// Angular average of `expr` over the direction of `l`.
fn average(expr: &Expr, l: &Symbol) -> Result<Expr> {
    let mut out = Expr::zero();
    for (m, c) in expr.terms() {
        let Directions { rest, polys } = split_directions(m, c, l)?;
        let angular = match polys.len() {
            0 => Expr::one(),
            1 => {
                let mut value = Expr::zero();
                for (d, poly) in &polys {
                    let parts = legendre::decompose(poly, &Generator::cos(l, d))?;
                    value = parts.get(&0).cloned().unwrap_or_default();
                }
                value
            }
            2 => {
                let mut dirs = polys.iter();
                let (Some((d1, p1)), Some((d2, p2))) = (dirs.next(), dirs.next()) else {
                    continue;
                };
                let parts1 = legendre::decompose(p1, &Generator::cos(l, d1))?;
                let parts2 = legendre::decompose(p2, &Generator::cos(l, d2))?;
                let mut value = Expr::zero();
                for (order, a) in &parts1 {
                    if let Some(b) = parts2.get(order) {
                        let weight = Expr::constant(legendre::average_weight(*order));
                        value += &(&(a * b) * &weight) * &legendre_atom(*order, d1, d2);
                    }
                }
                value
            }
            n => {
                return Err(Error::MalformedAngularSum {
                    term: Expr::term(m.clone(), c.clone()).to_string(),
                    reason: format!("loop direction coupled to {n} directions, at most 2 allowed"),
                })
            }
        };
        out += &rest * &angular;
    }
    Ok(out)
}

/// Rewrites every angle involving `R` in terms of `L`, `k` and `Cos(L,k)`.
fn rewrite_rayleigh_angles(expr: &Expr, r: &RayleighMomentum) -> Result<Expr> {
    let (big_r, l, k) = (r.momentum(), r.loop_momentum(), r.external());
    let a = Expr::constant(r.loop_coeff().clone());
    let b = Expr::constant(r.external_coeff().clone());
    let q = Expr::symbol(l);
    let kk = Expr::symbol(k);
    let x = Expr::cos(l, k);
    let inv_s = Expr::symbol(big_r).powi(-1)?;
    let aq = &a * &q;
    let bk = &b * &kk;

    let cosine_with = |other: &Symbol| -> Expr {
        let numerator = if other == k {
            &(&aq * &x) + &bk
        } else if other == l {
            &aq + &(&bk * &x)
        } else {
            &(&aq * &Expr::cos(l, other)) + &(&bk * &Expr::cos(k, other))
        };
        &numerator * &inv_s
    };

    let mut map = SubsMap::new();
    for g in expr.generators() {
        let Some((u, v)) = g.angle() else { continue };
        if u != big_r && v != big_r {
            continue;
        }
        let other = if u == big_r { v } else { u };
        let cosine = if other == big_r {
            Expr::one()
        } else {
            cosine_with(other)
        };
        let replacement = match &g {
            Generator::Legendre { order, .. } => legendre::evaluate(*order, &cosine),
            _ => cosine,
        };
        map.insert(g, replacement);
    }
    Ok(expr.subs(&map)?)
}

/// Integrates the `|R|`-dependent terms over `Cos(L,k)` by changing variable
/// to `s = |R|`.
fn integrate_rayleigh(expr: &Expr, r: &RayleighMomentum) -> Result<Expr> {
    let (big_r, l, k) = (r.momentum(), r.loop_momentum(), r.external());
    let (a, b) = (r.loop_coeff(), r.external_coeff());
    let q = Expr::symbol(l);
    let kk = Expr::symbol(k);
    let s = Expr::symbol(big_r);
    let inv_qk = (&q * &kk).powi(-1)?;

    let ab = a * b;
    let x_of_s = &(&(&s.pow(2) - &q.pow(2).scale(&(a * a))) - &kk.pow(2).scale(&(b * b)))
        * &inv_qk.scale(&(rational(1, 2) / &ab));
    let jacobian = &s * &inv_qk.scale(&(rational(1, 2) / ab.abs()));
    let x = Generator::cos(l, k);
    let to_s = SubsMap::from([(x, x_of_s)]);

    let mut out = Expr::zero();
    for (m, c) in expr.terms() {
        let Directions { rest, mut polys } = split_directions(m, c, l)?;
        let along_k = polys.remove(k).unwrap_or_else(Expr::one);
        let angular = match polys.len() {
            0 => along_k,
            1 => {
                let mut value = Expr::zero();
                for (d, poly) in &polys {
                    for (order, weight) in legendre::decompose(poly, &Generator::cos(l, d))? {
                        let projected = &legendre::evaluate(order, &Expr::cos(l, k))
                            * &legendre_atom(order, k, d);
                        value += &(&weight * &projected) * &along_k;
                    }
                }
                value
            }
            n => {
                return Err(Error::MalformedAngularSum {
                    term: Expr::term(m.clone(), c.clone()).to_string(),
                    reason: format!(
                        "Rayleigh term couples the loop direction to {n} directions besides '{k}'"
                    ),
                })
            }
        };
        out += &(&rest * &angular.subs(&to_s)?) * &jacobian;
    }
    Ok(out)
}

/// `(f + relabel(m*f)/m) / 2` with `L` and `R` exchanged by the relabelling.
fn exchange_average(integrand: &Expr, measure: &Expr, r: &RayleighMomentum) -> Result<Expr> {
    if !is_unit(r.loop_coeff()) || !is_unit(r.external_coeff()) {
        return Err(Error::AsymmetricExchange {
            loop_coeff: r.loop_coeff().to_string(),
            external_coeff: r.external_coeff().to_string(),
        });
    }
    let swap = BTreeMap::from([
        (r.loop_momentum().clone(), r.momentum().clone()),
        (r.momentum().clone(), r.loop_momentum().clone()),
    ]);
    let exchanged = (measure * integrand).relabel(&swap).try_div(measure)?;
    Ok((integrand + &exchanged).scale(&rational(1, 2)))
}

/// The reduced form of one kernel: a database of [`ReducedElement`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReducedIntegral {
    elements: StructuralDatabase<ReducedElement>,
}

impl ReducedIntegral {
    /// The element database.
    #[must_use]
    pub fn elements(&self) -> &StructuralDatabase<ReducedElement> {
        &self.elements
    }

    /// Iterates elements in signature order.
    pub fn iter(&self) -> impl Iterator<Item = &ReducedElement> {
        self.elements.values()
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True if no element survives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Removes null elements, returning how many were removed.
    pub fn prune(&mut self) -> usize {
        self.elements.prune()
    }

    /// Applies `map` to every element's integrand.
    ///
    /// # Errors
    ///
    /// Propagates the first substitution failure; nothing is changed on
    /// error.
    pub fn simplify(&mut self, map: &SubsMap) -> Result<()> {
        let mut updated = self.elements.clone();
        for element in updated.values_mut() {
            element.simplify(map)?;
        }
        self.elements = updated;
        Ok(())
    }

    /// Canonicalizes every element's external-momentum angles.
    ///
    /// # Errors
    ///
    /// Propagates the first failure; nothing is changed on error.
    pub fn canonicalize_external_momenta(&mut self, factory: &mut SymbolFactory) -> Result<()> {
        let mut updated = self.elements.clone();
        for element in updated.values_mut() {
            element.canonicalize_external_momenta(factory)?;
        }
        self.elements = updated;
        Ok(())
    }

    /// Sum of every element's [`ReducedElement::uv_limit`].
    #[must_use]
    pub fn uv_sum(&self, order: i32) -> Expr {
        self.elements
            .values()
            .fold(Expr::zero(), |acc, e| acc + e.uv_limit(order))
    }

    /// [`uv_sum`](Self::uv_sum) with common factors collected.
    #[must_use]
    pub fn uv_limit(&self, order: i32) -> Factored {
        series::collect_common_factors(&self.uv_sum(order))
    }

    /// Export renderings of every non-null element.
    pub fn export_terms(&self) -> impl Iterator<Item = String> + '_ {
        self.elements
            .values()
            .filter(|e| !e.is_null())
            .map(ReducedElement::export_term)
    }
}

impl fmt::Display for ReducedIntegral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.elements)
    }
}
