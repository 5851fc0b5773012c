//! Legendre polynomial toolkit.
//!
//! All angular averages in this workspace use the normalized solid-angle
//! measure, under which
//!
//! ```text
//! <P_l(a.n) P_m(b.n)>_n = delta_lm P_l(a.b) / (2l + 1)
//! ```
//!
//! so [`average_weight`] is the only normalization constant needed.

use std::collections::BTreeMap;

use num_traits::{One, Zero};

use crate::error::SymbolicError;
use crate::expr::{integer, rational, Expr, Monomial, Rational};
use crate::generator::Generator;

/// Power-basis coefficients of `P_l`: entry `j` multiplies `x^j`.
///
/// # Example
///
/// ```
/// use lss_symbolic::legendre;
/// use lss_symbolic::expr::rational;
///
/// let p2 = legendre::coefficients(2);
/// assert_eq!(p2, vec![rational(-1, 2), rational(0, 1), rational(3, 2)]);
/// ```
#[must_use]
pub fn coefficients(l: u32) -> Vec<Rational> {
    let mut previous = vec![Rational::one()];
    if l == 0 {
        return previous;
    }
    let mut current = vec![Rational::zero(), Rational::one()];
    for n in 1..l {
        // (n+1) P_{n+1} = (2n+1) x P_n - n P_{n-1}
        let n = i64::from(n);
        let mut next = vec![Rational::zero(); current.len() + 1];
        for (j, c) in current.iter().enumerate() {
            next[j + 1] += c * integer(2 * n + 1);
        }
        for (j, c) in previous.iter().enumerate() {
            next[j] -= c * integer(n);
        }
        let scale = rational(1, n + 1);
        for c in &mut next {
            *c *= &scale;
        }
        previous = current;
        current = next;
    }
    current
}

/// Re-expresses a power-basis polynomial in the Legendre basis.
///
/// `power[j]` multiplies `x^j`; entry `l` of the result multiplies `P_l(x)`.
/// Trailing zero orders are dropped.
#[must_use]
pub fn to_legendre_basis(power: &[Rational]) -> Vec<Rational> {
    let mut remainder: Vec<Rational> = power.to_vec();
    let mut out = vec![Rational::zero(); remainder.len()];
    for l in (0..remainder.len()).rev() {
        if remainder[l].is_zero() {
            continue;
        }
        let p = coefficients(order(l));
        let c = &remainder[l] / &p[l];
        for (j, pj) in p.iter().enumerate() {
            remainder[j] -= &c * pj;
        }
        out[l] = c;
    }
    while out.last().is_some_and(Zero::is_zero) {
        out.pop();
    }
    out
}

/// `P_l` evaluated at an arbitrary expression.
#[must_use]
pub fn evaluate(l: u32, x: &Expr) -> Expr {
    let mut out = Expr::zero();
    let mut power = Expr::one();
    for c in coefficients(l) {
        out += &power.scale(&c);
        power = &power * x;
    }
    out
}

/// `1 / (2l + 1)`, the angular average of `P_l(a.n) P_l(b.n)` relative to
/// `P_l(a.b)`.
#[must_use]
pub fn average_weight(l: u32) -> Rational {
    rational(1, 2 * i64::from(l) + 1)
}

/// Splits `expr`, viewed as a polynomial in `x`, into Legendre components.
///
/// The result maps each order `l` to the `x`-free coefficient of `P_l(x)`;
/// zero components are omitted.
///
/// # Errors
///
/// Returns [`SymbolicError::NegativePower`] if `x` occurs with a negative
/// exponent.
pub fn decompose(expr: &Expr, x: &Generator) -> Result<BTreeMap<u32, Expr>, SymbolicError> {
    let (low, high) = match (expr.ldegree(x), expr.degree(x)) {
        (Some(low), Some(high)) => (low, high),
        _ => return Ok(BTreeMap::new()),
    };
    if low < 0 {
        return Err(SymbolicError::NegativePower {
            generator: x.to_string(),
            exponent: low,
        });
    }
    let mut out: BTreeMap<u32, Expr> = BTreeMap::new();
    for j in 0..=high {
        let c = expr.coeff(x, j);
        if c.is_zero() {
            continue;
        }
        let mut unit = vec![Rational::zero(); usize::try_from(j).unwrap_or_default() + 1];
        if let Some(last) = unit.last_mut() {
            *last = Rational::one();
        }
        for (l, w) in to_legendre_basis(&unit).into_iter().enumerate() {
            if w.is_zero() {
                continue;
            }
            let slot = out.entry(order(l)).or_default();
            *slot += &c.scale(&w);
        }
    }
    out.retain(|_, v| !v.is_zero());
    Ok(out)
}

/// Replaces every `Legendre` generator by its power-basis polynomial in the
/// corresponding `Cos` generator.
#[must_use]
pub fn expand_legendre(expr: &Expr) -> Expr {
    let mut out = Expr::zero();
    for (m, c) in expr.terms() {
        let mut kept = Monomial::one();
        let mut product = Expr::constant(c.clone());
        for (g, e) in m.factors() {
            match g {
                Generator::Legendre { order, a, b } if e > 0 => {
                    let p = evaluate(*order, &Expr::cos(a, b));
                    product = &product * &p.pow(e.unsigned_abs());
                }
                _ => kept = kept.with_factor(g.clone(), e),
            }
        }
        out += &product * &Expr::term(kept, Rational::one());
    }
    out
}

fn order(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::SymbolFactory;

    #[test]
    fn low_order_coefficients() {
        assert_eq!(coefficients(0), vec![integer(1)]);
        assert_eq!(coefficients(1), vec![integer(0), integer(1)]);
        assert_eq!(
            coefficients(3),
            vec![integer(0), rational(-3, 2), integer(0), rational(5, 2)]
        );
        assert_eq!(
            coefficients(4),
            vec![
                rational(3, 8),
                integer(0),
                rational(-30, 8),
                integer(0),
                rational(35, 8)
            ]
        );
    }

    #[test]
    fn x_squared_in_legendre_basis() {
        let basis = to_legendre_basis(&[integer(0), integer(0), integer(1)]);
        assert_eq!(basis, vec![rational(1, 3), integer(0), rational(2, 3)]);
    }

    #[test]
    fn basis_change_round_trips_through_evaluation() {
        let mut sf = SymbolFactory::new();
        let x = sf.make_symbol("x");
        let xe = Expr::symbol(&x);
        let power = vec![integer(2), integer(-1), integer(0), rational(1, 4)];
        let basis = to_legendre_basis(&power);
        let mut rebuilt = Expr::zero();
        for (l, c) in basis.iter().enumerate() {
            rebuilt += evaluate(order(l), &xe).scale(c);
        }
        let mut direct = Expr::zero();
        for (j, c) in power.iter().enumerate() {
            direct += xe.pow(order(j)).scale(c);
        }
        assert_eq!(rebuilt, direct);
    }

    #[test]
    fn decompose_cosine_square() {
        let mut sf = SymbolFactory::new();
        let q = sf.make_symbol("q");
        let k = sf.make_symbol("k");
        let g = Generator::cos(&q, &k);
        let e = Expr::cos(&q, &k).pow(2);
        let parts = decompose(&e, &g).unwrap();
        assert_eq!(parts.get(&0), Some(&Expr::rational(1, 3)));
        assert_eq!(parts.get(&1), None);
        assert_eq!(parts.get(&2), Some(&Expr::rational(2, 3)));
    }

    #[test]
    fn decompose_rejects_negative_powers() {
        let mut sf = SymbolFactory::new();
        let q = sf.make_symbol("q");
        let k = sf.make_symbol("k");
        let e = Expr::cos(&q, &k).powi(-1).unwrap();
        assert!(decompose(&e, &Generator::cos(&q, &k)).is_err());
    }

    #[test]
    fn expand_legendre_inverts_decompose() {
        let mut sf = SymbolFactory::new();
        let q = sf.make_symbol("q");
        let k = sf.make_symbol("k");
        let e = Expr::legendre(2, &q, &k);
        let expected = &Expr::cos(&q, &k).pow(2).scale(&rational(3, 2)) - &Expr::rational(1, 2);
        assert_eq!(expand_legendre(&e), expected);
    }

    #[test]
    fn weights() {
        assert_eq!(average_weight(0), integer(1));
        assert_eq!(average_weight(2), rational(1, 5));
    }
}
