//! Asymptotic truncation and common-factor extraction.

use std::collections::BTreeSet;
use std::fmt;

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use crate::expr::{Expr, Monomial, Rational};
use crate::generator::Generator;
use crate::symbol::Symbol;

/// Leading terms of `expr` when every symbol in `vars` becomes large.
///
/// Rescaling `v -> v / eps` for each `v` in `vars` turns a term of total
/// degree `d` in those symbols into one proportional to `eps^(-d)`. This keeps
/// the terms with `-d < order`, i.e. the series in `eps` through
/// `eps^(order - 1)`. Opaque functions, cosines and Legendre polynomials are
/// held fixed.
#[must_use]
pub fn truncate_uv(expr: &Expr, vars: &BTreeSet<Symbol>, order: i32) -> Expr {
    let mut out = Expr::zero();
    for (m, c) in expr.terms() {
        if -m.degree_in(vars) < order {
            out.add_term(m.clone(), c.clone());
        }
    }
    out
}

/// An expression split as `content * primitive`.
///
/// `content` is a single term: the rational content of the coefficients
/// times every generator power shared by all terms. `primitive` has integer
/// coefficients with no common divisor and a positive leading coefficient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Factored {
    /// Common single-term factor.
    pub content: Expr,
    /// What remains after dividing out `content`.
    pub primitive: Expr,
}

impl Factored {
    /// Multiplies the two parts back together.
    #[must_use]
    pub fn expand(&self) -> Expr {
        &self.content * &self.primitive
    }

    /// True if the factored expression is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.content.is_zero() || self.primitive.is_zero()
    }
}

impl fmt::Display for Factored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            f.write_str("0")
        } else if self.content.is_one_constant() {
            write!(f, "{}", self.primitive)
        } else if self.primitive.is_one_constant() {
            write!(f, "{}", self.content)
        } else {
            write!(f, "({})*({})", self.content, self.primitive)
        }
    }
}

impl Expr {
    fn is_one_constant(&self) -> bool {
        self.as_constant().is_some_and(|c| c.is_one())
    }
}

/// Pulls the rational content and every shared generator power out of
/// `expr`.
///
/// A generator is shared when it appears in every term with exponents of a
/// single sign; the exponent closest to zero is extracted. Zero factors as
/// `0 * 1`.
///
/// # Example
///
/// ```
/// use lss_symbolic::{series, Expr, SymbolFactory};
///
/// let mut sf = SymbolFactory::new();
/// let q = Expr::symbol(&sf.make_symbol("q"));
/// let k = Expr::symbol(&sf.make_symbol("k"));
/// let e = &q.pow(2).scale(&lss_symbolic::expr::rational(2, 3))
///     + &(&q * &k).scale(&lss_symbolic::expr::rational(4, 3));
/// let f = series::collect_common_factors(&e);
/// assert_eq!(f.content, q.scale(&lss_symbolic::expr::rational(2, 3)));
/// assert_eq!(f.primitive, &q + &k.scale(&lss_symbolic::expr::integer(2)));
/// ```
#[must_use]
pub fn collect_common_factors(expr: &Expr) -> Factored {
    if expr.is_zero() {
        return Factored {
            content: Expr::zero(),
            primitive: Expr::one(),
        };
    }
    let content = Expr::term(shared_monomial(expr), rational_content(expr));
    let primitive = match content.inverse() {
        Ok(inv) => expr * &inv,
        Err(_) => expr.clone(),
    };
    Factored { content, primitive }
}

fn shared_monomial(expr: &Expr) -> Monomial {
    let mut terms = expr.terms().map(|(m, _)| m);
    let Some(first) = terms.next() else {
        return Monomial::one();
    };
    let mut candidates: Vec<(Generator, i32)> =
        first.factors().map(|(g, e)| (g.clone(), e)).collect();
    for m in terms {
        candidates.retain_mut(|(g, e)| {
            let other = m.exponent(g);
            if other == 0 || other.signum() != e.signum() {
                return false;
            }
            if other.abs() < e.abs() {
                *e = other;
            }
            true
        });
    }
    candidates
        .into_iter()
        .fold(Monomial::one(), |acc, (g, e)| acc.with_factor(g, e))
}

fn rational_content(expr: &Expr) -> Rational {
    let mut numerators = BigInt::zero();
    let mut denominators = BigInt::one();
    let mut leading_negative = None;
    for (_, c) in expr.terms() {
        numerators = numerators.gcd(c.numer());
        denominators = denominators.lcm(c.denom());
        if leading_negative.is_none() {
            leading_negative = Some(c.is_negative());
        }
    }
    let content = BigRational::new(numerators, denominators);
    if leading_negative == Some(true) {
        -content
    } else {
        content
    }
}
