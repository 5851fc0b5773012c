//! Exact Laurent polynomials over [`Generator`]s with rational coefficients.
//!
//! An [`Expr`] is always held in canonical expanded form: a map from
//! [`Monomial`] to a non-zero coefficient, where no monomial stores a zero
//! exponent. Consequently `expand` is the identity, structural equality is
//! mathematical equality of the polynomials, and "sum of monomials" is the
//! only shape an expression can have.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use crate::error::SymbolicError;
use crate::generator::Generator;
use crate::symbol::Symbol;

/// Exact rational coefficient.
pub type Rational = BigRational;

/// Simultaneous substitution map from generators to replacement expressions.
pub type SubsMap = BTreeMap<Generator, Expr>;

/// Builds the rational `n/d`.
///
/// `d` must be non-zero.
#[must_use]
pub fn rational(n: i64, d: i64) -> Rational {
    BigRational::new(BigInt::from(n), BigInt::from(d))
}

/// Builds the integer `n` as a rational.
#[must_use]
pub fn integer(n: i64) -> Rational {
    BigRational::from_integer(BigInt::from(n))
}

/// A product of generators raised to non-zero integer powers.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Monomial {
    powers: BTreeMap<Generator, i32>,
}

impl Monomial {
    /// The empty product.
    #[must_use]
    pub fn one() -> Self {
        Self::default()
    }

    /// `g^exp`; the empty product if `exp == 0`.
    #[must_use]
    pub fn of(g: Generator, exp: i32) -> Self {
        Self::one().with_factor(g, exp)
    }

    /// True for the empty product.
    #[must_use]
    pub fn is_one(&self) -> bool {
        self.powers.is_empty()
    }

    /// Exponent of `g` (zero if absent).
    #[must_use]
    pub fn exponent(&self, g: &Generator) -> i32 {
        self.powers.get(g).copied().unwrap_or(0)
    }

    /// Iterates `(generator, exponent)` pairs in generator order.
    pub fn factors(&self) -> impl Iterator<Item = (&Generator, i32)> {
        self.powers.iter().map(|(g, e)| (g, *e))
    }

    /// Multiplies in `g^exp`.
    ///
    /// The resulting exponent must fit in an `i32`; text-derived input goes
    /// through [`Monomial::checked_with_factor`] instead.
    #[must_use]
    pub fn with_factor(mut self, g: Generator, exp: i32) -> Self {
        if exp != 0 {
            let total = self.exponent(&g) + exp;
            self.set_power(g, total);
        }
        self
    }

    /// Multiplies in `g^exp`, refusing exponents outside the `i32` range.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolicError::ExponentOverflow`] if the exponent of `g`
    /// overflows.
    pub fn checked_with_factor(mut self, g: Generator, exp: i32) -> Result<Self, SymbolicError> {
        if exp != 0 {
            let total = self
                .exponent(&g)
                .checked_add(exp)
                .ok_or_else(|| SymbolicError::ExponentOverflow {
                    generator: g.to_string(),
                })?;
            self.set_power(g, total);
        }
        Ok(self)
    }

    fn set_power(&mut self, g: Generator, exp: i32) {
        if exp == 0 {
            self.powers.remove(&g);
        } else {
            self.powers.insert(g, exp);
        }
    }

    /// Product of two monomials.
    #[must_use]
    pub fn times(&self, other: &Monomial) -> Monomial {
        other
            .factors()
            .fold(self.clone(), |acc, (g, e)| acc.with_factor(g.clone(), e))
    }

    /// Product of two monomials with overflow-checked exponents.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolicError::ExponentOverflow`] if some exponent sum
    /// leaves the `i32` range.
    pub fn checked_times(&self, other: &Monomial) -> Result<Monomial, SymbolicError> {
        other
            .factors()
            .try_fold(self.clone(), |acc, (g, e)| acc.checked_with_factor(g.clone(), e))
    }

    /// Reciprocal monomial.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolicError::ExponentOverflow`] if an exponent is
    /// `i32::MIN`.
    pub fn inverse(&self) -> Result<Monomial, SymbolicError> {
        let powers = self
            .powers
            .iter()
            .map(|(g, e)| {
                e.checked_neg()
                    .map(|neg| (g.clone(), neg))
                    .ok_or_else(|| SymbolicError::ExponentOverflow {
                        generator: g.to_string(),
                    })
            })
            .collect::<Result<BTreeMap<Generator, i32>, SymbolicError>>()?;
        Ok(Monomial { powers })
    }

    /// This monomial with every power of `g` removed.
    #[must_use]
    pub fn without(&self, g: &Generator) -> Monomial {
        let mut out = self.clone();
        out.powers.remove(g);
        out
    }

    /// True if any generator involves `symbol`.
    #[must_use]
    pub fn depends_on(&self, symbol: &Symbol) -> bool {
        self.powers.keys().any(|g| g.involves(symbol))
    }

    /// Total power of the plain symbols in `vars`.
    #[must_use]
    pub fn degree_in(&self, vars: &BTreeSet<Symbol>) -> i32 {
        self.powers
            .iter()
            .filter_map(|(g, e)| match g {
                Generator::Symbol(s) if vars.contains(s) => Some(*e),
                _ => None,
            })
            .sum()
    }

    /// Renames symbols simultaneously inside every generator.
    #[must_use]
    pub fn relabel(&self, map: &BTreeMap<Symbol, Symbol>) -> Monomial {
        self.factors()
            .fold(Monomial::one(), |acc, (g, e)| acc.with_factor(g.relabel(map), e))
    }
}

impl fmt::Display for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_one() {
            return f.write_str("1");
        }
        for (i, (g, e)) in self.factors().enumerate() {
            if i > 0 {
                f.write_str("*")?;
            }
            match e {
                1 => write!(f, "{g}")?,
                e if e > 0 => write!(f, "{g}^{e}")?,
                e => write!(f, "{g}^({e})")?,
            }
        }
        Ok(())
    }
}

/// A Laurent polynomial in canonical expanded form.
///
/// # Example
///
/// ```
/// use lss_symbolic::{Expr, SymbolFactory};
///
/// let mut sf = SymbolFactory::new();
/// let q = Expr::symbol(&sf.make_symbol("q"));
/// let k = Expr::symbol(&sf.make_symbol("k"));
/// let e = (&q + &k) * (&q - &k);
/// assert_eq!(e, &q.pow(2) - &k.pow(2));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Expr {
    terms: BTreeMap<Monomial, Rational>,
}

impl Expr {
    /// The zero polynomial.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// The constant one.
    #[must_use]
    pub fn one() -> Self {
        Self::constant(Rational::one())
    }

    /// A rational constant.
    #[must_use]
    pub fn constant(c: Rational) -> Self {
        Self::term(Monomial::one(), c)
    }

    /// An integer constant.
    #[must_use]
    pub fn integer(n: i64) -> Self {
        Self::constant(integer(n))
    }

    /// The rational constant `n/d`; `d` must be non-zero.
    #[must_use]
    pub fn rational(n: i64, d: i64) -> Self {
        Self::constant(rational(n, d))
    }

    /// A single term `c * m`.
    #[must_use]
    pub fn term(m: Monomial, c: Rational) -> Self {
        let mut out = Self::zero();
        out.add_term(m, c);
        out
    }

    /// A generator to the first power.
    #[must_use]
    pub fn generator(g: Generator) -> Self {
        Self::term(Monomial::of(g, 1), Rational::one())
    }

    /// A plain symbol.
    #[must_use]
    pub fn symbol(s: &Symbol) -> Self {
        Self::generator(Generator::Symbol(s.clone()))
    }

    /// The constant π.
    #[must_use]
    pub fn pi() -> Self {
        Self::generator(Generator::Pi)
    }

    /// An opaque function `name(arg)`.
    #[must_use]
    pub fn function(name: &str, arg: &Symbol) -> Self {
        Self::generator(Generator::function(name, arg))
    }

    /// Cosine of the angle between `a` and `b`.
    #[must_use]
    pub fn cos(a: &Symbol, b: &Symbol) -> Self {
        Self::generator(Generator::cos(a, b))
    }

    /// Legendre polynomial `P_order(Cos(a, b))`.
    #[must_use]
    pub fn legendre(order: u32, a: &Symbol, b: &Symbol) -> Self {
        Self::generator(Generator::legendre(order, a, b))
    }

    /// True for the zero polynomial.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True for the zero polynomial.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Iterates `(monomial, coefficient)` pairs in monomial order.
    pub fn terms(&self) -> impl Iterator<Item = (&Monomial, &Rational)> {
        self.terms.iter()
    }

    /// The constant value, if this expression has no generator at all.
    #[must_use]
    pub fn as_constant(&self) -> Option<Rational> {
        match self.terms.len() {
            0 => Some(Rational::zero()),
            1 => self.terms.get(&Monomial::one()).cloned(),
            _ => None,
        }
    }

    /// The sole term, if this expression has exactly one.
    #[must_use]
    pub fn as_single_term(&self) -> Option<(&Monomial, &Rational)> {
        if self.terms.len() == 1 {
            self.terms.iter().next()
        } else {
            None
        }
    }

    /// Adds `c * m` in place.
    pub fn add_term(&mut self, m: Monomial, c: Rational) {
        if c.is_zero() {
            return;
        }
        let total = match self.terms.remove(&m) {
            Some(existing) => existing + c,
            None => c,
        };
        if !total.is_zero() {
            self.terms.insert(m, total);
        }
    }

    /// Multiplies every coefficient by `c`.
    #[must_use]
    pub fn scale(&self, c: &Rational) -> Expr {
        if c.is_zero() {
            return Expr::zero();
        }
        Expr {
            terms: self
                .terms
                .iter()
                .map(|(m, v)| (m.clone(), v * c))
                .collect(),
        }
    }

    /// Non-negative integer power.
    #[must_use]
    pub fn pow(&self, n: u32) -> Expr {
        let mut result = Expr::one();
        let mut base = self.clone();
        let mut n = n;
        while n > 0 {
            if n & 1 == 1 {
                result = &result * &base;
            }
            n >>= 1;
            if n > 0 {
                base = &base * &base;
            }
        }
        result
    }

    /// Non-negative integer power with overflow-checked exponents.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolicError::ExponentOverflow`] if an exponent of the
    /// result leaves the `i32` range.
    pub fn try_pow(&self, n: u32) -> Result<Expr, SymbolicError> {
        let mut result = Expr::one();
        let mut base = self.clone();
        let mut n = n;
        while n > 0 {
            if n & 1 == 1 {
                result = result.try_mul(&base)?;
            }
            n >>= 1;
            if n > 0 {
                base = base.try_mul(&base)?;
            }
        }
        Ok(result)
    }

    /// Integer power; negative powers need an invertible expression.
    ///
    /// # Errors
    ///
    /// Returns an error if `n < 0` and this expression is zero or has more
    /// than one term, or if an exponent of the result overflows.
    pub fn powi(&self, n: i32) -> Result<Expr, SymbolicError> {
        if n >= 0 {
            self.try_pow(n.unsigned_abs())
        } else {
            self.inverse()?.try_pow(n.unsigned_abs())
        }
    }

    /// Product with overflow-checked exponents.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolicError::ExponentOverflow`] if some exponent sum
    /// leaves the `i32` range.
    pub fn try_mul(&self, rhs: &Expr) -> Result<Expr, SymbolicError> {
        let mut out = Expr::zero();
        for (m1, c1) in &self.terms {
            for (m2, c2) in &rhs.terms {
                out.add_term(m1.checked_times(m2)?, c1 * c2);
            }
        }
        Ok(out)
    }

    /// Reciprocal of a single-term expression.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolicError::DivisionByZero`] for zero,
    /// [`SymbolicError::NonInvertible`] for multi-term expressions and
    /// [`SymbolicError::ExponentOverflow`] if an exponent cannot be negated.
    pub fn inverse(&self) -> Result<Expr, SymbolicError> {
        if self.is_zero() {
            return Err(SymbolicError::DivisionByZero {
                generator: "0".to_string(),
            });
        }
        match self.as_single_term() {
            Some((m, c)) => Ok(Expr::term(m.inverse()?, c.recip())),
            None => Err(SymbolicError::NonInvertible {
                expr: self.to_string(),
            }),
        }
    }

    /// Exact division by a single-term expression.
    ///
    /// # Errors
    ///
    /// Returns an error if `divisor` is zero or has more than one term, or if
    /// an exponent of the quotient overflows.
    pub fn try_div(&self, divisor: &Expr) -> Result<Expr, SymbolicError> {
        self.try_mul(&divisor.inverse()?)
    }

    /// Coefficient of `g^n`: the terms carrying exactly that power, with
    /// `g` removed. `n == 0` selects the terms free of `g`.
    #[must_use]
    pub fn coeff(&self, g: &Generator, n: i32) -> Expr {
        let mut out = Expr::zero();
        for (m, c) in &self.terms {
            if m.exponent(g) == n {
                out.add_term(m.without(g), c.clone());
            }
        }
        out
    }

    /// Highest power of `g`, or `None` for zero.
    #[must_use]
    pub fn degree(&self, g: &Generator) -> Option<i32> {
        self.terms.keys().map(|m| m.exponent(g)).max()
    }

    /// Lowest power of `g`, or `None` for zero.
    #[must_use]
    pub fn ldegree(&self, g: &Generator) -> Option<i32> {
        self.terms.keys().map(|m| m.exponent(g)).min()
    }

    /// Simultaneous substitution of generators.
    ///
    /// # Errors
    ///
    /// Returns an error if a generator carrying a negative power is replaced
    /// by zero or by a multi-term expression, or if an exponent overflows.
    pub fn subs(&self, map: &SubsMap) -> Result<Expr, SymbolicError> {
        if map.is_empty() {
            return Ok(self.clone());
        }
        let mut out = Expr::zero();
        for (m, c) in &self.terms {
            let mut kept = Monomial::one();
            let mut product = Expr::constant(c.clone());
            for (g, e) in m.factors() {
                match map.get(g) {
                    Some(replacement) => {
                        let factor = replacement.powi(e).map_err(|err| match err {
                            SymbolicError::DivisionByZero { .. } => {
                                SymbolicError::DivisionByZero {
                                    generator: g.to_string(),
                                }
                            }
                            other => other,
                        })?;
                        product = product.try_mul(&factor)?;
                    }
                    None => kept = kept.with_factor(g.clone(), e),
                }
            }
            for (pm, pc) in product.terms {
                out.add_term(pm.checked_times(&kept)?, pc);
            }
        }
        Ok(out)
    }

    /// Renames symbols simultaneously inside every generator.
    #[must_use]
    pub fn relabel(&self, map: &BTreeMap<Symbol, Symbol>) -> Expr {
        let mut out = Expr::zero();
        for (m, c) in &self.terms {
            out.add_term(m.relabel(map), c.clone());
        }
        out
    }

    /// True if any term involves `symbol`.
    #[must_use]
    pub fn depends_on(&self, symbol: &Symbol) -> bool {
        self.terms.keys().any(|m| m.depends_on(symbol))
    }

    /// Every generator occurring in some term.
    #[must_use]
    pub fn generators(&self) -> BTreeSet<Generator> {
        self.terms
            .keys()
            .flat_map(|m| m.factors().map(|(g, _)| g.clone()))
            .collect()
    }

    /// Every symbol occurring in some generator.
    #[must_use]
    pub fn symbols(&self) -> BTreeSet<Symbol> {
        self.terms
            .keys()
            .flat_map(|m| m.factors().flat_map(|(g, _)| g.symbols().cloned().collect::<Vec<_>>()))
            .collect()
    }
}

impl From<Rational> for Expr {
    fn from(c: Rational) -> Self {
        Expr::constant(c)
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::integer(n)
    }
}

impl From<&Symbol> for Expr {
    fn from(s: &Symbol) -> Self {
        Expr::symbol(s)
    }
}

impl From<Generator> for Expr {
    fn from(g: Generator) -> Self {
        Expr::generator(g)
    }
}

impl Add<&Expr> for &Expr {
    type Output = Expr;

    fn add(self, rhs: &Expr) -> Expr {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(mut self, rhs: Expr) -> Expr {
        self += &rhs;
        self
    }
}

impl AddAssign<&Expr> for Expr {
    fn add_assign(&mut self, rhs: &Expr) {
        for (m, c) in &rhs.terms {
            self.add_term(m.clone(), c.clone());
        }
    }
}

impl AddAssign for Expr {
    fn add_assign(&mut self, rhs: Expr) {
        for (m, c) in rhs.terms {
            self.add_term(m, c);
        }
    }
}

impl Neg for &Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr {
            terms: self.terms.iter().map(|(m, c)| (m.clone(), -c)).collect(),
        }
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        -&self
    }
}

impl Sub<&Expr> for &Expr {
    type Output = Expr;

    fn sub(self, rhs: &Expr) -> Expr {
        let mut out = self.clone();
        out -= rhs;
        out
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(mut self, rhs: Expr) -> Expr {
        self -= &rhs;
        self
    }
}

impl SubAssign<&Expr> for Expr {
    fn sub_assign(&mut self, rhs: &Expr) {
        for (m, c) in &rhs.terms {
            self.add_term(m.clone(), -c);
        }
    }
}

impl SubAssign for Expr {
    fn sub_assign(&mut self, rhs: Expr) {
        *self -= &rhs;
    }
}

impl Mul<&Expr> for &Expr {
    type Output = Expr;

    fn mul(self, rhs: &Expr) -> Expr {
        let mut out = Expr::zero();
        for (m1, c1) in &self.terms {
            for (m2, c2) in &rhs.terms {
                out.add_term(m1.times(m2), c1 * c2);
            }
        }
        out
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        &self * &rhs
    }
}

impl MulAssign<&Expr> for Expr {
    fn mul_assign(&mut self, rhs: &Expr) {
        *self = &*self * rhs;
    }
}

impl MulAssign for Expr {
    fn mul_assign(&mut self, rhs: Expr) {
        *self = &*self * &rhs;
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }
        for (i, (m, c)) in self.terms.iter().enumerate() {
            let negative = c.is_negative();
            match (i, negative) {
                (0, true) => f.write_str("-")?,
                (0, false) => {}
                (_, true) => f.write_str(" - ")?,
                (_, false) => f.write_str(" + ")?,
            }
            let magnitude = c.abs();
            if m.is_one() {
                write!(f, "{magnitude}")?;
            } else if magnitude.is_one() {
                write!(f, "{m}")?;
            } else {
                write!(f, "{magnitude}*{m}")?;
            }
        }
        Ok(())
    }
}
