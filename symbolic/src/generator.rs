//! Atoms that expressions are polynomial in.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::symbol::Symbol;

/// An indivisible factor of a monomial.
///
/// Momenta are represented by their magnitude symbols; the angle between two
/// momenta is carried by [`Generator::Cos`] or, already decomposed, by
/// [`Generator::Legendre`]. Both angular variants store their arguments in
/// symbol order so that `Cos(q,k)` and `Cos(k,q)` are the same generator.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Generator {
    /// The constant π.
    Pi,
    /// A plain symbol.
    Symbol(Symbol),
    /// An opaque function of a single symbol, e.g. the linear power spectrum `Pk(q)`.
    Function {
        /// Function name.
        name: Arc<str>,
        /// Argument.
        arg: Symbol,
    },
    /// Cosine of the angle between two momenta.
    Cos(Symbol, Symbol),
    /// Legendre polynomial `P_order(Cos(a, b))`.
    Legendre {
        /// Polynomial order.
        order: u32,
        /// First momentum (lesser in symbol order).
        a: Symbol,
        /// Second momentum.
        b: Symbol,
    },
}

impl Generator {
    /// Cosine generator with canonically ordered arguments.
    #[must_use]
    pub fn cos(a: &Symbol, b: &Symbol) -> Self {
        let (a, b) = sorted(a, b);
        Generator::Cos(a, b)
    }

    /// Legendre generator with canonically ordered arguments.
    #[must_use]
    pub fn legendre(order: u32, a: &Symbol, b: &Symbol) -> Self {
        let (a, b) = sorted(a, b);
        Generator::Legendre { order, a, b }
    }

    /// Function generator.
    #[must_use]
    pub fn function(name: &str, arg: &Symbol) -> Self {
        Generator::Function {
            name: Arc::from(name),
            arg: arg.clone(),
        }
    }

    /// True if `symbol` occurs anywhere inside this generator.
    #[must_use]
    pub fn involves(&self, symbol: &Symbol) -> bool {
        match self {
            Generator::Pi => false,
            Generator::Symbol(s) => s == symbol,
            Generator::Function { arg, .. } => arg == symbol,
            Generator::Cos(a, b) | Generator::Legendre { a, b, .. } => a == symbol || b == symbol,
        }
    }

    /// The pair of momenta of an angular generator, if this is one.
    #[must_use]
    pub fn angle(&self) -> Option<(&Symbol, &Symbol)> {
        match self {
            Generator::Cos(a, b) | Generator::Legendre { a, b, .. } => Some((a, b)),
            _ => None,
        }
    }

    /// Every symbol occurring inside this generator.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        let (first, second) = match self {
            Generator::Pi => (None, None),
            Generator::Symbol(s) => (Some(s), None),
            Generator::Function { arg, .. } => (Some(arg), None),
            Generator::Cos(a, b) | Generator::Legendre { a, b, .. } => (Some(a), Some(b)),
        };
        first.into_iter().chain(second)
    }

    /// Renames symbols simultaneously; symbols absent from `map` are kept.
    #[must_use]
    pub fn relabel(&self, map: &BTreeMap<Symbol, Symbol>) -> Self {
        let rename = |s: &Symbol| map.get(s).cloned().unwrap_or_else(|| s.clone());
        match self {
            Generator::Pi => Generator::Pi,
            Generator::Symbol(s) => Generator::Symbol(rename(s)),
            Generator::Function { name, arg } => Generator::Function {
                name: Arc::clone(name),
                arg: rename(arg),
            },
            Generator::Cos(a, b) => Generator::cos(&rename(a), &rename(b)),
            Generator::Legendre { order, a, b } => {
                Generator::legendre(*order, &rename(a), &rename(b))
            }
        }
    }
}

fn sorted(a: &Symbol, b: &Symbol) -> (Symbol, Symbol) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generator::Pi => f.write_str("Pi"),
            Generator::Symbol(s) => write!(f, "{s}"),
            Generator::Function { name, arg } => write!(f, "{name}({arg})"),
            Generator::Cos(a, b) => write!(f, "Cos({a},{b})"),
            Generator::Legendre { order, a, b } => write!(f, "LegendreP({order},{a},{b})"),
        }
    }
}
