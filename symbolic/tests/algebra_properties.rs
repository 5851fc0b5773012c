//! Property-based tests for the exact algebra.
//!
//! Expressions are generated as raw term lists and materialised against a
//! fresh factory inside each case so every case owns its symbols.

use std::collections::BTreeSet;

use lss_symbolic::expr::{integer, rational};
use lss_symbolic::{legendre, parse, series, Expr, Generator, SymbolFactory};
use proptest::prelude::*;

/// (coefficient, q power, k power, Cos(q,k) power)
type RawTerm = (i64, i32, i32, u32);

fn raw_expr() -> impl Strategy<Value = Vec<RawTerm>> {
    prop::collection::vec((-6i64..=6, -2i32..=3, -2i32..=3, 0u32..=3), 0..5)
}

struct Ctx {
    sf: SymbolFactory,
}

impl Ctx {
    fn new() -> Self {
        Self {
            sf: SymbolFactory::new(),
        }
    }

    fn build(&mut self, raw: &[RawTerm]) -> Expr {
        let q = self.sf.make_symbol("q");
        let k = self.sf.make_symbol("k");
        let mut out = Expr::zero();
        for &(c, a, b, n) in raw {
            let term = Expr::symbol(&q).powi(a).unwrap()
                * Expr::symbol(&k).powi(b).unwrap()
                * Expr::cos(&q, &k).pow(n);
            out += term.scale(&integer(c));
        }
        out
    }
}

// =============================================================================
// Ring Laws
// =============================================================================

proptest! {
    /// a + b = b + a and a * b = b * a
    #[test]
    fn prop_commutative(a in raw_expr(), b in raw_expr()) {
        let mut ctx = Ctx::new();
        let (a, b) = (ctx.build(&a), ctx.build(&b));
        prop_assert_eq!(&a + &b, &b + &a);
        prop_assert_eq!(&a * &b, &b * &a);
    }

    /// a * (b + c) = a * b + a * c
    #[test]
    fn prop_distributive(a in raw_expr(), b in raw_expr(), c in raw_expr()) {
        let mut ctx = Ctx::new();
        let (a, b, c) = (ctx.build(&a), ctx.build(&b), ctx.build(&c));
        prop_assert_eq!(&a * &(&b + &c), &(&a * &b) + &(&a * &c));
    }

    /// a - a = 0
    #[test]
    fn prop_additive_inverse(a in raw_expr()) {
        let mut ctx = Ctx::new();
        let a = ctx.build(&a);
        prop_assert!((&a - &a).is_zero());
    }
}

// =============================================================================
// Text Round Trip
// =============================================================================

proptest! {
    /// parse(display(e)) = e
    #[test]
    fn prop_display_parses_back(a in raw_expr()) {
        let mut ctx = Ctx::new();
        let e = ctx.build(&a);
        let back = parse(&e.to_string(), &mut ctx.sf).unwrap();
        prop_assert_eq!(back, e);
    }
}

// =============================================================================
// Coefficients and Substitution
// =============================================================================

proptest! {
    /// Summing coeff(g, n) * g^n over the degree range rebuilds the expression.
    #[test]
    fn prop_coefficients_reassemble(a in raw_expr()) {
        let mut ctx = Ctx::new();
        let e = ctx.build(&a);
        let q = ctx.sf.make_symbol("q");
        let g = Generator::Symbol(q.clone());
        let mut rebuilt = Expr::zero();
        if let (Some(lo), Some(hi)) = (e.ldegree(&g), e.degree(&g)) {
            for n in lo..=hi {
                rebuilt += e.coeff(&g, n) * Expr::symbol(&q).powi(n).unwrap();
            }
        }
        prop_assert_eq!(rebuilt, e);
    }

    /// Renaming q -> k -> q is the identity.
    #[test]
    fn prop_relabel_swap_is_involution(a in raw_expr()) {
        let mut ctx = Ctx::new();
        let e = ctx.build(&a);
        let q = ctx.sf.make_symbol("q");
        let k = ctx.sf.make_symbol("k");
        let swap = [(q.clone(), k.clone()), (k, q)].into_iter().collect();
        prop_assert_eq!(e.relabel(&swap).relabel(&swap), e);
    }
}

// =============================================================================
// Legendre Basis
// =============================================================================

proptest! {
    /// Power basis -> Legendre basis -> evaluated polynomial is the identity.
    #[test]
    fn prop_legendre_basis_round_trip(coeffs in prop::collection::vec(-9i64..=9, 1..7)) {
        let mut sf = SymbolFactory::new();
        let x = Expr::symbol(&sf.make_symbol("x"));
        let power: Vec<_> = coeffs.iter().map(|&c| integer(c)).collect();
        let mut direct = Expr::zero();
        let mut xn = Expr::one();
        for c in &power {
            direct += xn.scale(c);
            xn = &xn * &x;
        }
        let mut rebuilt = Expr::zero();
        for (l, c) in legendre::to_legendre_basis(&power).iter().enumerate() {
            rebuilt += legendre::evaluate(u32::try_from(l).unwrap(), &x).scale(c);
        }
        prop_assert_eq!(rebuilt, direct);
    }
}

// =============================================================================
// Series
// =============================================================================

proptest! {
    /// UV truncation is linear.
    #[test]
    fn prop_truncation_additive(a in raw_expr(), b in raw_expr(), order in -3i32..4) {
        let mut ctx = Ctx::new();
        let (a, b) = (ctx.build(&a), ctx.build(&b));
        let vars = BTreeSet::from([ctx.sf.make_symbol("q")]);
        prop_assert_eq!(
            series::truncate_uv(&(&a + &b), &vars, order),
            series::truncate_uv(&a, &vars, order) + series::truncate_uv(&b, &vars, order)
        );
    }

    /// content * primitive reproduces the input.
    #[test]
    fn prop_factoring_is_exact(a in raw_expr(), d in 1i64..5) {
        let mut ctx = Ctx::new();
        let e = ctx.build(&a).scale(&rational(1, d));
        let f = series::collect_common_factors(&e);
        prop_assert_eq!(f.expand(), e);
    }
}
