//! End-to-end checks of the reduction pipeline: storage guarantees of the
//! expansion databases, angular reduction results, and redshift-space
//! assembly.

use std::collections::BTreeSet;

use lss_oneloop::{
    DiagramClass, Error, Export, FilterPattern, LoopExpansion, LoopIntegralKernel, MuPower,
    RsdAssembly, RsdWarning, Structural,
};
use lss_symbolic::expr::integer;
use lss_symbolic::{parse, Expr, Generator, SubsMap, Symbol, SymbolFactory};
use proptest::prelude::*;

struct Momenta {
    q: Symbol,
    k: Symbol,
    z: Symbol,
    mu: Symbol,
}

fn momenta(sf: &mut SymbolFactory) -> Momenta {
    let q = sf.make_symbol("q");
    let k = sf.make_symbol("k");
    let z = sf.make_symbol("z");
    let mu = sf.make_symbol("mu");
    sf.bind_cosine(&k, &z, mu.clone());
    Momenta { q, k, z, mu }
}

fn loop_kernel(m: &Momenta, integrand: Expr) -> LoopIntegralKernel {
    LoopIntegralKernel::builder()
        .integrand(integrand)
        .measure(Expr::symbol(&m.q).pow(2))
        .loop_momentum(&m.q)
        .external_momentum(&m.k)
        .build()
        .unwrap()
}

fn growth_weighted_kernel(m: &Momenta, integrand: Expr) -> LoopIntegralKernel {
    LoopIntegralKernel::builder()
        .integrand(integrand)
        .measure(Expr::symbol(&m.q).pow(4))
        .time(Expr::function("D", &m.z).pow(2))
        .loop_momentum(&m.q)
        .external_momentum(&m.k)
        .build()
        .unwrap()
}

fn tree_kernel(m: &Momenta, integrand: Expr) -> LoopIntegralKernel {
    LoopIntegralKernel::builder()
        .integrand(integrand)
        .external_momentum(&m.k)
        .build()
        .unwrap()
}

// =============================================================================
// Database Guarantees
// =============================================================================

#[test]
fn equal_signatures_collapse_to_one_record() {
    let mut sf = SymbolFactory::new();
    let m = momenta(&mut sf);
    let mut pk = LoopExpansion::new(&m.k, "P", "P");
    let a = parse("Pk(q)*Cos(q,k)^2", &mut sf).unwrap();
    let b = parse("q^2*Pk(q)", &mut sf).unwrap();
    pk.emplace(DiagramClass::P13, loop_kernel(&m, a.clone()))
        .unwrap();
    pk.emplace(DiagramClass::P13, loop_kernel(&m, b.clone()))
        .unwrap();
    assert_eq!(pk.p13().len(), 1);
    let record = pk.p13().records().values().next().unwrap();
    assert_eq!(record.kernel().integrand(), &(&a + &b));
}

#[test]
fn emplace_after_reduce_fails_in_every_class() {
    let mut sf = SymbolFactory::new();
    let m = momenta(&mut sf);
    let mut pk = LoopExpansion::new(&m.k, "P", "P");
    pk.emplace(DiagramClass::Tree, tree_kernel(&m, parse("Pk(k)", &mut sf).unwrap()))
        .unwrap();
    pk.reduce(&mut sf).unwrap();
    let before = pk.clone();
    for class in DiagramClass::ALL {
        let kernel = loop_kernel(&m, parse("Pk(q)", &mut sf).unwrap());
        let err = pk.emplace(class, kernel).unwrap_err();
        assert!(matches!(err, Error::InsertAfterReduction { .. }), "{class}: {err}");
    }
    assert_eq!(pk, before);
}

#[test]
fn failed_simplify_leaves_every_class_untouched() {
    let mut sf = SymbolFactory::new();
    let m = momenta(&mut sf);
    let mut pk = LoopExpansion::new(&m.k, "P", "P");
    pk.emplace(DiagramClass::Tree, tree_kernel(&m, parse("b1*Pk(k)", &mut sf).unwrap()))
        .unwrap();
    pk.emplace(
        DiagramClass::P13,
        loop_kernel(&m, parse("b1*Pk(q)/b2", &mut sf).unwrap()),
    )
    .unwrap();
    pk.reduce(&mut sf).unwrap();
    let before = pk.clone();

    let map = SubsMap::from([
        (Generator::Symbol(sf.make_symbol("b1")), Expr::integer(2)),
        (Generator::Symbol(sf.make_symbol("b2")), Expr::zero()),
    ]);
    assert!(pk.simplify(&map).is_err());
    assert_eq!(pk, before);
}

#[test]
fn vanishing_reductions_are_pruned() {
    let mut sf = SymbolFactory::new();
    let m = momenta(&mut sf);
    let mut pk = LoopExpansion::new(&m.k, "P", "P");
    let odd = parse("Pk(q)*Cos(q,k)^3", &mut sf).unwrap();
    pk.emplace(DiagramClass::P13, loop_kernel(&m, odd))
        .unwrap();
    pk.reduce(&mut sf).unwrap();
    assert_eq!(pk.p13().elements().count(), 0);
    assert!(pk.p13().elements().all(|e| !e.is_null()));
    let once = pk.clone();
    assert_eq!(pk.prune(), 0);
    assert_eq!(pk, once);
}

// =============================================================================
// Reduction Results
// =============================================================================

#[test]
fn cosine_squared_exports_as_a_third() {
    let mut sf = SymbolFactory::new();
    let m = momenta(&mut sf);
    let mut pk = LoopExpansion::new(&m.k, "P", "Pk");
    let integrand = parse("q^2*Cos(q,k)^2", &mut sf).unwrap();
    pk.emplace(DiagramClass::P13, loop_kernel(&m, integrand))
        .unwrap();
    pk.reduce(&mut sf).unwrap();
    assert_eq!(
        pk.export().unwrap(),
        "PkTree = 0;\nPkP13 = (1)*(1)*(4*Pi*q^2)*(1/3*q^2);\nPkP22 = 0;\n"
    );
}

#[test]
fn rayleigh_kernel_in_22_keeps_its_angle() {
    let mut sf = SymbolFactory::new();
    let m = momenta(&mut sf);
    let s = sf.make_symbol("s");
    let kernel = LoopIntegralKernel::builder()
        .integrand(parse("Pk(q)*Pk(s)", &mut sf).unwrap())
        .measure(Expr::symbol(&m.q).pow(2))
        .loop_momentum(&m.q)
        .external_momentum(&m.k)
        .rayleigh(&s, &m.q, integer(-1), &m.k, integer(1))
        .build()
        .unwrap();
    let mut pk = LoopExpansion::new(&m.k, "P", "P");
    pk.emplace(DiagramClass::P22, kernel).unwrap();
    pk.reduce(&mut sf).unwrap();
    let elements: Vec<_> = pk.p22().elements().collect();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].variables().len(), 2);
    assert_eq!(elements[0].angular().map(Symbol::name), Some("Cos_k_q"));
}

#[test]
fn external_angles_use_the_bound_symbol_after_reduction() {
    let mut sf = SymbolFactory::new();
    let m = momenta(&mut sf);
    let mut pk = LoopExpansion::new(&m.k, "P", "P");
    let integrand = parse("Cos(q,k)*Cos(q,z)*Pk(q)", &mut sf).unwrap();
    pk.emplace(DiagramClass::P13, loop_kernel(&m, integrand))
        .unwrap();
    pk.reduce(&mut sf).unwrap();
    let element = pk.p13().elements().next().unwrap();
    assert_eq!(element.integrand(), &parse("mu*Pk(q)/3", &mut sf).unwrap());
}

// =============================================================================
// Redshift-Space Assembly
// =============================================================================

#[test]
fn empty_pattern_is_a_warning() {
    let mut sf = SymbolFactory::new();
    let m = momenta(&mut sf);
    let b1 = sf.make_symbol("b1");
    let b2 = sf.make_symbol("b2");
    let mut pk = LoopExpansion::new(&m.k, "P", "Pk");
    let integrand = parse("b1*Pk(k)", &mut sf).unwrap();
    pk.emplace(DiagramClass::Tree, tree_kernel(&m, integrand))
        .unwrap();
    pk.reduce(&mut sf).unwrap();

    let rsd = RsdAssembly::new(
        &pk,
        FilterPattern::new().with(&b2, 1),
        BTreeSet::from([b1, b2]),
        &m.mu,
    )
    .unwrap();
    assert!(rsd.is_empty());
    assert_eq!(
        rsd.warnings(),
        &[RsdWarning::EmptyPattern {
            pattern: "b2^1".to_string()
        }]
    );
    assert!(rsd.export().unwrap().contains("Pkzb2Treezmu0 = 0;\n"));
}

#[test]
fn rsd_requires_reduction() {
    let mut sf = SymbolFactory::new();
    let m = momenta(&mut sf);
    let pk = LoopExpansion::new(&m.k, "P", "Pk");
    let err = RsdAssembly::new(&pk, FilterPattern::new(), BTreeSet::new(), &m.mu).unwrap_err();
    assert!(matches!(err, Error::NotReduced { .. }));
}

#[test]
fn merge_keeps_distinct_signatures_apart() {
    let mut sf = SymbolFactory::new();
    let m = momenta(&mut sf);
    let integrand = parse("q^2*Cos(q,k)^2*Pk(q)", &mut sf).unwrap();
    let mut left = LoopExpansion::new(&m.k, "A", "A");
    let mut right = LoopExpansion::new(&m.k, "B", "B");
    left.emplace(DiagramClass::P13, loop_kernel(&m, integrand.clone())).unwrap();
    right.emplace(DiagramClass::P13, growth_weighted_kernel(&m, integrand)).unwrap();
    left.reduce(&mut sf).unwrap();
    right.reduce(&mut sf).unwrap();

    let separate = left.uv_limit(0).expand() + right.uv_limit(0).expand();
    left.merge(&right, &mut sf).unwrap();
    assert_eq!(left.p13().len(), 2);
    assert_eq!(left.p13().elements().count(), 2);
    assert_eq!(left.uv_limit(0).expand(), separate);
    // q^2/3 * Pk(q) weighted by 1 and by D(z)^2
    let expected = parse("q^2*Pk(q)/3 + D(z)^2*q^2*Pk(q)/3", &mut sf).unwrap();
    assert_eq!(separate, expected);
}

// =============================================================================
// Properties
// =============================================================================

/// (coefficient, q power, Cos(q,k) power)
type LoopTerm = (i64, i32, u32);

fn loop_terms() -> impl Strategy<Value = Vec<LoopTerm>> {
    prop::collection::vec((-5i64..=5, -2i32..=3, 0u32..=4), 1..5)
}

fn build_loop(m: &Momenta, terms: &[LoopTerm]) -> Expr {
    let pk = Expr::function("Pk", &m.q);
    let mut out = Expr::zero();
    for &(c, a, n) in terms {
        let term = Expr::symbol(&m.q).powi(a).unwrap() * Expr::cos(&m.q, &m.k).pow(n);
        out += (&term * &pk).scale(&integer(c));
    }
    out
}

proptest! {
    /// Canonicalizing an already reduced expansion changes nothing.
    #[test]
    fn prop_canonicalization_idempotent(
        cos_coeffs in prop::collection::vec(-4i64..=4, 1..6),
        legendre_coeffs in prop::collection::vec(-4i64..=4, 1..5),
    ) {
        let mut sf = SymbolFactory::new();
        let m = momenta(&mut sf);
        let mut integrand = Expr::zero();
        for (n, c) in (0u32..).zip(&cos_coeffs) {
            integrand += Expr::cos(&m.k, &m.z).pow(n).scale(&integer(*c));
        }
        for (l, c) in (0u32..).zip(&legendre_coeffs) {
            integrand += Expr::legendre(l, &m.k, &m.z).scale(&integer(*c));
        }
        integrand = integrand * Expr::function("Pk", &m.k);

        let mut pk = LoopExpansion::new(&m.k, "P", "P");
        pk.emplace(DiagramClass::Tree, tree_kernel(&m, integrand)).unwrap();
        pk.reduce(&mut sf).unwrap();
        for element in pk.tree().elements() {
            prop_assert!(element.integrand().generators().iter().all(|g| g.angle().is_none()));
        }
        let once = pk.clone();
        pk.canonicalize_external_momenta(&mut sf).unwrap();
        prop_assert_eq!(pk, once);
    }

    /// The UV limit of a merged expansion is the sum of the UV limits.
    #[test]
    fn prop_uv_limit_additive_under_merge(
        a in loop_terms(),
        b in loop_terms(),
        order in -2i32..4,
    ) {
        let mut sf = SymbolFactory::new();
        let m = momenta(&mut sf);
        let mut left = LoopExpansion::new(&m.k, "A", "A");
        let mut right = LoopExpansion::new(&m.k, "B", "B");
        left.emplace(DiagramClass::P13, loop_kernel(&m, build_loop(&m, &a))).unwrap();
        right.emplace(DiagramClass::P13, loop_kernel(&m, build_loop(&m, &b))).unwrap();
        left.reduce(&mut sf).unwrap();
        right.reduce(&mut sf).unwrap();

        let separate = left.uv_limit(order).expand() + right.uv_limit(order).expand();
        left.merge(&right, &mut sf).unwrap();
        prop_assert_eq!(left.uv_limit(order).expand(), separate);
    }

    /// Records with distinct signatures stay apart under merge, and their UV
    /// limits add.
    #[test]
    fn prop_uv_limit_additive_across_signatures(
        a in loop_terms(),
        b in loop_terms(),
        order in -2i32..4,
    ) {
        let mut sf = SymbolFactory::new();
        let m = momenta(&mut sf);
        let mut left = LoopExpansion::new(&m.k, "A", "A");
        let mut right = LoopExpansion::new(&m.k, "B", "B");
        left.emplace(DiagramClass::P13, loop_kernel(&m, build_loop(&m, &a))).unwrap();
        right.emplace(DiagramClass::P13, growth_weighted_kernel(&m, build_loop(&m, &b))).unwrap();
        left.reduce(&mut sf).unwrap();
        right.reduce(&mut sf).unwrap();

        let separate = left.uv_limit(order).expand() + right.uv_limit(order).expand();
        let records = left.p13().len() + right.p13().len();
        left.merge(&right, &mut sf).unwrap();
        prop_assert_eq!(left.p13().len(), records);
        prop_assert_eq!(left.uv_limit(order).expand(), separate);
    }

    /// Each even power of mu up to eight lands in its own bucket; odd and
    /// higher powers are dropped.
    #[test]
    fn prop_mu_powers_route_to_buckets(coeffs in prop::collection::vec(-4i64..=4, 11)) {
        let mut sf = SymbolFactory::new();
        let m = momenta(&mut sf);
        let pk_k = Expr::function("Pk", &m.k);
        let mut integrand = Expr::zero();
        for (n, c) in (0u32..).zip(&coeffs) {
            integrand += Expr::cos(&m.k, &m.z).pow(n).scale(&integer(*c));
        }
        integrand = &integrand * &pk_k;

        let mut pk = LoopExpansion::new(&m.k, "P", "P");
        pk.emplace(DiagramClass::Tree, tree_kernel(&m, integrand)).unwrap();
        pk.reduce(&mut sf).unwrap();
        let rsd = RsdAssembly::new(&pk, FilterPattern::new(), BTreeSet::new(), &m.mu).unwrap();
        let group = rsd.group(DiagramClass::Tree);

        for power in MuPower::ALL {
            let index = usize::try_from(power.exponent()).unwrap();
            let bucket = group.bucket(power);
            match coeffs[index] {
                0 => prop_assert!(bucket.is_empty()),
                c => {
                    prop_assert_eq!(bucket.len(), 1);
                    let element = bucket.values().next().unwrap();
                    prop_assert_eq!(element.integrand(), &pk_k.scale(&integer(c)));
                }
            }
        }
        for (_, element) in group.elements(&MuPower::ALL) {
            prop_assert!(!element.integrand().depends_on(&m.mu));
        }
    }
}
