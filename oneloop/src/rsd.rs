//! Redshift-space decomposition into powers of the line-of-sight cosine.
//!
//! A [`MuPowerGroup`] filters reduced elements by an algebraic
//! [`FilterPattern`] and splits what survives by even powers of the angular
//! symbol `mu`. An [`RsdAssembly`] runs the tree, 13 and 22 databases of a
//! reduced [`LoopExpansion`] through three such groups.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use lss_symbolic::{series, Expr, Factored, Generator, SubsMap, Symbol};

use crate::database::{Structural, StructuralDatabase};
use crate::element::ReducedElement;
use crate::error::{Error, Result};
use crate::expansion::{DiagramClass, LoopExpansion};
use crate::export::{write_statement, Export};

/// An ordered list of `(symbol, power)` pairs selecting one coefficient.
///
/// # Example
///
/// ```
/// use lss_oneloop::FilterPattern;
/// use lss_symbolic::SymbolFactory;
///
/// let mut sf = SymbolFactory::new();
/// let pattern = FilterPattern::new().with(&sf.make_symbol("b1"), 2);
/// assert_eq!(pattern.to_string(), "b1^2");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FilterPattern {
    factors: Vec<(Symbol, u16)>,
}

impl FilterPattern {
    /// The empty pattern, which selects everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `(symbol, power)` factor.
    #[must_use]
    pub fn with(mut self, symbol: &Symbol, power: u16) -> Self {
        self.factors.push((symbol.clone(), power));
        self
    }

    /// Iterates the factors in order.
    pub fn factors(&self) -> impl Iterator<Item = (&Symbol, u16)> {
        self.factors.iter().map(|(s, p)| (s, *p))
    }

    /// True if the pattern has no factors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// The pattern as a monomial expression.
    #[must_use]
    pub fn as_expr(&self) -> Expr {
        self.factors
            .iter()
            .fold(Expr::one(), |acc, (s, p)| acc * Expr::symbol(s).pow(u32::from(*p)))
    }

    /// Export-safe suffix: `z<name>` once per unit of power, with every
    /// character outside `[A-Za-z0-9]` replaced by `z`.
    #[must_use]
    pub fn tag_suffix(&self) -> String {
        let mut out = String::new();
        for (symbol, power) in &self.factors {
            let name: String = symbol
                .name()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { 'z' })
                .collect();
            for _ in 0..*power {
                out.push('z');
                out.push_str(&name);
            }
        }
        out
    }

    fn apply(&self, integrand: &Expr) -> Expr {
        self.factors.iter().fold(integrand.clone(), |acc, (s, p)| {
            acc.coeff(&Generator::Symbol(s.clone()), i32::from(*p))
        })
    }
}

impl fmt::Display for FilterPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.factors.is_empty() {
            return f.write_str("1");
        }
        for (i, (s, p)) in self.factors.iter().enumerate() {
            if i > 0 {
                f.write_str("*")?;
            }
            write!(f, "{s}^{p}")?;
        }
        Ok(())
    }
}

/// Even powers of the line-of-sight cosine retained by a [`MuPowerGroup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MuPower {
    /// `mu^0`
    Mu0,
    /// `mu^2`
    Mu2,
    /// `mu^4`
    Mu4,
    /// `mu^6`
    Mu6,
    /// `mu^8`
    Mu8,
}

impl MuPower {
    /// Every power in ascending order.
    pub const ALL: [MuPower; 5] = [
        MuPower::Mu0,
        MuPower::Mu2,
        MuPower::Mu4,
        MuPower::Mu6,
        MuPower::Mu8,
    ];

    /// The exponent of `mu`.
    #[must_use]
    pub fn exponent(self) -> i32 {
        match self {
            MuPower::Mu0 => 0,
            MuPower::Mu2 => 2,
            MuPower::Mu4 => 4,
            MuPower::Mu6 => 6,
            MuPower::Mu8 => 8,
        }
    }

    /// Label used in export symbols, e.g. `mu4`.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            MuPower::Mu0 => "mu0",
            MuPower::Mu2 => "mu2",
            MuPower::Mu4 => "mu4",
            MuPower::Mu6 => "mu6",
            MuPower::Mu8 => "mu8",
        }
    }

    fn index(self) -> usize {
        match self {
            MuPower::Mu0 => 0,
            MuPower::Mu2 => 1,
            MuPower::Mu4 => 2,
            MuPower::Mu6 => 3,
            MuPower::Mu8 => 4,
        }
    }
}

impl fmt::Display for MuPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mu^{}", self.exponent())
    }
}

/// Reduced elements of one diagram class, filtered and bucketed by mu power.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MuPowerGroup {
    name: String,
    angular: Symbol,
    pattern: FilterPattern,
    filter_symbols: BTreeSet<Symbol>,
    buckets: [StructuralDatabase<ReducedElement>; 5],
}

impl MuPowerGroup {
    /// An empty group.
    ///
    /// `angular` is the line-of-sight cosine `mu`; every symbol in
    /// `filter_symbols` is set to zero after the pattern coefficient has been
    /// taken.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        angular: &Symbol,
        pattern: FilterPattern,
        filter_symbols: BTreeSet<Symbol>,
    ) -> Self {
        Self {
            name: name.into(),
            angular: angular.clone(),
            pattern,
            filter_symbols,
            buckets: Default::default(),
        }
    }

    /// The group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The filter pattern.
    #[must_use]
    pub fn pattern(&self) -> &FilterPattern {
        &self.pattern
    }

    /// Filters a copy of `element` and stores its mu-power components.
    ///
    /// The pattern coefficient is taken factor by factor, the filter symbols
    /// are set to zero, and the coefficient of each `mu^n` for `n` in
    /// `{0, 2, 4, 6, 8}` goes to the matching bucket. Null components are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if zeroing a filter symbol divides by zero or if a
    /// bucket insertion fails. The group is unchanged on error.
    pub fn emplace(&mut self, element: &ReducedElement) -> Result<()> {
        let filtered = self.pattern.apply(element.integrand());
        let zeroed: SubsMap = self
            .filter_symbols
            .iter()
            .map(|s| (Generator::Symbol(s.clone()), Expr::zero()))
            .collect();
        let filtered = filtered.subs(&zeroed)?;
        let mu = Generator::Symbol(self.angular.clone());

        let mut staged = self.buckets.clone();
        for power in MuPower::ALL {
            let component = element.with_integrand(filtered.coeff(&mu, power.exponent()));
            if component.is_null() {
                tracing::debug!(
                    "Dropping null '{}' contribution for pattern '{}' at {}",
                    self.name,
                    self.pattern,
                    power
                );
                continue;
            }
            tracing::debug!(
                "Storing '{}' contribution for pattern '{}' at {}: {}",
                self.name,
                self.pattern,
                power,
                component
            );
            staged[power.index()].insert(component)?;
        }
        self.buckets = staged;
        Ok(())
    }

    /// Removes null entries from every bucket.
    pub fn prune(&mut self) -> usize {
        let mut removed = 0;
        for power in MuPower::ALL {
            let count = self.buckets[power.index()].prune();
            if count > 0 {
                tracing::debug!(
                    "Pruned {} '{}' contribution(s) for pattern '{}' at {}",
                    count,
                    self.name,
                    self.pattern,
                    power
                );
            }
            removed += count;
        }
        removed
    }

    /// The bucket for `power`.
    #[must_use]
    pub fn bucket(&self, power: MuPower) -> &StructuralDatabase<ReducedElement> {
        &self.buckets[power.index()]
    }

    /// Iterates the elements of the selected buckets, in the order given.
    pub fn elements<'a>(
        &'a self,
        selection: &'a [MuPower],
    ) -> impl Iterator<Item = (MuPower, &'a ReducedElement)> + 'a {
        selection
            .iter()
            .flat_map(move |&p| self.bucket(p).values().map(move |e| (p, e)))
    }

    /// True if every bucket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(StructuralDatabase::is_empty)
    }

    /// Per-bucket UV limits in [`MuPower::ALL`] order.
    #[must_use]
    pub fn uv_limit(&self, order: i32) -> [Factored; 5] {
        MuPower::ALL.map(|p| {
            let total = self
                .bucket(p)
                .values()
                .fold(Expr::zero(), |acc, e| acc + e.uv_limit(order));
            series::collect_common_factors(&total)
        })
    }

    /// Distinct time factors appearing in each non-empty bucket.
    #[must_use]
    pub fn time_functions(&self) -> BTreeMap<MuPower, BTreeSet<Expr>> {
        MuPower::ALL
            .iter()
            .filter(|&&p| !self.bucket(p).is_empty())
            .map(|&p| {
                let times = self.bucket(p).values().map(|e| e.time().clone()).collect();
                (p, times)
            })
            .collect()
    }

    /// Writes one statement per mu power, named `<symbol>z<muN>`.
    ///
    /// # Errors
    ///
    /// Propagates errors of the underlying writer.
    pub fn write_export<W: fmt::Write>(&self, out: &mut W, symbol: &str) -> fmt::Result {
        for power in MuPower::ALL {
            let terms = self
                .bucket(power)
                .values()
                .filter(|e| !e.is_null())
                .map(ReducedElement::export_term);
            write_statement(out, &format!("{symbol}z{}", power.label()), terms)?;
        }
        Ok(())
    }
}

impl fmt::Display for MuPowerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for power in MuPower::ALL {
            writeln!(f, "-- {power}")?;
            write!(f, "{}", self.bucket(power))?;
        }
        Ok(())
    }
}

/// Non-fatal conditions met while building an [`RsdAssembly`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RsdWarning {
    /// The pattern selected nothing from any diagram class.
    EmptyPattern {
        /// Rendering of the pattern.
        pattern: String,
    },
}

impl fmt::Display for RsdWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RsdWarning::EmptyPattern { pattern } => write!(
                f,
                "redshift-space power spectrum is empty for filter pattern '{pattern}'"
            ),
        }
    }
}

/// Redshift-space decomposition of a reduced [`LoopExpansion`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RsdAssembly {
    angular: Symbol,
    pattern: FilterPattern,
    tag: String,
    tree: MuPowerGroup,
    p13: MuPowerGroup,
    p22: MuPowerGroup,
    warnings: Vec<RsdWarning>,
}

impl RsdAssembly {
    /// Filters every reduced element of `source` into three groups.
    ///
    /// An empty result is not an error: it is recorded as
    /// [`RsdWarning::EmptyPattern`] and logged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReduced`] if `source` is not fully reduced, or the
    /// first [`MuPowerGroup::emplace`] failure.
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::BTreeSet;
    /// use lss_oneloop::{DiagramClass, FilterPattern, LoopExpansion, LoopIntegralKernel, RsdAssembly};
    /// use lss_symbolic::{parse, SymbolFactory};
    ///
    /// let mut sf = SymbolFactory::new();
    /// let k = sf.make_symbol("k");
    /// let z = sf.make_symbol("z");
    /// let mu = sf.make_symbol("mu");
    /// sf.bind_cosine(&k, &z, mu.clone());
    /// let b1 = sf.make_symbol("b1");
    ///
    /// let mut pk = LoopExpansion::new(&k, "P", "Pk");
    /// let tree = LoopIntegralKernel::builder()
    ///     .integrand(parse("(b1 + Cos(k,z)^2)^2*Pk(k)", &mut sf).unwrap())
    ///     .external_momentum(&k)
    ///     .build()
    ///     .unwrap();
    /// pk.emplace(DiagramClass::Tree, tree).unwrap();
    /// pk.reduce(&mut sf).unwrap();
    ///
    /// let pattern = FilterPattern::new().with(&b1, 1);
    /// let rsd = RsdAssembly::new(&pk, pattern, BTreeSet::from([b1]), &mu).unwrap();
    /// assert_eq!(rsd.tag(), "Pkzb1");
    /// assert!(rsd.warnings().is_empty());
    /// ```
    pub fn new(
        source: &LoopExpansion,
        pattern: FilterPattern,
        filter_symbols: BTreeSet<Symbol>,
        angular: &Symbol,
    ) -> Result<Self> {
        if !source.is_reduced() {
            return Err(Error::NotReduced {
                name: source.name().to_string(),
            });
        }
        let group = |class: DiagramClass| -> Result<MuPowerGroup> {
            let mut g = MuPowerGroup::new(
                class.to_string(),
                angular,
                pattern.clone(),
                filter_symbols.clone(),
            );
            for element in source.database(class).elements() {
                g.emplace(element)?;
            }
            g.prune();
            Ok(g)
        };
        let tree = group(DiagramClass::Tree)?;
        let p13 = group(DiagramClass::P13)?;
        let p22 = group(DiagramClass::P22)?;

        let mut warnings = Vec::new();
        if tree.is_empty() && p13.is_empty() && p22.is_empty() {
            let warning = RsdWarning::EmptyPattern {
                pattern: pattern.to_string(),
            };
            tracing::warn!("{}", warning);
            warnings.push(warning);
        }

        Ok(Self {
            angular: angular.clone(),
            tag: format!("{}{}", source.tag(), pattern.tag_suffix()),
            pattern,
            tree,
            p13,
            p22,
            warnings,
        })
    }

    /// The export tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The angular symbol.
    #[must_use]
    pub fn angular(&self) -> &Symbol {
        &self.angular
    }

    /// The filter pattern.
    #[must_use]
    pub fn pattern(&self) -> &FilterPattern {
        &self.pattern
    }

    /// The group for `class`.
    #[must_use]
    pub fn group(&self, class: DiagramClass) -> &MuPowerGroup {
        match class {
            DiagramClass::Tree => &self.tree,
            DiagramClass::P13 => &self.p13,
            DiagramClass::P22 => &self.p22,
        }
    }

    /// Non-fatal warnings recorded during construction.
    #[must_use]
    pub fn warnings(&self) -> &[RsdWarning] {
        &self.warnings
    }

    /// True if all three groups are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        DiagramClass::ALL.iter().all(|&c| self.group(c).is_empty())
    }

    /// Per-class, per-mu-power UV limits.
    #[must_use]
    pub fn uv_limit(&self, order: i32) -> BTreeMap<DiagramClass, [Factored; 5]> {
        DiagramClass::ALL
            .iter()
            .map(|&c| (c, self.group(c).uv_limit(order)))
            .collect()
    }
}

impl Export for RsdAssembly {
    fn write_export<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        for class in DiagramClass::ALL {
            let symbol = format!("{}{}", self.tag, class.export_suffix());
            self.group(class).write_export(out, &symbol)?;
        }
        Ok(())
    }
}

impl fmt::Display for RsdAssembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tree-level:")?;
        write!(f, "{}", self.tree)?;
        writeln!(f, "Loop-level 13 terms:")?;
        write!(f, "{}", self.p13)?;
        writeln!(f, "Loop-level 22 terms:")?;
        write!(f, "{}", self.p22)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::element::ElementShape;
    use lss_symbolic::expr::integer;
    use lss_symbolic::{parse, SymbolFactory};

    fn element(sf: &mut SymbolFactory, integrand: &str) -> ReducedElement {
        ReducedElement::new(
            parse(integrand, sf).unwrap(),
            ElementShape {
                measure: Expr::one(),
                wick: Expr::one(),
                time: Expr::one(),
                variables: BTreeSet::new(),
                external: BTreeSet::from([sf.make_symbol("k")]),
                angular: None,
            },
        )
    }

    fn group(sf: &mut SymbolFactory, pattern: FilterPattern, filters: &[&str]) -> MuPowerGroup {
        let mu = sf.make_symbol("mu");
        let filters = filters.iter().map(|n| sf.make_symbol(n)).collect();
        MuPowerGroup::new("tree", &mu, pattern, filters)
    }

    #[test]
    fn mu_powers_route_to_buckets() {
        let mut sf = SymbolFactory::new();
        let mut g = group(&mut sf, FilterPattern::new(), &[]);
        let e = element(&mut sf, "Pk(k) + 3*k^2*mu^4");
        g.emplace(&e).unwrap();
        let only = |p: MuPower| -> Option<Expr> {
            let mut values = g.bucket(p).values();
            let first = values.next().map(|e| e.integrand().clone());
            assert!(values.next().is_none());
            first
        };
        assert_eq!(only(MuPower::Mu0), Some(parse("Pk(k)", &mut sf).unwrap()));
        assert_eq!(only(MuPower::Mu4), Some(parse("3*k^2", &mut sf).unwrap()));
        assert_eq!(only(MuPower::Mu2), None);
        assert_eq!(only(MuPower::Mu6), None);
        assert_eq!(only(MuPower::Mu8), None);
    }

    #[test]
    fn pattern_then_filter_symbols() {
        let mut sf = SymbolFactory::new();
        let b1 = sf.make_symbol("b1");
        let mut g = group(&mut sf, FilterPattern::new().with(&b1, 1), &["b1", "b2"]);
        let e = element(&mut sf, "b1*(1 + b2)*mu^2 + b1^2");
        g.emplace(&e).unwrap();
        let stored: Vec<_> = g.elements(&MuPower::ALL).collect();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0, MuPower::Mu2);
        assert_eq!(stored[0].1.integrand(), &Expr::one());
    }

    #[test]
    fn emplace_copies_the_element() {
        let mut sf = SymbolFactory::new();
        let mut g = group(&mut sf, FilterPattern::new(), &[]);
        let mut e = element(&mut sf, "Pk(k)");
        g.emplace(&e).unwrap();
        e.simplify(&SubsMap::from([(
            Generator::function("Pk", &sf.make_symbol("k")),
            Expr::zero(),
        )]))
        .unwrap();
        assert!(e.is_null());
        assert!(!g.is_empty());
    }

    #[test]
    fn selection_limits_iteration() {
        let mut sf = SymbolFactory::new();
        let mut g = group(&mut sf, FilterPattern::new(), &[]);
        g.emplace(&element(&mut sf, "1 + mu^2 + mu^8")).unwrap();
        let picked: Vec<_> = g
            .elements(&[MuPower::Mu8, MuPower::Mu0])
            .map(|(p, _)| p)
            .collect();
        assert_eq!(picked, vec![MuPower::Mu8, MuPower::Mu0]);
    }

    #[test]
    fn tag_sanitizes_and_repeats() {
        let mut sf = SymbolFactory::new();
        let pattern = FilterPattern::new()
            .with(&sf.make_symbol("b_2"), 2)
            .with(&sf.make_symbol("f"), 1);
        assert_eq!(pattern.tag_suffix(), "zbz2zbz2zf");
        assert_eq!(pattern.as_expr(), parse("b_2^2*f", &mut sf).unwrap());
    }

    #[test]
    fn largest_pattern_power_selects_its_own_coefficient() {
        let mut sf = SymbolFactory::new();
        let b1 = sf.make_symbol("b1");
        let pattern = FilterPattern::new().with(&b1, u16::MAX);
        let b1 = Expr::symbol(&b1);
        let integrand = &b1.pow(u32::from(u16::MAX)).scale(&integer(3)) + &b1;
        assert_eq!(pattern.apply(&integrand), Expr::integer(3));
        assert_eq!(pattern.as_expr(), b1.pow(u32::from(u16::MAX)));
    }

    #[test]
    fn export_blocks_per_mu_power() {
        let mut sf = SymbolFactory::new();
        let mut g = group(&mut sf, FilterPattern::new(), &[]);
        g.emplace(&element(&mut sf, "mu^2")).unwrap();
        let mut out = String::new();
        g.write_export(&mut out, "PTree").unwrap();
        assert_eq!(
            out,
            "PTreezmu0 = 0;\nPTreezmu2 = (1)*(1)*(1)*(1);\nPTreezmu4 = 0;\nPTreezmu6 = 0;\nPTreezmu8 = 0;\n"
        );
    }

    #[test]
    fn time_functions_per_bucket() {
        let mut sf = SymbolFactory::new();
        let mut g = group(&mut sf, FilterPattern::new(), &[]);
        g.emplace(&element(&mut sf, "1 + mu^4")).unwrap();
        let times = g.time_functions();
        assert_eq!(times.len(), 2);
        assert_eq!(times[&MuPower::Mu4], BTreeSet::from([Expr::one()]));
    }

    #[test]
    fn unreduced_source_is_rejected() {
        let mut sf = SymbolFactory::new();
        let k = sf.make_symbol("k");
        let mu = sf.make_symbol("mu");
        let pk = LoopExpansion::new(&k, "P", "P");
        assert!(matches!(
            RsdAssembly::new(&pk, FilterPattern::new(), BTreeSet::new(), &mu),
            Err(Error::NotReduced { .. })
        ));
    }
}
