//! One-loop expansion of a power spectrum: tree, 13 and 22 databases.

use std::fmt;

use lss_symbolic::{series, Expr, Factored, SubsMap, Symbol, SymbolFactory};

use crate::database::{Structural, StructuralDatabase};
use crate::element::ReducedElement;
use crate::error::{Error, Result};
use crate::export::{write_statement, Export};
use crate::kernel::LoopIntegralKernel;
use crate::reducer::{AngularReducer, ReducedIntegral, Symmetrization};
use crate::signature::StructuralSignature;

/// The three diagram classes of a one-loop power spectrum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagramClass {
    /// Tree-level contribution.
    Tree,
    /// One-loop diagrams with a single internal propagator pair (13 type).
    P13,
    /// One-loop diagrams with two interchangeable internal lines (22 type).
    P22,
}

impl DiagramClass {
    /// Every class in export order.
    pub const ALL: [DiagramClass; 3] = [DiagramClass::Tree, DiagramClass::P13, DiagramClass::P22];

    /// The reduction policy for this class.
    #[must_use]
    pub fn symmetrization(self) -> Symmetrization {
        match self {
            DiagramClass::Tree | DiagramClass::P13 => Symmetrization::Preserve,
            DiagramClass::P22 => Symmetrization::ExchangeLoopAndRayleigh,
        }
    }

    /// Suffix appended to an export tag.
    #[must_use]
    pub fn export_suffix(self) -> &'static str {
        match self {
            DiagramClass::Tree => "Tree",
            DiagramClass::P13 => "P13",
            DiagramClass::P22 => "P22",
        }
    }
}

impl fmt::Display for DiagramClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagramClass::Tree => "tree",
            DiagramClass::P13 => "13",
            DiagramClass::P22 => "22",
        })
    }
}

impl std::str::FromStr for DiagramClass {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tree" => Ok(DiagramClass::Tree),
            "13" => Ok(DiagramClass::P13),
            "22" => Ok(DiagramClass::P22),
            other => Err(format!("unknown diagram class '{other}', expected tree, 13 or 22")),
        }
    }
}

/// A kernel together with its reduced form, once computed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KernelRecord {
    /// Not yet reduced; accepts further contributions.
    Raw(LoopIntegralKernel),
    /// Reduced; further contributions would make `reduced` stale.
    Reduced {
        /// The kernel as reduced.
        kernel: LoopIntegralKernel,
        /// Its reduced form.
        reduced: ReducedIntegral,
    },
}

impl KernelRecord {
    /// The underlying kernel.
    #[must_use]
    pub fn kernel(&self) -> &LoopIntegralKernel {
        match self {
            KernelRecord::Raw(kernel) | KernelRecord::Reduced { kernel, .. } => kernel,
        }
    }

    /// The reduced form, if computed.
    #[must_use]
    pub fn reduced(&self) -> Option<&ReducedIntegral> {
        match self {
            KernelRecord::Raw(_) => None,
            KernelRecord::Reduced { reduced, .. } => Some(reduced),
        }
    }
}

impl Structural for KernelRecord {
    fn signature(&self) -> &StructuralSignature {
        self.kernel().signature()
    }

    fn absorb(&mut self, other: Self) -> Result<()> {
        match self {
            KernelRecord::Raw(kernel) => kernel.absorb(other.kernel().clone()),
            KernelRecord::Reduced { kernel, .. } => Err(Error::InsertAfterReduction {
                signature: kernel.signature().to_string(),
            }),
        }
    }

    fn is_null(&self) -> bool {
        match self {
            KernelRecord::Raw(kernel) => kernel.is_null(),
            KernelRecord::Reduced { reduced, .. } => reduced.is_empty(),
        }
    }
}

impl fmt::Display for KernelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelRecord::Raw(kernel) => write!(f, "{kernel} (raw)"),
            KernelRecord::Reduced { kernel, reduced } => {
                writeln!(f, "{kernel}")?;
                write!(f, "{reduced}")
            }
        }
    }
}

/// Whether a database's kernels have been reduced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReductionState {
    /// No kernel reduced yet.
    #[default]
    Raw,
    /// Every kernel carries its reduced form.
    Reduced,
}

/// A kernel database with a reduction state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PkDatabase {
    records: StructuralDatabase<KernelRecord>,
    state: ReductionState,
}

impl PkDatabase {
    /// Creates an empty raw database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The reduction state.
    #[must_use]
    pub fn state(&self) -> ReductionState {
        self.state
    }

    /// True once [`reduce`](Self::reduce) has run.
    #[must_use]
    pub fn is_reduced(&self) -> bool {
        self.state == ReductionState::Reduced
    }

    /// The kernel records.
    #[must_use]
    pub fn records(&self) -> &StructuralDatabase<KernelRecord> {
        &self.records
    }

    /// Number of distinct kernel signatures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no kernel is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Inserts a raw kernel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsertAfterReduction`] if the database is reduced;
    /// the database is unchanged.
    pub fn emplace(&mut self, kernel: LoopIntegralKernel) -> Result<()> {
        if self.is_reduced() {
            return Err(Error::InsertAfterReduction {
                signature: kernel.signature().to_string(),
            });
        }
        self.records.insert(KernelRecord::Raw(kernel))
    }

    /// Reduces every kernel and prunes null elements and records.
    ///
    /// All reductions are computed before any is committed. Does nothing if
    /// the database is already reduced.
    ///
    /// # Errors
    ///
    /// Propagates the first reduction failure; the database is unchanged on
    /// error.
    pub fn reduce(&mut self, symmetrization: Symmetrization, factory: &mut SymbolFactory) -> Result<()> {
        if self.is_reduced() {
            return Ok(());
        }
        let reducer = AngularReducer::new(symmetrization);
        let mut reduced_records = StructuralDatabase::new();
        for record in self.records.values() {
            let kernel = record.kernel().clone();
            let mut reduced = reducer.reduce(&kernel, factory)?;
            reduced.prune();
            reduced_records.insert(KernelRecord::Reduced { kernel, reduced })?;
        }
        let dropped = reduced_records.prune();
        tracing::debug!(
            "Reduced {} kernel(s), {} with no surviving element",
            self.records.len(),
            dropped
        );
        self.records = reduced_records;
        self.state = ReductionState::Reduced;
        Ok(())
    }

    /// Drops every reduced form and returns to [`ReductionState::Raw`].
    pub fn reset(&mut self) {
        for record in self.records.values_mut() {
            if let KernelRecord::Reduced { kernel, .. } = record {
                *record = KernelRecord::Raw(kernel.clone());
            }
        }
        self.state = ReductionState::Raw;
    }

    /// A raw copy of the stored kernels, regardless of state.
    #[must_use]
    pub fn raw_kernels(&self) -> StructuralDatabase<KernelRecord> {
        let mut copy = self.clone();
        copy.reset();
        copy.records
    }

    /// Unions `other`'s kernels into this raw database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MergeAfterReduction`] if this database is reduced;
    /// the database is unchanged.
    pub fn merge_raw(&mut self, other: &PkDatabase) -> Result<()> {
        if self.is_reduced() {
            return Err(Error::MergeAfterReduction {
                incoming: other.len(),
            });
        }
        self.records.merge(&other.raw_kernels())
    }

    /// Removes null records and null elements inside reduced records.
    pub fn prune(&mut self) -> usize {
        let mut removed = 0;
        for record in self.records.values_mut() {
            if let KernelRecord::Reduced { reduced, .. } = record {
                removed += reduced.prune();
            }
        }
        removed + self.records.prune()
    }

    /// Iterates the reduced elements of every record.
    pub fn elements(&self) -> impl Iterator<Item = &ReducedElement> {
        self.records
            .values()
            .filter_map(KernelRecord::reduced)
            .flat_map(ReducedIntegral::iter)
    }

    /// Applies `map` to every integrand, raw or reduced.
    ///
    /// # Errors
    ///
    /// Propagates the first substitution failure; the database is unchanged
    /// on error.
    pub fn simplify(&mut self, map: &SubsMap) -> Result<()> {
        let mut updated = self.records.clone();
        for record in updated.values_mut() {
            match record {
                KernelRecord::Raw(kernel) => kernel.simplify(map)?,
                KernelRecord::Reduced { reduced, .. } => reduced.simplify(map)?,
            }
        }
        self.records = updated;
        Ok(())
    }

    /// Canonicalizes external-momentum angles in every reduced element.
    ///
    /// # Errors
    ///
    /// Propagates the first failure; the database is unchanged on error.
    pub fn canonicalize_external_momenta(&mut self, factory: &mut SymbolFactory) -> Result<()> {
        let mut updated = self.records.clone();
        for record in updated.values_mut() {
            if let KernelRecord::Reduced { reduced, .. } = record {
                reduced.canonicalize_external_momenta(factory)?;
            }
        }
        self.records = updated;
        Ok(())
    }

    /// Uncollected sum of the UV limits of every reduced element.
    #[must_use]
    pub fn uv_sum(&self, order: i32) -> Expr {
        self.records
            .values()
            .filter_map(KernelRecord::reduced)
            .fold(Expr::zero(), |acc, r| acc + r.uv_sum(order))
    }

    /// [`uv_sum`](Self::uv_sum) with common factors collected.
    #[must_use]
    pub fn uv_limit(&self, order: i32) -> Factored {
        series::collect_common_factors(&self.uv_sum(order))
    }

    /// Export renderings of every term: reduced elements once reduced, raw
    /// kernels before.
    #[must_use]
    pub fn export_terms(&self) -> Vec<String> {
        self.records
            .values()
            .flat_map(|record| match record {
                KernelRecord::Raw(kernel) => {
                    if kernel.is_null() {
                        Vec::new()
                    } else {
                        vec![format!(
                            "({})*({})*({})*({})",
                            kernel.wick(),
                            kernel.time(),
                            kernel.measure(),
                            kernel.integrand()
                        )]
                    }
                }
                KernelRecord::Reduced { reduced, .. } => reduced.export_terms().collect(),
            })
            .collect()
    }
}

impl fmt::Display for PkDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.records)
    }
}

/// One power spectrum's one-loop expansion.
///
/// Holds the tree, 13 and 22 kernel databases for a single momentum.
/// Kernels are inserted raw; [`reduce`](Self::reduce) attaches reduced
/// forms using each class's own [`Symmetrization`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopExpansion {
    momentum: Symbol,
    name: String,
    tag: String,
    tree: PkDatabase,
    p13: PkDatabase,
    p22: PkDatabase,
}

impl LoopExpansion {
    /// An empty expansion for `momentum`.
    ///
    /// `name` is for diagnostics; `tag` prefixes exported symbol names.
    #[must_use]
    pub fn new(momentum: &Symbol, name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            momentum: momentum.clone(),
            name: name.into(),
            tag: tag.into(),
            tree: PkDatabase::new(),
            p13: PkDatabase::new(),
            p22: PkDatabase::new(),
        }
    }

    /// The momentum variable.
    #[must_use]
    pub fn momentum(&self) -> &Symbol {
        &self.momentum
    }

    /// The display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The export tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The database for `class`.
    #[must_use]
    pub fn database(&self, class: DiagramClass) -> &PkDatabase {
        match class {
            DiagramClass::Tree => &self.tree,
            DiagramClass::P13 => &self.p13,
            DiagramClass::P22 => &self.p22,
        }
    }

    fn database_mut(&mut self, class: DiagramClass) -> &mut PkDatabase {
        match class {
            DiagramClass::Tree => &mut self.tree,
            DiagramClass::P13 => &mut self.p13,
            DiagramClass::P22 => &mut self.p22,
        }
    }

    /// The tree-level database.
    #[must_use]
    pub fn tree(&self) -> &PkDatabase {
        &self.tree
    }

    /// The 13 database.
    #[must_use]
    pub fn p13(&self) -> &PkDatabase {
        &self.p13
    }

    /// The 22 database.
    #[must_use]
    pub fn p22(&self) -> &PkDatabase {
        &self.p22
    }

    /// True when all three databases are reduced.
    #[must_use]
    pub fn is_reduced(&self) -> bool {
        DiagramClass::ALL
            .iter()
            .all(|&c| self.database(c).is_reduced())
    }

    /// Inserts a raw kernel into the `class` database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsertAfterReduction`] if that database is reduced;
    /// nothing is changed.
    pub fn emplace(&mut self, class: DiagramClass, kernel: LoopIntegralKernel) -> Result<()> {
        self.database_mut(class).emplace(kernel)
    }

    /// Reduces all three databases, each with its class's policy.
    ///
    /// # Errors
    ///
    /// Propagates the first reduction failure. Nothing is changed on error.
    pub fn reduce(&mut self, factory: &mut SymbolFactory) -> Result<()> {
        let mut staged = self.clone();
        for class in DiagramClass::ALL {
            staged
                .database_mut(class)
                .reduce(class.symmetrization(), factory)?;
        }
        tracing::info!(
            "Reduced '{}': {} tree, {} 13, {} 22 kernel(s) with surviving elements",
            self.name,
            staged.tree.len(),
            staged.p13.len(),
            staged.p22.len()
        );
        *self = staged;
        Ok(())
    }

    /// Returns every database to the raw state.
    pub fn reset(&mut self) {
        for class in DiagramClass::ALL {
            self.database_mut(class).reset();
        }
    }

    /// Merges `other`'s kernels into this expansion and re-reduces.
    ///
    /// `other` is only read. The merge is staged on a copy and committed
    /// at the end, so on any error neither operand changes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompatibleMomenta`] if the momenta differ, or the
    /// first insertion or reduction failure.
    pub fn merge(&mut self, other: &LoopExpansion, factory: &mut SymbolFactory) -> Result<()> {
        if self.momentum != other.momentum {
            return Err(Error::IncompatibleMomenta {
                left: self.momentum.to_string(),
                right: other.momentum.to_string(),
            });
        }
        let mut staged = self.clone();
        staged.reset();
        for class in DiagramClass::ALL {
            staged
                .database_mut(class)
                .merge_raw(other.database(class))?;
        }
        staged.reduce(factory)?;
        *self = staged;
        Ok(())
    }

    /// Sum of the three databases' UV limits, common factors collected.
    #[must_use]
    pub fn uv_limit(&self, order: i32) -> Factored {
        let total = DiagramClass::ALL
            .iter()
            .fold(Expr::zero(), |acc, &c| acc + self.database(c).uv_sum(order));
        series::collect_common_factors(&total)
    }

    /// Applies `map` to every integrand.
    ///
    /// # Errors
    ///
    /// Propagates the first failure; nothing is changed on error.
    pub fn simplify(&mut self, map: &SubsMap) -> Result<()> {
        let mut staged = self.clone();
        for class in DiagramClass::ALL {
            staged.database_mut(class).simplify(map)?;
        }
        *self = staged;
        Ok(())
    }

    /// Canonicalizes external-momentum angles in every reduced element.
    ///
    /// # Errors
    ///
    /// Propagates the first failure; nothing is changed on error.
    pub fn canonicalize_external_momenta(&mut self, factory: &mut SymbolFactory) -> Result<()> {
        let mut staged = self.clone();
        for class in DiagramClass::ALL {
            staged
                .database_mut(class)
                .canonicalize_external_momenta(factory)?;
        }
        *self = staged;
        Ok(())
    }

    /// Removes null records and elements from every database.
    pub fn prune(&mut self) -> usize {
        DiagramClass::ALL
            .iter()
            .map(|&c| self.database_mut(c).prune())
            .sum()
    }
}

impl Export for LoopExpansion {
    fn write_export<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        for class in DiagramClass::ALL {
            let symbol = format!("{}{}", self.tag, class.export_suffix());
            write_statement(out, &symbol, self.database(class).export_terms())?;
        }
        Ok(())
    }
}

impl fmt::Display for LoopExpansion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Power spectrum '{}' ({})", self.name, self.momentum)?;
        writeln!(f, "Tree-level:")?;
        write!(f, "{}", self.tree)?;
        writeln!(f, "Loop-level 13 terms:")?;
        write!(f, "{}", self.p13)?;
        writeln!(f, "Loop-level 22 terms:")?;
        write!(f, "{}", self.p22)
    }
}
