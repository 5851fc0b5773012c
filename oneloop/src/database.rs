//! Deduplicating insert-or-merge storage keyed by structural signature.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

use crate::error::{Error, Result};
use crate::signature::StructuralSignature;

/// An entity that can live in a [`StructuralDatabase`].
pub trait Structural: Clone {
    /// The signature snapshot taken when the entity was built.
    fn signature(&self) -> &StructuralSignature;

    /// Adds `other`'s integrand into this entity's integrand.
    ///
    /// Called only with an entity of equal signature.
    ///
    /// # Errors
    ///
    /// Returns an error if this entity no longer accepts contributions. The
    /// entity must be unchanged on error.
    fn absorb(&mut self, other: Self) -> Result<()>;

    /// True if the entity contributes nothing.
    fn is_null(&self) -> bool;

    /// A fresh copy sharing no storage with `self` apart from symbols.
    #[must_use]
    fn detach(&self) -> Self {
        self.clone()
    }
}

/// Ordered map from [`StructuralSignature`] to entity.
///
/// Signatures are unique: inserting an entity whose signature is already
/// present adds its integrand into the stored entry. Iteration follows
/// signature order and is therefore deterministic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructuralDatabase<T> {
    entries: BTreeMap<StructuralSignature, T>,
}

impl<T> Default for StructuralDatabase<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: Structural> StructuralDatabase<T> {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `entity`, or adds it into the entry with the same signature.
    ///
    /// # Errors
    ///
    /// Returns the error of [`Structural::absorb`] on collision, or
    /// [`Error::DuplicateInsert`] if a signature found absent nevertheless
    /// collided. The database is unchanged on error.
    pub fn insert(&mut self, entity: T) -> Result<()> {
        let key = entity.signature().clone();
        if let Some(existing) = self.entries.get_mut(&key) {
            return existing.absorb(entity);
        }
        if let Some(previous) = self.entries.insert(key.clone(), entity) {
            let signature = key.to_string();
            self.entries.insert(key, previous);
            return Err(Error::DuplicateInsert { signature });
        }
        Ok(())
    }

    /// Removes every null entry, returning how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, v| !v.is_null());
        before - self.entries.len()
    }

    /// Inserts a detached copy of every entry of `other`.
    ///
    /// # Errors
    ///
    /// Propagates the first insertion error; `self` is unchanged on error.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        let mut merged = self.clone();
        for entity in other.entries.values() {
            merged.insert(entity.detach())?;
        }
        *self = merged;
        Ok(())
    }
}

impl<T> StructuralDatabase<T> {
    /// Number of distinct signatures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry for `signature`.
    #[must_use]
    pub fn get(&self, signature: &StructuralSignature) -> Option<&T> {
        self.entries.get(signature)
    }

    /// Iterates `(signature, entity)` in signature order.
    pub fn iter(&self) -> btree_map::Iter<'_, StructuralSignature, T> {
        self.entries.iter()
    }

    /// Iterates entities in signature order.
    pub fn values(&self) -> btree_map::Values<'_, StructuralSignature, T> {
        self.entries.values()
    }

    /// Iterates entities mutably. Signatures cannot be changed through this.
    pub fn values_mut(&mut self) -> btree_map::ValuesMut<'_, StructuralSignature, T> {
        self.entries.values_mut()
    }
}

impl<'a, T> IntoIterator for &'a StructuralDatabase<T> {
    type Item = (&'a StructuralSignature, &'a T);
    type IntoIter = btree_map::Iter<'a, StructuralSignature, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<T: fmt::Display> fmt::Display for StructuralDatabase<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "   <empty>");
        }
        for (i, entity) in self.entries.values().enumerate() {
            writeln!(f, "   #{i}: {entity}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::kernel::LoopIntegralKernel;
    use lss_symbolic::{Expr, SymbolFactory};

    fn kernel(sf: &mut SymbolFactory, integrand: Expr) -> LoopIntegralKernel {
        let q = sf.make_symbol("q");
        let k = sf.make_symbol("k");
        LoopIntegralKernel::builder()
            .integrand(integrand)
            .measure(Expr::symbol(&q).pow(2))
            .loop_momentum(&q)
            .external_momentum(&k)
            .build()
            .unwrap()
    }

    #[test]
    fn colliding_signatures_add_integrands() {
        let mut sf = SymbolFactory::new();
        let q = Expr::symbol(&sf.make_symbol("q"));
        let a = kernel(&mut sf, q.clone());
        let b = kernel(&mut sf, q.pow(2));
        let mut db = StructuralDatabase::new();
        db.insert(a).unwrap();
        db.insert(b).unwrap();
        assert_eq!(db.len(), 1);
        let stored = db.values().next().unwrap();
        assert_eq!(stored.integrand(), &(&q + &q.pow(2)));
    }

    #[test]
    fn prune_removes_only_null_entries_and_is_idempotent() {
        let mut sf = SymbolFactory::new();
        let q = sf.make_symbol("q");
        let k = sf.make_symbol("k");
        let null = kernel(&mut sf, Expr::zero());
        let live = LoopIntegralKernel::builder()
            .integrand(Expr::one())
            .loop_momentum(&q)
            .external_momentum(&k)
            .build()
            .unwrap();
        let mut db = StructuralDatabase::new();
        db.insert(null).unwrap();
        db.insert(live.clone()).unwrap();
        assert_eq!(db.prune(), 1);
        assert_eq!(db.len(), 1);
        assert_eq!(db.values().next(), Some(&live));
        let once = db.clone();
        assert_eq!(db.prune(), 0);
        assert_eq!(db, once);
    }

    #[test]
    fn merge_copies_without_aliasing() {
        let mut sf = SymbolFactory::new();
        let q = Expr::symbol(&sf.make_symbol("q"));
        let mut left = StructuralDatabase::new();
        let mut right = StructuralDatabase::new();
        left.insert(kernel(&mut sf, q.clone())).unwrap();
        right.insert(kernel(&mut sf, q.pow(2))).unwrap();
        left.merge(&right).unwrap();
        assert_eq!(left.len(), 1);

        let map = lss_symbolic::SubsMap::from([(
            lss_symbolic::Generator::Symbol(sf.make_symbol("q")),
            Expr::integer(3),
        )]);
        for entity in right.values_mut() {
            entity.simplify(&map).unwrap();
        }
        assert_eq!(right.values().next().unwrap().integrand(), &Expr::integer(9));
        let stored = left.values().next().unwrap();
        assert_eq!(stored.integrand(), &(&q + &q.pow(2)));
    }

    #[test]
    fn display_lists_entries() {
        let db: StructuralDatabase<LoopIntegralKernel> = StructuralDatabase::new();
        assert_eq!(db.to_string(), "   <empty>\n");
    }
}
