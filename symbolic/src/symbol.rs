//! Canonical symbols and the factory that manufactures them.
//!
//! Structural equality of expressions depends on every occurrence of "the
//! same" variable being the identical symbol, not a same-named duplicate.
//! [`SymbolFactory`] is the only way to obtain a [`Symbol`]; it hands out the
//! same symbol for a given name on every call.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Process-wide id source. Symbols from distinct factories never collide.
static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct SymbolData {
    id: u64,
    name: String,
    display: Option<String>,
}

/// A canonical symbolic variable.
///
/// Two symbols are equal only if they were manufactured by the same factory
/// call sequence for the same name. Ordering is lexical by name (ties broken
/// by id), which keeps every ordered container in this workspace
/// deterministic across runs.
#[derive(Clone)]
pub struct Symbol {
    data: Arc<SymbolData>,
}

impl Symbol {
    fn fresh(name: &str, display: Option<&str>) -> Self {
        Self {
            data: Arc::new(SymbolData {
                id: NEXT_SYMBOL_ID.fetch_add(1, AtomicOrdering::Relaxed),
                name: name.to_string(),
                display: display.map(str::to_string),
            }),
        }
    }

    /// The symbol's name, used in export and as its ordering key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// The display name, falling back to the plain name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.data.display.as_deref().unwrap_or(&self.data.name)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.data.id == other.data.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data.id.hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.data
            .name
            .cmp(&other.data.name)
            .then(self.data.id.cmp(&other.data.id))
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data.name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data.name)
    }
}

/// Manufactures canonical symbols.
///
/// # Example
///
/// ```
/// use lss_symbolic::SymbolFactory;
///
/// let mut sf = SymbolFactory::new();
/// let q1 = sf.make_symbol("q");
/// let q2 = sf.make_symbol("q");
/// assert_eq!(q1, q2);
/// ```
#[derive(Debug, Default)]
pub struct SymbolFactory {
    symbols: BTreeMap<String, Symbol>,
    cosines: BTreeMap<(Symbol, Symbol), Symbol>,
}

impl SymbolFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical symbol for `name`, creating it on first use.
    pub fn make_symbol(&mut self, name: &str) -> Symbol {
        self.lookup_or_create(name, None)
    }

    /// Like [`make_symbol`](Self::make_symbol), attaching a display name.
    ///
    /// The display name is fixed by the first call for a given `name`; later
    /// calls return the existing symbol unchanged.
    pub fn make_symbol_with_display(&mut self, name: &str, display: &str) -> Symbol {
        self.lookup_or_create(name, Some(display))
    }

    fn lookup_or_create(&mut self, name: &str, display: Option<&str>) -> Symbol {
        self.symbols
            .entry(name.to_string())
            .or_insert_with(|| Symbol::fresh(name, display))
            .clone()
    }

    /// Binds `symbol` as the canonical cosine between momenta `a` and `b`.
    ///
    /// Typically used to name the line-of-sight cosine, e.g. `mu` for the
    /// angle between `k` and `z`. Rebinding replaces the previous symbol.
    pub fn bind_cosine(&mut self, a: &Symbol, b: &Symbol, symbol: Symbol) {
        self.cosines.insert(ordered_pair(a, b), symbol);
    }

    /// Returns the canonical symbol for the cosine between `a` and `b`.
    ///
    /// Unbound pairs get a symbol named `Cos_<a>_<b>` with the momenta in
    /// lexical order, so `make_cosine(a, b) == make_cosine(b, a)`.
    pub fn make_cosine(&mut self, a: &Symbol, b: &Symbol) -> Symbol {
        let key = ordered_pair(a, b);
        if let Some(bound) = self.cosines.get(&key) {
            return bound.clone();
        }
        let name = format!("Cos_{}_{}", key.0.name(), key.1.name());
        let symbol = self.make_symbol(&name);
        self.cosines.insert(key, symbol.clone());
        symbol
    }

    /// Number of named symbols manufactured so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// True if no symbol has been manufactured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

fn ordered_pair(a: &Symbol, b: &Symbol) -> (Symbol, Symbol) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}
