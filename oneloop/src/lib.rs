//! One-loop power spectrum reduction and assembly.
//!
//! Kernels of the one-loop expansion enter a [`LoopExpansion`], are
//! deduplicated by [`StructuralSignature`], reduced by the
//! [`AngularReducer`] to radial integrals, and finally decomposed by an
//! [`RsdAssembly`] into fixed powers of the line-of-sight cosine.
//!
//! # Pipeline
//!
//! | Stage | Type | Module |
//! |-------|------|--------|
//! | Insert-or-merge storage | [`StructuralDatabase`] | [`database`] |
//! | Angular reduction | [`AngularReducer`], [`ReducedIntegral`] | [`reducer`] |
//! | Tree / 13 / 22 orchestration | [`LoopExpansion`] | [`expansion`] |
//! | Pattern filter and mu buckets | [`MuPowerGroup`] | [`rsd`] |
//! | Redshift-space assembly | [`RsdAssembly`] | [`rsd`] |
//! | Text output | [`Export`] | [`export`] |
//!
//! # Example
//!
//! ```
//! use lss_oneloop::{DiagramClass, LoopExpansion, LoopIntegralKernel};
//! use lss_symbolic::{parse, SymbolFactory};
//!
//! let mut sf = SymbolFactory::new();
//! let q = sf.make_symbol("q");
//! let k = sf.make_symbol("k");
//! let kernel = LoopIntegralKernel::builder()
//!     .integrand(parse("q^2*Cos(q,k)^2", &mut sf).unwrap())
//!     .measure(parse("q^2", &mut sf).unwrap())
//!     .loop_momentum(&q)
//!     .external_momentum(&k)
//!     .build()
//!     .unwrap();
//!
//! let mut pk = LoopExpansion::new(&k, "P_lin", "Plin");
//! pk.emplace(DiagramClass::P13, kernel).unwrap();
//! pk.reduce(&mut sf).unwrap();
//!
//! let element = pk.p13().elements().next().unwrap();
//! assert_eq!(element.integrand(), &parse("q^2/3", &mut sf).unwrap());
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

pub mod database;
pub mod element;
pub mod error;
pub mod expansion;
pub mod export;
pub mod kernel;
pub mod reducer;
pub mod rsd;
pub mod signature;

pub use database::{Structural, StructuralDatabase};
pub use element::{ElementShape, ReducedElement};
pub use error::{Error, Result};
pub use expansion::{DiagramClass, KernelRecord, LoopExpansion, PkDatabase, ReductionState};
pub use export::Export;
pub use kernel::{KernelBuilder, LoopIntegralKernel, RayleighMomentum, RayleighStructure};
pub use reducer::{AngularReducer, ReducedIntegral, Symmetrization};
pub use rsd::{FilterPattern, MuPower, MuPowerGroup, RsdAssembly, RsdWarning};
pub use signature::{SignatureParts, StructuralSignature};
