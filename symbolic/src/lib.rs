//! Exact symbolic algebra for one-loop perturbation theory.
//!
//! This crate is the algebra boundary consumed by `lss-oneloop`. It provides
//! canonical symbols, exact Laurent polynomials with rational coefficients,
//! and the handful of specialised operations the reduction engine needs.
//!
//! # Contents
//!
//! | Module | Provides |
//! |--------|----------|
//! | [`symbol`] | [`Symbol`], [`SymbolFactory`] (canonical symbols, line-of-sight cosine binding) |
//! | [`generator`] | [`Generator`]: `Pi`, symbols, opaque functions, `Cos`, `LegendreP` |
//! | [`expr`] | [`Expr`], [`Monomial`]: arithmetic, `coeff`, `subs`, `relabel` |
//! | [`legendre`] | `P_l` coefficients, Legendre-basis conversion, angular weights |
//! | [`series`] | UV truncation, [`Factored`] common-factor extraction |
//! | [`parse`](mod@parse) | text syntax, the inverse of `Display` |
//!
//! # Example
//!
//! ```
//! use lss_symbolic::{parse, SymbolFactory};
//!
//! let mut sf = SymbolFactory::new();
//! let e = parse("(q + k)^2 - q^2 - k^2", &mut sf).unwrap();
//! assert_eq!(e.to_string(), "2*k*q");
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

pub mod error;
pub mod expr;
pub mod generator;
pub mod legendre;
pub mod parse;
pub mod series;
pub mod symbol;

pub use error::{ParseError, SymbolicError};
pub use expr::{Expr, Monomial, Rational, SubsMap};
pub use generator::Generator;
pub use parse::parse;
pub use series::Factored;
pub use symbol::{Symbol, SymbolFactory};
