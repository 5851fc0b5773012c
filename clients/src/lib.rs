//! Run files and the `lss-reduce` driver for the one-loop engine.
//!
//! | Module | Provides |
//! |--------|----------|
//! | [`config`] | [`RunConfig`]: the TOML run file and its validation |
//! | [`run`] | [`execute`]: build, reduce, assemble and export, with a [`RunSummary`] |

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

pub mod config;
pub mod run;

pub use config::{ConfigError, RunConfig};
pub use run::{execute, ClassCounts, RsdSummary, RunError, RunOutput, RunSummary};
