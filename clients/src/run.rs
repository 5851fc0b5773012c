//! Executes a [`RunConfig`]: build, reduce, assemble, export.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use lss_oneloop::{DiagramClass, Export, LoopExpansion, MuPower, RsdAssembly};
use lss_symbolic::{Symbol, SymbolFactory};
use serde::Serialize;
use thiserror::Error;

use crate::config::{ConfigError, RunConfig};

/// Errors raised while executing a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A kernel could not be stored.
    #[error("kernel #{index}: {source}")]
    Kernel {
        /// Zero-based position in the `[[kernel]]` array.
        index: usize,
        /// The engine's complaint.
        #[source]
        source: lss_oneloop::Error,
    },

    /// Reduction or assembly failed.
    #[error(transparent)]
    Engine(#[from] lss_oneloop::Error),

    /// An export block could not be rendered.
    #[error("failed to render export text")]
    Render(#[from] fmt::Error),
}

/// Kernel or element counts per diagram class.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClassCounts {
    /// Tree level.
    pub tree: usize,
    /// 13 diagrams.
    pub p13: usize,
    /// 22 diagrams.
    pub p22: usize,
}

/// Summary of one redshift-space assembly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RsdSummary {
    /// Export tag.
    pub tag: String,
    /// The filter pattern as written in exports.
    pub pattern: String,
    /// Non-fatal diagnostics.
    pub warnings: Vec<String>,
    /// Element count per class and mu power.
    pub buckets: BTreeMap<String, BTreeMap<String, usize>>,
    /// Distinct time factors per class and mu power.
    pub time_functions: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    /// UV limit per class and mu power, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv_limit: Option<BTreeMap<String, BTreeMap<String, String>>>,
}

/// Machine-readable account of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Spectrum name.
    pub name: String,
    /// Export tag.
    pub tag: String,
    /// Distinct kernel signatures after reduction.
    pub kernels: ClassCounts,
    /// Surviving reduced elements.
    pub elements: ClassCounts,
    /// UV limit of the whole expansion, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv_limit: Option<String>,
    /// One entry per `[[rsd]]` request.
    pub rsd: Vec<RsdSummary>,
}

/// Export text plus summary.
#[derive(Clone, Debug)]
pub struct RunOutput {
    /// Statements for the downstream code generator.
    pub export: String,
    /// Summary for tooling.
    pub summary: RunSummary,
}

/// Runs `config` end to end with a fresh symbol factory.
///
/// # Errors
///
/// Returns [`RunError::Config`] if the configuration is invalid,
/// [`RunError::Kernel`] if a kernel cannot be stored,
/// [`RunError::Engine`] if reduction or assembly fails, and
/// [`RunError::Render`] if the export text cannot be written.
pub fn execute(config: &RunConfig) -> Result<RunOutput, RunError> {
    config.validate()?;
    let mut factory = SymbolFactory::new();
    let spectrum = &config.spectrum;
    let momentum = factory.make_symbol(&spectrum.momentum);
    let angular = spectrum.line_of_sight.as_ref().map(|los| {
        let direction = factory.make_symbol(&los.direction);
        let mu = factory.make_symbol(&los.symbol);
        factory.bind_cosine(&momentum, &direction, mu.clone());
        mu
    });

    let mut expansion = LoopExpansion::new(&momentum, &spectrum.name, &spectrum.tag);
    for (index, kernel) in config.kernels.iter().enumerate() {
        let class = kernel.diagram_class(index)?;
        let built = kernel.build(index, &mut factory)?;
        expansion
            .emplace(class, built)
            .map_err(|source| RunError::Kernel { index, source })?;
    }
    expansion.reduce(&mut factory)?;

    let mut export = String::new();
    if config.output.expansion {
        expansion.write_export(&mut export)?;
    }

    let mut rsd = Vec::with_capacity(config.rsd.len());
    if let Some(mu) = &angular {
        for request in &config.rsd {
            let pattern = request.pattern(&mut factory);
            let filters: BTreeSet<Symbol> =
                request.filter.iter().map(|n| factory.make_symbol(n)).collect();
            let assembly = RsdAssembly::new(&expansion, pattern, filters, mu)?;
            assembly.write_export(&mut export)?;
            rsd.push(rsd_summary(&assembly, config.output.uv_order));
        }
    }

    let summary = RunSummary {
        name: spectrum.name.clone(),
        tag: spectrum.tag.clone(),
        kernels: counts(|c| expansion.database(c).len()),
        elements: counts(|c| expansion.database(c).elements().count()),
        uv_limit: config
            .output
            .uv_order
            .map(|order| expansion.uv_limit(order).to_string()),
        rsd,
    };
    tracing::info!(
        "Run '{}' finished: {} tree, {} 13, {} 22 element(s); {} redshift-space assembl(ies)",
        summary.name,
        summary.elements.tree,
        summary.elements.p13,
        summary.elements.p22,
        summary.rsd.len()
    );
    Ok(RunOutput { export, summary })
}

fn counts(f: impl Fn(DiagramClass) -> usize) -> ClassCounts {
    ClassCounts {
        tree: f(DiagramClass::Tree),
        p13: f(DiagramClass::P13),
        p22: f(DiagramClass::P22),
    }
}

fn rsd_summary(assembly: &RsdAssembly, uv_order: Option<i32>) -> RsdSummary {
    let mut buckets = BTreeMap::new();
    let mut time_functions = BTreeMap::new();
    for class in DiagramClass::ALL {
        let group = assembly.group(class);
        let sizes: BTreeMap<String, usize> = MuPower::ALL
            .iter()
            .map(|&p| (p.label().to_string(), group.bucket(p).len()))
            .collect();
        buckets.insert(class.to_string(), sizes);
        let times: BTreeMap<String, Vec<String>> = group
            .time_functions()
            .into_iter()
            .map(|(p, set)| {
                let names = set.iter().map(ToString::to_string).collect();
                (p.label().to_string(), names)
            })
            .collect();
        time_functions.insert(class.to_string(), times);
    }

    let uv_limit: Option<BTreeMap<String, BTreeMap<String, String>>> = uv_order.map(|order| {
        assembly
            .uv_limit(order)
            .into_iter()
            .map(|(class, limits)| {
                let per_power: BTreeMap<String, String> = MuPower::ALL
                    .iter()
                    .zip(limits.iter())
                    .map(|(p, f)| (p.label().to_string(), f.to_string()))
                    .collect();
                (class.to_string(), per_power)
            })
            .collect()
    });

    RsdSummary {
        tag: assembly.tag().to_string(),
        pattern: assembly.pattern().to_string(),
        warnings: assembly.warnings().iter().map(ToString::to_string).collect(),
        buckets,
        time_functions,
        uv_limit,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const RUN: &str = r#"
        [spectrum]
        name = "P_gg"
        tag = "Pgg"
        momentum = "k"
        line_of_sight = { direction = "z", symbol = "mu" }

        [[kernel]]
        class = "tree"
        integrand = "(b1 + f*Cos(k,z)^2)^2*Pk(k)"
        external = ["k"]

        [[kernel]]
        class = "13"
        integrand = "b1^2*q^2*Cos(q,k)^2"
        measure = "q^2"
        loop_momenta = ["q"]
        external = ["k"]

        [[rsd]]
        pattern = [{ symbol = "b1", power = 2 }]
        filter = ["b1"]

        [[rsd]]
        pattern = [{ symbol = "b3", power = 1 }]

        [output]
        uv_order = 3
    "#;

    #[test]
    fn full_run_exports_expansion_then_rsd() {
        let config = RunConfig::from_toml_str(RUN).unwrap();
        let output = execute(&config).unwrap();
        assert!(output.export.starts_with("PggTree = "));
        assert!(output
            .export
            .contains("PggP13 = (1)*(1)*(4*Pi*q^2)*(1/3*b1^2*q^2);\n"));
        assert!(output.export.contains("Pggzb1zb1Treezmu0 = (1)*(1)*(1)*(Pk(k));\n"));
        assert!(output.export.contains("Pggzb1zb1Treezmu2 = 0;\n"));
        assert!(output.export.ends_with("Pggzb3P22zmu8 = 0;\n"));
    }

    #[test]
    fn summary_counts_and_warnings() {
        let config = RunConfig::from_toml_str(RUN).unwrap();
        let summary = execute(&config).unwrap().summary;
        assert_eq!(
            summary.elements,
            ClassCounts {
                tree: 1,
                p13: 1,
                p22: 0
            }
        );
        assert_eq!(summary.rsd.len(), 2);
        assert!(summary.rsd[0].warnings.is_empty());
        assert_eq!(summary.rsd[1].warnings.len(), 1);
        assert_eq!(summary.rsd[0].buckets["tree"]["mu0"], 1);
        assert_eq!(summary.rsd[0].buckets["13"]["mu0"], 1);
        assert_eq!(summary.rsd[0].time_functions["tree"]["mu0"], vec!["1"]);
        assert!(summary.uv_limit.is_some());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["rsd"][0]["tag"], "Pggzb1zb1");
    }

    #[test]
    fn expansion_export_can_be_omitted() {
        let text = RUN.replace("uv_order = 3", "expansion = false");
        let config = RunConfig::from_toml_str(&text).unwrap();
        let output = execute(&config).unwrap();
        assert!(output.export.starts_with("Pggzb1zb1Treezmu0 = "));
        assert!(output.summary.uv_limit.is_none());
    }

    #[test]
    fn unsupported_loop_order_is_an_engine_error() {
        let text = RUN.replace(
            "loop_momenta = [\"q\"]",
            "loop_momenta = [\"q\", \"p\"]",
        );
        let config = RunConfig::from_toml_str(&text).unwrap();
        assert!(matches!(
            execute(&config),
            Err(RunError::Engine(lss_oneloop::Error::UnsupportedLoopOrder {
                found: 2
            }))
        ));
    }
}
