//! TOML run configuration.
//!
//! A run file names the spectrum, lists its kernels in the expression
//! syntax of [`lss_symbolic::parse`], and optionally requests
//! redshift-space assemblies.
//!
//! ```toml
//! [spectrum]
//! name = "P_dd"
//! tag = "Pdd"
//! momentum = "k"
//! line_of_sight = { direction = "z", symbol = "mu" }
//!
//! [[kernel]]
//! class = "13"
//! integrand = "q^2*Pk(q)*Cos(q,k)^2"
//! measure = "q^2"
//! loop_momenta = ["q"]
//! external = ["k"]
//!
//! [[kernel]]
//! class = "22"
//! integrand = "Pk(q)*Pk(s)"
//! measure = "q^2"
//! loop_momenta = ["q"]
//! external = ["k"]
//!
//! [kernel.rayleigh]
//! momentum = "s"
//! loop_momentum = "q"
//! loop_coeff = "-1"
//! external = "k"
//! external_coeff = "1"
//!
//! [[rsd]]
//! pattern = [{ symbol = "b1", power = 2 }]
//! filter = ["b1", "b2"]
//!
//! [output]
//! uv_order = 1
//! ```

use std::path::{Path, PathBuf};

use lss_oneloop::{DiagramClass, FilterPattern, KernelBuilder, LoopIntegralKernel};
use lss_symbolic::{parse, Expr, ParseError, Rational, SymbolFactory};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A complete run file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// The spectrum being assembled.
    pub spectrum: SpectrumConfig,
    /// Kernels in insertion order.
    #[serde(default, rename = "kernel")]
    pub kernels: Vec<KernelConfig>,
    /// Redshift-space assemblies to build after reduction.
    #[serde(default)]
    pub rsd: Vec<RsdConfig>,
    /// Output options.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[spectrum]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpectrumConfig {
    /// Human-readable name.
    pub name: String,
    /// Export tag; letters and digits only.
    pub tag: String,
    /// External momentum of the spectrum.
    pub momentum: String,
    /// Binds `Cos(momentum, direction)` to a named symbol.
    #[serde(default)]
    pub line_of_sight: Option<LineOfSight>,
}

/// Line-of-sight binding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineOfSight {
    /// The line-of-sight direction.
    pub direction: String,
    /// Symbol standing for the cosine between momentum and direction.
    pub symbol: String,
}

/// One `[[kernel]]` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelConfig {
    /// `tree`, `13` or `22`.
    pub class: String,
    /// The integrand.
    pub integrand: String,
    /// The integration measure.
    #[serde(default = "unit")]
    pub measure: String,
    /// The Wick contraction factor.
    #[serde(default = "unit")]
    pub wick: String,
    /// The time-dependence factor.
    #[serde(default = "unit")]
    pub time: String,
    /// Loop momenta; empty for tree kernels.
    #[serde(default)]
    pub loop_momenta: Vec<String>,
    /// External momenta.
    #[serde(default)]
    pub external: Vec<String>,
    /// Optional `R = a*L + b*k` declaration.
    #[serde(default)]
    pub rayleigh: Option<RayleighConfig>,
}

/// `[kernel.rayleigh]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RayleighConfig {
    /// The composite momentum `R`.
    pub momentum: String,
    /// The loop momentum `L`.
    pub loop_momentum: String,
    /// Coefficient `a`, an integer or a fraction such as `"1/2"`.
    pub loop_coeff: String,
    /// The external momentum `k`.
    pub external: String,
    /// Coefficient `b`.
    pub external_coeff: String,
}

/// One `[[rsd]]` request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RsdConfig {
    /// Ordered pattern factors.
    #[serde(default)]
    pub pattern: Vec<PatternFactor>,
    /// Symbols set to zero after the pattern coefficient is taken.
    #[serde(default)]
    pub filter: Vec<String>,
}

/// A `{ symbol, power }` pattern factor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternFactor {
    /// Symbol name.
    pub symbol: String,
    /// Power of the symbol, at most 65535.
    pub power: u16,
}

/// `[output]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Order of the UV limits reported in the run summary; none if absent.
    #[serde(default)]
    pub uv_order: Option<i32>,
    /// Whether the loop-expansion statements are written before the
    /// redshift-space ones.
    #[serde(default = "yes")]
    pub expansion: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            uv_order: None,
            expansion: true,
        }
    }
}

fn unit() -> String {
    "1".to_string()
}

fn yes() -> bool {
    true
}

/// Errors raised while loading or interpreting a run file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    /// The file is not valid TOML for a [`RunConfig`].
    #[error("failed to parse config file {0}: {1}")]
    Toml(PathBuf, #[source] toml::de::Error),

    /// The `[spectrum]` table is inconsistent.
    #[error("spectrum: {0}")]
    Spectrum(String),

    /// A kernel entry is inconsistent.
    #[error("kernel #{index}: {reason}")]
    Kernel {
        /// Zero-based position in the `[[kernel]]` array.
        index: usize,
        /// What is wrong.
        reason: String,
    },

    /// A kernel expression does not parse.
    #[error("kernel #{index}: cannot parse {field}: {source}")]
    Expression {
        /// Zero-based position in the `[[kernel]]` array.
        index: usize,
        /// Which field failed.
        field: &'static str,
        /// The parser's complaint.
        #[source]
        source: ParseError,
    },

    /// A redshift-space request is inconsistent.
    #[error("rsd request #{index}: {reason}")]
    Rsd {
        /// Zero-based position in the `[[rsd]]` array.
        index: usize,
        /// What is wrong.
        reason: String,
    },
}

impl RunConfig {
    /// Reads and validates a run file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Toml`] if the file
    /// cannot be read or deserialized, or the first validation failure.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: RunConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::Toml(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a run file held in memory.
    ///
    /// # Errors
    ///
    /// As for [`load`](Self::load); the path in a [`ConfigError::Toml`] is
    /// `<inline>`.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: RunConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Toml(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything that can be checked without building expressions.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found, naming the kernel or request
    /// index where there is one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let spectrum = &self.spectrum;
        for (field, value) in [
            ("name", &spectrum.name),
            ("tag", &spectrum.tag),
            ("momentum", &spectrum.momentum),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Spectrum(format!("'{field}' is empty")));
            }
        }
        if !spectrum.tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Spectrum(format!(
                "tag '{}' must contain only letters and digits",
                spectrum.tag
            )));
        }
        if let Some(los) = &spectrum.line_of_sight {
            if los.direction == spectrum.momentum {
                return Err(ConfigError::Spectrum(format!(
                    "line-of-sight direction '{}' is the spectrum momentum",
                    los.direction
                )));
            }
        }

        for (index, kernel) in self.kernels.iter().enumerate() {
            kernel.validate(index)?;
        }

        for (index, request) in self.rsd.iter().enumerate() {
            if spectrum.line_of_sight.is_none() {
                return Err(ConfigError::Rsd {
                    index,
                    reason: "redshift-space output needs [spectrum].line_of_sight".to_string(),
                });
            }
            if let Some(factor) = request.pattern.iter().find(|f| f.symbol.trim().is_empty()) {
                return Err(ConfigError::Rsd {
                    index,
                    reason: format!("pattern factor of power {} has no symbol", factor.power),
                });
            }
        }
        Ok(())
    }
}

impl KernelConfig {
    /// The diagram class this kernel belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Kernel`] for an unknown class.
    pub fn diagram_class(&self, index: usize) -> Result<DiagramClass, ConfigError> {
        self.class
            .parse()
            .map_err(|reason| ConfigError::Kernel { index, reason })
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let class = self.diagram_class(index)?;
        let invalid = |reason: String| ConfigError::Kernel { index, reason };
        if self.integrand.trim().is_empty() {
            return Err(invalid("integrand is empty".to_string()));
        }
        if class == DiagramClass::Tree && !self.loop_momenta.is_empty() {
            return Err(invalid(format!(
                "tree kernel declares loop momenta {:?}",
                self.loop_momenta
            )));
        }
        if class != DiagramClass::Tree && self.loop_momenta.is_empty() {
            return Err(invalid(format!("{class} kernel declares no loop momentum")));
        }
        if let Some(r) = &self.rayleigh {
            if class == DiagramClass::Tree {
                return Err(invalid("tree kernel declares a Rayleigh momentum".to_string()));
            }
            rayleigh_coeff(index, "loop_coeff", &r.loop_coeff)?;
            rayleigh_coeff(index, "external_coeff", &r.external_coeff)?;
        }
        Ok(())
    }

    /// Builds the kernel, manufacturing its symbols in `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Expression`] for an expression that does not
    /// parse and [`ConfigError::Kernel`] for anything the kernel builder
    /// rejects.
    pub fn build(
        &self,
        index: usize,
        factory: &mut SymbolFactory,
    ) -> Result<LoopIntegralKernel, ConfigError> {
        let mut expr = |field: &'static str, text: &str| -> Result<Expr, ConfigError> {
            parse(text, factory).map_err(|source| ConfigError::Expression {
                index,
                field,
                source,
            })
        };
        let mut builder: KernelBuilder = LoopIntegralKernel::builder()
            .integrand(expr("integrand", &self.integrand)?)
            .measure(expr("measure", &self.measure)?)
            .wick(expr("wick", &self.wick)?)
            .time(expr("time", &self.time)?);

        for name in &self.loop_momenta {
            builder = builder.loop_momentum(&factory.make_symbol(name));
        }
        for name in &self.external {
            builder = builder.external_momentum(&factory.make_symbol(name));
        }
        if let Some(r) = &self.rayleigh {
            let a = rayleigh_coeff(index, "loop_coeff", &r.loop_coeff)?;
            let b = rayleigh_coeff(index, "external_coeff", &r.external_coeff)?;
            builder = builder.rayleigh(
                &factory.make_symbol(&r.momentum),
                &factory.make_symbol(&r.loop_momentum),
                a,
                &factory.make_symbol(&r.external),
                b,
            );
        }
        builder.build().map_err(|e| ConfigError::Kernel {
            index,
            reason: e.to_string(),
        })
    }
}

impl RsdConfig {
    /// The filter pattern, with symbols manufactured in `factory`.
    #[must_use]
    pub fn pattern(&self, factory: &mut SymbolFactory) -> FilterPattern {
        self.pattern.iter().fold(FilterPattern::new(), |p, f| {
            p.with(&factory.make_symbol(&f.symbol), f.power)
        })
    }
}

fn rayleigh_coeff(index: usize, field: &str, text: &str) -> Result<Rational, ConfigError> {
    text.trim()
        .parse::<Rational>()
        .map_err(|e| ConfigError::Kernel {
            index,
            reason: format!("rayleigh {field} '{text}' is not a rational number: {e}"),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [spectrum]
        name = "P"
        tag = "Pk"
        momentum = "k"

        [[kernel]]
        class = "13"
        integrand = "q^2*Cos(q,k)^2"
        measure = "q^2"
        loop_momenta = ["q"]
        external = ["k"]
    "#;

    #[test]
    fn minimal_file_uses_defaults() {
        let config = RunConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.kernels.len(), 1);
        assert_eq!(config.kernels[0].wick, "1");
        assert_eq!(config.kernels[0].time, "1");
        assert!(config.rsd.is_empty());
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn rayleigh_table_attaches_to_last_kernel() {
        let text = format!(
            "{MINIMAL}\n[[kernel]]\nclass = \"22\"\nintegrand = \"Pk(q)*Pk(s)\"\n\
             loop_momenta = [\"q\"]\nexternal = [\"k\"]\n\n[kernel.rayleigh]\n\
             momentum = \"s\"\nloop_momentum = \"q\"\nloop_coeff = \"-1\"\n\
             external = \"k\"\nexternal_coeff = \"1\"\n"
        );
        let config = RunConfig::from_toml_str(&text).unwrap();
        assert!(config.kernels[0].rayleigh.is_none());
        let r = config.kernels[1].rayleigh.as_ref().unwrap();
        assert_eq!(r.momentum, "s");

        let mut sf = SymbolFactory::new();
        let kernel = config.kernels[1].build(1, &mut sf).unwrap();
        assert!(matches!(
            kernel.rayleigh(),
            lss_oneloop::RayleighStructure::One(_)
        ));
    }

    #[test]
    fn unknown_class_names_the_kernel() {
        let text = MINIMAL.replace("class = \"13\"", "class = \"31\"");
        let err = RunConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Kernel { index: 0, .. }));
        assert!(err.to_string().starts_with("kernel #0:"));
    }

    #[test]
    fn loop_class_without_loop_momentum_is_rejected() {
        let text = MINIMAL.replace("loop_momenta = [\"q\"]", "");
        assert!(matches!(
            RunConfig::from_toml_str(&text),
            Err(ConfigError::Kernel { index: 0, .. })
        ));
    }

    #[test]
    fn bad_expression_reports_field() {
        let config = RunConfig::from_toml_str(&MINIMAL.replace("q^2*Cos", "q^2**Cos")).unwrap();
        let mut sf = SymbolFactory::new();
        let err = config.kernels[0].build(0, &mut sf).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Expression {
                index: 0,
                field: "integrand",
                ..
            }
        ));
    }

    #[test]
    fn rsd_needs_line_of_sight() {
        let text = format!("{MINIMAL}\n[[rsd]]\npattern = [{{ symbol = \"b1\", power = 1 }}]\n");
        assert!(matches!(
            RunConfig::from_toml_str(&text),
            Err(ConfigError::Rsd { index: 0, .. })
        ));
    }

    #[test]
    fn oversized_pattern_power_is_refused() {
        let text = format!("{MINIMAL}\n[[rsd]]\npattern = [{{ symbol = \"b1\", power = 4294967295 }}]\n");
        assert!(matches!(
            RunConfig::from_toml_str(&text),
            Err(ConfigError::Toml(..))
        ));
    }

    #[test]
    fn tag_must_be_export_safe() {
        let text = MINIMAL.replace("tag = \"Pk\"", "tag = \"P_k\"");
        assert!(matches!(
            RunConfig::from_toml_str(&text),
            Err(ConfigError::Spectrum(_))
        ));
    }

    #[test]
    fn rational_coefficients_parse() {
        assert_eq!(
            rayleigh_coeff(0, "loop_coeff", " -1/2 ").unwrap(),
            lss_symbolic::expr::rational(-1, 2)
        );
        assert!(rayleigh_coeff(3, "loop_coeff", "half").is_err());
    }
}
