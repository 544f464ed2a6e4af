use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::topology::Transformer;
use crate::uncertain::{CorrelationContext, UncertainReal};

/// A type-B uncertainty: a standard uncertainty and its degrees of freedom
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct TypeB {
    pub u: f64,
    pub df: f64,
}

impl TypeB {
    pub const fn new(u: f64, df: f64) -> Self {
        Self { u, df }
    }

    /// A fresh multiplicative factor with nominal value one
    ///
    /// # Errors
    /// Fails if the declared uncertainty is invalid.
    pub fn factor(&self, ctx: &CorrelationContext, label: impl Into<String>) -> Result<UncertainReal> {
        ctx.ureal(1.0, self.u, self.df, label)
    }

    /// A fresh additive term with nominal value zero
    ///
    /// # Errors
    /// Fails if the declared uncertainty is invalid.
    pub fn offset(&self, ctx: &CorrelationContext, label: impl Into<String>) -> Result<UncertainReal> {
        ctx.ureal(0.0, self.u, self.df, label)
    }
}

/// Short-term stability of a transformer ratio, injected at every buildup step
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Stability {
    pub real: TypeB,
    pub imag: TypeB,
}

impl Default for Stability {
    fn default() -> Self {
        Self {
            real: TypeB::new(0.017e-6, 15.0),
            imag: TypeB::new(0.011e-6, 15.0),
        }
    }
}

/// Type-B terms of the lock-in amplifier readings
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Instrument {
    /// Relative gain calibration error
    pub gain: TypeB,
    /// Common-mode offset in volts
    pub common_mode: TypeB,
    /// Degrees of freedom assigned to each averaged reading
    pub reading_df: f64,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            gain: TypeB::new(0.015e-6, 10.0),
            common_mode: TypeB::new(0.1e-6, 5.0),
            reading_df: 100.0,
        }
    }
}

/// Relative fidelity of the series/parallel correction models
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Model {
    pub magnetic: TypeB,
    pub capacitive: TypeB,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            magnetic: TypeB::new(0.5, 5.0),
            capacitive: TypeB::new(0.2, 5.0),
        }
    }
}

/// Secondary leakage impedances of one transformer, in ohm
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct Leakage {
    pub main: f64,
    pub auxiliary: f64,
}

/// Burden variation and the secondary impedances it acts on, in ohm
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Burden {
    /// Assumed variation of the connected burden
    pub variation: f64,
    pub df: f64,
    /// Main secondary burden including leads
    pub main: f64,
    /// Auxiliary secondary burden including leads
    pub auxiliary: f64,
    pub leakage_a: Leakage,
    pub leakage_b: Leakage,
}

impl Default for Burden {
    fn default() -> Self {
        Self {
            variation: 0.005,
            df: 5.0,
            main: 0.486,
            auxiliary: 0.126,
            leakage_a: Leakage {
                main: 0.2699,
                auxiliary: 0.1248,
            },
            leakage_b: Leakage {
                main: 0.079,
                auxiliary: 0.037,
            },
        }
    }
}

impl Burden {
    /// Relative ratio sensitivity to the burden variation, auxiliary secondary first
    ///
    /// $$
    ///     s = \frac{\delta r}{r + z}
    /// $$
    pub fn sensitivities(&self, leakage: &Leakage) -> [TypeB; 2] {
        [
            TypeB::new(self.variation / (self.auxiliary + leakage.auxiliary), self.df),
            TypeB::new(self.variation / (self.main + leakage.main), self.df),
        ]
    }
}

/// Declared constants for a calibration run
///
/// Every field has a laboratory default, so a TOML file only needs the values that differ.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub stability: Stability,
    pub instrument: Instrument,
    pub model: Model,
    pub burden: Burden,
}

impl Config {
    /// Parse a configuration from TOML
    ///
    /// # Errors
    /// Returns an error if the document is not valid TOML or has fields of the wrong type.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Read a configuration from a TOML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!(?path, "loaded configuration");
        Ok(config)
    }
}

/// A calibration certificate as written on disk, before it is checked against a transformer
///
/// Complex values are written as `[real, imaginary]` pairs; `errors` maps each ratio name to one
/// list of errors per burden, each with one error per excitation level.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct RawCalibrationRecord {
    pub reference: Option<String>,
    #[serde(rename = "excitation levels")]
    pub excitation_levels: Option<Vec<f64>>,
    #[serde(rename = "secondary current")]
    pub secondary_current: Option<f64>,
    pub burdens: Option<Vec<[f64; 2]>>,
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<Vec<[f64; 2]>>>,
}

impl RawCalibrationRecord {
    /// Parse a record from TOML
    ///
    /// # Errors
    /// Returns an error if the document is not valid TOML or has fields of the wrong type.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Read a record from a TOML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

/// A calibration certificate that is known to be complete for its transformer
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationRecord {
    pub reference: String,
    pub excitation_levels: Vec<f64>,
    pub secondary_current: f64,
    pub burdens: Vec<Complex64>,
    errors: BTreeMap<String, Vec<Vec<Complex64>>>,
}

fn to_complex(pair: [f64; 2]) -> Complex64 {
    Complex64::new(pair[0], pair[1])
}

impl CalibrationRecord {
    /// Check a raw record against the ratio catalog of `transformer` and convert it
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingCalibrationField`] listing every violation found.
    pub fn from_raw(raw: RawCalibrationRecord, transformer: &Transformer) -> Result<Self> {
        transformer
            .validate_calibration_record(&raw)
            .into_result()?;

        let errors = raw
            .errors
            .into_iter()
            .map(|(name, sets)| {
                let sets = sets
                    .into_iter()
                    .map(|set| set.into_iter().map(to_complex).collect())
                    .collect();
                (name, sets)
            })
            .collect();

        Ok(Self {
            reference: raw.reference.unwrap_or_default(),
            excitation_levels: raw.excitation_levels.unwrap_or_default(),
            secondary_current: raw.secondary_current.unwrap_or_default(),
            burdens: raw
                .burdens
                .unwrap_or_default()
                .into_iter()
                .map(to_complex)
                .collect(),
            errors,
        })
    }

    /// The certified error of `ratio` with burden `burden` at excitation `level`
    pub fn error(&self, ratio: &str, burden: usize, level: f64) -> Option<Complex64> {
        let index = self
            .excitation_levels
            .iter()
            .position(|candidate| *candidate == level)?;
        self.errors.get(ratio)?.get(burden)?.get(index).copied()
    }

    pub fn ratios(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }
}
