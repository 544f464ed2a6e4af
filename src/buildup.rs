//! Assembly of measured comparisons into ladders of ratio errors.
//!
//! A buildup starts from a self-calibrated configuration and walks from one winding configuration
//! to the next. Each step adds a signed comparison, any series/parallel corrections and a fresh
//! stability term, so every ladder stays exactly correlated with the ones it was derived from.

use std::collections::BTreeMap;
use std::fmt;

use num_complex::Complex64;

use crate::calibration::{Burden, Config, Stability, TypeB};
use crate::complex::UncertainComplex;
use crate::correction::CouplingCorrection;
use crate::error::{Error, Result};
use crate::extraction::Polarity;
use crate::math::{bracketing_pair, interpolate};
use crate::topology::Connection;
use crate::uncertain::CorrelationContext;

/// One connection of a winding group on a physical transformer
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindingConfig {
    transformer: String,
    group: String,
    connection: Connection,
    route: Option<String>,
}

impl WindingConfig {
    pub fn new(transformer: impl Into<String>, group: impl Into<String>, connection: Connection) -> Self {
        Self {
            transformer: transformer.into(),
            group: group.into(),
            connection,
            route: None,
        }
    }

    /// Distinguish a configuration reached along an alternative path through the buildup
    #[must_use]
    pub fn via(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn transformer(&self) -> &str {
        &self.transformer
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub const fn connection(&self) -> Connection {
        self.connection
    }

    /// Short name such as `P1as`, or `P3as_b` for an alternative route
    pub fn label(&self) -> String {
        let label = format!("{}{}{}", self.group, self.transformer, self.connection.suffix());
        match &self.route {
            Some(route) => format!("{label}_{route}"),
            None => label,
        }
    }

    /// Name of the ratio in a calibration record
    pub fn ratio_name(&self) -> String {
        format!("{}_{}", self.group, self.connection.suffix())
    }
}

impl fmt::Display for WindingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A ratio error of one configuration at one nominal level
#[derive(Clone, Debug)]
pub struct RatioError {
    pub config: WindingConfig,
    pub nominal: f64,
    pub error: UncertainComplex,
}

/// The ratio errors of one configuration, one per nominal level
#[derive(Clone, Debug)]
pub struct Ladder {
    config: WindingConfig,
    levels: Vec<f64>,
    errors: Vec<UncertainComplex>,
}

impl Ladder {
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] unless there is one error per level.
    pub fn new(config: WindingConfig, levels: Vec<f64>, errors: Vec<UncertainComplex>) -> Result<Self> {
        if errors.len() != levels.len() {
            return Err(Error::dimension(
                format!("errors in ladder {config}"),
                levels.len(),
                errors.len(),
            ));
        }
        Ok(Self {
            config,
            levels,
            errors,
        })
    }

    pub const fn config(&self) -> &WindingConfig {
        &self.config
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn errors(&self) -> &[UncertainComplex] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The error at a nominal level
    pub fn at(&self, level: f64) -> Option<&UncertainComplex> {
        self.levels
            .iter()
            .position(|candidate| *candidate == level)
            .map(|ii| &self.errors[ii])
    }

    pub fn ratio_errors(&self) -> impl Iterator<Item = RatioError> + '_ {
        self.levels
            .iter()
            .zip(&self.errors)
            .map(|(nominal, error)| RatioError {
                config: self.config.clone(),
                nominal: *nominal,
                error: error.clone(),
            })
    }

    /// A ladder for `config` with every error mapped through `f`
    fn derive<F>(&self, config: WindingConfig, f: F) -> Self
    where
        F: Fn(&UncertainComplex) -> UncertainComplex,
    {
        Self {
            config,
            levels: self.levels.clone(),
            errors: self.errors.iter().map(f).collect(),
        }
    }
}

/// What happens between two states of a chain
#[derive(Clone, Debug, Default)]
pub struct Transition {
    /// Measured errors, one per level, and the sign that makes them errors of the new state
    pub comparison: Option<(Vec<UncertainComplex>, Polarity)>,
    /// Corrections added at every level
    pub corrections: Vec<UncertainComplex>,
    /// Type-B factors with nominal value one, created afresh at every level
    pub factors: Vec<(String, TypeB)>,
}

impl Transition {
    pub fn compared(errors: Vec<UncertainComplex>, polarity: Polarity) -> Self {
        Self {
            comparison: Some((errors, polarity)),
            ..Self::default()
        }
    }

    pub fn corrected<I>(corrections: I) -> Self
    where
        I: IntoIterator<Item = UncertainComplex>,
    {
        Self {
            corrections: corrections.into_iter().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_factor(mut self, label: impl Into<String>, factor: TypeB) -> Self {
        self.factors.push((label.into(), factor));
        self
    }
}

/// Named ladders built step by step from one self-calibrated configuration
#[derive(Clone, Debug)]
pub struct Chain {
    ctx: CorrelationContext,
    levels: Vec<f64>,
    stability: Stability,
    states: BTreeMap<WindingConfig, Ladder>,
}

impl Chain {
    pub fn new(ctx: CorrelationContext, levels: Vec<f64>, stability: Stability) -> Self {
        Self {
            ctx,
            levels,
            stability,
            states: BTreeMap::new(),
        }
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Start the chain from a directly measured configuration
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] unless there is one measured error per level.
    pub fn seed(
        &mut self,
        config: WindingConfig,
        measured: Vec<UncertainComplex>,
        polarity: Polarity,
        factors: Vec<(String, TypeB)>,
    ) -> Result<&Ladder> {
        let transition = Transition {
            comparison: Some((measured, polarity)),
            corrections: vec![],
            factors,
        };
        let zero = vec![UncertainComplex::constant(Complex64::new(0.0, 0.0)); self.levels.len()];
        self.step(&zero, config, &transition)
    }

    /// Derive the state `to` from the existing state `from`
    ///
    /// # Errors
    /// Returns [`Error::UnknownState`] if `from` has not been built, and
    /// [`Error::DimensionMismatch`] if the comparison does not have one error per level.
    pub fn advance(&mut self, from: &WindingConfig, to: WindingConfig, transition: &Transition) -> Result<&Ladder> {
        let base = self
            .states
            .get(from)
            .ok_or_else(|| Error::UnknownState(from.label()))?
            .errors
            .clone();
        self.step(&base, to, transition)
    }

    fn stability_term(&self, config: &WindingConfig) -> Result<UncertainComplex> {
        self.ctx.ucomplex(
            Complex64::new(0.0, 0.0),
            [self.stability.real.u, self.stability.imag.u],
            self.stability.real.df,
            format!("ct_stability_{}", config.label().to_lowercase()),
        )
    }

    fn step(&mut self, base: &[UncertainComplex], to: WindingConfig, transition: &Transition) -> Result<&Ladder> {
        if let Some((comparison, _)) = &transition.comparison {
            if comparison.len() != self.levels.len() {
                return Err(Error::dimension(
                    format!("comparison errors for {to}"),
                    self.levels.len(),
                    comparison.len(),
                ));
            }
        }

        let mut errors = Vec::with_capacity(self.levels.len());
        for (ii, previous) in base.iter().enumerate() {
            let mut error = previous.clone();
            if let Some((comparison, polarity)) = &transition.comparison {
                error = error + polarity.apply(&comparison[ii]);
            }
            for correction in &transition.corrections {
                error = error + correction;
            }
            error = error + self.stability_term(&to)?;
            for (label, factor) in &transition.factors {
                error = error * factor.factor(&self.ctx, label.as_str())?;
            }
            errors.push(error.with_label(to.label()));
        }

        tracing::info!(state = %to, levels = errors.len(), "completed buildup state");
        let ladder = Ladder::new(to.clone(), self.levels.clone(), errors)?;
        self.states.insert(to.clone(), ladder);
        self.ladder(&to)
    }

    /// A built state
    ///
    /// # Errors
    /// Returns [`Error::UnknownState`] if `config` has not been built.
    pub fn ladder(&self, config: &WindingConfig) -> Result<&Ladder> {
        self.states
            .get(config)
            .ok_or_else(|| Error::UnknownState(config.label()))
    }

    pub fn ladders(&self) -> impl Iterator<Item = &Ladder> {
        self.states.values()
    }
}

/// Sign-corrected comparisons of the two-stage buildup between transformers `a` and `b`
///
/// Each list holds one error per nominal level and is already signed as an error of the
/// transformer in the reference position by the polarity check.
#[derive(Clone, Debug)]
pub struct TwoStageMeasurements {
    /// Self calibration of `P1as`
    pub e1: Vec<UncertainComplex>,
    /// `P1ap` against `P1bs`
    pub e2: Vec<UncertainComplex>,
    /// `P1bp` against `P2ap`
    pub e3: Vec<UncertainComplex>,
    /// `P2ap` against `P2bs`
    pub e4: Vec<UncertainComplex>,
    /// `P2bs` against `P3as`
    pub e5a: Vec<UncertainComplex>,
    /// `P1bp` against `P3as`
    pub e5b: Vec<UncertainComplex>,
}

/// Parallel-minus-series corrections of the primary 1 windings used by the two-stage buildup
#[derive(Clone, Debug)]
pub struct TwoStageCorrections {
    pub magnetic_1a: UncertainComplex,
    pub magnetic_1b: UncertainComplex,
    pub capacitive_1a: UncertainComplex,
    pub capacitive_1b: UncertainComplex,
}

/// The ladders of the two-stage buildup
#[derive(Clone, Debug)]
pub struct TwoStage {
    pub p1as: Ladder,
    pub p1ap: Ladder,
    pub p1bs: Ladder,
    pub p1bp: Ladder,
    pub p2ap: Ladder,
    pub p2bs: Ladder,
    /// `P3as` reached through `P2bs`
    pub p3as_a: Ladder,
    /// `P3as` reached through `P1bp`
    pub p3as_b: Ladder,
}

fn burden_factors(burden: &Burden, transformer: &str) -> Vec<(String, TypeB)> {
    let leakage = if transformer == "a" {
        &burden.leakage_a
    } else {
        &burden.leakage_b
    };
    let [auxiliary, main] = burden.sensitivities(leakage);
    vec![
        (format!("burden1{transformer}"), auxiliary),
        (format!("burden2{transformer}"), main),
    ]
}

/// Build the eight ladders of the two-stage buildup
///
/// Comparisons in which `b` is calibrated enter with a negative sign.
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] if any comparison does not have one error per level.
pub fn two_stage(
    ctx: &CorrelationContext,
    levels: &[f64],
    config: &Config,
    measured: TwoStageMeasurements,
    corrections: &TwoStageCorrections,
) -> Result<TwoStage> {
    use Connection::{Parallel, Series};

    let p1as = WindingConfig::new("a", "P1", Series);
    let p1ap = WindingConfig::new("a", "P1", Parallel);
    let p1bs = WindingConfig::new("b", "P1", Series);
    let p1bp = WindingConfig::new("b", "P1", Parallel);
    let p2ap = WindingConfig::new("a", "P2", Parallel);
    let p2bs = WindingConfig::new("b", "P2", Series);
    let p3as_a = WindingConfig::new("a", "P3", Series).via("a");
    let p3as_b = WindingConfig::new("a", "P3", Series).via("b");

    let mut chain = Chain::new(ctx.clone(), levels.to_vec(), config.stability);
    chain.seed(
        p1as.clone(),
        measured.e1,
        Polarity::Positive,
        burden_factors(&config.burden, "a"),
    )?;

    let mut to_p1ap = Transition::corrected([corrections.magnetic_1a.clone(), corrections.capacitive_1a.clone()]);
    to_p1ap.factors = burden_factors(&config.burden, "b");
    chain.advance(&p1as, p1ap.clone(), &to_p1ap)?;

    chain.advance(&p1ap, p1bs.clone(), &Transition::compared(measured.e2, Polarity::Negative))?;
    chain.advance(
        &p1bs,
        p1bp.clone(),
        &Transition::corrected([corrections.capacitive_1b.clone(), corrections.magnetic_1b.clone()]),
    )?;
    chain.advance(&p1bp, p2ap.clone(), &Transition::compared(measured.e3, Polarity::Positive))?;
    chain.advance(&p2ap, p2bs.clone(), &Transition::compared(measured.e4, Polarity::Negative))?;
    chain.advance(&p2bs, p3as_a.clone(), &Transition::compared(measured.e5a, Polarity::Positive))?;
    chain.advance(&p1bp, p3as_b.clone(), &Transition::compared(measured.e5b, Polarity::Positive))?;

    let ladder = |config: &WindingConfig| chain.ladder(config).cloned();
    Ok(TwoStage {
        p1as: ladder(&p1as)?,
        p1ap: ladder(&p1ap)?,
        p1bs: ladder(&p1bs)?,
        p1bp: ladder(&p1bp)?,
        p2ap: ladder(&p2ap)?,
        p2bs: ladder(&p2bs)?,
        p3as_a: ladder(&p3as_a)?,
        p3as_b: ladder(&p3as_b)?,
    })
}

/// Coupling corrections for the connections derived outside the two-stage buildup
#[derive(Clone, Debug)]
pub struct ExtraCorrections {
    pub magnetic_1a: CouplingCorrection,
    pub magnetic_2a: CouplingCorrection,
    pub magnetic_3a: UncertainComplex,
    pub magnetic_2b: UncertainComplex,
    pub capacitive_1a: CouplingCorrection,
    pub capacitive_2a: CouplingCorrection,
    pub capacitive_3a: UncertainComplex,
    pub capacitive_2b: UncertainComplex,
}

/// Ladders of connections that follow from the two-stage results by correction alone
#[derive(Clone, Debug)]
pub struct ExtraRatios {
    pub p3ap: Ladder,
    pub p2as: Ladder,
    pub p2asp: Ladder,
    pub p1asp: Ladder,
    pub p2bp: Ladder,
}

/// Derive `P3ap`, `P2as`, `P2asp`, `P1asp` and `P2bp` from the two-stage ladders
///
/// These are linear combinations only; no stability term is added.
pub fn extra_ratios(two_stage: &TwoStage, corrections: &ExtraCorrections) -> ExtraRatios {
    use Connection::{Parallel, Series, SeriesParallel};

    let mag_1a = &corrections.magnetic_1a;
    let mag_2a = &corrections.magnetic_2a;
    let cap_1a = &corrections.capacitive_1a;
    let cap_2a = &corrections.capacitive_2a;

    let p3ap = two_stage
        .p3as_a
        .derive(WindingConfig::new("a", "P3", Parallel), |e| {
            e + &corrections.magnetic_3a + &corrections.capacitive_3a
        });
    let p2as = two_stage
        .p2ap
        .derive(WindingConfig::new("a", "P2", Series), |e| {
            e - &mag_2a.parallel - &cap_2a.parallel
        });

    let sp_2a = mag_2a.series_parallel_or_zero() - &mag_2a.parallel + cap_2a.series_parallel_or_zero()
        - &cap_2a.parallel;
    let p2asp = two_stage
        .p2ap
        .derive(WindingConfig::new("a", "P2", SeriesParallel), |e| e + &sp_2a);

    let sp_1a = mag_1a.series_parallel_or_zero() - &mag_1a.parallel + cap_1a.series_parallel_or_zero()
        - &cap_1a.parallel;
    let p1asp = two_stage
        .p1ap
        .derive(WindingConfig::new("a", "P1", SeriesParallel), |e| e + &sp_1a);

    let p2bp = two_stage
        .p2bs
        .derive(WindingConfig::new("b", "P2", Parallel), |e| {
            e + &corrections.magnetic_2b + &corrections.capacitive_2b
        });

    ExtraRatios {
        p3ap,
        p2as,
        p2asp,
        p1asp,
        p2bp,
    }
}

/// Errors at every `level × scale`, interpolated from `errors` given at `levels`
///
/// Each target uses the last adjacent pair of `levels` that brackets it, or the nearest end pair
/// when it lies outside the calibrated range.
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] if the lengths differ or there are fewer than two levels.
pub fn retarget(errors: &[UncertainComplex], levels: &[f64], scale: f64) -> Result<Vec<UncertainComplex>> {
    if errors.len() != levels.len() {
        return Err(Error::dimension("errors to retarget", levels.len(), errors.len()));
    }

    levels
        .iter()
        .map(|level| -> Result<UncertainComplex> {
            let target = level * scale;
            let ii = bracketing_pair(levels, target)
                .ok_or_else(|| Error::dimension("levels to interpolate between", 2, levels.len()))?;
            Ok(interpolate(levels[ii], levels[ii + 1], &errors[ii], &errors[ii + 1], target))
        })
        .collect()
}

/// Errors at one fifth of each level
///
/// # Errors
/// Fails as for [`retarget`].
pub fn one_fifth(errors: &[UncertainComplex], levels: &[f64]) -> Result<Vec<UncertainComplex>> {
    retarget(errors, levels, 0.2)
}

/// The third transformer `c`, calibrated against `P2as` at one fifth of its excitation
#[derive(Clone, Debug)]
pub struct ThirdTransformer {
    /// `P2as` interpolated to one fifth excitation
    pub p2as_fifth: Ladder,
    pub tc: Ladder,
}

/// Calibrate transformer `c` from `P2ap` and the sign-corrected comparison `measured`
///
/// `P2as` is obtained from `P2ap` at one fifth excitation by removing the capacitive and magnetic
/// parallel-minus-series corrections; the comparison is then subtracted as `a` is in the reference
/// position.
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] if `measured` does not match the levels of `p2ap`.
pub fn third_transformer(
    p2ap: &Ladder,
    measured: &[UncertainComplex],
    magnetic_2a: &UncertainComplex,
    capacitive_2a: &UncertainComplex,
) -> Result<ThirdTransformer> {
    if measured.len() != p2ap.len() {
        return Err(Error::dimension("comparisons for transformer c", p2ap.len(), measured.len()));
    }

    let fifth = one_fifth(p2ap.errors(), p2ap.levels())?
        .into_iter()
        .map(|e| e - capacitive_2a - magnetic_2a)
        .collect::<Vec<_>>();
    let tc = fifth
        .iter()
        .zip(measured)
        .map(|(p2as, e6)| p2as - e6)
        .collect::<Vec<_>>();

    let p2as_fifth = Ladder::new(
        WindingConfig::new("a", "P2", Connection::Series).via("fifth"),
        p2ap.levels().to_vec(),
        fifth,
    )?;
    let tc = Ladder::new(
        WindingConfig::new("c", "P1", Connection::Series),
        p2ap.levels().to_vec(),
        tc,
    )?;
    tracing::info!(levels = tc.len(), "calibrated third transformer");
    Ok(ThirdTransformer { p2as_fifth, tc })
}
