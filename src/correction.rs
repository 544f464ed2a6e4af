//! Corrections between the series, parallel and series/parallel connections of a winding group.
//!
//! Two effects make the parallel connection differ from the series connection: unequal magnetic
//! coupling of the sections to the core combined with unequal sharing of current between them, and
//! the change of potential distribution along the distributed capacitance from the primary to its
//! screen. Both are small and are modelled to first order; each result is scaled by a fresh type-B
//! factor describing the fidelity of the model.
use std::f64::consts::PI;

use num_complex::Complex64;

use crate::block::MeasurementBlock;
use crate::calibration::TypeB;
use crate::complex::UncertainComplex;
use crate::error::{Error, Result};
use crate::scalar::{ComplexScalar, Scalar};
use crate::uncertain::{CorrelationContext, UncertainReal};

/// Turns of a winding group: `sections` sections of `turns` each against `secondary` turns
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SectionRatio {
    pub sections: usize,
    pub turns: f64,
    pub secondary: f64,
}

impl SectionRatio {
    pub const fn new(sections: usize, turns: f64, secondary: f64) -> Self {
        Self {
            sections,
            turns,
            secondary,
        }
    }

    /// The ratio with every section in series, $N = n / (k m)$
    #[allow(clippy::cast_precision_loss)]
    pub fn series_ratio(&self) -> f64 {
        self.secondary / (self.sections as f64 * self.turns)
    }

    /// The ratio of a single section, $n / m$
    pub fn section_ratio(&self) -> f64 {
        self.secondary / self.turns
    }

    #[allow(clippy::cast_precision_loss)]
    fn k(&self) -> f64 {
        self.sections as f64
    }
}

/// Fractional share of current carried by each section when the group is connected in parallel
///
/// The shares are derived from the volt drops measured across the sections with the group in
/// series. `vdrops` are measured either across each section individually or cumulatively from the
/// first section. Each drop is normalised to the secondary current `target_i2`, giving a
/// primary leakage resistance for the section
///
/// $$
///     r_i = \frac{R_s V_i}{V_s N} - \frac{R_s + r_{ls}}{N^2 k}
/// $$
///
/// and the shares are the normalised leakage conductances, summing to `k`.
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] if the number of drops or currents differs from the number
/// of sections.
pub fn current_share(
    ratio: &SectionRatio,
    rs: &Scalar,
    secondary_leakage: &Scalar,
    vdrops: &[f64],
    secondary_currents: &[f64],
    target_i2: f64,
    measured_individually: bool,
) -> Result<Vec<Scalar>> {
    let k = ratio.sections;
    if vdrops.len() != k {
        return Err(Error::dimension("section volt drops", k, vdrops.len()));
    }
    if secondary_currents.len() != k {
        return Err(Error::dimension(
            "secondary currents",
            k,
            secondary_currents.len(),
        ));
    }

    let n = ratio.series_ratio();
    let normalised = vdrops
        .iter()
        .zip(secondary_currents)
        .map(|(vdrop, i2)| vdrop / i2 * target_i2)
        .collect::<Vec<_>>();

    let drops = normalised.iter().enumerate().map(|(ii, v)| {
        if ii == 0 || measured_individually {
            *v
        } else {
            v - normalised[ii - 1]
        }
    });

    let series_term = &(rs + secondary_leakage) * &Scalar::from(1.0 / (n * n * ratio.k()));
    let conductances = drops
        .map(|drop| {
            let resistance = &(rs * &Scalar::from(drop / target_i2 / n)) - &series_term;
            resistance.recip()
        })
        .collect::<Vec<_>>();

    let total = conductances
        .iter()
        .fold(Scalar::from(0.0), |acc, g| &acc + g);
    let shares = conductances
        .iter()
        .map(|g| &(g / &total) * &Scalar::from(ratio.k()))
        .collect::<Vec<_>>();

    tracing::debug!(
        shares = ?shares.iter().map(Scalar::value).collect::<Vec<_>>(),
        "computed current shares"
    );
    Ok(shares)
}

/// One null-balance reading with a section driven in opposition to the first
#[derive(Clone, Debug)]
pub struct CouplingReading {
    pub shunt_v: UncertainReal,
    pub x: UncertainReal,
    pub y: UncertainReal,
    /// Ratio of the monitoring transformer
    pub monitor_ratio: f64,
    pub shunt: f64,
    pub common_r: f64,
}

/// Mutual coupling of each section relative to the first, per unit of full-scale secondary current
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] unless there is one reading fewer than there are sections.
pub fn coupling(readings: &[CouplingReading], ratio: &SectionRatio) -> Result<Vec<UncertainComplex>> {
    let expected = ratio.sections.saturating_sub(1);
    if readings.len() != expected {
        return Err(Error::dimension("coupling readings", expected, readings.len()));
    }

    let section_ratio = ratio.section_ratio();
    Ok(readings
        .iter()
        .map(|reading| {
            let difference =
                &UncertainComplex::new(reading.x.clone(), reading.y.clone()) / reading.common_r;
            let test_current = &reading.shunt_v * (reading.monitor_ratio / reading.shunt);
            &difference / &(&test_current / section_ratio)
        })
        .collect())
}

fn check_shares(coupling: &[UncertainComplex], shares: &[Scalar], ratio: &SectionRatio) -> Result<()> {
    if shares.len() != ratio.sections {
        return Err(Error::dimension("current shares", ratio.sections, shares.len()));
    }
    if coupling.len() + 1 != shares.len() {
        return Err(Error::dimension(
            "coupling coefficients",
            shares.len().saturating_sub(1),
            coupling.len(),
        ));
    }
    Ok(())
}

/// $N \sum_{i \ge 1} a_{i-1} (s_i - 1)$
fn weighted_coupling(coupling: &[UncertainComplex], shares: &[UncertainReal], n: f64) -> UncertainComplex {
    let sum: UncertainComplex = coupling
        .iter()
        .zip(&shares[1..])
        .map(|(a, s)| a * &(s - 1.0))
        .sum();
    sum * n
}

/// Whether a series/parallel connection exists for a group of `sections`
///
/// # Errors
/// Returns [`Error::NotSupported`] for even groups of more than four sections, where the split into
/// series halves is ambiguous.
fn series_parallel_supported(sections: usize) -> Result<bool> {
    match sections {
        4 => Ok(true),
        k if k % 2 == 1 || k <= 2 => Ok(false),
        k => Err(Error::NotSupported(format!(
            "series/parallel corrections for {k} sections"
        ))),
    }
}

/// Parallel-minus-series error caused by magnetic coupling differences between sections
///
/// The first coupling is zero by construction of the measurement, so the first share does not
/// contribute.
///
/// # Errors
/// Fails if the number of shares, couplings and sections do not agree.
pub fn magnetic_correction(
    ctx: &CorrelationContext,
    coupling: &[UncertainComplex],
    shares: &[Scalar],
    ratio: &SectionRatio,
    model: &TypeB,
) -> Result<UncertainComplex> {
    check_shares(coupling, shares, ratio)?;
    let shares = shares.iter().map(Scalar::to_uncertain).collect::<Vec<_>>();

    let error = weighted_coupling(coupling, &shares, ratio.series_ratio());
    let error = error * model.factor(ctx, "sp_mag")?;
    tracing::debug!(%error, "magnetic parallel correction");
    Ok(error)
}

/// Series/parallel-minus-series error caused by magnetic coupling differences
///
/// The shares are rebalanced so each series half carries exactly half of the current.
///
/// # Errors
/// Fails as for [`magnetic_correction`], and with [`Error::NotSupported`] for even groups of more
/// than four sections.
pub fn series_parallel_magnetic_correction(
    ctx: &CorrelationContext,
    coupling: &[UncertainComplex],
    shares: &[Scalar],
    ratio: &SectionRatio,
    model: &TypeB,
) -> Result<Option<UncertainComplex>> {
    check_shares(coupling, shares, ratio)?;
    if !series_parallel_supported(ratio.sections)? {
        return Ok(None);
    }

    let shares = shares.iter().map(Scalar::to_uncertain).collect::<Vec<_>>();
    let first = (2.0 - &(&shares[0] + &shares[1])) / 2.0;
    let second = (2.0 - &(&shares[2] + &shares[3])) / 2.0;
    let rebalanced = [
        &shares[0] + &first,
        &shares[1] + &first,
        &shares[2] + &second,
        &shares[3] + &second,
    ];

    let error = weighted_coupling(coupling, &rebalanced, ratio.series_ratio());
    let error = error * model.factor(ctx, "s_sp_mag")?;
    tracing::debug!(%error, "magnetic series/parallel correction");
    Ok(Some(error))
}

/// $Y_{pg}/3 \, (k^2 - g^2) \left((r_2 + z_2)(m/n)^2 + z\right)$
fn capacitive_term(
    ypg: &ComplexScalar,
    z: &ComplexScalar,
    r2: &Scalar,
    z2: &ComplexScalar,
    ratio: &SectionRatio,
    groups: f64,
) -> UncertainComplex {
    let k = ratio.k();
    let turns = (ratio.turns / ratio.secondary).powi(2);
    let impedance = &(&(&ComplexScalar::from(r2.clone()) + z2) * turns) + z;
    let scale = k.mul_add(k, -groups * groups) / 3.0;
    (&(ypg * scale) * &impedance).to_uncertain()
}

/// Parallel-minus-series error from the primary-to-screen capacitance
///
/// `ypg` is the admittance from the series primary to its screen, `z` the leakage impedance of
/// the primary in parallel, `r2` the secondary burden and `z2` the secondary leakage impedance.
///
/// # Errors
/// Fails if the model factor cannot be created.
pub fn capacitive_correction(
    ctx: &CorrelationContext,
    ypg: &ComplexScalar,
    z: &ComplexScalar,
    r2: &Scalar,
    z2: &ComplexScalar,
    ratio: &SectionRatio,
    model: &TypeB,
) -> Result<UncertainComplex> {
    let error = capacitive_term(ypg, z, r2, z2, ratio, 1.0) * model.factor(ctx, "sp_cap")?;
    tracing::debug!(%error, "capacitive parallel correction");
    Ok(error)
}

/// Series/parallel-minus-series error from the primary-to-screen capacitance
///
/// # Errors
/// Returns [`Error::NotSupported`] for even groups of more than four sections.
pub fn series_parallel_capacitive_correction(
    ctx: &CorrelationContext,
    ypg: &ComplexScalar,
    z: &ComplexScalar,
    r2: &Scalar,
    z2: &ComplexScalar,
    ratio: &SectionRatio,
    model: &TypeB,
) -> Result<Option<UncertainComplex>> {
    if !series_parallel_supported(ratio.sections)? {
        return Ok(None);
    }
    let error = capacitive_term(ypg, z, r2, z2, ratio, 2.0) * model.factor(ctx, "sp_s_cap")?;
    tracing::debug!(%error, "capacitive series/parallel correction");
    Ok(Some(error))
}

/// Admittance of a capacitance at the given frequency, $j 2 \pi f C$
pub fn screen_admittance(frequency: f64, capacitance: f64) -> Complex64 {
    Complex64::new(0.0, 2.0 * PI * frequency * capacitance)
}

/// A correction that is only estimated, expressed as a zero-valued uncertainty
///
/// The standard uncertainties are the magnitudes of the estimate's parts.
///
/// # Errors
/// Fails if the estimate is not finite.
pub fn as_uncertainty(
    ctx: &CorrelationContext,
    correction: &UncertainComplex,
    label: &str,
) -> Result<UncertainComplex> {
    let estimate = correction.value();
    tracing::warn!(%label, %estimate, "correction is estimated, using it as an uncertainty");
    ctx.ucomplex(
        Complex64::new(0.0, 0.0),
        [estimate.re.abs(), estimate.im.abs()],
        f64::INFINITY,
        label,
    )
}

/// The parallel-minus-series and, where it exists, series/parallel-minus-series errors of a group
#[derive(Clone, Debug)]
pub struct CouplingCorrection {
    pub parallel: UncertainComplex,
    pub series_parallel: Option<UncertainComplex>,
}

impl CouplingCorrection {
    /// # Errors
    /// Fails as for [`magnetic_correction`] and [`series_parallel_magnetic_correction`].
    pub fn magnetic(
        ctx: &CorrelationContext,
        coupling: &[UncertainComplex],
        shares: &[Scalar],
        ratio: &SectionRatio,
        model: &TypeB,
    ) -> Result<Self> {
        Ok(Self {
            parallel: magnetic_correction(ctx, coupling, shares, ratio, model)?,
            series_parallel: series_parallel_magnetic_correction(ctx, coupling, shares, ratio, model)?,
        })
    }

    /// # Errors
    /// Fails as for [`series_parallel_capacitive_correction`].
    pub fn capacitive(
        ctx: &CorrelationContext,
        ypg: &ComplexScalar,
        z: &ComplexScalar,
        r2: &Scalar,
        z2: &ComplexScalar,
        ratio: &SectionRatio,
        model: &TypeB,
    ) -> Result<Self> {
        Ok(Self {
            parallel: capacitive_correction(ctx, ypg, z, r2, z2, ratio, model)?,
            series_parallel: series_parallel_capacitive_correction(ctx, ypg, z, r2, z2, ratio, model)?,
        })
    }

    /// The series/parallel-minus-series error, or an exact zero for groups without one
    pub fn series_parallel_or_zero(&self) -> UncertainComplex {
        self.series_parallel
            .clone()
            .unwrap_or_else(|| UncertainComplex::constant(Complex64::new(0.0, 0.0)))
    }
}

/// The two blocks measured for the magnetic correction of one winding group
#[derive(Clone, Debug)]
pub struct CouplingMeasurement {
    pub vdrops: Vec<f64>,
    pub secondary_currents: Vec<f64>,
    pub readings: Vec<CouplingReading>,
}

const SHARE_COLUMNS: usize = 4;
const COUPLING_COLUMNS: usize = 10;

impl CouplingMeasurement {
    /// Parse the volt-drop block and the coupling block
    ///
    /// Volt-drop rows are `[i2, _, vdrop, _]`. Coupling rows are label, shunt volts, X volts,
    /// Y volts, their three standard deviations, monitor ratio, shunt and common resistance.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] for rows of the wrong width, and cell errors for
    /// missing or non-numeric values.
    pub fn from_blocks(
        ctx: &CorrelationContext,
        shares: &MeasurementBlock,
        coupling: &MeasurementBlock,
        reading_df: f64,
    ) -> Result<Self> {
        for row in shares.rows() {
            if row.len() != SHARE_COLUMNS {
                return Err(Error::dimension("volt drop row", SHARE_COLUMNS, row.len()));
            }
        }
        let secondary_currents = shares.column(0)?;
        let vdrops = shares.column(2)?;

        let readings = coupling
            .rows()
            .iter()
            .enumerate()
            .map(|(ii, row)| {
                if row.len() != COUPLING_COLUMNS {
                    return Err(Error::dimension("coupling row", COUPLING_COLUMNS, row.len()));
                }
                let label = &row[0];
                let value = |column| coupling.number(ii, column);
                Ok(CouplingReading {
                    shunt_v: ctx.ureal(value(1)?, value(4)?, reading_df, format!("shuntv {label}"))?,
                    x: ctx.ureal(value(2)?, value(5)?, reading_df, format!("X V {label}"))?,
                    y: ctx.ureal(value(3)?, value(6)?, reading_df, format!("Y V {label}"))?,
                    monitor_ratio: value(7)?,
                    shunt: value(8)?,
                    common_r: value(9)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            vdrops,
            secondary_currents,
            readings,
        })
    }

    /// The magnetic corrections implied by the two blocks
    ///
    /// # Errors
    /// Fails if the blocks do not match the section count of `ratio`.
    #[allow(clippy::too_many_arguments)]
    pub fn correction(
        &self,
        ctx: &CorrelationContext,
        ratio: &SectionRatio,
        rs: &Scalar,
        secondary_leakage: &Scalar,
        target_i2: f64,
        measured_individually: bool,
        model: &TypeB,
    ) -> Result<CouplingCorrection> {
        let shares = current_share(
            ratio,
            rs,
            secondary_leakage,
            &self.vdrops,
            &self.secondary_currents,
            target_i2,
            measured_individually,
        )?;
        let coupling = coupling(&self.readings, ratio)?;
        CouplingCorrection::magnetic(ctx, &coupling, &shares, ratio, model)
    }
}

#[cfg(test)]
mod test {
    use ndarray_rand::rand::{Rng, SeedableRng};
    use num_complex::Complex64;
    use rand_isaac::Isaac64Rng;

    use super::*;
    use crate::block::Cell;

    fn model() -> TypeB {
        TypeB::new(0.5, 5.0)
    }

    #[test]
    fn equal_drops_share_current_equally() -> Result<()> {
        let ratio = SectionRatio::new(4, 25.0, 100.0);
        let shares = current_share(
            &ratio,
            &Scalar::from(0.2),
            &Scalar::from(0.268),
            &[0.3, 0.3, 0.3, 0.3],
            &[1.0, 1.0, 1.0, 1.0],
            1.0,
            true,
        )?;

        for share in shares {
            approx::assert_relative_eq!(share.value(), 1.0, max_relative = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn shares_sum_to_the_section_count() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let ratio = SectionRatio::new(5, 1.0, 100.0);
        let vdrops = (0..5).map(|_| rng.gen_range(0.2..0.4)).collect::<Vec<f64>>();
        let currents = (0..5).map(|_| rng.gen_range(0.9..1.1)).collect::<Vec<f64>>();

        let shares = current_share(
            &ratio,
            &Scalar::from(0.2),
            &Scalar::from(0.268),
            &vdrops,
            &currents,
            1.0,
            true,
        )?;

        let total: f64 = shares.iter().map(Scalar::value).sum();
        approx::assert_relative_eq!(total, 5.0, max_relative = 1e-12);
        Ok(())
    }

    #[test]
    fn cumulative_drops_are_differenced() -> Result<()> {
        let ratio = SectionRatio::new(4, 25.0, 100.0);
        let rs = Scalar::from(0.2);
        let rls = Scalar::from(0.268);
        let ones = [1.0; 4];

        let individual = current_share(&ratio, &rs, &rls, &[0.3, 0.31, 0.29, 0.3], &ones, 1.0, true)?;
        let cumulative = current_share(&ratio, &rs, &rls, &[0.3, 0.61, 0.9, 1.2], &ones, 1.0, false)?;

        for (a, b) in individual.iter().zip(&cumulative) {
            approx::assert_relative_eq!(a.value(), b.value(), max_relative = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn share_inputs_must_match_the_sections() {
        let ratio = SectionRatio::new(4, 25.0, 100.0);
        let result = current_share(
            &ratio,
            &Scalar::from(0.2),
            &Scalar::from(0.268),
            &[0.3, 0.3, 0.3],
            &[1.0, 1.0, 1.0],
            1.0,
            true,
        );
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch { expected: 4, found: 3, .. })
        ));
    }

    #[test]
    fn coupling_is_relative_to_full_scale_secondary_current() -> Result<()> {
        let ctx = CorrelationContext::new();
        let ratio = SectionRatio::new(2, 3.0, 120.0);
        let reading = CouplingReading {
            shunt_v: ctx.ureal(0.5, 1e-6, 100.0, "shuntv")?,
            x: ctx.ureal(2e-6, 1e-8, 100.0, "x")?,
            y: ctx.ureal(-1e-6, 1e-8, 100.0, "y")?,
            monitor_ratio: 20.0,
            shunt: 0.1,
            common_r: 10.0,
        };

        let coupling = coupling(&[reading], &ratio)?;

        // itest = 0.5 / 0.1 * 20 = 100 A, full scale secondary current 100 / 40 = 2.5 A
        let expected = Complex64::new(2e-6, -1e-6) / 10.0 / 2.5;
        approx::assert_relative_eq!(coupling[0].value().re, expected.re, max_relative = 1e-12);
        approx::assert_relative_eq!(coupling[0].value().im, expected.im, max_relative = 1e-12);
        Ok(())
    }

    #[test]
    fn magnetic_correction_vanishes_for_equal_shares() -> Result<()> {
        let ctx = CorrelationContext::new();
        let ratio = SectionRatio::new(4, 25.0, 100.0);
        let coupling = (0..3)
            .map(|ii| ctx.ucomplex(Complex64::new(1e-3, 2e-3), [1e-5, 1e-5], 10.0, format!("a{ii}")))
            .collect::<Result<Vec<_>>>()?;
        let shares = vec![Scalar::from(1.0); 4];

        let correction = CouplingCorrection::magnetic(&ctx, &coupling, &shares, &ratio, &model())?;

        assert_eq!(correction.parallel.value(), Complex64::new(0.0, 0.0));
        assert!(correction.series_parallel.is_some());
        Ok(())
    }

    #[test]
    fn magnetic_correction_weights_coupling_by_share_imbalance() -> Result<()> {
        let ctx = CorrelationContext::new();
        let ratio = SectionRatio::new(4, 25.0, 200.0);
        let a = [
            Complex64::new(1e-3, 0.0),
            Complex64::new(0.0, 2e-3),
            Complex64::new(-1e-3, 1e-3),
        ];
        let coupling = a.iter().map(|z| UncertainComplex::constant(*z)).collect::<Vec<_>>();
        let s = [1.1, 0.9, 1.05, 0.95];
        let shares = s.iter().copied().map(Scalar::from).collect::<Vec<_>>();

        let correction = CouplingCorrection::magnetic(&ctx, &coupling, &shares, &ratio, &model())?;

        let n = 2.0;
        let parallel = (a[0] * (s[1] - 1.0) + a[1] * (s[2] - 1.0) + a[2] * (s[3] - 1.0)) * n;
        approx::assert_relative_eq!(correction.parallel.value().re, parallel.re, max_relative = 1e-12);
        approx::assert_relative_eq!(correction.parallel.value().im, parallel.im, max_relative = 1e-12);
        // The model factor carries a relative uncertainty of one half
        approx::assert_relative_eq!(
            correction.parallel.u()[0],
            0.5 * parallel.re.abs(),
            max_relative = 1e-12
        );

        // Each half already carries two units of current, so rebalancing changes nothing
        let series_parallel = correction.series_parallel.map(|e| e.value());
        let expected = (a[0] * (s[1] - 1.0) + a[1] * (s[2] - 1.0) + a[2] * (s[3] - 1.0)) * n;
        let series_parallel = series_parallel.unwrap_or_default();
        approx::assert_relative_eq!(series_parallel.re, expected.re, max_relative = 1e-12);
        Ok(())
    }

    #[test]
    fn series_parallel_corrections_depend_on_the_section_count() -> Result<()> {
        let ctx = CorrelationContext::new();
        let ypg = ComplexScalar::from(screen_admittance(53.0, 730.8e-12));
        let z = ComplexScalar::from(Complex64::new(0.0935, 0.00875));
        let r2 = Scalar::from(0.2);
        let z2 = ComplexScalar::from(Complex64::new(0.2699, 0.0021));

        let five = SectionRatio::new(5, 1.0, 100.0);
        let two = SectionRatio::new(2, 3.0, 120.0);
        let six = SectionRatio::new(6, 5.0, 120.0);

        assert!(series_parallel_capacitive_correction(&ctx, &ypg, &z, &r2, &z2, &five, &model())?.is_none());
        assert!(series_parallel_capacitive_correction(&ctx, &ypg, &z, &r2, &z2, &two, &model())?.is_none());
        assert!(matches!(
            series_parallel_capacitive_correction(&ctx, &ypg, &z, &r2, &z2, &six, &model()),
            Err(Error::NotSupported(_))
        ));

        let coupling = vec![UncertainComplex::constant(Complex64::new(1e-3, 0.0)); 5];
        let shares = vec![Scalar::from(1.0); 6];
        assert!(matches!(
            series_parallel_magnetic_correction(&ctx, &coupling, &shares, &six, &model()),
            Err(Error::NotSupported(_))
        ));
        Ok(())
    }

    #[test]
    fn capacitive_correction_follows_the_distributed_model() -> Result<()> {
        let ctx = CorrelationContext::new();
        let ratio = SectionRatio::new(4, 25.0, 100.0);
        let admittance = screen_admittance(53.0, 730.8e-12);
        let z = Complex64::new(0.374, 0.035) / 4.0;
        let z2 = Complex64::new(0.2699, 0.0021);
        let model = TypeB::new(0.2, 5.0);

        let correction = CouplingCorrection::capacitive(
            &ctx,
            &admittance.into(),
            &z.into(),
            &Scalar::from(0.2),
            &z2.into(),
            &ratio,
            &model,
        )?;

        let impedance = (z2 + 0.2) * (25.0f64 / 100.0).powi(2) + z;
        let parallel = admittance / 3.0 * 15.0 * impedance;
        let series_parallel = admittance / 3.0 * 12.0 * impedance;

        approx::assert_relative_eq!(correction.parallel.value().re, parallel.re, max_relative = 1e-12);
        approx::assert_relative_eq!(correction.parallel.value().im, parallel.im, max_relative = 1e-12);
        approx::assert_relative_eq!(
            correction.parallel.u()[1],
            0.2 * parallel.im.abs(),
            max_relative = 1e-12
        );
        let sp = correction.series_parallel_or_zero().value();
        approx::assert_relative_eq!(sp.im, series_parallel.im, max_relative = 1e-12);
        Ok(())
    }

    #[test]
    fn estimated_corrections_become_zero_valued_uncertainties() -> Result<()> {
        let ctx = CorrelationContext::new();
        let estimate = UncertainComplex::constant(Complex64::new(-2e-8, 3e-8));

        let uncertainty = as_uncertainty(&ctx, &estimate, "cap2a")?;

        assert_eq!(uncertainty.value(), Complex64::new(0.0, 0.0));
        approx::assert_relative_eq!(uncertainty.u()[0], 2e-8, max_relative = 1e-12);
        approx::assert_relative_eq!(uncertainty.u()[1], 3e-8, max_relative = 1e-12);
        Ok(())
    }

    #[test]
    fn coupling_blocks_are_parsed_by_column() -> Result<()> {
        let ctx = CorrelationContext::new();
        let shares = MeasurementBlock::from_numbers(&[
            vec![1.0, 0.0, 0.30, 0.0],
            vec![1.0, 0.0, 0.61, 0.0],
        ]);
        let mut row = vec![Cell::Text("2 vs 1".to_owned())];
        row.extend([0.5, 2e-6, -1e-6, 1e-6, 1e-8, 1e-8, 20.0, 0.1, 10.0].map(Cell::Number));
        let coupling = MeasurementBlock::new(vec![row]);

        let measurement = CouplingMeasurement::from_blocks(&ctx, &shares, &coupling, 100.0)?;

        assert_eq!(measurement.vdrops, vec![0.30, 0.61]);
        assert_eq!(measurement.readings.len(), 1);
        assert_eq!(measurement.readings[0].monitor_ratio, 20.0);
        approx::assert_relative_eq!(measurement.readings[0].y.u(), 1e-8, max_relative = 1e-12);

        let ratio = SectionRatio::new(2, 3.0, 120.0);
        let correction = measurement.correction(
            &ctx,
            &ratio,
            &Scalar::from(0.2),
            &Scalar::from(0.268),
            1.0,
            false,
            &model(),
        )?;
        assert!(correction.series_parallel.is_none());

        let narrow = MeasurementBlock::from_numbers(&[vec![1.0, 2.0, 3.0]]);
        assert!(CouplingMeasurement::from_blocks(&ctx, &narrow, &coupling, 100.0).is_err());
        Ok(())
    }
}
