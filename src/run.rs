use num_complex::Complex64;

use crate::block::MeasurementBlock;
use crate::buildup::{self, ThirdTransformer, TwoStage, TwoStageCorrections, TwoStageMeasurements};
use crate::calibration::Config;
use crate::complex::UncertainComplex;
use crate::correction::{as_uncertainty, screen_admittance, CouplingCorrection, CouplingMeasurement, SectionRatio};
use crate::error::Result;
use crate::excitation::align;
use crate::extraction::{ChannelLayout, Extractor, MeasuredError, Polarity};
use crate::scalar::{ComplexScalar, Scalar};
use crate::uncertain::CorrelationContext;

/// Sign-corrected comparisons from one step of a buildup
#[derive(Clone, Debug)]
pub struct StepResult {
    pub polarity: Polarity,
    /// One list per data block, each aligned to the nominal levels of the run
    pub blocks: Vec<Vec<MeasuredError>>,
}

impl StepResult {
    /// The errors of one data block, in level order
    pub fn errors(&self, block: usize) -> Option<Vec<UncertainComplex>> {
        self.blocks
            .get(block)
            .map(|measured| measured.iter().map(|m| m.error.clone()).collect())
    }
}

/// One calibration run: a single correlation context, its constants and the common nominal levels
///
/// Every uncertain number the run creates is registered in the same context, so results from
/// different steps remain exactly correlated.
#[derive(Clone, Debug)]
pub struct CalibrationRun {
    ctx: CorrelationContext,
    config: Config,
    levels: Vec<f64>,
    full_scale: f64,
    extractor: Extractor,
}

impl CalibrationRun {
    /// `full_scale` is the secondary current at 100 % excitation
    pub fn new(config: Config, levels: Vec<f64>, full_scale: f64, layout: ChannelLayout) -> Self {
        let ctx = CorrelationContext::new();
        let extractor = Extractor::new(ctx.clone(), config.instrument, layout);
        Self {
            ctx,
            config,
            levels,
            full_scale,
            extractor,
        }
    }

    /// The same run, for a transformer with a different full-scale current
    #[must_use]
    pub fn rescaled(&self, full_scale: f64) -> Self {
        Self {
            full_scale,
            ..self.clone()
        }
    }

    pub const fn ctx(&self) -> &CorrelationContext {
        &self.ctx
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub const fn full_scale(&self) -> f64 {
        self.full_scale
    }

    /// Check the polarity of a step and extract its data blocks
    ///
    /// `checked_on_other` is set when the sign check was made with the other transformer in the
    /// reference position, which reverses the polarity.
    ///
    /// # Errors
    /// Fails if the sign check is inconclusive, or if a block does not hold exactly one reading per
    /// nominal level.
    pub fn step(
        &self,
        sign_block: &MeasurementBlock,
        blocks: &[MeasurementBlock],
        checked_on_other: bool,
    ) -> Result<StepResult> {
        let mut polarity = self.extractor.sign_check(sign_block, self.full_scale)?;
        if checked_on_other {
            polarity = polarity.reversed();
        }

        let blocks = blocks
            .iter()
            .map(|block| -> Result<Vec<MeasuredError>> {
                let measured = self
                    .extractor
                    .compare(block, self.full_scale, &self.levels)?
                    .into_iter()
                    .map(|m| MeasuredError {
                        error: polarity.apply(&m.error),
                        excitation: m.excitation,
                    })
                    .collect::<Vec<_>>();
                align(measured, &self.levels, MeasuredError::nominal)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StepResult { polarity, blocks })
    }

    /// Magnetic coupling corrections of a winding group from its volt-drop and coupling blocks
    ///
    /// `rs` is the secondary burden and `rls` the secondary leakage resistance.
    ///
    /// # Errors
    /// Fails if the blocks are malformed or do not match the section count of `ratio`.
    #[allow(clippy::too_many_arguments)]
    pub fn magnetic(
        &self,
        shares: &MeasurementBlock,
        coupling: &MeasurementBlock,
        ratio: &SectionRatio,
        rs: f64,
        rls: f64,
        target_i2: f64,
        measured_individually: bool,
    ) -> Result<CouplingCorrection> {
        let measurement =
            CouplingMeasurement::from_blocks(&self.ctx, shares, coupling, self.config.instrument.reading_df)?;
        let correction = measurement.correction(
            &self.ctx,
            ratio,
            &Scalar::from(rs),
            &Scalar::from(rls),
            target_i2,
            measured_individually,
            &self.config.model.magnetic,
        )?;
        tracing::debug!(
            parallel = %correction.parallel.value(),
            series_parallel = ?correction.series_parallel.as_ref().map(UncertainComplex::value),
            "magnetic correction"
        );
        Ok(correction)
    }

    /// Capacitive coupling corrections for a primary with `capacitance` to the screen
    ///
    /// # Errors
    /// Fails if the group has an unsupported series/parallel connection.
    pub fn capacitive(
        &self,
        frequency: f64,
        capacitance: f64,
        z: &ComplexScalar,
        r2: &Scalar,
        z2: &ComplexScalar,
        ratio: &SectionRatio,
    ) -> Result<CouplingCorrection> {
        let ypg = ComplexScalar::from(screen_admittance(frequency, capacitance));
        let correction =
            CouplingCorrection::capacitive(&self.ctx, &ypg, z, r2, z2, ratio, &self.config.model.capacitive)?;
        tracing::debug!(parallel = %correction.parallel.value(), "capacitive correction");
        Ok(correction)
    }

    /// # Errors
    /// Fails as for [`buildup::two_stage`].
    pub fn two_stage(&self, measured: TwoStageMeasurements, corrections: &TwoStageCorrections) -> Result<TwoStage> {
        buildup::two_stage(&self.ctx, &self.levels, &self.config, measured, corrections)
    }

    /// Calibrate the third transformer from `P2ap`
    ///
    /// The capacitive correction of primary 2 is only estimated, so it enters as a zero-valued
    /// uncertainty of the same size.
    ///
    /// # Errors
    /// Fails as for [`buildup::third_transformer`].
    pub fn third_transformer(
        &self,
        p2ap: &buildup::Ladder,
        measured: &[UncertainComplex],
        magnetic_2a: &UncertainComplex,
        capacitive_2a_estimate: &UncertainComplex,
    ) -> Result<ThirdTransformer> {
        let capacitive_2a = as_uncertainty(&self.ctx, capacitive_2a_estimate, "cap2a")?;
        buildup::third_transformer(p2ap, measured, magnetic_2a, &capacitive_2a)
    }

    /// An exact zero, for corrections that do not apply to a connection
    pub fn no_correction() -> UncertainComplex {
        UncertainComplex::constant(Complex64::new(0.0, 0.0))
    }
}
