use crate::block::{Cell, MeasurementBlock};
use crate::calibration::Instrument;
use crate::complex::UncertainComplex;
use crate::error::{Error, Result};
use crate::excitation::Excitation;
use crate::uncertain::{CorrelationContext, UncertainReal};

/// Column layout of a comparison block
///
/// Both layouts start with the shunt, X and Y voltages followed by their standard deviations.
/// Older sheets then have a blank column, the shunt and the common resistance; newer ones record
/// the lock-in gain and reserve settings before the shunt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelLayout {
    Plain,
    WithGainAndReserve,
}

impl ChannelLayout {
    pub const fn columns(self) -> usize {
        match self {
            Self::Plain => 9,
            Self::WithGainAndReserve => 10,
        }
    }

    const fn shunt_column(self) -> usize {
        self.columns() - 2
    }

    const fn common_column(self) -> usize {
        self.columns() - 1
    }
}

/// The raw channels of one comparison reading
#[derive(Clone, Debug)]
pub struct Reading {
    pub shunt_v: UncertainReal,
    pub x: UncertainReal,
    pub y: UncertainReal,
    /// Secondary shunt, in ohm
    pub shunt: f64,
    /// Common resistor carrying the difference current, in ohm
    pub common_r: f64,
}

/// A ratio error extracted from one reading
#[derive(Clone, Debug)]
pub struct MeasuredError {
    pub error: UncertainComplex,
    pub excitation: Excitation,
}

impl MeasuredError {
    pub const fn nominal(&self) -> f64 {
        self.excitation.nominal
    }
}

/// The sign that makes a measured difference an error of the reference transformer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub const fn value(self) -> f64 {
        match self {
            Self::Positive => 1.0,
            Self::Negative => -1.0,
        }
    }

    /// The polarity for a step whose check was made on the other transformer
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Positive => Self::Negative,
            Self::Negative => Self::Positive,
        }
    }

    pub fn apply(self, error: &UncertainComplex) -> UncertainComplex {
        error * self.value()
    }
}

/// Nominal level assumed for the three sign check readings
const SIGN_CHECK_LEVEL: f64 = 10.0;

/// Converts comparison blocks into uncertain ratio errors
///
/// Every reading channel becomes an elementary uncertain number, and each voltage channel picks up
/// fresh type-B terms for the lock-in gain and common-mode offset. Those terms are not shared
/// between readings since the instrument ranges generally differ.
#[derive(Clone, Debug)]
pub struct Extractor {
    ctx: CorrelationContext,
    instrument: Instrument,
    layout: ChannelLayout,
}

impl Extractor {
    pub const fn new(ctx: CorrelationContext, instrument: Instrument, layout: ChannelLayout) -> Self {
        Self {
            ctx,
            instrument,
            layout,
        }
    }

    pub const fn layout(&self) -> ChannelLayout {
        self.layout
    }

    fn channel(&self, volts: &UncertainReal, name: &str) -> Result<UncertainReal> {
        let gain = self
            .instrument
            .gain
            .factor(&self.ctx, format!("lock-in gain {name} {}", volts.x()))?;
        let offset = self
            .instrument
            .common_mode
            .offset(&self.ctx, format!("common mode {name} {}", volts.x()))?;
        Ok(&(volts * &gain) + &offset)
    }

    /// The ratio error for one reading
    ///
    /// $$
    ///     \varepsilon = \frac{(x + j y) / R_c}{V_{sh} / R_{sh}}
    /// $$
    ///
    /// The actual excitation is the primary current as a percentage of `full_scale`, snapped to
    /// the nearest of `levels`.
    ///
    /// # Errors
    /// Fails if `levels` is empty or a type-B term is invalid.
    pub fn ratio_error(&self, reading: &Reading, full_scale: f64, levels: &[f64]) -> Result<MeasuredError> {
        let x = self.channel(&reading.x, "X")?;
        let y = self.channel(&reading.y, "Y")?;

        let difference = UncertainComplex::new(x, y) / reading.common_r;
        let current = &reading.shunt_v / reading.shunt;
        let error = &difference / &current;
        let excitation = Excitation::new(&current / full_scale * 100.0, levels)?;

        tracing::debug!(
            actual = excitation.actual.x(),
            nominal = excitation.nominal,
            error = %error.value(),
            "extracted ratio error"
        );
        Ok(MeasuredError { error, excitation })
    }

    /// Parse the readings of a comparison block
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] for rows that do not match the layout, and cell errors
    /// for missing or non-numeric values.
    pub fn readings(&self, block: &MeasurementBlock, full_scale: f64) -> Result<Vec<Reading>> {
        let df = self.instrument.reading_df;
        block
            .rows()
            .iter()
            .enumerate()
            .map(|(ii, row)| {
                if row.len() != self.layout.columns() {
                    return Err(Error::dimension(
                        format!("comparison row {ii}"),
                        self.layout.columns(),
                        row.len(),
                    ));
                }
                let value = |column| block.number(ii, column);
                let shunt = value(self.layout.shunt_column())?;
                let percent = value(0)? / shunt / full_scale * 100.0;
                Ok(Reading {
                    shunt_v: self.ctx.ureal(value(0)?, value(3)?, df, format!("shuntv {percent}"))?,
                    x: self.ctx.ureal(value(1)?, value(4)?, df, format!("X V {percent}"))?,
                    y: self.ctx.ureal(value(2)?, value(5)?, df, format!("Y V {percent}"))?,
                    shunt,
                    common_r: value(self.layout.common_column())?,
                })
            })
            .collect()
    }

    /// Ratio errors for every row of a comparison block, in row order
    ///
    /// # Errors
    /// Fails as for [`Extractor::readings`] and [`Extractor::ratio_error`].
    pub fn compare(
        &self,
        block: &MeasurementBlock,
        full_scale: f64,
        levels: &[f64],
    ) -> Result<Vec<MeasuredError>> {
        self.readings(block, full_scale)?
            .iter()
            .map(|reading| self.ratio_error(reading, full_scale, levels))
            .collect()
    }

    /// Determine the polarity of a comparison from three readings at one excitation
    ///
    /// The readings are unperturbed, with the reference secondary shunted by a resistor, and shunted
    /// by a capacitor. The resistor should lower the real part of the error and the capacitor the
    /// imaginary part; if either rises the lock-in is reverse connected.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] unless there are exactly three rows, and
    /// [`Error::InconsistentPolarity`] when the real and imaginary trends disagree.
    pub fn sign_check(&self, block: &MeasurementBlock, full_scale: f64) -> Result<Polarity> {
        if block.len() != 3 {
            return Err(Error::dimension("sign check rows", 3, block.len()));
        }
        let errors = self.compare(block, full_scale, &[SIGN_CHECK_LEVEL; 3])?;
        let values = errors.iter().map(|e| e.error.value()).collect::<Vec<_>>();

        let real = if values[1].re - values[0].re > 0.0 { -1.0 } else { 1.0 };
        let imag = if values[2].im - values[0].im > 0.0 { -1.0 } else { 1.0 };
        if real != imag {
            return Err(Error::InconsistentPolarity { real, imag });
        }

        let polarity = if real > 0.0 {
            Polarity::Positive
        } else {
            Polarity::Negative
        };
        tracing::info!(?polarity, "determined comparison polarity");
        Ok(polarity)
    }
}

/// A row for a comparison block, convenient for building blocks in code
pub fn comparison_row(layout: ChannelLayout, values: [f64; 6], shunt: f64, common_r: f64) -> Vec<Cell> {
    let mut row = values.map(Cell::Number).to_vec();
    match layout {
        ChannelLayout::Plain => row.push(Cell::Empty),
        ChannelLayout::WithGainAndReserve => row.extend([Cell::Number(1.0), Cell::Number(0.0)]),
    }
    row.extend([Cell::Number(shunt), Cell::Number(common_r)]);
    row
}

#[cfg(test)]
mod test {
    use num_complex::Complex64;

    use super::{comparison_row, ChannelLayout, Extractor, Polarity};
    use crate::block::{Cell, MeasurementBlock};
    use crate::calibration::Instrument;
    use crate::error::Error;
    use crate::uncertain::CorrelationContext;
    use crate::Result;

    const LEVELS: [f64; 7] = [5., 10., 20., 40., 60., 100., 120.];

    fn extractor(layout: ChannelLayout) -> Extractor {
        Extractor::new(CorrelationContext::new(), Instrument::default(), layout)
    }

    /// Row producing the error `e` at `percent` of a 5 A full scale, with a 0.1 ohm shunt and a
    /// 10 ohm common resistor
    fn row_for(layout: ChannelLayout, e: Complex64, percent: f64) -> Vec<Cell> {
        let current = 5.0 * percent / 100.0;
        let v = e * current * 10.0;
        comparison_row(layout, [current * 0.1, v.re, v.im, 1e-7, 1e-9, 1e-9], 0.1, 10.0)
    }

    #[test]
    fn ratio_errors_are_recovered_from_readings() -> Result<()> {
        let extractor = extractor(ChannelLayout::WithGainAndReserve);
        let e = Complex64::new(3e-6, -2e-6);
        let block = MeasurementBlock::new(vec![
            row_for(ChannelLayout::WithGainAndReserve, e, 38.7),
            row_for(ChannelLayout::WithGainAndReserve, e, 101.0),
        ]);

        let measured = extractor.compare(&block, 5.0, &LEVELS)?;

        assert_eq!(measured.len(), 2);
        approx::assert_relative_eq!(measured[0].error.value().re, e.re, max_relative = 1e-9);
        approx::assert_relative_eq!(measured[0].error.value().im, e.im, max_relative = 1e-9);
        approx::assert_relative_eq!(measured[0].excitation.actual.x(), 38.7, max_relative = 1e-9);
        assert_eq!(measured[0].nominal(), 40.0);
        assert_eq!(measured[1].nominal(), 100.0);
        Ok(())
    }

    #[test]
    fn instrument_terms_are_included() -> Result<()> {
        let instrument = Instrument::default();
        let extractor = Extractor::new(CorrelationContext::new(), instrument, ChannelLayout::Plain);
        // Exact readings, so only the gain and common-mode terms remain
        let row = comparison_row(ChannelLayout::Plain, [0.5, 2e-4, 0.0, 0.0, 0.0, 0.0], 0.1, 10.0);
        let block = MeasurementBlock::new(vec![row]);

        let measured = extractor.compare(&block, 5.0, &LEVELS)?;

        let volts = (2e-4 * instrument.gain.u).hypot(instrument.common_mode.u);
        let expected = volts / 10.0 / 5.0;
        approx::assert_relative_eq!(measured[0].error.u()[0], expected, max_relative = 1e-9);
        approx::assert_relative_eq!(
            measured[0].error.u()[1],
            instrument.common_mode.u / 50.0,
            max_relative = 1e-9
        );
        Ok(())
    }

    #[test]
    fn rows_must_match_the_layout() {
        let extractor = extractor(ChannelLayout::WithGainAndReserve);
        let block = MeasurementBlock::new(vec![row_for(
            ChannelLayout::Plain,
            Complex64::new(1e-6, 1e-6),
            100.0,
        )]);

        assert!(matches!(
            extractor.compare(&block, 5.0, &LEVELS),
            Err(Error::DimensionMismatch { expected: 10, found: 9, .. })
        ));
    }

    fn sign_block(layout: ChannelLayout, real_shift: f64, imag_shift: f64) -> MeasurementBlock {
        let base = Complex64::new(1e-6, 1e-6);
        MeasurementBlock::new(vec![
            row_for(layout, base, 10.0),
            row_for(layout, base + Complex64::new(real_shift, 0.0), 10.0),
            row_for(layout, base + Complex64::new(0.0, imag_shift), 10.0),
        ])
    }

    #[test]
    fn agreeing_trends_give_a_polarity() -> Result<()> {
        let extractor = extractor(ChannelLayout::Plain);

        let falling = sign_block(ChannelLayout::Plain, -5e-6, -5e-6);
        let rising = sign_block(ChannelLayout::Plain, 5e-6, 5e-6);

        assert_eq!(extractor.sign_check(&falling, 5.0)?, Polarity::Positive);
        assert_eq!(extractor.sign_check(&rising, 5.0)?, Polarity::Negative);
        assert_eq!(Polarity::Negative.reversed().value(), 1.0);
        Ok(())
    }

    #[test]
    fn disagreeing_trends_are_rejected() {
        let extractor = extractor(ChannelLayout::Plain);
        let block = sign_block(ChannelLayout::Plain, 5e-6, -5e-6);

        assert!(matches!(
            extractor.sign_check(&block, 5.0),
            Err(Error::InconsistentPolarity { real, imag }) if real == -1.0 && imag == 1.0
        ));
    }

    #[test]
    fn sign_check_needs_three_rows() {
        let extractor = extractor(ChannelLayout::Plain);
        let block = MeasurementBlock::new(vec![row_for(
            ChannelLayout::Plain,
            Complex64::new(1e-6, 1e-6),
            10.0,
        )]);
        assert!(extractor.sign_check(&block, 5.0).is_err());
    }
}
