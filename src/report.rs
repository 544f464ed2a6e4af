use std::fs::File;
use std::io::Write;
use std::path::Path;

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::block::Cell;
use crate::buildup::Ladder;
use crate::complex::UncertainComplex;
use crate::error::{Error, Result};
use crate::uncertain::UncertainReal;

/// Above this many degrees of freedom the normal quantile is used
const LARGE_DF: f64 = 1e7;

/// Coverage factor for a two-sided 95 % interval with `df` degrees of freedom
///
/// # Errors
/// Returns [`Error::Statistics`] if `df` is not positive.
pub fn k_factor(df: f64) -> Result<f64> {
    let p = 0.975;
    if df.is_infinite() || df > LARGE_DF {
        let normal = Normal::new(0.0, 1.0).map_err(|e| Error::Statistics(e.to_string()))?;
        return Ok(normal.inverse_cdf(p));
    }
    let t = StudentsT::new(0.0, 1.0, df).map_err(|e| Error::Statistics(e.to_string()))?;
    Ok(t.inverse_cdf(p))
}

/// Value, standard uncertainty, degrees of freedom and coverage factor of a real quantity
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quadruple {
    pub value: f64,
    pub u: f64,
    pub df: f64,
    pub k: f64,
}

impl Quadruple {
    /// # Errors
    /// Fails as for [`k_factor`].
    pub fn new(x: &UncertainReal) -> Result<Self> {
        let df = x.df();
        Ok(Self {
            value: x.x(),
            u: x.u(),
            df,
            k: k_factor(df)?,
        })
    }

    /// Half-width of the 95 % coverage interval
    pub fn expanded(&self) -> f64 {
        self.k * self.u
    }
}

/// Rows of result cells, written out as CSV
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultTable {
    pub rows: Vec<Vec<Cell>>,
}

const COMPLEX_HEADER: [&str; 7] = [
    "Excitation",
    "Real",
    "Imag",
    "U real",
    "U imag",
    "k real",
    "k imag",
];

impl ResultTable {
    pub const fn new() -> Self {
        Self { rows: vec![] }
    }

    pub fn push<I, C>(&mut self, row: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    pub fn append(&mut self, mut other: Self) {
        self.rows.append(&mut other.rows);
    }

    /// One row per level: the value and the expanded uncertainty and coverage factor of each part
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the lengths differ, or fails as for [`k_factor`].
    pub fn complex_table(levels: &[f64], errors: &[UncertainComplex]) -> Result<Self> {
        if levels.len() != errors.len() {
            return Err(Error::dimension("errors to tabulate", levels.len(), errors.len()));
        }

        let mut table = Self::new();
        table.push(COMPLEX_HEADER);
        for (level, error) in levels.iter().zip(errors) {
            let re = Quadruple::new(error.real())?;
            let im = Quadruple::new(error.imag())?;
            table.push([*level, re.value, im.value, re.expanded(), im.expanded(), re.k, im.k]);
        }
        Ok(table)
    }

    /// A titled block for each ladder, separated by blank rows
    ///
    /// # Errors
    /// Fails as for [`ResultTable::complex_table`].
    pub fn ladders<'a, I>(ladders: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Ladder>,
    {
        let mut table = Self::new();
        for ladder in ladders {
            table.push([ladder.config().label().as_str()]);
            table.append(Self::complex_table(ladder.levels(), ladder.errors())?);
            table.push([Cell::Empty]);
        }
        Ok(table)
    }

    /// The uncertainty budget of `value`, dropping contributions below `trim` times the largest
    pub fn budget_table(label: &str, value: &UncertainReal, trim: f64) -> Self {
        let mut table = Self::new();
        table.push(["Name", label]);
        table.push(["Value".to_owned(), value.to_string()].map(Cell::Text));
        table.push(["Name", "Uncertainty contribution"]);
        for entry in value.budget(trim) {
            table.push([Cell::Text(entry.label), Cell::Number(entry.contribution)]);
        }
        table.push([Cell::Empty]);
        table
    }

    /// # Errors
    /// Returns an error if a record cannot be written.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(writer);
        for row in &self.rows {
            writer.write_record(row.iter().map(ToString::to_string))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn to_path(&self, path: &Path) -> Result<()> {
        self.write_csv(File::create(path)?)?;
        tracing::info!(?path, rows = self.rows.len(), "wrote result table");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use num_complex::Complex64;

    use super::{k_factor, Quadruple, ResultTable};
    use crate::block::Cell;
    use crate::uncertain::CorrelationContext;
    use crate::Result;

    #[test]
    fn coverage_factors_follow_the_t_distribution() -> Result<()> {
        approx::assert_abs_diff_eq!(k_factor(10.0)?, 2.228_138_85, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(k_factor(f64::INFINITY)?, 1.959_963_98, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(k_factor(1e9)?, 1.959_963_98, epsilon = 1e-6);
        assert!(k_factor(0.0).is_err());
        Ok(())
    }

    #[test]
    fn quadruples_report_the_expanded_uncertainty() -> Result<()> {
        let ctx = CorrelationContext::new();
        let x = ctx.ureal(1.5, 0.1, 10.0, "x")?;

        let quadruple = Quadruple::new(&x)?;

        assert_eq!(quadruple.df, 10.0);
        approx::assert_abs_diff_eq!(quadruple.expanded(), 0.222_813_885, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn complex_tables_have_one_row_per_level() -> Result<()> {
        let ctx = CorrelationContext::new();
        let errors = [100.0, 5.0]
            .iter()
            .map(|level| ctx.ucomplex(Complex64::new(1e-6, -1e-6), [1e-8, 2e-8], 10.0, format!("e {level}")))
            .collect::<Result<Vec<_>>>()?;

        let table = ResultTable::complex_table(&[100.0, 5.0], &errors)?;

        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0][0], Cell::from("Excitation"));
        assert_eq!(table.rows[2][0], Cell::Number(5.0));
        match table.rows[1][4] {
            Cell::Number(u) => approx::assert_abs_diff_eq!(u, 2e-8 * 2.228_138_85, epsilon = 1e-12),
            _ => panic!("expected a number"),
        }
        assert!(ResultTable::complex_table(&[100.0], &errors).is_err());
        Ok(())
    }

    #[test]
    fn budgets_list_contributions_largest_first() -> Result<()> {
        let ctx = CorrelationContext::new();
        let a = ctx.ureal(1.0, 0.1, 10.0, "a")?;
        let b = ctx.ureal(2.0, 0.3, 10.0, "b")?;
        let c = ctx.ureal(0.0, 1e-6, 10.0, "c")?;

        let table = ResultTable::budget_table("sum", &(&(&a + &b) + &c), 0.01);

        assert_eq!(table.rows.len(), 6);
        assert_eq!(table.rows[3], vec![Cell::from("b"), Cell::Number(0.3)]);
        assert_eq!(table.rows[4], vec![Cell::from("a"), Cell::Number(0.1)]);
        assert_eq!(table.rows[5], vec![Cell::Empty]);
        Ok(())
    }

    #[test]
    fn tables_are_written_as_csv() -> Result<()> {
        let mut table = ResultTable::new();
        table.push(["P1as"]);
        table.push([1.0, 2.5]);
        table.push([Cell::Empty]);

        let mut buffer = vec![];
        table.write_csv(&mut buffer)?;

        let text = String::from_utf8_lossy(&buffer);
        assert_eq!(text.lines().collect::<Vec<_>>(), ["P1as", "1,2.5", "\"\""]);
        Ok(())
    }
}
