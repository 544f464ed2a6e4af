use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::calibration::{CalibrationRecord, RawCalibrationRecord};
use crate::correction::SectionRatio;
use crate::error::{Error, Result};

/// The secondary every transformer must have, used for nominal ratios
pub const MAIN_SECONDARY: &str = "main";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformerKind {
    Voltage,
    Current,
}

impl TransformerKind {
    /// Nominal ratio for the given primary and secondary turns
    ///
    /// Current transformers are quoted as secondary over primary turns, voltage transformers as
    /// primary over secondary.
    pub fn nominal_ratio(self, primary: u32, secondary: u32) -> f64 {
        match self {
            Self::Current => f64::from(secondary) / f64::from(primary),
            Self::Voltage => f64::from(primary) / f64::from(secondary),
        }
    }
}

impl FromStr for TransformerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "voltage" => Ok(Self::Voltage),
            "current" => Ok(Self::Current),
            other => Err(Error::InvalidTransformerKind(other.to_owned())),
        }
    }
}

/// Turns of sections connected in series
pub fn series(sections: &[u32]) -> u32 {
    sections.iter().sum()
}

/// Turns of sections connected in parallel
///
/// # Errors
/// Returns [`Error::InconsistentWindingTurns`] unless every section has the same turns, and
/// [`Error::InvalidTopology`] for an empty group.
pub fn parallel(sections: &[u32]) -> Result<u32> {
    let (first, rest) = sections
        .split_first()
        .ok_or_else(|| Error::InvalidTopology("winding group has no sections".to_owned()))?;
    if rest.iter().any(|turns| turns != first) {
        return Err(Error::InconsistentWindingTurns {
            group: String::new(),
            turns: sections.to_vec(),
        });
    }
    Ok(*first)
}

/// Turns of two series halves connected in parallel
///
/// Only defined for an even number of sections greater than two, otherwise `None`.
///
/// # Errors
/// Fails as for [`parallel`] when the sections differ.
pub fn series_parallel(sections: &[u32]) -> Result<Option<u32>> {
    parallel(sections)?;
    if sections.len() % 2 == 0 && sections.len() > 2 {
        Ok(Some(series(sections) / 2))
    } else {
        Ok(None)
    }
}

/// How the sections of a winding group are connected
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Connection {
    Series,
    Parallel,
    SeriesParallel,
}

impl Connection {
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Series => "s",
            Self::Parallel => "p",
            Self::SeriesParallel => "sp",
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A named set of primary sections
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindingGroup {
    name: String,
    sections: Vec<u32>,
}

impl WindingGroup {
    /// # Errors
    /// Fails if the group is empty, has a section with no turns, or has sections of differing
    /// turns.
    pub fn new(name: impl Into<String>, sections: Vec<u32>) -> Result<Self> {
        let name = name.into();
        if sections.contains(&0) {
            return Err(Error::InvalidTopology(format!(
                "winding group `{name}` has a section with no turns"
            )));
        }
        parallel(&sections).map_err(|e| match e {
            Error::InconsistentWindingTurns { turns, .. } => Error::InconsistentWindingTurns {
                group: name.clone(),
                turns,
            },
            Error::InvalidTopology(_) => {
                Error::InvalidTopology(format!("winding group `{name}` has no sections"))
            }
            other => other,
        })?;
        Ok(Self { name, sections })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sections(&self) -> &[u32] {
        &self.sections
    }

    /// Primary turns for a connection, `None` where the connection is not available
    pub fn turns(&self, connection: Connection) -> Option<u32> {
        match connection {
            Connection::Series => Some(series(&self.sections)),
            Connection::Parallel => parallel(&self.sections).ok(),
            Connection::SeriesParallel => series_parallel(&self.sections).ok().flatten(),
        }
    }

    pub fn connections(&self) -> impl Iterator<Item = Connection> + '_ {
        [
            Connection::Series,
            Connection::Parallel,
            Connection::SeriesParallel,
        ]
        .into_iter()
        .filter(|connection| self.turns(*connection).is_some())
    }
}

/// One problem found while checking a calibration record
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    MissingRatio(String),
    MissingKey(String),
    WrongBurdenCount {
        ratio: String,
        expected: usize,
        found: usize,
    },
    WrongLevelCount {
        ratio: String,
        burden: usize,
        expected: usize,
        found: usize,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRatio(ratio) => write!(f, "ratio `{ratio}` has no errors"),
            Self::MissingKey(key) => write!(f, "key `{key}` is missing"),
            Self::WrongBurdenCount {
                ratio,
                expected,
                found,
            } => write!(
                f,
                "ratio `{ratio}` has {found} error sets for {expected} burdens"
            ),
            Self::WrongLevelCount {
                ratio,
                burden,
                expected,
                found,
            } => write!(
                f,
                "ratio `{ratio}` burden {burden} has {found} errors for {expected} excitation levels"
            ),
        }
    }
}

/// Every violation found in a calibration record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    /// # Errors
    /// Returns [`Error::MissingCalibrationField`] holding the violations, if there are any.
    pub fn into_result(self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(Error::MissingCalibrationField(self.violations))
        }
    }
}

/// A multi-ratio transformer described by its windings
#[derive(Clone, Debug)]
pub struct Transformer {
    label: String,
    groups: BTreeMap<String, WindingGroup>,
    secondaries: BTreeMap<String, u32>,
    cores: BTreeMap<String, String>,
    kind: TransformerKind,
    calibration: Option<CalibrationRecord>,
}

impl Transformer {
    /// # Errors
    /// Fails if any winding group is invalid, if there is no `main` secondary, or if a secondary
    /// has no turns.
    pub fn new(
        label: impl Into<String>,
        groups: BTreeMap<String, Vec<u32>>,
        secondaries: BTreeMap<String, u32>,
        cores: BTreeMap<String, String>,
        kind: TransformerKind,
    ) -> Result<Self> {
        let label = label.into();
        let groups = groups
            .into_iter()
            .map(|(name, sections)| Ok((name.clone(), WindingGroup::new(name, sections)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        match secondaries.get(MAIN_SECONDARY) {
            None => {
                return Err(Error::InvalidTopology(format!(
                    "transformer `{label}` has no `{MAIN_SECONDARY}` secondary"
                )))
            }
            Some(0) => {
                return Err(Error::InvalidTopology(format!(
                    "transformer `{label}` has a main secondary with no turns"
                )))
            }
            Some(_) => {}
        }

        tracing::debug!(%label, groups = groups.len(), "constructed transformer");
        Ok(Self {
            label,
            groups,
            secondaries,
            cores,
            kind,
            calibration: None,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub const fn kind(&self) -> TransformerKind {
        self.kind
    }

    pub fn group(&self, name: &str) -> Option<&WindingGroup> {
        self.groups.get(name)
    }

    pub fn secondary(&self, name: &str) -> Option<u32> {
        self.secondaries.get(name).copied()
    }

    pub fn cores(&self) -> &BTreeMap<String, String> {
        &self.cores
    }

    fn main_turns(&self) -> u32 {
        self.secondaries
            .get(MAIN_SECONDARY)
            .copied()
            .unwrap_or_default()
    }

    /// Every legal ratio name, `{group}_{s|p|sp}`, with its nominal ratio
    pub fn ratio_catalog(&self) -> BTreeMap<String, f64> {
        let secondary = self.main_turns();
        self.groups
            .values()
            .flat_map(|group| {
                group.connections().filter_map(move |connection| {
                    group.turns(connection).map(|primary| {
                        (
                            format!("{}_{}", group.name(), connection.suffix()),
                            self.kind.nominal_ratio(primary, secondary),
                        )
                    })
                })
            })
            .collect()
    }

    /// The section layout of a group against the main secondary
    ///
    /// # Errors
    /// Returns [`Error::InvalidTopology`] if there is no such group.
    pub fn section_ratio(&self, group: &str) -> Result<SectionRatio> {
        let group = self.group(group).ok_or_else(|| {
            Error::InvalidTopology(format!(
                "transformer `{}` has no winding group `{group}`",
                self.label
            ))
        })?;
        let turns = group.sections().first().copied().unwrap_or_default();
        Ok(SectionRatio::new(
            group.sections().len(),
            f64::from(turns),
            f64::from(self.main_turns()),
        ))
    }

    /// Check a calibration record against the ratio catalog
    ///
    /// All problems are collected rather than stopping at the first.
    pub fn validate_calibration_record(&self, record: &RawCalibrationRecord) -> ValidationReport {
        let catalog = self.ratio_catalog();
        let mut violations = catalog
            .keys()
            .filter(|ratio| !record.errors.contains_key(*ratio))
            .map(|ratio| Violation::MissingRatio(ratio.clone()))
            .collect::<Vec<_>>();

        let keys = [
            ("reference", record.reference.is_some()),
            ("excitation levels", record.excitation_levels.is_some()),
            ("secondary current", record.secondary_current.is_some()),
            ("burdens", record.burdens.is_some()),
        ];
        violations.extend(
            keys.iter()
                .filter(|(_, present)| !present)
                .map(|(key, _)| Violation::MissingKey((*key).to_owned())),
        );

        if let (Some(levels), Some(burdens)) = (&record.excitation_levels, &record.burdens) {
            for ratio in catalog.keys() {
                let Some(sets) = record.errors.get(ratio) else {
                    continue;
                };
                if sets.len() != burdens.len() {
                    violations.push(Violation::WrongBurdenCount {
                        ratio: ratio.clone(),
                        expected: burdens.len(),
                        found: sets.len(),
                    });
                }
                violations.extend(sets.iter().enumerate().filter_map(|(burden, set)| {
                    (set.len() != levels.len()).then(|| Violation::WrongLevelCount {
                        ratio: ratio.clone(),
                        burden,
                        expected: levels.len(),
                        found: set.len(),
                    })
                }));
            }
        }

        for violation in &violations {
            tracing::warn!(transformer = %self.label, %violation, "calibration record violation");
        }
        ValidationReport { violations }
    }

    pub fn set_calibration(&mut self, record: CalibrationRecord) {
        tracing::info!(transformer = %self.label, reference = %record.reference, "calibration attached");
        self.calibration = Some(record);
    }

    pub const fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    pub const fn calibration(&self) -> Option<&CalibrationRecord> {
        self.calibration.as_ref()
    }
}
