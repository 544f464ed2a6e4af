use crate::error::{Error, Result};
use crate::uncertain::UncertainReal;

/// The excitation at which a reading was taken, as a percentage of full-scale current
#[derive(Clone, Debug)]
pub struct Excitation {
    /// Measured excitation
    pub actual: UncertainReal,
    /// The nominal level closest to the measured excitation
    pub nominal: f64,
}

impl Excitation {
    /// Snap a measured excitation onto the closest of `levels`
    ///
    /// # Errors
    /// Fails if `levels` is empty.
    pub fn new(actual: UncertainReal, levels: &[f64]) -> Result<Self> {
        let nominal = snap(actual.x(), levels)?;
        Ok(Self { actual, nominal })
    }
}

/// The nominal level with the smallest absolute distance to `actual`
///
/// When two levels are equally close the first listed wins.
///
/// # Errors
/// Fails if `levels` is empty.
pub fn snap(actual: f64, levels: &[f64]) -> Result<f64> {
    levels
        .iter()
        .copied()
        .reduce(|best, level| {
            if (level - actual).abs() < (best - actual).abs() {
                level
            } else {
                best
            }
        })
        .ok_or_else(|| Error::dimension("nominal excitation levels", 1, 0))
}

/// Order `items` so there is exactly one entry per requested level, in the order of `levels`
///
/// `nominal` returns the snapped level of an item.
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] if a level has no matching item or several, or if any item
/// matches none of the levels.
pub fn align<T, F>(items: Vec<T>, levels: &[f64], nominal: F) -> Result<Vec<T>>
where
    F: Fn(&T) -> f64,
{
    if items.len() != levels.len() {
        return Err(Error::dimension(
            "readings per nominal level",
            levels.len(),
            items.len(),
        ));
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut aligned = Vec::with_capacity(levels.len());
    for level in levels {
        let matching = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_ref().map_or(false, |item| nominal(item) == *level))
            .map(|(ii, _)| ii)
            .collect::<Vec<_>>();

        match matching.as_slice() {
            [ii] => {
                if let Some(item) = slots[*ii].take() {
                    aligned.push(item);
                }
            }
            found => {
                return Err(Error::dimension(
                    format!("readings at {level} % excitation"),
                    1,
                    found.len(),
                ))
            }
        }
    }

    Ok(aligned)
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::{align, snap};
    use crate::error::Error;
    use crate::Result;

    const LEVELS: [f64; 7] = [5., 10., 20., 40., 60., 100., 120.];

    #[test]
    fn actual_excitation_snaps_to_nearest_level() -> Result<()> {
        assert_eq!(snap(38.7, &LEVELS)?, 40.0);
        assert_eq!(snap(0.3, &LEVELS)?, 5.0);
        assert_eq!(snap(500.0, &LEVELS)?, 120.0);
        Ok(())
    }

    #[test]
    fn ties_go_to_the_first_listed_level() -> Result<()> {
        assert_eq!(snap(15.0, &[10.0, 20.0])?, 10.0);
        assert_eq!(snap(15.0, &[20.0, 10.0])?, 20.0);
        Ok(())
    }

    #[test]
    fn snapping_needs_at_least_one_level() {
        assert!(snap(1.0, &[]).is_err());
    }

    #[test]
    fn aligned_readings_follow_the_requested_order() -> Result<()> {
        let readings = vec![(20.0, 'b'), (5.0, 'c'), (100.0, 'a')];
        let aligned = align(readings, &[100.0, 20.0, 5.0], |(level, _)| *level)?;
        let labels = aligned.iter().map(|(_, label)| *label).collect::<String>();
        assert_eq!(labels, "abc");
        Ok(())
    }

    #[test]
    fn missing_or_repeated_levels_are_rejected() {
        let repeated = vec![(20.0, 'a'), (20.0, 'b')];
        assert!(matches!(
            align(repeated, &[20.0, 5.0], |(level, _)| *level),
            Err(Error::DimensionMismatch { found: 2, .. })
        ));

        let short = vec![(20.0, 'a')];
        assert!(align(short, &[20.0, 5.0], |(level, _)| *level).is_err());
    }

    proptest! {
        #[test]
        fn snapped_level_is_never_further_than_any_other(actual in 0.0f64..150.0) {
            let snapped = snap(actual, &LEVELS).unwrap();
            for level in LEVELS {
                prop_assert!((snapped - actual).abs() <= (level - actual).abs());
            }
        }
    }
}
