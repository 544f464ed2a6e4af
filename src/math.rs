use crate::complex::UncertainComplex;

/// Two-point linear interpolation of an uncertain complex value
///
/// The line through `(x0, y0)` and `(x1, y1)` is evaluated at `x`. Outside `[x0, x1]` this is a
/// linear extrapolation. Correlation between `y0` and `y1` is carried through.
///
/// # Examples
///
/// ```
/// use ct_buildup::complex::UncertainComplex;
/// use ct_buildup::math::interpolate;
/// use num_complex::Complex64;
///
/// let y0 = UncertainComplex::constant(Complex64::new(1.0, 2.0));
/// let y1 = UncertainComplex::constant(Complex64::new(11.0, -8.0));
/// let y = interpolate(10.0, 20.0, &y0, &y1, 15.0);
///
/// assert_eq!(y.value(), Complex64::new(6.0, -3.0));
/// ```
pub fn interpolate(
    x0: f64,
    x1: f64,
    y0: &UncertainComplex,
    y1: &UncertainComplex,
    x: f64,
) -> UncertainComplex {
    let slope = (y1 - y0) / (x1 - x0);
    y0 + slope * (x - x0)
}

/// Index `i` of the adjacent pair `(xs[i], xs[i + 1])` to interpolate at `target`
///
/// The last pair, in the given order, whose closed interval contains `target` is chosen. When no
/// pair brackets the target the end pair nearest to it is used for extrapolation. Returns `None`
/// with fewer than two points.
///
/// # Examples
///
/// ```
/// use ct_buildup::math::bracketing_pair;
///
/// let levels = [125., 120., 100., 60., 40., 20., 10., 5., 1.];
/// assert_eq!(bracketing_pair(&levels, 20.0), Some(5));
/// assert_eq!(bracketing_pair(&levels, 0.2), Some(7));
/// assert_eq!(bracketing_pair(&levels, 200.0), Some(0));
/// ```
pub fn bracketing_pair(xs: &[f64], target: f64) -> Option<usize> {
    if xs.len() < 2 {
        return None;
    }

    let bracketing = xs.windows(2).rposition(|pair| {
        let (lower, upper) = if pair[0] <= pair[1] {
            (pair[0], pair[1])
        } else {
            (pair[1], pair[0])
        };
        (lower..=upper).contains(&target)
    });

    bracketing.or_else(|| {
        let last = xs.len() - 1;
        if (xs[0] - target).abs() <= (xs[last] - target).abs() {
            Some(0)
        } else {
            Some(last - 1)
        }
    })
}

#[cfg(test)]
mod tests {
    use num_complex::Complex64;
    use proptest::prelude::*;

    use super::{bracketing_pair, interpolate};
    use crate::uncertain::CorrelationContext;
    use crate::Result;

    #[test]
    fn one_fifth_targets_use_the_expected_pairs() {
        let levels = [125., 120., 100., 60., 40., 20., 10., 5., 1.];
        let pairs = levels
            .iter()
            .map(|level| bracketing_pair(&levels, level / 5.0))
            .collect::<Vec<_>>();

        let expected = [4, 4, 5, 5, 6, 7, 7, 7, 7].map(Some);
        assert_eq!(pairs, expected);
    }

    #[test]
    fn single_points_cannot_be_interpolated() {
        assert_eq!(bracketing_pair(&[10.0], 10.0), None);
        assert_eq!(bracketing_pair(&[], 10.0), None);
    }

    #[test]
    fn interpolation_at_a_node_reproduces_the_node() -> Result<()> {
        let ctx = CorrelationContext::new();
        let y0 = ctx.ucomplex(Complex64::new(1e-6, 2e-6), [1e-8, 2e-8], 10.0, "y0")?;
        let y1 = ctx.ucomplex(Complex64::new(3e-6, -1e-6), [3e-8, 1e-8], 10.0, "y1")?;

        let y = interpolate(20.0, 10.0, &y0, &y1, 20.0);

        approx::assert_relative_eq!(y.value().re, 1e-6, max_relative = 1e-12);
        approx::assert_relative_eq!(y.u()[0], 1e-8, max_relative = 1e-12);
        approx::assert_abs_diff_eq!(y.real().correlation(y0.real()), 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn extrapolation_amplifies_uncertainty() -> Result<()> {
        let ctx = CorrelationContext::new();
        let y0 = ctx.ucomplex(Complex64::new(0.0, 0.0), [1e-8, 1e-8], 10.0, "y0")?;
        let y1 = ctx.ucomplex(Complex64::new(0.0, 0.0), [1e-8, 1e-8], 10.0, "y1")?;

        // At x = 0 with nodes at 5 and 1 the weights are -1/4 and 5/4
        let y = interpolate(5.0, 1.0, &y0, &y1, 0.0);

        let expected = 1e-8 * (0.25f64).hypot(1.25);
        approx::assert_relative_eq!(y.u()[0], expected, max_relative = 1e-12);
        Ok(())
    }

    proptest! {
        #[test]
        fn chosen_pair_brackets_any_target_inside_the_range(target in 1.0f64..125.0) {
            let levels = [125., 120., 100., 60., 40., 20., 10., 5., 1.];
            let ii = bracketing_pair(&levels, target).unwrap();
            prop_assert!(levels[ii] >= target && target >= levels[ii + 1]);
        }
    }
}
