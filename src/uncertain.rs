use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use itertools::Itertools;
use ndarray::{Array2, Axis};
use num_traits::Zero;

use crate::error::{Error, Result};

/// Identifier of an elementary uncertain quantity within one [`CorrelationContext`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(usize);

#[derive(Clone, Debug)]
struct Source {
    label: String,
    df: f64,
}

#[derive(Debug, Default)]
struct Registry {
    sources: Vec<Source>,
    /// Declared correlations, keyed with the smaller id first
    correlations: HashMap<(SourceId, SourceId), f64>,
}

impl Registry {
    fn correlation(&self, a: SourceId, b: SourceId) -> f64 {
        if a == b {
            return 1.0;
        }
        let key = if a < b { (a, b) } else { (b, a) };
        self.correlations.get(&key).copied().unwrap_or(0.0)
    }

    /// The covariance of two sets of uncertainty components
    ///
    /// $$
    ///     \mathrm{cov}(y_1, y_2) = \sum_i \sum_j u_i(y_1) r_{ij} u_j(y_2)
    /// $$
    fn covariance(&self, a: &BTreeMap<SourceId, f64>, b: &BTreeMap<SourceId, f64>) -> f64 {
        let shared: f64 = a
            .iter()
            .filter_map(|(id, ca)| b.get(id).map(|cb| ca * cb))
            .sum();

        let declared: f64 = self
            .correlations
            .iter()
            .map(|(&(i, j), r)| {
                let ij = a.get(&i).zip(b.get(&j)).map_or(0.0, |(x, y)| x * y);
                let ji = a.get(&j).zip(b.get(&i)).map_or(0.0, |(x, y)| x * y);
                r * (ij + ji)
            })
            .sum();

        shared + declared
    }
}

/// The registry of elementary uncertain quantities for one calibration run
///
/// Every elementary [`UncertainReal`] is registered here once, receiving a unique [`SourceId`].
/// Derived quantities carry their uncertainty as components keyed by these ids, so the
/// covariance between any two results of the run can be recovered exactly. A fresh context
/// should be created for each independent run; values from different contexts must not be
/// combined.
///
/// The handle is cheap to clone and can be shared between threads: registration takes a write
/// lock and hands out ids from an append-only list.
#[derive(Clone, Debug, Default)]
pub struct CorrelationContext {
    registry: Arc<RwLock<Registry>>,
}

impl CorrelationContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.registry, &other.registry)
    }

    /// Number of elementary quantities registered so far
    pub fn len(&self) -> usize {
        self.read().sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, label: String, df: f64) -> SourceId {
        let mut registry = self.write();
        let id = SourceId(registry.sources.len());
        registry.sources.push(Source { label, df });
        id
    }

    /// Create an elementary uncertain real number
    ///
    /// # Errors
    /// Returns [`Error::InvalidUncertainty`] if `u` is negative or not finite, or if `df` is not
    /// strictly positive. An infinite `df` is allowed.
    pub fn ureal(&self, x: f64, u: f64, df: f64, label: impl Into<String>) -> Result<UncertainReal> {
        let label = label.into();
        if !u.is_finite() || u < 0.0 || df.is_nan() || df <= 0.0 {
            return Err(Error::InvalidUncertainty { label, u, df });
        }

        let id = self.register(label.clone(), df);
        let mut components = BTreeMap::new();
        components.insert(id, u);

        Ok(UncertainReal {
            x,
            components,
            context: Some(self.clone()),
            elementary: Some(id),
            label: Some(label),
        })
    }

    /// Declare a correlation coefficient between two elementary quantities
    ///
    /// Quantities that share arithmetic history are already correlated through their components;
    /// this is only for independently declared inputs, for example fit coefficients that come
    /// with a covariance matrix.
    ///
    /// # Errors
    /// Fails if either argument is not elementary, or if `r` lies outside `[-1, 1]`.
    pub fn set_correlation(&self, a: &UncertainReal, b: &UncertainReal, r: f64) -> Result<()> {
        if !(-1.0..=1.0).contains(&r) {
            return Err(Error::InvalidCorrelation(r));
        }
        let ia = a
            .elementary
            .ok_or_else(|| Error::NotElementary(a.to_string()))?;
        let ib = b
            .elementary
            .ok_or_else(|| Error::NotElementary(b.to_string()))?;
        if ia == ib {
            return Err(Error::InvalidCorrelation(r));
        }

        let key = if ia < ib { (ia, ib) } else { (ib, ia) };
        let mut registry = self.write();
        if r == 0.0 {
            registry.correlations.remove(&key);
        } else {
            registry.correlations.insert(key, r);
        }
        Ok(())
    }

    /// The covariance matrix of a set of uncertain numbers
    ///
    /// Built as $J R J^T$ where the rows of $J$ are the uncertainty components of each value
    /// and $R$ is the correlation matrix of the elementary sources they depend on.
    pub fn covariance_matrix(&self, values: &[UncertainReal]) -> Array2<f64> {
        let registry = self.read();
        let sources = values
            .iter()
            .flat_map(|value| value.components.keys().copied())
            .sorted()
            .dedup()
            .collect::<Vec<_>>();

        let mut jacobian = Array2::zeros((values.len(), sources.len()));
        for (mut row, value) in jacobian.axis_iter_mut(Axis(0)).zip(values) {
            for (jj, id) in sources.iter().enumerate() {
                row[jj] = value.components.get(id).copied().unwrap_or(0.0);
            }
        }

        let mut correlation = Array2::eye(sources.len());
        for (ii, a) in sources.iter().enumerate() {
            for (jj, b) in sources.iter().enumerate().skip(ii + 1) {
                let r = registry.correlation(*a, *b);
                correlation[[ii, jj]] = r;
                correlation[[jj, ii]] = r;
            }
        }

        jacobian.dot(&correlation).dot(&jacobian.t())
    }

    /// The correlation matrix of a set of uncertain numbers
    ///
    /// Entries involving an exact value are zero, except for the unit diagonal.
    pub fn correlation_matrix(&self, values: &[UncertainReal]) -> Array2<f64> {
        let covariance = self.covariance_matrix(values);
        let u = covariance.diag().mapv(f64::sqrt);
        let mut correlation = Array2::eye(values.len());
        for ((ii, jj), c) in covariance.indexed_iter() {
            if ii != jj && u[ii] > 0.0 && u[jj] > 0.0 {
                correlation[[ii, jj]] = c / (u[ii] * u[jj]);
            }
        }
        correlation
    }
}

/// One line of an uncertainty budget
#[derive(Clone, Debug, PartialEq)]
pub struct BudgetEntry {
    pub label: String,
    /// Magnitude of the component of uncertainty, $|c_i u_i|$
    pub contribution: f64,
}

/// An uncertain real number
///
/// Carries a value and the first-order uncertainty components $u_i(y) = c_i u_i$ with respect to
/// every elementary quantity it depends on. Values are never mutated: arithmetic creates new
/// values whose components are the sensitivity-weighted sums of the operands' components.
#[derive(Clone, Debug)]
pub struct UncertainReal {
    x: f64,
    components: BTreeMap<SourceId, f64>,
    context: Option<CorrelationContext>,
    elementary: Option<SourceId>,
    label: Option<String>,
}

impl UncertainReal {
    /// An exact value, with zero uncertainty and infinite degrees of freedom
    pub const fn constant(x: f64) -> Self {
        Self {
            x,
            components: BTreeMap::new(),
            context: None,
            elementary: None,
            label: None,
        }
    }

    pub const fn x(&self) -> f64 {
        self.x
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub const fn is_elementary(&self) -> bool {
        self.elementary.is_some()
    }

    pub fn variance(&self) -> f64 {
        self.covariance(self)
    }

    /// The standard uncertainty
    pub fn u(&self) -> f64 {
        self.variance().max(0.0).sqrt()
    }

    pub fn covariance(&self, other: &Self) -> f64 {
        match self.context.as_ref().or(other.context.as_ref()) {
            Some(context) => context.read().covariance(&self.components, &other.components),
            None => 0.0,
        }
    }

    /// Correlation coefficient with `other`, zero when either value is exact
    pub fn correlation(&self, other: &Self) -> f64 {
        let denominator = self.u() * other.u();
        if denominator == 0.0 {
            0.0
        } else {
            self.covariance(other) / denominator
        }
    }

    /// Effective degrees of freedom
    ///
    /// When every contributing elementary quantity has the same degrees of freedom that value is
    /// returned unchanged. Otherwise the Welch-Satterthwaite formula is used
    ///
    /// $$
    ///     \nu_\mathrm{eff} = \frac{u^4(y)}{\sum_i u_i^4(y) / \nu_i}
    /// $$
    pub fn df(&self) -> f64 {
        let Some(context) = &self.context else {
            return f64::INFINITY;
        };
        let registry = context.read();

        let contributing = self
            .components
            .iter()
            .filter(|(_, c)| **c != 0.0)
            .map(|(id, c)| (*c, registry.sources[id.0].df))
            .collect::<Vec<_>>();

        let Some(&(_, first)) = contributing.first() else {
            return f64::INFINITY;
        };
        if contributing.iter().all(|(_, df)| *df == first) {
            return first;
        }

        let denominator: f64 = contributing
            .iter()
            .map(|(c, df)| c.powi(4) / df)
            .sum();
        if denominator == 0.0 {
            return f64::INFINITY;
        }
        let variance = registry.covariance(&self.components, &self.components);
        variance.powi(2) / denominator
    }

    /// The components of uncertainty, labelled by their elementary source
    ///
    /// Components smaller than `trim` times the largest are dropped; entries are sorted with the
    /// largest contribution first.
    pub fn budget(&self, trim: f64) -> Vec<BudgetEntry> {
        let Some(context) = &self.context else {
            return vec![];
        };
        let registry = context.read();
        let largest = self
            .components
            .values()
            .map(|c| c.abs())
            .fold(0.0, f64::max);

        self.components
            .iter()
            .map(|(id, c)| BudgetEntry {
                label: registry.sources[id.0].label.clone(),
                contribution: c.abs(),
            })
            .filter(|entry| entry.contribution > 0.0 && entry.contribution >= trim * largest)
            .sorted_by(|a, b| b.contribution.total_cmp(&a.contribution))
            .collect()
    }

    fn merged_context(a: &Self, b: &Self) -> Option<CorrelationContext> {
        match (&a.context, &b.context) {
            (Some(ca), Some(cb)) => {
                debug_assert!(
                    ca.same(cb),
                    "uncertain numbers from different correlation contexts were combined"
                );
                Some(ca.clone())
            }
            (Some(context), None) | (None, Some(context)) => Some(context.clone()),
            (None, None) => None,
        }
    }

    /// The linear combination with value `x` and sensitivities `ca`, `cb` to `a` and `b`
    pub(crate) fn linear(a: &Self, ca: f64, b: &Self, cb: f64, x: f64) -> Self {
        let mut components = BTreeMap::new();
        for (id, c) in &a.components {
            *components.entry(*id).or_insert(0.0) += ca * c;
        }
        for (id, c) in &b.components {
            *components.entry(*id).or_insert(0.0) += cb * c;
        }
        components.retain(|_, c| *c != 0.0);

        Self {
            x,
            components,
            context: Self::merged_context(a, b),
            elementary: None,
            label: None,
        }
    }

    /// A value `x` with sensitivity `c` to `self`
    pub(crate) fn scaled(&self, c: f64, x: f64) -> Self {
        let mut components = self
            .components
            .iter()
            .map(|(id, u)| (*id, c * u))
            .collect::<BTreeMap<_, _>>();
        components.retain(|_, u| *u != 0.0);

        Self {
            x,
            components,
            context: self.context.clone(),
            elementary: None,
            label: None,
        }
    }
}

impl fmt::Display for UncertainReal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{label}: ")?;
        }
        write!(f, "{} ({}, df = {})", self.x, self.u(), self.df())
    }
}

impl From<f64> for UncertainReal {
    fn from(x: f64) -> Self {
        Self::constant(x)
    }
}

impl<'a, 'b> Add<&'b UncertainReal> for &'a UncertainReal {
    type Output = UncertainReal;

    fn add(self, rhs: &'b UncertainReal) -> UncertainReal {
        UncertainReal::linear(self, 1.0, rhs, 1.0, self.x + rhs.x)
    }
}

impl<'a, 'b> Sub<&'b UncertainReal> for &'a UncertainReal {
    type Output = UncertainReal;

    fn sub(self, rhs: &'b UncertainReal) -> UncertainReal {
        UncertainReal::linear(self, 1.0, rhs, -1.0, self.x - rhs.x)
    }
}

impl<'a, 'b> Mul<&'b UncertainReal> for &'a UncertainReal {
    type Output = UncertainReal;

    fn mul(self, rhs: &'b UncertainReal) -> UncertainReal {
        UncertainReal::linear(self, rhs.x, rhs, self.x, self.x * rhs.x)
    }
}

impl<'a, 'b> Div<&'b UncertainReal> for &'a UncertainReal {
    type Output = UncertainReal;

    fn div(self, rhs: &'b UncertainReal) -> UncertainReal {
        let x = self.x / rhs.x;
        UncertainReal::linear(self, 1.0 / rhs.x, rhs, -x / rhs.x, x)
    }
}

forward_ref_binop!(Add, add, UncertainReal, UncertainReal, UncertainReal);
forward_ref_binop!(Sub, sub, UncertainReal, UncertainReal, UncertainReal);
forward_ref_binop!(Mul, mul, UncertainReal, UncertainReal, UncertainReal);
forward_ref_binop!(Div, div, UncertainReal, UncertainReal, UncertainReal);

impl<'a> Add<f64> for &'a UncertainReal {
    type Output = UncertainReal;

    fn add(self, rhs: f64) -> UncertainReal {
        self.scaled(1.0, self.x + rhs)
    }
}

impl<'a> Sub<f64> for &'a UncertainReal {
    type Output = UncertainReal;

    fn sub(self, rhs: f64) -> UncertainReal {
        self.scaled(1.0, self.x - rhs)
    }
}

impl<'a> Mul<f64> for &'a UncertainReal {
    type Output = UncertainReal;

    fn mul(self, rhs: f64) -> UncertainReal {
        self.scaled(rhs, self.x * rhs)
    }
}

impl<'a> Div<f64> for &'a UncertainReal {
    type Output = UncertainReal;

    fn div(self, rhs: f64) -> UncertainReal {
        self.scaled(1.0 / rhs, self.x / rhs)
    }
}

forward_const_binop!(Add, add, UncertainReal, f64, UncertainReal);
forward_const_binop!(Sub, sub, UncertainReal, f64, UncertainReal);
forward_const_binop!(Mul, mul, UncertainReal, f64, UncertainReal);
forward_const_binop!(Div, div, UncertainReal, f64, UncertainReal);

impl<'a> Add<&'a UncertainReal> for f64 {
    type Output = UncertainReal;

    fn add(self, rhs: &'a UncertainReal) -> UncertainReal {
        rhs.scaled(1.0, self + rhs.x)
    }
}

impl<'a> Sub<&'a UncertainReal> for f64 {
    type Output = UncertainReal;

    fn sub(self, rhs: &'a UncertainReal) -> UncertainReal {
        rhs.scaled(-1.0, self - rhs.x)
    }
}

impl<'a> Mul<&'a UncertainReal> for f64 {
    type Output = UncertainReal;

    fn mul(self, rhs: &'a UncertainReal) -> UncertainReal {
        rhs.scaled(self, self * rhs.x)
    }
}

impl<'a> Div<&'a UncertainReal> for f64 {
    type Output = UncertainReal;

    fn div(self, rhs: &'a UncertainReal) -> UncertainReal {
        let x = self / rhs.x;
        rhs.scaled(-x / rhs.x, x)
    }
}

forward_const_lhs_binop!(Add, add, f64, UncertainReal, UncertainReal);
forward_const_lhs_binop!(Sub, sub, f64, UncertainReal, UncertainReal);
forward_const_lhs_binop!(Mul, mul, f64, UncertainReal, UncertainReal);
forward_const_lhs_binop!(Div, div, f64, UncertainReal, UncertainReal);

impl<'a> Neg for &'a UncertainReal {
    type Output = UncertainReal;

    fn neg(self) -> UncertainReal {
        self.scaled(-1.0, -self.x)
    }
}

impl Neg for UncertainReal {
    type Output = Self;

    fn neg(self) -> Self {
        -&self
    }
}

impl Zero for UncertainReal {
    fn zero() -> Self {
        Self::constant(0.0)
    }

    fn is_zero(&self) -> bool {
        self.x == 0.0 && self.components.values().all(|c| *c == 0.0)
    }
}

impl std::iter::Sum for UncertainReal {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, x| acc + x)
    }
}

impl<'a> std::iter::Sum<&'a UncertainReal> for UncertainReal {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, x| acc + x)
    }
}
