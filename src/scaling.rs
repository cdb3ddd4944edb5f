use std::{collections::BTreeMap, sync::Arc};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    columns::Role,
    error::{DatasetErr, Result},
    stats::{Statistics, StatisticsEngine},
    store::DatasetStore,
    usage::RowFilter,
};

/// Normalization method of a [`ScalingTransform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// `(v - min) / (max - min)`.
    MinMax,
    /// `(v - mean) / standard_deviation`.
    MeanStdDev,
    /// Identity.
    None,
}

/// Where the stored column stands relative to the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Column holds original units at this version.
    Fitted { version: u64 },
    /// Column holds scaled values at this version.
    Applied { version: u64 },
}

/// A fitted per-column transform.
///
/// Out-of-range inputs are extrapolated, never clamped. When the fitted
/// spread is zero (`max == min` for min-max, `standard_deviation == 0` for
/// mean/std-dev) every value maps to 0 and the inverse maps back to the
/// constant the column held.
///
/// A transform is bound to the store it was fitted on. It goes stale when the
/// column is rewritten outside the engine or, for usage-dependent filters,
/// when the row partition changes before it is applied.
#[derive(Debug, Clone, Serialize)]
pub struct ScalingTransform {
    method: Method,
    statistics: Arc<Statistics>,
    filter: RowFilter,
    #[serde(skip)]
    store: u64,
    #[serde(skip)]
    partition_generation: Option<u64>,
    #[serde(skip)]
    state: State,
}

impl ScalingTransform {
    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    #[inline]
    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.statistics
    }

    /// Rows the transform was fitted on.
    #[inline]
    pub fn filter(&self) -> RowFilter {
        self.filter
    }

    /// The two parameters the method reads from its statistics:
    /// `(min, max)` or `(mean, standard_deviation)`.
    pub fn parameters(&self) -> (f64, f64) {
        let s = &self.statistics;
        match self.method {
            Method::MinMax => (s.minimum, s.maximum),
            Method::MeanStdDev | Method::None => (s.mean, s.standard_deviation),
        }
    }

    pub fn forward(&self, value: f64) -> f64 {
        let s = &self.statistics;
        match self.method {
            Method::MinMax if s.range() == 0.0 => 0.0,
            Method::MinMax => (value - s.minimum) / s.range(),
            Method::MeanStdDev if s.standard_deviation == 0.0 => 0.0,
            Method::MeanStdDev => (value - s.mean) / s.standard_deviation,
            Method::None => value,
        }
    }

    pub fn inverse(&self, value: f64) -> f64 {
        let s = &self.statistics;
        match self.method {
            Method::MinMax if s.range() == 0.0 => s.minimum,
            Method::MinMax => value * s.range() + s.minimum,
            Method::MeanStdDev if s.standard_deviation == 0.0 => s.mean,
            Method::MeanStdDev => value * s.standard_deviation + s.mean,
            Method::None => value,
        }
    }

    /// Whether the stored column currently holds scaled values.
    pub fn is_applied(&self) -> bool {
        matches!(self.state, State::Applied { .. })
    }

    /// `store` holds this column in original units at the fitted version and
    /// the fitted rows still carry the same usage.
    fn can_apply(&self, store: &DatasetStore, column: usize) -> Result<bool> {
        let version = store.column_version(column)?;
        Ok(self.store == store.id()
            && self.state == State::Fitted { version }
            && self.partition_generation == store.rows().generation_for(self.filter))
    }

    /// `store` holds exactly what [`ScalingEngine::apply`] wrote to this column.
    fn can_revert(&self, store: &DatasetStore, column: usize) -> Result<bool> {
        let version = store.column_version(column)?;
        Ok(self.store == store.id() && self.state == State::Applied { version })
    }
}

/// Fits, applies and inverts per-column normalization.
///
/// Statistics come from an owned [`StatisticsEngine`] so repeated fits over an
/// unchanged column reuse the cached record.
#[derive(Debug, Default, Clone)]
pub struct ScalingEngine {
    statistics: StatisticsEngine,
    transforms: BTreeMap<usize, ScalingTransform>,
}

impl ScalingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn statistics(&self) -> &StatisticsEngine {
        &self.statistics
    }

    #[inline]
    pub fn statistics_mut(&mut self) -> &mut StatisticsEngine {
        &mut self.statistics
    }

    /// The transform fitted for `column`, if any.
    pub fn transform(&self, column: usize) -> Option<&ScalingTransform> {
        self.transforms.get(&column)
    }

    /// Every fitted transform, in column order.
    pub fn transforms(&self) -> impl Iterator<Item = (usize, &ScalingTransform)> {
        self.transforms.iter().map(|(&column, t)| (column, t))
    }

    /// Fits `method` on `column` over the rows selected by `filter`,
    /// replacing any previous transform for that column.
    ///
    /// # Errors
    /// - `DatasetErr::OutOfRange` for an invalid column.
    /// - `DatasetErr::EmptyColumn` if `filter` selects no rows.
    pub fn fit(
        &mut self,
        store: &DatasetStore,
        column: usize,
        filter: RowFilter,
        method: Method,
    ) -> Result<Arc<Statistics>> {
        let transform = self.build(store, column, filter, method)?;
        let statistics = Arc::clone(&transform.statistics);
        self.transforms.insert(column, transform);
        Ok(statistics)
    }

    fn build(
        &mut self,
        store: &DatasetStore,
        column: usize,
        filter: RowFilter,
        method: Method,
    ) -> Result<ScalingTransform> {
        let statistics = self.statistics.compute_for(store, column, filter)?;
        let version = store.column_version(column)?;

        debug!(column = column; "fitted {method:?} over {filter:?}");
        Ok(ScalingTransform {
            method,
            statistics,
            filter,
            store: store.id(),
            partition_generation: store.rows().generation_for(filter),
            state: State::Fitted { version },
        })
    }

    /// Fits a min-max transform, see [`fit`](Self::fit).
    pub fn fit_min_max(
        &mut self,
        store: &DatasetStore,
        column: usize,
        filter: RowFilter,
    ) -> Result<Arc<Statistics>> {
        self.fit(store, column, filter, Method::MinMax)
    }

    /// Fits a mean/standard-deviation transform, see [`fit`](Self::fit).
    pub fn fit_mean_std_dev(
        &mut self,
        store: &DatasetStore,
        column: usize,
        filter: RowFilter,
    ) -> Result<Arc<Statistics>> {
        self.fit(store, column, filter, Method::MeanStdDev)
    }

    /// Fits an identity transform, see [`fit`](Self::fit).
    pub fn fit_none(
        &mut self,
        store: &DatasetStore,
        column: usize,
        filter: RowFilter,
    ) -> Result<Arc<Statistics>> {
        self.fit(store, column, filter, Method::None)
    }

    fn fitted(&self, column: usize) -> Result<&ScalingTransform> {
        self.transforms
            .get(&column)
            .ok_or(DatasetErr::NotFitted { column })
    }

    /// Rewrites `column` in place through its fitted transform.
    ///
    /// # Errors
    /// - `DatasetErr::NotFitted` if nothing was fitted for `column`.
    /// - `DatasetErr::StaleTransform` if `store` is not the one the transform
    ///   was fitted on, the column or the fitted rows' usage changed since the
    ///   fit, or the transform was already applied.
    pub fn apply(&mut self, store: &mut DatasetStore, column: usize) -> Result<()> {
        let transform = self.fitted(column)?;
        if !transform.can_apply(store, column)? {
            return Err(DatasetErr::StaleTransform { column });
        }

        store.transform_column(column, |v| transform.forward(v))?;
        self.set_state(column, State::Applied {
            version: store.column_version(column)?,
        });

        debug!(column = column; "scaling applied");
        Ok(())
    }

    /// Rewrites a previously applied `column` back to original units.
    ///
    /// # Errors
    /// - `DatasetErr::NotFitted` if nothing was fitted for `column`.
    /// - `DatasetErr::StaleTransform` if the column of `store` does not
    ///   currently hold the values produced by [`apply`](Self::apply).
    pub fn revert(&mut self, store: &mut DatasetStore, column: usize) -> Result<()> {
        let transform = self.fitted(column)?;
        if !transform.can_revert(store, column)? {
            return Err(DatasetErr::StaleTransform { column });
        }

        store.transform_column(column, |v| transform.inverse(v))?;
        self.set_state(column, State::Fitted {
            version: store.column_version(column)?,
        });

        debug!(column = column; "scaling reverted");
        Ok(())
    }

    fn set_state(&mut self, column: usize, state: State) {
        if let Some(transform) = self.transforms.get_mut(&column) {
            transform.state = state;
        }
    }

    /// Maps a single value in original units through the fitted transform.
    ///
    /// # Errors
    /// `DatasetErr::NotFitted` if nothing was fitted for `column`.
    pub fn forward(&self, column: usize, value: f64) -> Result<f64> {
        Ok(self.fitted(column)?.forward(value))
    }

    /// Maps a scaled value (e.g. a model output) back to original units.
    ///
    /// # Errors
    /// `DatasetErr::NotFitted` if nothing was fitted for `column`.
    pub fn invert(&self, column: usize, value: f64) -> Result<f64> {
        Ok(self.fitted(column)?.inverse(value))
    }

    /// Fits `method` on every [`Role::Input`] column over `filter` and applies
    /// it immediately.
    ///
    /// All fits happen before any column is rewritten or any transform is
    /// replaced, so a failing fit leaves both the store and the engine's
    /// transforms untouched.
    ///
    /// # Returns
    /// The fitted statistics, in column order.
    ///
    /// # Errors
    /// Same as [`fit`](Self::fit) and [`apply`](Self::apply).
    pub fn fit_and_apply_to_all_inputs(
        &mut self,
        store: &mut DatasetStore,
        filter: RowFilter,
        method: Method,
    ) -> Result<Vec<Arc<Statistics>>> {
        let inputs = store.columns().columns_with_role(Role::Input);

        let fitted = inputs
            .iter()
            .map(|&column| self.build(store, column, filter, method))
            .collect::<Result<Vec<_>>>()?;

        let mut statistics = Vec::with_capacity(fitted.len());
        for (&column, transform) in inputs.iter().zip(fitted) {
            statistics.push(Arc::clone(&transform.statistics));
            self.transforms.insert(column, transform);
        }

        for &column in &inputs {
            self.apply(store, column)?;
        }

        Ok(statistics)
    }

    /// [`fit_and_apply_to_all_inputs`](Self::fit_and_apply_to_all_inputs)
    /// with [`Method::MinMax`].
    pub fn fit_and_apply_min_max_to_all_inputs(
        &mut self,
        store: &mut DatasetStore,
        filter: RowFilter,
    ) -> Result<Vec<Arc<Statistics>>> {
        self.fit_and_apply_to_all_inputs(store, filter, Method::MinMax)
    }

    /// [`fit_and_apply_to_all_inputs`](Self::fit_and_apply_to_all_inputs)
    /// with [`Method::MeanStdDev`].
    pub fn fit_and_apply_mean_std_dev_to_all_inputs(
        &mut self,
        store: &mut DatasetStore,
        filter: RowFilter,
    ) -> Result<Vec<Arc<Statistics>>> {
        self.fit_and_apply_to_all_inputs(store, filter, Method::MeanStdDev)
    }
}
