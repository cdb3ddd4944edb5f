use std::{collections::HashMap, sync::Arc};

use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    error::{DatasetErr, Result},
    store::DatasetStore,
    usage::RowFilter,
};

/// Descriptive statistics of one column over a row subset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub minimum: f64,
    pub maximum: f64,
    pub mean: f64,
    /// Sample standard deviation (divides by `count - 1`).
    pub standard_deviation: f64,
    pub count: usize,
}

impl Statistics {
    /// Single pass over `values` accumulating count, the running extremes and
    /// the sum and sum of squares of each value's offset from the first one.
    ///
    /// Returns `None` when `values` is empty. A single value, or a run of
    /// identical values, has a standard deviation of exactly 0.
    pub fn from_values<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut values = values.into_iter();
        let shift = values.next()?;

        let mut count = 1usize;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut minimum = shift;
        let mut maximum = shift;

        for v in values {
            let d = v - shift;
            count += 1;
            sum += d;
            sum_sq += d * d;
            minimum = minimum.min(v);
            maximum = maximum.max(v);
        }

        let n = count as f64;
        let mean = shift + sum / n;
        let standard_deviation = if count <= 1 || minimum == maximum {
            0.0
        } else {
            ((sum_sq - sum * sum / n) / (n - 1.0)).max(0.0).sqrt()
        };

        Some(Self {
            minimum,
            maximum,
            mean,
            standard_deviation,
            count,
        })
    }

    #[inline]
    pub fn range(&self) -> f64 {
        self.maximum - self.minimum
    }
}

/// What a cached record was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    store: u64,
    column_version: u64,
    partition_generation: Option<u64>,
}

impl Stamp {
    fn current(store: &DatasetStore, column: usize, filter: RowFilter) -> Result<Self> {
        Ok(Self {
            store: store.id(),
            column_version: store.column_version(column)?,
            partition_generation: store.rows().generation_for(filter),
        })
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    stamp: Stamp,
    stats: Arc<Statistics>,
}

/// Computes and caches per-column [`Statistics`].
///
/// Entries are keyed by `(column, filter)`. An entry is reused only for the
/// store it was computed on, while the column has not been transformed and,
/// for usage-dependent filters, while the row partition is unchanged.
#[derive(Debug, Default, Clone)]
pub struct StatisticsEngine {
    cache: HashMap<(usize, RowFilter), CacheEntry>,
}

impl StatisticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics of `column` over the rows selected by `filter`.
    ///
    /// Never mutates `store`.
    ///
    /// # Errors
    /// - `DatasetErr::OutOfRange` for an invalid column.
    /// - `DatasetErr::EmptyColumn` if `filter` selects no rows.
    pub fn compute_for(
        &mut self,
        store: &DatasetStore,
        column: usize,
        filter: RowFilter,
    ) -> Result<Arc<Statistics>> {
        let stamp = Stamp::current(store, column, filter)?;

        if let Some(entry) = self.cache.get(&(column, filter)) {
            if entry.stamp == stamp {
                trace!(column = column; "statistics cache hit");
                return Ok(Arc::clone(&entry.stats));
            }
        }

        let cells = store.column_view(column)?;
        let selected = store.rows().rows_matching(filter).map(|row| cells[row]);
        let stats = Statistics::from_values(selected).ok_or(DatasetErr::EmptyColumn { column })?;

        trace!(column = column, count = stats.count; "statistics computed");
        let stats = Arc::new(stats);
        self.cache.insert(
            (column, filter),
            CacheEntry {
                stamp,
                stats: Arc::clone(&stats),
            },
        );

        Ok(stats)
    }

    /// Statistics for every column, in column order.
    ///
    /// # Errors
    /// `DatasetErr::EmptyColumn` if `filter` selects no rows.
    pub fn compute_all(
        &mut self,
        store: &DatasetStore,
        filter: RowFilter,
    ) -> Result<Vec<Arc<Statistics>>> {
        (0..store.column_count())
            .map(|column| self.compute_for(store, column, filter))
            .collect()
    }

    /// Cached statistics for `(column, filter)` if still current.
    pub fn cached(
        &self,
        store: &DatasetStore,
        column: usize,
        filter: RowFilter,
    ) -> Option<Arc<Statistics>> {
        let stamp = Stamp::current(store, column, filter).ok()?;
        self.cache
            .get(&(column, filter))
            .filter(|entry| entry.stamp == stamp)
            .map(|entry| Arc::clone(&entry.stats))
    }

    /// Drops every cached entry for `column`.
    pub fn invalidate(&mut self, column: usize) {
        self.cache.retain(|(c, _), _| *c != column);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::Usage;

    fn store_135() -> DatasetStore {
        let mut store = DatasetStore::from_rows(&[[1.0, 7.0], [3.0, 7.0], [5.0, 7.0]]).unwrap();
        store.set_all_usage(Usage::Training);
        store
    }

    #[test]
    fn sample_statistics() {
        let mut engine = StatisticsEngine::new();
        let stats = engine.compute_for(&store_135(), 0, RowFilter::TRAINING).unwrap();

        assert_eq!(stats.minimum, 1.0);
        assert_eq!(stats.maximum, 5.0);
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.standard_deviation, 2.0);
        assert_eq!(stats.count, 3);
    }

    #[test]
    fn constant_column_has_zero_deviation() {
        let mut engine = StatisticsEngine::new();
        let stats = engine.compute_for(&store_135(), 1, RowFilter::TRAINING).unwrap();
        assert_eq!(stats.standard_deviation, 0.0);
        assert_eq!(stats.minimum, stats.maximum);

        let stats = Statistics::from_values([0.1; 7]).unwrap();
        assert_eq!(stats.standard_deviation, 0.0);
    }

    #[test]
    fn single_value_has_zero_deviation() {
        let stats = Statistics::from_values([4.5]).unwrap();
        assert_eq!(stats.standard_deviation, 0.0);
        assert_eq!(stats.mean, 4.5);
    }

    #[test]
    fn empty_filter_is_an_error() {
        let store = DatasetStore::from_rows(&[[1.0], [2.0]]).unwrap();
        let mut engine = StatisticsEngine::new();
        assert!(matches!(
            engine.compute_for(&store, 0, RowFilter::TRAINING),
            Err(DatasetErr::EmptyColumn { column: 0 })
        ));
    }

    #[test]
    fn held_out_rows_do_not_leak() {
        let mut store = store_135();
        store.set_usage(2, Usage::Testing).unwrap();

        let mut engine = StatisticsEngine::new();
        let stats = engine.compute_for(&store, 0, RowFilter::TRAINING).unwrap();
        assert_eq!(stats.maximum, 3.0);
        assert_eq!(stats.count, 2);
    }

    #[test]
    fn cache_is_reused_until_data_changes() {
        let mut store = store_135();
        let mut engine = StatisticsEngine::new();

        let first = engine.compute_for(&store, 0, RowFilter::TRAINING).unwrap();
        let second = engine.compute_for(&store, 0, RowFilter::TRAINING).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        store.transform_column(0, |v| v * 2.0).unwrap();
        assert!(engine.cached(&store, 0, RowFilter::TRAINING).is_none());

        let third = engine.compute_for(&store, 0, RowFilter::TRAINING).unwrap();
        assert_eq!(third.maximum, 10.0);
    }

    #[test]
    fn cache_is_invalidated_by_usage_changes() {
        let mut store = store_135();
        let mut engine = StatisticsEngine::new();

        engine.compute_for(&store, 0, RowFilter::TRAINING).unwrap();
        engine.compute_for(&store, 0, RowFilter::All).unwrap();
        store.set_usage(0, Usage::Validation).unwrap();

        assert!(engine.cached(&store, 0, RowFilter::TRAINING).is_none());
        assert!(engine.cached(&store, 0, RowFilter::All).is_some());
        assert_eq!(
            engine.compute_for(&store, 0, RowFilter::TRAINING).unwrap().minimum,
            3.0
        );
    }

    #[test]
    fn large_offsets_keep_their_precision() {
        let stats = Statistics::from_values([1e8, 1e8 + 1.0, 1e8 + 2.0]).unwrap();
        assert_eq!(stats.mean, 1e8 + 1.0);
        assert_eq!(stats.standard_deviation, 1.0);

        let stats = Statistics::from_values([1e9 + 0.5, 1e9 - 0.5]).unwrap();
        assert_eq!(stats.mean, 1e9);
        assert!((stats.standard_deviation - 0.5f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn records_are_not_shared_between_stores() {
        let mut a = DatasetStore::from_rows(&[[1.0], [5.0]]).unwrap();
        let mut b = DatasetStore::from_rows(&[[100.0], [300.0]]).unwrap();
        a.set_all_usage(Usage::Training);
        b.set_all_usage(Usage::Training);

        let mut engine = StatisticsEngine::new();
        assert_eq!(engine.compute_for(&a, 0, RowFilter::TRAINING).unwrap().maximum, 5.0);
        assert!(engine.cached(&b, 0, RowFilter::TRAINING).is_none());

        let stats = engine.compute_for(&b, 0, RowFilter::TRAINING).unwrap();
        assert_eq!((stats.minimum, stats.maximum), (100.0, 300.0));
    }

    #[test]
    fn cloned_store_with_a_diverged_partition_recomputes() {
        let mut a = DatasetStore::from_rows(&[[1.0], [5.0], [9.0]]).unwrap();
        a.set_all_usage(Usage::Training);
        let mut copy = a.clone();

        // same generation on both sides, different rows held out
        a.set_usage(2, Usage::Testing).unwrap();
        copy.set_usage(0, Usage::Testing).unwrap();
        assert_eq!(a.rows().generation(), copy.rows().generation());

        let mut engine = StatisticsEngine::new();
        let first = engine.compute_for(&a, 0, RowFilter::TRAINING).unwrap();
        assert_eq!((first.minimum, first.maximum), (1.0, 5.0));

        let second = engine.compute_for(&copy, 0, RowFilter::TRAINING).unwrap();
        assert_eq!((second.minimum, second.maximum), (5.0, 9.0));
    }

    #[test]
    fn compute_all_follows_column_order() {
        let mut engine = StatisticsEngine::new();
        let all = engine.compute_all(&store_135(), RowFilter::All).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].mean, 7.0);
    }

    #[test]
    fn invalidate_drops_only_that_column() {
        let store = store_135();
        let mut engine = StatisticsEngine::new();
        engine.compute_all(&store, RowFilter::TRAINING).unwrap();

        engine.invalidate(0);
        assert!(engine.cached(&store, 0, RowFilter::TRAINING).is_none());
        assert!(engine.cached(&store, 1, RowFilter::TRAINING).is_some());

        engine.clear();
        assert!(engine.cached(&store, 1, RowFilter::TRAINING).is_none());
    }
}
