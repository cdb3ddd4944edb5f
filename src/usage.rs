use std::{iter::Enumerate, slice};

use log::debug;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::error::{DatasetErr, Result};

/// The partition a row belongs to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Usage {
    Training,
    Validation,
    Testing,
    #[default]
    Unused,
}

/// Row-usage predicate used to select the rows a computation runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFilter {
    /// Every row, regardless of its usage tag.
    All,
    /// Only rows tagged with the given usage.
    Only(Usage),
}

impl RowFilter {
    pub const TRAINING: RowFilter = RowFilter::Only(Usage::Training);

    #[inline]
    pub fn matches(self, usage: Usage) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::Only(tag) => tag == usage,
        }
    }

    /// Whether the rows selected by this filter change when usage tags do.
    #[inline]
    pub fn depends_on_usage(self) -> bool {
        !matches!(self, RowFilter::All)
    }
}

impl From<Usage> for RowFilter {
    fn from(value: Usage) -> Self {
        RowFilter::Only(value)
    }
}

/// Assigns every row exactly one [`Usage`] tag.
///
/// No split happens implicitly, all rows are [`Usage::Unused`] until tagged.
/// The partitioner keeps a generation counter that is bumped on every
/// mutation so cached statistics can tell when their row set moved.
#[derive(Debug, Clone, Default)]
pub struct RowPartitioner {
    tags: Vec<Usage>,
    generation: u64,
}

impl RowPartitioner {
    pub fn new(rows: usize) -> Self {
        Self {
            tags: vec![Usage::Unused; rows],
            generation: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The generation the rows selected by `filter` depend on, `None` when
    /// the filter ignores usage.
    #[inline]
    pub fn generation_for(&self, filter: RowFilter) -> Option<u64> {
        filter.depends_on_usage().then_some(self.generation)
    }

    /// Returns the tag of the row at `row`.
    ///
    /// # Errors
    /// `DatasetErr::OutOfRange` if `row >= len()`.
    pub fn usage(&self, row: usize) -> Result<Usage> {
        self.tags.get(row).copied().ok_or(DatasetErr::OutOfRange {
            what: "row",
            index: row,
            len: self.tags.len(),
        })
    }

    #[inline]
    pub fn tags(&self) -> &[Usage] {
        &self.tags
    }

    /// Tags a single row.
    ///
    /// # Errors
    /// `DatasetErr::OutOfRange` if `row >= len()`.
    pub fn set_usage(&mut self, row: usize, tag: Usage) -> Result<()> {
        let len = self.tags.len();
        let slot = self.tags.get_mut(row).ok_or(DatasetErr::OutOfRange {
            what: "row",
            index: row,
            len,
        })?;

        *slot = tag;
        self.generation += 1;
        Ok(())
    }

    /// Tags every row with `tag`.
    pub fn set_all_usage(&mut self, tag: Usage) {
        self.tags.fill(tag);
        self.generation += 1;
        debug!(rows = self.tags.len(); "all rows tagged {tag:?}");
    }

    /// Ascending indices of the rows tagged `tag`.
    ///
    /// The returned iterator is finite and can be restarted by cloning it.
    pub fn rows_with_usage(&self, tag: Usage) -> UsageRows<'_> {
        UsageRows {
            inner: self.tags.iter().enumerate(),
            filter: RowFilter::Only(tag),
        }
    }

    /// Ascending indices of the rows selected by `filter`.
    pub fn rows_matching(&self, filter: RowFilter) -> UsageRows<'_> {
        UsageRows {
            inner: self.tags.iter().enumerate(),
            filter,
        }
    }

    /// Number of rows tagged `tag`.
    pub fn count(&self, tag: Usage) -> usize {
        self.tags.iter().filter(|&&t| t == tag).count()
    }

    /// Tags contiguous blocks of rows in order: training first, then
    /// validation, then testing.
    ///
    /// Ratios are relative to their sum. Training and validation sizes are
    /// rounded to the nearest row and testing takes whatever remains.
    ///
    /// # Errors
    /// `DatasetErr::InvalidSplit` if a ratio is negative or not finite, or all
    /// of them are zero.
    pub fn split_sequential(&mut self, ratios: SplitRatios) -> Result<()> {
        let order: Vec<usize> = (0..self.tags.len()).collect();
        self.assign_split(&order, ratios)
    }

    /// Like [`split_sequential`](Self::split_sequential) but over a shuffled
    /// row order. The shuffle is driven only by `seed`.
    ///
    /// # Errors
    /// Same as [`split_sequential`](Self::split_sequential).
    pub fn split_random(&mut self, ratios: SplitRatios, seed: u64) -> Result<()> {
        let mut order: Vec<usize> = (0..self.tags.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);
        self.assign_split(&order, ratios)
    }

    fn assign_split(&mut self, order: &[usize], ratios: SplitRatios) -> Result<()> {
        let (training, validation, _) = ratios.counts(order.len())?;

        for (position, &row) in order.iter().enumerate() {
            self.tags[row] = if position < training {
                Usage::Training
            } else if position < training + validation {
                Usage::Validation
            } else {
                Usage::Testing
            };
        }

        self.generation += 1;
        debug!(
            training = self.count(Usage::Training),
            validation = self.count(Usage::Validation),
            testing = self.count(Usage::Testing);
            "rows split"
        );
        Ok(())
    }
}

/// Relative sizes of the training, validation and testing partitions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub training: f64,
    pub validation: f64,
    pub testing: f64,
}

impl SplitRatios {
    pub fn new(training: f64, validation: f64, testing: f64) -> Self {
        Self {
            training,
            validation,
            testing,
        }
    }

    /// Row counts for `(training, validation, testing)` out of `rows`.
    ///
    /// # Errors
    /// `DatasetErr::InvalidSplit` on negative, non-finite or all-zero ratios.
    pub fn counts(&self, rows: usize) -> Result<(usize, usize, usize)> {
        let ratios = [self.training, self.validation, self.testing];
        if ratios.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(DatasetErr::InvalidSplit(format!(
                "ratios must be finite and non-negative, got {ratios:?}"
            )));
        }

        let sum: f64 = ratios.iter().sum();
        if sum <= 0.0 {
            return Err(DatasetErr::InvalidSplit("ratios sum to zero".into()));
        }

        let share = |r: f64| (rows as f64 * r / sum).round() as usize;
        let training = share(self.training).min(rows);
        let validation = share(self.validation).min(rows - training);
        let testing = rows - training - validation;

        Ok((training, validation, testing))
    }
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self::new(0.6, 0.2, 0.2)
    }
}

/// Iterator over the row indices matching a [`RowFilter`].
#[derive(Debug, Clone)]
pub struct UsageRows<'a> {
    inner: Enumerate<slice::Iter<'a, Usage>>,
    filter: RowFilter,
}

impl Iterator for UsageRows<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let filter = self.filter;
        self.inner
            .by_ref()
            .find(|(_, tag)| filter.matches(**tag))
            .map(|(row, _)| row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_start_unused() {
        let rows = RowPartitioner::new(4);
        assert_eq!(rows.count(Usage::Unused), 4);
        assert_eq!(rows.rows_with_usage(Usage::Training).count(), 0);
    }

    #[test]
    fn set_usage_and_restart_iteration() {
        let mut rows = RowPartitioner::new(5);
        rows.set_usage(3, Usage::Testing).unwrap();
        rows.set_usage(1, Usage::Testing).unwrap();

        let it = rows.rows_with_usage(Usage::Testing);
        assert_eq!(it.clone().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(it.collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn set_usage_out_of_range() {
        let mut rows = RowPartitioner::new(2);
        assert!(matches!(
            rows.set_usage(2, Usage::Training),
            Err(DatasetErr::OutOfRange { what: "row", index: 2, len: 2 })
        ));
        assert_eq!(rows.generation(), 0);
    }

    #[test]
    fn mutations_bump_generation() {
        let mut rows = RowPartitioner::new(3);
        rows.set_all_usage(Usage::Training);
        rows.set_usage(0, Usage::Validation).unwrap();
        assert_eq!(rows.generation(), 2);
    }

    #[test]
    fn partition_is_disjoint_and_covering() {
        let mut rows = RowPartitioner::new(10);
        rows.split_random(SplitRatios::new(0.6, 0.2, 0.2), 7).unwrap();

        let total: usize = [Usage::Training, Usage::Validation, Usage::Testing, Usage::Unused]
            .into_iter()
            .map(|tag| rows.count(tag))
            .sum();
        assert_eq!(total, 10);
        assert_eq!(rows.count(Usage::Training), 6);
        assert_eq!(rows.count(Usage::Validation), 2);
        assert_eq!(rows.count(Usage::Testing), 2);
    }

    #[test]
    fn sequential_split_is_contiguous() {
        let mut rows = RowPartitioner::new(5);
        rows.split_sequential(SplitRatios::new(3.0, 1.0, 1.0)).unwrap();
        assert_eq!(
            rows.tags(),
            &[
                Usage::Training,
                Usage::Training,
                Usage::Training,
                Usage::Validation,
                Usage::Testing
            ]
        );
    }

    #[test]
    fn random_split_is_reproducible_by_seed() {
        let mut a = RowPartitioner::new(50);
        let mut b = RowPartitioner::new(50);
        a.split_random(SplitRatios::default(), 42).unwrap();
        b.split_random(SplitRatios::default(), 42).unwrap();
        assert_eq!(a.tags(), b.tags());
    }

    #[test]
    fn invalid_ratios_are_rejected() {
        let mut rows = RowPartitioner::new(5);
        assert!(matches!(
            rows.split_sequential(SplitRatios::new(0.0, 0.0, 0.0)),
            Err(DatasetErr::InvalidSplit(_))
        ));
        assert!(matches!(
            rows.split_sequential(SplitRatios::new(-1.0, 1.0, 1.0)),
            Err(DatasetErr::InvalidSplit(_))
        ));
        assert!(matches!(
            rows.split_sequential(SplitRatios::new(f64::NAN, 1.0, 1.0)),
            Err(DatasetErr::InvalidSplit(_))
        ));
    }

    #[test]
    fn all_filter_ignores_tags() {
        let mut rows = RowPartitioner::new(3);
        rows.set_usage(1, Usage::Testing).unwrap();
        assert_eq!(rows.rows_matching(RowFilter::All).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(!RowFilter::All.depends_on_usage());
        assert!(RowFilter::TRAINING.depends_on_usage());
        assert_eq!(rows.generation_for(RowFilter::All), None);
        assert_eq!(rows.generation_for(RowFilter::TRAINING), Some(1));
    }
}
