use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

use log::{debug, trace};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::{
    columns::{ColumnRegistry, Role},
    config::LoadOptions,
    error::{DatasetErr, Result},
    usage::{RowFilter, RowPartitioner, Usage},
};

/// Owns a numeric matrix together with its column metadata and row partition.
///
/// The matrix is `rows x columns` and never changes shape once built. Cell
/// values only change through [`transform_column`](Self::transform_column),
/// which bumps a per-column version so cached statistics and fitted transforms
/// can detect that they were computed against older data.
///
/// Every store, clones included, carries a process-unique id so a cache or a
/// transform built against one store is never mistaken as current for another.
#[derive(Debug)]
pub struct DatasetStore {
    id: u64,
    data: Array2<f64>,
    columns: ColumnRegistry,
    rows: RowPartitioner,
    versions: Vec<u64>,
}

static STORE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_store_id() -> u64 {
    STORE_COUNTER.fetch_add(1, Ordering::Relaxed)
}

impl Clone for DatasetStore {
    fn clone(&self) -> Self {
        Self {
            id: next_store_id(),
            data: self.data.clone(),
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            versions: self.versions.clone(),
        }
    }
}

impl DatasetStore {
    /// Wraps an existing matrix with default column names.
    pub fn from_array(data: Array2<f64>) -> Self {
        let columns = ColumnRegistry::new(data.ncols());
        Self::assemble(data, columns)
    }

    /// Builds a store from in-memory rows.
    ///
    /// # Errors
    /// `DatasetErr::Schema` if the rows do not all have the same width.
    pub fn from_rows<R>(rows: &[R]) -> Result<Self>
    where
        R: AsRef<[f64]>,
    {
        let width = rows.first().map_or(0, |r| r.as_ref().len());
        let mut flat = Vec::with_capacity(width * rows.len());

        for (row, cells) in rows.iter().enumerate() {
            let cells = cells.as_ref();
            if cells.len() != width {
                return Err(DatasetErr::Schema {
                    row,
                    got: cells.len(),
                    expected: width,
                });
            }
            flat.extend_from_slice(cells);
        }

        let data = into_matrix(flat, rows.len(), width)?;
        Ok(Self::from_array(data))
    }

    /// Parses delimited numeric text.
    ///
    /// Blank lines are skipped. The load is all-or-nothing: on any failure no
    /// store is produced.
    ///
    /// # Errors
    /// - `DatasetErr::Io` if reading fails.
    /// - `DatasetErr::Parse` on a cell that is not a finite number.
    /// - `DatasetErr::Schema` on a row whose width differs from the first row
    ///   (or from the header).
    /// - `DatasetErr::DuplicateName` if the header repeats a name.
    pub fn load<R: BufRead>(reader: R, options: &LoadOptions) -> Result<Self> {
        let mut header: Option<Vec<String>> = None;
        let mut width: Option<usize> = None;
        let mut flat = Vec::new();
        let mut row = 0;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            if options.has_header && header.is_none() {
                let names: Vec<String> = options
                    .delimiter
                    .split(&line)
                    .map(str::to_string)
                    .collect();
                width = Some(names.len());
                header = Some(names);
                continue;
            }

            let start = flat.len();
            for (column, token) in options.delimiter.split(&line).enumerate() {
                let value = token
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| DatasetErr::Parse {
                        row,
                        column,
                        token: token.to_string(),
                    })?;
                flat.push(value);
            }

            let got = flat.len() - start;
            let expected = *width.get_or_insert(got);
            if got != expected {
                return Err(DatasetErr::Schema { row, got, expected });
            }

            row += 1;
        }

        let width = width.unwrap_or(0);
        let data = into_matrix(flat, row, width)?;
        let columns = match header {
            Some(names) => ColumnRegistry::with_names(names)?,
            None => ColumnRegistry::new(width),
        };

        debug!(rows = row, columns = width; "dataset loaded");
        Ok(Self::assemble(data, columns))
    }

    /// Parses delimited numeric text held in memory.
    ///
    /// # Errors
    /// Same as [`load`](Self::load).
    pub fn load_str(source: &str, options: &LoadOptions) -> Result<Self> {
        Self::load(source.as_bytes(), options)
    }

    /// Opens and parses a delimited file.
    ///
    /// # Errors
    /// `DatasetErr::Io` if the file cannot be opened, otherwise same as
    /// [`load`](Self::load).
    pub fn load_path(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        debug!("loading {}", path.display());
        let file = File::open(path)?;
        Self::load(BufReader::new(file), options)
    }

    fn assemble(data: Array2<f64>, columns: ColumnRegistry) -> Self {
        let rows = RowPartitioner::new(data.nrows());
        let versions = vec![0; data.ncols()];
        Self {
            id: next_store_id(),
            data,
            columns,
            rows,
            versions,
        }
    }

    /// Identity of this store instance. A clone gets a new one.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    pub fn columns(&self) -> &ColumnRegistry {
        &self.columns
    }

    #[inline]
    pub fn columns_mut(&mut self) -> &mut ColumnRegistry {
        &mut self.columns
    }

    #[inline]
    pub fn rows(&self) -> &RowPartitioner {
        &self.rows
    }

    #[inline]
    pub fn rows_mut(&mut self) -> &mut RowPartitioner {
        &mut self.rows
    }

    #[inline]
    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Shorthand for `columns_mut().set_name(..)`.
    pub fn set_name(&mut self, column: usize, name: impl Into<String>) -> Result<()> {
        self.columns.set_name(column, name)
    }

    /// Shorthand for `columns_mut().set_role(..)`.
    pub fn set_role(&mut self, column: usize, role: Role) -> Result<()> {
        self.columns.set_role(column, role)
    }

    /// Shorthand for `rows_mut().set_usage(..)`.
    pub fn set_usage(&mut self, row: usize, tag: Usage) -> Result<()> {
        self.rows.set_usage(row, tag)
    }

    /// Shorthand for `rows_mut().set_all_usage(..)`.
    pub fn set_all_usage(&mut self, tag: Usage) {
        self.rows.set_all_usage(tag)
    }

    fn check_column(&self, column: usize) -> Result<()> {
        if column >= self.column_count() {
            return Err(DatasetErr::OutOfRange {
                what: "column",
                index: column,
                len: self.column_count(),
            });
        }
        Ok(())
    }

    /// Number of times `column` has been transformed.
    ///
    /// # Errors
    /// `DatasetErr::OutOfRange` for an invalid column.
    pub fn column_version(&self, column: usize) -> Result<u64> {
        self.check_column(column)?;
        Ok(self.versions[column])
    }

    /// Borrowed view of every cell in `column`.
    ///
    /// # Errors
    /// `DatasetErr::OutOfRange` for an invalid column.
    pub fn column_view(&self, column: usize) -> Result<ArrayView1<'_, f64>> {
        self.check_column(column)?;
        Ok(self.data.column(column))
    }

    /// Cell at (`row`, `column`).
    ///
    /// # Errors
    /// `DatasetErr::OutOfRange` for an invalid row or column.
    pub fn value(&self, row: usize, column: usize) -> Result<f64> {
        self.check_column(column)?;
        self.rows.usage(row)?;
        Ok(self.data[[row, column]])
    }

    /// Values of `column` for the rows selected by `filter`, in row order.
    ///
    /// # Errors
    /// `DatasetErr::OutOfRange` for an invalid column.
    pub fn values_of(&self, column: usize, filter: RowFilter) -> Result<Vec<f64>> {
        self.check_column(column)?;
        let cells = self.data.column(column);
        Ok(self.rows.rows_matching(filter).map(|row| cells[row]).collect())
    }

    /// Applies `f` to every cell of `column` in place.
    ///
    /// Anything cached against the previous contents of the column becomes
    /// stale.
    ///
    /// # Errors
    /// `DatasetErr::OutOfRange` for an invalid column.
    pub fn transform_column<F>(&mut self, column: usize, f: F) -> Result<()>
    where
        F: FnMut(f64) -> f64,
    {
        self.check_column(column)?;
        self.data.column_mut(column).mapv_inplace(f);
        self.versions[column] += 1;
        trace!(column = column, version = self.versions[column]; "column transformed");
        Ok(())
    }

    /// Matrix of the [`Role::Input`] columns for the rows selected by `filter`.
    pub fn input_matrix(&self, filter: RowFilter) -> Array2<f64> {
        self.role_matrix(Role::Input, filter)
    }

    /// Matrix of the [`Role::Target`] columns for the rows selected by `filter`.
    pub fn target_matrix(&self, filter: RowFilter) -> Array2<f64> {
        self.role_matrix(Role::Target, filter)
    }

    fn role_matrix(&self, role: Role, filter: RowFilter) -> Array2<f64> {
        let rows: Vec<usize> = self.rows.rows_matching(filter).collect();
        let columns = self.columns.columns_with_role(role);
        self.data.select(Axis(0), &rows).select(Axis(1), &columns)
    }
}

fn into_matrix(flat: Vec<f64>, rows: usize, width: usize) -> Result<Array2<f64>> {
    let got = flat.len();
    Array2::from_shape_vec((rows, width), flat).map_err(|_| DatasetErr::Schema {
        row: rows,
        got,
        expected: rows * width,
    })
}
