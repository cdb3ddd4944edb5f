use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    columns::Role,
    error::Result,
    scaling::{Method, ScalingEngine},
    stats::Statistics,
    store::DatasetStore,
    usage::{RowFilter, SplitRatios, Usage},
};

/// Cell separator of a delimited source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    #[default]
    Comma,
    Semicolon,
    Tab,
    /// Any run of spaces or tabs.
    Whitespace,
    Char(char),
}

impl Delimiter {
    /// Splits `line` into trimmed cells.
    pub fn split<'a>(self, line: &'a str) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        let sep = match self {
            Delimiter::Whitespace => return Box::new(line.split_whitespace()),
            Delimiter::Comma => ',',
            Delimiter::Semicolon => ';',
            Delimiter::Tab => '\t',
            Delimiter::Char(c) => c,
        };

        Box::new(line.split(sep).map(str::trim))
    }
}

/// How a delimited source is read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub delimiter: Delimiter,
    /// The first non-blank line holds column names.
    pub has_header: bool,
}

impl LoadOptions {
    pub fn new(delimiter: Delimiter) -> Self {
        Self {
            delimiter,
            has_header: false,
        }
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }
}

/// Name and role for one column of a [`DatasetConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

/// Split applied after the bulk usage tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(flatten)]
    pub ratios: SplitRatios,
    /// Shuffle seed. Contiguous split when absent.
    pub seed: Option<u64>,
}

/// A dataset description read from JSON.
///
/// ```json
/// {
///   "path": "data/simple_pattern_recognition.csv",
///   "options": { "delimiter": "comma", "has_header": false },
///   "columns": [
///     { "name": "x1", "role": "input" },
///     { "name": "x2", "role": "input" },
///     { "name": "y", "role": "target" }
///   ],
///   "usage": "training",
///   "scaling": "min_max"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub options: LoadOptions,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    #[serde(default = "default_usage")]
    pub usage: Usage,
    #[serde(default)]
    pub split: Option<SplitConfig>,
    #[serde(default = "default_method")]
    pub scaling: Method,
    /// Rows the scaling statistics are fitted on.
    #[serde(default = "default_fit_rows")]
    pub fit_rows: RowFilter,
}

fn default_usage() -> Usage {
    Usage::Training
}

fn default_method() -> Method {
    Method::MinMax
}

fn default_fit_rows() -> RowFilter {
    RowFilter::TRAINING
}

impl DatasetConfig {
    /// Parses a description from a JSON string.
    ///
    /// # Errors
    /// `DatasetErr::Config` if the JSON is malformed or a field has the wrong type.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Reads and parses a description from a JSON file.
    ///
    /// Relative dataset paths are resolved against the file's directory.
    ///
    /// # Errors
    /// `DatasetErr::Io` if the file cannot be read, `DatasetErr::Config` if it
    /// cannot be parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::from_json(&fs::read_to_string(path)?)?;

        if config.path.is_relative() {
            if let Some(dir) = path.parent() {
                config.path = dir.join(&config.path);
            }
        }

        Ok(config)
    }

    /// Applies the column names/roles, the bulk usage tag and the optional
    /// split to an already loaded store.
    ///
    /// # Errors
    /// - `DatasetErr::OutOfRange` if more columns are described than loaded.
    /// - `DatasetErr::DuplicateName` on a name collision.
    /// - `DatasetErr::InvalidSplit` on bad split ratios.
    pub fn configure(&self, store: &mut DatasetStore) -> Result<()> {
        for (index, column) in self.columns.iter().enumerate() {
            store.set_name(index, column.name.as_str())?;
            store.set_role(index, column.role)?;
        }

        store.set_all_usage(self.usage);
        if let Some(split) = self.split {
            match split.seed {
                Some(seed) => store.rows_mut().split_random(split.ratios, seed)?,
                None => store.rows_mut().split_sequential(split.ratios)?,
            }
        }

        Ok(())
    }

    /// Loads the dataset, configures it and scales its input columns.
    ///
    /// # Errors
    /// Any error from loading, [`configure`](Self::configure) or fitting.
    pub fn prepare(&self) -> Result<Prepared> {
        let mut store = DatasetStore::load_path(&self.path, &self.options)?;
        self.configure(&mut store)?;

        let mut scaling = ScalingEngine::new();
        let input_statistics =
            scaling.fit_and_apply_to_all_inputs(&mut store, self.fit_rows, self.scaling)?;

        Ok(Prepared {
            store,
            scaling,
            input_statistics,
        })
    }
}

/// A scaled dataset ready for a training stage.
#[derive(Debug)]
pub struct Prepared {
    pub store: DatasetStore,
    pub scaling: ScalingEngine,
    /// Statistics of the input columns, in column order.
    pub input_statistics: Vec<Arc<Statistics>>,
}
