//! Tabular dataset ingestion and normalization.
//!
//! A [`DatasetStore`] owns the numeric matrix loaded from delimited text
//! together with its [`ColumnRegistry`] (names and roles) and
//! [`RowPartitioner`] (usage tags). The [`StatisticsEngine`] computes
//! per-column statistics over a row subset and the [`ScalingEngine`] fits,
//! applies and inverts normalization transforms on top of them.
//!
//! ```
//! use dataset_prep::{DatasetStore, LoadOptions, Role, RowFilter, ScalingEngine, Usage};
//!
//! let mut store = DatasetStore::load_str("1,2,0\n3,4,1\n5,6,0\n", &LoadOptions::default())?;
//! for (index, name) in ["x1", "x2", "y"].into_iter().enumerate() {
//!     store.set_name(index, name)?;
//! }
//! store.set_role(0, Role::Input)?;
//! store.set_role(1, Role::Input)?;
//! store.set_role(2, Role::Target)?;
//! store.set_all_usage(Usage::Training);
//!
//! let mut scaling = ScalingEngine::new();
//! let stats = scaling.fit_and_apply_min_max_to_all_inputs(&mut store, RowFilter::TRAINING)?;
//! assert_eq!(stats[0].maximum, 5.0);
//! assert_eq!(store.values_of(0, RowFilter::All)?, vec![0.0, 0.5, 1.0]);
//! # Ok::<(), dataset_prep::DatasetErr>(())
//! ```

pub mod columns;
pub mod config;
pub mod error;
pub mod scaling;
pub mod stats;
pub mod store;
pub mod usage;

pub use columns::{Column, ColumnRegistry, Role};
pub use config::{DatasetConfig, Delimiter, LoadOptions};
pub use error::{DatasetErr, Result};
pub use scaling::{Method, ScalingEngine, ScalingTransform};
pub use stats::{Statistics, StatisticsEngine};
pub use store::DatasetStore;
pub use usage::{RowFilter, RowPartitioner, SplitRatios, Usage};
