use std::{env, path::PathBuf};

use anyhow::Context;
use log::info;
use serde_json::json;

use dataset_prep::{DatasetConfig, Role};

const DEFAULT_CONFIG: &str = "data/simple_pattern_recognition.json";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let config = DatasetConfig::from_json_file(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    info!("loading {}", config.path.display());

    let prepared = config
        .prepare()
        .with_context(|| format!("preparing {}", config.path.display()))?;
    let store = &prepared.store;

    info!(
        rows = store.row_count(),
        columns = store.column_count();
        "dataset ready"
    );

    let columns = store.columns();
    let inputs = columns.columns_with_role(Role::Input);
    let statistics: Vec<_> = inputs
        .iter()
        .zip(&prepared.input_statistics)
        .map(|(&index, stats)| {
            json!({
                "column": columns.get(index).map(|c| c.name.as_str()).unwrap_or_default(),
                "statistics": stats.as_ref(),
            })
        })
        .collect();

    let report = json!({
        "rows": store.row_count(),
        "inputs": columns.names_with_role(Role::Input),
        "targets": columns.names_with_role(Role::Target),
        "input_statistics": statistics,
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
