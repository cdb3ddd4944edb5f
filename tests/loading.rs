use std::{fs, path::PathBuf, process};

use dataset_prep::{
    DatasetConfig, DatasetErr, DatasetStore, Delimiter, LoadOptions, Method, Role, RowFilter,
    Usage,
};

/// Scratch directory unique to this test process and `name`.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("dataset_prep-{}-{name}", process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn load_path_reads_whitespace_file() {
    let dir = scratch_dir("whitespace");
    let path = dir.join("data.dat");
    fs::write(&path, "0.1 0.2 1\n0.3 0.4 0\n0.5 0.6 1\n0.7 0.8 0\n").unwrap();

    let store = DatasetStore::load_path(&path, &LoadOptions::new(Delimiter::Whitespace)).unwrap();
    assert_eq!(store.row_count(), 4);
    assert_eq!(store.column_count(), 3);
    assert_eq!(store.values_of(2, RowFilter::All).unwrap(), vec![1.0, 0.0, 1.0, 0.0]);

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn missing_file_is_an_io_error() {
    let path = std::env::temp_dir().join(format!("dataset_prep-{}-missing.csv", process::id()));
    assert!(matches!(
        DatasetStore::load_path(&path, &LoadOptions::default()),
        Err(DatasetErr::Io(_))
    ));
}

#[test]
fn shipped_sample_loads() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/simple_pattern_recognition.csv");
    let store = DatasetStore::load_path(&path, &LoadOptions::default()).unwrap();
    assert_eq!(store.column_count(), 3);
    assert!(store.row_count() > 0);
}

#[test]
fn config_drives_the_whole_preparation() {
    let dir = scratch_dir("config");
    fs::write(
        dir.join("points.csv"),
        "x1;x2;y\n1;10;0\n2;20;1\n3;30;0\n4;40;1\n5;50;0\n",
    )
    .unwrap();
    fs::write(
        dir.join("points.json"),
        r#"{
            "path": "points.csv",
            "options": { "delimiter": "semicolon", "has_header": true },
            "columns": [
                { "name": "a", "role": "input" },
                { "name": "b", "role": "input" },
                { "name": "label", "role": "target" }
            ],
            "split": { "training": 3, "validation": 1, "testing": 1 }
        }"#,
    )
    .unwrap();

    let config = DatasetConfig::from_json_file(dir.join("points.json")).unwrap();
    assert_eq!(config.scaling, Method::MinMax);

    let prepared = config.prepare().unwrap();
    let store = &prepared.store;

    assert_eq!(store.columns().names_with_role(Role::Input), vec!["a", "b"]);
    assert_eq!(store.rows().count(Usage::Training), 3);
    assert_eq!(store.rows().count(Usage::Validation), 1);
    assert_eq!(store.rows().count(Usage::Testing), 1);

    // sequential split: rows 0..3 train, so fitted on [1, 3]
    assert_eq!(prepared.input_statistics[0].maximum, 3.0);
    assert_eq!(
        store.values_of(0, RowFilter::All).unwrap(),
        vec![0.0, 0.5, 1.0, 1.5, 2.0]
    );
    assert_eq!(prepared.scaling.invert(1, 1.0).unwrap(), 30.0);

    let x = store.input_matrix(RowFilter::TRAINING);
    let y = store.target_matrix(RowFilter::TRAINING);
    assert_eq!(x.dim(), (3, 2));
    assert_eq!(y.dim(), (3, 1));

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn config_with_too_many_columns_is_rejected() {
    let config = DatasetConfig::from_json(
        r#"{ "path": "unused.csv", "columns": [{ "name": "a" }, { "name": "b" }] }"#,
    )
    .unwrap();
    let mut store = DatasetStore::from_rows(&[[1.0]]).unwrap();

    assert!(matches!(
        config.configure(&mut store),
        Err(DatasetErr::OutOfRange { what: "column", index: 1, .. })
    ));
}

#[test]
fn statistics_serialize_for_reporting() {
    let mut store = DatasetStore::from_rows(&[[1.0], [3.0], [5.0]]).unwrap();
    store.set_role(0, Role::Input).unwrap();
    store.set_all_usage(Usage::Training);

    let mut scaling = dataset_prep::ScalingEngine::new();
    let stats = scaling
        .fit_and_apply_min_max_to_all_inputs(&mut store, RowFilter::TRAINING)
        .unwrap();

    let value = serde_json::to_value(stats[0].as_ref()).unwrap();
    assert_eq!(value["minimum"], 1.0);
    assert_eq!(value["standard_deviation"], 2.0);
    assert_eq!(value["count"], 3);

    let transform = serde_json::to_value(scaling.transform(0).unwrap()).unwrap();
    assert_eq!(transform["method"], "min_max");
}
