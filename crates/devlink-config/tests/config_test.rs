#![allow(clippy::unwrap_used)]

use devlink_config::{Config, LogFormat, Requeue, load_config_from, save_config_to};
use pretty_assertions::assert_eq;

#[test]
fn missing_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.workers, 2);
    assert_eq!(config.log.format, LogFormat::Text);
}

#[test]
fn file_values_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
node_name = "edge-7"
workers = 4

[requeue]
max_delay_ms = 2000

[log]
format = "json"
"#,
    )
    .unwrap();

    let config = load_config_from(&path).unwrap();
    assert_eq!(config.node_name, "edge-7");
    assert_eq!(config.workers, 4);
    assert_eq!(config.requeue.base_delay_ms, 5);
    assert_eq!(config.requeue.max_delay_ms, 2000);
    assert_eq!(config.log.format, LogFormat::Json);
    assert_eq!(config.log.level, "warn");
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let config = Config {
        node_name: "edge-3".into(),
        workers: 8,
        requeue: Requeue {
            base_delay_ms: 50,
            max_delay_ms: 5000,
        },
        ..Config::default()
    };

    save_config_to(&config, &path).unwrap();
    assert_eq!(load_config_from(&path).unwrap(), config);
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "workers = \"many\"").unwrap();
    assert!(load_config_from(&path).is_err());
}
