//! Integration tests for layered capture configuration.

use pps_gpio::{CaptureConfig, LineMask};
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_toml(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn file_overrides_defaults() {
    let file = write_toml(
        r#"
driver_name = "bench_pps"
lines_mask = 6
poll_interval_ms = 250
"#,
    );

    let config = CaptureConfig::load_from(file.path()).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.driver_name, "bench_pps");
    assert_eq!(config.mask(), LineMask::new(6));
    assert_eq!(config.poll_interval_ms, 250);
    // Unset keys keep their defaults.
    assert_eq!(config.line_names, CaptureConfig::default().line_names);
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = CaptureConfig::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, CaptureConfig::default());
}

#[test]
#[serial]
fn env_overrides_file() {
    let file = write_toml("lines_mask = 2\n");

    std::env::set_var("PPS_GPIO_LINES_MASK", "12");
    let config = CaptureConfig::load_from(file.path());
    std::env::remove_var("PPS_GPIO_LINES_MASK");

    assert_eq!(config.unwrap().lines_mask, 12);
}

#[test]
#[serial]
fn short_line_list_fails_validation() {
    let file = write_toml(r#"line_names = ["A", "B", "C"]"#);
    let config = CaptureConfig::load_from(file.path()).unwrap();
    assert!(config.validate().is_err());
}
