use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::{TempDir, tempdir};

const LOG: &str = "\
core | 2025-04-03T21:35:06.100Z [INFO ] starting
socket (7) | 2025-04-03T21:35:06.200Z [ERROR] connection refused {code: 111}
core | 2025-04-03T21:35:06.300Z [INFO ] idle
socket (7) | 2025-04-03T21:35:06.400Z [ERROR] tls handshake failed {
  code: 'EPROTO',
  retry: true
}
core | 2025-04-03T21:35:06.500Z [WARN ] shutting down
";

const CONFIG: &str = r#"
profile_name = "ops"

[fields]
case_insensitive = ["level", "component"]

[[filters]]
name = "errors"
filter = 'level == "error"'

[[filters]]
name = "socket_errors"
filter = '#errors AND component == "SOCKET"'
"#;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_log-filter")
}

fn write_file(path: &Path, content: &str) {
    fs::write(path, content).expect("failed to write test file");
}

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let dir = tempdir().expect("temp dir");
    let log = dir.path().join("app.log");
    let config = dir.path().join("filters.toml");
    write_file(&log, LOG);
    write_file(&config, CONFIG);
    (dir, log, config)
}

fn run(args: &[&str]) -> Output {
    Command::new(bin())
        .args(["--color", "never"])
        .args(args)
        .env_remove("LOG_FILTER_CONFIG")
        .output()
        .expect("command should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_search_prints_matching_entries() {
    let (_dir, log, _) = setup();
    let output = run(&[
        "search",
        log.to_str().expect("utf8 path"),
        "-f",
        r#"level == "error" AND "refused""#,
    ]);
    assert_success(&output);

    let text = stdout(&output);
    assert!(text.contains("matched 1 entry"), "got:\n{text}");
    assert!(text.contains("connection refused"));
    assert!(!text.contains("tls handshake"));
}

#[test]
fn test_search_count_reads_multiline_payloads() {
    let (_dir, log, _) = setup();
    let output = run(&[
        "search",
        log.to_str().expect("utf8 path"),
        "--filter",
        "payload.retry == true",
        "--count",
    ]);
    assert_success(&output);
    assert_eq!(stdout(&output), "1\n");
}

#[test]
fn test_search_json_reports_diagnostics() {
    let (_dir, log, _) = setup();
    let output = run(&[
        "-F",
        "json",
        "search",
        log.to_str().expect("utf8 path"),
        "-f",
        "payload.code > 100",
    ]);
    assert_success(&output);

    let value: Value = serde_json::from_str(&stdout(&output)).expect("valid json");
    let search = &value["search"][0];
    assert_eq!(search["entries_total"], 5);
    assert_eq!(search["matches"], 1);
    assert_eq!(search["entries"][0]["source_line_number"], 2);
    // three entries lack a payload, one has a text code
    assert_eq!(search["diagnostics"].as_array().map(Vec::len), Some(4));
}

#[test]
fn test_search_uses_saved_filters_from_config() {
    let (_dir, log, config) = setup();
    let output = run(&[
        "-c",
        config.to_str().expect("utf8 path"),
        "search",
        log.to_str().expect("utf8 path"),
        "-f",
        "#socket_errors",
        "--count",
    ]);
    assert_success(&output);
    assert_eq!(stdout(&output), "2\n");
}

#[test]
fn test_config_path_from_environment() {
    let (_dir, log, config) = setup();
    let output = Command::new(bin())
        .args(["search", log.to_str().expect("utf8 path"), "-f", "!#errors", "--count"])
        .env("LOG_FILTER_CONFIG", &config)
        .output()
        .expect("command should run");
    assert_success(&output);
    assert_eq!(stdout(&output), "3\n");
}

#[test]
fn test_invalid_filter_exits_with_error() {
    let (_dir, log, _) = setup();
    let output = run(&[
        "search",
        log.to_str().expect("utf8 path"),
        "-f",
        "status == 200",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid filter expression"), "stderr: {stderr}");
    assert!(stderr.contains("status"), "stderr: {stderr}");
}

#[test]
fn test_check_prints_canonical_form() {
    let (_dir, _, config) = setup();
    let output = run(&[
        "-c",
        config.to_str().expect("utf8 path"),
        "check",
        "#socket_errors && message matches 'conn.*'",
    ]);
    assert_success(&output);

    let text = stdout(&output);
    assert!(
        text.contains(r#"Canonical: #socket_errors AND message MATCHES "conn.*""#),
        "got:\n{text}"
    );
    assert!(text.contains("Aliases: errors, socket_errors"));
    assert!(text.contains("Fields: component, level, message"));
    assert!(text.contains("Status: ok"));
}

#[test]
fn test_check_fails_on_missing_alias() {
    let output = run(&["-F", "json", "check", "#nowhere OR \"x\""]);
    assert!(!output.status.success());

    let value: Value = serde_json::from_str(&stdout(&output)).expect("valid json");
    assert_eq!(
        value["check"]["errors"][0],
        "Could not find a filter in the library for alias: nowhere"
    );
}

#[test]
fn test_library_json_written_to_output_file() {
    let (dir, _, config) = setup();
    let out = dir.path().join("library.json");
    let output = run(&[
        "-c",
        config.to_str().expect("utf8 path"),
        "-F",
        "json",
        "-o",
        out.to_str().expect("utf8 path"),
        "library",
    ]);
    assert_success(&output);

    let file_content = fs::read_to_string(&out).expect("output file should exist");
    assert_eq!(file_content, stdout(&output));

    let value: Value = serde_json::from_str(&file_content).expect("valid json");
    assert_eq!(value["library"]["profile"], "ops");
    assert_eq!(value["library"]["filters"][1]["name"], "socket_errors");
    assert_eq!(
        value["library"]["filters"][1]["filter"],
        r#"#errors AND component == "SOCKET""#
    );
}

#[test]
fn test_broken_config_is_reported() {
    let dir = tempdir().expect("temp dir");
    let config = dir.path().join("bad.toml");
    write_file(&config, "[[filters]]\nname = \"a\"\nfilter = \"#b\"\n");

    let output = run(&["-c", config.to_str().expect("utf8 path"), "library"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load saved filters"), "stderr: {stderr}");
}

#[test]
fn test_color_rules_tag_matched_entries() {
    let (dir, log, _) = setup();
    let config = dir.path().join("colors.toml");
    write_file(
        &config,
        r##"
[fields]
case_insensitive = ["level"]

[[filters]]
name = "errors"
filter = 'level == "error"'

[[color_rules]]
name = "payloads"
filter = "has_payload"
foreground = "cyan"
priority = 2

[[color_rules]]
name = "failures"
filter = "#errors"
foreground = "red"
background = "#101010"
priority = 1
"##,
    );

    let output = run(&[
        "-c",
        config.to_str().expect("utf8 path"),
        "-F",
        "json",
        "search",
        log.to_str().expect("utf8 path"),
        "-f",
        "has_payload OR level == \"warn\"",
    ]);
    assert_success(&output);
    let value: Value = serde_json::from_str(&stdout(&output)).expect("valid json");
    let entries = value["search"][0]["entries"].as_array().expect("entries");
    let tagged: Vec<_> = entries
        .iter()
        .map(|entry| (entry["source_line_number"].clone(), entry["color_rule"].clone()))
        .collect();
    assert_eq!(
        tagged,
        vec![
            (Value::from(2), Value::from("failures")),
            (Value::from(4), Value::from("failures")),
            (Value::from(8), Value::Null),
        ]
    );

    let output = run(&["-c", config.to_str().expect("utf8 path"), "library"]);
    assert_success(&output);
    let text = stdout(&output);
    assert!(text.contains("Color rules (2 total)"), "got:\n{text}");
    assert!(text.contains("Red"), "got:\n{text}");
}

#[test]
fn test_unknown_color_is_reported() {
    let dir = tempdir().expect("temp dir");
    let config = dir.path().join("bad.toml");
    write_file(
        &config,
        "[[color_rules]]\nname = \"a\"\nfilter = \"has_payload\"\nbackground = \"plaid\"\n",
    );

    let output = run(&["-c", config.to_str().expect("utf8 path"), "library"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load color rules"), "stderr: {stderr}");
}

#[test]
fn test_runaway_nesting_is_rejected() {
    let filter = format!("{}has_payload", "!".repeat(10_000));
    let output = run(&["check", &filter]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("maximum depth"), "stderr: {stderr}");
}
