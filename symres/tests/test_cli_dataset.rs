use std::io::Write;
use std::process::Command;

use symres::export::Report;
use symres::symbols::Dataset;

const DATASET: &str = r#"{
  "partitions": [
    {
      "id": 0,
      "samples": [
        { "stack": [{ "function": "parse", "file": "p.rs", "line": 4 },
                    { "function": "main", "file": "m.rs", "line": 1 }], "values": [2, 20] },
        { "stack": [{ "function": "main", "file": "m.rs", "line": 1 }], "values": [1, 10] }
      ]
    },
    {
      "id": 1,
      "samples": [
        { "stack": [{ "function": "parse", "file": "p.rs", "line": 4 },
                    { "function": "main", "file": "m.rs", "line": 1 }], "values": [3, 30] }
      ]
    }
  ]
}"#;

fn dataset_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes()).expect("Failed to write dataset");
    file
}

fn symres(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_symres"))
        .args(args)
        .output()
        .expect("Failed to run symres")
}

#[test]
fn test_folded_output() {
    let input = dataset_file(DATASET);
    let out = symres(&["--input", input.path().to_str().unwrap(), "--format", "folded"]);

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).expect("Invalid UTF-8");
    assert_eq!(stdout, "main 1\nmain;parse 5\n");
}

#[test]
fn test_folded_second_value() {
    let input = dataset_file(DATASET);
    let out =
        symres(&["--input", input.path().to_str().unwrap(), "--format", "folded", "--value", "1"]);

    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "main 10\nmain;parse 50\n");
}

#[test]
fn test_profile_written_to_file() {
    let input = dataset_file(DATASET);
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = dir.path().join("profile.json");

    let out = symres(&[
        "--input",
        input.path().to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
        "--concurrency",
        "1",
    ]);
    assert!(out.status.success());

    let json_str = std::fs::read_to_string(&output).expect("Output missing");
    let parsed: serde_json::Value = serde_json::from_str(&json_str).expect("Invalid JSON");
    assert_eq!(parsed["samples"].as_array().map(Vec::len), Some(2));
    assert_eq!(parsed["string_table"][0], "");
}

#[test]
fn test_tree_output() {
    let input = dataset_file(DATASET);
    let out = symres(&["--input", input.path().to_str().unwrap(), "--format", "tree"]);

    assert!(out.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&out.stdout).expect("Invalid JSON");
    assert_eq!(parsed["total"], 6);
    assert_eq!(parsed["children"][0]["function"], "main");
    assert_eq!(parsed["children"][0]["self"], 1);
}

#[test]
fn test_invalid_dataset_fails() {
    let input = dataset_file("{ \"partitions\": 3 }");
    let out = symres(&["--input", input.path().to_str().unwrap()]);

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Invalid dataset"));
}

#[test]
fn test_missing_input_is_usage_error() {
    let out = symres(&[]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_report_export_matches_dataset() {
    let dataset = Dataset::from_json(DATASET).expect("Invalid dataset");
    assert_eq!(dataset.sample_count(), 3);

    let mut builder = symres::merge::TreeBuilder::new();
    for (signature, values) in dataset.resolved_samples() {
        builder.insert(&signature, values[0]);
    }
    let mut buffer = Vec::new();
    Report::Folded(builder.build().to_folded()).export(&mut buffer).expect("Failed to export");
    assert_eq!(String::from_utf8(buffer).expect("Invalid UTF-8"), "main 1\nmain;parse 5\n");
}
