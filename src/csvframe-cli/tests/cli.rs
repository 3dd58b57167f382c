use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn fixtures() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("people.csv"),
        "id,name,age\n1,Gina,23\n2,Yulia,25\n3,Denis,30\n",
    )
    .unwrap();
    fs::write(dir.path().join("orders.csv"), "id,amount\n1,10\n2,5\n").unwrap();
    fs::write(dir.path().join("gaps.csv"), "id,name,age\n1,Gina,\n2,Yulia,25\n").unwrap();
    dir
}

fn csvframe(dir: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_csvframe"));
    cmd.current_dir(dir.path())
        .env_remove("CSVFRAME_FORMAT")
        .env_remove("CSVFRAME_SEPARATOR")
        .env_remove("CSVFRAME_HAS_HEADER");
    cmd
}

#[test]
fn test_filter_sort_select_as_table() {
    let dir = fixtures();
    csvframe(&dir)
        .args([
            "people.csv",
            "--filter",
            "age > 23",
            "--sort",
            "age:desc",
            "--select",
            "name",
            "--select",
            "age",
        ])
        .assert()
        .success()
        .stdout("age  name\n30   Denis\n25   Yulia\n");
}

#[test]
fn test_sql_flag_prints_compiled_query() {
    let dir = fixtures();
    csvframe(&dir)
        .args(["people.csv", "--filter", "age > 20", "--sql"])
        .assert()
        .success()
        .stdout("SELECT people.* FROM people WHERE age > 20\n");
}

#[test]
fn test_shape_and_columns() {
    let dir = fixtures();
    csvframe(&dir)
        .args(["people.csv", "--shape"])
        .assert()
        .success()
        .stdout("(3, 3)\n");
    csvframe(&dir)
        .args(["people.csv", "--columns"])
        .assert()
        .success()
        .stdout("age\nid\nname\n");
}

#[test]
fn test_join_as_csv() {
    let dir = fixtures();
    csvframe(&dir)
        .args([
            "people.csv",
            "--join",
            "orders.csv:id",
            "--select",
            "name",
            "--select",
            "amount",
            "--sort",
            "amount",
            "--format",
            "csv",
        ])
        .assert()
        .success()
        .stdout("amount,name\n5,Yulia\n10,Gina\n");
}

#[test]
fn test_head_as_json() {
    let dir = fixtures();
    let output = csvframe(&dir)
        .args(["people.csv", "--sort", "id", "--head", "1", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        parsed,
        serde_json::json!([{"id": 1, "name": "Gina", "age": 23}])
    );
}

#[test]
fn test_fill_na_written_to_file() {
    let dir = fixtures();
    csvframe(&dir)
        .args(["gaps.csv", "--fill-na", "age=0", "-o", "filled.csv"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    assert_eq!(
        fs::read_to_string(dir.path().join("filled.csv")).unwrap(),
        "age,id,name\n0,1,Gina\n25,2,Yulia\n"
    );
}

#[test]
fn test_format_from_config_file() {
    let dir = fixtures();
    fs::write(dir.path().join("csvframe.toml"), "[output]\nformat = \"csv\"\n").unwrap();
    csvframe(&dir)
        .args(["people.csv", "--select", "name", "--tail", "1"])
        .assert()
        .success()
        .stdout("name\nDenis\n");
}

#[test]
fn test_missing_input_fails() {
    let dir = fixtures();
    csvframe(&dir)
        .arg("missing.csv")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_malformed_join_fails() {
    let dir = fixtures();
    csvframe(&dir)
        .args(["people.csv", "--join", "orders.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected FILE:KEY"));
}
