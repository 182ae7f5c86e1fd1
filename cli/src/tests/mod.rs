use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;


const EVIDENCE: &str = "src/tests/testdata/evidence";

/// Returns a `bupsum` command that doesn't see the config file in the
/// user's home directory.
fn bupsum(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bupsum").unwrap();
    cmd.env("HOME", home.path());
    cmd
}

#[test]
fn cli_help() {
    let temp_dir = TempDir::new().unwrap();

    bupsum(&temp_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output <OUTPUT_FILE>"))
        .stdout(predicate::str::contains("[ROOT_DIR]"));
}

#[test]
fn cli_output_is_required() {
    let temp_dir = TempDir::new().unwrap();

    bupsum(&temp_dir)
        .arg(EVIDENCE)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--output <OUTPUT_FILE>"));
}

#[test]
fn cli_root_dir_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let report = temp_dir.child("report.csv");

    bupsum(&temp_dir)
        .arg("--output")
        .arg(report.path())
        .arg("src/tests/testdata/does-not-exist")
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with(
            "error: can't open `src/tests/testdata/does-not-exist`",
        ));

    report.assert(predicate::path::missing());
}

#[test]
fn cli_root_dir_is_a_file() {
    let temp_dir = TempDir::new().unwrap();
    let report = temp_dir.child("report.csv");

    bupsum(&temp_dir)
        .arg("--output")
        .arg(report.path())
        .arg("src/tests/testdata/evidence/WKS-01/clean.bup")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("is not a directory"));
}

#[test]
fn cli_output_not_writable() {
    let temp_dir = TempDir::new().unwrap();
    let report = temp_dir.child("missing-dir/report.csv");

    bupsum(&temp_dir)
        .arg("--output")
        .arg(report.path())
        .arg(EVIDENCE)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error: can't create"));
}

#[test]
fn cli_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.child("config.toml");
    let report = temp_dir.child("report.csv");

    config.write_str("[summary]\nthreads = \"many\"\n").unwrap();

    bupsum(&temp_dir)
        .arg("--config")
        .arg(config.path())
        .arg("--output")
        .arg(report.path())
        .arg(EVIDENCE)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error: invalid config file"));
}
