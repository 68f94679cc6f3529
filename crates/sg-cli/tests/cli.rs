//! CLI command integration tests. The serve subcommand is exercised by the
//! in-process gateway and server tests; these cover the offline commands.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn sg_cmd() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("sg").unwrap()
}

#[test]
fn codes_prints_status_table() {
    sg_cmd()
        .arg("codes")
        .assert()
        .success()
        .stdout(predicate::str::contains("200  ok"))
        .stdout(predicate::str::contains("209  peer disconnected"))
        .stdout(predicate::str::contains("404  recipient offline"))
        .stdout(predicate::str::contains("405  message exceeds 1950 characters"));
}

#[test]
fn parse_prints_section_and_frame_summary() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("steady.wave");
    std::fs::write(&input, "w:0,1,8=10,20,4,1,1/50.00-0,75.00-1,100.00-0,50.00-1\n").unwrap();

    sg_cmd()
        .arg("parse")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("name:     steady"))
        .stdout(predicate::str::contains("sections: 1"))
        .stdout(predicate::str::contains("mode 1, 4 points"))
        .stdout(predicate::str::contains("frames:   4"));
}

#[test]
fn parse_honors_name_override() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("x.wave");
    std::fs::write(&input, "w:0,1,8=10,20,2,1,1/50.00-0,60.00-0").unwrap();

    sg_cmd()
        .args(["parse", "--name", "renamed"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("name:     renamed"));
}

#[test]
fn parse_rejects_malformed_waveform() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("broken.wave");
    std::fs::write(&input, "this is not a waveform").unwrap();

    sg_cmd()
        .arg("parse")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("waveform format error"));
}

#[test]
fn serve_addr_flag_wins_over_env() {
    // The env var points at a bindable address; the flag at an
    // unresolvable one. The flag must win, so bind fails fast.
    sg_cmd()
        .args(["serve", "--addr", "256.0.0.1:0"])
        .env("SG_BIND_ADDR", "127.0.0.1:0")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to bind 256.0.0.1:0"));
}

#[test]
fn parse_missing_file_is_an_error() {
    sg_cmd()
        .args(["parse", "/nonexistent/path.wave"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}
