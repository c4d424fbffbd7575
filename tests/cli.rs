use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;

fn cmd() -> Command {
    Command::cargo_bin("qrgen").unwrap()
}

#[test]
fn version() {
    cmd()
        .arg("-v")
        .assert()
        .success()
        .stdout(contains(concat!("qrgen ", env!("CARGO_PKG_VERSION"))));

    cmd().arg("--version").assert().success();
}

#[test]
fn help_short_circuits() {
    cmd()
        .args(&["--bogus", "-h"])
        .assert()
        .success()
        .stdout(contains("Generate a QR code from text."));

    cmd().arg("--help").assert().success().stdout(contains("--ascii"));
}

#[test]
fn unknown_flag() {
    cmd().arg("--bogus").assert().failure().code(predicate::ne(0));
}

#[test]
fn no_input_detected() {
    cmd()
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(contains("No input detected."));

    cmd()
        .write_stdin("   \n")
        .assert()
        .code(1)
        .stderr(contains("No input detected."));
}

#[test]
fn piped_ascii() {
    cmd()
        .arg("-a")
        .write_stdin("  hello \n")
        .assert()
        .success()
        .stdout(contains("█"));
}

#[test]
fn ascii_ignores_output() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("qr.png");

    cmd()
        .arg("hello")
        .arg("--ascii")
        .arg("-o")
        .arg(&destination)
        .assert()
        .success()
        .stdout(contains("█").and(contains("Saved").not()));

    assert!(!destination.exists());
    assert_eq!(0, fs::read_dir(dir.path()).unwrap().count());
}

#[test]
fn save_into_directory() {
    let dir = tempfile::tempdir().unwrap();

    cmd()
        .arg("hello")
        .arg("-o")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(contains("💾 Saved QR to").and(contains("output.png")));

    assert!(dir.path().join("output.png").is_file());
}

#[test]
fn save_without_extension() {
    let dir = tempfile::tempdir().unwrap();

    cmd()
        .arg("-o")
        .arg(dir.path().join("photo"))
        .write_stdin("from a pipe")
        .assert()
        .success()
        .stdout(contains("photo.png"));

    let saved = fs::read(dir.path().join("photo.png")).unwrap();

    assert_eq!(b"\x89PNG", &saved[..4]);
    assert!(!dir.path().join("photo").exists());
}

#[test]
fn save_jpeg_case_insensitive() {
    let dir = tempfile::tempdir().unwrap();

    cmd()
        .args(&["hello", "--output"])
        .arg(dir.path().join("img.JPG"))
        .assert()
        .success();

    let saved = fs::read(dir.path().join("img.JPG")).unwrap();

    assert_eq!(&[0xff, 0xd8], &saved[..2]);
}

#[test]
fn save_gif() {
    let dir = tempfile::tempdir().unwrap();

    cmd()
        .arg("hello")
        .arg("-o")
        .arg(dir.path().join("qr.gif"))
        .assert()
        .success();

    let saved = fs::read(dir.path().join("qr.gif")).unwrap();

    assert_eq!(b"GIF8", &saved[..4]);
}

#[test]
fn save_expands_home() {
    let home = tempfile::tempdir().unwrap();

    cmd()
        .env("HOME", home.path())
        .args(&["hello", "-o", "~/qr.png"])
        .assert()
        .success();

    assert!(home.path().join("qr.png").is_file());
}

#[test]
fn unwritable_destination() {
    let dir = tempfile::tempdir().unwrap();

    cmd()
        .arg("hello")
        .arg("-o")
        .arg(dir.path().join("missing").join("qr.png"))
        .assert()
        .failure()
        .stderr(contains("failed to write"));
}

#[test]
fn argument_wins_over_pipe() {
    let dir = tempfile::tempdir().unwrap();

    cmd()
        .args(&["argument", "-o"])
        .arg(dir.path().join("qr.png"))
        .write_stdin("piped")
        .assert()
        .success();

    assert!(dir.path().join("qr.png").is_file());
}

#[test]
fn non_utf8_pipe_rejected() {
    cmd()
        .write_stdin(vec![0xff, 0xfe, 0xfd])
        .assert()
        .code(1)
        .stderr(contains("Failed to read input"));
}
