use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn pynix_cmd() -> Command {
    Command::cargo_bin("pynix").unwrap()
}

#[test]
fn test_parse_normalizes_name() {
    pynix_cmd()
        .args(["parse", "Foo_Bar[Socks] >= 1.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("foo-bar[socks] >=1.0"))
        .stdout(predicate::str::contains("extras: socks"));
}

#[test]
fn test_parse_conda_build() {
    pynix_cmd()
        .args(["parse", "hdf5 1.10.5 mpi_mpich_*"])
        .assert()
        .success()
        .stdout(predicate::str::contains("build:  mpi_mpich_*"));
}

#[test]
fn test_parse_marker() {
    pynix_cmd()
        .args(["parse", "pywin32 ; sys_platform == 'win32'"])
        .assert()
        .success()
        .stdout(predicate::str::contains("marker: "))
        .stdout(predicate::str::contains("win32"));
}

#[test]
fn test_parse_invalid_fails() {
    pynix_cmd()
        .args(["parse", "requests >>= 2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not parse requirement"));
}

#[test]
fn test_parse_requires_lines() {
    pynix_cmd().args(["parse"]).assert().failure();
}
