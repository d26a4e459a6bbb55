//! Daemon help and argument specs

use crate::prelude::*;

#[test]
fn version_prints_package_version() {
    rjd()
        .args(&["--version"])
        .passes()
        .stdout_eq(&format!("rjd {}\n", env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_lists_submit_option() {
    rjd()
        .args(&["--help"])
        .passes()
        .stdout_has("USAGE:")
        .stdout_has("--submit <FILE>");
}

#[test]
fn unknown_argument_exits_with_usage() {
    let run = rjd().args(&["--frobnicate"]).fails();

    assert_eq!(run.code(), Some(1));
    run.stderr_has("unexpected argument '--frobnicate'")
        .stderr_has("Usage: rjd");
}

#[test]
fn submit_requires_a_path() {
    rjd()
        .args(&["--submit"])
        .fails()
        .stderr_has("requires a job file");
}
