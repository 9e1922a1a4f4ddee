//! Stamps the `recovery` binary with `RECOVERY_VERSION`.
//!
//! Taken from `git describe` when building from a checkout, otherwise the
//! package version. The log header of every recovery run carries it.

use std::process::Command;

/// Workspace root relative to this crate.
const WORKSPACE_ROOT: &str = "../..";

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .current_dir(WORKSPACE_ROOT)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())?;
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    println!("cargo:rerun-if-changed={WORKSPACE_ROOT}/.git/HEAD");
    println!("cargo:rerun-if-changed={WORKSPACE_ROOT}/.git/refs/tags");

    let version = git(&["describe", "--tags", "--always", "--dirty=-dev"]).map_or_else(
        || env!("CARGO_PKG_VERSION").to_string(),
        |v| v.trim_start_matches('v').to_string(),
    );

    println!("cargo:rustc-env=RECOVERY_VERSION={version}");
}
