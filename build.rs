// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-env-changed=CAMSWAP_VERSION");

    // Packaged builds set the version explicitly
    let version = std::env::var("CAMSWAP_VERSION").unwrap_or_else(|_| describe_version());
    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Package version with the short commit hash appended when git is available
fn describe_version() -> String {
    let package = env!("CARGO_PKG_VERSION");
    match commit_hash() {
        Some(hash) => format!("{}-{}", package, hash),
        None => package.to_string(),
    }
}

fn commit_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
