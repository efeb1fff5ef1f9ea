//! Build script for bpt-cycle
//!
//! Stamps the binary with the identification `main` logs at startup:
//! short git hash, build timestamp and build profile.

use std::process::Command;

/// Short commit hash, or "unknown" outside a git checkout
fn git_hash() -> String {
    Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let stamps = [
        ("GIT_HASH", git_hash()),
        (
            "BUILD_TIMESTAMP",
            chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false),
        ),
        (
            "BUILD_PROFILE",
            std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string()),
        ),
    ];

    for (name, value) in stamps {
        println!("cargo:rustc-env={}={}", name, value);
    }

    // No rerun-if-changed directives: Cargo reruns the script on every
    // build, keeping the timestamp and hash current
}
