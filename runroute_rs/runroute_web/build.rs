use std::env;
use std::process::Command;

/// Short commit hash shown in the gallery footer.
///
/// `RUNROUTE_COMMIT` wins so release builds from a tarball can still stamp one.
fn commit_hash() -> String {
    if let Ok(value) = env::var("RUNROUTE_COMMIT") {
        if !value.trim().is_empty() {
            return value.trim().to_string();
        }
    }
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=RUNROUTE_COMMIT");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rustc-env=GIT_COMMIT_HASH={}", commit_hash());
}
