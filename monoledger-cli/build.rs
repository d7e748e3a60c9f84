use std::env;
use std::process::Command;

/// Packagers building outside a checkout can pin the build id here.
const BUILD_ID_VAR: &str = "MONOLEDGER_BUILD_ID";

fn main() {
    let pkg = env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let build = env::var(BUILD_ID_VAR)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(git_describe);

    let version = match build {
        Some(build) => format!("{pkg}+{}", build.trim()),
        None => pkg,
    };
    println!("cargo:rustc-env=MONOLEDGER_VERSION={version}");
    println!("cargo:rerun-if-env-changed={BUILD_ID_VAR}");
    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=../.git/index");
}

/// Short commit id, with `-dirty` when the tree has local edits.
fn git_describe() -> Option<String> {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").ok()?;
    let out = Command::new("git")
        .args(["-C", &format!("{manifest_dir}/.."), "describe", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|o| o.status.success())?;
    let id = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!id.is_empty()).then_some(id)
}
