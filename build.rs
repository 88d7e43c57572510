use cargo_lock::Lockfile;
use serde::Serialize;
use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;

#[derive(Serialize)]
struct DepInfo {
    name: String,
    version: String,
    source: Option<String>,
}

fn main() {
    // 1. Git hash for the About window
    let output = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output();
    let git_hash = match output {
        Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout).trim().to_string(),
        _ => "unknown".to_string(),
    };
    println!("cargo:rustc-env=APP_GIT_HASH={}", git_hash);
    println!("cargo:rerun-if-changed=.git/HEAD");

    // 2. Dependency list from Cargo.lock
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let lock_path = Path::new(&manifest_dir).join("Cargo.lock");
    println!("cargo:rerun-if-changed=Cargo.lock");

    let mut deps: Vec<DepInfo> = match Lockfile::load(&lock_path) {
        Ok(lockfile) => lockfile
            .packages
            .into_iter()
            .map(|pkg| DepInfo {
                name: pkg.name.as_str().to_string(),
                version: pkg.version.to_string(),
                source: pkg.source.map(|s| s.to_string()),
            })
            .collect(),
        Err(e) => {
            println!("cargo:warning=Could not load Cargo.lock: {}", e);
            Vec::new()
        }
    };
    deps.sort_by(|a, b| a.name.cmp(&b.name));

    let json_info = serde_json::to_string(&deps).unwrap_or_else(|_| "[]".to_string());

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let dest_path = Path::new(&out_dir).join("deps_info.json");
    fs::write(&dest_path, json_info).expect("Failed to write deps_info.json");
    println!("cargo:rustc-env=DEPS_INFO_PATH={}", dest_path.display());
}
