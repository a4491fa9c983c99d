//! Run scenario manifests against the emulated accelerators.
//!
//! # Usage
//!
//! ```bash
//! # Run specific manifests
//! cargo run --example run_scenarios -- scenarios/scalar_mac.toml
//!
//! # Run every manifest in a directory
//! cargo run --example run_scenarios -- scenarios/
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use mac_accel_emu::testing::{discover, ScenarioManifest};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <manifest.toml | dir>...", args[0]);
        return ExitCode::FAILURE;
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for arg in &args[1..] {
        let path = PathBuf::from(arg);
        if path.is_dir() {
            match discover(&path) {
                Ok(found) => paths.extend(found),
                Err(e) => {
                    eprintln!("{:#}", e);
                    return ExitCode::FAILURE;
                }
            }
        } else {
            paths.push(path);
        }
    }

    let mut passed = 0;
    let mut failed = 0;
    for path in &paths {
        match ScenarioManifest::from_file(path).and_then(|m| m.run()) {
            Ok(report) => {
                println!("{}", report);
                if report.passed() {
                    passed += 1;
                } else {
                    failed += 1;
                }
            }
            Err(e) => {
                println!("ERROR {}: {:#}", path.display(), e);
                failed += 1;
            }
        }
    }

    println!();
    println!("{} passed, {} failed", passed, failed);
    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
