use std::path::PathBuf;

use clap::Args;
use loom_core::manifest::read_manifest;

use crate::util::{exit_error, print_json, report_error};

#[derive(Args)]
pub struct ManifestArgs {
    /// Audit log (NDJSON) written by `loom run`
    log: PathBuf,
}

pub fn run(args: ManifestArgs) -> i32 {
    let records = match read_manifest(&args.log) {
        Ok(records) => records,
        Err(e) => return report_error(&e),
    };
    match serde_json::to_value(&records) {
        Ok(value) => print_json(&value),
        Err(e) => exit_error(&format!("Failed to render records: {e}"), None),
    }
}
