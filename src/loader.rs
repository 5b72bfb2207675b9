//! Loads registration files (JSON or YAML, each an array of registration
//! records) from a config directory and installs them into a
//! `HandlerSet` in directory-listing order.

use std::path::Path;

use tracing::info;

use crate::dispatch::{build_pair, RegistrationRecord};
use crate::error::{Error, Result};
use crate::handler::HandlerSet;

/// Lists `dir`, sorted by filename for determinism (the original relies
/// on OS directory order; we sort explicitly so loading order doesn't
/// vary across filesystems, a documented deviation, see DESIGN.md), and
/// installs every registration record from every file, in that order.
pub fn load_directory(dir: &Path, handler_set: &HandlerSet) -> Result<()> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| Error::StartupIoFailure(format!("reading {}: {e}", dir.display())))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    for path in paths {
        load_file(&path, handler_set)?;
    }

    Ok(())
}

fn load_file(path: &Path, handler_set: &HandlerSet) -> Result<()> {
    info!(path = %path.display(), "reading registration file");

    let content = std::fs::read(path)
        .map_err(|e| Error::StartupIoFailure(format!("reading {}: {e}", path.display())))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );

    let value: serde_json::Value = if is_yaml {
        serde_yaml::from_slice(&content)
            .map_err(|e| Error::MalformedPayload(format!("{}: {e}", path.display())))?
    } else {
        serde_json::from_slice(&content)
            .map_err(|e| Error::MalformedPayload(format!("{}: {e}", path.display())))?
    };

    let records: Vec<serde_json::Value> = match value {
        serde_json::Value::Array(items) => items,
        _ => {
            return Err(Error::MalformedPayload(format!(
                "{}: expected a top-level JSON array",
                path.display()
            )))
        }
    };

    let mut installed = 0;
    for record in records {
        let record: RegistrationRecord = serde_json::from_value(record)
            .map_err(|e| Error::SchemaViolation {
                details: format!("{}: {e}", path.display()),
            })?;
        let (expectation, template) = build_pair(record)?;
        handler_set.add(expectation, template);
        installed += 1;
    }

    info!(path = %path.display(), installed, "installed expectations");
    Ok(())
}
