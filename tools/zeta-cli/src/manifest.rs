// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! JSON side files recording how each table was produced.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

/// Manifest location for a table: same stem, `.json` extension.
pub fn manifest_path(table: &Path) -> PathBuf {
    table.with_extension("json")
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path).with_context(|| format!("cannot create parent of {}", path.display()))?;
    let payload = serde_json::to_string_pretty(value)?;
    fs::write(path, payload).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn manifest_sits_next_to_its_table() {
        assert_eq!(
            manifest_path(Path::new("runs/fe_zeta_a_classic_critical.csv")),
            PathBuf::from("runs/fe_zeta_a_classic_critical.json")
        );
    }

    #[test]
    fn write_json_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/report.json");
        write_json(&path, &serde_json::json!({ "rows": 3 })).unwrap();
        let back: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["rows"], 3);
    }
}
