//! Path utilities for locating grid test data.
//!
//! Real grid files (national NTv2 distributions and the like) are large and
//! not checked in. Tests that need them look them up here and skip when
//! they are absent.

use std::path::PathBuf;

/// Returns the workspace root directory.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent() // crates/
        .and_then(|p| p.parent()) // workspace root
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// Returns `crates/{crate_name}/testdata/`.
pub fn crate_testdata_dir(crate_name: &str) -> PathBuf {
    workspace_root()
        .join("crates")
        .join(crate_name)
        .join("testdata")
}

/// Searches for a grid test file.
///
/// Locations checked, in order:
/// 1. `TEST_DATA_DIR` (if set)
/// 2. `GRIDI_DATA_DIR` (if set), the same directory the library reads
///    grid files from
/// 3. `crates/datum-grid/testdata/`
/// 4. `testdata/` at the workspace root
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    let mut candidates = Vec::new();

    for var in ["TEST_DATA_DIR", "GRIDI_DATA_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            if !dir.is_empty() {
                candidates.push(PathBuf::from(dir).join(name));
            }
        }
    }

    let root = workspace_root();
    candidates.extend([
        crate_testdata_dir("datum-grid").join(name),
        root.join("testdata").join(name),
    ]);

    candidates.into_iter().find(|path| path.exists())
}

/// Creates a temporary directory for generated grid files.
///
/// The directory is removed when the returned `TempDir` is dropped.
pub fn temp_grid_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("datum_grid_")
        .tempdir()
        .expect("Failed to create temporary grid directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_is_valid() {
        let root = workspace_root();
        assert!(
            root.join("Cargo.toml").exists(),
            "Workspace root should contain Cargo.toml: {:?}",
            root
        );
    }

    #[test]
    fn test_crate_testdata_dir() {
        let dir = crate_testdata_dir("datum-grid");
        assert!(dir.ends_with("crates/datum-grid/testdata"));
    }

    #[test]
    fn test_missing_file_is_none() {
        assert!(find_test_file("no_such_grid_file.gsb").is_none());
    }

    #[test]
    fn test_temp_grid_dir() {
        let dir = temp_grid_dir();
        assert!(dir.path().exists());
        assert!(dir.path().to_string_lossy().contains("datum_grid_"));
    }
}
