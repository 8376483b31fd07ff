//! Locating optional sample files.
//!
//! Real HYFAA outputs are large and not committed; tests that need one look
//! for it in a few well-known places and skip when it is absent.

use std::path::{Path, PathBuf};

/// Environment variable naming an extra directory to search first.
pub const SAMPLE_DIR_VAR: &str = "TEST_DATA_DIR";

pub fn workspace_root() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.ancestors().nth(2).unwrap_or(manifest).to_path_buf()
}

/// Directories searched by [`find_test_file`], in order.
pub fn sample_dirs() -> Vec<PathBuf> {
    let root = workspace_root();
    std::env::var_os(SAMPLE_DIR_VAR)
        .map(PathBuf::from)
        .into_iter()
        .chain([
            root.join("crates").join("ingestion").join("testdata"),
            root.join("crates").join("netcdf-parser").join("testdata"),
            root.join("testdata"),
        ])
        .collect()
}

/// First existing file called `name` in [`sample_dirs`].
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    sample_dirs()
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_holds_manifest_and_structure() {
        let root = workspace_root();
        assert!(root.join("Cargo.toml").is_file(), "no Cargo.toml under {:?}", root);
        assert!(root.join("config").join("import.yaml").is_file());
    }

    #[test]
    fn test_missing_file_is_none() {
        assert_eq!(find_test_file("no_such_post_processing_portal.nc"), None);
    }

    #[test]
    fn test_sample_dirs_end_at_workspace_testdata() {
        let dirs = sample_dirs();
        assert!(dirs.len() >= 3);
        assert_eq!(dirs.last(), Some(&workspace_root().join("testdata")));
    }
}
