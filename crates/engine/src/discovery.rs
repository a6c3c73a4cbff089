//! File discovery.
//!
//! Expands a single path into the concrete list of files to upload,
//! honoring the recursion and hidden-file flags. Symbolic links are
//! followed; entries the walk cannot read are skipped with a warning.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// Lists the files under `path`.
///
/// A plain file yields itself. A directory is walked one level deep, or
/// fully when `recursive` is set; dot-prefixed names are skipped unless
/// `include_hidden` is set.
pub(crate) fn find_files(path: &Path, recursive: bool, include_hidden: bool) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(path).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }
    walker
        .into_iter()
        .filter_entry(move |entry| include_hidden || entry.depth() == 0 || !is_hidden(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(DirEntry::into_path)
        .collect()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        fs::write(root.join("run.log"), b"LOG").unwrap();
        fs::write(root.join(".hidden"), b"H").unwrap();

        fs::create_dir_all(root.join("data").join("frames")).unwrap();
        fs::write(root.join("data").join("meta.json"), b"{}").unwrap();
        fs::write(root.join("data").join("frames").join("f1.bin"), b"F1").unwrap();

        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::write(root.join(".cache").join("tmp.bin"), b"T").unwrap();

        dir
    }

    fn names(paths: &[PathBuf], root: &Path) -> Vec<String> {
        let mut names: Vec<String> = paths
            .iter()
            .map(|p| {
                p.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        names.sort();
        names
    }

    #[test]
    fn single_file_yields_itself() {
        let dir = create_test_tree();
        let file = dir.path().join("run.log");
        let found = find_files(&file, false, false);
        assert_eq!(found, vec![file]);
    }

    #[test]
    fn non_recursive_stays_at_top_level() {
        let dir = create_test_tree();
        let found = find_files(dir.path(), false, false);
        assert_eq!(names(&found, dir.path()), vec!["run.log"]);
    }

    #[test]
    fn recursive_descends() {
        let dir = create_test_tree();
        let found = find_files(dir.path(), true, false);
        assert_eq!(
            names(&found, dir.path()),
            vec!["data/frames/f1.bin", "data/meta.json", "run.log"]
        );
    }

    #[test]
    fn include_hidden_admits_dot_names() {
        let dir = create_test_tree();
        let found = find_files(dir.path(), true, true);
        assert_eq!(
            names(&found, dir.path()),
            vec![
                ".cache/tmp.bin",
                ".hidden",
                "data/frames/f1.bin",
                "data/meta.json",
                "run.log"
            ]
        );
    }

    #[test]
    fn missing_path_yields_nothing() {
        let found = find_files(Path::new("/definitely/not/there"), true, true);
        assert!(found.is_empty());
    }
}
