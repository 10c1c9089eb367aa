//! Discovery of YAML sources on disk.
//!
//! Every `.yaml`/`.yml` file under the matrix directory is expected to be
//! reached by some include directive. Files that no include reaches are
//! usually forgotten additions, so they can be reported after compilation.

use std::{
    collections::BTreeSet,
    ffi::OsStr,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

/// Lists every YAML file below `root`, in lexicographic order.
///
/// Hidden directories (such as `.git`) are skipped. Paths are canonicalized
/// where possible so they compare equal to the paths recorded during include
/// expansion.
#[must_use]
pub fn yaml_files(root: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            matches!(
                entry.path().extension().and_then(OsStr::to_str),
                Some("yaml" | "yml")
            )
        })
        .map(walkdir::DirEntry::into_path)
        .map(|path| path.canonicalize().unwrap_or(path))
        .collect();
    paths.sort();
    paths
}

/// YAML files below `root` that do not appear in `loaded`.
#[must_use]
pub fn unreferenced(root: &Path, loaded: &[PathBuf]) -> Vec<PathBuf> {
    let loaded: BTreeSet<&Path> = loaded.iter().map(PathBuf::as_path).collect();
    let orphans: Vec<PathBuf> = yaml_files(root)
        .into_iter()
        .filter(|path| !loaded.contains(path.as_path()))
        .collect();

    for path in &orphans {
        tracing::debug!("{} is not included by any source file", path.display());
    }
    orphans
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_str().is_some_and(|name| name.starts_with('.'))
}
