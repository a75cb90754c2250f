use camino::Utf8Path;
use camino::Utf8PathBuf;
use walkdir::WalkDir;

/// Collect the request documents (`*.json`) under `paths`.
///
/// Files are taken as given, whatever their extension; directories are
/// walked recursively, skipping hidden entries. The result is sorted and
/// deduplicated.
#[must_use]
pub fn walk_documents(paths: &[Utf8PathBuf]) -> Vec<Utf8PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(canonical(path));
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
                .flatten()
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(utf8) = Utf8Path::from_path(entry.path()) {
                    if is_document(utf8) {
                        files.push(canonical(utf8));
                    }
                }
            }
        } else {
            tracing::warn!("{path} does not exist");
        }
    }

    files.sort();
    files.dedup();
    files
}

fn is_document(path: &Utf8Path) -> bool {
    path.extension() == Some("json")
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn canonical(path: &Utf8Path) -> Utf8PathBuf {
    path.canonicalize_utf8().unwrap_or_else(|_| path.to_owned())
}
