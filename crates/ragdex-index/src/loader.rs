//! Workspace walk producing [`Document`]s.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ragdex_memory::Payload;

use crate::error::Result;
use crate::ignore_rules::IgnoreRules;

/// A workspace file read into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Workspace-relative path with `/` separators.
    pub id: String,
    pub content: String,
    pub metadata: Payload,
}

impl Document {
    /// In-memory document with only the path-derived metadata.
    #[must_use]
    pub fn from_content(id: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        let content = content.into();
        let metadata = base_metadata(&id, content.len() as u64, None);
        Self {
            id,
            content,
            metadata,
        }
    }
}

fn base_metadata(id: &str, size: u64, modified: Option<u64>) -> Payload {
    let path = Path::new(id);
    let mut meta = Payload::new();
    meta.insert("file_path".into(), id.into());
    meta.insert(
        "file_name".into(),
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
            .into(),
    );
    meta.insert(
        "extension".into(),
        path.extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
            .into(),
    );
    meta.insert("size_bytes".into(), size.into());
    if let Some(ts) = modified {
        meta.insert("modified".into(), ts.into());
    }
    meta
}

/// Read one file. Returns `Ok(None)` for files that are skipped rather than failed:
/// directories, files over `max_file_size` and non-UTF-8 content.
///
/// # Errors
///
/// Returns [`crate::IndexError::Io`] when the file cannot be read; a missing file
/// surfaces as `ErrorKind::NotFound`.
pub fn load_document(
    rules: &IgnoreRules,
    path: &Path,
    max_file_size: u64,
) -> Result<Option<Document>> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        rules.root().join(path)
    };
    let Some(id) = rules.relative(&abs) else {
        return Ok(None);
    };

    let meta = std::fs::metadata(&abs)?;
    if !meta.is_file() {
        return Ok(None);
    }
    if meta.len() > max_file_size {
        tracing::debug!(file = %id, size = meta.len(), "skipping oversized file");
        return Ok(None);
    }

    let bytes = std::fs::read(&abs)?;
    let Ok(content) = String::from_utf8(bytes) else {
        tracing::debug!(file = %id, "skipping non-UTF-8 file");
        return Ok(None);
    };

    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs());
    let metadata = base_metadata(&id, meta.len(), modified);

    Ok(Some(Document {
        id,
        content,
        metadata,
    }))
}

/// Walk the workspace and load every file the rules admit, sorted by id.
///
/// Unreadable files are logged and skipped.
///
/// # Errors
///
/// Returns [`crate::IndexError::Io`] if the workspace root is no longer a directory.
pub fn load_documents(rules: &IgnoreRules, max_file_size: u64) -> Result<Vec<Document>> {
    if !std::fs::metadata(rules.root())?.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            format!("{} is not a directory", rules.root().display()),
        )
        .into());
    }

    let mut documents = Vec::new();
    for path in walk_files(rules, rules.root()) {
        match load_document(rules, &path, max_file_size) {
            Ok(Some(doc)) => documents.push(doc),
            Ok(None) => {}
            Err(e) => tracing::warn!(path = %path.display(), "failed to read file: {e}"),
        }
    }

    documents.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(documents)
}

/// Every file under `dir` that the rules admit. `dir` itself is not checked
/// against the rules.
#[must_use]
pub fn walk_files(rules: &IgnoreRules, dir: &Path) -> Vec<PathBuf> {
    let walk_rules = rules.clone();
    let walker = ignore::WalkBuilder::new(dir)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            entry.depth() == 0 || !walk_rules.is_ignored(entry.path(), is_dir)
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_some_and(|ft| ft.is_file()) => {
                files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("workspace walk error: {e}"),
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::config::SyncConfig;

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub fn a() {}\n").unwrap();
        fs::write(dir.path().join("README.md"), "# Demo\n").unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();
        fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x00, 0x80]).unwrap();
        dir
    }

    #[test]
    fn loads_text_files_sorted_and_skips_ignored() {
        let dir = workspace();
        let rules = IgnoreRules::new(dir.path(), &SyncConfig::default(), None).unwrap();
        let docs = load_documents(&rules, 1024).unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["README.md", "src/lib.rs"]);
        let lib = &docs[1];
        assert_eq!(lib.metadata["file_path"], serde_json::json!("src/lib.rs"));
        assert_eq!(lib.metadata["file_name"], serde_json::json!("lib.rs"));
        assert_eq!(lib.metadata["extension"], serde_json::json!("rs"));
        assert_eq!(lib.metadata["size_bytes"], serde_json::json!(14));
        assert!(lib.metadata.contains_key("modified"));
    }

    #[test]
    fn walk_files_lists_admitted_files_under_a_subdirectory() {
        let dir = workspace();
        fs::create_dir_all(dir.path().join("src/target")).unwrap();
        fs::write(dir.path().join("src/target/out.rs"), "x").unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        let rules = IgnoreRules::new(dir.path(), &SyncConfig::default(), None).unwrap();
        let mut files: Vec<_> = walk_files(&rules, &rules.root().join("src"))
            .into_iter()
            .filter_map(|p| rules.relative(&p))
            .collect();
        files.sort();
        assert_eq!(files, vec!["src/lib.rs", "src/main.rs"]);
    }

    #[test]
    fn oversized_files_are_skipped() {
        let dir = workspace();
        fs::write(dir.path().join("big.txt"), "x".repeat(64)).unwrap();
        let rules = IgnoreRules::new(dir.path(), &SyncConfig::default(), None).unwrap();
        let docs = load_documents(&rules, 32).unwrap();
        assert!(docs.iter().all(|d| d.id != "big.txt"));
    }

    #[test]
    fn load_document_missing_file_is_not_found() {
        let dir = workspace();
        let rules = IgnoreRules::new(dir.path(), &SyncConfig::default(), None).unwrap();
        let err = load_document(&rules, Path::new("gone.rs"), 1024).unwrap_err();
        assert!(
            matches!(err, crate::IndexError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound)
        );
    }

    #[test]
    fn from_content_sets_path_metadata() {
        let doc = Document::from_content("notes/todo.TXT", "buy milk");
        assert_eq!(doc.metadata["extension"], serde_json::json!("txt"));
        assert_eq!(doc.metadata["size_bytes"], serde_json::json!(8));
    }
}
