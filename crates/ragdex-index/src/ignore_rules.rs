//! Decides which workspace paths are indexed and which filesystem events are relevant.

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::config::SyncConfig;
use crate::error::{IndexError, Result};

/// Directory names that are never indexed, at any depth.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "dist",
    "build",
    ".venv",
    "venv",
    "__pycache__",
    ".next",
    ".cache",
    ".ragdex",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct IgnoreRules {
    root: PathBuf,
    storage_dir: Option<PathBuf>,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    gitignore: Option<Gitignore>,
}

fn compile(patterns: &[String], field: &str) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| IndexError::Config(format!("invalid {field} glob {p:?}: {e}")))
        })
        .collect()
}

impl IgnoreRules {
    /// Build rules for `root`. `storage_dir` is resolved against `root` when relative.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Config`] for malformed globs and [`IndexError::Io`] when
    /// `root` cannot be resolved.
    pub fn new(root: &Path, sync: &SyncConfig, storage_dir: Option<&Path>) -> Result<Self> {
        let root = std::fs::canonicalize(root)?;
        let storage_dir = storage_dir.map(|dir| {
            let abs = if dir.is_absolute() {
                dir.to_path_buf()
            } else {
                root.join(dir)
            };
            std::fs::canonicalize(&abs).unwrap_or(abs)
        });

        let gitignore = if sync.respect_gitignore {
            let mut builder = GitignoreBuilder::new(&root);
            let path = root.join(".gitignore");
            if path.is_file()
                && let Some(e) = builder.add(&path)
            {
                tracing::warn!(path = %path.display(), "partially invalid .gitignore: {e}");
            }
            match builder.build() {
                Ok(gi) => Some(gi),
                Err(e) => {
                    tracing::warn!("ignoring .gitignore: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            include: compile(&sync.include, "include")?,
            exclude: compile(&sync.exclude, "exclude")?,
            root,
            storage_dir,
            gitignore,
        })
    }

    /// Canonical workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Workspace-relative path with `/` separators, or `None` outside the workspace.
    #[must_use]
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    /// Whether `path` (absolute, or relative to the root) must not be indexed.
    #[must_use]
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let Some(rel) = self.relative(&abs) else {
            return true;
        };

        if Path::new(&rel).components().any(|c| {
            matches!(c, Component::Normal(s) if DEFAULT_EXCLUDED_DIRS.iter().any(|d| s == *d))
        }) {
            return true;
        }

        if let Some(storage) = &self.storage_dir
            && abs.starts_with(storage)
        {
            return true;
        }

        let file_name = abs
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let matches = |p: &Pattern| {
            p.matches_with(&rel, MATCH_OPTIONS)
                || (!p.as_str().contains('/') && p.matches_with(&file_name, MATCH_OPTIONS))
        };

        if self.exclude.iter().any(matches) {
            return true;
        }

        if let Some(gi) = &self.gitignore
            && gi
                .matched_path_or_any_parents(Path::new(&rel), is_dir)
                .is_ignore()
        {
            return true;
        }

        !is_dir && !self.include.is_empty() && !self.include.iter().any(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(dir: &Path, sync: &SyncConfig) -> IgnoreRules {
        IgnoreRules::new(dir, sync, Some(Path::new(".store"))).unwrap()
    }

    #[test]
    fn default_dirs_are_ignored_at_any_depth() {
        let dir = tempfile::tempdir().unwrap();
        let r = rules(dir.path(), &SyncConfig::default());
        assert!(r.is_ignored(Path::new(".git/config"), false));
        assert!(r.is_ignored(Path::new("web/node_modules/x/index.js"), false));
        assert!(r.is_ignored(Path::new("target"), true));
        assert!(!r.is_ignored(Path::new("src/lib.rs"), false));
        assert!(!r.is_ignored(Path::new("src/targets.rs"), false));
    }

    #[test]
    fn storage_dir_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let r = rules(dir.path(), &SyncConfig::default());
        assert!(r.is_ignored(&r.root().join(".store/segment.bin"), false));
    }

    #[test]
    fn paths_outside_root_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let r = rules(dir.path(), &SyncConfig::default());
        assert!(r.is_ignored(Path::new("/definitely/elsewhere.rs"), false));
    }

    #[test]
    fn exclude_and_include_globs() {
        let dir = tempfile::tempdir().unwrap();
        let sync = SyncConfig {
            include: vec!["src/**".into(), "*.md".into()],
            exclude: vec!["*.log".into(), "src/gen/*".into()],
            ..SyncConfig::default()
        };
        let r = rules(dir.path(), &sync);
        assert!(r.is_ignored(Path::new("src/debug.log"), false));
        assert!(r.is_ignored(Path::new("src/gen/out.rs"), false));
        assert!(!r.is_ignored(Path::new("src/main.rs"), false));
        assert!(!r.is_ignored(Path::new("docs/guide.md"), false));
        assert!(r.is_ignored(Path::new("scripts/run.sh"), false));
        // include globs never prune directories
        assert!(!r.is_ignored(Path::new("scripts"), true));
    }

    #[test]
    fn gitignore_respected_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "secret/\n*.tmp\n").unwrap();
        let r = rules(dir.path(), &SyncConfig::default());
        assert!(r.is_ignored(Path::new("secret/key.txt"), false));
        assert!(r.is_ignored(Path::new("a/b.tmp"), false));
        assert!(!r.is_ignored(Path::new("a/b.txt"), false));

        let off = SyncConfig {
            respect_gitignore: false,
            ..SyncConfig::default()
        };
        let r = rules(dir.path(), &off);
        assert!(!r.is_ignored(Path::new("secret/key.txt"), false));
    }

    #[test]
    fn invalid_glob_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let sync = SyncConfig {
            exclude: vec!["[".into()],
            ..SyncConfig::default()
        };
        let err = IgnoreRules::new(dir.path(), &sync, None).unwrap_err();
        assert!(matches!(err, IndexError::Config(_)));
    }

    #[test]
    fn relative_uses_forward_slashes() {
        let dir = tempfile::tempdir().unwrap();
        let r = rules(dir.path(), &SyncConfig::default());
        let p = r.root().join("a").join("b.rs");
        assert_eq!(r.relative(&p).as_deref(), Some("a/b.rs"));
        assert_eq!(r.relative(r.root()), None);
    }
}
