//! Language detection and source-tree walking.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::BuildConfig;
use crate::errors::{CpgError, CpgResult};

const LANGUAGE_BY_EXTENSION: &[(&str, &str)] = &[
    (".py", "python"),
    (".js", "javascript"),
    (".jsx", "javascript"),
    (".ts", "typescript"),
    (".tsx", "typescript"),
    (".java", "java"),
    (".go", "go"),
    (".c", "c"),
    (".h", "c"),
    (".cpp", "cpp"),
    (".hpp", "cpp"),
    (".cs", "csharp"),
    (".rb", "ruby"),
    (".php", "php"),
];

/// Directory names pruned from every walk.
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "__pycache__",
    "venv",
    ".venv",
    "dist",
    "build",
];

/// Every language tag the detector can produce, in table order, deduplicated.
pub fn known_languages() -> Vec<&'static str> {
    let mut languages: Vec<&'static str> = Vec::new();
    for (_, lang) in LANGUAGE_BY_EXTENSION {
        if !languages.contains(lang) {
            languages.push(lang);
        }
    }
    languages
}

/// Map a path to a language tag by its extension (case-insensitive).
pub fn detect_language(path: &str) -> Option<String> {
    let path = Path::new(path);
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))?;
    LANGUAGE_BY_EXTENSION
        .iter()
        .find(|(e, _)| *e == ext.as_str())
        .map(|(_, lang)| lang.to_string())
}

pub fn compute_content_hash(path: &Path) -> CpgResult<String> {
    let mut hasher = Sha256::new();
    let data = std::fs::read(path)?;
    hasher.update(&data);
    Ok(format!("{:x}", hasher.finalize()))
}

fn is_excluded_dir(name: &str, extra: &[String]) -> bool {
    EXCLUDED_DIRS.contains(&name) || extra.iter().any(|e| e == name)
}

/// Enumerate files under `root` whose language is recognized, pruning
/// excluded directories. Unreadable entries are logged and skipped.
pub fn iter_source_files(root: &Path, config: &BuildConfig) -> CpgResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(CpgError::Walk(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let walker = WalkDir::new(root)
        .follow_links(config.follow_links)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            // Never prune the root itself, whatever it is called.
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !is_excluded_dir(
                    &entry.file_name().to_string_lossy(),
                    &config.extra_excluded_dirs,
                )
        });

    let mut result = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {e}", root.display());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if detect_language(&entry.path().to_string_lossy()).is_some() {
            result.push(entry.into_path());
        }
    }
    Ok(result)
}

/// A source file selected for extraction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the build root, `/`-separated.
    pub path: String,
    pub language: String,
    pub content_hash: String,
    pub size_bytes: u64,
}

pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Walk `root` and describe every extractable file.
///
/// Returns the number of candidate files seen and their records. Hashing
/// failures leave an empty hash; the extractor reports the read error.
pub fn scan_source_files(root: &Path, config: &BuildConfig) -> CpgResult<(usize, Vec<FileRecord>)> {
    let files = iter_source_files(root, config)?;
    let files_seen = files.len();
    let mut records = Vec::with_capacity(files_seen);

    for file_path in files {
        let language = match detect_language(&file_path.to_string_lossy()) {
            Some(l) => l,
            None => continue,
        };
        let content_hash = compute_content_hash(&file_path).unwrap_or_default();
        let size_bytes = file_path.metadata().map(|m| m.len()).unwrap_or(0);
        records.push(FileRecord {
            path: relative_path(root, &file_path),
            language,
            content_hash,
            size_bytes,
        });
    }

    Ok((files_seen, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_detect_language_table() {
        assert_eq!(detect_language("a/b/main.py").as_deref(), Some("python"));
        assert_eq!(detect_language("App.JSX").as_deref(), Some("javascript"));
        assert_eq!(detect_language("x.tsx").as_deref(), Some("typescript"));
        assert_eq!(detect_language("Main.java").as_deref(), Some("java"));
        assert_eq!(detect_language("server.go").as_deref(), Some("go"));
        assert_eq!(detect_language("lib.h").as_deref(), Some("c"));
        assert_eq!(detect_language("lib.HPP").as_deref(), Some("cpp"));
        assert_eq!(detect_language("Program.cs").as_deref(), Some("csharp"));
        assert_eq!(detect_language("app.rb").as_deref(), Some("ruby"));
        assert_eq!(detect_language("index.php").as_deref(), Some("php"));
    }

    #[test]
    fn test_detect_language_unknown() {
        assert_eq!(detect_language("README.md"), None);
        assert_eq!(detect_language("Makefile"), None);
        assert_eq!(detect_language("main.rs"), None);
    }

    #[test]
    fn test_known_languages_deduplicated() {
        let langs = known_languages();
        assert_eq!(langs.len(), 10);
        assert_eq!(langs[0], "python");
        assert!(langs.contains(&"php"));
    }

    #[test]
    fn test_walk_prunes_excluded_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("build")).unwrap();
        fs::create_dir_all(root.join("vendor")).unwrap();
        fs::write(root.join("src/app.py"), "def f():\n    pass\n").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "function x() {}\n").unwrap();
        fs::write(root.join(".git/hook.py"), "x = 1\n").unwrap();
        fs::write(root.join("build/out.js"), "x\n").unwrap();
        fs::write(root.join("vendor/lib.go"), "package lib\n").unwrap();
        fs::write(root.join("notes.txt"), "hello\n").unwrap();

        let config = BuildConfig::default();
        let files = iter_source_files(root, &config).unwrap();
        let rel: Vec<String> = files.iter().map(|p| relative_path(root, p)).collect();
        assert_eq!(rel, vec!["src/app.py", "vendor/lib.go"]);

        let config = BuildConfig {
            extra_excluded_dirs: vec!["vendor".to_string()],
            ..BuildConfig::default()
        };
        let files = iter_source_files(root, &config).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_walk_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            iter_source_files(&missing, &BuildConfig::default()),
            Err(CpgError::Walk(_))
        ));
    }

    #[test]
    fn test_scan_records_relative_paths_and_hashes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/mod.py"), "x = 1\n").unwrap();

        let (seen, records) = scan_source_files(dir.path(), &BuildConfig::default()).unwrap();
        assert_eq!(seen, 1);
        assert_eq!(records[0].path, "pkg/mod.py");
        assert_eq!(records[0].language, "python");
        assert_eq!(records[0].content_hash.len(), 64);
        assert_eq!(records[0].size_bytes, 6);
    }
}
