//! Executable lookup for engine binaries.
//!
//! A [`SearchPaths`] value is built once and handed to an engine; it is never
//! mutated afterwards. Lookup order is `PATH` first (when enabled), then each
//! install prefix joined with the engine's binary subdirectories.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Install prefixes where PostgreSQL packages usually land.
const POSTGRES_PREFIXES: &[&str] = &[
    "/usr/local/pgsql",
    "/usr/local",
    "/usr/pgsql-*",            // CentOS/RHEL
    "/usr/lib/postgresql/*",   // Debian/Ubuntu
    "/opt/local/lib/postgresql*", // MacPorts
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPaths {
    use_path_env: bool,
    prefixes: Vec<PathBuf>,
}

impl SearchPaths {
    /// `PATH` plus the given install prefixes.
    pub fn new(prefixes: Vec<PathBuf>) -> Self {
        Self {
            use_path_env: true,
            prefixes,
        }
    }

    /// Searches nothing; every lookup fails unless a path is set explicitly.
    pub fn none() -> Self {
        Self {
            use_path_env: false,
            prefixes: Vec::new(),
        }
    }

    /// `PATH` plus the well-known PostgreSQL install prefixes.
    pub fn postgres() -> Self {
        Self::from_patterns(POSTGRES_PREFIXES)
    }

    /// Expand glob patterns (entries without wildcards are kept as-is).
    ///
    /// Matches are sorted so that lookups are deterministic across runs.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut prefixes = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if !pattern.contains(['*', '?', '[']) {
                prefixes.push(PathBuf::from(pattern));
                continue;
            }
            match glob::glob(pattern) {
                Ok(paths) => {
                    let mut matched: Vec<PathBuf> = paths.filter_map(|p| p.ok()).collect();
                    matched.sort();
                    prefixes.extend(matched);
                }
                Err(e) => {
                    tracing::warn!("Ignoring invalid search path pattern '{}': {}", pattern, e);
                }
            }
        }
        Self::new(prefixes)
    }

    /// Prepend `other`'s prefixes to this list.
    pub fn prepend(mut self, other: SearchPaths) -> Self {
        let mut prefixes = other.prefixes;
        prefixes.append(&mut self.prefixes);
        self.prefixes = prefixes;
        self
    }

    pub fn without_path_env(mut self) -> Self {
        self.use_path_env = false;
        self
    }

    pub fn prefixes(&self) -> &[PathBuf] {
        &self.prefixes
    }

    /// Locate `name`, trying `PATH` and then `<prefix>/<subdir>/<name>`.
    pub fn find_program(&self, name: &str, subdirs: &[&str]) -> Result<PathBuf> {
        if self.use_path_env {
            if let Ok(path) = which::which(name) {
                return Ok(path);
            }
        }

        for prefix in &self.prefixes {
            for subdir in subdirs {
                let candidate = prefix.join(subdir).join(name);
                if is_executable(&candidate) {
                    return Ok(candidate);
                }
            }
        }

        Err(Error::Configuration(format!("command not found: {}", name)))
    }
}

impl Default for SearchPaths {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn fake_binary(dir: &Path, name: &str) -> PathBuf {
        let bin = dir.join("bin");
        fs::create_dir_all(&bin).unwrap();
        let path = bin.join(name);
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_finds_program_under_prefix() {
        let temp = tempfile::tempdir().unwrap();
        let expected = fake_binary(temp.path(), "ephemeral-fake-server");

        let paths = SearchPaths::new(vec![temp.path().to_path_buf()]).without_path_env();
        let found = paths
            .find_program("ephemeral-fake-server", &["bin"])
            .unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_missing_program_is_configuration_error() {
        let err = SearchPaths::none()
            .find_program("sh", &["bin"])
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(ref msg) if msg == "command not found: sh"));
    }

    #[test]
    fn test_non_executable_file_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let path = fake_binary(temp.path(), "not-runnable");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let paths = SearchPaths::new(vec![temp.path().to_path_buf()]).without_path_env();
        assert!(paths.find_program("not-runnable", &["bin"]).is_err());
    }

    #[test]
    fn test_glob_patterns_expand_sorted() {
        let temp = tempfile::tempdir().unwrap();
        for version in ["16", "14", "15"] {
            fs::create_dir_all(temp.path().join(format!("pg-{}", version))).unwrap();
        }
        let pattern = format!("{}/pg-*", temp.path().display());
        let literal = "/does/not/exist".to_string();

        let paths = SearchPaths::from_patterns(&[literal.clone(), pattern]);
        let names: Vec<String> = paths
            .prefixes()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["exist", "pg-14", "pg-15", "pg-16"]);
        assert_eq!(paths.prefixes()[0], PathBuf::from(literal));
    }

    #[test]
    fn test_prepend_keeps_priority() {
        let a = SearchPaths::new(vec![PathBuf::from("/a")]);
        let b = SearchPaths::new(vec![PathBuf::from("/b")]);
        let merged = a.prepend(b);
        assert_eq!(merged.prefixes(), &[PathBuf::from("/b"), PathBuf::from("/a")]);
    }
}
