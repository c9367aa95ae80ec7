//! File selection rules shared by every connector.
//!
//! A path is loaded when it has an allowed extension (or is one of the
//! special extension-less files such as `README` or `Dockerfile`), none of
//! its directories is on the skip list, and its size is within the cap.
//! The same rules apply to GitHub trees and to local uploads.

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::config::GitHubConfig;

pub struct FileFilter {
    extensions: Vec<String>,
    special_files: Vec<String>,
    skip_set: GlobSet,
    max_file_size: u64,
}

impl FileFilter {
    pub fn new(
        extensions: &[String],
        skip_dirs: &[String],
        special_files: &[String],
        max_file_size: u64,
    ) -> Result<Self> {
        let mut patterns = Vec::with_capacity(skip_dirs.len() * 2);
        for dir in skip_dirs {
            patterns.push(format!("{}/**", dir));
            patterns.push(format!("**/{}/**", dir));
        }

        Ok(Self {
            extensions: extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            special_files: special_files.iter().map(|s| s.to_uppercase()).collect(),
            skip_set: build_globset(&patterns)?,
            max_file_size,
        })
    }

    pub fn from_config(config: &GitHubConfig) -> Result<Self> {
        Self::new(
            &config.extensions,
            &config.skip_dirs,
            &config.special_files,
            config.max_file_size,
        )
    }

    /// True when some directory component of `path` is on the skip list.
    pub fn is_skipped_dir(&self, path: &str) -> bool {
        self.skip_set.is_match(path)
    }

    /// True when the file name passes the extension / special-file rules.
    pub fn is_allowed_name(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        let (stem, ext) = match name.rfind('.') {
            Some(pos) if pos > 0 => (&name[..pos], Some(name[pos..].to_lowercase())),
            _ => (name, None),
        };

        if let Some(ext) = ext {
            if self.extensions.iter().any(|e| *e == ext) {
                return true;
            }
        }
        self.special_files.contains(&stem.to_uppercase())
    }

    /// Full check. `size` is `None` when the source does not report one.
    pub fn accepts(&self, path: &str, size: Option<u64>) -> bool {
        if self.is_skipped_dir(path) || !self.is_allowed_name(path) {
            return false;
        }
        match size {
            Some(bytes) => bytes <= self.max_file_size,
            None => true,
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(true)
                .build()?,
        );
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> FileFilter {
        FileFilter::new(
            &[".md".to_string(), "py".to_string()],
            &["node_modules".to_string(), ".git".to_string()],
            &["README".to_string(), "DOCKERFILE".to_string()],
            1_000,
        )
        .unwrap()
    }

    #[test]
    fn test_extension_allow_list() {
        let f = filter();
        assert!(f.accepts("README.md", None));
        assert!(f.accepts("app.py", None));
        assert!(f.accepts("pkg/APP.PY", None));
        assert!(!f.accepts("main.rs", None));
    }

    #[test]
    fn test_skip_dirs_at_any_depth() {
        let f = filter();
        assert!(!f.accepts("node_modules/x.md", None));
        assert!(!f.accepts("web/node_modules/lib/readme.md", None));
        assert!(!f.accepts(".git/HEAD.md", None));
        assert!(f.accepts("docs/node_modules_guide.md", None));
    }

    #[test]
    fn test_special_files_without_extension() {
        let f = filter();
        assert!(f.accepts("README", None));
        assert!(f.accepts("docker/Dockerfile", None));
        assert!(!f.accepts("Procfile", None));
    }

    #[test]
    fn test_size_cap() {
        let f = filter();
        assert!(f.accepts("big.md", Some(1_000)));
        assert!(!f.accepts("big.md", Some(1_001)));
    }

    #[test]
    fn test_dotfile_is_not_an_extension() {
        let f = FileFilter::new(&[".env".to_string()], &[], &[], 10).unwrap();
        assert!(!f.accepts(".env", None));
        assert!(f.accepts("local.env", None));
    }
}
