//! On-disk layout of the static tree
//!
//! ```text
//! <static_dir>/
//!   css/
//!   uploads/
//!     input/    saved uploads
//!     output/   cutouts
//!     manual/   manual editor saves
//! ```

use crate::error::{BgRemovalError, Result};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    static_dir: PathBuf,
}

impl StorageLayout {
    pub fn new<P: Into<PathBuf>>(static_dir: P) -> Self {
        Self {
            static_dir: static_dir.into(),
        }
    }

    /// Create every folder of the layout
    ///
    /// # Errors
    /// - Folder creation failures
    pub fn ensure(&self) -> Result<()> {
        for dir in [self.input_dir(), self.output_dir(), self.manual_dir(), self.css_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| BgRemovalError::file_io_error("create directory", &dir, &e))?;
        }
        log::debug!("Static tree ready under {}", self.static_dir.display());
        Ok(())
    }

    #[must_use]
    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }

    #[must_use]
    pub fn uploads_dir(&self) -> PathBuf {
        self.static_dir.join("uploads")
    }

    #[must_use]
    pub fn input_dir(&self) -> PathBuf {
        self.uploads_dir().join("input")
    }

    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.uploads_dir().join("output")
    }

    #[must_use]
    pub fn manual_dir(&self) -> PathBuf {
        self.uploads_dir().join("manual")
    }

    #[must_use]
    pub fn css_dir(&self) -> PathBuf {
        self.static_dir.join("css")
    }

    /// Resolve a request path under `root`, refusing anything that could
    /// leave it (`..`, absolute paths, drive prefixes)
    #[must_use]
    pub fn resolve_under(root: &Path, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        let mut resolved = root.to_path_buf();
        let mut depth = 0usize;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                },
                Component::CurDir => {},
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        (depth > 0).then_some(resolved)
    }
}

/// Content type served for a static file, by extension
#[must_use]
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("html") => "text/html; charset=utf-8",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_creates_layout() {
        let temp_dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(temp_dir.path().join("static"));
        layout.ensure().unwrap();
        layout.ensure().unwrap();

        for dir in ["uploads/input", "uploads/output", "uploads/manual", "css"] {
            assert!(temp_dir.path().join("static").join(dir).is_dir(), "{dir}");
        }
    }

    #[test]
    fn test_resolve_under_rejects_traversal() {
        let root = Path::new("/srv/static");
        assert_eq!(
            StorageLayout::resolve_under(root, "uploads/output/a.png"),
            Some(PathBuf::from("/srv/static/uploads/output/a.png"))
        );
        assert_eq!(
            StorageLayout::resolve_under(root, "./css/site.css"),
            Some(PathBuf::from("/srv/static/css/site.css"))
        );
        assert_eq!(StorageLayout::resolve_under(root, "../secret"), None);
        assert_eq!(StorageLayout::resolve_under(root, "uploads/../../secret"), None);
        assert_eq!(StorageLayout::resolve_under(root, "/etc/passwd"), None);
        assert_eq!(StorageLayout::resolve_under(root, ""), None);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.svg")), "image/svg+xml");
        assert_eq!(content_type_for(Path::new("a.bin")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }
}
