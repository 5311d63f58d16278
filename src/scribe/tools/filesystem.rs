//! Sandboxed file access for the writing tools.
//!
//! Every path handed to [`FileSystemTool`] is relative to a root directory. Absolute
//! paths are rejected, `..` components are folded before joining, and the nearest
//! existing ancestor of the target is canonicalized so symlinks cannot lead outside
//! the root.
//!
//! # Example
//!
//! ```rust,no_run
//! use scribe::tools::FileSystemTool;
//! use std::path::PathBuf;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let fs = FileSystemTool::new().with_root_path(PathBuf::from("output"));
//! fs.create_directory("my_novel").await?;
//! fs.write_file("my_novel/chapter_01.md", "# Chapter One\n").await?;
//! let entries = fs.read_directory("my_novel").await?;
//! assert_eq!(entries.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::error::Error;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Failures raised by [`FileSystemTool`].
#[derive(Debug, Clone, PartialEq)]
pub enum FileSystemError {
    /// Path escapes the allowed root directory
    PathTraversal(String),
    /// Path does not exist
    NotFound(String),
    /// Path is a directory, but a file operation was attempted
    IsDirectory(String),
    /// File already exists when it shouldn't
    AlreadyExists(String),
    /// File extension not allowed
    ExtensionNotAllowed(String),
    /// IO error with context
    IOError(String),
    /// Invalid path format
    InvalidPath(String),
}

impl fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSystemError::PathTraversal(msg) => {
                write!(f, "Path traversal attempt blocked: {}", msg)
            }
            FileSystemError::NotFound(msg) => write!(f, "File not found: {}", msg),
            FileSystemError::IsDirectory(msg) => write!(f, "Is a directory: {}", msg),
            FileSystemError::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            FileSystemError::ExtensionNotAllowed(msg) => {
                write!(f, "Extension not allowed: {}", msg)
            }
            FileSystemError::IOError(msg) => write!(f, "IO error: {}", msg),
            FileSystemError::InvalidPath(msg) => write!(f, "Invalid path: {}", msg),
        }
    }
}

impl Error for FileSystemError {}

/// One entry returned by [`FileSystemTool::read_directory`].
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    /// File or directory name, without its parent path.
    pub name: String,
    pub is_directory: bool,
    /// Size in bytes; zero for directories.
    pub size: u64,
}

/// File operations confined to an optional root directory.
#[derive(Debug, Clone, Default)]
pub struct FileSystemTool {
    root_path: Option<PathBuf>,
    allowed_extensions: Option<Vec<String>>,
}

impl FileSystemTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confine all operations to `path`.
    pub fn with_root_path(mut self, path: PathBuf) -> Self {
        self.root_path = Some(path);
        self
    }

    /// Only accept files whose extension (without the dot) is in `extensions`.
    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = Some(extensions);
        self
    }

    /// Resolve a relative path against the root, refusing anything that escapes it.
    pub fn validate_path(&self, path: &str) -> Result<PathBuf, FileSystemError> {
        let requested = PathBuf::from(path);
        if requested.is_absolute() {
            return Err(FileSystemError::InvalidPath(
                "Absolute paths are not allowed".to_string(),
            ));
        }

        let mut normalized = PathBuf::new();
        for component in requested.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(FileSystemError::PathTraversal(format!(
                            "Path escapes root directory: {}",
                            path
                        )));
                    }
                }
                Component::Normal(part) => normalized.push(part),
                _ => {}
            }
        }

        let root = match &self.root_path {
            Some(root) => root,
            None => return Ok(normalized),
        };
        let effective = root.join(&normalized);

        let root_canonical = root
            .canonicalize()
            .map_err(|e| FileSystemError::IOError(format!("Cannot canonicalize root: {}", e)))?;

        // Canonicalize the deepest existing ancestor and re-attach the missing tail.
        let mut existing = effective.as_path();
        while !existing.exists() {
            existing = existing.parent().ok_or_else(|| {
                FileSystemError::InvalidPath("No existing ancestor found".to_string())
            })?;
        }
        let tail = effective.strip_prefix(existing).unwrap_or(Path::new(""));
        let canonical = existing
            .canonicalize()
            .map_err(|e| FileSystemError::IOError(format!("Cannot canonicalize path: {}", e)))?
            .join(tail);

        if !canonical.starts_with(&root_canonical) {
            return Err(FileSystemError::PathTraversal(format!(
                "Path escapes root directory: {}",
                path
            )));
        }

        Ok(effective)
    }

    fn check_extension(&self, path: &Path) -> Result<(), FileSystemError> {
        let allowed = match &self.allowed_extensions {
            Some(allowed) => allowed,
            None => return Ok(()),
        };
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        if allowed.iter().any(|a| a.eq_ignore_ascii_case(extension)) {
            Ok(())
        } else {
            Err(FileSystemError::ExtensionNotAllowed(format!(
                "'{}' (allowed: {})",
                path.display(),
                allowed.join(", ")
            )))
        }
    }

    /// Read a whole text file.
    pub async fn read_file(&self, path: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let full = self.validate_path(path)?;
        if full.is_dir() {
            return Err(Box::new(FileSystemError::IsDirectory(path.to_string())));
        }
        if !full.exists() {
            return Err(Box::new(FileSystemError::NotFound(path.to_string())));
        }
        let content = tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| FileSystemError::IOError(format!("reading {}: {}", path, e)))?;
        Ok(content)
    }

    /// Create or truncate a file, creating missing parent directories.
    pub async fn write_file(
        &self,
        path: &str,
        content: &str,
    ) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
        let full = self.prepare_write(path).await?;
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| FileSystemError::IOError(format!("writing {}: {}", path, e)))?;
        log::debug!("FileSystemTool::write_file(...): {} bytes to {}", content.len(), full.display());
        Ok(full)
    }

    /// Like [`write_file`](Self::write_file) but refuses to replace an existing file.
    pub async fn create_file(
        &self,
        path: &str,
        content: &str,
    ) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
        let full = self.prepare_write(path).await?;
        if full.exists() {
            return Err(Box::new(FileSystemError::AlreadyExists(path.to_string())));
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| FileSystemError::IOError(format!("creating {}: {}", path, e)))?;
        Ok(full)
    }

    /// Append to a file, creating it when absent.
    pub async fn append_file(
        &self,
        path: &str,
        content: &str,
    ) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
        use tokio::io::AsyncWriteExt;

        let full = self.prepare_write(path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .await
            .map_err(|e| FileSystemError::IOError(format!("opening {}: {}", path, e)))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| FileSystemError::IOError(format!("appending {}: {}", path, e)))?;
        file.flush()
            .await
            .map_err(|e| FileSystemError::IOError(format!("flushing {}: {}", path, e)))?;
        Ok(full)
    }

    /// Create a directory and any missing parents. Existing directories are fine.
    pub async fn create_directory(
        &self,
        path: &str,
    ) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
        if let Some(root) = &self.root_path {
            tokio::fs::create_dir_all(root)
                .await
                .map_err(|e| FileSystemError::IOError(format!("creating root: {}", e)))?;
        }
        let full = self.validate_path(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| FileSystemError::IOError(format!("creating {}: {}", path, e)))?;
        Ok(full)
    }

    /// List a directory's entries, sorted by name.
    pub async fn read_directory(
        &self,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, Box<dyn Error + Send + Sync>> {
        let full = self.validate_path(path)?;
        if !full.is_dir() {
            return Err(Box::new(FileSystemError::NotFound(path.to_string())));
        }

        let mut reader = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| FileSystemError::IOError(format!("listing {}: {}", path, e)))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| FileSystemError::IOError(format!("listing {}: {}", path, e)))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| FileSystemError::IOError(e.to_string()))?;
            entries.push(DirectoryEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_directory: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Every file below `path`, recursively, named by its `/`-separated path relative to
    /// `path` and sorted by that name. Directories themselves are not listed.
    pub async fn walk_files(
        &self,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, Box<dyn Error + Send + Sync>> {
        let mut files = Vec::new();
        let mut pending = vec![String::new()];
        while let Some(relative) = pending.pop() {
            let dir = match (path.is_empty(), relative.is_empty()) {
                (_, true) => path.to_string(),
                (true, false) => relative.clone(),
                (false, false) => format!("{}/{}", path, relative),
            };
            for entry in self.read_directory(&dir).await? {
                let name = if relative.is_empty() {
                    entry.name
                } else {
                    format!("{}/{}", relative, entry.name)
                };
                if entry.is_directory {
                    pending.push(name);
                } else {
                    files.push(DirectoryEntry {
                        name,
                        is_directory: false,
                        size: entry.size,
                    });
                }
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn prepare_write(&self, path: &str) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
        if let Some(root) = &self.root_path {
            tokio::fs::create_dir_all(root)
                .await
                .map_err(|e| FileSystemError::IOError(format!("creating root: {}", e)))?;
        }
        let full = self.validate_path(path)?;
        self.check_extension(&full)?;
        if full.is_dir() {
            return Err(Box::new(FileSystemError::IsDirectory(path.to_string())));
        }
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FileSystemError::IOError(format!("creating parent: {}", e)))?;
        }
        Ok(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, FileSystemTool) {
        let dir = TempDir::new().unwrap();
        let fs = FileSystemTool::new().with_root_path(dir.path().to_path_buf());
        (dir, fs)
    }

    #[tokio::test]
    async fn test_write_append_read() {
        let (_dir, fs) = sandbox();
        fs.write_file("book/ch1.md", "Hello").await.unwrap();
        fs.append_file("book/ch1.md", " world").await.unwrap();
        assert_eq!(fs.read_file("book/ch1.md").await.unwrap(), "Hello world");

        fs.write_file("book/ch1.md", "Replaced").await.unwrap();
        assert_eq!(fs.read_file("book/ch1.md").await.unwrap(), "Replaced");
    }

    #[tokio::test]
    async fn test_create_file_refuses_existing() {
        let (_dir, fs) = sandbox();
        fs.create_file("a.md", "first").await.unwrap();
        let err = fs.create_file("a.md", "second").await.unwrap_err();
        assert_eq!(err.to_string(), "Already exists: a.md");
        assert_eq!(fs.read_file("a.md").await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_traversal_is_blocked() {
        let (_dir, fs) = sandbox();
        assert!(matches!(
            fs.validate_path("../outside.md"),
            Err(FileSystemError::PathTraversal(_))
        ));
        assert!(matches!(
            fs.validate_path("/etc/passwd"),
            Err(FileSystemError::InvalidPath(_))
        ));
        assert!(fs.validate_path("a/../b.md").is_ok());
    }

    #[tokio::test]
    async fn test_extension_filter() {
        let (_dir, fs) = sandbox();
        let fs = fs.with_allowed_extensions(vec!["md".into(), "txt".into()]);
        assert!(fs.write_file("notes.txt", "ok").await.is_ok());
        let err = fs.write_file("run.sh", "nope").await.unwrap_err();
        assert!(err.to_string().starts_with("Extension not allowed"));
    }

    #[tokio::test]
    async fn test_read_directory_sorted() {
        let (_dir, fs) = sandbox();
        fs.write_file("p/b.md", "bb").await.unwrap();
        fs.write_file("p/a.md", "a").await.unwrap();
        fs.create_directory("p/drafts").await.unwrap();

        let entries = fs.read_directory("p").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.md", "b.md", "drafts"]);
        assert_eq!(entries[1].size, 2);
        assert!(entries[2].is_directory);
        assert!(fs.read_directory("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_walk_files_descends_into_subfolders() {
        let (_dir, fs) = sandbox();
        fs.write_file("p/intro.md", "hi").await.unwrap();
        fs.write_file("p/part1/ch1.md", "one").await.unwrap();
        fs.write_file("p/part1/deep/notes.txt", "n").await.unwrap();
        fs.create_directory("p/empty").await.unwrap();

        let files = fs.walk_files("p").await.unwrap();
        let names: Vec<_> = files.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["intro.md", "part1/ch1.md", "part1/deep/notes.txt"]);
        assert_eq!(files[1].size, 3);
        assert!(files.iter().all(|e| !e.is_directory));
    }
}
