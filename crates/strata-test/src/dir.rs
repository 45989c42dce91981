//! Temporary configuration directories.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{TestError, TestResult};

/// A temporary directory holding configuration files.
///
/// Removed when dropped.
#[derive(Debug)]
pub struct ConfigDir {
    dir: TempDir,
}

impl ConfigDir {
    /// Creates an empty directory.
    ///
    /// # Errors
    ///
    /// Fails when the temporary directory cannot be created.
    pub fn new() -> TestResult<Self> {
        let dir = TempDir::new().map_err(|e| TestError::io(std::env::temp_dir(), e))?;
        Ok(Self { dir })
    }

    /// Creates a directory holding `files`.
    ///
    /// # Errors
    ///
    /// Fails when any file cannot be written.
    pub fn with_files<'a, I>(files: I) -> TestResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let dir = Self::new()?;
        for (name, contents) in files {
            dir.write(name, contents)?;
        }
        Ok(dir)
    }

    /// The directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside the directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes (or overwrites) `name`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn write(&self, name: &str, contents: &str) -> TestResult<PathBuf> {
        let path = self.file(name);
        fs::write(&path, contents).map_err(|e| TestError::io(&path, e))?;
        Ok(path)
    }

    /// Deletes `name`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be removed.
    pub fn remove(&self, name: &str) -> TestResult<()> {
        let path = self.file(name);
        fs::remove_file(&path).map_err(|e| TestError::io(path, e))
    }

    /// Renames `from` to `to`.
    ///
    /// # Errors
    ///
    /// Fails when the rename fails.
    pub fn rename(&self, from: &str, to: &str) -> TestResult<()> {
        let source = self.file(from);
        fs::rename(&source, self.file(to)).map_err(|e| TestError::io(source, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_rename_remove() {
        let dir = ConfigDir::with_files([("app.yaml", "name: a\n")]).unwrap();
        assert_eq!(fs::read_to_string(dir.file("app.yaml")).unwrap(), "name: a\n");

        dir.rename("app.yaml", "config.yaml").unwrap();
        assert!(!dir.file("app.yaml").exists());
        assert!(dir.file("config.yaml").exists());

        dir.remove("config.yaml").unwrap();
        assert!(!dir.file("config.yaml").exists());
        assert!(matches!(dir.remove("config.yaml"), Err(TestError::Io { .. })));
    }
}
