//! Temporary line files for connector tests.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

/// A temporary file holding some lines. Deleted on drop.
pub struct TempLinesFile {
    file: NamedTempFile,
}

impl TempLinesFile {
    /// Write `lines` (newline-terminated) into a new temporary file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn new<I, S>(lines: I) -> std::io::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut file = tempfile::Builder::new()
            .prefix("tabstream-test-")
            .suffix(".tsv")
            .tempfile()?;
        for line in lines {
            writeln!(file, "{}", line.as_ref())?;
        }
        file.flush()?;
        Ok(Self { file })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Current content of the file, one entry per line.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_lines(&self) -> std::io::Result<Vec<String>> {
        read_lines(self.path())
    }
}

/// A temporary directory that is removed with everything in it on drop.
pub struct TempDirPath {
    dir: TempDir,
}

impl TempDirPath {
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self { dir: TempDir::new()? })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `lines` into `name` inside the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_lines<S: AsRef<str>>(&self, name: &str, lines: &[S]) -> std::io::Result<PathBuf> {
        let path = self.file_path(name);
        let mut content = String::new();
        for line in lines {
            content.push_str(line.as_ref());
            content.push('\n');
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Number of files currently in the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn file_count(&self) -> std::io::Result<usize> {
        Ok(std::fs::read_dir(self.path())?.count())
    }
}

/// Lines of the file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_lines(path: &Path) -> std::io::Result<Vec<String>> {
    Ok(std::fs::read_to_string(path)?.lines().map(str::to_string).collect())
}
