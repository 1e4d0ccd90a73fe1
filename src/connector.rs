//! Sources and sinks of text lines.
//!
//! The stream core only needs two things from storage: an iterator of lines to read and a
//! place to write a stream back. [`Connector`] captures exactly that. [`MemoryConnector`] keeps
//! lines in memory (handy in tests), and [`LinesFileConnector`] reads and writes newline-separated
//! text files.

use crate::error::Result;
use crate::item::Item;
use crate::stream::Stream;
use anyhow::{Context, bail};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Iterator of lines produced by a connector.
pub type LineIter = Box<dyn Iterator<Item = Result<String>>>;

/// A source of lines and a sink for streams.
pub trait Connector {
    /// Open the source and return its lines.
    ///
    /// # Errors
    /// Fails when the source cannot be opened or was closed.
    fn get_lines(&mut self) -> Result<LineIter>;

    /// Write every item of `stream`, one line per item. Returns the number of lines written.
    ///
    /// # Errors
    /// Fails on I/O errors or on the first failing item.
    fn write_stream(&mut self, stream: Stream) -> Result<usize>;

    /// Release handles. Calling it again is a no-op.
    ///
    /// # Errors
    /// Fails when flushing pending output fails.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Short human-readable name used in logs.
    fn describe(&self) -> String;
}

/// Lines held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryConnector {
    lines: Vec<String>,
    closed: bool,
}

impl MemoryConnector {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            closed: false,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl Connector for MemoryConnector {
    fn get_lines(&mut self) -> Result<LineIter> {
        if self.closed {
            bail!("{} is closed", self.describe());
        }
        Ok(Box::new(self.lines.clone().into_iter().map(Ok)))
    }

    fn write_stream(&mut self, stream: Stream) -> Result<usize> {
        if self.closed {
            bail!("{} is closed", self.describe());
        }
        let delimiter = stream.config().delimiter;
        self.lines.clear();
        for item in stream {
            self.lines.push(item?.to_line(delimiter));
        }
        Ok(self.lines.len())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn describe(&self) -> String {
        format!("memory({} lines)", self.lines.len())
    }
}

/// Newline-separated text files. Reading concatenates every path in order; writing targets
/// the first path.
#[derive(Clone, Debug)]
pub struct LinesFileConnector {
    paths: Vec<PathBuf>,
    skip_first_line: bool,
    closed: bool,
}

impl LinesFileConnector {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            paths: vec![path.as_ref().to_path_buf()],
            skip_first_line: false,
            closed: false,
        }
    }

    /// Every file matching `pattern`, in sorted path order.
    ///
    /// # Errors
    /// Fails on an invalid pattern or when nothing matches.
    #[cfg(feature = "io-glob")]
    pub fn from_glob(pattern: &str) -> Result<Self> {
        let entries = glob::glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.with_context(|| format!("error reading glob entry for {pattern}"))?;
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        if paths.is_empty() {
            bail!("no files found matching pattern: {pattern}");
        }
        Ok(Self {
            paths,
            skip_first_line: false,
            closed: false,
        })
    }

    /// Drop the first line of every file (repeated title rows).
    #[must_use]
    pub const fn skip_first_line(mut self, skip: bool) -> Self {
        self.skip_first_line = skip;
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Connector for LinesFileConnector {
    fn get_lines(&mut self) -> Result<LineIter> {
        if self.closed {
            bail!("{} is closed", self.describe());
        }
        let skip = usize::from(self.skip_first_line);
        let paths = self.paths.clone();
        let lines = paths.into_iter().flat_map(move |path| {
            let opened = File::open(&path).with_context(|| format!("open {}", path.display()));
            let iter: LineIter = match opened {
                Ok(f) => Box::new(BufReader::new(f).lines().skip(skip).map(move |l| {
                    l.with_context(|| format!("read {}", path.display()))
                })),
                Err(e) => Box::new(std::iter::once(Err(e))),
            };
            iter
        });
        Ok(Box::new(lines))
    }

    fn write_stream(&mut self, stream: Stream) -> Result<usize> {
        if self.closed {
            bail!("{} is closed", self.describe());
        }
        let Some(path) = self.paths.first() else {
            bail!("no output path");
        };
        let delimiter = stream.config().delimiter;
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut w = BufWriter::new(file);
        let mut n = 0;
        for item in stream {
            let item: Item = item?;
            writeln!(w, "{}", item.to_line(delimiter))?;
            n += 1;
        }
        w.flush().with_context(|| format!("flush {}", path.display()))?;
        tracing::debug!(path = %path.display(), lines = n, "wrote stream");
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn describe(&self) -> String {
        match self.paths.as_slice() {
            [one] => format!("file({})", one.display()),
            many => format!("files({})", many.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.tsv");
        let mut conn = LinesFileConnector::new(&path);
        let written = conn.write_stream(Stream::from_items(vec![Item::row([1, 2]), Item::row([3, 4])]))?;
        assert_eq!(written, 2);
        let lines = conn.get_lines()?.collect::<Result<Vec<_>>>()?;
        assert_eq!(lines, vec!["1\t2", "3\t4"]);
        conn.close()?;
        conn.close()?;
        assert!(conn.get_lines().is_err());
        Ok(())
    }

    #[cfg(feature = "io-glob")]
    #[test]
    fn glob_reads_files_in_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("b.txt"), "title\nb1\n")?;
        std::fs::write(dir.path().join("a.txt"), "title\na1\na2\n")?;
        let pattern = format!("{}/*.txt", dir.path().display());
        let mut conn = LinesFileConnector::from_glob(&pattern)?.skip_first_line(true);
        let lines = conn.get_lines()?.collect::<Result<Vec<_>>>()?;
        assert_eq!(lines, vec!["a1", "a2", "b1"]);
        Ok(())
    }
}
