//! Temporary spill files for the external sort.
//!
//! A spill file holds a run of serialized records, each framed as a little-endian `u32`
//! length followed by its `postcard` encoding. Files live in a [`tempfile::NamedTempFile`]
//! owned by the [`SpillFile`] (and later by its [`SpillReader`]), so they are removed as soon
//! as the run is fully merged or the merge is abandoned.
//!
//! The encoding is an internal detail: spill files are never read by another process or
//! another version of this crate.

use crate::error::Result;
use anyhow::{Context, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::marker::PhantomData;
use std::path::Path;
use tempfile::NamedTempFile;

/// Largest accepted frame; anything bigger means the file is corrupt.
const MAX_FRAME: usize = 256 * 1024 * 1024;

/// A finished run on disk.
#[derive(Debug)]
pub struct SpillFile {
    file: NamedTempFile,
    len: usize,
}

impl SpillFile {
    /// Write `records` to a new temporary file in `dir` (the system temp dir when `None`).
    ///
    /// # Errors
    /// Fails when the file cannot be created or a record cannot be encoded.
    pub fn write<'a, T, I>(records: I, dir: Option<&Path>) -> Result<Self>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut builder = tempfile::Builder::new();
        builder.prefix("tabstream-spill-").suffix(".bin");
        let mut file = match dir {
            Some(d) => builder.tempfile_in(d),
            None => builder.tempfile(),
        }
        .context("create spill file")?;

        let mut len = 0;
        {
            let mut w = BufWriter::new(file.as_file_mut());
            for record in records {
                let bytes = postcard::to_allocvec(record).context("encode spill record")?;
                let frame = u32::try_from(bytes.len()).context("spill record too large")?;
                w.write_all(&frame.to_le_bytes())?;
                w.write_all(&bytes)?;
                len += 1;
            }
            w.flush().context("flush spill file")?;
        }
        tracing::debug!(path = %file.path().display(), records = len, "spilled run");
        Ok(Self { file, len })
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Turn the run into an iterator over its records. The file is deleted when the reader is
    /// dropped.
    ///
    /// # Errors
    /// Fails when the file cannot be reopened.
    pub fn into_reader<T: DeserializeOwned>(self) -> Result<SpillReader<T>> {
        let handle = self.file.reopen().context("reopen spill file")?;
        Ok(SpillReader {
            reader: BufReader::new(handle),
            remaining: self.len,
            _file: self.file,
            _marker: PhantomData,
        })
    }
}

/// Sequential reader over a [`SpillFile`]'s records.
#[derive(Debug)]
pub struct SpillReader<T> {
    reader: BufReader<File>,
    remaining: usize,
    _file: NamedTempFile,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> SpillReader<T> {
    fn read_frame(&mut self) -> Result<T> {
        let mut header = [0u8; 4];
        match self.reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => bail!("spill file truncated"),
            Err(e) => return Err(e).context("read spill frame header"),
        }
        let size = u32::from_le_bytes(header) as usize;
        if size > MAX_FRAME {
            bail!("spill frame of {size} bytes exceeds limit");
        }
        let mut buf = vec![0u8; size];
        self.reader
            .read_exact(&mut buf)
            .context("read spill frame")?;
        postcard::from_bytes(&buf).context("decode spill record")
    }
}

impl<T: DeserializeOwned> Iterator for SpillReader<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let out = self.read_frame();
        if out.is_err() {
            self.remaining = 0;
        }
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;
    use crate::value::Value;

    #[test]
    fn run_round_trips_and_is_removed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let records = vec![
            (vec![Value::from(1)], Item::row([1, 2])),
            (vec![Value::from("k")], Item::record([("a", Value::from(1.5))])),
        ];
        let run = SpillFile::write(&records, Some(dir.path()))?;
        assert_eq!(run.len(), 2);
        let path = run.path().to_path_buf();
        assert!(path.exists());

        let reader = run.into_reader::<(Vec<Value>, Item)>()?;
        let back = reader.collect::<Result<Vec<_>>>()?;
        assert_eq!(back, records);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn abandoned_reader_removes_file() -> Result<()> {
        let run = SpillFile::write(&[1u32, 2, 3], None)?;
        let path = run.path().to_path_buf();
        let mut reader = run.into_reader::<u32>()?;
        assert_eq!(reader.next().transpose()?, Some(1));
        drop(reader);
        assert!(!path.exists());
        Ok(())
    }
}
