//! ZIP container access for report packages.
//!
//! A [`Container`] is opened once from the package bytes and kept for the
//! whole session. Reads go straight to the archive; writes are staged and
//! only materialize when the archive is re-serialized with
//! [`Container::to_bytes`].

use crate::encoding::{decode_text, TextEncoding};
use crate::PbixError;
use std::io::{Cursor, Read, Write};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Upper bound on the buffer reserved up front from an entry's declared size.
const READ_CAPACITY_LIMIT: u64 = 64 << 20;

#[derive(Debug, Clone)]
pub struct Container {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    staged: Vec<(String, Vec<u8>)>,
}

impl Container {
    pub fn open(bytes: Vec<u8>) -> Result<Self, PbixError> {
        let size = bytes.len();
        let archive = ZipArchive::new(Cursor::new(bytes)).map_err(PbixError::InvalidArchive)?;

        tracing::debug!(size, entries = archive.len(), "opened package archive");

        Ok(Self { archive, staged: Vec::new() })
    }

    /// Entry names in archive order, followed by staged entries that are new.
    pub fn entry_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.archive.file_names().map(str::to_owned).collect();

        for (path, _) in &self.staged {
            if !names.iter().any(|name| name == path) {
                names.push(path.clone());
            }
        }

        names
    }

    pub fn contains(&self, path: &str) -> bool {
        self.staged_entry(path).is_some() || self.archive.index_for_name(path).is_some()
    }

    pub fn read_bytes(&mut self, path: &str) -> Result<Vec<u8>, PbixError> {
        if let Some(bytes) = self.staged_entry(path) {
            return Ok(bytes.to_vec());
        }

        let mut file = match self.archive.by_name(path) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => {
                return Err(PbixError::EntryNotFound { path: path.to_owned() })
            }
            Err(err) => return Err(PbixError::InvalidArchive(err)),
        };

        let mut bytes = Vec::with_capacity(read_capacity(file.size()));
        file.read_to_end(&mut bytes)
            .map_err(|err| PbixError::InvalidArchive(ZipError::Io(err)))?;

        Ok(bytes)
    }

    pub fn read_text(&mut self, path: &str, encoding: TextEncoding) -> Result<String, PbixError> {
        let bytes = self.read_bytes(path)?;
        Ok(decode_text(&bytes, encoding))
    }

    /// Stages `bytes` under `path`. Staging the same path twice keeps the
    /// latest bytes; an archive entry with that path is replaced on write.
    pub fn insert_entry(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        let path = path.into();

        match self.staged.iter_mut().find(|(staged, _)| *staged == path) {
            Some((_, existing)) => *existing = bytes,
            None => self.staged.push((path, bytes)),
        }
    }

    /// Re-serializes the archive. Untouched entries are copied in their
    /// compressed form, so their data, CRC and compression method survive
    /// unchanged.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, PbixError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut copied = 0usize;

        for index in 0..self.archive.len() {
            let file = self.archive.by_index_raw(index).map_err(PbixError::InvalidArchive)?;

            if self.staged.iter().any(|(path, _)| path == file.name()) {
                tracing::debug!(entry = file.name(), "replacing existing entry");
                continue;
            }

            writer.raw_copy_file(file).map_err(PbixError::Write)?;
            copied += 1;
        }

        for (path, bytes) in &self.staged {
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            writer.start_file(path.as_str(), options).map_err(PbixError::Write)?;
            writer.write_all(bytes).map_err(|err| PbixError::Write(ZipError::Io(err)))?;
        }

        let bytes = writer.finish().map_err(PbixError::Write)?.into_inner();

        tracing::debug!(copied, staged = self.staged.len(), size = bytes.len(), "serialized package");

        Ok(bytes)
    }

    fn staged_entry(&self, path: &str) -> Option<&[u8]> {
        self.staged.iter().find(|(staged, _)| staged == path).map(|(_, bytes)| bytes.as_slice())
    }
}

/// The declared size comes from the archive and is only a hint.
fn read_capacity(declared: u64) -> usize {
    usize::try_from(declared.min(READ_CAPACITY_LIMIT)).unwrap_or(0)
}
