//! Synchronous sinks and ZIP inspection.

use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use zip::ZipArchive;
use zip::extra_fields::ExtraField;

/// Cloneable in-memory writer; every clone appends to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that accepts `limit` bytes and then reports a broken pipe.
#[derive(Debug)]
pub struct FailingSink {
    remaining: usize,
}

impl FailingSink {
    /// Fail once more than `limit` bytes have been written.
    #[must_use]
    pub const fn after(limit: usize) -> Self {
        Self { remaining: limit }
    }
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
        }
        let accepted = buf.len().min(self.remaining);
        self.remaining -= accepted;
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One decoded archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Entry name inside the archive.
    pub name: String,
    /// Uncompressed contents.
    pub contents: Vec<u8>,
    /// Extended timestamp field, when the entry carries one.
    pub times: Option<EntryTimes>,
}

/// Unix-second timestamps from an extended timestamp extra field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryTimes {
    /// Last modification.
    pub modified: Option<u32>,
    /// Last access.
    pub accessed: Option<u32>,
    /// Creation.
    pub created: Option<u32>,
}

/// Decode every entry of `bytes` in central-directory order.
///
/// # Errors
///
/// Fails when `bytes` is not a complete archive.
pub fn read_zip(bytes: &[u8]) -> Result<Vec<ZipEntry>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).context("open archive")?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .with_context(|| format!("entry {index}"))?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .with_context(|| format!("read entry {}", file.name()))?;
        let times = file.extra_data_fields().find_map(|field| match field {
            ExtraField::ExtendedTimestamp(stamp) => Some(EntryTimes {
                modified: stamp.mod_time(),
                accessed: stamp.ac_time(),
                created: stamp.cr_time(),
            }),
            _ => None,
        });
        entries.push(ZipEntry {
            name: file.name().to_owned(),
            contents,
            times,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_sink_accepts_its_limit() {
        let mut sink = FailingSink::after(4);
        assert_eq!(sink.write(b"abc").ok(), Some(3));
        assert_eq!(sink.write(b"def").ok(), Some(1));
        assert!(sink.write(b"g").is_err());
    }

    #[test]
    fn read_zip_rejects_truncated_input() {
        assert!(read_zip(b"PK\x03\x04").is_err());
    }
}
