//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use super::entry::{HEADER_SIZE, MAX_ENTRY_SIZE};
use super::WalEntry;
use crate::error::{Result, SdError};

pub(crate) enum ReadOutcome {
    Entry(WalEntry),
    Eof,
    /// Tail cut short by an interrupted append
    Partial(String),
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset just past the last entry that decoded cleanly
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Read the next entry from the WAL.
    ///
    /// Returns `Ok(None)` at a clean end of file. A partially written tail
    /// or a checksum failure surfaces as [`SdError::WalCorruption`].
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.read_next()? {
            ReadOutcome::Entry(entry) => Ok(Some(entry)),
            ReadOutcome::Eof => Ok(None),
            ReadOutcome::Partial(reason) => Err(SdError::WalCorruption(reason)),
        }
    }

    pub(crate) fn read_next(&mut self) -> Result<ReadOutcome> {
        let mut header = [0u8; HEADER_SIZE];
        let read = self.read_full(&mut header)?;
        if read == 0 {
            return Ok(ReadOutcome::Eof);
        }
        if read < HEADER_SIZE {
            return Ok(ReadOutcome::Partial(format!(
                "partial header at offset {}: {read} of {HEADER_SIZE} bytes",
                self.position
            )));
        }

        let (lsn, crc, len) = WalEntry::parse_header(&header)?;
        if len as usize > MAX_ENTRY_SIZE {
            return Err(SdError::WalCorruption(format!(
                "entry length {len} at offset {} exceeds {MAX_ENTRY_SIZE}",
                self.position
            )));
        }
        let mut data = vec![0u8; len as usize];
        let read = self.read_full(&mut data)?;
        if read < data.len() {
            return Ok(ReadOutcome::Partial(format!(
                "partial entry at offset {}: {read} of {len} payload bytes",
                self.position
            )));
        }

        let entry = WalEntry::decode_payload(lsn, crc, len, &data)?;
        self.position += (HEADER_SIZE + data.len()) as u64;
        Ok(ReadOutcome::Entry(entry))
    }

    /// Byte offset of the end of the last valid entry
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Iterate over all valid entries, stopping after the first error
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
