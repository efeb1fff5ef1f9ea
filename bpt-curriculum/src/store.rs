//! Trace store: JSON Lines persistence for decision traces
//!
//! One self-describing JSON object per line, so a single record can be
//! parsed without any surrounding context and files can grow by append.

use crate::trace::TraceEntry;
use bpt_common::{Error, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Load every entry of a trace file
///
/// All-or-nothing: the first record that fails to deserialize or whose
/// parallel arrays disagree in length rejects the whole file.
pub fn load_entries(path: &Path) -> Result<Vec<TraceEntry>> {
    let file = File::open(path).map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to open trace");
        Error::io(path, "open", e)
    })?;

    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut line = Vec::new();
    let mut record = 0;
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).map_err(|e| {
            error!(path = %path.display(), record = record + 1, error = %e, "Failed to read trace");
            Error::io(path, "read", e)
        })?;
        if read == 0 {
            break;
        }
        record += 1;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        // Bytes go straight to serde so invalid UTF-8 is a corrupt record
        let entry: TraceEntry = serde_json::from_slice(&line).map_err(|e| Error::CorruptTrace {
            path: path.to_path_buf(),
            record,
            reason: e.to_string(),
        })?;
        entry.validate().map_err(|reason| Error::CorruptTrace {
            path: path.to_path_buf(),
            record,
            reason,
        })?;
        entries.push(entry);
    }

    debug!(path = %path.display(), entries = entries.len(), "Loaded trace");
    Ok(entries)
}

/// Write entries, appending to or replacing any existing file
pub fn save_entries(entries: &[TraceEntry], path: &Path, append: bool) -> Result<()> {
    save_records(entries, path, append)
}

/// Write any serializable records in the same one-object-per-line format
pub fn save_records<T: Serialize>(records: &[T], path: &Path, append: bool) -> Result<()> {
    let mut writer = RecordWriter::open(path, append)?;
    for record in records {
        writer.write(record)?;
    }
    writer.finish()
}

/// Streaming writer used to accumulate records across scheduler passes
pub struct RecordWriter {
    path: PathBuf,
    inner: BufWriter<File>,
    written: usize,
}

impl RecordWriter {
    /// Open for append (creating if absent) or truncate
    pub fn open(path: &Path, append: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(|e| {
                error!(path = %path.display(), error = %e, "Failed to open record file");
                Error::io(path, "open", e)
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            inner: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.inner, record)
            .map_err(|e| Error::io(&self.path, "serialize", e.into()))?;
        self.inner
            .write_all(b"\n")
            .map_err(|e| Error::io(&self.path, "write", e))?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush buffered records to disk
    pub fn finish(mut self) -> Result<()> {
        self.inner
            .flush()
            .map_err(|e| Error::io(&self.path, "flush", e))?;
        debug!(path = %self.path.display(), records = self.written, "Records written");
        Ok(())
    }
}
