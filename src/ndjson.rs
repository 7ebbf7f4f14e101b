use crate::timefmt::humanize_timestamps;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Buffered NDJSON writer: one serialized record per line.
/// Optionally rewrites numeric timestamp fields as RFC 3339 strings.
pub struct NdjsonWriter<W: Write> {
    w: BufWriter<W>,
    human_timestamps: bool,
    written: u64,
}

impl NdjsonWriter<File> {
    /// Creates (or truncates) `path`, creating missing parent directories.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self::new(File::create(path)?))
    }
}

impl NdjsonWriter<io::Stdout> {
    pub fn stdout() -> Self { Self::new(io::stdout()) }
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { w: BufWriter::with_capacity(64 * 1024, inner), human_timestamps: false, written: 0 }
    }

    pub fn with_human_timestamps(mut self, yes: bool) -> Self {
        self.human_timestamps = yes;
        self
    }

    pub fn write_record<T: Serialize>(&mut self, record: &T) -> io::Result<()> {
        if self.human_timestamps {
            let mut v = serde_json::to_value(record)?;
            humanize_timestamps(&mut v);
            serde_json::to_writer(&mut self.w, &v)?;
        } else {
            serde_json::to_writer(&mut self.w, record)?;
        }
        self.w.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn written(&self) -> u64 { self.written }

    /// Flushes and hands back the inner writer.
    pub fn finish(self) -> io::Result<W> {
        self.w.into_inner().map_err(|e| e.into_error())
    }
}
