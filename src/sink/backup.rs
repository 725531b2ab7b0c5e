//! Backup log of every raw record
//!
//! Written before decoding so unknown or undecodable fields are kept too.
//! The file can be replayed with `replay_format = "backup"`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use tracing::info;

use super::{dated_path, open_append, Sink};
use crate::error::Result;
use crate::vedirect::reader::RawRecord;

/// Timestamp column format
pub const BACKUP_TIME_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

pub struct BackupSink {
    dir: PathBuf,
    prefix: String,
    current: Option<(NaiveDate, BufWriter<File>)>,
}

impl BackupSink {
    pub fn new<P: AsRef<Path>>(dir: P, prefix: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            prefix: prefix.to_string(),
            current: None,
        }
    }

    fn writer(&mut self, date: NaiveDate) -> Result<&mut BufWriter<File>> {
        let current = match self.current.take() {
            Some((d, writer)) if d == date => (d, writer),
            _ => {
                let path = dated_path(&self.dir, &self.prefix, date, "log");
                info!("Backup log: {}", path.display());
                (date, BufWriter::new(open_append(&path)?))
            }
        };
        Ok(&mut self.current.insert(current).1)
    }
}

impl Sink for BackupSink {
    fn name(&self) -> &'static str {
        "backup"
    }

    fn record(&mut self, record: &RawRecord, now: DateTime<Local>) -> Result<()> {
        let writer = self.writer(now.date_naive())?;
        writeln!(
            writer,
            "{}\t{}\t{}",
            now.format(BACKUP_TIME_FORMAT),
            record.key,
            record.value
        )?;
        writer.flush()?;
        Ok(())
    }
}
