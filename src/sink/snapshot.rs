//! Latest-value snapshot store
//!
//! One file per field key holding the current value. External pollers read
//! these instead of parsing the stream. Files are replaced atomically, and
//! only when the value changed.
//!
//! The alarm text only exists while an alarm is active, so its file is
//! removed when the alarm mask drops back to zero.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::Sink;
use crate::error::Result;
use crate::vedirect::catalog::{ALARM_KEY, ALARM_TEXT_KEY};
use crate::vedirect::decoder::Measurement;

/// Replace `path` with `contents` via a temporary file and rename
///
/// Readers see either the old or the new contents, never a partial write.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{}.tmp", name));

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(contents)?;
        file.flush()?;
    }

    fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&temp_path);
    })
}

pub struct SnapshotSink {
    dir: PathBuf,
    last: HashMap<&'static str, String>,
    writes: u64,
}

impl SnapshotSink {
    /// Create the sink, creating the directory if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            last: HashMap::new(),
            writes: 0,
        })
    }

    /// Number of files written so far
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Remove the file of a field that is no longer reported
    fn remove(&mut self, key: &str) -> Result<()> {
        self.last.remove(key);
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {
                debug!("Snapshot {} cleared", key);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Sink for SnapshotSink {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn measurement(&mut self, m: &Measurement) -> Result<()> {
        if m.key() == ALARM_KEY && m.numeric == Some(0) {
            self.remove(ALARM_TEXT_KEY)?;
        }

        let value = m.value_text();
        let path = self.path_for(m.key());

        // First sight of a key: compare against what a previous run left
        let previous = self.last.entry(m.key()).or_insert_with(|| {
            fs::read_to_string(&path)
                .map(|s| s.trim_end_matches('\n').to_string())
                .unwrap_or_default()
        });
        if *previous == value && path.exists() {
            return Ok(());
        }

        atomic_write(&path, format!("{}\n", value).as_bytes())?;
        debug!("Snapshot {} = {}", m.key(), value);
        *previous = value;
        self.writes += 1;
        Ok(())
    }
}
