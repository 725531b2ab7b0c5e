//! # VE.Direct Frame Reader
//!
//! Reads `KEY<tab>VALUE` lines from the text-mode stream and recovers from
//! the binary checksum byte that ends every block.
//!
//! The checksum is sent as `Checksum<tab><byte>` where the byte is
//! arbitrary. When it happens to be `\n` the block ends with an extra empty
//! line, and when it is `\t` the line carries a trailing field. Both are
//! swallowed as part of the boundary.
//!
//! A stream opened mid-transmission usually starts inside a record or on
//! the checksum boundary, so leading empty and checksum lines are skipped.
//! After that, a line with an empty key, an empty value or trailing text is
//! malformed. Up to two consecutive malformed lines are discarded; the third
//! is fatal because the reader is then out of frame.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error};

use super::catalog::CHECKSUM_KEY;
use crate::error::{hex_dump, MonitorError, Result};

/// Consecutive malformed lines that make the reader give up
pub const MAX_MALFORMED_LINES: u32 = 3;

/// One `(key, value)` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub key: String,
    pub value: String,
}

/// Layout of each input line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineFormat {
    /// `KEY<tab>VALUE` as sent by the device or a relay
    #[default]
    Raw,
    /// `<date>-<time><tab>KEY<tab>VALUE` as written by the backup log
    Backup,
}

/// Line reader with checksum resynchronization
pub struct FrameReader<R> {
    input: R,
    format: LineFormat,
    line: Vec<u8>,
    /// Still skipping leading boundary lines
    pre_roll: bool,
    /// Last line was a checksum marker
    after_checksum: bool,
    malformed: u32,
}

impl<R> std::fmt::Debug for FrameReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("format", &self.format)
            .field("pre_roll", &self.pre_roll)
            .field("malformed", &self.malformed)
            .finish_non_exhaustive()
    }
}

enum Line<'a> {
    Record(&'a str, &'a str),
    Checksum,
    Empty,
    Malformed,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(input: R) -> Self {
        Self::with_format(input, LineFormat::Raw)
    }

    pub fn with_format(input: R, format: LineFormat) -> Self {
        Self {
            input,
            format,
            line: Vec::with_capacity(64),
            pre_roll: true,
            after_checksum: false,
            malformed: 0,
        }
    }

    /// Consecutive malformed lines seen so far
    pub fn malformed_count(&self) -> u32 {
        self.malformed
    }

    /// Read the next record
    ///
    /// # Returns
    ///
    /// * `Ok(Some(record))` - a well-formed record
    /// * `Ok(None)` - end of stream
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Io` if the input fails and
    /// `MonitorError::OutOfFrame` on the third consecutive malformed line.
    pub async fn next_record(&mut self) -> Result<Option<RawRecord>> {
        loop {
            self.line.clear();
            let n = self.input.read_until(b'\n', &mut self.line).await?;
            if n == 0 {
                return Ok(None);
            }

            while matches!(self.line.last(), Some(b'\n' | b'\r')) {
                self.line.pop();
            }

            let record = match split_line(&self.line, self.format) {
                Line::Checksum => {
                    self.after_checksum = true;
                    continue;
                }
                Line::Empty if self.pre_roll || self.after_checksum => {
                    self.after_checksum = false;
                    continue;
                }
                Line::Record(key, value) => RawRecord {
                    key: key.to_string(),
                    value: value.to_string(),
                },
                Line::Empty | Line::Malformed => {
                    self.pre_roll = false;
                    self.after_checksum = false;
                    self.malformed += 1;
                    if self.malformed >= MAX_MALFORMED_LINES {
                        error!(
                            "Out of frame after {} malformed lines: {}",
                            self.malformed,
                            hex_dump(&self.line)
                        );
                        return Err(MonitorError::OutOfFrame {
                            attempts: self.malformed,
                            raw: self.line.clone(),
                        });
                    }
                    debug!(
                        "Discarding malformed line ({}/{}): {}",
                        self.malformed,
                        MAX_MALFORMED_LINES,
                        hex_dump(&self.line)
                    );
                    continue;
                }
            };

            self.pre_roll = false;
            self.after_checksum = false;
            self.malformed = 0;
            return Ok(Some(record));
        }
    }
}

fn split_line(line: &[u8], format: LineFormat) -> Line<'_> {
    if line.is_empty() {
        return Line::Empty;
    }

    let mut parts = line.splitn(3, |&b| b == b'\t');
    if format == LineFormat::Backup {
        // Drop the timestamp column
        parts.next();
    }

    // The checksum value is binary, so only the key has to be readable
    let key = parts.next().unwrap_or_default();
    if key == CHECKSUM_KEY.as_bytes() {
        return Line::Checksum;
    }

    let value = parts.next().unwrap_or_default();
    let trailing = parts.next().unwrap_or_default();
    if key.is_empty() || value.is_empty() || !trailing.is_empty() {
        return Line::Malformed;
    }

    match (std::str::from_utf8(key), std::str::from_utf8(value)) {
        (Ok(key), Ok(value)) => Line::Record(key, value),
        _ => Line::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all(input: &[u8]) -> Result<Vec<RawRecord>> {
        let mut reader = FrameReader::new(input);
        let mut out = Vec::new();
        while let Some(record) = reader.next_record().await? {
            out.push(record);
        }
        Ok(out)
    }

    fn keys(records: &[RawRecord]) -> Vec<&str> {
        records.iter().map(|r| r.key.as_str()).collect()
    }

    #[tokio::test]
    async fn test_reads_records_and_strips_carriage_returns() {
        let records = read_all(b"V\t12800\r\nI\t-254\r\n").await.unwrap();
        assert_eq!(
            records,
            vec![
                RawRecord { key: "V".into(), value: "12800".into() },
                RawRecord { key: "I".into(), value: "-254".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_pre_roll_skips_leading_boundary() {
        let input = b"\r\nChecksum\t\x8a\r\nPID\t0x203\r\nV\t12800\r\n";
        let records = read_all(input).await.unwrap();
        assert_eq!(keys(&records), vec!["PID", "V"]);
    }

    #[tokio::test]
    async fn test_checksum_newline_byte_is_swallowed() {
        // checksum byte is itself a line feed, producing an empty line
        let input = b"V\t12800\r\nChecksum\t\n\r\nV\t12801\r\n";
        let records = read_all(input).await.unwrap();
        assert_eq!(keys(&records), vec!["V", "V"]);
        assert_eq!(records[1].value, "12801");
    }

    #[tokio::test]
    async fn test_checksum_tab_byte_is_swallowed() {
        let input = b"V\t12800\r\nChecksum\t\t\r\nV\t12801\r\n";
        let records = read_all(input).await.unwrap();
        assert_eq!(keys(&records), vec!["V", "V"]);
    }

    #[tokio::test]
    async fn test_binary_checksum_is_not_malformed() {
        let input = b"V\t1\r\nChecksum\t\xff\r\nChecksum\t\x00\r\nV\t2\r\n";
        let mut reader = FrameReader::new(&input[..]);
        reader.next_record().await.unwrap();
        reader.next_record().await.unwrap();
        assert_eq!(reader.malformed_count(), 0);
    }

    #[tokio::test]
    async fn test_two_malformed_lines_are_tolerated() {
        let input = b"V\t1\r\ngarbage\r\nI\t\r\nV\t2\r\n";
        let mut reader = FrameReader::new(&input[..]);
        assert_eq!(reader.next_record().await.unwrap().unwrap().value, "1");
        assert_eq!(reader.next_record().await.unwrap().unwrap().value, "2");
        assert_eq!(reader.malformed_count(), 0);
    }

    #[tokio::test]
    async fn test_third_malformed_line_is_fatal() {
        let input = b"V\t1\r\nbad\r\n\tx\r\nV\t1\textra\r\nV\t2\r\n";
        let mut reader = FrameReader::new(&input[..]);
        reader.next_record().await.unwrap();

        match reader.next_record().await {
            Err(MonitorError::OutOfFrame { attempts, raw }) => {
                assert_eq!(attempts, 3);
                assert_eq!(raw, b"V\t1\textra".to_vec());
            }
            other => panic!("Expected OutOfFrame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_good_line_resets_malformed_counter() {
        let input = b"a\r\nb\r\nV\t1\r\nc\r\nd\r\nV\t2\r\n";
        let records = read_all(input).await.unwrap();
        assert_eq!(keys(&records), vec!["V", "V"]);
    }

    #[tokio::test]
    async fn test_empty_line_mid_stream_is_malformed() {
        let input = b"V\t1\r\n\r\n\r\n\r\nV\t2\r\n";
        let result = read_all(input).await;
        assert!(matches!(result, Err(MonitorError::OutOfFrame { .. })));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_malformed() {
        let input = b"V\t1\r\nV\t\xff\xfe\r\n";
        let mut reader = FrameReader::new(&input[..]);
        reader.next_record().await.unwrap();
        assert!(reader.next_record().await.unwrap().is_none());
        assert_eq!(reader.malformed_count(), 1);
    }

    #[tokio::test]
    async fn test_backup_format_drops_timestamp() {
        let input = b"2026-10-16-12:00:00\tV\t12800\n2026-10-16-12:00:01\tI\t-254\n";
        let mut reader = FrameReader::with_format(&input[..], LineFormat::Backup);
        let first = reader.next_record().await.unwrap().unwrap();
        assert_eq!(first, RawRecord { key: "V".into(), value: "12800".into() });
        let second = reader.next_record().await.unwrap().unwrap();
        assert_eq!(second.key, "I");
    }

    #[tokio::test]
    async fn test_end_of_stream() {
        assert!(read_all(b"").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_error_is_reported() {
        let mock = tokio_test::io::Builder::new()
            .read(b"V\t12800\r\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let mut reader = FrameReader::new(tokio::io::BufReader::new(mock));

        assert!(reader.next_record().await.unwrap().is_some());
        assert!(matches!(reader.next_record().await, Err(MonitorError::Io(_))));
    }
}
