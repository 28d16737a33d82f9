//! Daily reading log
//!
//! Emitted readings are appended to `<directory>/<YYYY-MM-DD>.csv`, one line
//! per reading: `lux,epoch_seconds,HH:MM:SS.ffffff,slot start,record type`.
//! When a reading opens a new day's file, the reading before it is carried
//! into that file and the new one is echoed into the previous day's file, so
//! pulse timing stays continuous across midnight.

use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::sensor::Reading;
use crate::slots::unit_slot_start;
use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Fields per well-formed log line
const FIELDS_PER_LINE: usize = 5;

/// One parsed log line
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub lux: f64,
    pub epoch_secs: f64,
    /// Local start of the unit price slot the reading belongs to
    pub slot_start: NaiveDateTime,
    pub record_type: String,
}

impl LogEntry {
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim().split(',');
        let lux = fields.next()?.trim().parse().ok()?;
        let epoch_secs = fields.next()?.trim().parse().ok()?;
        let _time = fields.next()?;
        let slot_start =
            NaiveDateTime::parse_from_str(fields.next()?.trim(), "%Y-%m-%d %H:%M:%S").ok()?;
        let record_type = fields.next()?.trim().to_string();
        if fields.next().is_some() {
            return None;
        }
        Some(Self {
            lux,
            epoch_secs,
            slot_start,
            record_type,
        })
    }
}

/// Appends readings to per-day CSV files in local time
pub struct ReadingLog {
    directory: PathBuf,
    tz: Tz,
    last_written: Option<Reading>,
    logger: StructuredLogger,
}

impl ReadingLog {
    pub fn new<P: AsRef<Path>>(directory: P, tz: Tz) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            tz,
            last_written: None,
            logger: get_logger("reading_log"),
        }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.directory
            .join(format!("{}.csv", date.format("%Y-%m-%d")))
    }

    /// Format one reading as a log line (no trailing newline)
    pub fn format_line(&self, reading: &Reading) -> String {
        let local = reading.timestamp.with_timezone(&self.tz);
        let epoch = reading.timestamp.timestamp_micros() as f64 / 1_000_000.0;
        format!(
            "{:06.2},{:.6},{},{},{}",
            reading.lux,
            epoch,
            local.format("%H:%M:%S%.6f"),
            unit_slot_start(&local).format("%Y-%m-%d %H:%M:%S"),
            reading.source.record_type()
        )
    }

    fn local_date(&self, reading: &Reading) -> NaiveDate {
        reading.timestamp.with_timezone(&self.tz).date_naive()
    }

    /// Append readings, each to the file of its local date
    pub async fn append(&mut self, readings: &[Reading]) -> Result<()> {
        let mut rest = readings;
        while let Some(first) = rest.first() {
            let date = self.local_date(first);
            let len = rest
                .iter()
                .position(|r| self.local_date(r) != date)
                .unwrap_or(rest.len());
            let (batch, tail) = rest.split_at(len);
            self.append_day(date, batch).await?;
            rest = tail;
        }
        Ok(())
    }

    async fn append_day(&mut self, date: NaiveDate, batch: &[Reading]) -> Result<()> {
        let Some(first) = batch.first() else {
            return Ok(());
        };

        let mut carried = self
            .last_written
            .filter(|prev| self.local_date(prev) != date);
        if carried.is_some() && tokio::fs::try_exists(self.path_for(date)).await? {
            carried = None;
        }

        let mut lines = String::new();
        for reading in carried.iter().chain(batch) {
            lines.push_str(&self.format_line(reading));
            lines.push('\n');
        }
        self.write(date, &lines).await?;

        if let Some(prev) = carried {
            let prev_date = self.local_date(&prev);
            if tokio::fs::try_exists(self.path_for(prev_date)).await? {
                let mut line = self.format_line(first);
                line.push('\n');
                self.write(prev_date, &line).await?;
            }
        }

        self.last_written = batch.last().copied();
        Ok(())
    }

    /// Parsed entries of one day's file; a missing file has none.
    /// Lines that do not parse are skipped.
    pub async fn read_day(&self, date: NaiveDate) -> Result<Vec<LogEntry>> {
        let bytes = match tokio::fs::read(self.path_for(date)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(LogEntry::parse)
            .collect())
    }

    /// Whether a log file exists for `date`
    pub async fn has_day(&self, date: NaiveDate) -> bool {
        tokio::fs::try_exists(self.path_for(date))
            .await
            .unwrap_or(false)
    }

    async fn write(&self, date: NaiveDate, lines: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(date))
            .await?;
        file.write_all(lines.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Drop corrupt lines from the most recently modified `count` log files.
    ///
    /// A power cut mid-write can leave partial or garbage lines; only ASCII
    /// lines with exactly five fields are kept. Returns the lines removed.
    pub async fn repair_recent(&self, count: usize) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                files.push((meta.modified()?, entry.path()));
            }
        }
        files.sort_by(|a, b| b.0.cmp(&a.0));

        let mut removed = 0;
        for (_, path) in files.into_iter().take(count) {
            let bytes = tokio::fs::read(&path).await?;
            let text = String::from_utf8_lossy(&bytes);
            let kept: Vec<&str> = text.lines().filter(|l| is_valid_line(l)).collect();
            let dropped = text.lines().count() - kept.len();
            if dropped > 0 || !bytes.is_ascii() {
                let mut out = kept.join("\n");
                if !out.is_empty() {
                    out.push('\n');
                }
                tokio::fs::write(&path, out).await?;
                self.logger.warn(&format!(
                    "Removed {} corrupt lines from {}",
                    dropped,
                    path.display()
                ));
                removed += dropped;
            }
        }
        Ok(removed)
    }
}

fn is_valid_line(line: &str) -> bool {
    line.is_ascii() && line.split(',').count() == FIELDS_PER_LINE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::ReadingSource;
    use chrono::{DateTime, Utc};
    use chrono_tz::Europe::London;

    fn reading(ts: &str, lux: f64, source: ReadingSource) -> Reading {
        Reading::new(
            DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc),
            lux,
            source,
        )
        .unwrap()
    }

    #[test]
    fn line_format_matches_log_layout() {
        let log = ReadingLog::new("/tmp", London);
        let line = log.format_line(&reading(
            "2023-07-01T11:45:10.250Z",
            3.5,
            ReadingSource::Interpolated,
        ));
        assert_eq!(
            line,
            "003.50,1688211910.250000,12:45:10.250000,2023-07-01 12:30:00,fixed"
        );
    }

    #[tokio::test]
    async fn midnight_lines_are_carried_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ReadingLog::new(dir.path(), London);
        log.append(&[
            reading("2023-12-01T23:59:59Z", 1.0, ReadingSource::Sensor),
            reading("2023-12-02T00:00:01Z", 2.0, ReadingSource::Sensor),
        ])
        .await
        .unwrap();
        log.append(&[reading("2023-12-02T00:00:02Z", 3.0, ReadingSource::Sensor)])
            .await
            .unwrap();

        let first = log
            .read_day(NaiveDate::from_ymd_opt(2023, 12, 1).unwrap())
            .await
            .unwrap();
        let second = log
            .read_day(NaiveDate::from_ymd_opt(2023, 12, 2).unwrap())
            .await
            .unwrap();

        // Yesterday gets the first reading of the new day echoed once
        let lux: Vec<f64> = first.iter().map(|e| e.lux).collect();
        assert_eq!(lux, vec![1.0, 2.0]);
        // Today starts with the last reading of yesterday
        let lux: Vec<f64> = second.iter().map(|e| e.lux).collect();
        assert_eq!(lux, vec![1.0, 2.0, 3.0]);
        assert_eq!(second[0].slot_start.date().to_string(), "2023-12-01");
        assert!(second.iter().all(|e| e.record_type == "original"));
    }

    #[tokio::test]
    async fn first_file_has_nothing_to_carry() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ReadingLog::new(dir.path(), London);
        log.append(&[reading("2023-12-02T08:00:00Z", 5.0, ReadingSource::Sensor)])
            .await
            .unwrap();
        let day = NaiveDate::from_ymd_opt(2023, 12, 2).unwrap();
        assert_eq!(log.read_day(day).await.unwrap().len(), 1);
        assert!(!log.has_day(day.pred_opt().unwrap()).await);
    }

    #[test]
    fn parses_log_lines() {
        let entry = LogEntry::parse(
            "003.50,1688211910.250000,12:45:10.250000,2023-07-01 12:30:00,fixed",
        )
        .unwrap();
        assert!((entry.lux - 3.5).abs() < 1e-9);
        assert!((entry.epoch_secs - 1_688_211_910.25).abs() < 1e-6);
        assert_eq!(entry.slot_start.to_string(), "2023-07-01 12:30:00");
        assert_eq!(entry.record_type, "fixed");

        assert!(LogEntry::parse("003.50,1688211910.25").is_none());
        assert!(LogEntry::parse("a,b,c,d,e").is_none());
    }

    #[tokio::test]
    async fn repair_drops_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2023-12-01.csv");
        std::fs::write(
            &path,
            "001.00,1.000000,00:00:01.000000,2023-12-01 00:00:00,original\n\
             001.0\u{fffd}0,1\n\
             002.00,2.000000,00:00:02.000000,2023-12-01 00:00:00,fixed\n",
        )
        .unwrap();

        let log = ReadingLog::new(dir.path(), London);
        assert_eq!(log.repair_recent(2).await.unwrap(), 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert_eq!(log.repair_recent(2).await.unwrap(), 0);
    }
}
