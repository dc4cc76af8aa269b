//! # Incremental Output Module
//!
//! This module owns everything the collector persists: the aggregate-mode
//! and raw-mode CSV files and the plain-text failure log. Writers append
//! one record at a time and push it to stable storage before returning, so
//! a crash after record K leaves records 1..K durably on disk and nothing
//! half-written buffered in the process.
//!
//! ## Key Components
//!
//! - `OpenMode`: fresh-with-header vs append-to-existing
//! - `CountWriter`: aggregate hit-count rows in a fixed column order
//! - `ItemWriter`: raw item rows, columns fixed by the first item written
//! - `FailureLog`: one three-line block per terminally-failed request

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::extract::{CountRecord, ItemRecord};

/// Column order of the aggregate-mode output file
pub const COUNT_COLUMNS: [&str; 7] = [
    "term",
    "subreddit",
    "before",
    "after",
    "hits",
    "submission",
    "hit_type",
];

/// How an output file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Truncate and write a fresh header
    Create,

    /// Append to an existing file, keeping its header; a missing or empty
    /// file gets a header as if created fresh
    Append,
}

/// Open a CSV output file, reporting whether it still needs a header
fn open_csv(path: &Path, mode: OpenMode) -> Result<(csv::Writer<File>, bool)> {
    let (file, needs_header) = match mode {
        OpenMode::Create => (File::create(path)?, true),
        OpenMode::Append => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let empty = file.metadata()?.len() == 0;
            (file, empty)
        }
    };
    Ok((csv::Writer::from_writer(file), needs_header))
}

/// Flush the CSV writer and sync the row to stable storage
fn sync_csv(writer: &mut csv::Writer<File>) -> Result<()> {
    writer.flush()?;
    writer.get_ref().sync_data()?;
    Ok(())
}

/// Incremental writer for aggregate-mode hit-count records
pub struct CountWriter {
    writer: csv::Writer<File>,
}

impl CountWriter {
    /// Open the output file, writing the header when the file is fresh
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let (mut writer, needs_header) = open_csv(path.as_ref(), mode)?;
        if needs_header {
            writer.write_record(COUNT_COLUMNS)?;
            sync_csv(&mut writer)?;
        }
        debug!(path = %path.as_ref().display(), ?mode, "opened count output");
        Ok(Self { writer })
    }

    /// Append one record and sync it before returning
    pub fn write(&mut self, record: &CountRecord) -> Result<()> {
        let before = record.before.to_string();
        let after = record.after.to_string();
        let hits = record.hits.to_string();
        self.writer.write_record([
            record.term.as_str(),
            record.subreddit.as_str(),
            before.as_str(),
            after.as_str(),
            hits.as_str(),
            if record.is_submission { "1" } else { "0" },
            record.precision.as_str(),
        ])?;
        sync_csv(&mut self.writer)
    }
}

/// Incremental writer for raw-mode item records
///
/// The upstream does not publish a fixed item schema, so the column set is
/// fixed by the first item written (field names, sorted) and held for the
/// file's lifetime. When appending to an existing file the columns are
/// taken from its header instead. Fields absent from a later item write as
/// empty cells; structured values are JSON-encoded into their cell.
pub struct ItemWriter {
    writer: csv::Writer<File>,
    columns: Option<Vec<String>>,
}

impl ItemWriter {
    /// Open the output file; an existing non-empty file fixes the columns
    /// from its header
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let columns = match mode {
            OpenMode::Append if path.exists() => read_header(path)?,
            _ => None,
        };
        let (writer, _) = open_csv(path, mode)?;
        debug!(path = %path.display(), ?mode, "opened item output");
        Ok(Self { writer, columns })
    }

    /// Append one item and sync it before returning
    ///
    /// The first item written to a fresh file also writes the header.
    pub fn write(&mut self, item: &ItemRecord) -> Result<()> {
        if self.columns.is_none() {
            let mut columns: Vec<String> = item.fields.keys().cloned().collect();
            columns.sort();
            self.writer.write_record(&columns)?;
            self.columns = Some(columns);
        }
        let columns = self.columns.as_ref().expect("columns fixed above");
        let row: Vec<String> = columns
            .iter()
            .map(|column| cell_text(item.fields.get(column)))
            .collect();
        self.writer.write_record(&row)?;
        sync_csv(&mut self.writer)
    }
}

/// Read the header row of an existing CSV file, if it has one
fn read_header(path: &Path) -> Result<Option<Vec<String>>> {
    if File::open(path)?.metadata()?.len() == 0 {
        return Ok(None);
    }
    let mut reader = csv::Reader::from_path(path)?;
    let header = reader.headers()?;
    Ok(Some(header.iter().map(str::to_string).collect()))
}

/// Render one item field as CSV cell text
fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(scalar @ (Value::Bool(_) | Value::Number(_))) => scalar.to_string(),
        Some(structured) => structured.to_string(),
    }
}

/// Append-only plain-text log of terminally-failed requests
///
/// Each entry is a block of three lines: status code, request URL,
/// response body.
pub struct FailureLog {
    file: File,
}

impl FailureLog {
    /// Open (or create) the log for appending
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self { file })
    }

    /// Append one failed-request entry and sync it
    pub fn append(&mut self, status: u16, url: &str, body: &str) -> Result<()> {
        writeln!(self.file, "{status}")?;
        writeln!(self.file, "{url}")?;
        writeln!(self.file, "{body}")?;
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::HitPrecision;
    use serde_json::json;
    use tempfile::TempDir;

    fn record() -> CountRecord {
        CountRecord {
            term: "sports".to_string(),
            subreddit: "uci".to_string(),
            before: 1_675_209_600,
            after: 1_672_531_200,
            hits: 42,
            precision: HitPrecision::Exact,
            is_submission: false,
        }
    }

    fn item(fields: Value) -> ItemRecord {
        let fields = match fields {
            Value::Object(fields) => fields,
            _ => unreachable!(),
        };
        ItemRecord {
            id: fields["id"].as_str().unwrap().to_string(),
            fields,
        }
    }

    #[test]
    fn test_count_writer_fixed_column_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counts.csv");

        let mut writer = CountWriter::open(&path, OpenMode::Create).unwrap();
        writer.write(&record()).unwrap();
        drop(writer);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines, vec![
            "term,subreddit,before,after,hits,submission,hit_type",
            "sports,uci,1675209600,1672531200,42,0,eq",
        ]);
    }

    #[test]
    fn test_count_writer_append_keeps_single_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counts.csv");

        let mut writer = CountWriter::open(&path, OpenMode::Create).unwrap();
        writer.write(&record()).unwrap();
        drop(writer);

        // A second append pass duplicates rows, never the header.
        let mut writer = CountWriter::open(&path, OpenMode::Append).unwrap();
        writer.write(&record()).unwrap();
        drop(writer);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "term,subreddit,before,after,hits,submission,hit_type");
        assert_eq!(lines[1], lines[2]);
    }

    #[test]
    fn test_count_writer_append_to_missing_file_writes_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counts.csv");

        let mut writer = CountWriter::open(&path, OpenMode::Append).unwrap();
        writer.write(&record()).unwrap();
        drop(writer);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("term,subreddit,"));
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_count_writer_create_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counts.csv");
        std::fs::write(&path, "stale contents\n").unwrap();

        let mut writer = CountWriter::open(&path, OpenMode::Create).unwrap();
        writer.write(&record()).unwrap();
        drop(writer);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("stale"));
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_item_writer_columns_from_first_item() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.csv");

        let mut writer = ItemWriter::open(&path, OpenMode::Create).unwrap();
        writer
            .write(&item(json!({"id": "a1", "score": 5, "author": "x"})))
            .unwrap();
        // Missing `score`, extra `title`: absent fields write empty cells
        // and fields outside the fixed columns are dropped.
        writer
            .write(&item(json!({"id": "a2", "author": "y", "title": "t"})))
            .unwrap();
        drop(writer);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines, vec!["author,id,score", "x,a1,5", "y,a2,"]);
    }

    #[test]
    fn test_item_writer_encodes_structured_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.csv");

        let mut writer = ItemWriter::open(&path, OpenMode::Create).unwrap();
        writer
            .write(&item(json!({"id": "a1", "media": {"kind": "video"}})))
            .unwrap();
        drop(writer);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines[0], "id,media");
        assert_eq!(lines[1], r#"a1,"{""kind"":""video""}""#);
    }

    #[test]
    fn test_item_writer_append_reuses_existing_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.csv");

        let mut writer = ItemWriter::open(&path, OpenMode::Create).unwrap();
        writer.write(&item(json!({"id": "a1", "score": 5}))).unwrap();
        drop(writer);

        let mut writer = ItemWriter::open(&path, OpenMode::Append).unwrap();
        writer.write(&item(json!({"id": "a2", "score": 6}))).unwrap();
        drop(writer);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines, vec!["id,score", "a1,5", "a2,6"]);
    }

    #[test]
    fn test_failure_log_three_line_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failures.log");

        let mut log = FailureLog::open(&path).unwrap();
        log.append(500, "https://example.com/a", "server error").unwrap();
        log.append(404, "https://example.com/b", "not found").unwrap();
        drop(log);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines, vec![
            "500",
            "https://example.com/a",
            "server error",
            "404",
            "https://example.com/b",
            "not found",
        ]);
    }
}
