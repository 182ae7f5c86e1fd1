/*! Writes [`SummaryRecord`]s as CSV rows or newline-delimited JSON. */

use std::borrow::Cow;
use std::io::{self, Write};

use bstr::ByteSlice;
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::record::SummaryRecord;

/// Columns of the CSV report.
pub const HEADER: [&str; 9] = [
    "Date",
    "Timestamp",
    "Timezone",
    "Hostname",
    "Bupname",
    "Detection Name",
    "Original Name",
    "MD5",
    "Bup Corrupt?",
];

/// Errors returned while writing a report.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReportError {
    /// Error while writing a CSV record.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Error while serializing a JSON object.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// I/O error in the underlying writer.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Format of the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Comma-separated values with a header row.
    #[default]
    Csv,
    /// One JSON object per line.
    Ndjson,
}

/// Writes records to `W` in a given [`ReportFormat`].
pub struct ReportWriter<W: Write> {
    inner: Inner<W>,
}

enum Inner<W: Write> {
    Csv(csv::Writer<W>),
    Ndjson(W),
}

impl<W: Write> ReportWriter<W> {
    /// Creates a new writer. In CSV format the header is written
    /// immediately.
    pub fn new(writer: W, format: ReportFormat) -> Result<Self, ReportError> {
        let inner = match format {
            ReportFormat::Csv => {
                let mut csv = csv::Writer::from_writer(writer);
                csv.write_record(HEADER)?;
                Inner::Csv(csv)
            }
            ReportFormat::Ndjson => Inner::Ndjson(writer),
        };
        Ok(Self { inner })
    }

    /// Writes a record.
    pub fn write(&mut self, record: &SummaryRecord) -> Result<(), ReportError> {
        match &mut self.inner {
            Inner::Csv(csv) => csv.write_record(csv_row(record))?,
            Inner::Ndjson(writer) => {
                serde_json::to_writer(&mut *writer, &JsonRecord::from(record))?;
                writer.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> Result<(), ReportError> {
        match &mut self.inner {
            Inner::Csv(csv) => csv.flush()?,
            Inner::Ndjson(writer) => writer.flush()?,
        }
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W, ReportError> {
        match self.inner {
            Inner::Csv(csv) => {
                csv.into_inner().map_err(|err| err.into_error().into())
            }
            Inner::Ndjson(mut writer) => {
                writer.flush()?;
                Ok(writer)
            }
        }
    }
}

/// Returns the CSV row for a record, with the columns in [`HEADER`].
///
/// A corrupt record only has `Hostname`, `Bupname` and `Bup Corrupt?`.
///
/// ```
/// # use bup_summary::report::csv_row;
/// # use bup_summary::SummaryRecord;
/// let row = csv_row(&SummaryRecord::corrupt("HOST", "HOST/a.bup"));
/// assert_eq!(row, ["", "", "", "HOST", "HOST/a.bup", "", "", "", "True"]);
/// ```
pub fn csv_row(record: &SummaryRecord) -> [String; 9] {
    let detail = |key: &str| {
        record
            .detail(key)
            .map(|value| value.to_str_lossy().into_owned())
            .unwrap_or_default()
    };

    let joined = |keys: [&str; 3], sep: &str| {
        keys.iter()
            .map(|key| record.detail(key).map(|v| v.to_str_lossy()))
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.join(sep))
            .unwrap_or_default()
    };

    let Some(parsed) = record.parsed_record() else {
        return [
            String::new(),
            String::new(),
            String::new(),
            record.hostname().to_string(),
            record.container_path().to_string(),
            String::new(),
            String::new(),
            String::new(),
            record.corrupt_flag().to_string(),
        ];
    };

    [
        joined(["CreationYear", "CreationMonth", "CreationDay"], "-"),
        joined(["CreationHour", "CreationMinute", "CreationSecond"], ":"),
        detail("TimeZoneName"),
        record.hostname().to_string(),
        record.container_path().to_string(),
        detail("DetectionName"),
        parsed.original_name().to_string(),
        parsed.sample_hash().to_string(),
        record.corrupt_flag().to_string(),
    ]
}

type JsonSections<'a> = IndexMap<&'a str, IndexMap<&'a str, Cow<'a, str>>>;

#[derive(Serialize)]
struct JsonRecord<'a> {
    hostname: &'a str,
    bupname: &'a str,
    corrupt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sections: Option<JsonSections<'a>>,
}

impl<'a> From<&'a SummaryRecord> for JsonRecord<'a> {
    fn from(record: &'a SummaryRecord) -> Self {
        let parsed = record.parsed_record();

        let sections = parsed.map(|parsed| {
            parsed
                .sections()
                .iter()
                .map(|(name, section)| {
                    let values: IndexMap<_, _> = section
                        .iter()
                        .map(|(key, value)| (key.as_str(), value.to_str_lossy()))
                        .collect();
                    (name.as_str(), values)
                })
                .collect::<JsonSections>()
        });

        Self {
            hostname: record.hostname(),
            bupname: record.container_path(),
            corrupt: record.is_corrupt(),
            md5: parsed.map(|p| p.sample_hash().to_string()),
            original_name: parsed.map(|p| p.original_name().to_string()),
            sections,
        }
    }
}
