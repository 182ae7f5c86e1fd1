/*! Builds a [`SummaryRecord`] out of the streams of a container.

A quarantine container has two streams that matter: `Details`, with the
metadata about the detection, and `File_0`, with the quarantined sample.
Both are obfuscated with [`crate::cipher`].

```
# use bup_summary::assembler::{assemble, StreamTable};
# use bup_summary::cipher;
let table = StreamTable::from_iter([
    ("Details".to_string(), cipher::decode(b"[File_0]\nOriginalName=a.exe\n")),
    ("File_0".to_string(), cipher::decode(b"MZ")),
]);

let record = assemble(&table, "HOST", "HOST/a.bup");

assert_eq!(record.original_name().unwrap().to_string(), "a.exe");
```
*/

use indexmap::IndexMap;

use crate::details::{self, ValueSplit};
use crate::olecf::CompoundFile;
use crate::record::{
    NameEncoding, OriginalName, ParsedRecord, SampleHash, SummaryRecord,
};
use crate::{cipher, digest};

#[cfg(test)]
mod tests;

/// Name of the stream that contains the detection metadata.
pub const DETAILS_STREAM: &str = "Details";

/// Name of the stream that contains the quarantined sample.
pub const SAMPLE_STREAM: &str = "File_0";

/// Trait implemented by containers that hold named streams.
///
/// [`CompoundFile`] is the implementation used for actual quarantine files.
pub trait StreamSource {
    /// Error returned when a stream can't be read.
    type Error;

    /// Returns the names of all streams, in a stable order.
    fn stream_names(&self) -> Vec<String>;

    /// Returns the size of a stream.
    fn stream_size(&self, name: &str) -> Result<u64, Self::Error>;

    /// Returns the content of a stream.
    fn read_stream(&self, name: &str) -> Result<Vec<u8>, Self::Error>;
}

/// The raw streams of a container.
///
/// A container where any stream is empty is considered corrupt as a whole,
/// and a corrupt table doesn't keep any stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamTable {
    streams: IndexMap<String, Vec<u8>>,
    corrupt: bool,
}

impl StreamTable {
    /// Reads every stream in `source`.
    ///
    /// Reading stops at the first stream with size zero, and the resulting
    /// table is marked as corrupt.
    pub fn read_from<S: StreamSource>(source: &S) -> Result<Self, S::Error> {
        let mut table = Self::default();

        for name in source.stream_names() {
            if source.stream_size(&name)? == 0 {
                #[cfg(feature = "logging")]
                log::warn!("stream `{}` is empty, container is corrupt", name);
                return Ok(Self::corrupt());
            }
            let data = source.read_stream(&name)?;
            table.streams.insert(name, data);
        }

        Ok(table)
    }

    /// Creates a table for a container that is known to be corrupt.
    pub fn corrupt() -> Self {
        Self { streams: IndexMap::new(), corrupt: true }
    }

    /// Returns `true` if the container is corrupt.
    pub fn is_corrupt(&self) -> bool {
        self.corrupt
    }

    /// Returns the raw (still obfuscated) content of a stream.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.streams.get(name).map(|data| data.as_slice())
    }

    /// Returns the stream names in the table.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(|name| name.as_str())
    }
}

impl FromIterator<(String, Vec<u8>)> for StreamTable {
    /// Builds a table out of `(name, data)` pairs. If any of them is empty
    /// the table is corrupt.
    fn from_iter<T: IntoIterator<Item = (String, Vec<u8>)>>(iter: T) -> Self {
        let mut table = Self::default();
        for (name, data) in iter {
            if data.is_empty() {
                return Self::corrupt();
            }
            table.streams.insert(name, data);
        }
        table
    }
}

/// Turns [`StreamTable`]s into [`SummaryRecord`]s.
///
/// ```
/// # use bup_summary::assembler::{Assembler, StreamTable};
/// let record = Assembler::new()
///     .keep_unicode(true)
///     .assemble(&StreamTable::corrupt(), "HOST", "HOST/a.bup");
///
/// assert!(record.is_corrupt());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    name_encoding: NameEncoding,
    value_split: ValueSplit,
}

impl Assembler {
    /// Creates an [`Assembler`] with the default options: non-ASCII
    /// characters are removed from original names, and values that contain
    /// `=` are kept whole.
    pub fn new() -> Self {
        Self::default()
    }

    /// If `yes` is true, original names that are valid UTF-8 are reported
    /// as they are. By default names with non-ASCII characters lose those
    /// characters.
    pub fn keep_unicode(&mut self, yes: bool) -> &mut Self {
        self.name_encoding =
            if yes { NameEncoding::Utf8 } else { NameEncoding::Ascii };
        self
    }

    /// If `yes` is true, values are truncated at the second `=`, which is
    /// what older reports contain. See [`ValueSplit::Legacy`].
    pub fn legacy_values(&mut self, yes: bool) -> &mut Self {
        self.value_split =
            if yes { ValueSplit::Legacy } else { ValueSplit::FirstDelimiter };
        self
    }

    /// Builds the record for a container.
    ///
    /// `hostname` and `container_path` are copied into the record as they
    /// are.
    pub fn assemble(
        &self,
        table: &StreamTable,
        hostname: &str,
        container_path: &str,
    ) -> SummaryRecord {
        if table.is_corrupt() {
            return SummaryRecord::corrupt(hostname, container_path);
        }

        let sections = match table.get(DETAILS_STREAM) {
            Some(details) => {
                details::parse_with(&cipher::decode(details), self.value_split)
            }
            None => {
                #[cfg(feature = "logging")]
                log::warn!("`{}` has no {} stream", container_path, DETAILS_STREAM);
                details::SectionMap::new()
            }
        };

        let sample_hash = match table.get(SAMPLE_STREAM) {
            Some(sample) => {
                SampleHash::Md5(digest::md5_hex(&cipher::decode(sample)))
            }
            None => SampleHash::NotFound,
        };

        let original_name = OriginalName::from_raw(
            details::lookup(&sections, SAMPLE_STREAM, "OriginalName"),
            self.name_encoding,
        );

        SummaryRecord::parsed(
            hostname,
            container_path,
            ParsedRecord::new(sections, sample_hash, original_name),
        )
    }

    /// Parses `container` as a compound file and builds its record.
    ///
    /// A container that can't be parsed, or whose streams can't be read,
    /// produces a corrupt record.
    pub fn extract(
        &self,
        container: &[u8],
        hostname: &str,
        container_path: &str,
    ) -> SummaryRecord {
        let table = CompoundFile::parse(container)
            .and_then(|file| StreamTable::read_from(&file));

        match table {
            Ok(table) => self.assemble(&table, hostname, container_path),
            Err(_err) => {
                #[cfg(feature = "logging")]
                log::warn!("can't read `{}`: {}", container_path, _err);
                SummaryRecord::corrupt(hostname, container_path)
            }
        }
    }
}

/// Builds the record for a container using the default options.
///
/// See [`Assembler::assemble`].
pub fn assemble(
    table: &StreamTable,
    hostname: &str,
    container_path: &str,
) -> SummaryRecord {
    Assembler::new().assemble(table, hostname, container_path)
}

/// Parses a container and builds its record using the default options.
///
/// See [`Assembler::extract`].
pub fn extract(
    container: &[u8],
    hostname: &str,
    container_path: &str,
) -> SummaryRecord {
    Assembler::new().extract(container, hostname, container_path)
}
