/*! Structured summary of a quarantine container. */

use std::fmt::{Display, Formatter};

use bstr::{BStr, ByteSlice};

use crate::details::{self, SectionMap};

/// Value reported as the sample hash when the container doesn't have a
/// `File_0` stream.
pub const SAMPLE_NOT_FOUND: &str = "File_0 stream not found";

/// Value reported as the original name when the `File_0` section doesn't
/// have an `OriginalName` key.
pub const ORIGINAL_NAME_NOT_PRESENT: &str = "OriginalName key not present";

/// Appended to original names that lost characters while being converted
/// to the output encoding.
pub const CHARS_IGNORED_SUFFIX: &str = " (Unicode char(s) ignored)";

/// The summary of a single container.
///
/// Records are created by [`crate::assembler::Assembler`] and never change
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRecord {
    hostname: String,
    container_path: String,
    status: RecordStatus,
}

/// The outcome of decoding a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    /// The container has a zero-length stream, or couldn't be read at all.
    Corrupt,
    /// The container was decoded.
    Parsed(ParsedRecord),
}

/// Information extracted from a container that is not corrupt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    sections: SectionMap,
    sample_hash: SampleHash,
    original_name: OriginalName,
}

/// Hash of the quarantined sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleHash {
    /// Lowercase hexadecimal MD5 of the deobfuscated `File_0` stream.
    Md5(String),
    /// The container doesn't have a `File_0` stream.
    NotFound,
}

/// Original name of the quarantined file, as it will be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginalName {
    /// The name is representable in the output encoding.
    Verbatim(String),
    /// The name had characters that are not representable in the output
    /// encoding. Contains what is left after removing them.
    Lossy(String),
    /// The `File_0` section doesn't have an `OriginalName` key.
    Missing,
}

/// Encoding in which original names must be representable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NameEncoding {
    /// Only ASCII names are kept as they are.
    #[default]
    Ascii,
    /// Names that are valid UTF-8 are kept as they are.
    Utf8,
}

impl SummaryRecord {
    /// Creates the record for a corrupt container.
    pub fn corrupt<H, P>(hostname: H, container_path: P) -> Self
    where
        H: Into<String>,
        P: Into<String>,
    {
        Self {
            hostname: hostname.into(),
            container_path: container_path.into(),
            status: RecordStatus::Corrupt,
        }
    }

    /// Creates the record for a container that was decoded.
    pub fn parsed<H, P>(
        hostname: H,
        container_path: P,
        parsed: ParsedRecord,
    ) -> Self
    where
        H: Into<String>,
        P: Into<String>,
    {
        Self {
            hostname: hostname.into(),
            container_path: container_path.into(),
            status: RecordStatus::Parsed(parsed),
        }
    }

    /// Name of the host the container was collected from.
    pub fn hostname(&self) -> &str {
        self.hostname.as_str()
    }

    /// Path of the container.
    pub fn container_path(&self) -> &str {
        self.container_path.as_str()
    }

    /// Decoding outcome.
    pub fn status(&self) -> &RecordStatus {
        &self.status
    }

    /// Returns `true` if the container is corrupt.
    pub fn is_corrupt(&self) -> bool {
        matches!(self.status, RecordStatus::Corrupt)
    }

    /// Returns `"True"` or `"False"`, the way corruption is reported.
    pub fn corrupt_flag(&self) -> &'static str {
        if self.is_corrupt() {
            "True"
        } else {
            "False"
        }
    }

    /// Returns the decoded information, `None` if the container is corrupt.
    pub fn parsed_record(&self) -> Option<&ParsedRecord> {
        match &self.status {
            RecordStatus::Parsed(parsed) => Some(parsed),
            RecordStatus::Corrupt => None,
        }
    }

    /// Sections found in the `Details` stream.
    pub fn sections(&self) -> Option<&SectionMap> {
        self.parsed_record().map(|p| &p.sections)
    }

    /// Hash of the quarantined sample.
    pub fn sample_hash(&self) -> Option<&SampleHash> {
        self.parsed_record().map(|p| &p.sample_hash)
    }

    /// Original name of the quarantined file.
    pub fn original_name(&self) -> Option<&OriginalName> {
        self.parsed_record().map(|p| &p.original_name)
    }

    /// Returns the value of `key` in the `Details` section.
    pub fn detail(&self, key: &str) -> Option<&BStr> {
        details::lookup(self.sections()?, "Details", key)
    }
}

impl ParsedRecord {
    /// Creates a new [`ParsedRecord`].
    pub fn new(
        sections: SectionMap,
        sample_hash: SampleHash,
        original_name: OriginalName,
    ) -> Self {
        Self { sections, sample_hash, original_name }
    }

    /// Sections found in the `Details` stream.
    pub fn sections(&self) -> &SectionMap {
        &self.sections
    }

    /// Hash of the quarantined sample.
    pub fn sample_hash(&self) -> &SampleHash {
        &self.sample_hash
    }

    /// Original name of the quarantined file.
    pub fn original_name(&self) -> &OriginalName {
        &self.original_name
    }
}

impl Display for SampleHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleHash::Md5(digest) => write!(f, "{}", digest),
            SampleHash::NotFound => write!(f, "{}", SAMPLE_NOT_FOUND),
        }
    }
}

impl OriginalName {
    /// Converts the raw `OriginalName` value into a name representable in
    /// `encoding`.
    ///
    /// If the conversion fails, every non-ASCII byte is removed and the
    /// result is tagged as [`OriginalName::Lossy`].
    ///
    /// ```
    /// # use bstr::ByteSlice;
    /// # use bup_summary::record::{NameEncoding, OriginalName};
    /// let name = OriginalName::from_raw(
    ///     Some("résumé.exe".as_bytes().as_bstr()),
    ///     NameEncoding::Ascii,
    /// );
    /// assert_eq!(name.to_string(), "rsum.exe (Unicode char(s) ignored)");
    /// ```
    pub fn from_raw(raw: Option<&BStr>, encoding: NameEncoding) -> Self {
        let Some(raw) = raw else {
            return OriginalName::Missing;
        };

        match encode(raw, encoding) {
            Some(name) => OriginalName::Verbatim(name),
            None => OriginalName::Lossy(
                raw.iter()
                    .filter(|b| b.is_ascii())
                    .map(|b| *b as char)
                    .collect(),
            ),
        }
    }
}

impl Display for OriginalName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OriginalName::Verbatim(name) => write!(f, "{}", name),
            OriginalName::Lossy(name) => {
                write!(f, "{}{}", name, CHARS_IGNORED_SUFFIX)
            }
            OriginalName::Missing => {
                write!(f, "{}", ORIGINAL_NAME_NOT_PRESENT)
            }
        }
    }
}

fn encode(raw: &BStr, encoding: NameEncoding) -> Option<String> {
    match encoding {
        NameEncoding::Ascii if !raw.is_ascii() => None,
        NameEncoding::Ascii | NameEncoding::Utf8 => {
            raw.to_str().ok().map(str::to_owned)
        }
    }
}
