/*! Decoder for McAfee quarantine (`.bup`) containers.

A quarantine container is an OLE compound file with two streams of interest:
`Details`, an INI-like text with information about the detection, and
`File_0`, the quarantined sample itself. Both streams are obfuscated with a
single-byte XOR.

This crate reads the container ([`CompoundFile`]), deobfuscates its streams
([`cipher`]), parses the metadata ([`details`]), hashes the sample
([`digest`]) and produces a [`SummaryRecord`] per container, which can be
written to a CSV or NDJSON report with [`ReportWriter`].

# Example

```rust
# use bup_summary::{Assembler, ReportFormat, ReportWriter};
// A file that is not a compound file results in a corrupt record.
let record = Assembler::new().extract(b"not a container", "HOST", "HOST/a.bup");

assert!(record.is_corrupt());

let mut report = ReportWriter::new(Vec::new(), ReportFormat::Csv).unwrap();
report.write(&record).unwrap();

let output = String::from_utf8(report.into_inner().unwrap()).unwrap();

assert_eq!(
    output.lines().nth(1),
    Some(",,,HOST,HOST/a.bup,,,,True")
);
```
*/

#![deny(missing_docs)]

pub use assembler::assemble;
pub use assembler::extract;
pub use assembler::Assembler;
pub use assembler::StreamSource;
pub use assembler::StreamTable;

pub use olecf::CompoundFile;
pub use olecf::CompoundFileError;

pub use record::NameEncoding;
pub use record::OriginalName;
pub use record::RecordStatus;
pub use record::SampleHash;
pub use record::SummaryRecord;

pub use report::ReportError;
pub use report::ReportFormat;
pub use report::ReportWriter;

pub mod assembler;
pub mod cipher;
pub mod details;
pub mod digest;
pub mod olecf;
pub mod record;
pub mod report;
