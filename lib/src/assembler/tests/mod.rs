use std::convert::Infallible;

use pretty_assertions::assert_eq;

use crate::assembler::{
    assemble, extract, Assembler, StreamSource, StreamTable,
};
use crate::cipher;
use crate::record::{OriginalName, SampleHash, SummaryRecord};

const CLEAN: &[u8] = include_bytes!("testdata/clean.bup");
const LARGE_SAMPLE: &[u8] = include_bytes!("testdata/large_sample.bup");
const NO_ORIGINAL_NAME: &[u8] = include_bytes!("testdata/no_original_name.bup");
const NO_SAMPLE: &[u8] = include_bytes!("testdata/no_sample.bup");
const UNICODE_NAME: &[u8] = include_bytes!("testdata/unicode_name.bup");
const ZERO_STREAM: &[u8] = include_bytes!("testdata/zero_stream.bup");

/// MD5 of the deobfuscated `File_0` stream in most test files.
const SAMPLE_MD5: &str = "757931336ecfd4d840c943e628dd9361";

struct MemorySource(Vec<(&'static str, Vec<u8>)>);

impl StreamSource for MemorySource {
    type Error = Infallible;

    fn stream_names(&self) -> Vec<String> {
        self.0.iter().map(|(name, _)| name.to_string()).collect()
    }

    fn stream_size(&self, name: &str) -> Result<u64, Self::Error> {
        Ok(self.read_stream(name)?.len() as u64)
    }

    fn read_stream(&self, name: &str) -> Result<Vec<u8>, Self::Error> {
        Ok(self
            .0
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, data)| data.clone())
            .unwrap_or_default())
    }
}

fn table(streams: &[(&str, &[u8])]) -> StreamTable {
    streams
        .iter()
        .map(|(name, data)| (name.to_string(), cipher::decode(data)))
        .collect()
}

#[test]
fn read_from_source() {
    let source = MemorySource(vec![
        ("Details", b"abc".to_vec()),
        ("File_0", b"def".to_vec()),
    ]);

    let table = StreamTable::read_from(&source).unwrap();

    assert!(!table.is_corrupt());
    assert_eq!(table.names().collect::<Vec<_>>(), vec!["Details", "File_0"]);
    assert_eq!(table.get("File_0"), Some(b"def".as_slice()));
}

#[test]
fn read_from_source_with_empty_stream() {
    let source = MemorySource(vec![
        ("Details", b"abc".to_vec()),
        ("File_1", vec![]),
        ("File_0", b"def".to_vec()),
    ]);

    let table = StreamTable::read_from(&source).unwrap();

    assert!(table.is_corrupt());
    assert_eq!(table.names().count(), 0);
}

#[test]
fn table_from_iter_with_empty_stream() {
    let table = table(&[("Details", b"[Details]\n"), ("File_0", b"")]);
    assert!(table.is_corrupt());
}

#[test]
fn corrupt_table() {
    let record = assemble(&StreamTable::corrupt(), "HOST", "HOST/x.bup");
    assert_eq!(record, SummaryRecord::corrupt("HOST", "HOST/x.bup"));
}

#[test]
fn well_formed_container() {
    let table = table(&[
        (
            "Details",
            b"[Details]\r\nDetectionName=EICAR\r\nCreationYear=2018\r\n\
              [File_0]\r\nOriginalName=C:\\eicar.com\r\n",
        ),
        ("File_0", b"MZ\x90\x00"),
    ]);

    let record = assemble(&table, "HOST", "HOST/x.bup");

    assert!(!record.is_corrupt());
    assert_eq!(record.hostname(), "HOST");
    assert_eq!(record.container_path(), "HOST/x.bup");
    assert_eq!(record.detail("DetectionName").unwrap(), "EICAR");
    assert_eq!(record.detail("CreationYear").unwrap(), "2018");
    assert_eq!(
        record.sample_hash(),
        Some(&SampleHash::Md5(crate::digest::md5_hex(b"MZ\x90\x00")))
    );
    assert_eq!(
        record.original_name(),
        Some(&OriginalName::Verbatim(r"C:\eicar.com".to_string()))
    );
}

#[test]
fn missing_sample_stream() {
    let table = table(&[("Details", b"[Details]\nDetectionName=EICAR\n")]);
    let record = assemble(&table, "HOST", "HOST/x.bup");

    assert_eq!(record.sample_hash(), Some(&SampleHash::NotFound));
    assert_eq!(
        record.sample_hash().unwrap().to_string(),
        "File_0 stream not found"
    );
    assert_eq!(record.detail("DetectionName").unwrap(), "EICAR");
}

#[test]
fn missing_details_stream() {
    let table = table(&[("File_0", b"MZ")]);
    let record = assemble(&table, "HOST", "HOST/x.bup");

    assert!(!record.is_corrupt());
    assert!(record.sections().unwrap().is_empty());
    assert_eq!(record.original_name(), Some(&OriginalName::Missing));
    assert!(matches!(record.sample_hash(), Some(SampleHash::Md5(_))));
}

#[test]
fn non_ascii_original_name() {
    let table = table(&[
        ("Details", "[File_0]\nOriginalName=C:\\ü.exe\n".as_bytes()),
        ("File_0", b"MZ"),
    ]);

    let record = assemble(&table, "HOST", "HOST/x.bup");

    assert_eq!(
        record.original_name().unwrap().to_string(),
        r"C:\.exe (Unicode char(s) ignored)"
    );

    let record = Assembler::new().keep_unicode(true).assemble(
        &table,
        "HOST",
        "HOST/x.bup",
    );

    assert_eq!(record.original_name().unwrap().to_string(), r"C:\ü.exe");
}

#[test]
fn legacy_values() {
    let table = table(&[
        ("Details", b"[File_0]\nOriginalName=C:\\a=b.exe\n"),
        ("File_0", b"MZ"),
    ]);

    let record = assemble(&table, "HOST", "HOST/x.bup");
    assert_eq!(record.original_name().unwrap().to_string(), r"C:\a=b.exe");

    let record =
        Assembler::new().legacy_values(true).assemble(&table, "HOST", "x");
    assert_eq!(record.original_name().unwrap().to_string(), r"C:\a");
}

#[test]
fn extract_clean() {
    let record = extract(CLEAN, "WKS-01", "WKS-01/clean.bup");

    assert!(!record.is_corrupt());
    assert_eq!(record.detail("DetectionName").unwrap(), "EICAR test file");
    assert_eq!(
        record.detail("TimeZoneName").unwrap(),
        "Eastern Daylight Time"
    );
    assert_eq!(record.detail("CreationYear").unwrap(), "2018");
    assert_eq!(record.detail("CreationSecond").unwrap(), "53");
    assert_eq!(record.sample_hash().unwrap().to_string(), SAMPLE_MD5);
    assert_eq!(
        record.original_name().unwrap().to_string(),
        r"C:\Users\jdoe\Downloads\eicar.com"
    );
    assert_eq!(
        record.sections().unwrap().keys().collect::<Vec<_>>(),
        vec!["Details", "File_0"]
    );
}

#[test]
fn extract_large_sample() {
    // The sample is larger than the mini stream cutoff, so it's stored in
    // regular sectors.
    let record = extract(LARGE_SAMPLE, "WKS-01", "WKS-01/large_sample.bup");

    assert_eq!(
        record.sample_hash().unwrap().to_string(),
        "941546d1c333e2f0d9efd902e5cb94b7"
    );
    assert_eq!(record.detail("DetectionName").unwrap(), "Generic.dx!abc");
}

#[test]
fn extract_zero_length_stream() {
    let record = extract(ZERO_STREAM, "WKS-01", "WKS-01/zero_stream.bup");

    assert_eq!(
        record,
        SummaryRecord::corrupt("WKS-01", "WKS-01/zero_stream.bup")
    );
    assert_eq!(record.corrupt_flag(), "True");
}

#[test]
fn extract_no_sample() {
    let record = extract(NO_SAMPLE, "WKS-01", "WKS-01/no_sample.bup");

    assert_eq!(record.corrupt_flag(), "False");
    assert_eq!(
        record.sample_hash().unwrap().to_string(),
        "File_0 stream not found"
    );
    assert_eq!(
        record.original_name().unwrap().to_string(),
        r"C:\Temp\gone.exe"
    );
}

#[test]
fn extract_no_original_name() {
    let record =
        extract(NO_ORIGINAL_NAME, "WKS-01", "WKS-01/no_original_name.bup");

    assert_eq!(record.sample_hash().unwrap().to_string(), SAMPLE_MD5);
    assert_eq!(
        record.original_name().unwrap().to_string(),
        "OriginalName key not present"
    );
}

#[test]
fn extract_unicode_name() {
    let record = extract(UNICODE_NAME, "WKS-02", "WKS-02/unicode_name.bup");

    assert_eq!(
        record.original_name().unwrap().to_string(),
        r"C:\Users\jrgen\Desktop\rechnung_.pdf.exe (Unicode char(s) ignored)"
    );

    let record = Assembler::new().keep_unicode(true).extract(
        UNICODE_NAME,
        "WKS-02",
        "WKS-02/unicode_name.bup",
    );

    assert_eq!(
        record.original_name(),
        Some(&OriginalName::Verbatim(
            r"C:\Users\jürgen\Desktop\rechnung_ü.pdf.exe".to_string()
        ))
    );
}

#[test]
fn extract_not_a_container() {
    let record = extract(b"plain text", "WKS-01", "WKS-01/fake.bup");
    assert!(record.is_corrupt());

    let record = extract(&CLEAN[..1024], "WKS-01", "WKS-01/truncated.bup");
    assert!(record.is_corrupt());
}
