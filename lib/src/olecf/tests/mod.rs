use pretty_assertions::assert_eq;

use crate::olecf::{CompoundFile, CompoundFileError};

/// Version 3 file (512-byte sectors) with streams `Small` (19 bytes, stored
/// in the mini stream), `Big` (10000 bytes, stored in regular sectors) and
/// `Empty`.
const V3: &[u8] = include_bytes!("testdata/v3.cfb");

/// Same streams as [`V3`], but in a version 4 file (4096-byte sectors).
const V4: &[u8] = include_bytes!("testdata/v4.cfb");

// Offset of the only FAT sector in `V3`, which is sector 23.
const V3_FAT_OFFSET: usize = 512 + 23 * 512;

fn big_stream() -> Vec<u8> {
    (0..10000).map(|i: u32| ((i * 13 + 1) % 256) as u8).collect()
}

#[test]
fn version_3() {
    let file = CompoundFile::parse(V3).unwrap();

    assert_eq!(file.stream_names(), vec!["Small", "Big", "Empty"]);
    assert_eq!(file.stream_size("Small").unwrap(), 19);
    assert_eq!(file.stream_size("Big").unwrap(), 10000);
    assert_eq!(file.stream_size("Empty").unwrap(), 0);

    assert_eq!(file.stream_data("Small").unwrap(), b"hello compound file");
    assert_eq!(file.stream_data("Big").unwrap(), big_stream());
    assert_eq!(file.stream_data("Empty").unwrap(), b"");
}

#[test]
fn version_4() {
    let file = CompoundFile::parse(V4).unwrap();

    assert_eq!(file.stream_names(), vec!["Small", "Big", "Empty"]);
    assert_eq!(file.stream_data("Small").unwrap(), b"hello compound file");
    assert_eq!(file.stream_data("Big").unwrap(), big_stream());
}

#[test]
fn root_entry_is_not_a_stream() {
    let file = CompoundFile::parse(V3).unwrap();
    assert!(matches!(
        file.stream_size("Root Entry"),
        Err(CompoundFileError::StreamNotFound(_))
    ));
}

#[test]
fn stream_not_found() {
    let file = CompoundFile::parse(V3).unwrap();

    assert_eq!(
        file.stream_data("File_0").err(),
        Some(CompoundFileError::StreamNotFound("File_0".to_string()))
    );
}

#[test]
fn invalid_signature() {
    assert!(matches!(
        CompoundFile::parse(b""),
        Err(CompoundFileError::InvalidSignature)
    ));

    let mut data = V3.to_vec();
    data[0] = 0;

    assert!(matches!(
        CompoundFile::parse(&data),
        Err(CompoundFileError::InvalidSignature)
    ));
}

#[test]
fn truncated_header() {
    assert!(matches!(
        CompoundFile::parse(&V3[..100]),
        Err(CompoundFileError::InvalidHeader)
    ));
}

#[test]
fn invalid_byte_order() {
    let mut data = V3.to_vec();
    data[28] = 0xFF;
    data[29] = 0xFF;

    assert!(matches!(
        CompoundFile::parse(&data),
        Err(CompoundFileError::InvalidHeader)
    ));
}

#[test]
fn unsupported_sector_shift() {
    let mut data = V3.to_vec();
    data[30] = 10;

    assert!(matches!(
        CompoundFile::parse(&data),
        Err(CompoundFileError::UnsupportedSectorShift(10))
    ));
}

#[test]
fn truncated_file() {
    // The FAT is in the last sector, so the directory chain can't be
    // followed.
    assert!(matches!(
        CompoundFile::parse(&V3[..2048]),
        Err(CompoundFileError::SectorOutOfBounds(23))
    ));
}

#[test]
fn circular_directory_chain() {
    // Make the first directory sector point to itself.
    let mut data = V3.to_vec();
    data[V3_FAT_OFFSET..V3_FAT_OFFSET + 4].copy_from_slice(&0_u32.to_le_bytes());

    assert!(matches!(
        CompoundFile::parse(&data),
        Err(CompoundFileError::CircularChain(0))
    ));
}

#[test]
fn circular_difat_chain() {
    // Use the first directory sector as a DIFAT sector that points to
    // itself, with a huge number of DIFAT sectors in the header.
    let mut data = V3.to_vec();
    data[68..72].copy_from_slice(&0_u32.to_le_bytes());
    data[72..76].copy_from_slice(&0xFFFFFFFF_u32.to_le_bytes());
    data[512 + 508..1024].copy_from_slice(&0_u32.to_le_bytes());

    assert!(matches!(
        CompoundFile::parse(&data),
        Err(CompoundFileError::CircularChain(0))
    ));
}

#[test]
fn broken_mini_stream() {
    // The root entry is the first one in sector 0, move the start of the
    // mini stream beyond the end of the file.
    let mut data = V3.to_vec();
    let start = 512 + 116;
    data[start..start + 4].copy_from_slice(&1000_u32.to_le_bytes());

    let file = CompoundFile::parse(&data).unwrap();

    assert_eq!(
        file.stream_data("Small").err(),
        Some(CompoundFileError::SectorOutOfBounds(1000))
    );

    // Streams in regular sectors can still be read.
    assert_eq!(file.stream_data("Big").unwrap(), big_stream());
}

#[test]
fn truncated_stream() {
    // `Big` starts at sector 3, make that sector the end of the chain.
    let mut data = V3.to_vec();
    let entry = V3_FAT_OFFSET + 3 * 4;
    data[entry..entry + 4].copy_from_slice(&0xFFFFFFFE_u32.to_le_bytes());

    let file = CompoundFile::parse(&data).unwrap();

    assert_eq!(
        file.stream_data("Big").err(),
        Some(CompoundFileError::TruncatedStream {
            name: "Big".to_string(),
            expected: 10000,
            actual: 512,
        })
    );

    // Streams in the mini stream are not affected.
    assert_eq!(file.stream_data("Small").unwrap(), b"hello compound file");
}
