use seekgz::map::BlockMap;
use seekgz::seek::SeekReader;
use seekgz::writer::Writer;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

fn compress(data: &[u8], block_size: u32) -> (Vec<u8>, Arc<BlockMap>) {
    let mut writer = Writer::with_level_and_block_size(Vec::new(), -1, block_size).unwrap();
    writer.write_all(data).unwrap();
    let (bytes, map) = writer.finish().unwrap();
    (bytes, Arc::new(map))
}

/// Reading after `seek(offset)` yields exactly the suffix starting there,
/// for every offset in the stream including both ends.
#[test]
fn every_offset_resumes_exactly() {
    let data = b"she sells seashells by the seashore, surely\n".repeat(3);
    let (bytes, map) = compress(&data, 16);

    let mut reader = SeekReader::new(Cursor::new(bytes), map);
    for offset in 0..=data.len() as u64 {
        reader.seek(SeekFrom::Start(offset)).unwrap();
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, &data[offset as usize..], "offset {offset}");
    }
}

#[test]
fn random_seeks_in_large_stream() {
    use rand::RngExt;

    let mut rng = rand::rng();
    let mut data = vec![0u8; 150 * 1024];
    // Mildly compressible: runs with some noise, like real file data.
    let mut i = 0;
    while i < data.len() {
        let run = rng.random_range(1..64usize).min(data.len() - i);
        let byte: u8 = rng.random_range(0..8);
        data[i..i + run].fill(byte);
        i += run;
    }

    let (bytes, map) = compress(&data, 4096);
    let mut reader = SeekReader::new(Cursor::new(bytes), map);

    for _ in 0..10 {
        let offset = rng.random_range(0..data.len() as u64 - 256);
        reader.seek(SeekFrom::Start(offset)).unwrap();
        let mut buf = [0u8; 256];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, data[offset as usize..offset as usize + 256]);
    }
}

#[test]
fn new_at_positions_immediately() {
    let data = b"0123456789abcdefghij";
    let (bytes, map) = compress(data, 4);

    let mut reader = SeekReader::new_at(Cursor::new(bytes), map, 13).unwrap();
    assert_eq!(reader.position(), 13);
    let mut rest = Vec::new();
    reader.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, b"defghij");
}

#[test]
fn seeks_move_in_both_directions() {
    let data: Vec<u8> = (0u32..50_000).map(|i| (i % 241) as u8).collect();
    let (bytes, map) = compress(&data, 1024);
    let mut reader = SeekReader::new(Cursor::new(bytes), map);

    for &offset in &[40_000u64, 5, 25_000, 24_999, 49_999, 0] {
        reader.seek(SeekFrom::Start(offset)).unwrap();
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], data[offset as usize], "offset {offset}");
    }
}

#[test]
fn sequential_reads_cross_block_boundaries_after_seek() {
    let data: Vec<u8> = (0u32..10_000).map(|i| (i * 7 % 255) as u8).collect();
    let (bytes, map) = compress(&data, 512);
    let mut reader = SeekReader::new(Cursor::new(bytes), map);

    // Start inside block 3 and read through the end of the stream.
    reader.seek(SeekFrom::Start(1_700)).unwrap();
    let mut rest = Vec::new();
    reader.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, &data[1_700..]);
}

#[test]
fn stream_position_reports_uncompressed_offset() {
    let data = b"0123456789abcdefghij";
    let (bytes, map) = compress(data, 4);
    let mut reader = SeekReader::new(Cursor::new(bytes), map);

    reader.seek(SeekFrom::Start(7)).unwrap();
    assert_eq!(reader.stream_position().unwrap(), 7);
    let mut buf = [0u8; 5];
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(reader.stream_position().unwrap(), 12);
}

/// A map deserialized from bytes drives seeks exactly like the original.
#[test]
fn seeking_with_deserialized_map() {
    let data: Vec<u8> = (0u32..20_000).map(|i| (i % 199) as u8).collect();
    let (bytes, map) = compress(&data, 2048);

    let restored = Arc::new(BlockMap::from_bytes(&map.to_bytes()).unwrap());
    let mut reader = SeekReader::new(Cursor::new(bytes), restored);
    reader.seek(SeekFrom::Start(10_500)).unwrap();
    let mut buf = [0u8; 64];
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(buf, data[10_500..10_564]);
}

/// Multistream is a mode, not a type: a seeking reader with it off stops
/// at each block boundary and `reset` continues into the next block.
#[test]
fn multistream_off_stops_at_block_boundaries() {
    let (bytes, map) = compress(b"aaaabbbbcccc", 4);
    let mut reader = SeekReader::new(Cursor::new(bytes), map);
    reader.multistream(false);

    reader.seek(SeekFrom::Start(2)).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"aa");
    assert_eq!(reader.position(), 4);

    reader.reset().unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"bbbb");
    assert_eq!(reader.position(), 8);
}

#[test]
fn write_to_drains_from_position() {
    let data = b"the quick brown fox jumps over the lazy dog";
    let (bytes, map) = compress(data, 8);
    let mut reader = SeekReader::new(Cursor::new(bytes), map);

    reader.seek(SeekFrom::Start(35)).unwrap();
    let mut out = Vec::new();
    let n = reader.write_to(&mut out).unwrap();
    assert_eq!(n, 8);
    assert_eq!(out, b"lazy dog");
    assert_eq!(reader.position(), data.len() as u64);
}
