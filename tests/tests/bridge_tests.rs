//! Core bridge behavior.
//!
//! Covers:
//! - byte-exact reconstruction regardless of how reads are chunked
//! - end-of-stream short reads and their idempotence
//! - release ordering, exactly-once redemption, and reclaim failure handling
//! - fail-fast writes after finish/shutdown
//! - lifecycle sweeps (dropping either half never strands a handle)


use std::io::Read;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use rstest::rstest;

use stream_bridge::{bridge, Settings, WriteError};
use support::{XorShift64, ReleaseLog};

fn settings(capacity: usize) -> Settings {
    Settings::default().capacity(NonZeroUsize::new(capacity).unwrap())
}

fn patterned(len: usize, rng: &mut XorShift64) -> Vec<u8> {
    (0..len).map(|_| (rng.next_u64() & 0xff) as u8).collect()
}

#[test]
fn five_chunks_one_large_read() {
    support::init_tracing();
    let (writer, mut reader) = bridge::<()>(settings(3));

    let producer = thread::spawn(move || {
        for payload in [b"aaaa", b"bbbb", b"cccc", b"dddd", b"eeee"] {
            writer.write(Bytes::from_static(payload), ()).unwrap();
        }
        writer.finish();
    });

    let mut dst = [0u8; 20];
    let n = reader.read(&mut dst).unwrap();
    assert_eq!(n, 20);
    assert_eq!(&dst, b"aaaabbbbccccddddeeee");

    let mut one = [0u8; 1];
    assert_eq!(reader.read(&mut one).unwrap(), 0);
    assert_eq!(reader.read(&mut one).unwrap(), 0);

    producer.join().unwrap();
}

#[rstest]
#[case::byte_at_a_time(1)]
#[case::tiny(3)]
#[case::medium(64)]
#[case::large(4096)]
fn round_trip_is_read_size_independent(#[case] read_size: usize) {
    support::init_tracing();
    let mut rng = XorShift64::new(11);

    // Varied chunk sizes, including empty chunks mid-stream.
    let chunk_sizes = [0usize, 1, 5, 32, 97, 0, 256, 7, 64, 1];
    let chunks: Vec<Bytes> = chunk_sizes
        .iter()
        .map(|&len| Bytes::from(patterned(len, &mut rng)))
        .collect();
    let expected: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();

    let (writer, mut reader) = bridge::<()>(settings(3));
    let producer = thread::spawn(move || {
        for chunk in chunks {
            writer.write(chunk, ()).unwrap();
        }
        writer.finish();
    });

    let mut out = Vec::with_capacity(expected.len());
    let mut buf = vec![0u8; read_size];
    loop {
        let n = reader.read_into(&mut buf);
        out.extend_from_slice(&buf[..n]);
        if n < buf.len() {
            break;
        }
    }

    producer.join().unwrap();
    assert_eq!(out, expected);
}

#[test]
fn finish_without_data_reads_zero() {
    let (writer, mut reader) = bridge::<()>(settings(2));
    writer.finish();
    let mut buf = [0u8; 4];
    assert_eq!(reader.read_into(&mut buf), 0);
    assert_eq!(reader.read_into(&mut buf), 0);
}

#[test]
fn finish_wakes_a_parked_reader() {
    let (writer, mut reader) = bridge::<()>(settings(2));
    let consumer = thread::spawn(move || {
        let mut buf = [0u8; 8];
        reader.read_into(&mut buf)
    });

    thread::sleep(Duration::from_millis(50));
    writer.finish();
    assert_eq!(consumer.join().unwrap(), 0);
}

#[test]
fn releases_follow_consumption_order_exactly_once() {
    let log = ReleaseLog::new();
    let (writer, mut reader) = bridge(settings(3));

    let plog = Arc::clone(&log);
    let producer = thread::spawn(move || {
        for id in 1..=5u64 {
            writer
                .write(Bytes::from(vec![id as u8; 4]), plog.handle(id))
                .unwrap();
        }
        writer.finish();
        writer
    });

    let mut out = Vec::new();
    let mut buf = [0u8; 3];
    loop {
        let n = reader.read_into(&mut buf);
        out.extend_from_slice(&buf[..n]);
        if n < buf.len() {
            break;
        }
    }
    assert_eq!(out.len(), 20);

    let writer = producer.join().unwrap();
    assert_eq!(writer.pending_release_len(), 5);
    assert_eq!(writer.reclaim().unwrap(), 5);
    assert_eq!(writer.pending_release_len(), 0);

    assert_eq!(log.order(), vec![1, 2, 3, 4, 5]);
    for id in 1..=5 {
        assert_eq!(log.count(id), 1);
    }
}

#[test]
fn reclaim_failure_preserves_the_remainder() {
    let log = ReleaseLog::new();
    let (writer, mut reader) = bridge(settings(3));

    writer
        .write(Bytes::from_static(b"aa"), log.handle(1))
        .unwrap();
    writer
        .write(Bytes::from_static(b"bb"), log.failing_handle(2))
        .unwrap();
    writer
        .write(Bytes::from_static(b"cc"), log.handle(3))
        .unwrap();
    writer.finish();

    let mut buf = [0u8; 16];
    assert_eq!(reader.read_into(&mut buf), 6);

    let err = writer.reclaim().unwrap_err();
    assert_eq!(err.released, 1);
    // The failing chunk used its one redemption attempt; the rest stay listed.
    assert_eq!(writer.pending_release_len(), 1);

    assert_eq!(writer.reclaim().unwrap(), 1);
    assert_eq!(log.order(), vec![1, 3]);
    assert_eq!(log.count(2), 0);
}

#[test]
fn write_after_finish_fails_fast() {
    let (writer, _reader) = bridge::<()>(settings(2));
    writer.write(Bytes::from_static(b"x"), ()).unwrap();
    writer.finish();

    let err = writer.write(Bytes::from_static(b"y"), ()).unwrap_err();
    assert!(matches!(err, WriteError::Finished(_)));
    assert_eq!(err.into_chunk().bytes(), b"y");
}

#[test]
fn write_after_reader_drop_fails_fast() {
    let (writer, reader) = bridge::<()>(settings(2));
    drop(reader);

    let err = writer.write(Bytes::from_static(b"x"), ()).unwrap_err();
    assert!(matches!(err, WriteError::Shutdown(_)));
}

#[test]
fn reader_drop_keeps_handles_reclaimable() {
    let log = ReleaseLog::new();
    let (writer, mut reader) = bridge(settings(3));
    for id in 1..=3u64 {
        writer
            .write(Bytes::from(vec![id as u8; 4]), log.handle(id))
            .unwrap();
    }

    // Partially consume the first chunk, then walk away.
    let mut buf = [0u8; 2];
    assert_eq!(reader.read_into(&mut buf), 2);
    drop(reader);

    assert_eq!(writer.reclaim().unwrap(), 3);
    assert_eq!(log.order(), vec![1, 2, 3]);
}

#[test]
fn writer_drop_finishes_and_reclaims() {
    let log = ReleaseLog::new();
    let (writer, reader) = bridge(settings(3));
    writer
        .write(Bytes::from_static(b"data"), log.handle(1))
        .unwrap();

    drop(reader);
    drop(writer);
    assert_eq!(log.count(1), 1);
}

#[test]
fn shutdown_preserves_in_flight_chunks() {
    let (writer, mut reader) = bridge::<()>(settings(3));
    writer.write(Bytes::from_static(b"abc"), ()).unwrap();
    writer.write(Bytes::from_static(b"def"), ()).unwrap();
    writer.shutdown();

    let mut buf = [0u8; 16];
    assert_eq!(reader.read_into(&mut buf), 6);
    assert_eq!(&buf[..6], b"abcdef");
    assert_eq!(reader.read_into(&mut buf), 0);
}
