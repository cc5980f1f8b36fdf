// Benchmarks for PTP message packing and parsing.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use ptp::datasets::{ClockQuality, PortIdentity};
use ptp::protocol::{
    pack_message, AnnounceBody, FromBytes, MessageType, PtpHeader, SyncBody, HEADER_LENGTH,
    MAX_MESSAGE_LENGTH,
};
use ptp::TimeInternal;

fn make_announce() -> (PtpHeader, AnnounceBody) {
    let sender = PortIdentity {
        clock_identity: [0x00, 0x11, 0x22, 0xFF, 0xFE, 0x33, 0x44, 0x55],
        port_number: 1,
    };
    let header = PtpHeader::for_message(MessageType::Announce, 0, sender, 1234, 1);
    let body = AnnounceBody {
        origin_timestamp: TimeInternal::ZERO,
        current_utc_offset: 37,
        grandmaster_priority1: 128,
        grandmaster_clock_quality: ClockQuality {
            clock_class: 248,
            clock_accuracy: 0xFE,
            offset_scaled_log_variance: 0xFFFF,
        },
        grandmaster_priority2: 128,
        grandmaster_identity: sender.clock_identity,
        steps_removed: 0,
        time_source: 0xA0,
    };
    (header, body)
}

fn bench_announce_pack(c: &mut Criterion) {
    let (header, body) = make_announce();
    let mut buf = [0u8; MAX_MESSAGE_LENGTH];

    c.bench_function("announce_pack", |b| {
        b.iter(|| pack_message(black_box(&header), black_box(&body), &mut buf).unwrap())
    });
}

fn bench_announce_unpack(c: &mut Criterion) {
    let (header, body) = make_announce();
    let mut buf = [0u8; MAX_MESSAGE_LENGTH];
    pack_message(&header, &body, &mut buf).unwrap();

    c.bench_function("announce_unpack", |b| {
        b.iter(|| {
            let (header, _) = PtpHeader::from_bytes(black_box(&buf)).unwrap();
            let (body, _) = AnnounceBody::from_bytes(black_box(&buf[HEADER_LENGTH..])).unwrap();
            (header, body)
        })
    });
}

fn bench_sync_unpack(c: &mut Criterion) {
    let sender = PortIdentity {
        clock_identity: [0x00, 0x11, 0x22, 0xFF, 0xFE, 0x33, 0x44, 0x55],
        port_number: 1,
    };
    let header = PtpHeader::for_message(MessageType::Sync, 0, sender, 42, 0);
    let body = SyncBody {
        origin_timestamp: TimeInternal::new(1_700_000_000, 123_456_789),
    };
    let mut buf = [0u8; MAX_MESSAGE_LENGTH];
    pack_message(&header, &body, &mut buf).unwrap();

    c.bench_function("sync_unpack", |b| {
        b.iter(|| {
            let (header, _) = PtpHeader::from_bytes(black_box(&buf)).unwrap();
            let (body, _) = SyncBody::from_bytes(black_box(&buf[HEADER_LENGTH..])).unwrap();
            (header, body)
        })
    });
}

criterion_group!(
    benches,
    bench_announce_pack,
    bench_announce_unpack,
    bench_sync_unpack
);
criterion_main!(benches);
