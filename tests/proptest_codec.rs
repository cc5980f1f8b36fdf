// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Property tests for the wire codec round-trip laws.

use proptest::prelude::*;

use ptp::datasets::{ClockQuality, PortIdentity};
use ptp::protocol::{
    pack_message, AnnounceBody, DelayRespBody, FromBytes, MessageType, PtpHeader, SyncBody,
    ToBytes, HEADER_LENGTH, MAX_MESSAGE_LENGTH,
};
use ptp::TimeInternal;

fn arb_message_type() -> impl Strategy<Value = MessageType> {
    prop_oneof![
        Just(MessageType::Sync),
        Just(MessageType::DelayReq),
        Just(MessageType::FollowUp),
        Just(MessageType::DelayResp),
        Just(MessageType::Announce),
    ]
}

fn arb_port_identity() -> impl Strategy<Value = PortIdentity> {
    (any::<[u8; 8]>(), any::<u16>()).prop_map(|(clock_identity, port_number)| PortIdentity {
        clock_identity,
        port_number,
    })
}

fn arb_timestamp() -> impl Strategy<Value = TimeInternal> {
    // Wire range: 48-bit unsigned seconds, nanoseconds below one second.
    (0i64..(1i64 << 48), 0i32..1_000_000_000).prop_map(|(seconds, nanoseconds)| TimeInternal {
        seconds,
        nanoseconds,
    })
}

fn arb_clock_quality() -> impl Strategy<Value = ClockQuality> {
    (any::<u8>(), any::<u8>(), any::<u16>()).prop_map(
        |(clock_class, clock_accuracy, offset_scaled_log_variance)| ClockQuality {
            clock_class,
            clock_accuracy,
            offset_scaled_log_variance,
        },
    )
}

fn arb_header() -> impl Strategy<Value = PtpHeader> {
    (
        arb_message_type(),
        any::<u8>(),
        any::<u16>(),
        any::<i64>(),
        arb_port_identity(),
        any::<u16>(),
        any::<i8>(),
    )
        .prop_map(
            |(
                message_type,
                domain_number,
                flags,
                correction_field,
                source_port_identity,
                sequence_id,
                log_message_interval,
            )| {
                let mut header = PtpHeader::for_message(
                    message_type,
                    domain_number,
                    source_port_identity,
                    sequence_id,
                    log_message_interval,
                );
                header.flags = flags;
                header.correction_field = correction_field;
                header
            },
        )
}

fn arb_announce_body() -> impl Strategy<Value = AnnounceBody> {
    (
        arb_timestamp(),
        any::<i16>(),
        any::<u8>(),
        arb_clock_quality(),
        any::<u8>(),
        any::<[u8; 8]>(),
        any::<u16>(),
        any::<u8>(),
    )
        .prop_map(
            |(
                origin_timestamp,
                current_utc_offset,
                grandmaster_priority1,
                grandmaster_clock_quality,
                grandmaster_priority2,
                grandmaster_identity,
                steps_removed,
                time_source,
            )| AnnounceBody {
                origin_timestamp,
                current_utc_offset,
                grandmaster_priority1,
                grandmaster_clock_quality,
                grandmaster_priority2,
                grandmaster_identity,
                steps_removed,
                time_source,
            },
        )
}

proptest! {
    #[test]
    fn header_roundtrip(header in arb_header()) {
        let mut buf = [0u8; HEADER_LENGTH];
        header.to_bytes(&mut buf).unwrap();
        let (parsed, used) = PtpHeader::from_bytes(&buf).unwrap();
        prop_assert_eq!(used, HEADER_LENGTH);
        prop_assert_eq!(parsed, header);
    }

    #[test]
    fn header_pack_unpack_pack_is_stable(header in arb_header()) {
        // pack(unpack(pack(h))) == pack(h): the wire form is a fixpoint.
        let mut first = [0u8; HEADER_LENGTH];
        header.to_bytes(&mut first).unwrap();
        let (parsed, _) = PtpHeader::from_bytes(&first).unwrap();
        let mut second = [0u8; HEADER_LENGTH];
        parsed.to_bytes(&mut second).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn timestamp_roundtrip(timestamp in arb_timestamp()) {
        let mut buf = [0u8; 10];
        timestamp.to_bytes(&mut buf).unwrap();
        let (parsed, _) = TimeInternal::from_bytes(&buf).unwrap();
        prop_assert_eq!(parsed, timestamp);
    }

    #[test]
    fn announce_message_roundtrip(header in arb_header(), body in arb_announce_body()) {
        let mut header = header;
        header.message_type = MessageType::Announce;
        header.message_length = MessageType::Announce.message_length() as u16;

        let mut buf = [0u8; MAX_MESSAGE_LENGTH];
        let len = pack_message(&header, &body, &mut buf).unwrap();
        prop_assert_eq!(len, 64);

        let (parsed_header, _) = PtpHeader::from_bytes(&buf[..len]).unwrap();
        let (parsed_body, _) = AnnounceBody::from_bytes(&buf[HEADER_LENGTH..len]).unwrap();
        prop_assert_eq!(parsed_header, header);
        prop_assert_eq!(parsed_body, body);
    }

    #[test]
    fn sync_message_roundtrip(timestamp in arb_timestamp(), identity in arb_port_identity(), seq in any::<u16>()) {
        let header = PtpHeader::for_message(MessageType::Sync, 0, identity, seq, 0);
        let body = SyncBody { origin_timestamp: timestamp };
        let mut buf = [0u8; MAX_MESSAGE_LENGTH];
        let len = pack_message(&header, &body, &mut buf).unwrap();
        prop_assert_eq!(len, 44);

        let (parsed_header, _) = PtpHeader::from_bytes(&buf[..len]).unwrap();
        let (parsed_body, _) = SyncBody::from_bytes(&buf[HEADER_LENGTH..len]).unwrap();
        prop_assert_eq!(parsed_header, header);
        prop_assert_eq!(parsed_body, body);
    }

    #[test]
    fn delay_resp_message_roundtrip(
        timestamp in arb_timestamp(),
        identity in arb_port_identity(),
        requesting in arb_port_identity(),
        seq in any::<u16>(),
    ) {
        let header = PtpHeader::for_message(MessageType::DelayResp, 0, identity, seq, 0);
        let body = DelayRespBody {
            receive_timestamp: timestamp,
            requesting_port_identity: requesting,
        };
        let mut buf = [0u8; MAX_MESSAGE_LENGTH];
        let len = pack_message(&header, &body, &mut buf).unwrap();
        prop_assert_eq!(len, 54);

        let (parsed_body, _) = DelayRespBody::from_bytes(&buf[HEADER_LENGTH..len]).unwrap();
        prop_assert_eq!(parsed_body, body);
    }

    #[test]
    fn truncation_never_panics(frame in proptest::collection::vec(any::<u8>(), 0..80)) {
        // Arbitrary bytes must either parse or error, never panic.
        let _ = PtpHeader::from_bytes(&frame);
        let _ = AnnounceBody::from_bytes(&frame);
        let _ = SyncBody::from_bytes(&frame);
        let _ = DelayRespBody::from_bytes(&frame);
    }
}
