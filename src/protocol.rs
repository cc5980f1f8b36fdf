//! Wire codec for PTPv2 messages, precisely matching IEEE 1588-2008
//! Clause 13.
//!
//! Provides `FromBytes` and `ToBytes` implementations for the common message
//! header and the bodies of the five event/general messages this endpoint
//! speaks: Sync, Delay_Req, Follow_Up, Delay_Resp, and Announce. All
//! multi-byte fields are network byte order; packing and unpacking go
//! through a byte buffer at fixed offsets, so no host-alignment assumption
//! ever reaches the wire.

use byteorder::{ByteOrder, BE};

use crate::datasets::{ClockIdentity, ClockQuality, PortIdentity};
use crate::error::PtpError;
use crate::time::TimeInternal;

/// The PTP version spoken by this endpoint.
pub const VERSION_PTP: u8 = 2;

/// Length of the common message header.
pub const HEADER_LENGTH: usize = 34;

/// Total length of Sync, Delay_Req, and Follow_Up messages.
pub const SYNC_MESSAGE_LENGTH: usize = 44;

/// Total length of a Delay_Resp message.
pub const DELAY_RESP_MESSAGE_LENGTH: usize = 54;

/// Total length of an Announce message.
pub const ANNOUNCE_MESSAGE_LENGTH: usize = 64;

/// The largest message this endpoint emits or accepts.
pub const MAX_MESSAGE_LENGTH: usize = ANNOUNCE_MESSAGE_LENGTH;

/// Header flag-field bits, read as a big-endian u16 at offset 6.
pub mod flags {
    /// The sender is a two-step clock; a Follow_Up carries the precise T1.
    pub const TWO_STEP: u16 = 0x0200;
    /// The last minute of the current UTC day has 61 seconds.
    pub const LEAP61: u16 = 0x0001;
    /// The last minute of the current UTC day has 59 seconds.
    pub const LEAP59: u16 = 0x0002;
    /// currentUtcOffset is known to be correct.
    pub const UTC_OFFSET_VALID: u16 = 0x0004;
    /// The grandmaster uses the PTP (TAI) timescale.
    pub const PTP_TIMESCALE: u16 = 0x0008;
    /// Time is traceable to a primary reference.
    pub const TIME_TRACEABLE: u16 = 0x0010;
    /// Frequency is traceable to a primary reference.
    pub const FREQUENCY_TRACEABLE: u16 = 0x0020;
}

/// A 4-bit integer identifying the message type (IEEE 1588-2008 Table 19).
///
/// Only the event and general messages of the delay request-response
/// mechanism are representable; peer-delay, signaling, and management
/// types fail conversion and are dropped by the dispatcher.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MessageType {
    /// Sync event message (value 0x0).
    Sync = 0x0,
    /// Delay_Req event message (value 0x1).
    DelayReq = 0x1,
    /// Follow_Up general message (value 0x8).
    FollowUp = 0x8,
    /// Delay_Resp general message (value 0x9).
    DelayResp = 0x9,
    /// Announce general message (value 0xB).
    Announce = 0xB,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(MessageType::Sync),
            0x1 => Ok(MessageType::DelayReq),
            0x8 => Ok(MessageType::FollowUp),
            0x9 => Ok(MessageType::DelayResp),
            0xB => Ok(MessageType::Announce),
            _ => Err(()),
        }
    }
}

impl MessageType {
    /// The value of the deprecated controlField for this message type
    /// (IEEE 1588-2008 Table 23).
    pub fn control_field(self) -> u8 {
        match self {
            MessageType::Sync => 0x00,
            MessageType::DelayReq => 0x01,
            MessageType::FollowUp => 0x02,
            MessageType::DelayResp => 0x03,
            MessageType::Announce => 0x05,
        }
    }

    /// Total on-wire length of a message of this type, header included.
    pub fn message_length(self) -> usize {
        match self {
            MessageType::Sync | MessageType::DelayReq | MessageType::FollowUp => {
                SYNC_MESSAGE_LENGTH
            }
            MessageType::DelayResp => DELAY_RESP_MESSAGE_LENGTH,
            MessageType::Announce => ANNOUNCE_MESSAGE_LENGTH,
        }
    }

    /// Whether this is an event message (timestamped at ingress/egress).
    pub fn is_event(self) -> bool {
        matches!(self, MessageType::Sync | MessageType::DelayReq)
    }
}

/// Types that have a constant size when packed for transmission.
pub trait ConstPackedSizeBytes {
    /// The packed size in bytes.
    const PACKED_SIZE_BYTES: usize;
}

/// PTP types that may be read from network-endian bytes.
pub trait FromBytes: Sized {
    /// Parse from the front of `buf`, returning the value and the number of
    /// bytes consumed.
    fn from_bytes(buf: &[u8]) -> Result<(Self, usize), PtpError>;
}

/// PTP types that may be written to network-endian bytes.
pub trait ToBytes {
    /// Pack into the front of `buf`, returning the number of bytes written.
    fn to_bytes(&self, buf: &mut [u8]) -> Result<usize, PtpError>;
}

fn ensure_len(len: usize, needed: usize) -> Result<(), PtpError> {
    if len < needed {
        return Err(PtpError::BufferTooShort {
            needed,
            available: len,
        });
    }
    Ok(())
}

// --- Timestamp (10 bytes) ---
//
//  0                   1
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |       secondsField (MSB)      |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |       secondsField (LSB)      |
// |                               |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |       nanosecondsField        |
// |                               |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+

impl ConstPackedSizeBytes for TimeInternal {
    const PACKED_SIZE_BYTES: usize = 10;
}

impl FromBytes for TimeInternal {
    fn from_bytes(buf: &[u8]) -> Result<(Self, usize), PtpError> {
        ensure_len(buf.len(), Self::PACKED_SIZE_BYTES)?;
        let seconds_msb = BE::read_u16(&buf[0..2]);
        let seconds_lsb = BE::read_u32(&buf[2..6]);
        let nanoseconds = BE::read_u32(&buf[6..10]);
        if nanoseconds >= crate::time::NSEC_PER_SEC as u32 {
            return Err(PtpError::InvalidField {
                field: "timestamp nanoseconds",
                value: nanoseconds,
            });
        }
        let seconds = (u64::from(seconds_msb) << 32) | u64::from(seconds_lsb);
        Ok((
            TimeInternal {
                seconds: seconds as i64,
                nanoseconds: nanoseconds as i32,
            },
            Self::PACKED_SIZE_BYTES,
        ))
    }
}

impl ToBytes for TimeInternal {
    fn to_bytes(&self, buf: &mut [u8]) -> Result<usize, PtpError> {
        ensure_len(buf.len(), Self::PACKED_SIZE_BYTES)?;
        // On-wire timestamps are unsigned 48.32; normalized clock readings
        // are never negative here.
        let seconds = self.seconds.max(0) as u64;
        BE::write_u16(&mut buf[0..2], (seconds >> 32) as u16);
        BE::write_u32(&mut buf[2..6], seconds as u32);
        BE::write_u32(&mut buf[6..10], self.nanoseconds.max(0) as u32);
        Ok(Self::PACKED_SIZE_BYTES)
    }
}

// --- PortIdentity (10 bytes): 8-byte clock identity + 16-bit port number ---

impl ConstPackedSizeBytes for PortIdentity {
    const PACKED_SIZE_BYTES: usize = 10;
}

impl FromBytes for PortIdentity {
    fn from_bytes(buf: &[u8]) -> Result<(Self, usize), PtpError> {
        ensure_len(buf.len(), Self::PACKED_SIZE_BYTES)?;
        let mut clock_identity: ClockIdentity = [0u8; 8];
        clock_identity.copy_from_slice(&buf[0..8]);
        let port_number = BE::read_u16(&buf[8..10]);
        Ok((
            PortIdentity {
                clock_identity,
                port_number,
            },
            Self::PACKED_SIZE_BYTES,
        ))
    }
}

impl ToBytes for PortIdentity {
    fn to_bytes(&self, buf: &mut [u8]) -> Result<usize, PtpError> {
        ensure_len(buf.len(), Self::PACKED_SIZE_BYTES)?;
        buf[0..8].copy_from_slice(&self.clock_identity);
        BE::write_u16(&mut buf[8..10], self.port_number);
        Ok(Self::PACKED_SIZE_BYTES)
    }
}

// --- ClockQuality (4 bytes) ---

impl ConstPackedSizeBytes for ClockQuality {
    const PACKED_SIZE_BYTES: usize = 4;
}

impl FromBytes for ClockQuality {
    fn from_bytes(buf: &[u8]) -> Result<(Self, usize), PtpError> {
        ensure_len(buf.len(), Self::PACKED_SIZE_BYTES)?;
        Ok((
            ClockQuality {
                clock_class: buf[0],
                clock_accuracy: buf[1],
                offset_scaled_log_variance: BE::read_u16(&buf[2..4]),
            },
            Self::PACKED_SIZE_BYTES,
        ))
    }
}

impl ToBytes for ClockQuality {
    fn to_bytes(&self, buf: &mut [u8]) -> Result<usize, PtpError> {
        ensure_len(buf.len(), Self::PACKED_SIZE_BYTES)?;
        buf[0] = self.clock_class;
        buf[1] = self.clock_accuracy;
        BE::write_u16(&mut buf[2..4], self.offset_scaled_log_variance);
        Ok(Self::PACKED_SIZE_BYTES)
    }
}

/// **Common Message Header** - the 34-byte header shared by every PTP
/// message (IEEE 1588-2008 Table 18).
///
/// ### Layout (offsets from the start of the PTP payload)
///
/// ```ignore
/// +--------+--------+----------------------------------------+
/// | Offset | Length | Field                                  |
/// +--------+--------+----------------------------------------+
/// |      0 |      1 | transportSpecific | messageType        |
/// |      1 |      1 | reserved | versionPTP                  |
/// |      2 |      2 | messageLength                          |
/// |      4 |      1 | domainNumber                           |
/// |      5 |      1 | reserved                               |
/// |      6 |      2 | flagField                              |
/// |      8 |      8 | correctionField                        |
/// |     16 |      4 | reserved                               |
/// |     20 |     10 | sourcePortIdentity                     |
/// |     30 |      2 | sequenceId                             |
/// |     32 |      1 | controlField                           |
/// |     33 |      1 | logMessageInterval                     |
/// +--------+--------+----------------------------------------+
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PtpHeader {
    /// The message type from the low nibble of byte 0.
    pub message_type: MessageType,
    /// PTP version from the low nibble of byte 1; always 2 on emit.
    pub version: u8,
    /// Total message length including this header.
    pub message_length: u16,
    /// The sender's PTP domain.
    pub domain_number: u8,
    /// Flag field; see the [`flags`] constants.
    pub flags: u16,
    /// Correction in scaled nanoseconds (ns × 2¹⁶).
    pub correction_field: i64,
    /// Identity of the sending port.
    pub source_port_identity: PortIdentity,
    /// Sequence number within the sender's message stream.
    pub sequence_id: u16,
    /// Deprecated control field, kept for hardware compatibility.
    pub control_field: u8,
    /// The sender's message interval as log2 seconds.
    pub log_message_interval: i8,
}

impl PtpHeader {
    /// Build a header for an outgoing message of the given type.
    pub fn for_message(
        message_type: MessageType,
        domain_number: u8,
        source_port_identity: PortIdentity,
        sequence_id: u16,
        log_message_interval: i8,
    ) -> Self {
        PtpHeader {
            message_type,
            version: VERSION_PTP,
            message_length: message_type.message_length() as u16,
            domain_number,
            flags: 0,
            correction_field: 0,
            source_port_identity,
            sequence_id,
            control_field: message_type.control_field(),
            log_message_interval,
        }
    }

    /// Whether the two-step flag is set.
    pub fn is_two_step(&self) -> bool {
        self.flags & flags::TWO_STEP != 0
    }
}

impl ConstPackedSizeBytes for PtpHeader {
    const PACKED_SIZE_BYTES: usize = HEADER_LENGTH;
}

impl FromBytes for PtpHeader {
    fn from_bytes(buf: &[u8]) -> Result<(Self, usize), PtpError> {
        ensure_len(buf.len(), HEADER_LENGTH)?;
        let message_type_raw = buf[0] & 0x0F;
        let message_type = MessageType::try_from(message_type_raw).map_err(|_| {
            PtpError::UnsupportedMessageType {
                message_type: message_type_raw,
            }
        })?;
        let version = buf[1] & 0x0F;
        let message_length = BE::read_u16(&buf[2..4]);
        let domain_number = buf[4];
        let flags = BE::read_u16(&buf[6..8]);
        let correction_field = BE::read_i64(&buf[8..16]);
        let (source_port_identity, _) = PortIdentity::from_bytes(&buf[20..30])?;
        let sequence_id = BE::read_u16(&buf[30..32]);
        let control_field = buf[32];
        let log_message_interval = buf[33] as i8;
        Ok((
            PtpHeader {
                message_type,
                version,
                message_length,
                domain_number,
                flags,
                correction_field,
                source_port_identity,
                sequence_id,
                control_field,
                log_message_interval,
            },
            HEADER_LENGTH,
        ))
    }
}

impl ToBytes for PtpHeader {
    fn to_bytes(&self, buf: &mut [u8]) -> Result<usize, PtpError> {
        ensure_len(buf.len(), HEADER_LENGTH)?;
        buf[..HEADER_LENGTH].fill(0);
        buf[0] = self.message_type as u8 & 0x0F;
        buf[1] = self.version & 0x0F;
        BE::write_u16(&mut buf[2..4], self.message_length);
        buf[4] = self.domain_number;
        BE::write_u16(&mut buf[6..8], self.flags);
        BE::write_i64(&mut buf[8..16], self.correction_field);
        self.source_port_identity.to_bytes(&mut buf[20..30])?;
        BE::write_u16(&mut buf[30..32], self.sequence_id);
        buf[32] = self.control_field;
        buf[33] = self.log_message_interval as u8;
        Ok(HEADER_LENGTH)
    }
}

/// Body of a Sync message: the approximate origin timestamp T1.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SyncBody {
    /// Egress time at the master; approximate when two-step.
    pub origin_timestamp: TimeInternal,
}

/// Body of a Delay_Req message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DelayReqBody {
    /// Egress time estimate at the requester; informational only.
    pub origin_timestamp: TimeInternal,
}

/// Body of a Follow_Up message: the precise origin timestamp of the
/// preceding Sync.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FollowUpBody {
    /// The precise T1 captured at Sync egress.
    pub precise_origin_timestamp: TimeInternal,
}

macro_rules! timestamp_body {
    ($body:ident, $field:ident) => {
        impl ConstPackedSizeBytes for $body {
            const PACKED_SIZE_BYTES: usize = TimeInternal::PACKED_SIZE_BYTES;
        }

        impl FromBytes for $body {
            fn from_bytes(buf: &[u8]) -> Result<(Self, usize), PtpError> {
                let ($field, used) = TimeInternal::from_bytes(buf)?;
                Ok(($body { $field }, used))
            }
        }

        impl ToBytes for $body {
            fn to_bytes(&self, buf: &mut [u8]) -> Result<usize, PtpError> {
                self.$field.to_bytes(buf)
            }
        }
    };
}

timestamp_body!(SyncBody, origin_timestamp);
timestamp_body!(DelayReqBody, origin_timestamp);
timestamp_body!(FollowUpBody, precise_origin_timestamp);

/// Body of a Delay_Resp message (offsets relative to the body start).
///
/// ```ignore
/// +--------+--------+----------------------------------------+
/// |      0 |     10 | receiveTimestamp (T4)                  |
/// |     10 |     10 | requestingPortIdentity                 |
/// +--------+--------+----------------------------------------+
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DelayRespBody {
    /// Ingress time of the Delay_Req at the master (T4).
    pub receive_timestamp: TimeInternal,
    /// The identity the Delay_Req carried as its source.
    pub requesting_port_identity: PortIdentity,
}

impl ConstPackedSizeBytes for DelayRespBody {
    const PACKED_SIZE_BYTES: usize =
        TimeInternal::PACKED_SIZE_BYTES + PortIdentity::PACKED_SIZE_BYTES;
}

impl FromBytes for DelayRespBody {
    fn from_bytes(buf: &[u8]) -> Result<(Self, usize), PtpError> {
        ensure_len(buf.len(), Self::PACKED_SIZE_BYTES)?;
        let (receive_timestamp, _) = TimeInternal::from_bytes(&buf[0..10])?;
        let (requesting_port_identity, _) = PortIdentity::from_bytes(&buf[10..20])?;
        Ok((
            DelayRespBody {
                receive_timestamp,
                requesting_port_identity,
            },
            Self::PACKED_SIZE_BYTES,
        ))
    }
}

impl ToBytes for DelayRespBody {
    fn to_bytes(&self, buf: &mut [u8]) -> Result<usize, PtpError> {
        ensure_len(buf.len(), Self::PACKED_SIZE_BYTES)?;
        self.receive_timestamp.to_bytes(&mut buf[0..10])?;
        self.requesting_port_identity.to_bytes(&mut buf[10..20])?;
        Ok(Self::PACKED_SIZE_BYTES)
    }
}

/// Body of an Announce message (offsets relative to the body start; add 34
/// for offsets from the start of the message).
///
/// ```ignore
/// +--------+--------+----------------------------------------+
/// |      0 |     10 | originTimestamp (zeroed on emit)       |
/// |     10 |      2 | currentUtcOffset                       |
/// |     12 |      1 | reserved                               |
/// |     13 |      1 | grandmasterPriority1                   |
/// |     14 |      4 | grandmasterClockQuality                |
/// |     18 |      1 | grandmasterPriority2                   |
/// |     19 |      8 | grandmasterIdentity                    |
/// |     27 |      2 | stepsRemoved                           |
/// |     29 |      1 | timeSource                             |
/// +--------+--------+----------------------------------------+
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AnnounceBody {
    /// Unused timestamp; zero on emit.
    pub origin_timestamp: TimeInternal,
    /// Offset of UTC from TAI in seconds, as known by the grandmaster.
    pub current_utc_offset: i16,
    /// The grandmaster's priority1.
    pub grandmaster_priority1: u8,
    /// The grandmaster's clock quality.
    pub grandmaster_clock_quality: ClockQuality,
    /// The grandmaster's priority2.
    pub grandmaster_priority2: u8,
    /// The grandmaster's clock identity.
    pub grandmaster_identity: ClockIdentity,
    /// Number of boundary clocks between the grandmaster and the sender.
    pub steps_removed: u16,
    /// The grandmaster's time source (Table 7 codes).
    pub time_source: u8,
}

impl ConstPackedSizeBytes for AnnounceBody {
    const PACKED_SIZE_BYTES: usize = 30;
}

impl FromBytes for AnnounceBody {
    fn from_bytes(buf: &[u8]) -> Result<(Self, usize), PtpError> {
        ensure_len(buf.len(), Self::PACKED_SIZE_BYTES)?;
        let (origin_timestamp, _) = TimeInternal::from_bytes(&buf[0..10])?;
        let current_utc_offset = BE::read_i16(&buf[10..12]);
        let grandmaster_priority1 = buf[13];
        let (grandmaster_clock_quality, _) = ClockQuality::from_bytes(&buf[14..18])?;
        let grandmaster_priority2 = buf[18];
        let mut grandmaster_identity: ClockIdentity = [0u8; 8];
        grandmaster_identity.copy_from_slice(&buf[19..27]);
        let steps_removed = BE::read_u16(&buf[27..29]);
        let time_source = buf[29];
        Ok((
            AnnounceBody {
                origin_timestamp,
                current_utc_offset,
                grandmaster_priority1,
                grandmaster_clock_quality,
                grandmaster_priority2,
                grandmaster_identity,
                steps_removed,
                time_source,
            },
            Self::PACKED_SIZE_BYTES,
        ))
    }
}

impl ToBytes for AnnounceBody {
    fn to_bytes(&self, buf: &mut [u8]) -> Result<usize, PtpError> {
        ensure_len(buf.len(), Self::PACKED_SIZE_BYTES)?;
        buf[..Self::PACKED_SIZE_BYTES].fill(0);
        self.origin_timestamp.to_bytes(&mut buf[0..10])?;
        BE::write_i16(&mut buf[10..12], self.current_utc_offset);
        buf[13] = self.grandmaster_priority1;
        self.grandmaster_clock_quality.to_bytes(&mut buf[14..18])?;
        buf[18] = self.grandmaster_priority2;
        buf[19..27].copy_from_slice(&self.grandmaster_identity);
        BE::write_u16(&mut buf[27..29], self.steps_removed);
        buf[29] = self.time_source;
        Ok(Self::PACKED_SIZE_BYTES)
    }
}

impl Default for AnnounceBody {
    fn default() -> Self {
        AnnounceBody {
            origin_timestamp: TimeInternal::ZERO,
            current_utc_offset: 0,
            grandmaster_priority1: 128,
            grandmaster_clock_quality: ClockQuality::default(),
            grandmaster_priority2: 128,
            grandmaster_identity: [0u8; 8],
            steps_removed: 0,
            time_source: crate::datasets::time_source::INTERNAL_OSCILLATOR,
        }
    }
}

/// Pack a header and body into `buf`, returning the total message length.
///
/// The header's `message_length` field is trusted to match the body; use
/// [`PtpHeader::for_message`] to build consistent headers.
pub fn pack_message<B: ToBytes>(
    header: &PtpHeader,
    body: &B,
    buf: &mut [u8],
) -> Result<usize, PtpError> {
    let header_len = header.to_bytes(buf)?;
    let body_len = body.to_bytes(&mut buf[header_len..])?;
    Ok(header_len + body_len)
}
