// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Error types for the PTP endpoint.
//!
//! [`PtpError`] covers every failure the core can report: malformed wire
//! data, protocol-sequence violations, transport faults, and hardware clock
//! faults. Message handlers that merely drop bad input do not propagate an
//! error; they record the drop in a counter and return `Ok` so the engine
//! keeps running (timeouts, not errors, shape the protocol's recovery).

use std::fmt;
use std::io;

/// Errors reported by the PTP core.
#[derive(Debug)]
pub enum PtpError {
    /// A message buffer is too short for the expected data.
    BufferTooShort {
        /// Number of bytes needed.
        needed: usize,
        /// Number of bytes available.
        available: usize,
    },
    /// The header carries a PTP version other than 2.
    UnsupportedVersion {
        /// The version nibble from the header.
        version: u8,
    },
    /// The message belongs to a different PTP domain.
    WrongDomain {
        /// The domain number from the header.
        domain: u8,
    },
    /// The message type nibble is unknown or out of scope (peer-delay,
    /// signaling, management).
    UnsupportedMessageType {
        /// The raw message type nibble.
        message_type: u8,
    },
    /// A field carries a value outside its valid range.
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// The invalid value.
        value: u32,
    },
    /// A message arrived outside the expected exchange sequence.
    OutOfOrder {
        /// What was violated.
        reason: &'static str,
    },
    /// The foreign-master table is full and the sender is unknown.
    ForeignTableFull,
    /// A socket operation failed.
    Transport(io::Error),
    /// The hardware tick counter could not be brought up.
    Hardware {
        /// What failed.
        reason: &'static str,
    },
}

impl fmt::Display for PtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PtpError::BufferTooShort { needed, available } => {
                write!(
                    f,
                    "buffer too short: needed {} bytes, got {}",
                    needed, available
                )
            }
            PtpError::UnsupportedVersion { version } => {
                write!(f, "unsupported PTP version: {}", version)
            }
            PtpError::WrongDomain { domain } => {
                write!(f, "message for foreign domain: {}", domain)
            }
            PtpError::UnsupportedMessageType { message_type } => {
                write!(f, "unsupported message type: {:#x}", message_type)
            }
            PtpError::InvalidField { field, value } => {
                write!(f, "invalid {} value: {}", field, value)
            }
            PtpError::OutOfOrder { reason } => {
                write!(f, "out-of-order message: {}", reason)
            }
            PtpError::ForeignTableFull => {
                write!(f, "foreign master table full")
            }
            PtpError::Transport(err) => {
                write!(f, "transport error: {}", err)
            }
            PtpError::Hardware { reason } => {
                write!(f, "hardware clock error: {}", reason)
            }
        }
    }
}

impl std::error::Error for PtpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PtpError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PtpError {
    fn from(err: io::Error) -> PtpError {
        PtpError::Transport(err)
    }
}

impl From<PtpError> for io::Error {
    fn from(err: PtpError) -> io::Error {
        let kind = match &err {
            PtpError::BufferTooShort { .. } => io::ErrorKind::UnexpectedEof,
            PtpError::Transport(inner) => inner.kind(),
            PtpError::Hardware { .. } => io::ErrorKind::Other,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}
