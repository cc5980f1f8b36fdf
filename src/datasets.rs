// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! The PTP data sets (IEEE 1588-2008 Clause 8, Tables 8 through 11).
//!
//! An ordinary clock owns one instance of each data set for its lifetime.
//! The defaultDS describes the local clock, the portDS describes its single
//! port, the parentDS names the clock it is synchronized to, and the
//! timePropertiesDS mirrors the grandmaster's timescale flags.

use crate::config::PtpOptions;
use crate::PortState;

/// Size of a PTP clock identity (EUI-64).
pub const CLOCK_IDENTITY_LENGTH: usize = 8;

/// An EUI-64 clock identity.
pub type ClockIdentity = [u8; CLOCK_IDENTITY_LENGTH];

/// Time source codes from IEEE 1588-2008 Table 7.
pub mod time_source {
    /// A calibrated atomic clock.
    pub const ATOMIC_CLOCK: u8 = 0x10;
    /// A GPS receiver.
    pub const GPS: u8 = 0x20;
    /// A PTP-external source.
    pub const PTP: u8 = 0x40;
    /// An NTP-derived source.
    pub const NTP: u8 = 0x50;
    /// A free-running local oscillator.
    pub const INTERNAL_OSCILLATOR: u8 = 0xA0;
}

/// The identity of one PTP port: clock identity plus 16-bit port number.
///
/// Equality is memberwise. An all-zero identity with port number zero acts
/// as the "unknown" value in the parentDS before any master is selected.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct PortIdentity {
    /// The owning clock's EUI-64 identity.
    pub clock_identity: ClockIdentity,
    /// Port number, 1-based; 0 marks an unpopulated identity.
    pub port_number: u16,
}

impl PortIdentity {
    /// Build a port identity from a 48-bit MAC address.
    ///
    /// The EUI-64 is derived by inserting `FF FE` between the third and
    /// fourth octets of the MAC (IEEE 1588-2008 Section 7.5.2.2.2).
    pub fn from_mac(mac: [u8; 6], port_number: u16) -> Self {
        PortIdentity {
            clock_identity: [mac[0], mac[1], mac[2], 0xFF, 0xFE, mac[3], mac[4], mac[5]],
            port_number,
        }
    }

    /// Whether this identity has never been populated.
    pub fn is_empty(&self) -> bool {
        self.port_number == 0 && self.clock_identity == [0u8; CLOCK_IDENTITY_LENGTH]
    }
}

/// The quality of a clock: class, accuracy, and scaled log variance.
///
/// The derived ordering is lexicographic over (class, accuracy, variance),
/// so a *smaller* `ClockQuality` is a *better* clock, matching the
/// comparison order of the best-master-clock algorithm.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ClockQuality {
    /// Clock class (248 = default master-capable, 255 = slave-only).
    pub clock_class: u8,
    /// Clock accuracy code (0xFE = unknown).
    pub clock_accuracy: u8,
    /// Offset scaled log variance (0xFFFF = not computed).
    pub offset_scaled_log_variance: u16,
}

impl Default for ClockQuality {
    fn default() -> Self {
        ClockQuality {
            clock_class: 248,
            clock_accuracy: 0xFE,
            offset_scaled_log_variance: 0xFFFF,
        }
    }
}

/// The delay measurement mechanism of a port (IEEE 1588-2008 Table 21).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DelayMechanism {
    /// The delay request-response mechanism.
    E2E = 0x01,
    /// The peer-delay mechanism (not implemented by this endpoint).
    P2P = 0x02,
}

/// The defaultDS: static attributes of the local clock (Table 8).
#[derive(Clone, Copy, Debug)]
pub struct DefaultDS {
    /// Whether this clock sends Follow_Up messages after Sync.
    pub two_step: bool,
    /// The local clock identity.
    pub clock_identity: ClockIdentity,
    /// Number of ports; always 1 for an ordinary clock.
    pub number_ports: u16,
    /// The local clock's quality, advertised in Announce messages.
    pub clock_quality: ClockQuality,
    /// First BMC priority field, lower is better.
    pub priority1: u8,
    /// Second BMC priority field, lower is better.
    pub priority2: u8,
    /// The PTP domain this clock participates in.
    pub domain_number: u8,
    /// When set, the best-master-clock algorithm never selects MASTER.
    pub slave_only: bool,
}

impl DefaultDS {
    /// Initialize from startup options.
    pub fn new(opts: &PtpOptions) -> Self {
        let identity = PortIdentity::from_mac(opts.mac_address, 1);
        DefaultDS {
            two_step: true,
            clock_identity: identity.clock_identity,
            number_ports: 1,
            clock_quality: opts.clock_quality,
            priority1: opts.priority1,
            priority2: opts.priority2,
            domain_number: opts.domain_number,
            slave_only: opts.slave_only,
        }
    }
}

/// The portDS: per-port state and message intervals (Table 10).
#[derive(Clone, Copy, Debug)]
pub struct PortDS {
    /// This port's identity (local clock identity, port number 1).
    pub port_identity: PortIdentity,
    /// Current state of the port state machine.
    pub port_state: PortState,
    /// Minimum Delay_Req interval, log2 seconds.
    pub log_min_delay_req_interval: i8,
    /// Announce interval, log2 seconds.
    pub log_announce_interval: i8,
    /// Sync interval, log2 seconds.
    pub log_sync_interval: i8,
    /// Number of announce intervals without an Announce before timeout.
    pub announce_receipt_timeout: u8,
    /// Delay measurement mechanism; always E2E here.
    pub delay_mechanism: DelayMechanism,
    /// PTP version number; always 2.
    pub version_number: u8,
}

impl PortDS {
    /// Initialize from startup options.
    pub fn new(opts: &PtpOptions) -> Self {
        PortDS {
            port_identity: PortIdentity::from_mac(opts.mac_address, 1),
            port_state: PortState::Initializing,
            log_min_delay_req_interval: opts.min_delay_req_interval,
            log_announce_interval: opts.announce_interval,
            log_sync_interval: opts.sync_interval,
            announce_receipt_timeout: opts.announce_receipt_timeout,
            delay_mechanism: DelayMechanism::E2E,
            version_number: crate::protocol::VERSION_PTP,
        }
    }
}

/// The parentDS: the clock this port is synchronized to (Table 9).
///
/// Exactly one parentDS is authoritative at any moment; it is rewritten
/// only by the BMC data-set updates (M1 when this clock becomes master,
/// S1 when a foreign master is selected).
#[derive(Clone, Copy, Debug)]
pub struct ParentDS {
    /// Identity of the master port this clock listens to.
    pub parent_port_identity: PortIdentity,
    /// The grandmaster's clock identity.
    pub grandmaster_identity: ClockIdentity,
    /// The grandmaster's clock quality.
    pub grandmaster_clock_quality: ClockQuality,
    /// The grandmaster's priority1.
    pub grandmaster_priority1: u8,
    /// The grandmaster's priority2.
    pub grandmaster_priority2: u8,
}

impl ParentDS {
    /// Initialize to the local clock (a clock is its own parent at boot).
    pub fn new(default_ds: &DefaultDS) -> Self {
        ParentDS {
            parent_port_identity: PortIdentity::default(),
            grandmaster_identity: default_ds.clock_identity,
            grandmaster_clock_quality: default_ds.clock_quality,
            grandmaster_priority1: default_ds.priority1,
            grandmaster_priority2: default_ds.priority2,
        }
    }
}

/// The timePropertiesDS: timescale attributes of the current grandmaster
/// (Table 11).
#[derive(Clone, Copy, Debug)]
pub struct TimePropertiesDS {
    /// Offset of UTC from TAI in seconds.
    pub current_utc_offset: i16,
    /// Whether `current_utc_offset` is known to be correct.
    pub current_utc_offset_valid: bool,
    /// The last minute of the current UTC day has 59 seconds.
    pub leap59: bool,
    /// The last minute of the current UTC day has 61 seconds.
    pub leap61: bool,
    /// The timescale is traceable to a primary reference.
    pub time_traceable: bool,
    /// The frequency is traceable to a primary reference.
    pub frequency_traceable: bool,
    /// The grandmaster uses the PTP (TAI) timescale.
    pub ptp_timescale: bool,
    /// The grandmaster's time source (Table 7 codes).
    pub time_source: u8,
}

impl Default for TimePropertiesDS {
    fn default() -> Self {
        TimePropertiesDS {
            current_utc_offset: 0,
            current_utc_offset_valid: false,
            leap59: false,
            leap61: false,
            time_traceable: false,
            frequency_traceable: false,
            ptp_timescale: false,
            time_source: time_source::INTERNAL_OSCILLATOR,
        }
    }
}
