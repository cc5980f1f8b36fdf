// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Startup configuration for the ordinary clock.
//!
//! [`PtpOptions`] is read once when the port is created; the protocol has no
//! runtime reconfiguration. The two named constructors mirror the usual
//! deployments: a master-capable clock (class 248, priorities 128) and a
//! slave-only clock (class 255, priorities 255).

use crate::datasets::ClockQuality;

/// Startup options for a PTP ordinary-clock port.
#[derive(Clone, Copy, Debug)]
pub struct PtpOptions {
    /// When set, the best-master-clock algorithm never decides MASTER.
    pub slave_only: bool,
    /// Sync interval as log2 seconds; also the `logMessageInterval` field of
    /// emitted Sync messages.
    pub sync_interval: i8,
    /// Announce interval as log2 seconds.
    pub announce_interval: i8,
    /// Minimum Delay_Req interval as log2 seconds.
    pub min_delay_req_interval: i8,
    /// Announce intervals to wait before declaring the master lost.
    pub announce_receipt_timeout: u8,
    /// The quality advertised for the local clock.
    pub clock_quality: ClockQuality,
    /// BMC priority1, lower is better.
    pub priority1: u8,
    /// BMC priority2, lower is better.
    pub priority2: u8,
    /// PTP domain number; messages from other domains are dropped.
    pub domain_number: u8,
    /// MAC address the EUI-64 clock identity is derived from.
    pub mac_address: [u8; 6],
}

impl PtpOptions {
    /// Options for a master-capable clock.
    pub fn master_capable() -> Self {
        PtpOptions {
            slave_only: false,
            sync_interval: 1,
            announce_interval: 1,
            min_delay_req_interval: 0,
            announce_receipt_timeout: 3,
            clock_quality: ClockQuality {
                clock_class: 248,
                clock_accuracy: 0xFE,
                offset_scaled_log_variance: 0xFFFF,
            },
            priority1: 128,
            priority2: 128,
            domain_number: 0,
            mac_address: [0x00, 0x0a, 0x35, 0x00, 0x01, 0x02],
        }
    }

    /// Options for a clock that may only ever be a slave.
    pub fn slave_only() -> Self {
        PtpOptions {
            slave_only: true,
            clock_quality: ClockQuality {
                clock_class: 255,
                clock_accuracy: 0xFE,
                offset_scaled_log_variance: 0xFFFF,
            },
            priority1: 255,
            priority2: 255,
            ..Self::master_capable()
        }
    }

    /// Announce interval in milliseconds.
    pub fn announce_interval_ms(&self) -> u32 {
        log_interval_ms(self.announce_interval)
    }

    /// Sync interval in milliseconds.
    pub fn sync_interval_ms(&self) -> u32 {
        log_interval_ms(self.sync_interval)
    }

    /// Delay_Req interval in milliseconds.
    pub fn delay_req_interval_ms(&self) -> u32 {
        log_interval_ms(self.min_delay_req_interval)
    }

    /// Announce receipt timeout in milliseconds
    /// (`announce_receipt_timeout` announce intervals).
    pub fn announce_receipt_timeout_ms(&self) -> u32 {
        u32::from(self.announce_receipt_timeout) * self.announce_interval_ms()
    }
}

impl Default for PtpOptions {
    fn default() -> Self {
        Self::master_capable()
    }
}

/// Convert a log2-seconds interval to milliseconds.
///
/// Negative exponents give sub-second intervals (e.g. -1 is 500 ms); the
/// result never rounds below one millisecond.
fn log_interval_ms(log: i8) -> u32 {
    if log >= 0 {
        1000u32.saturating_mul(1u32 << (i32::from(log).min(20) as u32))
    } else {
        (1000u32 >> ((-i32::from(log)).min(10) as u32)).max(1)
    }
}
