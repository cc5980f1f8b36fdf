/*!
# Example

Runs a slave-only ordinary clock on the default interface until killed,
steering a software clock toward whatever grandmaster wins the election on
the segment.

```rust,no_run
use std::net::Ipv4Addr;
use std::sync::atomic::AtomicBool;

fn main() -> Result<(), ptp::PtpError> {
    let clock = ptp::clock::SoftwareClock::new(ptp::clock::MonotonicCounter::new())?;
    let net = ptp::transport::UdpTransport::open(Ipv4Addr::UNSPECIFIED)?;
    let mut port = ptp::PtpPort::new(ptp::PtpOptions::slave_only(), clock, net);

    let ticker = ptp::daemon::Ticker::spawn(ptp::PTP_TICK_RATE_HZ);
    let shutdown = AtomicBool::new(false);
    ptp::daemon::run(&mut port, &ticker.flag(), &shutdown)
}
```
*/

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Error types shared across the crate.
pub mod error;

/// Signed seconds/nanoseconds time values and their arithmetic.
pub mod time;

/// Wire codec for the PTPv2 message header and bodies.
pub mod protocol;

/// The PTP data sets (defaultDS, portDS, parentDS, timePropertiesDS).
pub mod datasets;

/// Startup options for the endpoint.
pub mod config;

/// Local clock abstraction: tick counters, slewing, and stepping.
pub mod clock;

/// Countdown software timers driven by the periodic tick.
pub mod timer;

/// IPv4/UDP multicast transport (event port 319, general port 320).
pub mod transport;

/// Best Master Clock algorithm and foreign-master bookkeeping.
pub mod bmc;

/// Offset/delay filtering and the PI clock servo.
pub mod servo;

/// The port state machine and protocol engine.
pub mod port;

/// The single-threaded super-loop and hosted tick source.
pub mod daemon;

pub use config::PtpOptions;
pub use datasets::{ClockQuality, PortIdentity};
pub use error::PtpError;
pub use port::{PtpPort, PortStats};
pub use time::TimeInternal;

/// Rate of the periodic protocol tick in Hz.
///
/// Timer intervals are converted to tick counts against this rate; the
/// tick source (hardware timer ISR or [`daemon::Ticker`]) must run at it.
pub const PTP_TICK_RATE_HZ: u32 = 10;

/// The states of a PTP port (IEEE 1588-2008 Table 10, Section 9.2.5).
///
/// An ordinary clock moves between LISTENING, MASTER, and the
/// UNCALIBRATED/SLAVE pair under the best-master-clock algorithm; FAULTY
/// absorbs unrecoverable transport or hardware failures.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PortState {
    /// Data sets, timers, and servo are being initialized.
    Initializing,
    /// An unrecoverable fault occurred; the port no longer participates.
    Faulty,
    /// The port has been administratively disabled.
    Disabled,
    /// Waiting for Announce messages before deciding a role.
    Listening,
    /// Qualifying to become master (unused by this single-port endpoint).
    PreMaster,
    /// This port is the segment's master and emits Announce and Sync.
    Master,
    /// A better master exists but this clock is not its slave.
    Passive,
    /// A master has been selected; the servo has not yet converged.
    Uncalibrated,
    /// Synchronized to the selected master.
    Slave,
}
