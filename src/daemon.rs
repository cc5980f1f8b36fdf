// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! The cooperative super-loop driving a PTP port.
//!
//! The core is single-threaded: the loop pumps received datagrams into the
//! handlers, then observes a tick-pending flag and runs one
//! [`protocol_tick`](crate::port::PtpPort::protocol_tick) per observation.
//! The flag is the only shared state with the tick source, mirroring a
//! bare-metal deployment where a timer ISR may do nothing but set it. On a
//! hosted system [`Ticker`] provides that source as a background thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::info;

use crate::clock::Clock;
use crate::error::PtpError;
use crate::port::PtpPort;
use crate::transport::Network;
use crate::{PortState, PTP_TICK_RATE_HZ};

/// A hosted periodic tick source.
///
/// Sets the shared flag at the protocol tick rate; the thread stops when
/// the `Ticker` is dropped. The flag is only ever written `true` here and
/// cleared by the consumer, so a slow consumer coalesces ticks rather than
/// queueing them.
#[derive(Debug)]
pub struct Ticker {
    flag: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Ticker {
    /// Spawn a tick thread at the given rate.
    pub fn spawn(rate_hz: u32) -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let period = Duration::from_millis(1000 / u64::from(rate_hz.max(1)));
        let thread_flag = Arc::clone(&flag);
        let thread_running = Arc::clone(&running);
        let handle = thread::spawn(move || {
            while thread_running.load(Ordering::Relaxed) {
                thread::sleep(period);
                thread_flag.store(true, Ordering::Release);
            }
        });
        Ticker {
            flag,
            running,
            handle: Some(handle),
        }
    }

    /// The tick-pending flag to hand to [`run`].
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Run the super-loop until `shutdown` is set.
///
/// Interleaves three duties, none of which may block:
/// receive pumping, tick observation, and (through the handlers) message
/// emission. Starts the port if it is still INITIALIZING.
///
/// The short sleep keeps a hosted build from spinning a core; an embedded
/// port of this loop would poll its MAC driver instead.
pub fn run<C: Clock, N: Network>(
    port: &mut PtpPort<C, N>,
    tick_pending: &AtomicBool,
    shutdown: &AtomicBool,
) -> Result<(), PtpError> {
    if port.state() == PortState::Initializing {
        port.startup();
    }
    info!("daemon: entering super-loop at {} Hz", PTP_TICK_RATE_HZ);

    while !shutdown.load(Ordering::Relaxed) {
        port.poll_network()?;
        if tick_pending.swap(false, Ordering::Acquire) {
            port.protocol_tick();
        }
        thread::sleep(Duration::from_millis(1));
    }
    info!("daemon: shutdown requested, leaving super-loop");
    Ok(())
}
