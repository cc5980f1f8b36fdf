// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! The protocol engine: one PTP port's state machine, message handlers,
//! and timer-driven message issuance (IEEE 1588-2008 Section 9.2).
//!
//! [`PtpPort`] owns the four data sets, the foreign-master table, the
//! servo, and the timer wheel, and is driven from exactly two entry
//! points: [`poll_network`](PtpPort::poll_network) delivers received
//! datagrams to the handlers, and [`protocol_tick`](PtpPort::protocol_tick)
//! advances the timers and performs state transitions. Everything runs to
//! completion; nothing here blocks.

use log::{debug, info, warn};

use crate::bmc::{self, ForeignMasterTable};
use crate::clock::Clock;
use crate::config::PtpOptions;
use crate::datasets::{DefaultDS, ParentDS, PortDS, TimePropertiesDS};
use crate::error::PtpError;
use crate::protocol::{
    flags, pack_message, AnnounceBody, DelayReqBody, DelayRespBody, FollowUpBody, FromBytes,
    MessageType, PtpHeader, SyncBody, HEADER_LENGTH, MAX_MESSAGE_LENGTH, VERSION_PTP,
};
use crate::servo::Servo;
use crate::time::TimeInternal;
use crate::timer::{PortTimer, TimerWheel};
use crate::transport::Network;
use crate::{PortState, PTP_TICK_RATE_HZ};

/// A slave in UNCALIBRATED is promoted to SLAVE once the filtered offset
/// magnitude drops below this bound (1 µs).
pub const CALIBRATION_BOUND_NS: i32 = 1_000;

/// The logMessageInterval value carried by Delay_Req and Delay_Resp
/// messages addressed to the whole segment (IEEE 1588-2008 Table 24).
const LOG_INTERVAL_UNDEFINED: i8 = 0x7F;

/// Counters for dropped and faulted traffic.
///
/// Protocol-level errors are never surfaced to callers; these counters are
/// the only externally visible trace of bad input.
#[derive(Clone, Copy, Debug, Default)]
pub struct PortStats {
    /// Truncated buffers, wrong version, wrong domain, bad field values.
    pub malformed: u64,
    /// Messages violating the exchange sequence (stray Follow_Up, stale
    /// Delay_Resp, Sync from a non-parent).
    pub out_of_order: u64,
    /// Valid messages this endpoint does not act on in its current state,
    /// plus out-of-scope message types.
    pub ignored: u64,
    /// Announces from new senders dropped because the table was full.
    pub foreign_table_full: u64,
    /// Socket send failures (each one faults the port).
    pub send_errors: u64,
}

/// A single-port PTP ordinary clock.
///
/// Generic over the local clock and the network so the engine runs
/// identically over hardware counters, the hosted monotonic clock, or the
/// deterministic test doubles.
pub struct PtpPort<C: Clock, N: Network> {
    options: PtpOptions,
    clock: C,
    net: N,

    default_ds: DefaultDS,
    port_ds: PortDS,
    parent_ds: ParentDS,
    time_properties_ds: TimePropertiesDS,

    foreign: ForeignMasterTable,
    servo: Servo,
    timers: TimerWheel,
    recommended_state: PortState,
    stats: PortStats,

    announce_sequence_id: u16,
    sync_sequence_id: u16,
    delay_req_sequence_id: u16,
    delay_req_pending: bool,

    waiting_for_follow_up: bool,
    last_sync_header: Option<PtpHeader>,
    /// T2: ingress time of the last accepted Sync.
    sync_receive_time: TimeInternal,
    /// T3: egress time of the last Delay_Req we sent.
    delay_req_send_time: TimeInternal,
}

impl<C: Clock, N: Network> PtpPort<C, N> {
    /// Create a port in the INITIALIZING state.
    ///
    /// Call [`startup`](PtpPort::startup) to enter LISTENING and begin
    /// protocol operation.
    pub fn new(options: PtpOptions, clock: C, net: N) -> Self {
        let default_ds = DefaultDS::new(&options);
        let port_ds = PortDS::new(&options);
        let parent_ds = ParentDS::new(&default_ds);
        PtpPort {
            options,
            clock,
            net,
            default_ds,
            port_ds,
            parent_ds,
            time_properties_ds: TimePropertiesDS::default(),
            foreign: ForeignMasterTable::new(),
            servo: Servo::new(),
            timers: TimerWheel::new(PTP_TICK_RATE_HZ),
            recommended_state: PortState::Listening,
            stats: PortStats::default(),
            announce_sequence_id: 0,
            sync_sequence_id: 0,
            delay_req_sequence_id: 0,
            delay_req_pending: false,
            waiting_for_follow_up: false,
            last_sync_header: None,
            sync_receive_time: TimeInternal::ZERO,
            delay_req_send_time: TimeInternal::ZERO,
        }
    }

    /// Leave INITIALIZING: reset the servo and start listening for masters.
    pub fn startup(&mut self) {
        info!(
            "port: starting, clock identity {:02x?}, domain {}",
            self.default_ds.clock_identity, self.default_ds.domain_number
        );
        self.servo.reset();
        self.recommended_state = PortState::Listening;
        self.to_state(PortState::Listening);
    }

    /// The current port state.
    pub fn state(&self) -> PortState {
        self.port_ds.port_state
    }

    /// The state most recently recommended by the BMC.
    pub fn recommended_state(&self) -> PortState {
        self.recommended_state
    }

    /// The defaultDS.
    pub fn default_ds(&self) -> &DefaultDS {
        &self.default_ds
    }

    /// The portDS.
    pub fn port_ds(&self) -> &PortDS {
        &self.port_ds
    }

    /// The parentDS.
    pub fn parent_ds(&self) -> &ParentDS {
        &self.parent_ds
    }

    /// The timePropertiesDS.
    pub fn time_properties_ds(&self) -> &TimePropertiesDS {
        &self.time_properties_ds
    }

    /// The foreign-master table.
    pub fn foreign_masters(&self) -> &ForeignMasterTable {
        &self.foreign
    }

    /// The servo state.
    pub fn servo(&self) -> &Servo {
        &self.servo
    }

    /// Drop counters.
    pub fn stats(&self) -> &PortStats {
        &self.stats
    }

    /// The local clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Mutable access to the local clock.
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// The network transport.
    pub fn network(&self) -> &N {
        &self.net
    }

    /// Mutable access to the network transport.
    pub fn network_mut(&mut self) -> &mut N {
        &mut self.net
    }

    // --- State machine ---

    /// Transition to `state`, running exit and entry actions.
    ///
    /// A transition to the current state is a no-op; timer re-arming on
    /// repeated timeouts is handled at the timeout site.
    fn to_state(&mut self, state: PortState) {
        let previous = self.port_ds.port_state;
        if previous == state {
            return;
        }

        // Exit actions.
        match previous {
            PortState::Master => {
                self.timers.stop(PortTimer::SyncInterval);
                self.timers.stop(PortTimer::AnnounceInterval);
            }
            PortState::Slave | PortState::Uncalibrated
                if !matches!(state, PortState::Slave | PortState::Uncalibrated) =>
            {
                self.timers.stop(PortTimer::DelayReqInterval);
            }
            _ => {}
        }

        info!("port: state {:?} -> {:?}", previous, state);
        self.port_ds.port_state = state;

        // Entry actions.
        match state {
            PortState::Listening => {
                self.timers.start(
                    PortTimer::AnnounceReceipt,
                    self.options.announce_receipt_timeout_ms(),
                );
                self.timers.stop(PortTimer::SyncInterval);
                self.timers.stop(PortTimer::DelayReqInterval);
                self.waiting_for_follow_up = false;
            }
            PortState::Master => {
                self.timers.start(
                    PortTimer::AnnounceInterval,
                    self.options.announce_interval_ms(),
                );
                self.timers
                    .start(PortTimer::SyncInterval, self.options.sync_interval_ms());
                self.timers.stop(PortTimer::AnnounceReceipt);
                self.waiting_for_follow_up = false;
                bmc::update_local_as_master(
                    &self.default_ds,
                    &self.port_ds,
                    &mut self.parent_ds,
                    &mut self.time_properties_ds,
                );
            }
            PortState::Uncalibrated => {
                self.timers.start(
                    PortTimer::DelayReqInterval,
                    self.options.delay_req_interval_ms(),
                );
                self.waiting_for_follow_up = false;
                self.delay_req_pending = false;
                self.servo.reset();
            }
            PortState::Slave => {}
            PortState::Faulty => {
                self.timers.stop(PortTimer::AnnounceInterval);
                self.timers.stop(PortTimer::SyncInterval);
                self.timers.stop(PortTimer::DelayReqInterval);
                self.timers.stop(PortTimer::AnnounceReceipt);
            }
            _ => {}
        }
    }

    fn apply_recommended_state(&mut self) {
        let current = self.port_ds.port_state;
        if current == PortState::Faulty || self.recommended_state == current {
            return;
        }
        match self.recommended_state {
            // A SLAVE recommendation lands in UNCALIBRATED first; the
            // Delay_Resp handler promotes once the offset settles.
            PortState::Slave => {
                if current != PortState::Uncalibrated {
                    self.to_state(PortState::Uncalibrated);
                }
            }
            other => self.to_state(other),
        }
    }

    /// One periodic tick: advance timers, apply any pending BMC
    /// recommendation, and run the current state's timer-gated duties.
    pub fn protocol_tick(&mut self) {
        self.timers.tick();
        self.apply_recommended_state();

        match self.port_ds.port_state {
            PortState::Master => {
                if self.timers.expired(PortTimer::AnnounceInterval) {
                    self.issue_announce();
                    self.timers.start(
                        PortTimer::AnnounceInterval,
                        self.options.announce_interval_ms(),
                    );
                }
                if self.port_ds.port_state == PortState::Master
                    && self.timers.expired(PortTimer::SyncInterval)
                {
                    self.issue_sync();
                    self.timers
                        .start(PortTimer::SyncInterval, self.options.sync_interval_ms());
                }
            }
            PortState::Slave | PortState::Uncalibrated => {
                if self.timers.expired(PortTimer::DelayReqInterval) {
                    self.issue_delay_req();
                    self.timers.start(
                        PortTimer::DelayReqInterval,
                        self.options.delay_req_interval_ms(),
                    );
                }
                if self.port_ds.port_state != PortState::Faulty
                    && self.timers.expired(PortTimer::AnnounceReceipt)
                {
                    self.announce_receipt_timeout();
                }
            }
            PortState::Listening => {
                if self.timers.expired(PortTimer::AnnounceReceipt) {
                    self.announce_receipt_timeout();
                }
            }
            _ => {}
        }
    }

    /// The selected master has gone quiet: forget the stale masters and
    /// rerun the BMC over the empty table.
    fn announce_receipt_timeout(&mut self) {
        warn!("port: announce receipt timeout");
        self.foreign.clear();
        let decision = bmc::state_decision(
            &self.default_ds,
            &self.port_ds,
            &mut self.parent_ds,
            &mut self.time_properties_ds,
            &self.foreign,
        );
        self.recommended_state = decision;
        if decision == PortState::Listening {
            // Possibly already LISTENING; re-arm the receipt timer by hand.
            self.timers.start(
                PortTimer::AnnounceReceipt,
                self.options.announce_receipt_timeout_ms(),
            );
        }
    }

    // --- Inbound dispatch ---

    /// Pump both sockets dry, dispatching every datagram.
    pub fn poll_network(&mut self) -> Result<(), PtpError> {
        let mut buf = [0u8; 2 * MAX_MESSAGE_LENGTH];
        loop {
            match self.net.recv_event(&mut buf) {
                Ok(Some(len)) => self.handle_msg(&buf[..len])?,
                Ok(None) => break,
                Err(err) => {
                    warn!("port: event receive failed: {}", err);
                    self.to_state(PortState::Faulty);
                    return Ok(());
                }
            }
        }
        loop {
            match self.net.recv_general(&mut buf) {
                Ok(Some(len)) => self.handle_msg(&buf[..len])?,
                Ok(None) => break,
                Err(err) => {
                    warn!("port: general receive failed: {}", err);
                    self.to_state(PortState::Faulty);
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Dispatch one received message.
    ///
    /// Bad input never propagates: truncated, foreign-domain,
    /// wrong-version, and out-of-scope messages are counted and dropped.
    /// The ingress timestamp for event messages is captured here, so its
    /// latency bound is the dispatch latency.
    pub fn handle_msg(&mut self, buf: &[u8]) -> Result<(), PtpError> {
        let ingress_time = self.clock.get_time();

        if buf.len() < HEADER_LENGTH {
            debug!("port: dropping truncated message ({} bytes)", buf.len());
            self.stats.malformed += 1;
            return Ok(());
        }
        let header = match PtpHeader::from_bytes(buf) {
            Ok((header, _)) => header,
            Err(PtpError::UnsupportedMessageType { message_type }) => {
                debug!("port: ignoring message type {:#x}", message_type);
                self.stats.ignored += 1;
                return Ok(());
            }
            Err(err) => {
                debug!("port: dropping malformed message: {}", err);
                self.stats.malformed += 1;
                return Ok(());
            }
        };
        if header.version != VERSION_PTP {
            debug!("port: dropping PTPv{} message", header.version);
            self.stats.malformed += 1;
            return Ok(());
        }
        if header.domain_number != self.default_ds.domain_number {
            debug!("port: dropping message for domain {}", header.domain_number);
            self.stats.malformed += 1;
            return Ok(());
        }
        if header.source_port_identity == self.port_ds.port_identity {
            // Our own multicast, looped back.
            return Ok(());
        }

        let body = &buf[HEADER_LENGTH..];
        match header.message_type {
            MessageType::Announce => self.handle_announce(&header, body),
            MessageType::Sync => self.handle_sync(&header, body, ingress_time),
            MessageType::FollowUp => self.handle_follow_up(&header, body),
            MessageType::DelayReq => self.handle_delay_req(&header, ingress_time),
            MessageType::DelayResp => self.handle_delay_resp(&header, body),
        }
        Ok(())
    }

    fn handle_announce(&mut self, header: &PtpHeader, body: &[u8]) {
        let announce = match AnnounceBody::from_bytes(body) {
            Ok((announce, _)) => announce,
            Err(err) => {
                debug!("port: dropping malformed announce: {}", err);
                self.stats.malformed += 1;
                return;
            }
        };
        debug!(
            "port: announce from {:02x?} seq {}",
            header.source_port_identity.clock_identity, header.sequence_id
        );

        if self.foreign.update(header, &announce).is_err() {
            warn!("port: foreign master table full, dropping new master");
            self.stats.foreign_table_full += 1;
        }

        let old_parent = self.parent_ds.parent_port_identity;
        let decision = bmc::state_decision(
            &self.default_ds,
            &self.port_ds,
            &mut self.parent_ds,
            &mut self.time_properties_ds,
            &self.foreign,
        );
        self.recommended_state = decision;

        // A synchronized slave whose parent just changed must recalibrate.
        if decision == PortState::Slave
            && self.port_ds.port_state == PortState::Slave
            && self.parent_ds.parent_port_identity != old_parent
        {
            info!("port: elected a different master, recalibrating");
            self.to_state(PortState::Uncalibrated);
        }

        self.timers.start(
            PortTimer::AnnounceReceipt,
            self.options.announce_receipt_timeout_ms(),
        );
    }

    fn handle_sync(&mut self, header: &PtpHeader, body: &[u8], t2: TimeInternal) {
        if !matches!(
            self.port_ds.port_state,
            PortState::Slave | PortState::Uncalibrated
        ) {
            self.stats.ignored += 1;
            return;
        }
        // Accept any sender until a parent is known.
        let parent = self.parent_ds.parent_port_identity;
        if !parent.is_empty() && header.source_port_identity != parent {
            debug!("port: sync from non-parent, dropping");
            self.stats.out_of_order += 1;
            return;
        }
        let sync = match SyncBody::from_bytes(body) {
            Ok((sync, _)) => sync,
            Err(err) => {
                debug!("port: dropping malformed sync: {}", err);
                self.stats.malformed += 1;
                return;
            }
        };

        self.sync_receive_time = t2;
        if header.is_two_step() {
            // A stale un-followed Sync is simply overwritten.
            self.waiting_for_follow_up = true;
            self.last_sync_header = Some(*header);
        } else {
            self.waiting_for_follow_up = false;
            self.servo.update_offset(t2, sync.origin_timestamp);
            self.servo.update_clock(&mut self.clock);
        }
    }

    fn handle_follow_up(&mut self, header: &PtpHeader, body: &[u8]) {
        if !matches!(
            self.port_ds.port_state,
            PortState::Slave | PortState::Uncalibrated
        ) {
            self.stats.ignored += 1;
            return;
        }
        let sync_header = match self.last_sync_header {
            Some(sync_header) if self.waiting_for_follow_up => sync_header,
            _ => {
                debug!("port: follow-up without matching sync, dropping");
                self.stats.out_of_order += 1;
                return;
            }
        };
        if header.sequence_id != sync_header.sequence_id
            || header.source_port_identity != sync_header.source_port_identity
        {
            debug!(
                "port: follow-up seq {} does not match sync seq {}, dropping",
                header.sequence_id, sync_header.sequence_id
            );
            self.stats.out_of_order += 1;
            return;
        }
        let follow_up = match FollowUpBody::from_bytes(body) {
            Ok((follow_up, _)) => follow_up,
            Err(err) => {
                debug!("port: dropping malformed follow-up: {}", err);
                self.stats.malformed += 1;
                return;
            }
        };

        self.waiting_for_follow_up = false;
        self.servo
            .update_offset(self.sync_receive_time, follow_up.precise_origin_timestamp);
        self.servo.update_clock(&mut self.clock);
    }

    fn handle_delay_req(&mut self, header: &PtpHeader, t4: TimeInternal) {
        if self.port_ds.port_state != PortState::Master {
            self.stats.ignored += 1;
            return;
        }
        debug!(
            "port: delay request seq {} from {:02x?}",
            header.sequence_id, header.source_port_identity.clock_identity
        );
        let resp_header = PtpHeader::for_message(
            MessageType::DelayResp,
            self.default_ds.domain_number,
            self.port_ds.port_identity,
            header.sequence_id,
            self.port_ds.log_min_delay_req_interval,
        );
        let body = DelayRespBody {
            receive_timestamp: t4,
            requesting_port_identity: header.source_port_identity,
        };
        self.send_general(&resp_header, &body);
    }

    fn handle_delay_resp(&mut self, header: &PtpHeader, body: &[u8]) {
        if !matches!(
            self.port_ds.port_state,
            PortState::Slave | PortState::Uncalibrated
        ) {
            self.stats.ignored += 1;
            return;
        }
        let resp = match DelayRespBody::from_bytes(body) {
            Ok((resp, _)) => resp,
            Err(err) => {
                debug!("port: dropping malformed delay response: {}", err);
                self.stats.malformed += 1;
                return;
            }
        };
        if resp.requesting_port_identity != self.port_ds.port_identity {
            // Answer to some other slave's request.
            return;
        }
        if !self.delay_req_pending || header.sequence_id != self.delay_req_sequence_id {
            debug!(
                "port: delay response seq {} unexpected, dropping",
                header.sequence_id
            );
            self.stats.out_of_order += 1;
            return;
        }
        self.delay_req_pending = false;

        self.servo
            .update_delay(self.delay_req_send_time, resp.receive_timestamp);
        self.servo.update_clock(&mut self.clock);

        if self.port_ds.port_state == PortState::Uncalibrated {
            let offset = self.servo.offset_from_master();
            if offset.seconds == 0 && offset.nanoseconds.abs() < CALIBRATION_BOUND_NS {
                info!("port: offset {} within calibration bound", offset);
                self.to_state(PortState::Slave);
            }
        }
    }

    // --- Outbound messages ---

    fn issue_announce(&mut self) {
        let sequence_id = self.announce_sequence_id;
        self.announce_sequence_id = self.announce_sequence_id.wrapping_add(1);

        let mut header = PtpHeader::for_message(
            MessageType::Announce,
            self.default_ds.domain_number,
            self.port_ds.port_identity,
            sequence_id,
            self.port_ds.log_announce_interval,
        );
        header.flags = self.time_properties_flags();
        let tp = &self.time_properties_ds;
        let body = AnnounceBody {
            origin_timestamp: TimeInternal::ZERO,
            current_utc_offset: tp.current_utc_offset,
            grandmaster_priority1: self.parent_ds.grandmaster_priority1,
            grandmaster_clock_quality: self.parent_ds.grandmaster_clock_quality,
            grandmaster_priority2: self.parent_ds.grandmaster_priority2,
            grandmaster_identity: self.parent_ds.grandmaster_identity,
            steps_removed: 0,
            time_source: tp.time_source,
        };
        debug!("port: issuing announce seq {}", sequence_id);
        self.send_general(&header, &body);
    }

    fn issue_sync(&mut self) {
        let sequence_id = self.sync_sequence_id;
        self.sync_sequence_id = self.sync_sequence_id.wrapping_add(1);

        let mut header = PtpHeader::for_message(
            MessageType::Sync,
            self.default_ds.domain_number,
            self.port_ds.port_identity,
            sequence_id,
            self.port_ds.log_sync_interval,
        );
        if self.default_ds.two_step {
            header.flags |= flags::TWO_STEP;
        }
        // T1: captured as close to egress as software allows.
        let t1 = self.clock.get_time();
        let body = SyncBody {
            origin_timestamp: t1,
        };
        debug!("port: issuing sync seq {} at {}", sequence_id, t1);
        if !self.send_event(&header, &body) {
            return;
        }

        if self.default_ds.two_step {
            // The Follow_Up shares the Sync's sequence id and carries the
            // precise T1.
            let fu_header = PtpHeader::for_message(
                MessageType::FollowUp,
                self.default_ds.domain_number,
                self.port_ds.port_identity,
                sequence_id,
                self.port_ds.log_sync_interval,
            );
            let fu_body = FollowUpBody {
                precise_origin_timestamp: t1,
            };
            self.send_general(&fu_header, &fu_body);
        }
    }

    fn issue_delay_req(&mut self) {
        let sequence_id = self.delay_req_sequence_id.wrapping_add(1);
        self.delay_req_sequence_id = sequence_id;

        let header = PtpHeader::for_message(
            MessageType::DelayReq,
            self.default_ds.domain_number,
            self.port_ds.port_identity,
            sequence_id,
            LOG_INTERVAL_UNDEFINED,
        );
        let t3 = self.clock.get_time();
        self.delay_req_send_time = t3;
        let body = DelayReqBody {
            origin_timestamp: t3,
        };
        debug!("port: issuing delay request seq {}", sequence_id);
        if self.send_event(&header, &body) {
            self.delay_req_pending = true;
        }
    }

    fn time_properties_flags(&self) -> u16 {
        let tp = &self.time_properties_ds;
        let mut value = 0;
        if tp.leap61 {
            value |= flags::LEAP61;
        }
        if tp.leap59 {
            value |= flags::LEAP59;
        }
        if tp.current_utc_offset_valid {
            value |= flags::UTC_OFFSET_VALID;
        }
        if tp.ptp_timescale {
            value |= flags::PTP_TIMESCALE;
        }
        if tp.time_traceable {
            value |= flags::TIME_TRACEABLE;
        }
        if tp.frequency_traceable {
            value |= flags::FREQUENCY_TRACEABLE;
        }
        value
    }

    fn send_event<B: crate::protocol::ToBytes>(&mut self, header: &PtpHeader, body: &B) -> bool {
        let mut buf = [0u8; MAX_MESSAGE_LENGTH];
        let frame = match pack_message(header, body, &mut buf) {
            Ok(len) => &buf[..len],
            Err(err) => {
                warn!("port: packing failed: {}", err);
                return false;
            }
        };
        match self.net.send_event(frame) {
            Ok(_) => true,
            Err(err) => {
                warn!("port: event send failed: {}", err);
                self.stats.send_errors += 1;
                self.to_state(PortState::Faulty);
                false
            }
        }
    }

    fn send_general<B: crate::protocol::ToBytes>(&mut self, header: &PtpHeader, body: &B) -> bool {
        let mut buf = [0u8; MAX_MESSAGE_LENGTH];
        let frame = match pack_message(header, body, &mut buf) {
            Ok(len) => &buf[..len],
            Err(err) => {
                warn!("port: packing failed: {}", err);
                return false;
            }
        };
        match self.net.send_general(frame) {
            Ok(_) => true,
            Err(err) => {
                warn!("port: general send failed: {}", err);
                self.stats.send_errors += 1;
                self.to_state(PortState::Faulty);
                false
            }
        }
    }
}
