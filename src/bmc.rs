// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Best Master Clock algorithm (IEEE 1588-2008 Section 9.3).
//!
//! Three pieces compose here: the foreign-master table that remembers the
//! most recent Announce from every master heard on the segment, the
//! data-set comparison of Figure 27/28 that totally orders those masters,
//! and the state decision that recommends MASTER, SLAVE, or LISTENING and
//! rewrites the parent and time-properties data sets accordingly (the M1
//! and S1 updates of Section 9.5).

use std::cmp::Ordering;

use log::debug;

use crate::datasets::{
    time_source, ClockIdentity, DefaultDS, ParentDS, PortDS, PortIdentity, TimePropertiesDS,
};
use crate::error::PtpError;
use crate::protocol::{flags, AnnounceBody, MessageType, PtpHeader};
use crate::PortState;

/// Capacity of the foreign-master table.
pub const DEFAULT_MAX_FOREIGN_RECORDS: usize = 5;

/// The most recent Announce seen from one foreign master.
#[derive(Clone, Copy, Debug)]
pub struct ForeignMasterRecord {
    /// The sender's port identity.
    pub port_identity: PortIdentity,
    /// Header of the last Announce from this sender.
    pub header: PtpHeader,
    /// Body of the last Announce from this sender.
    pub announce: AnnounceBody,
}

/// Fixed-capacity table of foreign masters.
///
/// Entries live for the process lifetime: a sender's record is only ever
/// overwritten by a newer Announce from the same sender, and a new sender
/// is dropped once all slots are taken.
#[derive(Debug, Default)]
pub struct ForeignMasterTable {
    records: [Option<ForeignMasterRecord>; DEFAULT_MAX_FOREIGN_RECORDS],
}

impl ForeignMasterTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of populated records.
    pub fn len(&self) -> usize {
        self.records.iter().flatten().count()
    }

    /// Whether no master has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every record.
    pub fn clear(&mut self) {
        self.records = [None; DEFAULT_MAX_FOREIGN_RECORDS];
    }

    /// Record an Announce.
    ///
    /// A known sender's row is overwritten in place; a new sender takes the
    /// first empty slot. When the table is full and the sender is new the
    /// update is dropped with [`PtpError::ForeignTableFull`].
    pub fn update(&mut self, header: &PtpHeader, announce: &AnnounceBody) -> Result<(), PtpError> {
        let sender = header.source_port_identity;
        let record = ForeignMasterRecord {
            port_identity: sender,
            header: *header,
            announce: *announce,
        };
        if let Some(slot) = self
            .records
            .iter_mut()
            .flatten()
            .find(|r| r.port_identity == sender)
        {
            *slot = record;
            return Ok(());
        }
        if let Some(empty) = self.records.iter_mut().find(|slot| slot.is_none()) {
            *empty = Some(record);
            return Ok(());
        }
        Err(PtpError::ForeignTableFull)
    }

    /// The best foreign master by data-set comparison, if any.
    pub fn best(&self, own_identity: &ClockIdentity) -> Option<&ForeignMasterRecord> {
        let mut best: Option<&ForeignMasterRecord> = None;
        for record in self.records.iter().flatten() {
            best = match best {
                None => Some(record),
                Some(current) => {
                    let ordering = compare_datasets(
                        &record.header,
                        &record.announce,
                        &current.header,
                        &current.announce,
                        own_identity,
                    );
                    if ordering == Ordering::Greater {
                        Some(record)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best
    }

    /// Iterate over the populated records.
    pub fn records(&self) -> impl Iterator<Item = &ForeignMasterRecord> {
        self.records.iter().flatten()
    }
}

fn cmp_port_identity(a: &PortIdentity, b: &PortIdentity) -> Ordering {
    (a.clock_identity, a.port_number).cmp(&(b.clock_identity, b.port_number))
}

/// Data-set comparison (IEEE 1588-2008 Figure 27/28).
///
/// Returns `Ordering::Greater` when `a` names the better master. Every
/// field comparison prefers the *lower* value; when the two Announces name
/// the same grandmaster the topology tiebreak on `stepsRemoved` and sender
/// identity decides.
pub fn compare_datasets(
    a_header: &PtpHeader,
    a: &AnnounceBody,
    b_header: &PtpHeader,
    b: &AnnounceBody,
    own_identity: &ClockIdentity,
) -> Ordering {
    if a.grandmaster_priority1 != b.grandmaster_priority1 {
        return b.grandmaster_priority1.cmp(&a.grandmaster_priority1);
    }
    if a.grandmaster_clock_quality != b.grandmaster_clock_quality {
        return b.grandmaster_clock_quality.cmp(&a.grandmaster_clock_quality);
    }
    if a.grandmaster_priority2 != b.grandmaster_priority2 {
        return b.grandmaster_priority2.cmp(&a.grandmaster_priority2);
    }
    if a.grandmaster_identity != b.grandmaster_identity {
        return b.grandmaster_identity.cmp(&a.grandmaster_identity);
    }

    // Same grandmaster seen along two paths: tiebreak by topology.
    let steps_diff = i32::from(a.steps_removed) - i32::from(b.steps_removed);
    if steps_diff.abs() > 1 {
        return b.steps_removed.cmp(&a.steps_removed);
    }
    if steps_diff == 1 {
        // b is closer, unless b is actually ourselves.
        return if &b_header.source_port_identity.clock_identity == own_identity {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if steps_diff == -1 {
        return if &a_header.source_port_identity.clock_identity == own_identity {
            Ordering::Less
        } else {
            Ordering::Greater
        };
    }

    // Equal distance: the smaller sender identity wins.
    cmp_port_identity(
        &b_header.source_port_identity,
        &a_header.source_port_identity,
    )
}

/// Build the pseudo-Announce describing the local clock (data set D0),
/// used as one side of the state-decision comparison.
fn local_candidate(default_ds: &DefaultDS, port_ds: &PortDS) -> (PtpHeader, AnnounceBody) {
    let header = PtpHeader::for_message(
        MessageType::Announce,
        default_ds.domain_number,
        port_ds.port_identity,
        0,
        port_ds.log_announce_interval,
    );
    let announce = AnnounceBody {
        grandmaster_priority1: default_ds.priority1,
        grandmaster_clock_quality: default_ds.clock_quality,
        grandmaster_priority2: default_ds.priority2,
        grandmaster_identity: default_ds.clock_identity,
        steps_removed: 0,
        ..AnnounceBody::default()
    };
    (header, announce)
}

/// M1 data-set update: this clock is its own grandmaster.
pub fn update_local_as_master(
    default_ds: &DefaultDS,
    port_ds: &PortDS,
    parent_ds: &mut ParentDS,
    time_properties: &mut TimePropertiesDS,
) {
    parent_ds.parent_port_identity = port_ds.port_identity;
    parent_ds.grandmaster_identity = default_ds.clock_identity;
    parent_ds.grandmaster_clock_quality = default_ds.clock_quality;
    parent_ds.grandmaster_priority1 = default_ds.priority1;
    parent_ds.grandmaster_priority2 = default_ds.priority2;

    *time_properties = TimePropertiesDS {
        time_source: time_source::INTERNAL_OSCILLATOR,
        ..TimePropertiesDS::default()
    };
}

/// S1 data-set update: adopt the elected master's Announce.
pub fn update_from_master(
    parent_ds: &mut ParentDS,
    time_properties: &mut TimePropertiesDS,
    record: &ForeignMasterRecord,
) {
    parent_ds.parent_port_identity = record.header.source_port_identity;
    parent_ds.grandmaster_identity = record.announce.grandmaster_identity;
    parent_ds.grandmaster_clock_quality = record.announce.grandmaster_clock_quality;
    parent_ds.grandmaster_priority1 = record.announce.grandmaster_priority1;
    parent_ds.grandmaster_priority2 = record.announce.grandmaster_priority2;

    let header_flags = record.header.flags;
    *time_properties = TimePropertiesDS {
        current_utc_offset: record.announce.current_utc_offset,
        current_utc_offset_valid: header_flags & flags::UTC_OFFSET_VALID != 0,
        leap59: header_flags & flags::LEAP59 != 0,
        leap61: header_flags & flags::LEAP61 != 0,
        time_traceable: header_flags & flags::TIME_TRACEABLE != 0,
        frequency_traceable: header_flags & flags::FREQUENCY_TRACEABLE != 0,
        ptp_timescale: header_flags & flags::PTP_TIMESCALE != 0,
        time_source: record.announce.time_source,
    };
}

/// The state decision (IEEE 1588-2008 Figure 26, reduced to one port).
///
/// With no foreign master recorded, a slave-only clock keeps listening and
/// a master-capable clock recommends MASTER. Otherwise the local clock is
/// compared against the best foreign record: a winning local clock
/// recommends MASTER (M1 update), anything else recommends SLAVE and
/// adopts the winner (S1 update).
pub fn state_decision(
    default_ds: &DefaultDS,
    port_ds: &PortDS,
    parent_ds: &mut ParentDS,
    time_properties: &mut TimePropertiesDS,
    foreign: &ForeignMasterTable,
) -> PortState {
    let best = match foreign.best(&default_ds.clock_identity) {
        Some(best) => best,
        None => {
            return if default_ds.slave_only {
                PortState::Listening
            } else {
                update_local_as_master(default_ds, port_ds, parent_ds, time_properties);
                PortState::Master
            };
        }
    };

    let (local_header, local_announce) = local_candidate(default_ds, port_ds);
    let local_wins = compare_datasets(
        &local_header,
        &local_announce,
        &best.header,
        &best.announce,
        &default_ds.clock_identity,
    ) == Ordering::Greater;

    if local_wins && !default_ds.slave_only {
        debug!("bmc: local clock beats best foreign master");
        update_local_as_master(default_ds, port_ds, parent_ds, time_properties);
        PortState::Master
    } else {
        debug!(
            "bmc: elected grandmaster {:02x?}",
            best.announce.grandmaster_identity
        );
        update_from_master(parent_ds, time_properties, best);
        PortState::Slave
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PtpOptions;
    use crate::datasets::ClockQuality;

    const OWN_IDENTITY: ClockIdentity = [0x00, 0x0a, 0x35, 0xFF, 0xFE, 0x00, 0x01, 0x02];

    fn announce_from(
        identity: ClockIdentity,
        priority1: u8,
        clock_class: u8,
        steps_removed: u16,
    ) -> (PtpHeader, AnnounceBody) {
        let sender = PortIdentity {
            clock_identity: identity,
            port_number: 1,
        };
        let header = PtpHeader::for_message(MessageType::Announce, 0, sender, 0, 1);
        let announce = AnnounceBody {
            grandmaster_priority1: priority1,
            grandmaster_clock_quality: ClockQuality {
                clock_class,
                clock_accuracy: 0xFE,
                offset_scaled_log_variance: 0xFFFF,
            },
            grandmaster_priority2: 128,
            grandmaster_identity: identity,
            steps_removed,
            ..AnnounceBody::default()
        };
        (header, announce)
    }

    fn identity(last: u8) -> ClockIdentity {
        [0x00, 0x11, 0x22, 0xFF, 0xFE, 0x33, 0x44, last]
    }

    #[test]
    fn test_table_overwrites_known_sender() {
        let mut table = ForeignMasterTable::new();
        let (header, announce) = announce_from(identity(1), 128, 248, 0);
        table.update(&header, &announce).unwrap();

        let (header2, mut announce2) = announce_from(identity(1), 128, 248, 0);
        announce2.grandmaster_priority2 = 64;
        table.update(&header2, &announce2).unwrap();

        assert_eq!(table.len(), 1);
        let record = table.records().next().unwrap();
        assert_eq!(record.announce.grandmaster_priority2, 64);
    }

    #[test]
    fn test_table_takes_first_empty_slot() {
        let mut table = ForeignMasterTable::new();
        for i in 0..3 {
            let (header, announce) = announce_from(identity(i), 128, 248, 0);
            table.update(&header, &announce).unwrap();
        }
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_table_full_drops_new_sender() {
        let mut table = ForeignMasterTable::new();
        for i in 0..DEFAULT_MAX_FOREIGN_RECORDS as u8 {
            let (header, announce) = announce_from(identity(i), 128, 248, 0);
            table.update(&header, &announce).unwrap();
        }
        let (header, announce) = announce_from(identity(0x99), 1, 6, 0);
        assert!(matches!(
            table.update(&header, &announce),
            Err(PtpError::ForeignTableFull)
        ));
        assert_eq!(table.len(), DEFAULT_MAX_FOREIGN_RECORDS);
        // The known senders are still updatable.
        let (header, announce) = announce_from(identity(0), 100, 248, 0);
        table.update(&header, &announce).unwrap();
    }

    #[test]
    fn test_compare_priority1_wins() {
        let (ha, aa) = announce_from(identity(1), 100, 248, 0);
        let (hb, ab) = announce_from(identity(2), 128, 6, 0);
        // priority1 beats clock class.
        assert_eq!(
            compare_datasets(&ha, &aa, &hb, &ab, &OWN_IDENTITY),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_clock_class() {
        let (ha, aa) = announce_from(identity(1), 128, 6, 0);
        let (hb, ab) = announce_from(identity(2), 128, 248, 0);
        assert_eq!(
            compare_datasets(&ha, &aa, &hb, &ab, &OWN_IDENTITY),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_identity_tiebreak() {
        // Identical quality; grandmaster identity 00..01 beats 00..02.
        let id1 = [0, 0, 0, 0, 0, 0, 0, 0x01];
        let id2 = [0, 0, 0, 0, 0, 0, 0, 0x02];
        let (h1, a1) = announce_from(id1, 128, 248, 0);
        let (h2, a2) = announce_from(id2, 128, 248, 0);
        assert_eq!(
            compare_datasets(&h1, &a1, &h2, &a2, &OWN_IDENTITY),
            Ordering::Greater
        );
        assert_eq!(
            compare_datasets(&h2, &a2, &h1, &a1, &OWN_IDENTITY),
            Ordering::Less
        );
    }

    #[test]
    fn test_compare_steps_removed_far() {
        // Same grandmaster, step counts differing by more than one.
        let gm = identity(9);
        let (mut h1, a1) = announce_from(gm, 128, 248, 1);
        let (mut h2, a2) = announce_from(gm, 128, 248, 4);
        // Distinct senders reporting the same grandmaster.
        h1.source_port_identity.clock_identity = identity(1);
        h2.source_port_identity.clock_identity = identity(2);
        assert_eq!(
            compare_datasets(&h1, &a1, &h2, &a2, &OWN_IDENTITY),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_steps_removed_by_one() {
        let gm = identity(9);
        let (mut h1, a1) = announce_from(gm, 128, 248, 1);
        let (mut h2, a2) = announce_from(gm, 128, 248, 2);
        h1.source_port_identity.clock_identity = identity(1);
        h2.source_port_identity.clock_identity = identity(2);
        // The closer path wins.
        assert_eq!(
            compare_datasets(&h1, &a1, &h2, &a2, &OWN_IDENTITY),
            Ordering::Greater
        );

        // Unless the closer sender is ourselves.
        h1.source_port_identity.clock_identity = OWN_IDENTITY;
        assert_eq!(
            compare_datasets(&h1, &a1, &h2, &a2, &OWN_IDENTITY),
            Ordering::Less
        );
    }

    #[test]
    fn test_compare_equal_steps_sender_tiebreak() {
        let gm = identity(9);
        let (mut h1, a1) = announce_from(gm, 128, 248, 2);
        let (mut h2, a2) = announce_from(gm, 128, 248, 2);
        h1.source_port_identity.clock_identity = identity(1);
        h2.source_port_identity.clock_identity = identity(2);
        assert_eq!(
            compare_datasets(&h1, &a1, &h2, &a2, &OWN_IDENTITY),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_antisymmetric() {
        let cases = [
            announce_from(identity(1), 100, 248, 0),
            announce_from(identity(2), 128, 6, 1),
            announce_from(identity(3), 128, 248, 3),
        ];
        for (ha, aa) in &cases {
            for (hb, ab) in &cases {
                let forward = compare_datasets(ha, aa, hb, ab, &OWN_IDENTITY);
                let backward = compare_datasets(hb, ab, ha, aa, &OWN_IDENTITY);
                assert_eq!(forward, backward.reverse());
            }
        }
    }

    fn decision_fixture(slave_only: bool) -> (DefaultDS, PortDS, ParentDS, TimePropertiesDS) {
        let opts = if slave_only {
            PtpOptions::slave_only()
        } else {
            PtpOptions::master_capable()
        };
        let default_ds = DefaultDS::new(&opts);
        let port_ds = PortDS::new(&opts);
        let parent_ds = ParentDS::new(&default_ds);
        (default_ds, port_ds, parent_ds, TimePropertiesDS::default())
    }

    #[test]
    fn test_decision_empty_table_master_capable() {
        let (default_ds, port_ds, mut parent_ds, mut tp) = decision_fixture(false);
        let foreign = ForeignMasterTable::new();
        let state = state_decision(&default_ds, &port_ds, &mut parent_ds, &mut tp, &foreign);
        assert_eq!(state, PortState::Master);
        assert_eq!(parent_ds.grandmaster_identity, default_ds.clock_identity);
    }

    #[test]
    fn test_decision_empty_table_slave_only() {
        let (default_ds, port_ds, mut parent_ds, mut tp) = decision_fixture(true);
        let foreign = ForeignMasterTable::new();
        let state = state_decision(&default_ds, &port_ds, &mut parent_ds, &mut tp, &foreign);
        assert_eq!(state, PortState::Listening);
    }

    #[test]
    fn test_decision_adopts_better_master() {
        let (default_ds, port_ds, mut parent_ds, mut tp) = decision_fixture(false);
        let mut foreign = ForeignMasterTable::new();
        let gm = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];
        let (mut header, mut announce) = announce_from(gm, 1, 6, 0);
        header.flags |= flags::PTP_TIMESCALE | flags::UTC_OFFSET_VALID;
        announce.current_utc_offset = 37;
        announce.time_source = time_source::GPS;
        foreign.update(&header, &announce).unwrap();

        let state = state_decision(&default_ds, &port_ds, &mut parent_ds, &mut tp, &foreign);
        assert_eq!(state, PortState::Slave);
        assert_eq!(parent_ds.grandmaster_identity, gm);
        assert_eq!(parent_ds.parent_port_identity, header.source_port_identity);
        assert_eq!(tp.current_utc_offset, 37);
        assert!(tp.current_utc_offset_valid);
        assert!(tp.ptp_timescale);
        assert_eq!(tp.time_source, time_source::GPS);
    }

    #[test]
    fn test_decision_local_wins_when_better() {
        let (default_ds, port_ds, mut parent_ds, mut tp) = decision_fixture(false);
        let mut foreign = ForeignMasterTable::new();
        // A worse foreign master: higher priority1.
        let (header, announce) = announce_from(identity(1), 200, 248, 0);
        foreign.update(&header, &announce).unwrap();

        let state = state_decision(&default_ds, &port_ds, &mut parent_ds, &mut tp, &foreign);
        assert_eq!(state, PortState::Master);
        assert_eq!(parent_ds.grandmaster_identity, default_ds.clock_identity);
        assert_eq!(tp.time_source, time_source::INTERNAL_OSCILLATOR);
    }

    #[test]
    fn test_decision_slave_only_never_master() {
        let (default_ds, port_ds, mut parent_ds, mut tp) = decision_fixture(true);
        let mut foreign = ForeignMasterTable::new();
        // Even a terrible foreign master beats a slave-only local clock.
        let (header, announce) = announce_from(identity(1), 254, 255, 10);
        foreign.update(&header, &announce).unwrap();

        let state = state_decision(&default_ds, &port_ds, &mut parent_ds, &mut tp, &foreign);
        assert_eq!(state, PortState::Slave);
    }

    #[test]
    fn test_decision_deterministic() {
        let (default_ds, port_ds, mut parent_ds, mut tp) = decision_fixture(false);
        let mut foreign = ForeignMasterTable::new();
        let (header, announce) = announce_from(identity(1), 1, 6, 0);
        foreign.update(&header, &announce).unwrap();

        let first = state_decision(&default_ds, &port_ds, &mut parent_ds, &mut tp, &foreign);
        for _ in 0..5 {
            let again = state_decision(&default_ds, &port_ds, &mut parent_ds, &mut tp, &foreign);
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_best_selects_among_many() {
        let mut foreign = ForeignMasterTable::new();
        for (i, priority) in [(1u8, 200u8), (2, 50), (3, 128)] {
            let (header, announce) = announce_from(identity(i), priority, 248, 0);
            foreign.update(&header, &announce).unwrap();
        }
        let best = foreign.best(&OWN_IDENTITY).unwrap();
        assert_eq!(best.announce.grandmaster_priority1, 50);
    }
}
