//! The neighbor table: link statistics, stability hysteresis, the per-DSN
//! blacklist exchange cache, and rank/parent selection over it.
//!
//! The table is shared between foreground tasks and the slot FSM running in
//! interrupt context, so the rows live behind an [`InterruptTicketMutex`]
//! and every operation takes `&self`. `my_dag_rank` is kept in an atomic so
//! routing code can read it without taking the lock.

use core::sync::atomic::{AtomicU16, Ordering};

use hermit_sync::InterruptTicketMutex;

use crate::ShortId;
use crate::asn::Asn;
use crate::config::{DEFAULT_BLACKLIST, DESYNC_TIMEOUT, MAX_ALLOWLIST, MAX_NEIGHBORS, NUM_USED_BLACKLISTS};
use crate::report::{self, Component, ErrorCode, InfoCode};

/// Rank step of one ideal hop.
pub const MIN_HOP_RANK_INCREASE: u16 = 256;
/// Assumed ETX of a link with no transmission history.
pub const DEFAULT_LINK_COST: u16 = 2;
/// Rank of a node with no route to the root.
pub const MAX_DAG_RANK: u16 = 0xffff;
/// Largest rank step a beacon may advertise before it is clamped.
pub const MAX_RANK_INCREASE: u16 = 2 * DEFAULT_LINK_COST * MIN_HOP_RANK_INCREASE;

/// A neighbor heard louder than this may be promoted to stable.
pub const BAD_NEIGHBOR_MAX_RSSI: i8 = -80;
/// A neighbor heard softer than this may be demoted to unstable.
pub const GOOD_NEIGHBOR_MIN_RSSI: i8 = -90;
/// Consecutive observations needed to flip the stability flag.
pub const SWITCH_STABILITY_THRESHOLD: u8 = 3;

/// One cached blacklist, keyed by the DSN it was agreed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DsnBlacklist {
	dsn: u8,
	channel_map: u16,
}

impl DsnBlacklist {
	const INIT: DsnBlacklist = DsnBlacklist {
		dsn: 0,
		channel_map: DEFAULT_BLACKLIST,
	};
}

#[derive(Clone, Copy, Debug)]
struct NeighborRow {
	used: bool,
	short_id: ShortId,
	dag_rank: u16,
	preferred: bool,
	stable: bool,
	switch_stability_counter: u8,
	rssi: i8,
	num_rx: u8,
	num_tx: u8,
	num_tx_ack: u8,
	num_wraps: u8,
	last_heard: Asn,
	current_blacklist: u16,
	used_blacklists: [DsnBlacklist; NUM_USED_BLACKLISTS],
	oldest_blacklist: usize,
}

impl NeighborRow {
	const EMPTY: NeighborRow = NeighborRow {
		used: false,
		short_id: ShortId(0),
		dag_rank: 0,
		preferred: false,
		stable: false,
		switch_stability_counter: 0,
		rssi: 0,
		num_rx: 0,
		num_tx: 0,
		num_tx_ack: 0,
		num_wraps: 0,
		last_heard: Asn::new(0),
		current_blacklist: 0,
		used_blacklists: [DsnBlacklist { dsn: 0, channel_map: 0 }; NUM_USED_BLACKLISTS],
		oldest_blacklist: 0,
	};

	fn insert(&mut self, short_id: ShortId, rssi: i8, now: Asn) {
		*self = NeighborRow {
			used: true,
			short_id,
			dag_rank: MAX_DAG_RANK,
			preferred: false,
			stable: true,
			switch_stability_counter: 0,
			rssi,
			num_rx: 1,
			num_tx: 0,
			num_tx_ack: 0,
			num_wraps: 0,
			last_heard: now,
			current_blacklist: DEFAULT_BLACKLIST,
			used_blacklists: [DsnBlacklist::INIT; NUM_USED_BLACKLISTS],
			oldest_blacklist: 0,
		};
	}

	/// Stability hysteresis: a streak of observations against the current
	/// flag flips it; any observation with the trend resets the streak.
	fn update_stability(&mut self, rssi: i8) {
		let contradicts = if self.stable {
			rssi < GOOD_NEIGHBOR_MIN_RSSI
		} else {
			rssi > BAD_NEIGHBOR_MAX_RSSI
		};
		if contradicts {
			self.switch_stability_counter += 1;
			if self.switch_stability_counter >= SWITCH_STABILITY_THRESHOLD {
				self.stable = !self.stable;
				self.switch_stability_counter = 0;
			}
		} else {
			self.switch_stability_counter = 0;
		}
	}
}

/// Snapshot of one row's link statistics, for routing and debug tooling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkStats {
	pub dag_rank: u16,
	pub preferred: bool,
	pub stable: bool,
	pub rssi: i8,
	pub num_rx: u8,
	pub num_tx: u8,
	pub num_tx_ack: u8,
	pub num_wraps: u8,
}

struct Table {
	rows: [NeighborRow; MAX_NEIGHBORS],
	allowlist: heapless::Vec<ShortId, MAX_ALLOWLIST>,
}

impl Table {
	fn find(&mut self, id: ShortId) -> Option<&mut NeighborRow> {
		self.rows.iter_mut().find(|row| row.used && row.short_id == id)
	}

	fn accepts(&self, id: ShortId) -> bool {
		self.allowlist.is_empty() || self.allowlist.contains(&id)
	}
}

/// The neighbor table.
pub struct Neighbors {
	inner: InterruptTicketMutex<Table>,
	my_dag_rank: AtomicU16,
}

impl Neighbors {
	pub fn new() -> Self {
		Self {
			inner: InterruptTicketMutex::new(Table {
				rows: [NeighborRow::EMPTY; MAX_NEIGHBORS],
				allowlist: heapless::Vec::new(),
			}),
			my_dag_rank: AtomicU16::new(MAX_DAG_RANK),
		}
	}

	/// A frame from `src` was received.
	pub fn indicate_rx(&self, src: ShortId, rssi: i8, now: Asn, is_dag_root: bool) {
		let mut table = self.inner.lock();
		if let Some(row) = table.find(src) {
			row.num_rx = row.num_rx.saturating_add(1);
			row.rssi = rssi;
			row.last_heard = now;
			row.update_stability(rssi);
			return;
		}
		if !table.accepts(src) {
			return;
		}
		let has_preferred = table.rows.iter().any(|row| row.used && row.preferred);
		match table.rows.iter_mut().find(|row| !row.used) {
			Some(row) => {
				row.insert(src, rssi, now);
				if !is_dag_root && !has_preferred {
					row.preferred = true;
				}
			}
			None => report::error(Component::Neighbors, ErrorCode::NeighborsFull, src.0, 0),
		}
	}

	/// A transmit slot towards `dest` finished with `attempts` attempts.
	pub fn indicate_tx(&self, dest: ShortId, attempts: u8, acked: bool, now: Asn) {
		let mut table = self.inner.lock();
		let Some(row) = table.find(dest) else {
			return;
		};
		if u16::from(row.num_tx) + u16::from(attempts) > 0xff {
			// Halve the 8-bit window; the ratio survives.
			row.num_tx >>= 1;
			row.num_tx_ack >>= 1;
			row.num_wraps = row.num_wraps.saturating_add(1);
		}
		row.num_tx += attempts;
		if acked {
			row.num_tx_ack += 1;
			row.last_heard = now;
		}
	}

	/// An Enhanced Beacon from `src` advertised `eb_rank`.
	pub fn indicate_rx_eb(&self, src: ShortId, eb_rank: u16, is_dag_root: bool) {
		{
			let mut table = self.inner.lock();
			let Some(row) = table.find(src) else {
				return;
			};
			if eb_rank > row.dag_rank && eb_rank - row.dag_rank > MAX_RANK_INCREASE {
				report::error(
					Component::Neighbors,
					ErrorCode::SuspiciousRank,
					src.0,
					eb_rank,
				);
				row.dag_rank = row.dag_rank.saturating_add(MAX_RANK_INCREASE);
			} else {
				row.dag_rank = eb_rank;
			}
		}
		self.update_my_rank(is_dag_root);
	}

	/// Drop every row not heard from for [`DESYNC_TIMEOUT`] slots.
	pub fn remove_old(&self, now: Asn, is_dag_root: bool) {
		let mut removed = false;
		{
			let mut table = self.inner.lock();
			for row in &mut table.rows {
				if row.used && now.diff(row.last_heard) > DESYNC_TIMEOUT {
					*row = NeighborRow::EMPTY;
					removed = true;
				}
			}
		}
		if removed {
			self.update_my_rank(is_dag_root);
		}
	}

	/// Recompute the local rank and the preferred parent from the table.
	pub fn update_my_rank(&self, is_dag_root: bool) {
		if is_dag_root {
			self.my_dag_rank.store(MIN_HOP_RANK_INCREASE, Ordering::Relaxed);
			return;
		}
		let mut table = self.inner.lock();
		let previous = table.rows.iter().position(|row| row.used && row.preferred);
		for row in &mut table.rows {
			row.preferred = false;
		}

		let mut my_rank = MAX_DAG_RANK;
		let mut best = None;
		for (index, row) in table.rows.iter().enumerate() {
			if !row.used {
				continue;
			}
			let total_rx = u16::from(row.num_rx) + u16::from(row.num_tx_ack);
			let rank_increase: u32 = if total_rx == 0 {
				u32::from(MAX_RANK_INCREASE)
			} else {
				u32::from(row.num_tx) * 2 * u32::from(MIN_HOP_RANK_INCREASE)
					/ u32::from(total_rx)
			};
			let tentative = u32::from(row.dag_rank) + rank_increase;
			if tentative < u32::from(my_rank) && tentative < u32::from(MAX_DAG_RANK) {
				my_rank = tentative as u16;
				best = Some(index);
			}
		}
		if let Some(index) = best {
			let row = &mut table.rows[index];
			row.preferred = true;
			row.stable = true;
			row.switch_stability_counter = 0;
		}
		self.my_dag_rank.store(my_rank, Ordering::Relaxed);
		if best != previous {
			let id = best.map_or(ShortId::BROADCAST, |i| table.rows[i].short_id);
			report::info(Component::Neighbors, InfoCode::ParentChanged, id.0, my_rank);
		}
	}

	/// The local DAG rank.
	pub fn my_dag_rank(&self) -> u16 {
		self.my_dag_rank.load(Ordering::Relaxed)
	}

	/// Join priority advertised in our beacons: rank in whole hops.
	pub fn join_priority(&self) -> u8 {
		(self.my_dag_rank() / MIN_HOP_RANK_INCREASE).min(0xff) as u8
	}

	/// The preferred parent, falling back to the lowest-rank known neighbor
	/// (promoting it, without recomputing the rank). [`ShortId::BROADCAST`]
	/// when the table is empty.
	pub fn preferred_parent(&self) -> ShortId {
		let mut table = self.inner.lock();
		if let Some(row) = table.rows.iter().find(|row| row.used && row.preferred) {
			return row.short_id;
		}
		let fallback = table
			.rows
			.iter()
			.enumerate()
			.filter(|(_, row)| row.used)
			.min_by_key(|(_, row)| row.dag_rank)
			.map(|(index, _)| index);
		match fallback {
			Some(index) => {
				table.rows[index].preferred = true;
				table.rows[index].short_id
			}
			None => ShortId::BROADCAST,
		}
	}

	pub fn is_preferred_parent(&self, id: ShortId) -> bool {
		let mut table = self.inner.lock();
		table.find(id).is_some_and(|row| row.preferred)
	}

	pub fn is_stable(&self, id: ShortId) -> bool {
		let mut table = self.inner.lock();
		table.find(id).is_some_and(|row| row.stable)
	}

	/// Child side, before transmitting DSN `dsn`: reserve the oldest cache
	/// slot for it. The channel map is left intact so retransmissions of
	/// the same DSN keep using the blacklist already agreed.
	pub fn note_tx_data(&self, dest: ShortId, dsn: u8) {
		let mut table = self.inner.lock();
		let Some(row) = table.find(dest) else {
			return;
		};
		if row.used_blacklists.iter().any(|slot| slot.dsn == dsn) {
			return;
		}
		row.used_blacklists[row.oldest_blacklist].dsn = dsn;
	}

	/// Parent side, after receiving DSN `dsn`: bind the neighbor's current
	/// blacklist to that DSN.
	pub fn note_rx_data(&self, src: ShortId, dsn: u8) {
		let mut table = self.inner.lock();
		let Some(row) = table.find(src) else {
			return;
		};
		let current = row.current_blacklist;
		if let Some(slot) = row.used_blacklists.iter_mut().find(|slot| slot.dsn == dsn) {
			slot.channel_map = current;
			return;
		}
		let oldest = row.oldest_blacklist;
		row.used_blacklists[oldest] = DsnBlacklist {
			dsn,
			channel_map: current,
		};
		row.oldest_blacklist = (oldest + 1) % NUM_USED_BLACKLISTS;
	}

	/// Child side, on an acknowledgment for DSN `dsn` carrying blacklist
	/// `channel_map`. Returns false (and reports) when no cache slot was
	/// reserved for that DSN.
	pub fn note_rx_ack(&self, dest: ShortId, dsn: u8, channel_map: u16) -> bool {
		let mut table = self.inner.lock();
		let Some(row) = table.find(dest) else {
			return false;
		};
		match row.used_blacklists.iter_mut().find(|slot| slot.dsn == dsn) {
			Some(slot) => {
				slot.channel_map = channel_map;
				row.oldest_blacklist = (row.oldest_blacklist + 1) % NUM_USED_BLACKLISTS;
				true
			}
			None => {
				report::error(Component::Neighbors, ErrorCode::WrongDsn, dest.0, u16::from(dsn));
				false
			}
		}
	}

	/// The oldest or newest cached channel map agreed with `addr`.
	pub fn used_blacklist(&self, addr: ShortId, oldest: bool) -> Option<u16> {
		let mut table = self.inner.lock();
		let row = table.find(addr)?;
		let index = if oldest {
			row.oldest_blacklist
		} else {
			(row.oldest_blacklist + 1) % NUM_USED_BLACKLISTS
		};
		Some(row.used_blacklists[index].channel_map)
	}

	/// The locally maintained mask for `addr`.
	pub fn current_blacklist(&self, addr: ShortId) -> Option<u16> {
		let mut table = self.inner.lock();
		table.find(addr).map(|row| row.current_blacklist)
	}

	/// Install the mask the integrator's channel-quality policy computed.
	pub fn set_current_blacklist(&self, addr: ShortId, channel_map: u16) {
		let mut table = self.inner.lock();
		if let Some(row) = table.find(addr) {
			row.current_blacklist = channel_map;
		}
	}

	/// Restrict which sources may enter the table. An empty list accepts
	/// everyone.
	pub fn set_allowlist(&self, ids: &[ShortId]) {
		let mut table = self.inner.lock();
		table.allowlist.clear();
		for id in ids {
			let _ = table.allowlist.push(*id);
		}
	}

	pub fn is_acceptable(&self, id: ShortId) -> bool {
		self.inner.lock().accepts(id)
	}

	pub fn link_stats(&self, id: ShortId) -> Option<LinkStats> {
		let mut table = self.inner.lock();
		table.find(id).map(|row| LinkStats {
			dag_rank: row.dag_rank,
			preferred: row.preferred,
			stable: row.stable,
			rssi: row.rssi,
			num_rx: row.num_rx,
			num_tx: row.num_tx,
			num_tx_ack: row.num_tx_ack,
			num_wraps: row.num_wraps,
		})
	}

	/// Number of rows in use.
	pub fn count(&self) -> usize {
		self.inner.lock().rows.iter().filter(|row| row.used).count()
	}
}

impl Default for Neighbors {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
	use super::*;

	const PARENT: ShortId = ShortId(0x5a53);
	const CHILD: ShortId = ShortId(0x89a5);

	fn table_with(id: ShortId) -> Neighbors {
		let neighbors = Neighbors::new();
		neighbors.indicate_rx(id, -60, Asn::new(1), false);
		neighbors
	}

	#[test]
	fn insert_then_update() {
		let neighbors = table_with(PARENT);
		assert_eq!(neighbors.count(), 1);
		neighbors.indicate_rx(PARENT, -61, Asn::new(2), false);
		assert_eq!(neighbors.count(), 1);
		let stats = neighbors.link_stats(PARENT).unwrap();
		assert_eq!(stats.num_rx, 2);
		assert_eq!(stats.rssi, -61);
		assert!(stats.stable);
	}

	#[test]
	fn first_neighbor_becomes_preferred_unless_root() {
		let neighbors = table_with(PARENT);
		assert!(neighbors.is_preferred_parent(PARENT));

		let root = Neighbors::new();
		root.indicate_rx(PARENT, -60, Asn::new(1), true);
		assert!(!root.is_preferred_parent(PARENT));
	}

	#[test]
	fn full_table_drops_new_sources() {
		let neighbors = Neighbors::new();
		for i in 0..MAX_NEIGHBORS {
			neighbors.indicate_rx(ShortId(0x1000 + i as u16), -60, Asn::new(1), false);
		}
		neighbors.indicate_rx(ShortId(0x2000), -60, Asn::new(1), false);
		assert_eq!(neighbors.count(), MAX_NEIGHBORS);
		assert!(neighbors.link_stats(ShortId(0x2000)).is_none());
	}

	#[test]
	fn tx_window_halves_and_preserves_the_ratio() {
		let neighbors = table_with(PARENT);
		for _ in 0..250 {
			neighbors.indicate_tx(PARENT, 1, true, Asn::new(2));
		}
		let stats = neighbors.link_stats(PARENT).unwrap();
		assert_eq!((stats.num_tx, stats.num_tx_ack, stats.num_wraps), (250, 250, 0));

		neighbors.indicate_tx(PARENT, 10, true, Asn::new(3));
		let stats = neighbors.link_stats(PARENT).unwrap();
		assert_eq!((stats.num_tx, stats.num_tx_ack, stats.num_wraps), (135, 126, 1));
		assert!(stats.num_tx >= stats.num_tx_ack);
	}

	#[test]
	fn rank_follows_the_link_cost() {
		let neighbors = table_with(PARENT);
		// numRx = 4, numTxACK = 6, numTx = 10.
		for _ in 0..3 {
			neighbors.indicate_rx(PARENT, -60, Asn::new(2), false);
		}
		for _ in 0..6 {
			neighbors.indicate_tx(PARENT, 1, true, Asn::new(3));
		}
		for _ in 0..4 {
			neighbors.indicate_tx(PARENT, 1, false, Asn::new(4));
		}
		neighbors.indicate_rx_eb(PARENT, MIN_HOP_RANK_INCREASE, false);
		// totalRx = 10, rankIncrease = 10 * 2 * 256 / 10 = 512.
		assert_eq!(neighbors.my_dag_rank(), 768);
		assert!(neighbors.is_preferred_parent(PARENT));
		assert_eq!(neighbors.preferred_parent(), PARENT);
	}

	#[test]
	fn suspicious_rank_jump_is_clamped() {
		let neighbors = table_with(PARENT);
		neighbors.indicate_rx_eb(PARENT, 256, false);
		assert_eq!(neighbors.link_stats(PARENT).unwrap().dag_rank, 256);
		neighbors.indicate_rx_eb(PARENT, 60000, false);
		assert_eq!(neighbors.link_stats(PARENT).unwrap().dag_rank, 256 + MAX_RANK_INCREASE);
		assert_eq!(neighbors.link_stats(PARENT).unwrap().dag_rank, 1280);
	}

	#[test]
	fn stability_hysteresis_demotes_and_promotes() {
		let neighbors = table_with(PARENT);
		assert!(neighbors.is_stable(PARENT));

		// Two soft observations, one contradiction, then a full streak.
		neighbors.indicate_rx(PARENT, -95, Asn::new(2), false);
		neighbors.indicate_rx(PARENT, -95, Asn::new(3), false);
		assert!(neighbors.is_stable(PARENT));
		neighbors.indicate_rx(PARENT, -60, Asn::new(4), false);
		neighbors.indicate_rx(PARENT, -95, Asn::new(5), false);
		neighbors.indicate_rx(PARENT, -95, Asn::new(6), false);
		assert!(neighbors.is_stable(PARENT));
		neighbors.indicate_rx(PARENT, -95, Asn::new(7), false);
		assert!(!neighbors.is_stable(PARENT));

		for asn in 8..11 {
			neighbors.indicate_rx(PARENT, -60, Asn::new(asn), false);
		}
		assert!(neighbors.is_stable(PARENT));
	}

	#[test]
	fn stale_rows_are_removed() {
		let neighbors = table_with(PARENT);
		neighbors.indicate_rx(CHILD, -60, Asn::new(500), false);
		neighbors.remove_old(Asn::new(500 + u64::from(DESYNC_TIMEOUT)), false);
		assert_eq!(neighbors.count(), 1);
		assert!(neighbors.link_stats(PARENT).is_none());
		assert!(neighbors.link_stats(CHILD).is_some());
	}

	#[test]
	fn root_rank_is_one_hop() {
		let neighbors = table_with(PARENT);
		neighbors.update_my_rank(true);
		assert_eq!(neighbors.my_dag_rank(), MIN_HOP_RANK_INCREASE);
	}

	#[test]
	fn at_most_one_preferred_after_recomputation() {
		let neighbors = Neighbors::new();
		neighbors.indicate_rx(PARENT, -60, Asn::new(1), false);
		neighbors.indicate_rx(CHILD, -60, Asn::new(1), false);
		neighbors.indicate_rx_eb(PARENT, 512, false);
		neighbors.indicate_rx_eb(CHILD, 256, false);
		let preferred = [PARENT, CHILD]
			.iter()
			.filter(|id| neighbors.is_preferred_parent(**id))
			.count();
		assert_eq!(preferred, 1);
		assert!(neighbors.is_preferred_parent(CHILD));
	}

	#[test]
	fn fallback_promotes_the_lowest_rank_neighbor() {
		let neighbors = Neighbors::new();
		neighbors.indicate_rx(PARENT, -60, Asn::new(1), false);
		neighbors.indicate_rx(CHILD, -60, Asn::new(1), false);
		// No beacon heard: recomputation finds no candidate below MAXDAGRANK.
		neighbors.update_my_rank(false);
		assert_eq!(neighbors.my_dag_rank(), MAX_DAG_RANK);
		let fallback = neighbors.preferred_parent();
		assert_ne!(fallback, ShortId::BROADCAST);
		assert!(neighbors.is_preferred_parent(fallback));
	}

	#[test]
	fn empty_table_has_no_parent() {
		let neighbors = Neighbors::new();
		assert_eq!(neighbors.preferred_parent(), ShortId::BROADCAST);
	}

	#[test]
	fn blacklist_exchange_converges_per_dsn() {
		// Child side: reserve a cache slot before transmitting DSN 7.
		let child = table_with(PARENT);
		child.note_tx_data(PARENT, 7);
		assert_eq!(child.used_blacklist(PARENT, true), Some(DEFAULT_BLACKLIST));

		// Parent side: bind its current blacklist to the received DSN.
		let parent = table_with(CHILD);
		parent.set_current_blacklist(CHILD, 0x00ab);
		parent.note_rx_data(CHILD, 7);
		assert_eq!(parent.used_blacklist(CHILD, false), Some(0x00ab));
		assert_eq!(parent.current_blacklist(CHILD), Some(0x00ab));

		// Child side: the acknowledgment carries the mask back.
		assert!(child.note_rx_ack(PARENT, 7, 0x00ab));
		assert_eq!(child.used_blacklist(PARENT, false), Some(0x00ab));

		// A retransmission of the same DSN keeps the agreed map.
		child.note_tx_data(PARENT, 7);
		assert_eq!(child.used_blacklist(PARENT, false), Some(0x00ab));
	}

	#[test]
	fn ack_for_unknown_dsn_is_rejected() {
		let child = table_with(PARENT);
		child.note_tx_data(PARENT, 7);
		assert!(!child.note_rx_ack(PARENT, 9, 0x00ab));
		assert_eq!(child.used_blacklist(PARENT, true), Some(DEFAULT_BLACKLIST));
	}

	#[test]
	fn allowlist_restricts_insertion() {
		let neighbors = Neighbors::new();
		neighbors.set_allowlist(&[PARENT]);
		neighbors.indicate_rx(CHILD, -60, Asn::new(1), false);
		assert_eq!(neighbors.count(), 0);
		neighbors.indicate_rx(PARENT, -60, Asn::new(1), false);
		assert_eq!(neighbors.count(), 1);
		neighbors.set_allowlist(&[]);
		neighbors.indicate_rx(CHILD, -60, Asn::new(2), false);
		assert_eq!(neighbors.count(), 2);
	}
}
