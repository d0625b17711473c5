//! Synchronization state: the sync flag, the desynchronization timeout,
//! time-correction statistics and the radio duty-cycle counters.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use hermit_sync::InterruptTicketMutex;

use crate::config::{DESYNC_TIMEOUT, DUTY_CYCLE_WINDOW_LIMIT};
use crate::report::{self, Component, ErrorCode, InfoCode};

/// Corrections larger than this are clipped before they touch the slot
/// boundary.
pub const LIMIT_LARGE_TIME_CORRECTION: i16 = 16;

/// Snapshot of the synchronization statistics, serialized bit-exact for
/// host-side tooling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct SyncStats {
	pub num_sync_pkt: u16,
	pub num_sync_ack: u16,
	pub min_correction: i16,
	pub max_correction: i16,
	pub num_de_sync: u16,
	pub num_tics_on: u32,
	pub num_tics_total: u32,
}

pub struct SyncController {
	is_sync: AtomicBool,
	slots_left: AtomicU32,
	stats: InterruptTicketMutex<SyncStats>,
}

impl SyncController {
	pub fn new() -> Self {
		Self {
			is_sync: AtomicBool::new(false),
			slots_left: AtomicU32::new(DESYNC_TIMEOUT),
			stats: InterruptTicketMutex::new(SyncStats::default()),
		}
	}

	pub fn is_sync(&self) -> bool {
		self.is_sync.load(Ordering::Relaxed)
	}

	/// The node acquired synchronization from a beacon.
	pub fn acquired(&self) {
		self.is_sync.store(true, Ordering::Relaxed);
		self.refresh();
		let mut stats = self.stats.lock();
		stats.num_sync_pkt += 1;
		report::info(Component::Sync, InfoCode::Synchronized, stats.num_sync_pkt, 0);
	}

	/// A DAG root is its own time reference.
	pub fn force_sync(&self) {
		self.is_sync.store(true, Ordering::Relaxed);
		self.refresh();
	}

	/// Restart the desynchronization timeout.
	pub fn refresh(&self) {
		self.slots_left.store(DESYNC_TIMEOUT, Ordering::Relaxed);
	}

	/// Per-slot heartbeat. Returns true when the timeout just expired and
	/// the node must fall back to beacon listening.
	pub fn heartbeat(&self) -> bool {
		if !self.is_sync() {
			return false;
		}
		let left = self.slots_left.load(Ordering::Relaxed);
		if left > 1 {
			self.slots_left.store(left - 1, Ordering::Relaxed);
			return false;
		}
		self.record_desync();
		true
	}

	fn record_desync(&self) {
		self.is_sync.store(false, Ordering::Relaxed);
		self.slots_left.store(DESYNC_TIMEOUT, Ordering::Relaxed);
		let mut stats = self.stats.lock();
		stats.num_de_sync += 1;
		report::info(Component::Sync, InfoCode::Desynchronized, stats.num_de_sync, 0);
	}

	/// Clip a correction to [`LIMIT_LARGE_TIME_CORRECTION`].
	pub fn clip(&self, correction: i16) -> i16 {
		if correction.unsigned_abs() <= LIMIT_LARGE_TIME_CORRECTION as u16 {
			return correction;
		}
		report::error(
			Component::Sync,
			ErrorCode::LargeTimeCorrection,
			correction as u16,
			0,
		);
		correction.clamp(-LIMIT_LARGE_TIME_CORRECTION, LIMIT_LARGE_TIME_CORRECTION)
	}

	/// Account an applied correction and refresh the timeout. `from_ack`
	/// distinguishes corrections learned from acknowledgments from those
	/// learned from received frames.
	pub fn record_correction(&self, correction: i16, from_ack: bool) {
		self.refresh();
		let mut stats = self.stats.lock();
		if from_ack {
			stats.num_sync_ack += 1;
		} else {
			stats.num_sync_pkt += 1;
		}
		stats.min_correction = stats.min_correction.min(correction);
		stats.max_correction = stats.max_correction.max(correction);
	}

	/// Account one slot of duty cycle: `on` radio-on ticks out of `total`.
	/// Both counters are halved in place once the window limit is reached,
	/// preserving their ratio.
	pub fn add_duty_cycle(&self, on: u32, total: u32) {
		let mut stats = self.stats.lock();
		stats.num_tics_on = stats.num_tics_on.saturating_add(on);
		stats.num_tics_total = stats.num_tics_total.saturating_add(total);
		if stats.num_tics_total > DUTY_CYCLE_WINDOW_LIMIT {
			stats.num_tics_on /= 2;
			stats.num_tics_total /= 2;
		}
	}

	pub fn snapshot(&self) -> SyncStats {
		*self.stats.lock()
	}
}

impl Default for SyncController {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
	use super::*;

	#[test]
	fn desync_fires_after_the_timeout() {
		let sync = SyncController::new();
		sync.acquired();
		for _ in 0..DESYNC_TIMEOUT - 1 {
			assert!(!sync.heartbeat());
		}
		assert!(sync.heartbeat());
		assert!(!sync.is_sync());
		assert_eq!(sync.snapshot().num_de_sync, 1);
		// Once desynchronized, the heartbeat is inert.
		assert!(!sync.heartbeat());
	}

	#[test]
	fn corrections_refresh_the_timeout() {
		let sync = SyncController::new();
		sync.acquired();
		for _ in 0..DESYNC_TIMEOUT - 1 {
			assert!(!sync.heartbeat());
		}
		sync.record_correction(-2, true);
		for _ in 0..DESYNC_TIMEOUT - 1 {
			assert!(!sync.heartbeat());
		}
		assert!(sync.is_sync());
	}

	#[test]
	fn corrections_are_clipped_and_tracked() {
		let sync = SyncController::new();
		assert_eq!(sync.clip(5), 5);
		assert_eq!(sync.clip(-16), -16);
		assert_eq!(sync.clip(200), LIMIT_LARGE_TIME_CORRECTION);
		assert_eq!(sync.clip(-200), -LIMIT_LARGE_TIME_CORRECTION);

		sync.record_correction(-7, false);
		sync.record_correction(4, true);
		let stats = sync.snapshot();
		assert_eq!(stats.num_sync_pkt, 1);
		assert_eq!(stats.num_sync_ack, 1);
		assert_eq!(stats.min_correction, -7);
		assert_eq!(stats.max_correction, 4);
	}

	#[test]
	fn duty_cycle_window_halves_in_place() {
		let sync = SyncController::new();
		sync.add_duty_cycle(100, 400);
		let stats = sync.snapshot();
		assert_eq!((stats.num_tics_on, stats.num_tics_total), (100, 400));

		sync.add_duty_cycle(0, DUTY_CYCLE_WINDOW_LIMIT);
		let stats = sync.snapshot();
		// Halved together: the duty-cycle ratio is preserved.
		assert_eq!(stats.num_tics_on, 50);
		assert_eq!(stats.num_tics_total, (400 + DUTY_CYCLE_WINDOW_LIMIT) / 2);
	}
}
