//! Enhanced Beacon assembly and the adaptive advertisement period.
//!
//! EBs go out on a shared advertisement cell whenever the adaptive period
//! has elapsed, on a channel rotating through the short EB template so that
//! unsynchronized listeners eventually coincide with a sender.

use core::sync::atomic::{AtomicU16, AtomicU32, AtomicUsize, Ordering};

use crate::ShortId;
use crate::asn::Asn;
use crate::config::{
	CH_TEMPLATE_EB, EB_PERIOD_AMOUNT, EB_PERIOD_MAX, EB_PERIOD_START, EB_PERIOD_TIMER_MS,
	NUM_EB_CHANNELS, PAN_ID,
};
use crate::ie::{
	self, ChannelHoppingIe, EnhancedBeaconIes, FrameError, SlotframeLinkIe, SyncIe, TimeslotIe,
};
use crate::pool::PacketBuf;

/// Advertisement state: the adaptive period and the EB channel rotation.
/// All fields are atomics; the periodic timer and the slot FSM touch them
/// from different contexts.
pub struct BeaconState {
	/// Current EB period in units of 100 ms.
	period: AtomicU16,
	/// Milliseconds since the last EB went out.
	elapsed_ms: AtomicU32,
	next_channel: AtomicUsize,
}

impl BeaconState {
	pub fn new() -> Self {
		Self {
			period: AtomicU16::new(EB_PERIOD_START),
			elapsed_ms: AtomicU32::new(u32::from(EB_PERIOD_TIMER_MS)),
			next_channel: AtomicUsize::new(0),
		}
	}

	/// Called from the external periodic timer (every
	/// [`EB_PERIOD_TIMER_MS`]): stretch the period towards its ceiling and
	/// account the elapsed time.
	pub fn period_timer_fired(&self) {
		let period = self.period.load(Ordering::Relaxed);
		let grown = (period + EB_PERIOD_AMOUNT).min(EB_PERIOD_MAX);
		self.period.store(grown, Ordering::Relaxed);
		self.elapsed_ms
			.fetch_add(u32::from(EB_PERIOD_TIMER_MS), Ordering::Relaxed);
	}

	/// Shrink the period back to the minimum (a network event made fast
	/// advertising worthwhile again).
	pub fn reset_period(&self) {
		self.period.store(EB_PERIOD_START, Ordering::Relaxed);
	}

	/// Whether an EB is due on this advertisement cell. Claims the beacon:
	/// a `true` answer resets the elapsed time.
	pub fn take_due(&self) -> bool {
		let period_ms = u32::from(self.period.load(Ordering::Relaxed)) * 100;
		if self.elapsed_ms.load(Ordering::Relaxed) < period_ms {
			return false;
		}
		self.elapsed_ms.store(0, Ordering::Relaxed);
		true
	}

	/// Logical channel index the next EB goes out on.
	pub fn eb_channel(&self) -> u8 {
		CH_TEMPLATE_EB[self.next_channel.load(Ordering::Relaxed) % NUM_EB_CHANNELS]
	}

	/// Rotate the EB channel after a transmission.
	pub fn eb_sent(&self) {
		self.next_channel.fetch_add(1, Ordering::Relaxed);
	}

	pub fn period_100ms(&self) -> u16 {
		self.period.load(Ordering::Relaxed)
	}
}

impl Default for BeaconState {
	fn default() -> Self {
		Self::new()
	}
}

/// Assemble an Enhanced Beacon into `pkt`: beacon header, then the MLME
/// container with Sync, Slotframe-and-Link, Timeslot and Channel-Hopping
/// sub-IEs.
pub fn build_eb(
	pkt: &mut PacketBuf,
	seq: u8,
	src: ShortId,
	asn: Asn,
	join_priority: u8,
	summary: SlotframeLinkIe,
) -> Result<(), FrameError> {
	let buf = pkt.writable();
	let offset = ie::write_beacon_header(buf, seq, PAN_ID, src)?;
	let ies = EnhancedBeaconIes {
		sync: SyncIe {
			asn,
			join_priority,
		},
		slotframe_link: summary,
		timeslot: TimeslotIe {
			template_id: 0,
			durations: None,
		},
		channel_hopping: ChannelHoppingIe { sequence_id: 0 },
	};
	let end = ies.encode(buf, offset)?;
	pkt.set_frame_len(end);
	pkt.dest = ShortId::BROADCAST;
	pkt.ack_requested = false;
	pkt.dsn = Some(seq);
	Ok(())
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
	use super::*;
	use crate::ie::{FrameType, parse_header};

	#[test]
	fn built_beacon_parses_back() {
		let mut pkt = PacketBuf::new();
		build_eb(&mut pkt, 9, ShortId(0x5a53), Asn::new(777), 1, SlotframeLinkIe::default())
			.unwrap();

		let frame = pkt.frame();
		let header = parse_header(frame).unwrap();
		assert_eq!(header.frame_type, FrameType::Beacon);
		assert_eq!(header.src, Some(ShortId(0x5a53)));
		assert_eq!(header.dst, Some(ShortId::BROADCAST));

		let ies = EnhancedBeaconIes::decode(&frame[header.payload_offset..]).unwrap();
		assert_eq!(ies.sync.asn, Asn::new(777));
		assert_eq!(ies.sync.join_priority, 1);
		assert_eq!(ies.timeslot.template_id, 0);
	}

	#[test]
	fn period_grows_to_the_ceiling_and_resets() {
		let beacon = BeaconState::new();
		assert_eq!(beacon.period_100ms(), EB_PERIOD_START);
		for _ in 0..200 {
			beacon.period_timer_fired();
		}
		assert_eq!(beacon.period_100ms(), EB_PERIOD_MAX);
		beacon.reset_period();
		assert_eq!(beacon.period_100ms(), EB_PERIOD_START);
	}

	#[test]
	fn beacons_become_due_as_time_passes() {
		let beacon = BeaconState::new();
		// Fresh state carries one timer interval of credit.
		assert!(beacon.take_due());
		assert!(!beacon.take_due());
		beacon.period_timer_fired();
		beacon.period_timer_fired();
		assert!(beacon.take_due());
	}

	#[test]
	fn eb_channel_rotates_through_the_template() {
		let beacon = BeaconState::new();
		let mut seen = [0u8; NUM_EB_CHANNELS];
		for slot in seen.iter_mut() {
			*slot = beacon.eb_channel();
			beacon.eb_sent();
		}
		assert_eq!(seen, CH_TEMPLATE_EB);
		assert_eq!(beacon.eb_channel(), CH_TEMPLATE_EB[0]);
	}
}
