//! The slot state machine.
//!
//! One slot is 15 ms. At every boundary the layer consults the schedule,
//! then drives the radio through a timed sequence of prepare, go,
//! start-of-frame and end-of-frame events, with a watchdog behind every
//! step. All entry points run in interrupt context and take `&self`: the
//! machine state lives behind an interrupt-safe mutex, never blocks, and
//! arms exactly one timer or radio operation per transition. Anything
//! unexpected aborts the slot back to [`SlotState::Sleep`], returning every
//! borrowed packet buffer to its owner; the next boundary starts clean.

pub mod sync;
pub mod timing;


use hermit_sync::{InterruptTicketMutex, without_interrupts};

use crate::ShortId;
use crate::asn::{self, Asn};
use crate::beacon::{self, BeaconState};
use crate::config::{LENGTH_IEEE154_MAX, TX_POWER};
use crate::drivers::{IdManager, Radio, SlotTimer};
use crate::ie::{self, FrameType, TimeCorrectionIe};
use crate::neighbors::{MAX_DAG_RANK, MIN_HOP_RANK_INCREASE, Neighbors};
use crate::pool::{PacketBuf, PacketStore, TxOutcome};
use crate::report::{self, Component, ErrorCode};
use crate::schedule::{Cell, CellOptions, CellType, Schedule};
use crate::slot::sync::{SyncController, SyncStats};
use crate::slot::timing::{TS_SLOT_DURATION, TS_TX_OFFSET};

/// The states of the slot machine. [`SlotState::Sleep`] is the only state
/// the machine may rest in at a slot boundary; the `SyncListen`/`SyncRx`
/// pair additionally persists across boundaries while the node is hunting
/// for a beacon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
	Sleep,
	SyncListen,
	SyncRx,
	SyncProc,
	TxDataOffset,
	TxDataPrepare,
	TxDataReady,
	TxDataDelay,
	TxData,
	RxAckOffset,
	RxAckPrepare,
	RxAckReady,
	RxAckListen,
	RxAck,
	TxProc,
	RxDataOffset,
	RxDataPrepare,
	RxDataReady,
	RxDataListen,
	RxData,
	TxAckOffset,
	TxAckPrepare,
	TxAckReady,
	TxAckDelay,
	TxAck,
	RxProc,
}

struct SlotCore<R, T> {
	radio: R,
	timer: T,
	state: SlotState,
	asn: Asn,
	slot_offset: u16,
	cell: Cell,
	/// Logical channel index of this slot.
	freq: u8,
	/// Next outgoing sequence number.
	dsn: u8,
	tx_is_eb: bool,
	data_to_send: Option<PacketBuf>,
	data_received: Option<PacketBuf>,
	ack_to_send: Option<PacketBuf>,
	/// Timestamp of the most recent radio event, ticks into the slot.
	last_captured: u32,
	/// Start-of-frame timestamp of the received data frame.
	sync_captured: u32,
	rx_src: ShortId,
	rx_dsn: u8,
	/// Slots spent without synchronization, for the slow-hopping listen.
	unsync_slots: u32,
	listen_channel: u8,
	radio_on_at: Option<u32>,
	tics_on: u32,
	/// The timer period carries a one-shot correction to revert.
	period_adjusted: bool,
}

/// The TSCH link layer: slot FSM, synchronization, neighbor table and
/// beacon scheduling, wired to the radio and slot timer drivers.
///
/// Entry points are `&self` and interrupt-safe; the embedding is expected
/// to call [`Self::new_slot`] from the slot-boundary interrupt,
/// [`Self::timer_fired`] from the compare interrupt, and
/// [`Self::start_of_frame`]/[`Self::end_of_frame`] from the radio
/// interrupts with the captured 32 kHz timestamps.
pub struct LinkLayer<R, T, S, I, P>
where
	R: Radio,
	T: SlotTimer,
	S: Schedule,
	I: IdManager,
	P: PacketStore,
{
	core: InterruptTicketMutex<SlotCore<R, T>>,
	neighbors: Neighbors,
	sync: SyncController,
	beacon: BeaconState,
	schedule: S,
	ids: I,
	store: P,
}

impl<R, T, S, I, P> LinkLayer<R, T, S, I, P>
where
	R: Radio,
	T: SlotTimer,
	S: Schedule,
	I: IdManager,
	P: PacketStore,
{
	pub fn new(mut radio: R, mut timer: T, schedule: S, ids: I, store: P) -> Self {
		radio.set_tx_power(TX_POWER);
		radio.off();
		timer.set_period(TS_SLOT_DURATION);
		let layer = Self {
			core: InterruptTicketMutex::new(SlotCore {
				radio,
				timer,
				state: SlotState::Sleep,
				asn: Asn::new(0),
				slot_offset: 0,
				cell: Cell::OFF,
				freq: 0,
				dsn: 0,
				tx_is_eb: false,
				data_to_send: None,
				data_received: None,
				ack_to_send: None,
				last_captured: 0,
				sync_captured: 0,
				rx_src: ShortId::BROADCAST,
				rx_dsn: 0,
				unsync_slots: 0,
				listen_channel: 0,
				radio_on_at: None,
				tics_on: 0,
				period_adjusted: false,
			}),
			neighbors: Neighbors::new(),
			sync: SyncController::new(),
			beacon: BeaconState::new(),
			schedule,
			ids,
			store,
		};
		if layer.ids.is_dag_root() {
			layer.sync.force_sync();
			layer.neighbors.update_my_rank(true);
		}
		layer
	}

	/// Slot-boundary tick.
	pub fn new_slot(&self) {
		let mut guard = self.core.lock();
		let core = &mut *guard;

		// Close the duty-cycle accounting of the elapsed slot.
		let mut on = core.tics_on;
		core.tics_on = 0;
		if core.radio_on_at.take().is_some() {
			// The radio stayed on across the boundary (beacon hunting).
			on = core.timer.period();
			core.radio_on_at = Some(0);
		}
		self.sync.add_duty_cycle(on, core.timer.period());

		if core.period_adjusted {
			core.timer.set_period(TS_SLOT_DURATION);
			core.period_adjusted = false;
		}
		core.timer.cancel();
		core.asn.increment();

		if !self.sync.is_sync() {
			self.unsync_slot(core);
			return;
		}

		if self.ids.is_dag_root() {
			// The root is the time reference; it cannot lose it.
			self.sync.refresh();
		} else if self.sync.heartbeat() {
			// No time reference for too long: back to beacon hunting.
			self.abort_slot(core);
			core.unsync_slots = 0;
			return;
		}

		if core.state != SlotState::Sleep {
			report::error(
				Component::SlotFsm,
				ErrorCode::WrongStateInSlot,
				core.state as u16,
				core.slot_offset,
			);
			self.abort_slot(core);
			return;
		}

		self.neighbors.remove_old(core.asn, self.ids.is_dag_root());

		core.slot_offset = core.asn.slot_offset(self.schedule.frame_length());
		core.cell = self.schedule.cell(core.slot_offset);
		match core.cell.cell_type {
			CellType::Off | CellType::SerialRx => self.radio_off(core),
			CellType::Tx => self.start_tx(core),
			CellType::Rx => self.start_rx(core),
			CellType::TxRx => {
				if self.beacon.take_due() {
					self.start_tx_eb(core);
				} else {
					self.start_rx(core);
				}
			}
		}
	}

	/// In-slot compare interrupt.
	pub fn timer_fired(&self) {
		let mut guard = self.core.lock();
		let core = &mut *guard;
		match core.state {
			SlotState::TxDataOffset => {
				core.state = SlotState::TxDataPrepare;
				core.radio.set_channel(asn::physical_channel(core.freq));
				if let Some(pkt) = core.data_to_send.as_ref() {
					core.radio.load_packet(pkt.frame());
				}
				core.radio.tx_enable();
				self.mark_radio_on(core);
				core.state = SlotState::TxDataReady;
				core.timer.schedule(timing::tx_go_at());
			}
			SlotState::TxDataReady => {
				core.state = SlotState::TxDataDelay;
				core.radio.tx_now();
				core.timer.schedule(timing::tx_sfd_deadline());
			}
			SlotState::TxDataDelay => {
				report::error(
					Component::SlotFsm,
					ErrorCode::WatchdogRadioTx,
					core.slot_offset,
					0,
				);
				self.fail_tx(core);
			}
			SlotState::TxData => {
				report::error(
					Component::SlotFsm,
					ErrorCode::WatchdogDataDuration,
					core.slot_offset,
					0,
				);
				self.fail_tx(core);
			}
			SlotState::RxAckOffset => {
				core.state = SlotState::RxAckPrepare;
				core.radio.rx_enable();
				self.mark_radio_on(core);
				core.state = SlotState::RxAckReady;
				core.timer.schedule(timing::ack_rx_listen_at(core.last_captured));
			}
			SlotState::RxAckReady => {
				core.state = SlotState::RxAckListen;
				core.radio.rx_now();
				core.timer.schedule(timing::ack_rx_deadline(core.last_captured));
			}
			SlotState::RxAckListen => {
				// The guard window closed without an acknowledgment.
				self.fail_tx(core);
			}
			SlotState::RxAck => {
				report::error(
					Component::SlotFsm,
					ErrorCode::WatchdogAckDuration,
					core.slot_offset,
					0,
				);
				self.fail_tx(core);
			}
			SlotState::RxDataOffset => {
				core.state = SlotState::RxDataPrepare;
				core.radio.set_channel(asn::physical_channel(core.freq));
				core.radio.rx_enable();
				self.mark_radio_on(core);
				core.state = SlotState::RxDataReady;
				core.timer.schedule(timing::rx_listen_at());
			}
			SlotState::RxDataReady => {
				core.state = SlotState::RxDataListen;
				core.radio.rx_now();
				core.timer.schedule(timing::rx_guard_end());
			}
			SlotState::RxDataListen => {
				// Nothing came within the guard window.
				self.end_slot(core);
			}
			SlotState::RxData => {
				report::error(
					Component::SlotFsm,
					ErrorCode::WatchdogDataDuration,
					core.slot_offset,
					0,
				);
				self.abort_slot(core);
			}
			SlotState::TxAckOffset => self.prepare_ack(core),
			SlotState::TxAckReady => {
				core.state = SlotState::TxAckDelay;
				core.radio.tx_now();
				core.timer.schedule(timing::ack_tx_sfd_deadline(core.last_captured));
			}
			SlotState::TxAckDelay => {
				report::error(
					Component::SlotFsm,
					ErrorCode::WatchdogRadioTx,
					core.slot_offset,
					0,
				);
				self.abort_slot(core);
			}
			SlotState::TxAck => {
				report::error(
					Component::SlotFsm,
					ErrorCode::WatchdogAckDuration,
					core.slot_offset,
					0,
				);
				self.abort_slot(core);
			}
			state => {
				report::error(
					Component::SlotFsm,
					ErrorCode::WrongStateInEvent,
					state as u16,
					0,
				);
				if state != SlotState::Sleep && state != SlotState::SyncListen {
					self.abort_slot(core);
				}
			}
		}
	}

	/// The radio detected a start-of-frame delimiter.
	pub fn start_of_frame(&self, captured: u32) {
		let mut guard = self.core.lock();
		let core = &mut *guard;
		match core.state {
			SlotState::TxDataDelay => {
				core.state = SlotState::TxData;
				core.last_captured = captured;
				core.timer.schedule(timing::frame_end_deadline(captured));
			}
			SlotState::RxAckListen => {
				core.state = SlotState::RxAck;
				core.last_captured = captured;
				core.timer.schedule(timing::ack_end_deadline(captured));
			}
			SlotState::RxDataListen => {
				core.state = SlotState::RxData;
				core.sync_captured = captured;
				core.last_captured = captured;
				core.timer.schedule(timing::frame_end_deadline(captured));
			}
			SlotState::TxAckDelay => {
				core.state = SlotState::TxAck;
				core.last_captured = captured;
				core.timer.schedule(timing::ack_end_deadline(captured));
			}
			SlotState::SyncListen => {
				core.state = SlotState::SyncRx;
				core.sync_captured = captured;
			}
			SlotState::Sleep => {
				// Spurious; the radio should be off.
				report::error(
					Component::SlotFsm,
					ErrorCode::WrongStateInEvent,
					SlotState::Sleep as u16,
					1,
				);
			}
			state => {
				report::error(
					Component::SlotFsm,
					ErrorCode::WrongStateInEvent,
					state as u16,
					1,
				);
				self.abort_slot(core);
			}
		}
	}

	/// The radio finished sending or receiving a frame.
	pub fn end_of_frame(&self, captured: u32) {
		let mut guard = self.core.lock();
		let core = &mut *guard;
		match core.state {
			SlotState::TxData => self.data_sent(core, captured),
			SlotState::RxAck => self.ack_received(core),
			SlotState::RxData => self.data_frame_received(core, captured),
			SlotState::TxAck => self.ack_sent(core),
			SlotState::SyncRx => self.sync_frame_received(core),
			SlotState::SyncListen => {
				// End of a frame whose start we missed; keep listening.
				core.radio.rx_now();
			}
			SlotState::Sleep => {
				report::error(
					Component::SlotFsm,
					ErrorCode::WrongStateInEvent,
					SlotState::Sleep as u16,
					2,
				);
			}
			state => {
				report::error(
					Component::SlotFsm,
					ErrorCode::WrongStateInEvent,
					state as u16,
					2,
				);
				self.abort_slot(core);
			}
		}
	}

	// Slot setup.

	fn start_tx(&self, core: &mut SlotCore<R, T>) {
		let Some(mut pkt) = self.store.take_for(core.cell.neighbor) else {
			self.radio_off(core);
			return;
		};
		let dsn = match pkt.dsn {
			Some(dsn) => dsn,
			None => {
				let dsn = core.dsn;
				core.dsn = core.dsn.wrapping_add(1);
				// The sequence number sits right behind the frame control.
				pkt.frame_mut()[2] = dsn;
				pkt.dsn = Some(dsn);
				dsn
			}
		};
		if !pkt.dest.is_broadcast() {
			self.neighbors.note_tx_data(pkt.dest, dsn);
		}
		core.freq = asn::channel_index(core.asn, core.cell.channel_offset);
		core.tx_is_eb = false;
		core.data_to_send = Some(pkt);
		core.state = SlotState::TxDataOffset;
		core.timer.schedule(timing::tx_prepare_at());
	}

	fn start_tx_eb(&self, core: &mut SlotCore<R, T>) {
		let Some(mut pkt) = self.store.allocate() else {
			report::error(Component::Beacon, ErrorCode::NoFreePacket, 0, 0);
			self.start_rx(core);
			return;
		};
		let seq = core.dsn;
		core.dsn = core.dsn.wrapping_add(1);
		if beacon::build_eb(
			&mut pkt,
			seq,
			self.ids.my_short_id(),
			core.asn,
			self.neighbors.join_priority(),
			self.schedule.summary(),
		)
		.is_err()
		{
			report::error(Component::Beacon, ErrorCode::MalformedFrame, 0, 0);
			self.store.release(pkt);
			self.radio_off(core);
			return;
		}
		core.freq = self.beacon.eb_channel();
		core.tx_is_eb = true;
		core.data_to_send = Some(pkt);
		core.state = SlotState::TxDataOffset;
		core.timer.schedule(timing::tx_prepare_at());
	}

	fn start_rx(&self, core: &mut SlotCore<R, T>) {
		core.freq = asn::channel_index(core.asn, core.cell.channel_offset);
		core.state = SlotState::RxDataOffset;
		core.timer.schedule(timing::rx_prepare_at());
	}

	/// A slot while unsynchronized: keep the receiver on the slow-hopping
	/// listen channel until a beacon arrives.
	fn unsync_slot(&self, core: &mut SlotCore<R, T>) {
		if self.ids.is_dag_root() {
			// The root is its own time reference; stop hunting.
			self.end_slot(core);
			self.sync.force_sync();
			return;
		}
		match core.state {
			SlotState::Sleep => {
				core.listen_channel = asn::eb_channel_index(core.unsync_slots);
				core.radio.set_channel(asn::physical_channel(core.listen_channel));
				core.radio.rx_enable();
				core.radio.rx_now();
				self.mark_radio_on(core);
				core.state = SlotState::SyncListen;
			}
			SlotState::SyncListen => {
				let channel = asn::eb_channel_index(core.unsync_slots);
				if channel != core.listen_channel {
					core.listen_channel = channel;
					core.radio.set_channel(asn::physical_channel(channel));
					core.radio.rx_now();
				}
			}
			// A beacon is in flight across the boundary; do not disturb.
			SlotState::SyncRx | SlotState::SyncProc => {}
			state => {
				report::error(
					Component::SlotFsm,
					ErrorCode::WrongStateInSlot,
					state as u16,
					0,
				);
				self.abort_slot(core);
			}
		}
		core.unsync_slots = core.unsync_slots.wrapping_add(1);
	}

	// Frame completion.

	fn data_sent(&self, core: &mut SlotCore<R, T>, captured: u32) {
		core.timer.cancel();
		core.last_captured = captured;
		let Some(pkt) = core.data_to_send.take() else {
			self.abort_slot(core);
			return;
		};
		if core.tx_is_eb {
			core.state = SlotState::TxProc;
			self.beacon.eb_sent();
			self.store.release(pkt);
			self.end_slot(core);
		} else if !pkt.ack_requested || pkt.dest.is_broadcast() {
			core.state = SlotState::TxProc;
			if !pkt.dest.is_broadcast() {
				self.neighbors.indicate_tx(pkt.dest, 1, false, core.asn);
			}
			self.store.tx_done(pkt, TxOutcome::Completed);
			self.end_slot(core);
		} else {
			core.data_to_send = Some(pkt);
			core.state = SlotState::RxAckOffset;
			self.radio_off(core);
			core.timer.schedule(timing::ack_rx_prepare_at(captured));
		}
	}

	fn ack_received(&self, core: &mut SlotCore<R, T>) {
		core.timer.cancel();
		let mut buf = [0u8; LENGTH_IEEE154_MAX];
		let info = core.radio.read_frame(&mut buf);
		let Some(pkt) = core.data_to_send.take() else {
			self.abort_slot(core);
			return;
		};
		let expected_dsn = pkt.dsn.unwrap_or(0);
		let frame = &buf[..info.len.min(LENGTH_IEEE154_MAX)];

		let header = if info.crc_ok { ie::parse_header(frame).ok() } else { None };
		let acked = match header {
			Some(header) if header.frame_type == FrameType::Ack && header.seq == expected_dsn => {
				if let Some(tc) = ie::find_time_correction(&frame[header.payload_offset..]) {
					self.process_ack_correction(core, &pkt, expected_dsn, tc);
				}
				true
			}
			Some(header) if header.frame_type == FrameType::Ack => {
				report::error(
					Component::SlotFsm,
					ErrorCode::WrongDsn,
					u16::from(header.seq),
					u16::from(expected_dsn),
				);
				false
			}
			Some(_) | None => false,
		};

		core.state = SlotState::TxProc;
		self.neighbors.indicate_tx(pkt.dest, 1, acked, core.asn);
		let outcome = if acked { TxOutcome::Completed } else { TxOutcome::Failed };
		self.store.tx_done(pkt, outcome);
		self.end_slot(core);
	}

	fn process_ack_correction(
		&self,
		core: &mut SlotCore<R, T>,
		pkt: &PacketBuf,
		dsn: u8,
		tc: TimeCorrectionIe,
	) {
		if let Some(mask) = tc.blacklist {
			self.neighbors.note_rx_ack(pkt.dest, dsn, mask);
		}
		if self.is_timekeeper(core, pkt.dest) {
			let clipped = self.sync.clip(tc.correction);
			self.adjust_boundary(core, clipped);
			self.sync.record_correction(clipped, true);
		}
	}

	fn data_frame_received(&self, core: &mut SlotCore<R, T>, captured: u32) {
		core.timer.cancel();
		core.last_captured = captured;
		let Some(mut pkt) = self.store.allocate() else {
			report::error(Component::SlotFsm, ErrorCode::NoFreePacket, 0, 0);
			self.abort_slot(core);
			return;
		};
		let info = core.radio.read_frame(pkt.writable());
		self.radio_off(core);
		if !info.crc_ok || info.len >= LENGTH_IEEE154_MAX {
			self.store.release(pkt);
			self.end_slot(core);
			return;
		}
		pkt.set_frame_len(info.len);

		let header = match ie::parse_header(pkt.frame()) {
			Ok(header) => header,
			Err(_) => {
				report::error(Component::SlotFsm, ErrorCode::MalformedFrame, 0, 0);
				self.store.release(pkt);
				self.end_slot(core);
				return;
			}
		};
		if header.security {
			report::error(Component::SlotFsm, ErrorCode::SecurityUnsupported, 0, 0);
			self.store.release(pkt);
			self.end_slot(core);
			return;
		}
		let me = self.ids.my_short_id();
		let (Some(src), Some(dst)) = (header.src, header.dst) else {
			self.store.release(pkt);
			self.end_slot(core);
			return;
		};
		if (dst != me && !dst.is_broadcast()) || !self.neighbors.is_acceptable(src) {
			self.store.release(pkt);
			self.end_slot(core);
			return;
		}

		let is_root = self.ids.is_dag_root();
		self.neighbors.indicate_rx(src, info.rssi, core.asn, is_root);

		match header.frame_type {
			FrameType::Beacon => {
				match ie::EnhancedBeaconIes::decode(&pkt.frame()[header.payload_offset..]) {
					Ok(ies) => {
						let rank = rank_from_join_priority(ies.sync.join_priority);
						self.neighbors.indicate_rx_eb(src, rank, is_root);
						self.sync_to_frame(core, src);
					}
					Err(_) => {
						report::error(Component::SlotFsm, ErrorCode::MalformedFrame, src.0, 0);
					}
				}
				core.state = SlotState::RxProc;
				self.store.release(pkt);
				self.end_slot(core);
			}
			FrameType::Data => {
				self.neighbors.note_rx_data(src, header.seq);
				self.sync_to_frame(core, src);
				if header.ack_request && dst == me {
					core.rx_src = src;
					core.rx_dsn = header.seq;
					core.data_received = Some(pkt);
					core.state = SlotState::TxAckOffset;
					core.timer.schedule(timing::ack_tx_prepare_at(captured));
				} else {
					core.state = SlotState::RxProc;
					self.store.received(pkt);
					self.end_slot(core);
				}
			}
			_ => {
				// Not something a receive slot expects; skip it.
				self.store.release(pkt);
				self.end_slot(core);
			}
		}
	}

	/// Synchronize the local slot boundary to a frame received from the
	/// time-keeping peer.
	fn sync_to_frame(&self, core: &mut SlotCore<R, T>, src: ShortId) {
		if !self.is_timekeeper(core, src) {
			return;
		}
		let raw = core.sync_captured as i32 - TS_TX_OFFSET as i32;
		let clipped = self.sync.clip(saturate_i16(raw));
		self.adjust_boundary(core, clipped);
		self.sync.record_correction(clipped, false);
	}

	fn prepare_ack(&self, core: &mut SlotCore<R, T>) {
		core.state = SlotState::TxAckPrepare;
		let Some(mut ack) = self.store.allocate() else {
			report::error(Component::SlotFsm, ErrorCode::NoFreePacket, 0, 0);
			self.abort_slot(core);
			return;
		};
		// The correction the sender must apply: expected minus observed
		// start of its data frame.
		let correction = saturate_i16(TS_TX_OFFSET as i32 - core.sync_captured as i32);
		let tc = TimeCorrectionIe {
			correction,
			blacklist: self.neighbors.current_blacklist(core.rx_src),
		};
		let written = ie::write_ack_header(ack.writable(), core.rx_dsn)
			.and_then(|offset| tc.write(ack.writable(), offset));
		match written {
			Ok(len) => {
				ack.set_frame_len(len);
				core.radio.load_packet(ack.frame());
				core.radio.tx_enable();
				self.mark_radio_on(core);
				core.ack_to_send = Some(ack);
				core.state = SlotState::TxAckReady;
				core.timer.schedule(timing::ack_tx_go_at(core.last_captured));
			}
			Err(_) => {
				report::error(Component::SlotFsm, ErrorCode::MalformedFrame, 0, 0);
				self.store.release(ack);
				self.abort_slot(core);
			}
		}
	}

	fn ack_sent(&self, core: &mut SlotCore<R, T>) {
		core.timer.cancel();
		if let Some(ack) = core.ack_to_send.take() {
			self.store.release(ack);
		}
		let Some(pkt) = core.data_received.take() else {
			self.abort_slot(core);
			return;
		};
		core.state = SlotState::RxProc;
		self.store.received(pkt);
		self.end_slot(core);
	}

	/// A full frame arrived while hunting for beacons: adopt the sender's
	/// clock if it is a valid Enhanced Beacon, keep listening otherwise.
	fn sync_frame_received(&self, core: &mut SlotCore<R, T>) {
		let mut buf = [0u8; LENGTH_IEEE154_MAX];
		let info = core.radio.read_frame(&mut buf);
		let frame = &buf[..info.len.min(LENGTH_IEEE154_MAX)];
		core.state = SlotState::SyncProc;

		if info.crc_ok {
			if let Ok(header) = ie::parse_header(frame) {
				if header.frame_type == FrameType::Beacon && !header.security {
					if let Some(src) = header.src {
						if self.neighbors.is_acceptable(src) {
							if let Ok(ies) =
								ie::EnhancedBeaconIes::decode(&frame[header.payload_offset..])
							{
								self.adopt_sync(core, src, info.rssi, &ies);
								return;
							}
						}
					}
				}
			}
		}

		// Not usable; stay in the listen loop.
		core.state = SlotState::SyncListen;
		core.radio.rx_now();
	}

	fn adopt_sync(
		&self,
		core: &mut SlotCore<R, T>,
		src: ShortId,
		rssi: i8,
		ies: &ie::EnhancedBeaconIes,
	) {
		// The beacon's ASN is the ASN of the slot it was sent in, which is
		// the slot we are in right now.
		core.asn = ies.sync.asn;
		let is_root = self.ids.is_dag_root();
		self.neighbors.indicate_rx(src, rssi, core.asn, is_root);
		self.neighbors
			.indicate_rx_eb(src, rank_from_join_priority(ies.sync.join_priority), is_root);

		// The sender's slot began TS_TX_OFFSET before the captured start of
		// frame; place our next boundary one full slot after that.
		core.timer
			.set_period(core.sync_captured + TS_SLOT_DURATION - TS_TX_OFFSET);
		core.period_adjusted = true;

		self.sync.acquired();
		self.beacon.reset_period();
		core.unsync_slots = 0;
		self.radio_off(core);
		core.state = SlotState::Sleep;
	}

	// Slot teardown.

	/// A transmit attempt came to nothing: record it, return the packet to
	/// the queue, and put the slot to rest.
	fn fail_tx(&self, core: &mut SlotCore<R, T>) {
		if let Some(pkt) = core.data_to_send.take() {
			if core.tx_is_eb {
				self.store.release(pkt);
			} else {
				if !pkt.dest.is_broadcast() {
					self.neighbors.indicate_tx(pkt.dest, 1, false, core.asn);
				}
				self.store.tx_done(pkt, TxOutcome::Failed);
			}
		}
		self.end_slot(core);
	}

	/// Return every borrowed buffer to its owner and force the resting
	/// state. Used for watchdogs and protocol errors; the next boundary
	/// resumes the machine.
	fn abort_slot(&self, core: &mut SlotCore<R, T>) {
		if let Some(pkt) = core.data_to_send.take() {
			if core.tx_is_eb {
				self.store.release(pkt);
			} else {
				self.store.tx_done(pkt, TxOutcome::Failed);
			}
		}
		if let Some(ack) = core.ack_to_send.take() {
			self.store.release(ack);
		}
		if let Some(pkt) = core.data_received.take() {
			self.store.release(pkt);
		}
		self.end_slot(core);
	}

	fn end_slot(&self, core: &mut SlotCore<R, T>) {
		core.timer.cancel();
		self.radio_off(core);
		core.state = SlotState::Sleep;
	}

	fn adjust_boundary(&self, core: &mut SlotCore<R, T>, correction: i16) {
		if correction == 0 {
			return;
		}
		let period = TS_SLOT_DURATION as i32 + i32::from(correction);
		core.timer.set_period(period as u32);
		core.period_adjusted = true;
	}

	fn is_timekeeper(&self, core: &SlotCore<R, T>, peer: ShortId) -> bool {
		core.cell.options.contains(CellOptions::TIMEKEEPING)
			|| self.neighbors.is_preferred_parent(peer)
	}

	fn mark_radio_on(&self, core: &mut SlotCore<R, T>) {
		if core.radio_on_at.is_none() {
			core.radio_on_at = Some(core.timer.now());
		}
	}

	fn radio_off(&self, core: &mut SlotCore<R, T>) {
		if let Some(at) = core.radio_on_at.take() {
			let now = core.timer.now();
			core.tics_on = core.tics_on.saturating_add(now.saturating_sub(at));
		}
		core.radio.off();
	}

	// Foreground surface.

	/// The DAG-root flag flipped; re-anchor rank and synchronization.
	pub fn dag_root_changed(&self) {
		without_interrupts(|| {
			let is_root = self.ids.is_dag_root();
			if is_root {
				self.sync.force_sync();
			}
			self.neighbors.update_my_rank(is_root);
		});
	}

	/// Tick of the external adaptive-advertisement timer.
	pub fn eb_period_timer_fired(&self) {
		self.beacon.period_timer_fired();
	}

	pub fn neighbors(&self) -> &Neighbors {
		&self.neighbors
	}

	pub fn store(&self) -> &P {
		&self.store
	}

	pub fn beacon(&self) -> &BeaconState {
		&self.beacon
	}

	// Debug surface.

	pub fn is_sync(&self) -> bool {
		self.sync.is_sync()
	}

	/// The ASN in its 5-byte wire form, for host-side tooling.
	pub fn debug_asn(&self) -> [u8; 5] {
		self.core.lock().asn.to_bytes()
	}

	pub fn asn(&self) -> Asn {
		self.core.lock().asn
	}

	pub fn state(&self) -> SlotState {
		self.core.lock().state
	}

	pub fn sync_stats(&self) -> SyncStats {
		self.sync.snapshot()
	}
}

/// Rank a beacon sender advertises through its join priority.
fn rank_from_join_priority(join_priority: u8) -> u16 {
	((u32::from(join_priority) + 1) * u32::from(MIN_HOP_RANK_INCREASE))
		.min(u32::from(MAX_DAG_RANK)) as u16
}

fn saturate_i16(value: i32) -> i16 {
	value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}
