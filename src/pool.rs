//! Packet buffers and the queue interface the slot FSM drives.
//!
//! A [`PacketBuf`] is a linear handle: it is moved into the FSM for the
//! duration of one slot and moved back out through [`PacketStore`] on slot
//! exit. The type is not `Clone`, so double ownership of a buffer is a type
//! error rather than a runtime bug.

use hermit_sync::InterruptTicketMutex;

use crate::ShortId;
use crate::config::{FIRST_FRAME_BYTE, LENGTH_IEEE154_MAX, MAX_PACKETS, TX_RETRIES};
use crate::report::{self, Component, ErrorCode};

/// An owned frame buffer. Byte 0 is reserved for the PHY length field; the
/// MAC frame starts at [`FIRST_FRAME_BYTE`].
#[derive(Debug)]
pub struct PacketBuf {
	bytes: [u8; LENGTH_IEEE154_MAX],
	len: usize,
	/// Sequence number, once the FSM has stamped one into the frame.
	pub dsn: Option<u8>,
	/// Link-layer destination.
	pub dest: ShortId,
	/// Whether the frame asks for an acknowledgment.
	pub ack_requested: bool,
	/// Transmission attempts so far.
	pub attempts: u8,
}

impl PacketBuf {
	pub const fn new() -> Self {
		Self {
			bytes: [0; LENGTH_IEEE154_MAX],
			len: 0,
			dsn: None,
			dest: ShortId::BROADCAST,
			ack_requested: false,
			attempts: 0,
		}
	}

	/// The encoded MAC frame.
	pub fn frame(&self) -> &[u8] {
		&self.bytes[FIRST_FRAME_BYTE..FIRST_FRAME_BYTE + self.len]
	}

	pub fn frame_mut(&mut self) -> &mut [u8] {
		&mut self.bytes[FIRST_FRAME_BYTE..FIRST_FRAME_BYTE + self.len]
	}

	/// The whole writable frame region, for the radio to fill on receive
	/// and for encoders to write into. Call [`Self::set_frame_len`] after.
	pub fn writable(&mut self) -> &mut [u8] {
		&mut self.bytes[FIRST_FRAME_BYTE..]
	}

	pub fn set_frame_len(&mut self, len: usize) {
		debug_assert!(len <= LENGTH_IEEE154_MAX - FIRST_FRAME_BYTE);
		self.len = len;
	}

	pub fn frame_len(&self) -> usize {
		self.len
	}

	/// Zero the metadata (and length) so the buffer can be reused.
	pub fn reset(&mut self) {
		self.len = 0;
		self.dsn = None;
		self.dest = ShortId::BROADCAST;
		self.ack_requested = false;
		self.attempts = 0;
	}
}

impl Default for PacketBuf {
	fn default() -> Self {
		Self::new()
	}
}

/// How a transmit slot ended, from the queue's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxOutcome {
	/// Acknowledged, or a broadcast that went out.
	Completed,
	/// Not acknowledged, or the slot was aborted before the frame left.
	Failed,
}

/// The packet queue the FSM borrows buffers from and returns them to.
/// Exactly one party owns a buffer at any time; every method moves it.
pub trait PacketStore {
	/// A free buffer for an acknowledgment or a beacon.
	fn allocate(&self) -> Option<PacketBuf>;
	/// Return a buffer that carries nothing of interest.
	fn release(&self, pkt: PacketBuf);
	/// The next data frame pending for `dest` (any unicast frame if `dest`
	/// is broadcast). Ownership moves to the FSM for the slot.
	fn take_for(&self, dest: ShortId) -> Option<PacketBuf>;
	/// A transmit slot finished; the queue decides about retransmission.
	fn tx_done(&self, pkt: PacketBuf, outcome: TxOutcome);
	/// A received data frame, ready for the upper layer.
	fn received(&self, pkt: PacketBuf);
}

/// Fixed-capacity store shipped for bring-up and tests: a free list plus
/// bounded transmit and receive queues. Production nodes plug their own
/// queue in via [`PacketStore`].
pub struct FixedPool {
	free: InterruptTicketMutex<heapless::Vec<PacketBuf, MAX_PACKETS>>,
	tx: InterruptTicketMutex<heapless::Vec<PacketBuf, MAX_PACKETS>>,
	rx: InterruptTicketMutex<heapless::Vec<PacketBuf, MAX_PACKETS>>,
}

impl FixedPool {
	pub fn new() -> Self {
		let mut free = heapless::Vec::new();
		for _ in 0..MAX_PACKETS {
			let _ = free.push(PacketBuf::new());
		}
		Self {
			free: InterruptTicketMutex::new(free),
			tx: InterruptTicketMutex::new(heapless::Vec::new()),
			rx: InterruptTicketMutex::new(heapless::Vec::new()),
		}
	}

	/// Enqueue a data frame for transmission. The buffer comes back through
	/// the free list once the schedule has served it.
	pub fn enqueue_tx(&self, pkt: PacketBuf) -> Result<(), PacketBuf> {
		self.tx.lock().push(pkt)
	}

	/// Next received frame for the upper layer, if any.
	pub fn dequeue_rx(&self) -> Option<PacketBuf> {
		let mut rx = self.rx.lock();
		if rx.is_empty() { None } else { Some(rx.remove(0)) }
	}

	pub fn free_count(&self) -> usize {
		self.free.lock().len()
	}

	pub fn pending_tx(&self) -> usize {
		self.tx.lock().len()
	}
}

impl Default for FixedPool {
	fn default() -> Self {
		Self::new()
	}
}

impl PacketStore for FixedPool {
	fn allocate(&self) -> Option<PacketBuf> {
		self.free.lock().pop()
	}

	fn release(&self, mut pkt: PacketBuf) {
		pkt.reset();
		let _ = self.free.lock().push(pkt);
	}

	fn take_for(&self, dest: ShortId) -> Option<PacketBuf> {
		let mut tx = self.tx.lock();
		let index = tx
			.iter()
			.position(|pkt| dest.is_broadcast() || pkt.dest == dest)?;
		Some(tx.remove(index))
	}

	fn tx_done(&self, mut pkt: PacketBuf, outcome: TxOutcome) {
		pkt.attempts = pkt.attempts.saturating_add(1);
		if outcome == TxOutcome::Failed && pkt.attempts < TX_RETRIES {
			if let Err(pkt) = self.tx.lock().push(pkt) {
				self.release(pkt);
			}
			return;
		}
		self.release(pkt);
	}

	fn received(&self, pkt: PacketBuf) {
		if let Err(pkt) = self.rx.lock().push(pkt) {
			report::error(Component::Pool, ErrorCode::QueueFull, pkt.dest.0, 0);
			self.release(pkt);
		}
	}
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
	use super::*;

	#[test]
	fn buffers_move_between_free_list_and_queues() {
		let pool = FixedPool::new();
		assert_eq!(pool.free_count(), MAX_PACKETS);

		let mut pkt = pool.allocate().unwrap();
		assert_eq!(pool.free_count(), MAX_PACKETS - 1);
		pkt.dest = ShortId(0x89a5);
		pool.enqueue_tx(pkt).unwrap();

		let pkt = pool.take_for(ShortId(0x89a5)).unwrap();
		assert_eq!(pkt.dest, ShortId(0x89a5));
		pool.tx_done(pkt, TxOutcome::Completed);
		assert_eq!(pool.free_count(), MAX_PACKETS);
	}

	#[test]
	fn take_for_matches_destination() {
		let pool = FixedPool::new();
		let mut pkt = pool.allocate().unwrap();
		pkt.dest = ShortId(0x89a5);
		pool.enqueue_tx(pkt).unwrap();
		assert!(pool.take_for(ShortId(0x5a53)).is_none());
		assert!(pool.take_for(ShortId(0x89a5)).is_some());
	}

	#[test]
	fn failed_transmissions_requeue_until_the_retry_limit() {
		let pool = FixedPool::new();
		let mut pkt = pool.allocate().unwrap();
		pkt.dest = ShortId(0x89a5);
		pool.enqueue_tx(pkt).unwrap();

		for attempt in 1..TX_RETRIES {
			let pkt = pool.take_for(ShortId(0x89a5)).unwrap();
			assert_eq!(pkt.attempts, attempt - 1);
			pool.tx_done(pkt, TxOutcome::Failed);
			assert_eq!(pool.pending_tx(), 1);
		}
		let pkt = pool.take_for(ShortId(0x89a5)).unwrap();
		pool.tx_done(pkt, TxOutcome::Failed);
		assert_eq!(pool.pending_tx(), 0);
		assert_eq!(pool.free_count(), MAX_PACKETS);
	}

	#[test]
	fn exhaustion_yields_none() {
		let pool = FixedPool::new();
		let mut held = std::vec::Vec::new();
		while let Some(pkt) = pool.allocate() {
			held.push(pkt);
		}
		assert_eq!(held.len(), MAX_PACKETS);
		assert!(pool.allocate().is_none());
	}
}
