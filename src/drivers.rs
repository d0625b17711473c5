//! Interfaces to the hardware this layer drives.
//!
//! The radio and the 32 kHz slot timer are external drivers; the traits
//! here describe the contract the slot FSM relies on. All methods are
//! non-blocking: the FSM arms one operation per state transition and
//! returns, and the drivers answer through the layer's event entry points
//! (`new_slot`, `timer_fired`, `start_of_frame`, `end_of_frame`) from
//! interrupt context.

use crate::ShortId;

/// Reception metadata for one frame read out of the radio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RxFrame {
	/// Frame length in bytes, FCS excluded.
	pub len: usize,
	/// Received signal strength in dBm.
	pub rssi: i8,
	/// Link quality indicator.
	pub lqi: u8,
	/// Whether the frame checksum verified.
	pub crc_ok: bool,
}

/// The IEEE 802.15.4 transceiver.
///
/// The driver is expected to raise its SFD interrupt into
/// `start_of_frame(captured)` and its TX/RX-complete interrupt into
/// `end_of_frame(captured)`, with the 32 kHz timestamp captured in
/// hardware.
pub trait Radio {
	/// Tune to a physical IEEE channel (11..=26).
	fn set_channel(&mut self, channel: u8);
	/// Program the transmit power register.
	fn set_tx_power(&mut self, power: u8);
	/// Copy a frame into the transmit buffer.
	fn load_packet(&mut self, frame: &[u8]);
	/// Ramp the transmitter up; transmission starts on [`Radio::tx_now`].
	fn tx_enable(&mut self);
	fn tx_now(&mut self);
	/// Ramp the receiver up; listening starts on [`Radio::rx_now`].
	fn rx_enable(&mut self);
	fn rx_now(&mut self);
	/// Read the received frame into `buf` and return its metadata.
	fn read_frame(&mut self, buf: &mut [u8]) -> RxFrame;
	/// Switch the transceiver off.
	fn off(&mut self);
}

/// One-shot compare timer on the free-running 32 kHz slot counter.
///
/// The counter restarts at every slot boundary; the boundary overflow
/// itself is what drives `new_slot`.
pub trait SlotTimer {
	/// Fire `timer_fired` once when the counter reaches `offset_ticks`.
	fn schedule(&mut self, offset_ticks: u32);
	/// Cancel a pending compare.
	fn cancel(&mut self);
	/// Current counter value, ticks into the slot.
	fn now(&self) -> u32;
	/// Set the counter period, i.e. the position of the next slot
	/// boundary. Used once at start-up and for per-slot time corrections.
	fn set_period(&mut self, ticks: u32);
	fn period(&self) -> u32;
}

/// Identity of this node.
pub trait IdManager {
	fn my_short_id(&self) -> ShortId;
	fn is_dag_root(&self) -> bool;
}
